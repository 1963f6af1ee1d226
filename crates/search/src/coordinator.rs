use std::sync::atomic::{AtomicU64, Ordering};

use crate::api::Nonce;

// The cell packs a state tag into the high 32 bits and the winning nonce into the low 32 bits,
// so claiming and publishing the winner is a single compare-and-swap.
const TAG_SHIFT: u32 = 32;
const NONCE_MASK: u64 = 0xFFFF_FFFF;

const RUNNING: u64 = 0;
const FOUND: u64 = 1 << TAG_SHIFT;
const EXHAUSTED: u64 = 2 << TAG_SHIFT;
const ABORTED: u64 = 3 << TAG_SHIFT;

/// Observable state of a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionState {
    /// Workers are still scanning.
    Running,
    /// A worker claimed the given nonce.
    Found(Nonce),
    /// The orchestrator saw every worker exhaust its subrange.
    Exhausted,
    /// The search was stopped by a failure or cancellation.
    Aborted,
}

impl CompletionState {
    /// Whether the search is still running.
    pub fn is_running(&self) -> bool {
        matches!(self, CompletionState::Running)
    }
}

/// Single shared completion cell, written at most once per search.
///
/// Workers poll [`CompletionCoordinator::peek`] once per candidate; the only writes are the
/// `Running -> *` transitions, each a compare-and-swap that only the first caller wins.
#[derive(Debug)]
pub struct CompletionCoordinator {
    cell: AtomicU64,
}

impl CompletionCoordinator {
    /// A coordinator in the `Running` state.
    pub fn new() -> Self {
        Self {
            cell: AtomicU64::new(RUNNING),
        }
    }

    /// Return to `Running` for a new search.
    pub(crate) fn reset(&self) {
        self.cell.store(RUNNING, Ordering::Release);
    }

    /// Claim the winning slot for `nonce`.
    ///
    /// Returns `true` iff this call performed the `Running -> Found` transition.
    pub fn try_claim(&self, nonce: Nonce) -> bool {
        self.transition(FOUND | u64::from(nonce))
    }

    /// Mark the domain as exhausted (`Running -> Exhausted`).
    ///
    /// Returns `true` iff this call performed the transition.
    pub fn request_stop(&self) -> bool {
        self.transition(EXHAUSTED)
    }

    /// Stop the search without a winner (`Running -> Aborted`).
    ///
    /// Returns `true` iff this call performed the transition.
    pub fn abort(&self) -> bool {
        self.transition(ABORTED)
    }

    /// Current state.
    pub fn peek(&self) -> CompletionState {
        decode(self.cell.load(Ordering::Acquire))
    }

    /// Whether the search is still running. One atomic load.
    pub fn is_running(&self) -> bool {
        self.cell.load(Ordering::Acquire) == RUNNING
    }

    fn transition(&self, to: u64) -> bool {
        self.cell
            .compare_exchange(RUNNING, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for CompletionCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

fn decode(raw: u64) -> CompletionState {
    match raw & !NONCE_MASK {
        RUNNING => CompletionState::Running,
        FOUND => CompletionState::Found((raw & NONCE_MASK) as Nonce),
        EXHAUSTED => CompletionState::Exhausted,
        _ => CompletionState::Aborted,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    use super::*;

    #[test]
    fn first_claim_wins() {
        let c = CompletionCoordinator::new();
        assert!(c.try_claim(42));
        assert!(!c.try_claim(7));
        assert!(!c.request_stop());
        assert!(!c.abort());
        assert_eq!(c.peek(), CompletionState::Found(42));
    }

    #[test]
    fn max_nonce_round_trips_through_the_cell() {
        let c = CompletionCoordinator::new();
        assert!(c.try_claim(Nonce::MAX));
        assert_eq!(c.peek(), CompletionState::Found(Nonce::MAX));
    }

    #[test]
    fn exhaustion_blocks_later_claims() {
        let c = CompletionCoordinator::new();
        assert!(c.request_stop());
        assert!(!c.try_claim(0));
        assert_eq!(c.peek(), CompletionState::Exhausted);
    }

    #[test]
    fn reset_returns_to_running() {
        let c = CompletionCoordinator::new();
        assert!(c.abort());
        assert!(!c.is_running());
        c.reset();
        assert!(c.is_running());
        assert!(c.peek().is_running());
        assert!(c.try_claim(0));
        assert_eq!(c.peek(), CompletionState::Found(0));
    }

    #[test]
    fn concurrent_claims_have_exactly_one_winner() {
        let c = Arc::new(CompletionCoordinator::new());
        let winners = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16u32)
            .map(|idx| {
                let c = c.clone();
                let winners = winners.clone();
                thread::spawn(move || {
                    if c.try_claim(idx * 1000) {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
        match c.peek() {
            CompletionState::Found(nonce) => assert_eq!(nonce % 1000, 0),
            other => panic!("unexpected state {other:?}"),
        }
    }
}
