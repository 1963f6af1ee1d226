//! Public API types for the search engine.

use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;

/// A candidate value within the nonce domain.
pub type Nonce = u32;

/// Immutable unit of work (e.g. a block header prefix) shared read-only by all workers.
#[derive(Clone, PartialEq, Eq)]
pub struct WorkTemplate(Arc<[u8]>);

impl WorkTemplate {
    /// Wrap the given bytes.
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self(bytes.into())
    }

    /// Template bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Template length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the template is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for WorkTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkTemplate")
            .field("len", &self.0.len())
            .finish()
    }
}

impl From<Vec<u8>> for WorkTemplate {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes.into())
    }
}

impl From<&[u8]> for WorkTemplate {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.into())
    }
}

impl<const N: usize> From<[u8; N]> for WorkTemplate {
    fn from(bytes: [u8; N]) -> Self {
        Self(Arc::from(&bytes[..]))
    }
}

/// Turns `(template, nonce)` into a digest.
///
/// Implementations must be deterministic and free of shared-state side effects: the engine
/// calls [`Evaluator::evaluate`] concurrently from every worker. Anything an implementation
/// needs to mutate lives in its [`Evaluator::Scratch`], which is private to one worker.
pub trait Evaluator: Send + Sync {
    /// Digest produced for one candidate.
    type Digest;

    /// Per-worker working copy, built once from the template before scanning starts.
    type Scratch: Send;

    /// Failure raised when the evaluator cannot handle its input.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Build a worker's private scratch from the shared template.
    fn prepare(&self, template: &WorkTemplate) -> Result<Self::Scratch, Self::Error>;

    /// Compute the digest for `nonce`.
    fn evaluate(&self, scratch: &mut Self::Scratch, nonce: Nonce)
    -> Result<Self::Digest, Self::Error>;
}

/// Accepts or rejects a digest.
pub trait Predicate<D>: Send + Sync {
    /// Whether `digest` satisfies the acceptance condition.
    fn accept(&self, digest: &D) -> bool;
}

impl<D, F> Predicate<D> for F
where
    F: Fn(&D) -> bool + Send + Sync,
{
    fn accept(&self, digest: &D) -> bool {
        self(digest)
    }
}

/// [`Evaluator`] backed by a plain function of `(template bytes, nonce)`.
///
/// Built by [`from_fn`].
#[derive(Clone)]
pub struct FnEvaluator<F> {
    f: F,
}

/// Adapt a closure into an infallible [`Evaluator`].
pub fn from_fn<F, D>(f: F) -> FnEvaluator<F>
where
    F: Fn(&[u8], Nonce) -> D + Send + Sync,
{
    FnEvaluator { f }
}

impl<F, D> Evaluator for FnEvaluator<F>
where
    F: Fn(&[u8], Nonce) -> D + Send + Sync,
{
    type Digest = D;
    type Scratch = WorkTemplate;
    type Error = Infallible;

    fn prepare(&self, template: &WorkTemplate) -> Result<Self::Scratch, Self::Error> {
        Ok(template.clone())
    }

    fn evaluate(
        &self,
        scratch: &mut Self::Scratch,
        nonce: Nonce,
    ) -> Result<Self::Digest, Self::Error> {
        Ok((self.f)(scratch.as_bytes(), nonce))
    }
}

/// Result of one [`crate::SearchEngine::do_work`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    /// A worker found a nonce whose digest the predicate accepted.
    Found(Nonce),
    /// Every nonce in the domain was evaluated and none was accepted.
    Exhausted,
}

impl SearchOutcome {
    /// The winning nonce, if any.
    pub fn nonce(&self) -> Option<Nonce> {
        match self {
            SearchOutcome::Found(nonce) => Some(*nonce),
            SearchOutcome::Exhausted => None,
        }
    }
}

/// Configuration for a [`crate::SearchEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchConfig {
    /// Inclusive upper bound of the nonce domain (`[0, max_nonce]`).
    pub max_nonce: Nonce,

    /// Number of workers.
    ///
    /// `None` uses the available hardware parallelism, clamped to the domain size. An explicit
    /// value is used as-is and validated by the partitioner.
    pub workers: Option<usize>,

    /// How many candidates a worker evaluates between flushes of the shared progress counter.
    pub progress_batch: u64,
}

impl SearchConfig {
    /// Full 32-bit nonce domain.
    pub const DEFAULT_MAX_NONCE: Nonce = Nonce::MAX;

    /// Default progress flush cadence.
    pub const DEFAULT_PROGRESS_BATCH: u64 = 4096;
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_nonce: Self::DEFAULT_MAX_NONCE,
            workers: None,
            progress_batch: Self::DEFAULT_PROGRESS_BATCH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fn_evaluator_sees_template_bytes() {
        let eval = from_fn(|bytes: &[u8], nonce| bytes.len() as u32 + nonce);
        let template = WorkTemplate::from([0u8; 80]);
        let mut scratch = eval.prepare(&template).unwrap();
        assert_eq!(eval.evaluate(&mut scratch, 3).unwrap(), 83);
    }

    #[test]
    fn closure_is_a_predicate() {
        let pred = |d: &u8| *d == 0;
        assert!(Predicate::accept(&pred, &0));
        assert!(!Predicate::accept(&pred, &1));
    }

    #[test]
    fn outcome_nonce() {
        assert_eq!(SearchOutcome::Found(7).nonce(), Some(7));
        assert_eq!(SearchOutcome::Exhausted.nonce(), None);
    }

    #[test]
    fn template_debug_hides_contents() {
        let template = WorkTemplate::from(vec![0xAB; 4]);
        assert_eq!(format!("{template:?}"), "WorkTemplate { len: 4 }");
    }
}
