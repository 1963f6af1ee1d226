#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(unreachable_pub)]

//! Bitcoin-style proof-of-work primitives for `hashforge-search`: double SHA-256 over 80-byte
//! block headers and a 256-bit target predicate.

/// SHA-256 capability used by the header evaluator.
pub mod hasher;

mod header;
mod target;

pub use hasher::{Digest, Sha2, Sha256, double_sha256};
pub use header::{HEADER_LEN, HeaderError, HeaderEvaluator, NONCE_OFFSET, header_hash, set_nonce};
pub use target::{Target, TargetError};
