//! # pagekey-core
//!
//! Core types and abstractions shared by every pagekey crate.
//!
//! This crate provides the identifier normalizer that defines what a
//! canonical page key looks like, the storage key encoding, the shared
//! error type, and default constants.
//!
//! ## Log Level Contract
//!
//! Every crate logs through `tracing` with these levels:
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | A background task failed and left a conflict in place |
//! | WARN  | Recoverable issue, original content kept |
//! | INFO  | Lifecycle events, sweep summaries, completed renames |
//! | DEBUG | Decision points (skip reasons, winner selection) |
//! | TRACE | Per-key iteration |

pub mod defaults;
pub mod error;
pub mod identifier;
pub mod key;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use identifier::{is_adversarial, normalize, IdentifierError};
pub use key::{identifier_from_key, same_slot, storage_key};
