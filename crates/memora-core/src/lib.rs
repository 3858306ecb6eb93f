//! # memora-core
//!
//! Core infrastructure for memora.
//!
//! Provides shared abstractions for:
//! - The runtime value model passed to memoized callables (`Value`)
//! - Hashing (blake3) for key fingerprints
//! - Error types

pub mod error;
pub mod hashing;
pub mod value;

pub use error::{MemoraError, Result};
pub use hashing::{fingerprint, Blake3Hasher, HashFunction};
pub use value::{
    Array, Function, MapValue, ObjectId, PlainObject, SetValue, Symbol, Value, WeakValue,
};
