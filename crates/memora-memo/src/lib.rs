//! # memora-memo
//!
//! Memoization of deterministic callables with identity- and
//! structure-aware cache keys.
//!
//! Every argument is classified before it is keyed. Primitives, arrays and
//! plain objects compare by content; symbols, functions, maps and sets
//! compare by instance; arrays and plain objects that contain themselves
//! are keyed by instance so they never need to be serialized.
//!
//! ## Features
//!
//! - **Two tables**: an identity table for instance-keyed results and a
//!   canonical table for content-keyed results
//! - **Cycle safety**: self-referential arguments never recurse forever
//! - **Reclamation**: identity entries whose key instance is gone can be
//!   dropped, on demand or every N stores. A self-referential key is only
//!   gone once its cycle has been broken
//! - **No recursion**: cycle detection, encoding and dropping use explicit
//!   stacks, so nesting depth is bounded by memory only
//! - **Single flight**: optionally, at most one computation per key
//! - **Metrics**: hit/miss counters with Prometheus and JSON export
//!
//! ## Quick Start
//!
//! ```
//! use memora_core::{MapValue, Value};
//! use memora_memo::{memoize_with, MemoConfig};
//!
//! let size = memoize_with(
//!     |_: &(), args: &[Value]| -> Result<usize, String> {
//!         match &args[0] {
//!             Value::MapValue(map) => Ok(map.len()),
//!             other => Err(format!("expected a map, got {}", other.type_name())),
//!         }
//!     },
//!     MemoConfig::new("size"),
//! );
//!
//! let map = MapValue::new();
//! map.insert("a", 1);
//!
//! assert_eq!(size.invoke(&[Value::from(map.clone())]), Ok(1));
//! // Same instance: served from the identity table.
//! assert_eq!(size.invoke(&[Value::from(map)]), Ok(1));
//! // Equal content, different instance: computed again.
//! let copy = MapValue::from_entries([(Value::from("a"), Value::from(1))]);
//! assert_eq!(size.invoke(&[Value::from(copy)]), Ok(1));
//! assert_eq!(size.metrics().misses(), 2);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        MEMOIZER CALL PATH                        │
//! │                                                                  │
//! │  call(ctx, args)                                                 │
//! │       │                                                          │
//! │       ▼                                                          │
//! │  ┌──────────┐   ┌─────────┐                                      │
//! │  │ classify │◀──│  cycle  │                                      │
//! │  └──────────┘   └─────────┘                                      │
//! │       │                                                          │
//! │       ├── identity ───────▶ IdentityKey ──▶ ┌────────────────┐   │
//! │       │                                     │ identity table │   │
//! │       └── primitive/      ┌──────────┐      └────────────────┘   │
//! │           structural ────▶│   keys   │──▶   ┌────────────────┐   │
//! │                           └──────────┘      │canonical table │   │
//! │                                             └────────────────┘   │
//! │       miss ──▶ func(ctx, args) ──▶ Ok: store ─ Err: return       │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`cycle`]: cycle detection over composite values
//! - [`classify`]: per-argument strategy selection
//! - [`keys`]: canonical encoding and key resolution
//! - [`store`]: identity and canonical result tables
//! - [`flight`]: single-flight coordination
//! - [`memoize`]: the memoizer itself
//! - [`metrics`]: counters and export
//! - [`config`]: memoizer configuration

pub mod classify;
pub mod config;
pub mod cycle;
pub mod flight;
pub mod keys;
pub mod memoize;
pub mod metrics;
pub mod store;

// Re-export commonly used types
pub use classify::{classify, Strategy, Table};
pub use config::{MemoConfig, TupleKeying};
pub use cycle::has_cycle;
pub use keys::{encode, resolve, CacheKey, CanonicalKey, IdentityKey, KeyPart, ResolvedKey};
pub use memoize::{memoize, memoize_with, Memoized};
pub use metrics::{MemoMetrics, MetricsSnapshot};
pub use store::{CacheEntry, CacheStore, StoreStats};
