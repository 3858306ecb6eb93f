//! The memoizer: wraps a callable and serves repeated calls from its tables.
//!
//! Each call resolves its arguments to a [`CacheKey`](crate::keys::CacheKey), consults the table the
//! key belongs to, and only on a miss runs the wrapped callable. Successful
//! results are stored; errors are returned as-is and never cached.
//!
//! The store lock is taken for the lookup and again for the store, never
//! across the wrapped call, so a callable may call other memoized callables
//! (or itself, with different arguments) without deadlocking.

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use memora_core::Value;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::MemoConfig;
use crate::flight::{FlightTable, Join};
use crate::keys::{resolve, ResolvedKey};
use crate::metrics::MemoMetrics;
use crate::store::{CacheStore, StoreStats};

/// A memoized callable.
///
/// `F` is called as `F(ctx, args)`: `ctx` is the receiver the call was made
/// on and is forwarded unchanged; it is not part of the cache key.
pub struct Memoized<F, C: ?Sized, R, E> {
    func: F,
    config: MemoConfig,
    store: Mutex<CacheStore<R>>,
    flights: Option<FlightTable>,
    metrics: Arc<MemoMetrics>,
    stores: AtomicU64,
    _call: PhantomData<fn(&C) -> Result<R, E>>,
}

impl<F, C, R, E> Memoized<F, C, R, E>
where
    F: Fn(&C, &[Value]) -> Result<R, E>,
    C: ?Sized,
    R: Clone,
{
    /// Wrap `func` with the given configuration.
    pub fn new(func: F, config: MemoConfig) -> Self {
        info!(
            "Memoizer {} created (tuple keying: {}, single flight: {}, reclaim every: {})",
            config.name, config.tuple_keying, config.single_flight, config.reclaim_every
        );

        Self {
            func,
            flights: config.single_flight.then(FlightTable::new),
            config,
            store: Mutex::new(CacheStore::new()),
            metrics: Arc::new(MemoMetrics::new()),
            stores: AtomicU64::new(0),
            _call: PhantomData,
        }
    }

    /// Call through the cache.
    ///
    /// On a hit the stored result is returned and `func` is not invoked. On a
    /// miss `func(ctx, args)` runs; an `Ok` result is stored under the
    /// resolved key, an `Err` is returned without storing anything.
    pub fn call(&self, ctx: &C, args: &[Value]) -> Result<R, E> {
        let resolved = resolve(args, self.config.tuple_keying);

        if let Some(hit) = self.lookup(&resolved) {
            return Ok(hit);
        }

        let Some(flights) = &self.flights else {
            return self.compute(ctx, args, resolved);
        };

        loop {
            match flights.join(&resolved.key) {
                Join::Leader(_guard) => {
                    // A previous leader may have stored between our lookup
                    // and taking the lead.
                    if let Some(hit) = self.lookup(&resolved) {
                        return Ok(hit);
                    }
                    return self.compute(ctx, args, resolved);
                }
                Join::Waited => {
                    self.metrics.record_flight_wait();
                    if let Some(hit) = self.lookup(&resolved) {
                        return Ok(hit);
                    }
                    // The leader failed; try to lead.
                }
            }
        }
    }

    fn lookup(&self, resolved: &ResolvedKey) -> Option<R> {
        let hit = self.store.lock().lookup(&resolved.key)?;
        let table = resolved.key.table();
        self.metrics.record_hit(table);
        debug!(
            "{}: hit in {:?} table ({}, key {})",
            self.config.name,
            table,
            resolved.strategy,
            resolved.key.fingerprint()
        );
        Some(hit)
    }

    fn compute(&self, ctx: &C, args: &[Value], resolved: ResolvedKey) -> Result<R, E> {
        self.metrics.record_miss();
        debug!(
            "{}: miss ({}, key {})",
            self.config.name,
            resolved.strategy,
            resolved.key.fingerprint()
        );

        match (self.func)(ctx, args) {
            Ok(value) => {
                self.insert(resolved, value.clone());
                Ok(value)
            }
            Err(err) => {
                self.metrics.record_failure();
                warn!(
                    "{}: call failed, nothing cached for key {}",
                    self.config.name,
                    resolved.key.fingerprint()
                );
                Err(err)
            }
        }
    }

    fn insert(&self, resolved: ResolvedKey, value: R) {
        let ResolvedKey { key, anchors, .. } = resolved;
        let mut store = self.store.lock();
        store.store(key, value, anchors);
        self.metrics.record_store();

        let every = self.config.reclaim_every;
        if every > 0 && (self.stores.fetch_add(1, Ordering::Relaxed) + 1) % every == 0 {
            let dropped = store.purge_unreachable();
            self.record_reclaimed(dropped);
        }
    }

    /// Drop identity entries whose key instances no longer exist.
    ///
    /// Returns the number of entries dropped. A key that contains itself
    /// stays alive until its cycle is broken (`clear`, `remove` or `set`),
    /// so its entry is kept until then.
    pub fn purge_unreachable(&self) -> usize {
        let dropped = self.store.lock().purge_unreachable();
        self.record_reclaimed(dropped);
        dropped
    }

    fn record_reclaimed(&self, dropped: usize) {
        if dropped > 0 {
            self.metrics.record_reclaimed(dropped as u64);
            debug!(
                "{}: reclaimed {} unreachable identity entries",
                self.config.name, dropped
            );
        }
    }
}

impl<F, C: ?Sized, R, E> Memoized<F, C, R, E> {
    #[must_use]
    pub fn config(&self) -> &MemoConfig {
        &self.config
    }

    #[must_use]
    pub fn metrics(&self) -> &MemoMetrics {
        &self.metrics
    }

    /// A shared handle to the metrics, for exporting from elsewhere.
    #[must_use]
    pub fn metrics_handle(&self) -> Arc<MemoMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Number of stored results across both tables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.lock().is_empty()
    }
}

impl<F, C: ?Sized, R, E> Memoized<F, C, R, E> {
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        self.store.lock().stats()
    }
}

impl<F, R, E> Memoized<F, (), R, E>
where
    F: Fn(&(), &[Value]) -> Result<R, E>,
    R: Clone,
{
    /// Call a receiver-less memoized callable.
    pub fn invoke(&self, args: &[Value]) -> Result<R, E> {
        self.call(&(), args)
    }
}

impl<F, C: ?Sized, R, E> fmt::Debug for Memoized<F, C, R, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memoized")
            .field("config", &self.config)
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

/// Memoize `func` with the default configuration.
///
/// # Example
///
/// ```
/// use memora_core::Value;
/// use memora_memo::memoize;
///
/// let square = memoize(|_: &(), args: &[Value]| -> Result<f64, String> {
///     let n = args.first().and_then(Value::as_number).ok_or("expected a number")?;
///     Ok(n * n)
/// });
///
/// assert_eq!(square.invoke(&[Value::from(3)]), Ok(9.0));
/// assert_eq!(square.invoke(&[Value::from(3)]), Ok(9.0));
/// assert_eq!(square.metrics().hits(), 1);
/// ```
pub fn memoize<F, C, R, E>(func: F) -> Memoized<F, C, R, E>
where
    F: Fn(&C, &[Value]) -> Result<R, E>,
    C: ?Sized,
    R: Clone,
{
    Memoized::new(func, MemoConfig::default())
}

/// Memoize `func` with an explicit configuration.
pub fn memoize_with<F, C, R, E>(func: F, config: MemoConfig) -> Memoized<F, C, R, E>
where
    F: Fn(&C, &[Value]) -> Result<R, E>,
    C: ?Sized,
    R: Clone,
{
    Memoized::new(func, config)
}
