//! Travel time estimation with oracle fallback
//!
//! Primary path asks the routing oracle (bounded retries, per-call timeout,
//! bounded in-flight calls). Any oracle failure is recovered locally with
//! the closed-form haversine estimate and logged as degraded mode — oracle
//! errors never propagate to callers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveTime;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::services::geo;
use crate::services::routing::{LegEstimate, RoutingOracle};
use crate::types::{BusinessRules, GeoPoint, TravelMode};

/// Tuning knobs for oracle interaction and caching.
#[derive(Debug, Clone)]
pub struct TravelEstimatorConfig {
    /// Per-call oracle timeout.
    pub oracle_timeout: Duration,
    /// Oracle attempts before falling back.
    pub oracle_attempts: u32,
    /// Maximum concurrent in-flight oracle calls (rate-limit protection).
    pub max_in_flight: usize,
    /// Travel-time cache entry lifetime.
    pub cache_ttl: Duration,
}

impl Default for TravelEstimatorConfig {
    fn default() -> Self {
        Self {
            oracle_timeout: Duration::from_secs(10),
            oracle_attempts: 2,
            max_in_flight: 8,
            cache_ttl: Duration::from_secs(3600),
        }
    }
}

struct CacheEntry {
    leg: LegEstimate,
    inserted_at: Instant,
}

/// Converts coordinate pairs into distances and travel durations.
///
/// Request-scoped apart from the TTL cache, which is safe to share across
/// concurrent clustering computations.
pub struct TravelEstimator {
    oracle: Option<Arc<dyn RoutingOracle>>,
    rules: BusinessRules,
    config: TravelEstimatorConfig,
    cache: Mutex<HashMap<(String, String, TravelMode), CacheEntry>>,
    semaphore: Arc<Semaphore>,
}

impl TravelEstimator {
    /// Estimator with no oracle — every leg uses the closed-form estimate.
    pub fn new(rules: BusinessRules) -> Self {
        Self::build(rules, None, TravelEstimatorConfig::default())
    }

    pub fn with_oracle(rules: BusinessRules, oracle: Arc<dyn RoutingOracle>) -> Self {
        Self::build(rules, Some(oracle), TravelEstimatorConfig::default())
    }

    pub fn with_config(
        rules: BusinessRules,
        oracle: Option<Arc<dyn RoutingOracle>>,
        config: TravelEstimatorConfig,
    ) -> Self {
        Self::build(rules, oracle, config)
    }

    fn build(
        rules: BusinessRules,
        oracle: Option<Arc<dyn RoutingOracle>>,
        config: TravelEstimatorConfig,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_in_flight.max(1)));
        Self {
            oracle,
            rules,
            config,
            cache: Mutex::new(HashMap::new()),
            semaphore,
        }
    }

    pub fn rules(&self) -> &BusinessRules {
        &self.rules
    }

    /// Great-circle distance in km. Exact, deterministic, no external call.
    pub fn distance_km(&self, from: GeoPoint, to: GeoPoint) -> f64 {
        geo::haversine_km(from, to)
    }

    /// Closed-form leg estimate (degraded-mode baseline).
    pub fn fallback_leg(
        &self,
        from: GeoPoint,
        to: GeoPoint,
        mode: TravelMode,
        departure: Option<NaiveTime>,
    ) -> LegEstimate {
        LegEstimate {
            distance_m: geo::haversine_m(from, to),
            duration_minutes: geo::estimate_travel_minutes(from, to, mode, departure, &self.rules),
        }
    }

    /// Distance and travel duration for one leg.
    ///
    /// Tries the oracle first (cached, bounded retries, per-call timeout);
    /// on failure, timeout or cancellation returns the closed-form estimate
    /// instead of blocking or erroring.
    pub async fn travel_time(
        &self,
        from: GeoPoint,
        to: GeoPoint,
        mode: TravelMode,
        departure: Option<NaiveTime>,
        cancel: Option<&CancellationToken>,
    ) -> LegEstimate {
        if from.key() == to.key() {
            return LegEstimate { distance_m: 0, duration_minutes: 0 };
        }

        let key = (from.key(), to.key(), mode);
        if let Some(hit) = self.cache_lookup(&key) {
            return hit;
        }

        if let Some(oracle) = &self.oracle {
            if cancel.map_or(false, |c| c.is_cancelled()) {
                return self.fallback_leg(from, to, mode, departure);
            }

            for attempt in 1..=self.config.oracle_attempts {
                let permit = match self.semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };

                let call = tokio::time::timeout(
                    self.config.oracle_timeout,
                    oracle.leg(from, to, mode),
                );

                let outcome = if let Some(token) = cancel {
                    tokio::select! {
                        _ = token.cancelled() => {
                            drop(permit);
                            debug!("oracle call cancelled, using closed-form estimate");
                            return self.fallback_leg(from, to, mode, departure);
                        }
                        result = call => result,
                    }
                } else {
                    call.await
                };
                drop(permit);

                match outcome {
                    Ok(Ok(leg)) => {
                        self.cache_store(key, leg);
                        return leg;
                    }
                    Ok(Err(err)) => {
                        debug!(
                            "oracle {} attempt {}/{} failed: {}",
                            oracle.name(),
                            attempt,
                            self.config.oracle_attempts,
                            err
                        );
                    }
                    Err(_) => {
                        debug!(
                            "oracle {} attempt {}/{} timed out",
                            oracle.name(),
                            attempt,
                            self.config.oracle_attempts
                        );
                    }
                }
            }

            warn!(
                "oracle {} unavailable, degraded to closed-form travel estimates",
                oracle.name()
            );
        }

        self.fallback_leg(from, to, mode, departure)
    }

    fn cache_lookup(&self, key: &(String, String, TravelMode)) -> Option<LegEstimate> {
        let cache = self.cache.lock();
        cache.get(key).and_then(|entry| {
            if entry.inserted_at.elapsed() < self.config.cache_ttl {
                Some(entry.leg)
            } else {
                None
            }
        })
    }

    fn cache_store(&self, key: (String, String, TravelMode), leg: LegEstimate) {
        let mut cache = self.cache.lock();
        // Opportunistic cleanup so the map doesn't grow without bound.
        if cache.len() > 4096 {
            let ttl = self.config.cache_ttl;
            cache.retain(|_, e| e.inserted_at.elapsed() < ttl);
        }
        cache.insert(key, CacheEntry { leg, inserted_at: Instant::now() });
    }
}
