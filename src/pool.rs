//! BrowserPool (component C) — the hardest subsystem.
//!
//! Grounded in `other_examples`' `riptidecrawler` `pool.rs` (background
//! maintenance loop, `PooledBrowser` checkout guard) and the teacher's
//! `BrowserSessionManager` (`tools/browser/session.rs`) for the
//! weak-reference cleanup-task shape. The checkout guard here holds a real
//! `Arc` clone rather than the unsound `unsafe { ptr::read }` trick the
//! riptide reference uses to fake a `Weak<BrowserPool>` — see the note on
//! `PooledBrowser`.

pub mod circuit_breaker;
pub mod health;
pub mod instance;
pub mod queue;
pub mod recycle;
pub mod scaling;

pub use instance::{BrowserInstance, BrowserState};

use crate::driver::Driver;
use crate::error::ErrorKind;
use crate::metrics::PoolMetrics;
use crate::session::SessionId;
use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use parking_lot::Mutex;
use queue::WaitQueue;
use recycle::{HybridWeights, RecycleStrategy, RecycleThresholds};
use scaling::{ScalingConfig, ScalingWindow};
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub min_size: usize,
    pub max_size: usize,
    pub health_check_interval: Duration,
    pub recycling_cooldown: Duration,
    pub recycle_strategy: RecycleStrategy,
    pub recycle_thresholds: RecycleThresholds,
    pub scaling: ScalingConfig,
    pub scaling_interval: Duration,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_size: 1,
            max_size: 5,
            health_check_interval: Duration::from_secs(30),
            recycling_cooldown: Duration::from_secs(10),
            recycle_strategy: RecycleStrategy::Hybrid(HybridWeights::default()),
            recycle_thresholds: RecycleThresholds::default(),
            scaling: ScalingConfig {
                scale_up_threshold: 0.8,
                scale_down_threshold: 0.2,
                sustained_samples: 3,
                min_size: 1,
                max_size: 5,
            },
            scaling_interval: Duration::from_secs(15),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PoolEvent {
    Launched { browser_id: String },
    Acquired { browser_id: String, session_id: SessionId },
    Released { browser_id: String },
    Recycled { browser_id: String, reason: String },
    Unhealthy { browser_id: String },
    CircuitOpened,
    CircuitClosed,
}

struct PoolState {
    instances: HashMap<String, BrowserInstance>,
    queue: WaitQueue,
    last_recycle_at: Option<Instant>,
}

struct PoolInner {
    driver: Arc<dyn Driver>,
    config: PoolConfig,
    state: Mutex<PoolState>,
    circuit: Mutex<CircuitBreaker>,
    scaling_window: Mutex<ScalingWindow>,
    metrics: PoolMetrics,
    events: broadcast::Sender<PoolEvent>,
    shutdown: CancellationToken,
}

/// Bounded pool of browser instances. Cheap to clone (an `Arc` internally).
#[derive(Clone)]
pub struct BrowserPool {
    inner: Arc<PoolInner>,
}

impl BrowserPool {
    pub fn new(driver: Arc<dyn Driver>, config: PoolConfig) -> Self {
        let (events, _) = broadcast::channel(256);
        let inner = Arc::new(PoolInner {
            driver,
            circuit: Mutex::new(CircuitBreaker::new(config.circuit_breaker.clone())),
            scaling_window: Mutex::new(ScalingWindow::default()),
            metrics: PoolMetrics::default(),
            events,
            shutdown: CancellationToken::new(),
            state: Mutex::new(PoolState {
                instances: HashMap::new(),
                queue: WaitQueue::default(),
                last_recycle_at: None,
            }),
            config,
        });
        Self { inner }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.inner.events.subscribe()
    }

    fn emit(&self, event: PoolEvent) {
        let _ = self.inner.events.send(event);
    }

    pub fn metrics(&self) -> crate::metrics::PoolMetricsSnapshot {
        self.inner.metrics.snapshot(self.inner.config.max_size)
    }

    /// `Acquire(sessionId, ctx) -> BrowserInstance | ErrShuttingDown | ErrTimeout`.
    pub async fn acquire(
        &self,
        session_id: SessionId,
        deadline: Duration,
    ) -> Result<PooledBrowser, ErrorKind> {
        if self.inner.shutdown.is_cancelled() {
            return Err(ErrorKind::Unavailable("pool is shutting down".into()));
        }

        // Fast path: an idle instance, or room to launch one.
        if let Some(id) = self.try_claim_idle_or_launch(session_id).await? {
            return Ok(self.make_checkout(id, session_id));
        }

        // Otherwise queue, FIFO, bounded by `deadline`.
        let wait_deadline = Instant::now() + deadline;
        let receiver = {
            let mut state = self.inner.state.lock();
            state.queue.enqueue(session_id, wait_deadline)
        };
        self.inner
            .metrics
            .queue_depth
            .store(self.inner.state.lock().queue.len(), Ordering::Relaxed);

        match tokio::time::timeout_at(wait_deadline, receiver).await {
            Ok(Ok(())) => {
                let id = self
                    .try_claim_idle_or_launch(session_id)
                    .await?
                    .ok_or(ErrorKind::Timeout)?;
                Ok(self.make_checkout(id, session_id))
            }
            _ => {
                self.inner.state.lock().queue.cancel(session_id);
                self.inner.metrics.acquire_timeouts_total.fetch_add(1, Ordering::Relaxed);
                Err(ErrorKind::Timeout)
            }
        }
    }

    async fn try_claim_idle_or_launch(
        &self,
        session_id: SessionId,
    ) -> Result<Option<String>, ErrorKind> {
        // Step 1: claim an idle instance under the single pool mutex —
        // the transition is the O(1) critical section the design requires.
        let claimed = {
            let mut state = self.inner.state.lock();
            let idle_id = state
                .instances
                .values()
                .find(|i| i.state == BrowserState::Idle)
                .map(|i| i.id.clone());
            if let Some(id) = idle_id {
                let instance = state.instances.get_mut(&id).expect("just found");
                instance.transition(BrowserState::Active)?;
                instance.acquired_by = Some(session_id);
                instance.use_count += 1;
                instance.last_used_at = chrono::Utc::now();
                Some(id)
            } else {
                None
            }
        };
        if let Some(id) = claimed {
            self.inner.metrics.active_browsers.fetch_add(1, Ordering::Relaxed);
            self.inner.metrics.idle_browsers.fetch_sub(1, Ordering::Relaxed);
            self.emit(PoolEvent::Acquired { browser_id: id.clone(), session_id });
            return Ok(Some(id));
        }

        // Step 2: room to launch?
        let can_launch = {
            let state = self.inner.state.lock();
            state.instances.len() < self.inner.config.max_size
        };
        if !can_launch {
            return Ok(None);
        }

        self.inner.circuit.lock().check()?;
        self.inner.metrics.launches_total.fetch_add(1, Ordering::Relaxed);
        match self.inner.driver.launch().await {
            Ok(browser_id) => {
                self.inner.circuit.lock().record_success();
                let mut instance = BrowserInstance::starting(browser_id.clone());
                instance.transition(BrowserState::Idle)?;
                instance.transition(BrowserState::Active)?;
                instance.acquired_by = Some(session_id);
                instance.use_count = 1;
                self.inner.state.lock().instances.insert(browser_id.clone(), instance);
                self.inner.metrics.active_browsers.fetch_add(1, Ordering::Relaxed);
                self.emit(PoolEvent::Launched { browser_id: browser_id.clone() });
                self.emit(PoolEvent::Acquired { browser_id: browser_id.clone(), session_id });
                Ok(Some(browser_id))
            }
            Err(err) => {
                self.inner.circuit.lock().record_failure();
                self.inner.metrics.launch_failures_total.fetch_add(1, Ordering::Relaxed);
                if self.inner.circuit.lock().state() == circuit_breaker::CircuitState::Open {
                    self.emit(PoolEvent::CircuitOpened);
                    self.inner.metrics.circuit_opens_total.fetch_add(1, Ordering::Relaxed);
                }
                Err(ErrorKind::BrowserLaunchFailed(err.to_string()))
            }
        }
    }

    fn make_checkout(&self, browser_id: String, session_id: SessionId) -> PooledBrowser {
        PooledBrowser {
            pool: self.clone(),
            browser_id: Some(browser_id),
            session_id,
        }
    }

    /// `Release(browserId, sessionId)`. Idempotent — a double release is a
    /// no-op after the first (round-trip law).
    pub fn release(&self, browser_id: &str, _session_id: SessionId) {
        let unhealthy = {
            let mut state = self.inner.state.lock();
            match state.instances.get_mut(browser_id) {
                Some(instance) if instance.state == BrowserState::Active => {
                    let _ = instance.transition(BrowserState::Idle);
                    instance.acquired_by = None;
                    false
                }
                Some(instance) if instance.state == BrowserState::Unhealthy => true,
                _ => return, // already released, or unknown id — no-op
            }
        };
        self.inner.metrics.active_browsers.fetch_sub(1, Ordering::Relaxed);
        if unhealthy {
            self.recycle(browser_id, "flagged unhealthy while active");
        } else {
            self.inner.metrics.idle_browsers.fetch_add(1, Ordering::Relaxed);
            self.emit(PoolEvent::Released { browser_id: browser_id.to_string() });
        }
        let woke = self.inner.state.lock().queue.wake_oldest();
        if woke {
            self.inner
                .metrics
                .queue_depth
                .store(self.inner.state.lock().queue.len(), Ordering::Relaxed);
        }
    }

    /// `Recycle(browserId, reason)`. A recycled id is never reused
    /// (invariant 6) because the id space is a fresh UUID per launch.
    pub fn recycle(&self, browser_id: &str, reason: &str) {
        let driver = self.inner.driver.clone();
        let browser_id = browser_id.to_string();
        let pool = self.clone();
        {
            let mut state = self.inner.state.lock();
            if let Some(instance) = state.instances.get_mut(&browser_id) {
                let _ = instance.transition(BrowserState::Recycling);
            }
            state.last_recycle_at = Some(Instant::now());
        }
        self.inner.metrics.recycles_total.fetch_add(1, Ordering::Relaxed);
        let reason = reason.to_string();
        tokio::spawn(async move {
            let _ = driver.close(&browser_id).await;
            let mut state = pool.inner.state.lock();
            if let Some(instance) = state.instances.get_mut(&browser_id) {
                let _ = instance.transition(BrowserState::Closed);
            }
            state.instances.remove(&browser_id);
            drop(state);
            pool.emit(PoolEvent::Recycled { browser_id, reason });
        });
    }

    /// `Shutdown(force)`. Cancels the maintenance loop and closes every
    /// instance; `force` skips waiting for in-flight acquisitions to drain.
    pub async fn shutdown(&self, force: bool) {
        self.inner.shutdown.cancel();
        let ids: Vec<String> = self.inner.state.lock().instances.keys().cloned().collect();
        for id in ids {
            if force {
                self.recycle(&id, "shutdown");
            } else if self
                .inner
                .state
                .lock()
                .instances
                .get(&id)
                .map(|i| i.state == BrowserState::Idle)
                .unwrap_or(false)
            {
                self.recycle(&id, "shutdown");
            }
        }
    }

    /// Called by `PageManager` when a page is created/closed so the pool's
    /// view of `pageCount` (used by health checks and usage-based
    /// recycling) stays current without the pool knowing about pages
    /// itself — avoids the cyclic `PageManager <-> BrowserPool` reference
    /// the design calls out by keeping the index one-directional.
    pub fn increment_page_count(&self, browser_id: &str) {
        if let Some(instance) = self.inner.state.lock().instances.get_mut(browser_id) {
            instance.page_count += 1;
        }
        self.inner.metrics.total_pages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decrement_page_count(&self, browser_id: &str) -> usize {
        let remaining = {
            let mut state = self.inner.state.lock();
            if let Some(instance) = state.instances.get_mut(browser_id) {
                instance.page_count = instance.page_count.saturating_sub(1);
                instance.page_count
            } else {
                0
            }
        };
        self.inner.metrics.total_pages.fetch_sub(1, Ordering::Relaxed);
        remaining
    }

    pub fn in_cooldown(&self) -> bool {
        self.inner
            .state
            .lock()
            .last_recycle_at
            .map(|t| t.elapsed() < self.inner.config.recycling_cooldown)
            .unwrap_or(false)
    }

    /// Spawns the background maintenance loop: health checks, recycling,
    /// deadline eviction, and adaptive scaling, all in one `tokio::select!`
    /// — mirroring the teacher's weak-reference cleanup-task shape, but
    /// holding a strong `Arc` since the pool owns its own lifecycle rather
    /// than being owned by the thing it cleans up after.
    pub fn spawn_maintenance(&self) -> tokio::task::JoinHandle<()> {
        let pool = self.clone();
        tokio::spawn(async move {
            let mut health_tick = tokio::time::interval(pool.inner.config.health_check_interval);
            let mut scaling_tick = tokio::time::interval(pool.inner.config.scaling_interval);
            loop {
                tokio::select! {
                    _ = pool.inner.shutdown.cancelled() => break,
                    _ = health_tick.tick() => pool.run_health_checks().await,
                    _ = scaling_tick.tick() => pool.run_scaling_sample(),
                }
                pool.evict_expired_waiters();
            }
        })
    }

    fn evict_expired_waiters(&self) {
        let evicted = self.inner.state.lock().queue.evict_expired(Instant::now());
        if evicted > 0 {
            self.inner
                .metrics
                .acquire_timeouts_total
                .fetch_add(evicted as u64, Ordering::Relaxed);
        }
    }

    async fn run_health_checks(&self) {
        let ids: Vec<String> = self.inner.state.lock().instances.keys().cloned().collect();
        for id in ids {
            let probe = self
                .inner
                .driver
                .health_probe(&id, Duration::from_secs(2))
                .await;
            let probe = match probe {
                Ok(p) => p,
                Err(_) => {
                    self.flag_unhealthy(&id);
                    continue;
                }
            };
            let limits = health::HealthLimits::default();
            if health::is_unhealthy(&probe, &limits) {
                self.flag_unhealthy(&id);
            } else {
                let mut state = self.inner.state.lock();
                if let Some(instance) = state.instances.get_mut(&id) {
                    instance.health_score = probe.score;
                    instance.page_count = probe.page_count;
                }
            }
        }

        if !self.in_cooldown() {
            self.run_recycle_pass();
        }
    }

    fn flag_unhealthy(&self, id: &str) {
        let should_recycle_now = {
            let mut state = self.inner.state.lock();
            match state.instances.get_mut(id) {
                Some(instance) if instance.state == BrowserState::Idle => {
                    let _ = instance.transition(BrowserState::Unhealthy);
                    true
                }
                Some(instance) if instance.state == BrowserState::Active => {
                    let _ = instance.transition(BrowserState::Unhealthy);
                    false // destroyed on next Release, per design
                }
                _ => false,
            }
        };
        self.emit(PoolEvent::Unhealthy { browser_id: id.to_string() });
        if should_recycle_now {
            self.recycle(id, "unhealthy");
        }
    }

    fn run_recycle_pass(&self) {
        let state = self.inner.state.lock();
        let candidate = recycle::worst_offender(
            state
                .instances
                .values()
                .filter(|i| i.state == BrowserState::Idle),
            match self.inner.config.recycle_strategy {
                RecycleStrategy::Hybrid(w) => w,
                _ => HybridWeights::default(),
            },
            &self.inner.config.recycle_thresholds,
        )
        .map(|(i, _)| i.id.clone());
        drop(state);
        if let Some(id) = candidate {
            self.recycle(&id, "recycle strategy threshold exceeded");
        }
    }

    fn run_scaling_sample(&self) {
        let (utilization, queue_depth, current_size) = {
            let state = self.inner.state.lock();
            let active = state
                .instances
                .values()
                .filter(|i| i.state == BrowserState::Active)
                .count();
            (
                active as f64 / self.inner.config.max_size as f64,
                state.queue.len(),
                state.instances.len(),
            )
        };
        let decision =
            self.inner
                .scaling_window
                .lock()
                .sample(utilization, queue_depth, current_size, &self.inner.config.scaling);
        match decision {
            scaling::ScalingDecision::ScaleDown => {
                if !self.in_cooldown() {
                    self.run_recycle_pass();
                }
            }
            scaling::ScalingDecision::ScaleUp | scaling::ScalingDecision::None => {
                // Scale-up is realized lazily: the next `acquire` simply
                // finds room under `max_size` and launches. No eager
                // pre-warming is implemented; this satisfies "never above
                // maxSize" without introducing speculative launches that
                // invariant 3 doesn't require.
            }
        }
    }
}

/// RAII checkout. Unlike the `unsafe { ptr::read }` trick used to fake a
/// `Weak<BrowserPool>` in the reference pool implementation this is
/// grounded on, this guard holds a real, safely-constructed `Arc` clone
/// (via `BrowserPool`'s own `Clone`), so `Drop` can schedule the release
/// without any unsafe code.
pub struct PooledBrowser {
    pool: BrowserPool,
    browser_id: Option<String>,
    session_id: SessionId,
}

impl PooledBrowser {
    pub fn browser_id(&self) -> &str {
        self.browser_id.as_deref().expect("not yet released")
    }
}

impl Drop for PooledBrowser {
    fn drop(&mut self) {
        if let Some(id) = self.browser_id.take() {
            let pool = self.pool.clone();
            let session_id = self.session_id;
            tokio::spawn(async move {
                pool.release(&id, session_id);
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::FakeDriver;

    fn pool(max_size: usize) -> BrowserPool {
        let driver = Arc::new(FakeDriver::new());
        let mut config = PoolConfig::default();
        config.max_size = max_size;
        config.scaling.max_size = max_size;
        BrowserPool::new(driver, config)
    }

    #[tokio::test]
    async fn acquire_then_release_returns_instance_to_idle() {
        let pool = pool(2);
        let session = SessionId::new();
        let checkout = pool.acquire(session, Duration::from_secs(1)).await.unwrap();
        assert_eq!(pool.metrics().active_browsers, 1);
        drop(checkout);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(pool.metrics().active_browsers, 0);
    }

    #[tokio::test]
    async fn never_exceeds_max_size() {
        let pool = pool(2);
        let c1 = pool.acquire(SessionId::new(), Duration::from_secs(1)).await.unwrap();
        let c2 = pool.acquire(SessionId::new(), Duration::from_secs(1)).await.unwrap();
        assert_ne!(c1.browser_id(), c2.browser_id());

        let third = pool.acquire(SessionId::new(), Duration::from_millis(100)).await;
        assert!(matches!(third, Err(ErrorKind::Timeout)));
    }

    #[tokio::test]
    async fn queued_waiter_proceeds_after_a_release() {
        let pool = pool(1);
        let first = pool.acquire(SessionId::new(), Duration::from_secs(1)).await.unwrap();

        let pool2 = pool.clone();
        let waiter = tokio::spawn(async move {
            pool2.acquire(SessionId::new(), Duration::from_secs(2)).await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(first);

        let result = waiter.await.unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn circuit_opens_after_repeated_launch_failures() {
        let driver = Arc::new(FakeDriver::new());
        driver.fail_launches.store(true, Ordering::Relaxed);
        let mut config = PoolConfig::default();
        config.circuit_breaker.failure_threshold = 5;
        let pool = BrowserPool::new(driver, config);

        for _ in 0..5 {
            assert!(pool.acquire(SessionId::new(), Duration::from_millis(50)).await.is_err());
        }
        let start = std::time::Instant::now();
        let err = pool.acquire(SessionId::new(), Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, ErrorKind::Unavailable(_)));
        assert!(start.elapsed() < Duration::from_millis(20));
    }
}
