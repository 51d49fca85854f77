//! Reconciliation manager
//!
//! Keeps a [`HotSwapValidator`] on the latest patch of one `major.minor`
//! target. The manager loads the initial schema once (failure is fatal to the
//! caller), then polls its [`SchemaSource`] from a single background task and
//! swaps the validator whenever the registry reports a different version.
//!
//! Lifecycle: `Uninitialized -> Ready -> Polling -> Stopped`. Calling an
//! operation from the wrong state returns [`SchemaError::Lifecycle`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::{Result, SchemaError};
use crate::source::SchemaSource;
use crate::validator::HotSwapValidator;
use crate::version::SchemaTarget;

/// Default time between registry polls
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    pub target: SchemaTarget,
    pub polling_interval: Duration,
}

impl ManagerConfig {
    pub fn new(target: SchemaTarget) -> Self {
        Self {
            target,
            polling_interval: DEFAULT_POLLING_INTERVAL,
        }
    }

    pub fn with_polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = interval;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Uninitialized,
    Ready,
    Polling,
    Stopped,
}

impl fmt::Display for ManagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ManagerState::Uninitialized => "uninitialized",
            ManagerState::Ready => "ready",
            ManagerState::Polling => "polling",
            ManagerState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Result of one reconciliation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The installed version already matches the registry
    Unchanged { version: String },
    /// A new bundle was installed
    Swapped { from: String, to: String },
}

/// The part of the manager shared with the polling task
#[derive(Clone)]
struct Reconciler {
    target: SchemaTarget,
    source: Arc<dyn SchemaSource>,
    validator: Arc<HotSwapValidator>,
    /// Held for a whole fetch-and-install pass so passes never interleave
    pass: Arc<Mutex<()>>,
}

impl Reconciler {
    fn new(target: SchemaTarget, source: Arc<dyn SchemaSource>, validator: Arc<HotSwapValidator>) -> Self {
        Self {
            target,
            source,
            validator,
            pass: Arc::new(Mutex::new(())),
        }
    }

    async fn reconcile_once(&self) -> Result<ReconcileOutcome> {
        let _pass = self.pass.lock().await;
        let record = self.source.latest_patch(self.target).await?;

        let version = record.version();
        if !version.matches_target(&self.target) {
            return Err(SchemaError::TargetMismatch {
                target: self.target.to_string(),
                version: version.to_string(),
            });
        }
        if !record.verify_checksum() {
            return Err(SchemaError::ChecksumMismatch {
                version: version.to_string(),
                expected: record.metadata.checksum.to_string(),
                actual: crate::checksum::Checksum::from_bytes(&record.payload).to_string(),
            });
        }

        let latest = version.to_string();
        let current = self.validator.current_version();
        if latest == current {
            debug!(version = %latest, "Schema is up to date");
            return Ok(ReconcileOutcome::Unchanged { version: latest });
        }

        // Compiling a bundle is CPU-bound
        let validator = Arc::clone(&self.validator);
        let version = latest.clone();
        tokio::task::spawn_blocking(move || validator.update_schema(&record.payload, &version)).await??;
        info!(from = %current, to = %latest, schema_target = %self.target, "Schema updated");
        Ok(ReconcileOutcome::Swapped {
            from: current,
            to: latest,
        })
    }

    async fn run(self, period: Duration, mut stop: watch::Receiver<bool>) {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                // A dropped sender also ends the loop
                _ = stop.changed() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.reconcile_once().await {
                        warn!(schema_target = %self.target, error = %e, "Schema poll failed, keeping current validator");
                    }
                }
            }
        }
        debug!(schema_target = %self.target, "Schema polling stopped");
    }
}

struct Worker {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct Lifecycle {
    state: ManagerState,
    worker: Option<Worker>,
}

pub struct ReconciliationManager {
    config: ManagerConfig,
    reconciler: Reconciler,
    lifecycle: Mutex<Lifecycle>,
}

impl ReconciliationManager {
    /// Create a manager; nothing is fetched until [`Self::load_initial_schema`]
    pub fn new(
        config: ManagerConfig,
        source: Arc<dyn SchemaSource>,
        validator: Arc<HotSwapValidator>,
    ) -> Result<Self> {
        if config.polling_interval.is_zero() {
            return Err(SchemaError::InvalidArgument(
                "polling interval must be greater than zero".to_string(),
            ));
        }
        let reconciler = Reconciler::new(config.target, source, validator);
        Ok(Self {
            config,
            reconciler,
            lifecycle: Mutex::new(Lifecycle {
                state: ManagerState::Uninitialized,
                worker: None,
            }),
        })
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn validator(&self) -> &Arc<HotSwapValidator> {
        &self.reconciler.validator
    }

    pub async fn state(&self) -> ManagerState {
        self.lifecycle.lock().await.state
    }

    /// Fetch and install the latest patch for the target
    ///
    /// Only valid before anything else has happened. On failure the manager
    /// stays uninitialized and the error is returned to the caller.
    pub async fn load_initial_schema(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        expect_state(&lifecycle, ManagerState::Uninitialized, "load initial schema")?;

        let outcome = self.reconciler.reconcile_once().await?;
        let version = match outcome {
            ReconcileOutcome::Swapped { to, .. } => to,
            ReconcileOutcome::Unchanged { version } => version,
        };
        lifecycle.state = ManagerState::Ready;
        info!(version = %version, schema_target = %self.config.target, "Loaded initial schema");
        Ok(())
    }

    /// Spawn the polling task
    ///
    /// The first poll happens one interval after this call.
    pub async fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        expect_state(&lifecycle, ManagerState::Ready, "start polling")?;

        let (stop, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(
            self.reconciler
                .clone()
                .run(self.config.polling_interval, stop_rx),
        );
        lifecycle.worker = Some(Worker { stop, handle });
        lifecycle.state = ManagerState::Polling;
        info!(
            schema_target = %self.config.target,
            interval_secs = self.config.polling_interval.as_secs_f64(),
            "Started schema polling"
        );
        Ok(())
    }

    /// Run one reconciliation pass now
    ///
    /// Waits for a poll already in progress, so the two never install out of order.
    pub async fn reconcile_once(&self) -> Result<ReconcileOutcome> {
        self.reconciler.reconcile_once().await
    }

    /// Stop polling and wait for the task to exit
    ///
    /// A poll already in progress is allowed to finish. Calling `stop` on a
    /// stopped manager does nothing.
    pub async fn stop(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.state == ManagerState::Stopped {
            return Ok(());
        }

        let worker = lifecycle.worker.take();
        lifecycle.state = ManagerState::Stopped;
        if let Some(worker) = worker {
            // Err only means the task is already gone
            let _ = worker.stop.send(true);
            worker.handle.await?;
            info!(schema_target = %self.config.target, "Stopped schema polling");
        }
        Ok(())
    }
}

impl Drop for ReconciliationManager {
    fn drop(&mut self) {
        if let Some(worker) = self.lifecycle.get_mut().worker.take() {
            let _ = worker.stop.send(true);
        }
    }
}

fn expect_state(lifecycle: &Lifecycle, expected: ManagerState, operation: &'static str) -> Result<()> {
    if lifecycle.state != expected {
        return Err(SchemaError::Lifecycle {
            operation,
            state: lifecycle.state.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::registry::SchemaRegistry;
    use crate::schema::SchemaRecord;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TICK: Duration = Duration::from_millis(20);

    fn payload(required: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "files": [{
                "name": "user.json",
                "package": "user.v1",
                "messages": [{ "name": "User", "schema": { "type": "object", "required": [required] } }]
            }]
        }))
        .unwrap()
    }

    async fn registry_with(versions: &[&str]) -> SchemaRegistry {
        let registry = SchemaRegistry::in_memory();
        for v in versions {
            registry.register(v, payload("id")).await.unwrap();
        }
        registry
    }

    fn manager(source: Arc<dyn SchemaSource>) -> ReconciliationManager {
        let config = ManagerConfig::new(SchemaTarget::new(1, 0)).with_polling_interval(TICK);
        ReconciliationManager::new(config, source, Arc::new(HotSwapValidator::new())).unwrap()
    }

    /// Counts calls and fails the first `failures` of them
    struct FlakySource {
        inner: SchemaRegistry,
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SchemaSource for FlakySource {
        async fn latest_patch(&self, target: SchemaTarget) -> Result<SchemaRecord> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(SchemaError::Internal("registry unavailable".to_string()));
            }
            SchemaSource::latest_patch(&self.inner, target).await
        }
    }

    /// Stalls one call after the record has been fetched
    struct StallingSource {
        inner: SchemaRegistry,
        stall_call: usize,
        stall: Duration,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SchemaSource for StallingSource {
        async fn latest_patch(&self, target: SchemaTarget) -> Result<SchemaRecord> {
            let record = SchemaSource::latest_patch(&self.inner, target).await?;
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == self.stall_call {
                tokio::time::sleep(self.stall).await;
            }
            Ok(record)
        }
    }

    #[tokio::test]
    async fn test_initial_load() {
        let registry = registry_with(&["1.0.0"]).await;
        let manager = manager(Arc::new(registry));

        manager.load_initial_schema().await.unwrap();
        assert_eq!(manager.state().await, ManagerState::Ready);
        assert_eq!(manager.validator().current_version(), "1.0.0");
    }

    #[tokio::test]
    async fn test_initial_load_failure_is_returned() {
        let manager = manager(Arc::new(SchemaRegistry::in_memory()));
        let err = manager.load_initial_schema().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(manager.state().await, ManagerState::Uninitialized);
        assert_eq!(manager.validator().current_version(), "");
    }

    #[tokio::test]
    async fn test_lifecycle_misuse() {
        let registry = registry_with(&["1.0.0"]).await;
        let manager = manager(Arc::new(registry));

        assert_eq!(manager.start().await.unwrap_err().kind(), ErrorKind::FailedPrecondition);
        manager.load_initial_schema().await.unwrap();
        assert_eq!(
            manager.load_initial_schema().await.unwrap_err().kind(),
            ErrorKind::FailedPrecondition
        );
    }

    #[tokio::test]
    async fn test_reconcile_swaps_on_new_patch() {
        let registry = registry_with(&["1.0.0"]).await;
        let manager = manager(Arc::new(registry.clone()));
        manager.load_initial_schema().await.unwrap();

        assert_eq!(
            manager.reconcile_once().await.unwrap(),
            ReconcileOutcome::Unchanged { version: "1.0.0".to_string() }
        );

        registry.register("1.0.1", payload("email")).await.unwrap();
        // Other minor lines are ignored
        registry.register("1.1.0", payload("id")).await.unwrap();
        assert_eq!(
            manager.reconcile_once().await.unwrap(),
            ReconcileOutcome::Swapped {
                from: "1.0.0".to_string(),
                to: "1.0.1".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_invalid_patch_keeps_current_schema() {
        let registry = registry_with(&["1.0.0"]).await;
        let manager = manager(Arc::new(registry.clone()));
        manager.load_initial_schema().await.unwrap();

        registry.register("1.0.1", b"invalid schema data".to_vec()).await.unwrap();
        assert!(manager.reconcile_once().await.is_err());
        assert_eq!(manager.validator().current_version(), "1.0.0");
    }

    #[tokio::test]
    async fn test_polling_survives_errors_and_stop_joins() {
        let registry = registry_with(&["1.0.0"]).await;
        let source = Arc::new(FlakySource {
            inner: registry.clone(),
            failures: 0,
            calls: AtomicUsize::new(0),
        });
        let manager = manager(source.clone());
        manager.load_initial_schema().await.unwrap();
        manager.start().await.unwrap();
        assert_eq!(manager.state().await, ManagerState::Polling);

        registry.register("1.0.1", payload("email")).await.unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while manager.validator().current_version() != "1.0.1" {
            assert!(Instant::now() < deadline, "Validator never picked up 1.0.1");
            tokio::time::sleep(TICK / 2).await;
        }

        manager.stop().await.unwrap();
        assert_eq!(manager.state().await, ManagerState::Stopped);
        let calls = source.calls.load(Ordering::SeqCst);
        tokio::time::sleep(TICK * 5).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), calls);

        manager.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_transient_errors_do_not_stop_loop() {
        let registry = registry_with(&["1.0.0"]).await;
        let validator = Arc::new(HotSwapValidator::from_schema(&payload("id"), "1.0.0").unwrap());
        let source = Arc::new(FlakySource {
            inner: registry.clone(),
            failures: 3,
            calls: AtomicUsize::new(0),
        });
        registry.register("1.0.1", payload("email")).await.unwrap();

        let config = ManagerConfig::new(SchemaTarget::new(1, 0)).with_polling_interval(TICK);
        let manager = ReconciliationManager::new(config, source.clone(), validator.clone()).unwrap();
        // Bypass the initial load: the first three polls fail
        manager.lifecycle.lock().await.state = ManagerState::Ready;
        manager.start().await.unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while validator.current_version() != "1.0.1" {
            assert!(Instant::now() < deadline, "Polling stopped after errors");
            tokio::time::sleep(TICK / 2).await;
        }
        assert!(source.calls.load(Ordering::SeqCst) >= 4);
        manager.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_manual_pass_waits_for_poll_in_progress() {
        let registry = registry_with(&["1.0.0"]).await;
        let source = Arc::new(StallingSource {
            inner: registry.clone(),
            stall_call: 1,
            stall: Duration::from_millis(300),
            calls: AtomicUsize::new(0),
        });
        let manager = manager(source.clone());
        manager.load_initial_schema().await.unwrap();

        registry.register("1.0.1", payload("email")).await.unwrap();
        manager.start().await.unwrap();

        // The first poll has fetched 1.0.1 and is now stalled before installing it
        let deadline = Instant::now() + Duration::from_secs(5);
        while source.calls.load(Ordering::SeqCst) < 2 {
            assert!(Instant::now() < deadline, "Poll never started");
            tokio::time::sleep(TICK / 4).await;
        }

        registry.register("1.0.2", payload("id")).await.unwrap();
        assert_eq!(
            manager.reconcile_once().await.unwrap(),
            ReconcileOutcome::Swapped {
                from: "1.0.1".to_string(),
                to: "1.0.2".to_string()
            }
        );

        manager.stop().await.unwrap();
        assert_eq!(manager.validator().current_version(), "1.0.2");
    }

    #[tokio::test]
    async fn test_stop_before_start() {
        let manager = manager(Arc::new(SchemaRegistry::in_memory()));
        manager.stop().await.unwrap();
        assert_eq!(manager.state().await, ManagerState::Stopped);
        assert_eq!(manager.start().await.unwrap_err().kind(), ErrorKind::FailedPrecondition);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = ManagerConfig::new(SchemaTarget::new(1, 0)).with_polling_interval(Duration::ZERO);
        let result = ReconciliationManager::new(
            config,
            Arc::new(SchemaRegistry::in_memory()),
            Arc::new(HotSwapValidator::new()),
        );
        assert!(result.is_err());
    }
}
