//! Dynamic job scheduling driven by externally-mutable configuration
//!
//! The [`JobScheduler`] reconciles live jobs against the config source on a
//! fixed period: jobs start, stop, and restart in place as configuration
//! changes, without restarting the process. Each active job key owns one
//! lightweight task with a self-re-arming timer; a tick that fires while
//! the previous execution is still running is suppressed, never queued.
//!
//! Per-cycle flow: rate-limit check (a denial is a planned skip, not a
//! failure) → attempt timestamp → behavior fetch → publish each record →
//! success/failure bookkeeping. Reaching the consecutive-failure threshold
//! stops the job's timer immediately; the job stays out of scheduling
//! until an operator resets its failure count.
//!
//! Nothing escapes a job execution: every failure is caught at the cycle
//! boundary and recorded, so one misbehaving source cannot crash the
//! process or starve other jobs.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::behavior::BehaviorRegistry;
use super::error::SchedulerError;
use crate::error::Error;
use crate::limiter::RateLimiter;
use crate::models::JobConfig;
use crate::publish::Publisher;
use crate::sources::ConfigSource;
use crate::state::StateStore;

/// Scheduler tuning knobs
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// How often to reconcile running jobs against the config source
    pub reconcile_interval: Duration,

    /// Floor applied to per-job polling intervals
    pub min_poll_interval_secs: u64,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            reconcile_interval: Duration::from_secs(30),
            min_poll_interval_secs: 30,
        }
    }
}

impl SchedulerOptions {
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.reconcile_interval.is_zero() {
            return Err(SchedulerError::invalid_option(
                "reconcile_interval",
                "must be positive",
            ));
        }
        Ok(())
    }
}

/// Outcome of one job execution
enum CycleOutcome {
    /// Cycle ran (successfully or not) and the job keeps its timer
    Completed,
    /// Cycle was suppressed (rate limit, reentrancy, shutdown)
    Skipped,
    /// Failure threshold reached; the job's timer must stop
    Disabled,
}

/// Runtime entry for one active job key
struct JobHandle {
    config: JobConfig,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

struct SchedulerInner {
    configs: Arc<dyn ConfigSource>,
    state: Arc<dyn StateStore>,
    limiter: Arc<dyn RateLimiter>,
    publisher: Arc<dyn Publisher>,
    registry: BehaviorRegistry,
    options: SchedulerOptions,

    /// All live job handles, keyed by job key. Only reconciliation and
    /// shutdown mutate this map.
    jobs: Mutex<HashMap<String, JobHandle>>,

    /// Keys with an execution currently in flight
    in_flight: StdMutex<HashSet<String>>,

    shutting_down: AtomicBool,
}

/// Orchestrates polling jobs: reconciliation, timers, rate limiting,
/// circuit breaking, and record publishing
pub struct JobScheduler {
    inner: Arc<SchedulerInner>,
    shutdown_tx: watch::Sender<bool>,
    reconcile_task: Mutex<Option<JoinHandle<()>>>,
}

impl JobScheduler {
    pub fn new(
        configs: Arc<dyn ConfigSource>,
        state: Arc<dyn StateStore>,
        limiter: Arc<dyn RateLimiter>,
        publisher: Arc<dyn Publisher>,
        registry: BehaviorRegistry,
        options: SchedulerOptions,
    ) -> Result<Self, SchedulerError> {
        options.validate()?;

        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            inner: Arc::new(SchedulerInner {
                configs,
                state,
                limiter,
                publisher,
                registry,
                options,
                jobs: Mutex::new(HashMap::new()),
                in_flight: StdMutex::new(HashSet::new()),
                shutting_down: AtomicBool::new(false),
            }),
            shutdown_tx,
            reconcile_task: Mutex::new(None),
        })
    }

    /// Perform an initial reconciliation and start the periodic
    /// reconciliation loop
    pub async fn start(&self) -> Result<(), SchedulerError> {
        let mut guard = self.reconcile_task.lock().await;
        if guard.is_some() {
            return Err(SchedulerError::AlreadyRunning);
        }

        info!(
            reconcile_interval_secs = self.inner.options.reconcile_interval.as_secs(),
            "Scheduler starting"
        );
        self.inner.reconcile().await;

        let inner = Arc::clone(&self.inner);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(inner.options.reconcile_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The immediate first tick is consumed here; the initial
            // reconciliation already ran in start()
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        inner.reconcile().await;
                    }
                }
            }
        });
        *guard = Some(handle);

        Ok(())
    }

    /// Stop reconciliation and every job timer; in-flight executions are
    /// allowed to finish before this returns
    pub async fn stop(&self) {
        self.inner.shutting_down.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(true);

        if let Some(handle) = self.reconcile_task.lock().await.take() {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    warn!("Reconciliation task panicked during shutdown");
                }
            }
        }

        self.inner.stop_all_jobs().await;
        info!("Scheduler stopped");
    }

    /// Run one reconciliation immediately, outside the periodic loop
    pub async fn reconcile_now(&self) {
        self.inner.reconcile().await;
    }

    /// Keys of currently active jobs, sorted
    pub async fn active_jobs(&self) -> Vec<String> {
        let jobs = self.inner.jobs.lock().await;
        let mut keys: Vec<String> = jobs.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl SchedulerInner {
    fn shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Align running jobs with the current set of enabled configs
    async fn reconcile(self: &Arc<Self>) {
        let configs = match self.configs.list_enabled_configs().await {
            Ok(configs) => configs,
            Err(e) => {
                // Transient by policy: keep whatever is already running
                warn!(error = %e, "Config listing failed, keeping current jobs");
                return;
            }
        };

        debug!(configs = configs.len(), "Reconciling jobs");
        let mut desired: HashSet<String> = HashSet::new();

        for config in configs {
            let key = config.job_key();
            if !desired.insert(key.clone()) {
                warn!(job = %key, "Duplicate config for job key, ignoring");
                continue;
            }

            let tripped = self
                .state
                .should_disable(
                    &config.tenant_id,
                    &config.source_type,
                    &config.instance_url,
                    config.max_failures_before_disable,
                )
                .await;
            if tripped {
                if self.stop_job(&key).await {
                    info!(job = %key, "Stopped job with tripped circuit breaker");
                } else {
                    debug!(job = %key, "Skipping job with tripped circuit breaker");
                }
                continue;
            }

            enum Action {
                Start,
                Restart,
                Keep,
            }

            let action = {
                let jobs = self.jobs.lock().await;
                match jobs.get(&key) {
                    Some(handle) if handle.config.requires_restart(&config) => Action::Restart,
                    // A finished task means the job disabled itself; the
                    // breaker check above passed, so it was reset
                    Some(handle) if handle.task.is_finished() => Action::Restart,
                    Some(_) => Action::Keep,
                    None => Action::Start,
                }
            };

            match action {
                Action::Start => self.start_job(config).await,
                Action::Restart => {
                    info!(job = %key, "Configuration changed, restarting job");
                    self.stop_job(&key).await;
                    self.start_job(config).await;
                }
                Action::Keep => {}
            }
        }

        let stale: Vec<String> = {
            let jobs = self.jobs.lock().await;
            jobs.keys()
                .filter(|key| !desired.contains(*key))
                .cloned()
                .collect()
        };
        for key in stale {
            if self.stop_job(&key).await {
                info!(job = %key, "Stopped job no longer enabled");
            }
        }
    }

    /// Spawn the self-re-arming timer task for one job. The first poll
    /// runs immediately; later polls follow the job's interval. Missed
    /// ticks are skipped, never backlogged.
    async fn start_job(self: &Arc<Self>, config: JobConfig) {
        let key = config.job_key();
        let interval = config.effective_interval(self.options.min_poll_interval_secs);
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let inner = Arc::clone(self);
        let task_config = config.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {
                        if *stop_rx.borrow() {
                            break;
                        }
                        if let CycleOutcome::Disabled = inner.execute_job(&task_config).await {
                            break;
                        }
                    }
                }
            }
        });

        info!(
            job = %key,
            interval_secs = interval.as_secs(),
            "Started polling job"
        );
        self.jobs.lock().await.insert(
            key,
            JobHandle {
                config,
                stop_tx,
                task,
            },
        );
    }

    /// Cancel a job's timer and wait for any in-flight execution to
    /// finish. Returns false when no such job was running.
    async fn stop_job(&self, key: &str) -> bool {
        let handle = self.jobs.lock().await.remove(key);
        let Some(handle) = handle else {
            return false;
        };

        let _ = handle.stop_tx.send(true);
        if let Err(e) = handle.task.await {
            if e.is_panic() {
                warn!(job = %key, "Job task panicked");
            }
        }
        true
    }

    async fn stop_all_jobs(&self) {
        let keys: Vec<String> = {
            let jobs = self.jobs.lock().await;
            jobs.keys().cloned().collect()
        };
        futures::future::join_all(keys.iter().map(|key| self.stop_job(key))).await;
    }

    /// One timer fire: reentrancy guard around the actual cycle
    async fn execute_job(&self, config: &JobConfig) -> CycleOutcome {
        if self.shutting_down() {
            return CycleOutcome::Skipped;
        }

        let key = config.job_key();
        {
            let mut in_flight = self
                .in_flight
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if !in_flight.insert(key.clone()) {
                debug!(job = %key, "Previous execution still running, skipping tick");
                return CycleOutcome::Skipped;
            }
        }

        let outcome = self.run_cycle(config).await;

        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&key);

        outcome
    }

    /// One full poll cycle: rate limit → attempt → fetch → publish →
    /// success/failure bookkeeping
    async fn run_cycle(&self, config: &JobConfig) -> CycleOutcome {
        let key = config.job_key();
        let correlation_id = Uuid::new_v4().to_string();
        let rate_key = config.rate_limit_key();

        let minute_ok = self
            .limiter
            .is_allowed(&rate_key, 60, config.requests_per_minute)
            .await;
        if !minute_ok {
            debug!(
                correlation_id = %correlation_id,
                job = %key,
                "Per-minute rate limit reached, skipping cycle"
            );
            return CycleOutcome::Skipped;
        }
        let hour_ok = self
            .limiter
            .is_allowed(&rate_key, 3600, config.requests_per_hour)
            .await;
        if !hour_ok {
            debug!(
                correlation_id = %correlation_id,
                job = %key,
                "Per-hour rate limit reached, skipping cycle"
            );
            return CycleOutcome::Skipped;
        }

        self.state
            .record_attempt(&config.tenant_id, &config.source_type, &config.instance_url)
            .await;

        let since = self
            .state
            .get_state(&config.tenant_id, &config.source_type, &config.instance_url)
            .await
            .last_successful_poll;

        let behavior = self.registry.get(&config.source_type);
        debug!(
            correlation_id = %correlation_id,
            job = %key,
            behavior = behavior.display_name(),
            since = ?since,
            "Poll cycle started"
        );

        let result = async {
            let outcome = behavior
                .fetch(config, since, &correlation_id)
                .await
                .map_err(Error::from)?;
            for record in &outcome.records {
                self.publisher
                    .publish(record, config, &correlation_id)
                    .await?;
            }
            Ok::<_, Error>(outcome)
        }
        .await;

        match result {
            Ok(outcome) => {
                self.state
                    .record_success(&config.tenant_id, &config.source_type, &config.instance_url)
                    .await;
                info!(
                    correlation_id = %correlation_id,
                    job = %key,
                    records = outcome.records.len(),
                    pages = outcome.pages_processed,
                    has_more = outcome.has_more,
                    "Poll cycle completed"
                );
                CycleOutcome::Completed
            }
            Err(e) => {
                error!(
                    correlation_id = %correlation_id,
                    job = %key,
                    error = %e,
                    "Poll cycle failed"
                );
                let disable = self
                    .state
                    .record_failure(
                        &config.tenant_id,
                        &config.source_type,
                        &config.instance_url,
                        &e.to_string(),
                        config.max_failures_before_disable,
                    )
                    .await;
                if disable {
                    warn!(
                        correlation_id = %correlation_id,
                        job = %key,
                        max_failures = config.max_failures_before_disable,
                        "Failure threshold reached, disabling job"
                    );
                    CycleOutcome::Disabled
                } else {
                    CycleOutcome::Completed
                }
            }
        }
    }
}
