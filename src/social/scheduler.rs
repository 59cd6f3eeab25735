//! Social scheduler
//!
//! Polls every enabled social source on its own interval. A sync run scrapes
//! the source, stores the posts, promotes new ones to news when the source
//! asks for it and writes the outcome back to the source row.
//!
//! Runs of one source never overlap: each source has a run guard. A manual
//! trigger that finds the guard taken fails with
//! [`SchedulerError::AlreadyRunning`]; a scheduled tick is skipped.
//!
//! A scheduled run is spawned as its own task, apart from the job's ticker
//! task. Stopping the scheduler or reloading a source aborts the ticker only.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::converter::{ConvertError, PostConverter};
use super::scrapers::ScraperRegistry;
use crate::db::repositories::{SocialPostRepository, SocialSourceRepository};
use crate::models::{clamp_interval, SocialPlatform, SocialSource, SyncState, SyncStatus};

/// Error types for scheduler operations
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Social source not found: {0}")]
    NotFound(i64),

    #[error("A sync of source {0} is already in progress")]
    AlreadyRunning(i64),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// What started a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncTrigger {
    Scheduled,
    Manual,
}

/// Outcome of one sync run
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub source_id: i64,
    pub trigger: SyncTrigger,
    pub status: SyncStatus,
    /// Posts returned by the scraper
    pub found: i64,
    /// Posts stored for the first time
    pub created: i64,
    /// Posts promoted to news
    pub converted: i64,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub source_id: i64,
    pub name: String,
    pub platform: SocialPlatform,
    pub interval_minutes: i64,
    pub in_progress: bool,
    pub next_run_at: DateTime<Utc>,
    pub last_run: Option<SyncReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub jobs: Vec<JobStatus>,
}

struct SourceJob {
    name: String,
    platform: SocialPlatform,
    interval_minutes: i64,
    scheduled_at: DateTime<Utc>,
    handle: JoinHandle<()>,
}

/// Next tick of an interval whose first tick is one period after
/// `scheduled_at`
fn next_tick(scheduled_at: DateTime<Utc>, interval_minutes: i64, now: DateTime<Utc>) -> DateTime<Utc> {
    let period = chrono::Duration::minutes(clamp_interval(interval_minutes));
    let elapsed = (now - scheduled_at).num_seconds().max(0);
    let ticks = elapsed / period.num_seconds() + 1;
    scheduled_at + chrono::Duration::seconds(period.num_seconds() * ticks)
}

#[derive(Default)]
struct SchedulerState {
    running: bool,
    started_at: Option<DateTime<Utc>>,
    jobs: HashMap<i64, SourceJob>,
}

#[derive(Default)]
struct SyncCounts {
    found: i64,
    created: i64,
    converted: i64,
}

struct SchedulerInner {
    sources: Arc<dyn SocialSourceRepository>,
    posts: Arc<dyn SocialPostRepository>,
    converter: Arc<PostConverter>,
    scrapers: ScraperRegistry,
    state: RwLock<SchedulerState>,
    guards: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
    last_runs: RwLock<HashMap<i64, SyncReport>>,
}

/// Cheap to clone; clones share the same jobs
#[derive(Clone)]
pub struct SocialScheduler {
    inner: Arc<SchedulerInner>,
}

impl SocialScheduler {
    pub fn new(
        sources: Arc<dyn SocialSourceRepository>,
        posts: Arc<dyn SocialPostRepository>,
        converter: Arc<PostConverter>,
        scrapers: ScraperRegistry,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                sources,
                posts,
                converter,
                scrapers,
                state: RwLock::new(SchedulerState::default()),
                guards: Mutex::new(HashMap::new()),
                last_runs: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Schedule every enabled source. Starting a running scheduler changes
    /// nothing. Returns the number of jobs.
    pub async fn start(&self) -> Result<usize, SchedulerError> {
        let mut state = self.inner.state.write().await;
        if state.running {
            return Ok(state.jobs.len());
        }

        let sources = self.inner.sources.list_enabled().await?;
        for source in &sources {
            let job = self.spawn_job(source);
            if let Some(old) = state.jobs.insert(source.id, job) {
                old.handle.abort();
            }
        }
        state.running = true;
        state.started_at = Some(Utc::now());

        tracing::info!(jobs = state.jobs.len(), "Social scheduler started");
        Ok(state.jobs.len())
    }

    /// Cancel all jobs. Runs already in flight finish on their own; use
    /// [`SocialScheduler::wait_idle`] to wait for them. Returns the number of
    /// jobs that were cancelled.
    pub async fn stop(&self) -> usize {
        let mut state = self.inner.state.write().await;
        let count = state.jobs.len();
        for (_, job) in state.jobs.drain() {
            job.handle.abort();
        }
        state.running = false;
        state.started_at = None;

        if count > 0 {
            tracing::info!(jobs = count, "Social scheduler stopped");
        }
        count
    }

    /// Wait until no sync run, scheduled or manual, is in flight
    pub async fn wait_idle(&self) {
        let guards: Vec<_> = self.inner.guards.lock().await.values().cloned().collect();
        for guard in guards {
            drop(guard.lock().await);
        }
    }

    pub async fn is_running(&self) -> bool {
        self.inner.state.read().await.running
    }

    pub async fn get_status(&self) -> SchedulerStatus {
        let now = Utc::now();
        let state = self.inner.state.read().await;
        let last_runs = self.inner.last_runs.read().await;

        let mut jobs = Vec::with_capacity(state.jobs.len());
        for (&source_id, job) in &state.jobs {
            jobs.push(JobStatus {
                source_id,
                name: job.name.clone(),
                platform: job.platform,
                interval_minutes: job.interval_minutes,
                in_progress: self.inner.is_in_progress(source_id).await,
                next_run_at: next_tick(job.scheduled_at, job.interval_minutes, now),
                last_run: last_runs.get(&source_id).cloned(),
            });
        }
        jobs.sort_by_key(|job| job.source_id);

        SchedulerStatus {
            running: state.running,
            started_at: state.started_at,
            jobs,
        }
    }

    /// Latest in-memory report of a source, scheduled or manual
    pub async fn last_run(&self, source_id: i64) -> Option<SyncReport> {
        self.inner.last_runs.read().await.get(&source_id).cloned()
    }

    /// Run one sync of `source_id` now, whether or not the scheduler is
    /// running and even when the source is disabled.
    pub async fn trigger_scraping(&self, source_id: i64) -> Result<SyncReport, SchedulerError> {
        let source = self
            .inner
            .sources
            .get_by_id(source_id)
            .await?
            .ok_or(SchedulerError::NotFound(source_id))?;

        let guard = self.inner.guard(source_id).await;
        let _running = guard
            .try_lock()
            .map_err(|_| SchedulerError::AlreadyRunning(source_id))?;

        Ok(self.inner.run_sync(&source, SyncTrigger::Manual).await)
    }

    /// Re-read a source and bring its job in line with the row. Returns
    /// whether the source is scheduled afterwards.
    pub async fn reload_source(&self, source_id: i64) -> Result<bool, SchedulerError> {
        let source = self.inner.sources.get_by_id(source_id).await?;
        let mut state = self.inner.state.write().await;

        if let Some(old) = state.jobs.remove(&source_id) {
            old.handle.abort();
        }

        let source = match source {
            Some(source) => source,
            None => return Err(SchedulerError::NotFound(source_id)),
        };

        if state.running && source.enabled {
            let job = self.spawn_job(&source);
            state.jobs.insert(source_id, job);
            tracing::info!(source_id, interval_minutes = source.interval_minutes, "Social source rescheduled");
            Ok(true)
        } else {
            tracing::info!(source_id, "Social source unscheduled");
            Ok(false)
        }
    }

    fn spawn_job(&self, source: &SocialSource) -> SourceJob {
        let weak: Weak<SchedulerInner> = Arc::downgrade(&self.inner);
        let source_id = source.id;
        let period = source.interval();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.tick(source_id).await;
            }
        });

        SourceJob {
            name: source.name.clone(),
            platform: source.platform,
            interval_minutes: clamp_interval(source.interval_minutes),
            scheduled_at: Utc::now(),
            handle,
        }
    }
}

impl SchedulerInner {
    async fn guard(&self, source_id: i64) -> Arc<Mutex<()>> {
        let mut guards = self.guards.lock().await;
        guards.entry(source_id).or_default().clone()
    }

    async fn is_in_progress(&self, source_id: i64) -> bool {
        let guards = self.guards.lock().await;
        guards
            .get(&source_id)
            .map_or(false, |guard| guard.try_lock().is_err())
    }

    /// Body of a scheduled tick. Claims the run guard and spawns the run.
    /// Returns `None` when the tick was skipped.
    async fn tick(self: &Arc<Self>, source_id: i64) -> Option<JoinHandle<SyncReport>> {
        let (source, running) = self.claim_scheduled(source_id).await?;
        let inner = Arc::clone(self);
        Some(tokio::spawn(async move {
            let report = inner.run_sync(&source, SyncTrigger::Scheduled).await;
            drop(running);
            report
        }))
    }

    async fn claim_scheduled(&self, source_id: i64) -> Option<(SocialSource, OwnedMutexGuard<()>)> {
        let source = match self.sources.get_by_id(source_id).await {
            Ok(Some(source)) if source.enabled => source,
            Ok(_) => {
                tracing::debug!(source_id, "Scheduled sync skipped: source missing or disabled");
                return None;
            }
            Err(e) => {
                tracing::error!(source_id, "Failed to load social source: {:#}", e);
                return None;
            }
        };

        match self.guard(source_id).await.try_lock_owned() {
            Ok(running) => Some((source, running)),
            Err(_) => {
                tracing::info!(source_id, "Scheduled sync skipped: previous run still in progress");
                None
            }
        }
    }

    /// One sync run. Failures end up in the report and on the source row.
    async fn run_sync(&self, source: &SocialSource, trigger: SyncTrigger) -> SyncReport {
        let started_at = Utc::now();
        let mut counts = SyncCounts::default();
        let result = self.sync_source(source, &mut counts).await;
        let finished_at = Utc::now();

        let (status, error) = match result {
            Ok(()) => {
                tracing::info!(
                    source_id = source.id,
                    platform = source.platform.as_str(),
                    found = counts.found,
                    created = counts.created,
                    converted = counts.converted,
                    trigger = ?trigger,
                    "Social sync finished"
                );
                (SyncStatus::Success, None)
            }
            Err(e) => {
                let message = format!("{:#}", e);
                tracing::warn!(
                    source_id = source.id,
                    platform = source.platform.as_str(),
                    trigger = ?trigger,
                    "Social sync failed: {}",
                    message
                );
                (SyncStatus::Failed, Some(message))
            }
        };

        let sync_state = SyncState {
            status,
            error: error.clone(),
            found: counts.found,
            created: counts.created,
            synced_at: finished_at,
        };
        if let Err(e) = self.sources.update_sync_state(source.id, &sync_state).await {
            tracing::error!(source_id = source.id, "Failed to record sync state: {:#}", e);
        }

        let report = SyncReport {
            source_id: source.id,
            trigger,
            status,
            found: counts.found,
            created: counts.created,
            converted: counts.converted,
            error,
            started_at,
            finished_at,
        };
        self.last_runs.write().await.insert(source.id, report.clone());
        report
    }

    async fn sync_source(&self, source: &SocialSource, counts: &mut SyncCounts) -> anyhow::Result<()> {
        let scraped = self.scrapers.scrape(source).await?;
        counts.found = scraped.len() as i64;

        let mut pending = Vec::new();
        for item in &scraped {
            let stored = self.posts.upsert(source.id, item).await?;
            if stored.created {
                counts.created += 1;
            }
            if !stored.post.is_converted() {
                pending.push(stored.post);
            }
        }

        if !source.auto_convert {
            return Ok(());
        }

        for post in &pending {
            match self.converter.promote_post(post, source, None).await {
                Ok(_) => counts.converted += 1,
                Err(ConvertError::AlreadyConverted(_)) => {}
                Err(e) => {
                    tracing::warn!(source_id = source.id, post_id = post.id, "Failed to convert social post: {:#}", e);
                }
            }
        }
        Ok(())
    }
}
