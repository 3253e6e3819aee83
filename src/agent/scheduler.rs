//! Job scheduling.
//!
//! # Modes
//! ```text
//! interval:   [reload?] → spawn all jobs → join all → sleep(remaining) → repeat
//! continuous: one loop per job: run → sleep(job interval) → repeat
//!             supervisor polls the reload flag; on a new job set the loops
//!             finish their current iteration and are respawned
//! ```
//!
//! A config that fails to load keeps the previous job set running. A
//! successful reload forgets what every job last applied.

use arc_swap::ArcSwap;
use futures_util::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;

use crate::agent::checks::{compile_checks, DocumentCheck};
use crate::agent::job::Job;
use crate::agent::outcome::JobOutcome;
use crate::agent::pipeline::{run_job, AgentContext};
use crate::config::{load_agent_config, load_checks_file, AgentConfig, ConfigError, ScheduleMode};
use crate::lifecycle::ReloadFlag;

const RELOAD_POLL: Duration = Duration::from_secs(1);

/// Everything derived from one config load.
#[derive(Debug, Clone)]
pub struct JobSet {
    pub jobs: Vec<Arc<Job>>,
    pub checks: Arc<Vec<DocumentCheck>>,
    pub mode: ScheduleMode,
    pub interval: Duration,
}

impl JobSet {
    /// Resolve jobs and load the checks file named in `config`.
    pub fn from_config(config: &AgentConfig, interval_override: Option<Duration>) -> Result<Self, ConfigError> {
        let interval = interval_override.unwrap_or(Duration::from_secs(config.global.interval_secs));

        let checks = match &config.global.checks_file {
            Some(path) if !path.is_empty() => {
                let file = load_checks_file(&PathBuf::from(path))?;
                compile_checks(&file).map_err(ConfigError::Validation)?
            }
            _ => Vec::new(),
        };

        let jobs = config
            .templates
            .iter()
            .map(|t| Arc::new(Job::build(t, &config.global, interval)))
            .collect();

        Ok(Self {
            jobs,
            checks: Arc::new(checks),
            mode: config.global.mode,
            interval,
        })
    }
}

struct ConfigSource {
    path: PathBuf,
    interval_override: Option<Duration>,
}

/// Drives job sets until shutdown.
pub struct Scheduler {
    ctx: Arc<AgentContext>,
    jobs: ArcSwap<JobSet>,
    reload: ReloadFlag,
    source: Option<ConfigSource>,
}

impl Scheduler {
    pub fn new(ctx: Arc<AgentContext>, jobs: JobSet, reload: ReloadFlag) -> Self {
        Self {
            ctx,
            jobs: ArcSwap::from_pointee(jobs),
            reload,
            source: None,
        }
    }

    /// Reload jobs from `path` when the reload flag is raised.
    pub fn with_config_source(mut self, path: PathBuf, interval_override: Option<Duration>) -> Self {
        self.source = Some(ConfigSource {
            path,
            interval_override,
        });
        self
    }

    pub fn job_set(&self) -> Arc<JobSet> {
        self.jobs.load_full()
    }

    /// Run every job of the current set once, concurrently.
    pub async fn run_once(&self) -> Vec<JobOutcome> {
        let set = self.jobs.load_full();
        self.run_set(&set).await
    }

    async fn run_set(&self, set: &JobSet) -> Vec<JobOutcome> {
        let handles = set.jobs.iter().map(|job| {
            let ctx = self.ctx.clone();
            let job = job.clone();
            let checks = set.checks.clone();
            tokio::spawn(async move { run_job(&ctx, &job, &checks).await })
        });

        join_all(handles)
            .await
            .into_iter()
            .filter_map(|joined| match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(error = %e, "Job task failed");
                    None
                }
            })
            .collect()
    }

    /// Swap in a fresh job set if a reload was requested.
    pub fn reload_if_requested(&self) -> bool {
        if !self.reload.take() {
            return false;
        }
        let Some(source) = &self.source else {
            tracing::info!("Reload requested without a config file, ignoring");
            return false;
        };

        let loaded = load_agent_config(&source.path)
            .and_then(|config| JobSet::from_config(&config, source.interval_override));
        match loaded {
            Ok(set) => {
                tracing::info!(jobs = set.jobs.len(), path = %source.path.display(), "Configuration reloaded");
                self.jobs.store(Arc::new(set));
                self.ctx.forget_applied();
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "Reload failed, keeping current configuration");
                false
            }
        }
    }

    /// Loop until `shutdown` fires.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        loop {
            self.reload_if_requested();
            let set = self.jobs.load_full();
            let keep_running = match set.mode {
                ScheduleMode::Interval => self.interval_tick(&set, &mut shutdown).await,
                ScheduleMode::Continuous => self.continuous_epoch(&set, &mut shutdown).await,
            };
            if !keep_running {
                tracing::info!("Scheduler stopped");
                return;
            }
        }
    }

    async fn interval_tick(&self, set: &JobSet, shutdown: &mut broadcast::Receiver<()>) -> bool {
        let started = Instant::now();
        let outcomes = self.run_set(set).await;
        tracing::debug!(jobs = outcomes.len(), elapsed = ?started.elapsed(), "Tick finished");

        let remaining = set.interval.saturating_sub(started.elapsed());
        tokio::select! {
            _ = tokio::time::sleep(remaining) => true,
            _ = shutdown.recv() => false,
        }
    }

    async fn continuous_epoch(&self, set: &JobSet, shutdown: &mut broadcast::Receiver<()>) -> bool {
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut tasks = JoinSet::new();

        for job in &set.jobs {
            let ctx = self.ctx.clone();
            let job = job.clone();
            let checks = set.checks.clone();
            let mut stop = stop_rx.clone();
            tasks.spawn(async move {
                loop {
                    run_job(&ctx, &job, &checks).await;
                    tokio::select! {
                        _ = tokio::time::sleep(job.interval) => {}
                        _ = stop.changed() => return,
                    }
                }
            });
        }

        loop {
            tokio::select! {
                _ = tokio::time::sleep(RELOAD_POLL) => {
                    if self.reload_if_requested() {
                        let _ = stop_tx.send(true);
                        while tasks.join_next().await.is_some() {}
                        return true;
                    }
                }
                _ = shutdown.recv() => {
                    tasks.abort_all();
                    return false;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::render::HandlebarsRenderer;
    use crate::config::TemplateConfig;
    use crate::fetch::Fetcher;

    fn context() -> Arc<AgentContext> {
        Arc::new(AgentContext::new(
            Fetcher::new().unwrap(),
            Arc::new(HandlebarsRenderer::new()),
            false,
        ))
    }

    #[test]
    fn test_job_set_from_config() {
        let mut config = AgentConfig::default();
        config.templates.push(TemplateConfig {
            src: "a.hbs".into(),
            dest: "a.conf".into(),
            ..Default::default()
        });
        let set = JobSet::from_config(&config, Some(Duration::from_secs(3))).unwrap();
        assert_eq!(set.jobs.len(), 1);
        assert_eq!(set.interval, Duration::from_secs(3));
        assert_eq!(set.jobs[0].interval, Duration::from_secs(3));
        assert!(set.checks.is_empty());
    }

    #[tokio::test]
    async fn test_jobs_without_urls_are_skipped() {
        let mut config = AgentConfig::default();
        config.templates.push(TemplateConfig {
            src: "a.hbs".into(),
            dest: "a.conf".into(),
            ..Default::default()
        });
        let set = JobSet::from_config(&config, None).unwrap();
        let scheduler = Scheduler::new(context(), set, ReloadFlag::new());
        assert!(scheduler.run_once().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_current_set() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("confd.toml");
        std::fs::write(&path, "[[templates]]\nsrc = \"\"\ndest = \"\"\n").unwrap();

        let mut config = AgentConfig::default();
        config.templates.push(TemplateConfig {
            src: "a.hbs".into(),
            dest: "a.conf".into(),
            ..Default::default()
        });
        let flag = ReloadFlag::new();
        let scheduler = Scheduler::new(context(), JobSet::from_config(&config, None).unwrap(), flag.clone())
            .with_config_source(path.clone(), None);

        flag.request();
        assert!(!scheduler.reload_if_requested());
        assert_eq!(scheduler.job_set().jobs[0].dest, PathBuf::from("a.conf"));

        std::fs::write(&path, "[[templates]]\nsrc = \"b.hbs\"\ndest = \"b.conf\"\n").unwrap();
        flag.request();
        assert!(scheduler.reload_if_requested());
        assert_eq!(scheduler.job_set().jobs[0].dest, PathBuf::from("b.conf"));
    }
}
