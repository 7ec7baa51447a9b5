//! shared-enrold - background service for shared enrolments
//!
//! Wires together:
//! - Configuration loading
//! - Store initialization
//! - Local host services
//! - The enrolment engine
//! - The scheduled expiry sweep

mod scheduler;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use shared_enrol_api::{SyncReport, SyncStatus};
use shared_enrol_config::{Settings, load_config};
use shared_enrol_core::{SharedEnrolPlugin, SyncOptions};
use shared_enrol_host_api::TracingTrace;
use shared_enrol_host_local::{HOST_DB_FILENAME, LocalHost};
use shared_enrol_store::{AuditEvent, AuditEventType, SqliteStore, Store, TaskState};
use shared_enrol_util::{
    CourseId, DB_FILENAME, Timestamp, default_config_path, format_timestamp, is_mock_time_active,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// shared-enrold - expires shared enrolments on schedule
#[derive(Parser, Debug)]
#[command(name = "shared-enrold")]
#[command(about = "Background service for the shared enrolment method", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/shared-enrol/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Data directory override (or set SHARED_ENROL_DATA_DIR env var)
    #[arg(short, long, env = "SHARED_ENROL_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level (default: from config, else info)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Run one sweep and exit
    #[arg(long)]
    once: bool,

    /// Restrict a --once sweep to one course
    #[arg(long, requires = "once")]
    course: Option<i64>,
}

type SweepHandle = JoinHandle<shared_enrol_util::Result<SyncReport>>;

/// Main service state
struct Service {
    settings: Settings,
    plugin: Arc<SharedEnrolPlugin>,
    store: Arc<dyn Store>,
    interrupt: Arc<AtomicBool>,
}

impl Service {
    fn new(args: &Args, settings: Settings) -> Result<Self> {
        let data_dir = args
            .data_dir
            .clone()
            .unwrap_or_else(|| settings.daemon.data_dir.clone());

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        let db_path = data_dir.join(DB_FILENAME);
        let store: Arc<dyn Store> = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );
        if !store.is_healthy() {
            return Err(anyhow!("Store at {:?} failed its health check", db_path));
        }
        info!(db_path = %db_path.display(), "Store initialized");

        let host_path = data_dir.join(HOST_DB_FILENAME);
        let host = Arc::new(
            LocalHost::open(&host_path, settings.host.clone())
                .with_context(|| format!("Failed to open host database {:?}", host_path))?,
        );

        let plugin = Arc::new(SharedEnrolPlugin::new(
            settings.plugin.clone(),
            store.clone(),
            host,
        ));

        Ok(Self {
            settings,
            plugin,
            store,
            interrupt: Arc::new(AtomicBool::new(false)),
        })
    }

    fn sweep_options(&self, course: Option<CourseId>) -> SyncOptions {
        SyncOptions {
            course,
            interrupt: Some(self.interrupt.clone()),
            ..Default::default()
        }
    }

    /// Start one sweep on a blocking worker
    fn spawn_sweep(&self, options: SyncOptions) -> SweepHandle {
        let plugin = self.plugin.clone();
        tokio::task::spawn_blocking(move || {
            let mut trace = TracingTrace;
            plugin.sync(&mut trace, &options, Timestamp::now())
        })
    }

    /// Record the outcome of a sweep started at `started`
    fn finish_sweep(
        &self,
        started: chrono::DateTime<chrono::Local>,
        outcome: std::result::Result<shared_enrol_util::Result<SyncReport>, tokio::task::JoinError>,
    ) -> Result<SyncReport> {
        let result = match outcome {
            Ok(result) => result.map_err(anyhow::Error::from),
            Err(e) => Err(anyhow!("Sweep worker failed: {}", e)),
        };

        let last_result = match &result {
            Ok(report) => report.status.code(),
            Err(_) => SyncStatus::Error.code(),
        };
        let state = TaskState {
            name: self.settings.task.name.to_string(),
            last_run: started,
            last_result,
        };
        if let Err(e) = self.store.save_task_state(&state) {
            warn!(error = %e, "Failed to save task state");
        }

        result
    }

    fn log_next_sweep(&self) {
        if self.settings.task.disabled {
            return;
        }
        if let Some(next) = self.settings.task.schedule.next_after(&shared_enrol_util::now()) {
            info!(next = %format_timestamp(Timestamp::from(next)), "Next sweep scheduled");
        }
    }

    /// Run a single sweep and exit
    async fn run_once(self, course: Option<CourseId>) -> Result<()> {
        let interrupt = self.interrupt.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received SIGINT, stopping sweep");
                interrupt.store(true, Ordering::SeqCst);
            }
        });

        let started = shared_enrol_util::now();
        let outcome = self.spawn_sweep(self.sweep_options(course)).await;
        let report = self.finish_sweep(started, outcome)?;

        info!(
            run_id = %report.run_id,
            status = ?report.status,
            unenrolled = report.unenrolled,
            interrupted = report.interrupted,
            "Sweep complete"
        );
        Ok(())
    }

    async fn run(self) -> Result<()> {
        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::DaemonStarted));

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
        let mut sighup =
            signal(SignalKind::hangup()).context("Failed to create SIGHUP handler")?;

        // Several checks per minute so no slot is missed to timer drift
        let mut tick_timer = tokio::time::interval(Duration::from_secs(15));
        let mut running: Option<(chrono::DateTime<chrono::Local>, SweepHandle)> = None;

        info!(
            task = self.settings.task.name,
            schedule = %self.settings.task.schedule,
            disabled = self.settings.task.disabled,
            "Service running"
        );
        self.log_next_sweep();

        loop {
            let sweep_active = running.is_some();
            let sweep_done = async {
                match running.as_mut() {
                    Some((_, handle)) => handle.await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP, shutting down gracefully");
                    break;
                }

                outcome = sweep_done, if sweep_active => {
                    if let Some((started, _)) = running.take() {
                        match self.finish_sweep(started, outcome) {
                            Ok(report) => debug!(run_id = %report.run_id, "Scheduled sweep recorded"),
                            Err(e) => error!(error = %e, "Scheduled sweep failed"),
                        }
                        self.log_next_sweep();
                    }
                }

                _ = tick_timer.tick() => {
                    if running.is_some() {
                        debug!("Previous sweep still running, skipping tick");
                        continue;
                    }

                    let now = shared_enrol_util::now();
                    let last = match self.store.load_task_state(self.settings.task.name) {
                        Ok(last) => last,
                        Err(e) => {
                            warn!(error = %e, "Failed to load task state");
                            None
                        }
                    };

                    if scheduler::is_due(&self.settings.task, last.as_ref(), &now) {
                        debug!(slot = %scheduler::slot_start(&now), "Sweep due");
                        running = Some((now, self.spawn_sweep(self.sweep_options(None))));
                    }
                }
            }
        }

        info!("Shutting down shared-enrold");

        // Let an in-flight sweep stop at the next row
        if let Some((started, handle)) = running.take() {
            self.interrupt.store(true, Ordering::SeqCst);
            if let Err(e) = self.finish_sweep(started, handle.await) {
                warn!(error = %e, "Sweep failed during shutdown");
            }
        }

        if let Err(e) = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::DaemonStopped))
        {
            warn!(error = %e, "Failed to log daemon shutdown");
        }

        info!("Shutdown complete");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let settings = load_config(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    let log_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| settings.daemon.log_level.clone());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config_path = %args.config.display(),
        enabled = settings.plugin.enabled,
        "shared-enrold starting"
    );

    if is_mock_time_active() {
        warn!("Mock time is active, sweeps run against a shifted clock");
    }

    let service = Service::new(&args, settings)?;
    if args.once {
        service.run_once(args.course.map(CourseId::new)).await
    } else {
        service.run().await
    }
}
