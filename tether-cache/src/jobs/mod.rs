//! Background housekeeping.
//!
//! Three independently scheduled recurring jobs drive the cache between
//! ingest calls:
//!
//! - the **expiry job** applies each overdue entry's expiry strategy,
//! - one **request job** per depended-upon type issues queries for
//!   outstanding dependencies,
//! - one **flush job** per dependent type hands fully resolved entries back
//!   for normal processing.
//!
//! Every job runs its pass to completion on each tick; failures are
//! isolated per item, logged, and never abort the rest of the pass. Each
//! spawned job owns a cancellable handle and stops on teardown.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use tether_core::JobSchedule;

pub mod expiry;
pub mod flush;
pub mod request;

pub use expiry::{ExpiryJobMetrics, ExpiryJobSnapshot};
pub use flush::{FlushJobMetrics, FlushJobSnapshot};
pub use request::{RequestJobMetrics, RequestJobSnapshot};

/// Cancellable handle of one spawned housekeeping job.
pub struct JobHandle {
    name: String,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl JobHandle {
    /// Signal the job to stop and wait for its loop to exit. A pass already
    /// in flight runs to completion first.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Spawn a repeating job: wait out the startup delay, then run `pass` every
/// period until the shutdown signal fires.
pub(crate) fn spawn_job<F, Fut>(name: String, schedule: JobSchedule, mut pass: F) -> JobHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let job_name = name.clone();

    let handle = tokio::spawn(async move {
        tracing::info!(
            job = %job_name,
            startup_delay_secs = schedule.startup_delay.as_secs(),
            period_secs = schedule.period.as_secs(),
            "Housekeeping job started"
        );

        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!(job = %job_name, "Housekeeping job shutting down");
                    return;
                }
            }
            _ = tokio::time::sleep(schedule.startup_delay) => {}
        }

        let mut ticker = interval(schedule.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!(job = %job_name, "Housekeeping job shutting down");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    pass().await;
                }
            }
        }
    });

    JobHandle {
        name,
        shutdown: shutdown_tx,
        handle,
    }
}

/// The set of running housekeeping jobs; stopping it stops them all.
pub struct HousekeepingScheduler {
    jobs: Vec<JobHandle>,
}

impl HousekeepingScheduler {
    pub(crate) fn new(jobs: Vec<JobHandle>) -> Self {
        Self { jobs }
    }

    pub fn job_names(&self) -> Vec<&str> {
        self.jobs.iter().map(|j| j.name()).collect()
    }

    /// Stop every job and wait for their loops to exit.
    pub async fn shutdown(self) {
        for job in self.jobs {
            job.stop().await;
        }
        tracing::info!("Housekeeping stopped");
    }
}
