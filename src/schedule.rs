// src/schedule.rs
use anyhow::{Context, Result};
use chrono_tz::Tz;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};

/// Build a recurring job that runs `task` on `cron` (seconds-first) in `tz`.
///
/// A tick that fires while the previous run is still going is skipped.
pub fn daily_job<F, Fut>(cron: &str, tz: Tz, task: F) -> Result<Job>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let task = Arc::new(task);
    let running = Arc::new(Mutex::new(()));

    Job::new_async_tz(cron, tz, move |_uuid, _sched| {
        let task = Arc::clone(&task);
        let running = Arc::clone(&running);
        Box::pin(async move {
            run_exclusive(&running, (*task)()).await;
        })
    })
    .with_context(|| format!("creating scheduler job for cron {cron:?} in {tz}"))
}

/// Run `task` unless another run holds `running`. Returns whether it ran.
async fn run_exclusive<Fut>(running: &Mutex<()>, task: Fut) -> bool
where
    Fut: Future<Output = ()>,
{
    let Ok(_guard) = running.try_lock() else {
        warn!("previous sync still running; skipping this tick");
        return false;
    };
    info!("scheduled sync triggered");
    task.await;
    true
}

/// Resolves on Ctrl-C, or on SIGTERM where the platform has it.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.context("waiting for Ctrl-C")?,
            _ = term.recv() => info!("SIGTERM received"),
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    Ok(())
}

/// Start the scheduler with one job and block until Ctrl-C or SIGTERM.
pub async fn run_until_shutdown(job: Job) -> Result<()> {
    let mut sched = JobScheduler::new().await.context("creating scheduler")?;
    let job_id = sched.add(job).await.context("adding scheduler job")?;
    sched.start().await.context("starting scheduler")?;

    match sched.next_tick_for_job(job_id).await {
        Ok(Some(next)) => info!(next = %next, "scheduler started"),
        Ok(None) => warn!("scheduler started but job has no upcoming tick"),
        Err(e) => warn!("could not compute next tick: {}", e),
    }

    shutdown_signal().await?;
    info!("shutdown requested");
    sched.shutdown().await.context("stopping scheduler")?;
    Ok(())
}
