use anyhow::Result;
use clap::{Parser, Subcommand};
use insee_sync::{schedule, sync, SyncConfig};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

/// Sync the INSEE death registry into Supabase.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one sync now (manual trigger).
    Run {
        /// First year to sync (defaults to INSEE_FIRST_YEAR)
        #[arg(long)]
        from: Option<i32>,
        /// Last year to sync (defaults to INSEE_LAST_YEAR)
        #[arg(long)]
        to: Option<i32>,
        /// Take the archive list from the INSEE listing page
        #[arg(long)]
        discover: bool,
    },
    /// Stay up and sync on the configured schedule.
    Daemon {
        /// Also run once immediately
        #[arg(long)]
        run_now: bool,
        /// Take the archive list from the INSEE listing page
        #[arg(long)]
        discover: bool,
    },
    /// Print the archives a run would fetch, with the monthly fallbacks
    /// tried when an annual archive is missing.
    Plan {
        #[arg(long)]
        from: Option<i32>,
        #[arg(long)]
        to: Option<i32>,
        #[arg(long)]
        discover: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    // ─── 2) configuration ────────────────────────────────────────────
    let args = Args::parse();
    let cfg = SyncConfig::from_env()?;

    match args.command {
        Command::Run { from, to, discover } => {
            let cfg = cfg.with_years(from, to)?;
            let report = sync::run_configured(&cfg, discover).await?;
            info!(
                synced = report.files_synced,
                failed = report.files_failed,
                rows = report.rows_written,
                "all done"
            );
        }
        Command::Daemon { run_now, discover } => {
            info!(cron = %cfg.cron, tz = %cfg.timezone, "scheduling daily sync");
            if run_now {
                if let Err(e) = sync::run_configured(&cfg, discover).await {
                    error!("initial sync failed: {:#}", e);
                }
            }

            // config is re-read per tick so the default last year follows the calendar
            let job = schedule::daily_job(&cfg.cron, cfg.timezone, move || async move {
                let cfg = match SyncConfig::from_env() {
                    Ok(cfg) => cfg,
                    Err(e) => {
                        error!("invalid configuration: {:#}", e);
                        return;
                    }
                };
                if let Err(e) = sync::run_configured(&cfg, discover).await {
                    error!("scheduled sync failed: {:#}", e);
                }
            })?;
            schedule::run_until_shutdown(job).await?;
        }
        Command::Plan { from, to, discover } => {
            let cfg = cfg.with_years(from, to)?;
            for planned in sync::planned_files(&cfg, discover).await? {
                println!("{}", planned.file.url);
                for fallback in &planned.fallbacks {
                    println!("  if missing: {}", fallback.url);
                }
            }
        }
    }
    Ok(())
}
