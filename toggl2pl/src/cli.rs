//! # toggl2pl CLI
//!
//! Command parsing and orchestration for the `toggl2pl` binary. All
//! aggregation, reconciliation and publishing logic lives in
//! [`toggl2pl-core`]; this module wires the network clients to it, prints
//! the review table and asks for confirmation.
//!
//! - [`Cli`] / [`Commands`]: user-facing options.
//! - [`run`]: async entrypoint used by `main` and by integration tests.
//!
//! [`toggl2pl-core`]: ../../toggl2pl_core/

use anyhow::{anyhow, bail, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::thread;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use toggl2pl_core::synchronise::{prepare, publish_prepared, reconcile_prepared, SyncRequest};
use tracing::{error, info, warn};

use crate::load_config::{default_config_path, load_config, CliConfig};
use crate::pl::PlClient;
use crate::review;
use crate::toggl::TogglClient;

/// CLI for toggl2pl: move a day's Toggl time entries into Project Laboratory.
#[derive(Parser)]
#[clap(
    name = "toggl2pl",
    version,
    about = "Aggregate a day's Toggl time entries and post them to Project Laboratory"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Aggregate Toggl entries for one date and post them to PL
    Sync {
        /// Path to the YAML config file (default: ~/.toggl2pl/config.yml)
        #[clap(long, short = 'c', env = "TOGGL2PL_CONFIG")]
        config: Option<PathBuf>,
        /// Date the work was done, YYYY-MM-DD (default: today)
        #[clap(long, short = 'd')]
        date: Option<NaiveDate>,
        /// Post rounded minutes instead of exact ones
        #[clap(long, short = 'r')]
        round: bool,
        /// Create PL projects/tasks missing from Toggl as clients/projects first
        #[clap(long)]
        reconcile: bool,
        /// Show what would be posted and stop
        #[clap(long)]
        dry_run: bool,
        /// Do not ask for confirmation before posting
        #[clap(long, short = 'y')]
        yes: bool,
        /// Stop at the first failed post
        #[clap(long)]
        fail_fast: bool,
    },
    /// Print the PL projects and tasks visible to the configured user
    Catalog {
        /// Path to the YAML config file (default: ~/.toggl2pl/config.yml)
        #[clap(long, short = 'c', env = "TOGGL2PL_CONFIG")]
        config: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy)]
struct SyncFlags {
    round: bool,
    reconcile: bool,
    dry_run: bool,
    yes: bool,
    fail_fast: bool,
}

fn resolve_config_path(config: Option<PathBuf>) -> Result<PathBuf> {
    config
        .or_else(default_config_path)
        .ok_or_else(|| anyhow!("No --config given and no home directory to look in"))
}

/// Cancels `cancel` on the first Ctrl-C.
fn cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("[CLI] Interrupt received, stopping after the current call");
            cancel.cancel();
        }
    });
}

/// Prompts on stdout and reads the answer from `input` on a detached thread.
/// A cancelled prompt returns `false` and leaves the thread blocked on
/// `input`; the runtime does not wait for it.
async fn ask_to_continue<R>(input: R, cancel: &CancellationToken) -> Result<bool>
where
    R: BufRead + Send + 'static,
{
    let (answer_tx, answer_rx) = oneshot::channel();
    thread::spawn(move || {
        let _ = answer_tx.send(review::confirm(input, io::stdout()));
    });
    tokio::select! {
        answer = answer_rx => {
            let answer = answer.map_err(|_| anyhow!("Confirmation prompt stopped without an answer"))?;
            Ok(answer?)
        }
        _ = cancel.cancelled() => Ok(false),
    }
}

async fn sync(config: CliConfig, date: NaiveDate, flags: SyncFlags) -> Result<()> {
    let aggregate_options = config.sync.aggregate_options(config.excluded_projects())?;
    let toggl = TogglClient::connect(&config.toggl, config.timeout())
        .await
        .map_err(|e| anyhow!("Failed to connect to Toggl: {e}"))?;
    let pl = PlClient::new(&config.pl, config.timeout())
        .map_err(|e| anyhow!("Failed to set up PL client: {e}"))?;

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let request = SyncRequest {
        workspace_id: toggl.workspace_id(),
        date,
        reconcile: flags.reconcile,
    };
    let run = prepare(&request, &aggregate_options, &toggl, &toggl, &pl).await?;

    if !run.excluded.is_empty() {
        println!("{}\n", review::render_excluded(&run.excluded));
    }
    if run.is_empty() {
        println!("There are no posts for {date} yet. Please post something and try again.");
        return Ok(());
    }

    if let Some(pending) = &run.reconciliation {
        println!("Reconciliation will create in Toggl:\n{}\n", review::render_plan(&pending.plan));
    }

    println!("{}", review::render_table(&run.buckets));
    if !run.unresolved.is_empty() {
        println!(
            "\nNo PL project/task for these buckets; posting them will fail:\n{}",
            review::render_unresolved(&run.unresolved)
        );
    }

    if flags.dry_run {
        println!("\nDry run: nothing was created or posted.");
        return Ok(());
    }
    if !flags.yes && !ask_to_continue(BufReader::new(io::stdin()), &cancel).await? {
        bail!("Export cancelled by operator; nothing was created or posted");
    }

    if let Some(outcome) =
        reconcile_prepared(&run, &toggl, &config.sync.reconcile_options(), &cancel).await?
    {
        println!("{}", review::render_outcome(&outcome));
    }

    let mut options = config.sync.publish_options(flags.round);
    options.fail_fast |= flags.fail_fast;
    let report = publish_prepared(&run, &options, &pl, &cancel).await;
    println!("\n{}", review::render_report(&report));

    if !report.publish.is_complete() {
        bail!(
            "{} of {} buckets were not posted",
            report.publish.failed.len() + report.publish.unattempted.len(),
            report.buckets
        );
    }
    Ok(())
}

async fn catalog(config: CliConfig) -> Result<()> {
    let pl = PlClient::new(&config.pl, config.timeout())
        .map_err(|e| anyhow!("Failed to set up PL client: {e}"))?;
    let projects = pl
        .projects_with_tasks()
        .await
        .map_err(|e| anyhow!("Failed to fetch PL catalog: {e}"))?;
    println!("{}", review::render_tasks(&projects));
    Ok(())
}

/// Async CLI entrypoint for main() and integration tests.
pub async fn run(cli: Cli) -> Result<()> {
    info!("[CLI] Starting");

    let result = match cli.command {
        Commands::Sync {
            config,
            date,
            round,
            reconcile,
            dry_run,
            yes,
            fail_fast,
        } => {
            let config = load_config(resolve_config_path(config)?)?;
            let date = date.unwrap_or_else(|| Local::now().date_naive());
            info!(command = "sync", %date, round, reconcile, dry_run, "Starting synchronisation");
            let flags = SyncFlags {
                round,
                reconcile,
                dry_run,
                yes,
                fail_fast,
            };
            sync(config, date, flags).await
        }
        Commands::Catalog { config } => {
            let config = load_config(resolve_config_path(config)?)?;
            catalog(config).await
        }
    };

    if let Err(e) = &result {
        error!(error = %e, "[CLI][ERROR] Command failed");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::time::{Duration, Instant};

    /// Stdin stand-in that stays open without ever answering.
    struct SilentInput;

    impl Read for SilentInput {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            thread::sleep(Duration::from_secs(30));
            Ok(0)
        }
    }

    #[test]
    fn cancelled_prompt_does_not_hold_up_runtime_shutdown() {
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        let answer = runtime.block_on(async move {
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                trigger.cancel();
            });
            ask_to_continue(BufReader::new(SilentInput), &cancel).await
        });
        assert!(!answer.expect("cancelling is not an error"));

        let started = Instant::now();
        drop(runtime);
        assert!(
            started.elapsed() < Duration::from_secs(5),
            "runtime shutdown waited {:?} on the open prompt",
            started.elapsed()
        );
    }

    #[tokio::test]
    async fn answered_prompt_is_returned() {
        let cancel = CancellationToken::new();
        assert!(ask_to_continue(&b"\n"[..], &cancel).await.expect("answer"));
        assert!(!ask_to_continue(&b"n\n"[..], &cancel).await.expect("answer"));
    }
}
