use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use autolaunch::db::{Database, ExportRepository, SubmissionRepository};
use autolaunch::export::archive::DirectoryArchive;
use autolaunch::export::{ExportPass, ExportQueue};
use autolaunch::model::state::{ExportUploadState, WorkflowState};
use autolaunch::request::ingest::MessageIngest;
use autolaunch::schedule::{Scheduler, WatchDirectory};
use autolaunch::workflow::registry::InstalledWorkflows;
use autolaunch::WorkingDirectory;

#[derive(Parser, Debug)]
#[command(name = "autolaunch")]
#[command(version = "0.1.0")]
#[command(about = "Launch analysis pipelines for new sequencing data and upload finished exports")]
struct Args {
    /// Directory holding autolaunch.db, created if missing
    #[arg(long)]
    work_dir: PathBuf,

    /// Installed workflow definitions (JSON), needed by `ingest` and `watch`
    #[arg(long, global = true)]
    workflows: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest every new-data message in a directory once
    Ingest {
        #[arg(long)]
        messages: PathBuf,
    },
    /// Run one export upload pass
    Export {
        /// Directory exports are staged in
        #[arg(long)]
        outbox: PathBuf,
    },
    /// Print every submission and unfinished export
    Status,
    /// Keep ingesting messages and uploading exports until interrupted
    Watch {
        #[arg(long)]
        messages: PathBuf,
        #[arg(long)]
        outbox: PathBuf,
        /// Seconds between passes
        #[arg(long, default_value_t = 30)]
        interval: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    info!("autolaunch starting up");

    let args = Args::parse();
    let wd = WorkingDirectory { path: args.work_dir };
    let db = Arc::new(Database::open(&wd).context("Can't open database")?);

    match args.command {
        Command::Ingest { messages } => {
            let ingest = MessageIngest::new(db, load_workflows(args.workflows.as_deref())?)?;
            let summary = ingest.ingest_dir(&messages)?;
            println!(
                "{} stored, {} automated submissions, {} invalid, {} failed, {} not renamed",
                summary.stored, summary.launched, summary.invalid, summary.failed, summary.unmarked
            );
        }
        Command::Export { outbox } => {
            let queue = ExportQueue::new(db, Arc::new(DirectoryArchive::new(&outbox)));
            if let ExportPass::Ran { completed, faulted, .. } = queue.run_pass()? {
                println!("{} exports uploaded, {} left in PROCESSING", completed.len(), faulted.len());
            }
        }
        Command::Status => print_status(&db)?,
        Command::Watch { messages, outbox, interval } => {
            let ingest = MessageIngest::new(db.clone(), load_workflows(args.workflows.as_deref())?)?;
            let queue = ExportQueue::new(db, Arc::new(DirectoryArchive::new(&outbox)));
            let scheduler = Scheduler::new(Duration::from_secs(interval))
                .every(Arc::new(WatchDirectory { ingest, dir: messages }))
                .every(Arc::new(queue));
            scheduler
                .run(async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await;
        }
    }

    Ok(())
}

fn load_workflows(path: Option<&Path>) -> Result<Arc<InstalledWorkflows>> {
    let path = path.context("--workflows is required for this command")?;
    let workflows = InstalledWorkflows::load(path)
        .with_context(|| format!("Can't load workflow definitions from {}", path.display()))?;
    Ok(Arc::new(workflows))
}

fn print_status(db: &Database) -> Result<()> {
    for submission in db.submissions_with_states(&WorkflowState::ALL)? {
        println!(
            "{}\t{}\t{}\t{}",
            submission.id(),
            submission.state(),
            submission.name(),
            submission.status_message().unwrap_or("")
        );
    }
    for state in [ExportUploadState::New, ExportUploadState::Processing] {
        for export in db.exports_with_state(state)? {
            println!("export {}\t{}\t{}", export.id, export.upload_state, export.bio_project);
        }
    }
    Ok(())
}
