use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};
use tracing_appender::rolling;
use uuid::Uuid;

use hrm::{
    AppContext, Stores,
    auth::authorizer::{Authorizer, DirectoryAuthorizer, SYSTEM_ACTOR, SystemAuthorizer},
    config::Config,
    directory::EmployeeDirectory,
    seed::Seed,
    utils::{clock::SystemClock, employee_cache::CachedDirectory},
};

#[derive(Debug, Parser)]
#[command(name = "hrm", about = "Leave, attendance and payroll runs over an HR snapshot")]
struct Cli {
    /// JSON snapshot with employees, attendance and leave requests.
    #[arg(long, default_value = "seed.json")]
    seed: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate draft payroll for every active employee.
    Payroll {
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
        #[arg(long, default_value = "0")]
        bonus: Decimal,
    },
    AttendanceReport {
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
    },
    LeaveBalance {
        #[arg(long)]
        employee: u64,
        #[arg(long)]
        year: i32,
    },
}

#[derive(Serialize)]
struct Output<T> {
    run_id: Uuid,
    result: T,
}

fn print<T: Serialize>(run_id: Uuid, result: T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(&Output { run_id, result })?;
    println!("{json}");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "hrm.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(config.log_level)
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .init();

    let run_id = Uuid::new_v4();

    let raw = std::fs::read_to_string(&cli.seed)
        .with_context(|| format!("reading seed file {}", cli.seed.display()))?;
    let seed = Seed::from_json(&raw)
        .with_context(|| format!("parsing seed file {}", cli.seed.display()))?;

    let source = Arc::new(seed.directory());
    let employee_ids = source.ids();
    let directory: Arc<dyn EmployeeDirectory> = Arc::new(CachedDirectory::new(source, &config));
    let auth: Arc<dyn Authorizer> = Arc::new(SystemAuthorizer::new(Arc::new(
        DirectoryAuthorizer::new(directory.clone()),
    )));

    let stores = Stores::in_memory();
    seed.load_into(&stores).await?;
    let ctx = AppContext::with_authorizer(config, stores, directory, auth, Arc::new(SystemClock));

    info!(%run_id, command = ?cli.command, "Run starting");

    match cli.command {
        Command::Payroll { start, end, bonus } => {
            let active: Vec<u64> = seed
                .employees
                .iter()
                .filter(|e| e.is_active())
                .map(|e| e.id)
                .collect();
            if active.len() < employee_ids.len() {
                warn!(
                    skipped = employee_ids.len() - active.len(),
                    "Inactive employees left out of payroll run"
                );
            }
            let run = ctx
                .payroll
                .generate_payroll_batch(SYSTEM_ACTOR, &active, start, end, bonus)
                .await?;
            print(run_id, run)?;
        }
        Command::AttendanceReport { start, end } => {
            let report = ctx
                .attendance
                .attendance_report(SYSTEM_ACTOR, start, end)
                .await?;
            print(run_id, report)?;
        }
        Command::LeaveBalance { employee, year } => {
            let balance = ctx.leave.leave_balance(SYSTEM_ACTOR, employee, year).await?;
            print(run_id, balance)?;
        }
    }

    info!(%run_id, "Run finished");
    Ok(())
}
