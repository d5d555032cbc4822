//! Command-line driver for the program-minimization engine.
//!
//! Loads a directory of candidate programs, builds the syscall table and
//! influence matrix they share, then minimizes each one against its own
//! external oracle process, writing the shrunk program and a resume-log
//! record as it goes.

mod codec;
mod config;
mod oracle_process;
mod resume;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use syzmini_engine::influence::InfluenceMatrix;
use syzmini_engine::model::{Program, SyscallTable};
use syzmini_engine::oracle::{NullTarget, OracleAdapter};
use syzmini_engine::session::Session;

use codec::JsonCodec;
use config::Config;
use oracle_process::ProcessOracle;
use resume::{load_completed, ResumeLog, ResumeRecord};

/// One input program file: the program itself plus the per-program
/// overrides a caller didn't want to fix globally via `--start-idx`.
#[derive(Debug, Serialize, Deserialize)]
struct ProgramRecord {
    program: Program,
    k0: Option<i64>,
    crash: Option<bool>,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = Config::parse(&args)?;

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(run(config))
}

async fn run(config: Config) -> Result<()> {
    fs::create_dir_all(&config.out).context("creating output directory")?;

    let mut files: Vec<PathBuf> = fs::read_dir(&config.programs_dir)
        .with_context(|| format!("reading {}", config.programs_dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;
    files.sort();

    let mut records = Vec::with_capacity(files.len());
    for path in &files {
        let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let record: ProgramRecord =
            serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", path.display()))?;
        records.push(record);
    }

    let table = build_syscall_table(&records);
    let influence = InfluenceMatrix::build_static(&table);
    let seed = dither_seed();
    influence.dither(config.influence_proportion, seed);

    let completed = load_completed(&config.resume_path())?;
    let mut resume_log = ResumeLog::open(&config.resume_path())?;

    info!(files = files.len(), already_done = completed.len(), "starting minimization run");

    let mut handles = Vec::new();
    for (path, record) in files.into_iter().zip(records.into_iter()) {
        let source_file = file_name(&path);
        if completed.contains(&source_file) {
            info!(source_file, "skipping, already completed in a prior run");
            continue;
        }

        let oracle_cmd = config.oracle_cmd.clone();
        let timeout = Duration::from_secs(config.oracle_timeout_secs);
        let influence = Arc::clone(&influence);
        let k0 = record.k0.unwrap_or(config.start_idx);
        let crash = record.crash.unwrap_or(false);
        let mut program = record.program;
        program.target = config.target.clone();
        let out_path = config.out.join(&source_file);

        let handle = tokio::task::spawn_blocking(move || {
            minimize_one(&source_file, program, k0, crash, &oracle_cmd, timeout, influence, &out_path)
        });
        handles.push(handle);
    }

    let mut failures = 0usize;
    for handle in handles {
        match handle.await {
            Ok(Ok(record)) => {
                resume_log.append(&record)?;
            }
            Ok(Err(e)) => {
                error!(error = %e, "minimization session failed");
                failures += 1;
            }
            Err(join_err) => {
                error!(error = %join_err, "oracle process panicked; skipping this program");
                failures += 1;
            }
        }
    }

    info!(failures, "minimization run complete");
    if failures > 0 {
        anyhow::bail!("{failures} program(s) failed to minimize due to oracle infrastructure failures");
    }
    Ok(())
}

fn minimize_one(
    source_file: &str,
    program: Program,
    k0: i64,
    crash: bool,
    oracle_cmd: &[String],
    timeout: Duration,
    influence: Arc<InfluenceMatrix>,
    out_path: &Path,
) -> Result<ResumeRecord> {
    let oracle = ProcessOracle::spawn(oracle_cmd, timeout)
        .with_context(|| format!("spawning oracle process for {source_file}"))?;
    let mut adapter = OracleAdapter::new(oracle, NullTarget, JsonCodec);
    let mut session = Session::new(&mut adapter, influence);

    let outcome = session
        .minimize(program, k0, crash)
        .with_context(|| format!("minimizing {source_file}"))?;
    drop(session);

    let (call_level, arg_level) = adapter.check_counts();
    info!(source_file, call_level, arg_level, "oracle consultations for this program");

    let bytes = serde_json::to_vec_pretty(&outcome.program)?;
    fs::write(out_path, bytes).with_context(|| format!("writing {}", out_path.display()))?;

    Ok(ResumeRecord {
        source_file: source_file.to_string(),
        program: outcome.program,
        k: outcome.k,
        influence_learned: outcome.influence_learned,
    })
}

fn build_syscall_table(records: &[ProgramRecord]) -> SyscallTable {
    let mut table = SyscallTable::new();
    for record in records {
        for call in &record.program.calls {
            if table.by_name(&call.meta.name).is_none() {
                table.register((*call.meta).clone());
            }
        }
    }
    table
}

fn file_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| {
        warn!(path = %path.display(), "program path has no file name component");
        path.display().to_string()
    })
}

fn dither_seed() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos() as u64).unwrap_or(0)
}
