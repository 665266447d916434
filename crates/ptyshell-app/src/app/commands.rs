use anyhow::{Context, Result};
use chrono::{Local, Utc};
use colored::Colorize;
use ptyshell_history::{should_record, HistoryEngine, HistoryStore, RecordDecision};
use ptyshell_input::{first_diagnostic, tokenize, TokenKind};
use ptyshell_jobs::JobController;
use ptyshell_types::{CommandOutcome, CommandStats, ExecuteResult, HistoryRecord, Job, JobId, JobStatus, PromptState};
use std::fmt::Write as _;
use std::time::Duration;
use tracing::{debug, info};

use super::setup::{AppConfig, Components};

/// Exit status reported for a job that was cancelled
const CANCELLED_EXIT_CODE: i32 = 130;

/// Run one command line to completion and record it in history.
///
/// Returns the process exit status for the caller to exit with.
pub async fn run_exec_mode(app: &AppConfig, components: &Components, line: &str) -> Result<i32> {
    let result = components.executor.execute(line).await;

    let (code, outcome) = match &result {
        ExecuteResult::Success { output, exit_code } => {
            print!("{}", output);
            (*exit_code, CommandOutcome::Succeeded)
        }
        ExecuteResult::Failure { error, exit_code } => {
            eprint!("{}", error);
            if !error.ends_with('\n') {
                eprintln!();
            }
            (exit_code.unwrap_or(1), CommandOutcome::Failed)
        }
        ExecuteResult::Backgrounded { job_id } => {
            eprintln!("{} {}", "Started job".cyan(), job_id.as_str().bold());
            let job = wait_for_job(&components.jobs, job_id, app.shell.job_poll_interval()).await?;
            if let Some(output) = components.jobs.output(&job.id) {
                print!("{}", output);
            }
            eprintln!("{}", describe_job(&job));
            job_exit(&job)
        }
    };

    record_line(&components.history, app, line, outcome);
    Ok(code)
}

/// Poll a background job on a fixed cadence until it is terminal.
///
/// Ctrl-C cancels the job; polling continues until the cancellation lands.
pub async fn wait_for_job(jobs: &JobController, id: &JobId, interval: Duration) -> Result<Job> {
    let mut ticker = tokio::time::interval(interval);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut cancel_sent = false;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let job = jobs.get(id).with_context(|| format!("job {} disappeared", id))?;
                debug!(job = %id, status = ?job.status, "polled job");
                if job.status.is_terminal() {
                    return Ok(job);
                }
            }
            signal = &mut ctrl_c, if !cancel_sent => {
                signal.context("Failed to listen for Ctrl-C")?;
                cancel_sent = true;
                info!(job = %id, "cancelling job on interrupt");
                if let Err(e) = jobs.cancel(id) {
                    debug!(job = %id, "cancel ignored: {}", e);
                }
            }
        }
    }
}

fn job_exit(job: &Job) -> (i32, CommandOutcome) {
    match job.status {
        JobStatus::Completed => (job.exit_code.unwrap_or(0), CommandOutcome::Succeeded),
        JobStatus::Failed => (job.exit_code.unwrap_or(1), CommandOutcome::Failed),
        JobStatus::Cancelled | JobStatus::Running => (CANCELLED_EXIT_CODE, CommandOutcome::Failed),
    }
}

pub fn describe_job(job: &Job) -> String {
    let elapsed = job
        .end_time
        .map(|end| end - job.start_time)
        .map(|d| format!(" after {:.1}s", d.num_milliseconds() as f64 / 1000.0))
        .unwrap_or_default();
    match job.status {
        JobStatus::Completed => format!("{} {}{}", "Job completed:".green(), job.command_line(), elapsed),
        JobStatus::Failed => format!(
            "{} {} (exit {}){}",
            "Job failed:".red(),
            job.command_line(),
            job.exit_code.unwrap_or(-1),
            elapsed
        ),
        JobStatus::Cancelled => format!("{} {}{}", "Job cancelled:".yellow(), job.command_line(), elapsed),
        JobStatus::Running => format!("{} {}", "Job running:".cyan(), job.command_line()),
    }
}

/// One-shot lines pass the same guard as lines typed at a prompt
fn record_line(history: &HistoryEngine, app: &AppConfig, line: &str, outcome: CommandOutcome) {
    match should_record(line, PromptState::AtPrompt, app.shell.suspicious_length) {
        RecordDecision::Record => {
            history.record_with_outcome(line, app.work_dir.clone(), Utc::now(), outcome);
        }
        RecordDecision::Skip(reason) => debug!(?reason, "not recording line"),
    }
}

/// Fuzzy-search history, or list the most used commands when `top` is set
pub fn run_history_mode(components: &Components, query: Option<&str>, top: Option<usize>) -> Result<String> {
    if let Some(limit) = top {
        let store = components
            .history
            .store()
            .context("No history store is configured")?;
        let stats = store
            .query_top_by_usage(limit)
            .context("Failed to read history statistics")?;
        return Ok(format_stats(&stats));
    }
    let records = components.history.search(query.unwrap_or(""));
    Ok(format_records(&records))
}

pub fn format_records(records: &[HistoryRecord]) -> String {
    let mut out = String::new();
    for record in records {
        let _ = writeln!(
            out,
            "{}  {}",
            record.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
            record.line()
        );
    }
    out
}

pub fn format_stats(stats: &[CommandStats]) -> String {
    let mut out = String::new();
    for s in stats {
        let last = if s.last_args.is_empty() {
            String::new()
        } else {
            format!("  (last: {} {})", s.command, s.last_args.join(" "))
        };
        let _ = writeln!(
            out,
            "{:>6}  {:<20} {}/{} ok/failed{}",
            s.count,
            s.command.bold(),
            s.success_count,
            s.failure_count,
            last.dimmed()
        );
    }
    out
}

/// Tokens of `line`, one per row, followed by the first diagnostic if any
pub fn run_tokenize_mode(line: &str, json: bool) -> Result<String> {
    let tokens = tokenize(line);
    let diagnostic = first_diagnostic(line);

    if json {
        let value = serde_json::json!({
            "tokens": tokens,
            "diagnostic": diagnostic,
        });
        return Ok(serde_json::to_string_pretty(&value)?);
    }

    let mut out = String::new();
    for token in tokens.iter().filter(|t| !t.is_whitespace()) {
        let kind = format!("{:<9}", format!("{:?}", token.kind).to_lowercase());
        let kind = match token.kind {
            TokenKind::Command => kind.green(),
            TokenKind::Operator => kind.yellow(),
            TokenKind::String => kind.cyan(),
            TokenKind::Error => kind.red(),
            _ => kind.normal(),
        };
        let _ = writeln!(out, "{:>4}  {} {:?}", token.start, kind, token.value);
    }
    match diagnostic {
        Some(d) => {
            let _ = writeln!(out, "{} {}", "warning:".yellow().bold(), d);
        }
        None => {
            let _ = writeln!(out, "{}", "ok".green());
        }
    }
    Ok(out)
}
