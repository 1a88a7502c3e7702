use anyhow::Result;
use clap::{Parser, Subcommand};
use log::error;
use std::process::ExitCode;

use email_ai::app::{exit_code_for, exit_code_for_summary, run_cycle, start_logging};
use email_ai::config::Settings;
use email_ai::error::CONFIG_EXIT_CODE;
use email_ai::mail::imap_client::ImapFetcher;
use email_ai::mail::smtp::SmtpSender;
use email_ai::monitor::run_checks;

#[derive(Parser)]
#[command(name = "email_ai")]
#[command(about = "Summarize the day's email with a local model and send a digest", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run one fetch-process-report cycle (the default)
    Run,

    /// Read-only health checks: environment, model server, scheduler, disk
    Monitor,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // .env next to the binary's working directory, if any
    let _ = dotenvy::dotenv();

    let settings = match start_logging(Settings::load(), &Settings::default().log_dir()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("email_ai: configuration error: {e}");
            return ExitCode::from(CONFIG_EXIT_CODE);
        }
    };

    let outcome = match cli.cmd.unwrap_or(Command::Run) {
        Command::Run => run(&settings),
        Command::Monitor => Ok(monitor(&settings)),
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            eprintln!("email_ai: {e:#}");
            exit_code_for(&e)
        }
    }
}

fn run(settings: &Settings) -> Result<ExitCode> {
    let summary = run_cycle(settings, |k| std::env::var(k).ok(), &ImapFetcher::new(), &SmtpSender::new())?;
    println!("{}", summary.report);

    for (account, reason) in &summary.undelivered {
        eprintln!("email_ai: report for {account} not sent: {reason}");
    }
    Ok(exit_code_for_summary(&summary))
}

fn monitor(settings: &Settings) -> ExitCode {
    let report = run_checks(settings, |k| std::env::var(k).ok());
    print!("{}", report.render());
    if report.all_passed() {
        println!("\nSystem operational.");
        ExitCode::SUCCESS
    } else {
        println!("\nFix the issues above.");
        ExitCode::FAILURE
    }
}
