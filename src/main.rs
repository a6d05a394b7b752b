use std::io::{self, Write};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use vigia::catalogue::Catalogue;
use vigia::cli::{Cli, OutputFormat};
use vigia::report::{self, Report, EXIT_CONFIGURATION_ERROR};

/// Initialize tracing subscriber; `--debug` turns everything on
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Builtin or file catalogue, narrowed by `-e`
fn load_catalogue(args: &Cli) -> Result<Catalogue> {
    let mut catalogue = match &args.catalogue {
        Some(path) => Catalogue::from_file(path)?,
        None => Catalogue::builtin(&args.builtin_overrides()),
    };
    if args.silence_children() {
        catalogue = catalogue.silence_processes();
    }
    match &args.only {
        Some(pattern) => catalogue.select(pattern),
        None => Ok(catalogue),
    }
}

/// Load, register, run, report. Errors here are configuration errors.
fn run(args: &Cli) -> Result<i32> {
    let runner = load_catalogue(args)?.into_runner()?;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    if args.list {
        report::write_catalogue(runner.scenarios(), &mut out)?;
        out.flush()?;
        return Ok(report::EXIT_SUCCESS);
    }

    if runner.is_empty() {
        anyhow::bail!("No scenarios selected");
    }

    if let Some(delay_ms) = args.start_delay {
        eprintln!(
            "[vigia: pid {}, starting in {} ms]",
            std::process::id(),
            delay_ms
        );
        thread::sleep(Duration::from_millis(delay_ms));
    }

    // Release the lock while scenarios run; the process child shares stdout
    drop(out);
    let report = Report::new(runner.run_all());

    let mut out = stdout.lock();
    match args.format {
        OutputFormat::Text => report.write_text(&mut out)?,
        OutputFormat::Json => {
            let json = report.to_json().context("Failed to serialize report")?;
            writeln!(out, "{}", json)?;
        }
    }
    out.flush()?;

    Ok(report.exit_code())
}

fn main() {
    let args = Cli::parse();

    init_tracing(args.debug);

    match run(&args) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(EXIT_CONFIGURATION_ERROR);
        }
    }
}
