use anyhow::{Context, Result};
use clap::Parser;
use modtrace::cli::{Cli, OutputFormat};
use modtrace::config::SessionConfig;
use modtrace::csv_output::CsvOutput;
use modtrace::demo;
use modtrace::json_output::JsonOutput;
use modtrace::registry::ModuleTable;
use modtrace::session::Session;
use modtrace::trace::Trace;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Build the session configuration from --config and --submodules
fn load_config(args: &Cli) -> Result<SessionConfig> {
    let config = match &args.config {
        Some(path) => SessionConfig::from_toml(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => SessionConfig::default(),
    };
    // The flag can only switch sub-unit tracing on, never override a config that enables it.
    let enabled = config.trace_submodules || args.submodules;
    Ok(config.with_submodules(enabled))
}

/// Print the trace in the requested format
fn print_trace(unit: &str, trace: &Trace, format: OutputFormat, timing: bool) -> Result<()> {
    let records = trace.records();
    match format {
        OutputFormat::Text => {
            let start = trace.started_at();
            println!("--- trace: {} ({} calls) ---", unit, records.len());
            for record in &records {
                match (timing, start) {
                    (true, Some(start)) => println!(
                        "[{:>4}] +{:>8}us {}",
                        record.sequence(),
                        record.offset_from(start).as_micros(),
                        record
                    ),
                    _ => println!("[{:>4}] {}", record.sequence(), record),
                }
            }
        }
        OutputFormat::Json => {
            println!("{}", JsonOutput::from_records(unit, &records).to_json()?);
        }
        OutputFormat::Csv => {
            print!("{}", CsvOutput::from_records(&records, timing).to_csv());
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();

    init_tracing(args.debug);

    let config = load_config(&args)?;

    let table = Arc::new(ModuleTable::new());
    demo::install(&table);

    // Live echo only makes sense for text output; JSON/CSV must stay parseable.
    let echo = matches!(args.format, OutputFormat::Text) && !args.quiet;
    let session = Session::with_config(
        table.clone(),
        args.unit.as_str(),
        move |id| {
            if echo {
                println!("{}", id);
            }
        },
        config,
    );

    let (result, trace) = session.run(|_| demo::run_basic(&*table))?;
    let result = result.context("Demo workload failed")?;
    tracing::debug!(%result, "demo result");

    print_trace(&args.unit, &trace, args.format, args.timing)?;

    Ok(())
}
