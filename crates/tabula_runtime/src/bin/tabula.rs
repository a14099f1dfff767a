//! Tabula CLI entry point.

use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use serde_json::json;
use tabula_runtime::{Project, Session, SessionConfig, Snapshot, load_from_file, save_to_file};
use tabula_storage::Table;
use tracing_subscriber::EnvFilter;

/// CLI configuration parsed from arguments.
#[derive(Default)]
#[allow(clippy::struct_excessive_bools)]
struct CliConfig {
    input: Option<PathBuf>,
    save: Option<PathBuf>,
    show_help: bool,
    show_version: bool,
    json: bool,
    trace: bool,
    dump: bool,
    provenance: bool,
    parallel: bool,
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\x1b[31mError: {e}\x1b[0m");
            ExitCode::FAILURE
        }
    }
}

fn parse_args(args: Vec<String>) -> Result<CliConfig, Box<dyn std::error::Error>> {
    let mut config = CliConfig::default();

    let mut args = args.into_iter().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => config.show_help = true,
            "-V" | "--version" => config.show_version = true,
            "--json" => config.json = true,
            "--trace" => config.trace = true,
            "--dump" => config.dump = true,
            "--provenance" => config.provenance = true,
            "--parallel" => config.parallel = true,
            "--save" => {
                let path = args.next().ok_or("--save requires a path")?;
                config.save = Some(PathBuf::from(path));
            }
            arg if arg.starts_with('-') => {
                return Err(format!("unknown option: {arg}").into());
            }
            path => {
                if config.input.is_some() {
                    return Err(format!("unexpected argument: {path}").into());
                }
                config.input = Some(PathBuf::from(path));
            }
        }
    }

    Ok(config)
}

fn init_tracing(trace: bool) {
    let filter = if trace {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = parse_args(args)?;

    if config.show_help {
        print_help();
        return Ok(());
    }

    if config.show_version {
        println!("tabula {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let Some(input) = config.input.as_deref() else {
        print_help();
        return Err("no input file".into());
    };

    init_tracing(config.trace);

    let session_config = SessionConfig::default().with_parallel_tables(config.parallel);
    let mut session = open(input, session_config)?;
    let snapshot = session.evaluate_all();

    if let Some(path) = &config.save {
        save_to_file(&session.state(), path)?;
        eprintln!("saved {}", path.display());
    }

    if config.json {
        print_json(&session, &snapshot, &config)?;
    } else {
        print_summary(&session, &snapshot, &config);
    }
    Ok(())
}

/// Opens a JSON project, or a saved snapshot for any other extension.
fn open(path: &Path, config: SessionConfig) -> Result<Session, Box<dyn std::error::Error>> {
    let is_json = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        let (session, report) = Project::load(path)?.into_session(config)?;
        for error in &report.rejected {
            eprintln!("\x1b[33mrejected rule: {error}\x1b[0m");
        }
        Ok(session)
    } else {
        Ok(Session::from_state(load_from_file(path)?, config)?)
    }
}

fn print_summary(session: &Session, snapshot: &Snapshot, config: &CliConfig) {
    println!("\x1b[1;36m=== Evaluation ===\x1b[0m");
    println!("Tables: {}", snapshot.outputs.len());
    println!("Provenance entries: {}", snapshot.entries.len());
    println!("Links: {}", snapshot.links.len());
    for (code, count) in session.skip_summary() {
        println!("Skipped ({code}): {count}");
    }
    for table in &snapshot.cancelled {
        println!("Cancelled: {table}");
    }

    let diagnostics = &snapshot.diagnostics;
    if !diagnostics.is_empty() {
        println!();
        println!("\x1b[1;33m=== Diagnostics ===\x1b[0m");
        for warning in diagnostics.all_warnings() {
            println!("  warning: {warning}");
        }
        for diagnostic in &diagnostics.top_level {
            println!("  error: {diagnostic}");
        }
    }

    if config.dump {
        for table in snapshot.outputs.iter() {
            println!();
            dump_table(table);
        }
    }

    if config.provenance {
        println!();
        println!("\x1b[1;36m=== Provenance ===\x1b[0m");
        for entry in &snapshot.entries {
            let e = &entry.effect;
            println!(
                "  {} pass {} tick {}: {} {} {:?} -> {:?} ({:?})",
                entry.id,
                entry.pass,
                e.tick,
                e.cell(),
                e.rule,
                e.prior,
                e.new,
                e.kind
            );
        }
    }
}

fn dump_table(table: &Table) {
    println!("\x1b[1m{} ({})\x1b[0m", table.name(), table.id());
    let header: Vec<&str> = table.columns().iter().map(|c| &*c.name).collect();
    println!("  {}", header.join(" | "));
    for row in 0..table.row_count() {
        let cells: Vec<String> = table
            .columns()
            .iter()
            .map(|c| table.get(row, c.id).map(ToString::to_string).unwrap_or_default())
            .collect();
        println!("  {}", cells.join(" | "));
    }
}

fn print_json(session: &Session, snapshot: &Snapshot, config: &CliConfig) -> Result<(), Box<dyn std::error::Error>> {
    let warnings: Vec<String> = snapshot
        .diagnostics
        .all_warnings()
        .map(ToString::to_string)
        .collect();
    let diagnostics: Vec<String> = snapshot
        .diagnostics
        .top_level
        .iter()
        .map(ToString::to_string)
        .collect();
    let mut summary = json!({
        "tables": snapshot.outputs.len(),
        "entries": snapshot.entries.len(),
        "links": snapshot.links,
        "skips": session.skip_summary(),
        "warnings": warnings,
        "diagnostics": diagnostics,
        "cancelled": snapshot.cancelled,
    });
    if config.dump {
        summary["outputs"] = serde_json::to_value(snapshot.outputs.iter().collect::<Vec<_>>())?;
    }
    if config.provenance {
        summary["provenance"] = serde_json::to_value(&snapshot.entries)?;
    }
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn print_help() {
    println!(
        "\x1b[1mTabula\x1b[0m - Rule engine for cleaning, tagging, and linking tables

\x1b[1mUSAGE:\x1b[0m
    tabula [OPTIONS] <INPUT>

\x1b[1mARGUMENTS:\x1b[0m
    <INPUT>    A .json project file, or a saved snapshot

\x1b[1mOPTIONS:\x1b[0m
    -h, --help         Print help information
    -V, --version      Print version information
    --json             Print the summary as JSON
    --dump             Print every evaluated table
    --provenance       Print every provenance entry
    --parallel         Evaluate independent tables in parallel
    --save FILE        Save tables and rules as a snapshot
    --trace            Log at debug level (otherwise RUST_LOG, default warn)

\x1b[1mEXAMPLES:\x1b[0m
    tabula project.json                 Evaluate and summarize
    tabula --dump project.json          Show cleaned tables
    tabula --save snap.msgpack p.json   Evaluate and save a snapshot
    tabula --json --provenance snap.msgpack"
    );
}
