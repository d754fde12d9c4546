//! Sluice CLI

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::{LabeledSpan, MietteDiagnostic, NamedSource, Report};
use sluice_ir::Registry;
use sluice_parser::format_pipeline;
use sluice_runtime::{load_records_file, parse_source, run_stages, ExecConfig, Executor, Staged};
use sluice_types::{Collector, Diagnostic, ElementType, Severity};

#[derive(Parser)]
#[command(name = "sluice")]
#[command(version = "0.1.0")]
#[command(about = "Compile and run event pipelines")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a pipeline and report diagnostics
    Check {
        #[command(flatten)]
        pipeline: PipelineArgs,
        /// Type check against event input instead of no input
        #[arg(long)]
        events: bool,
    },
    /// Run a pipeline and print the resulting events
    Run {
        #[command(flatten)]
        pipeline: PipelineArgs,
        /// Records to feed into the pipeline, written as a list literal
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Events per batch
        #[arg(long, default_value_t = sluice_runtime::DEFAULT_BATCH_SIZE)]
        batch_size: usize,
        /// Print execution statistics to stderr
        #[arg(long)]
        stats: bool,
        #[command(flatten)]
        dumps: DumpArgs,
    },
    /// Format a pipeline file
    Fmt {
        /// File to format
        file: PathBuf,
        /// Check formatting without modifying
        #[arg(long)]
        check: bool,
    },
}

#[derive(Args)]
struct PipelineArgs {
    /// File containing the pipeline
    #[arg(required_unless_present = "expr")]
    file: Option<PathBuf>,
    /// Pipeline given inline
    #[arg(short, long, conflicts_with = "file")]
    expr: Option<String>,
    /// Define a user-defined operator, e.g. `--define big='where size > 5'`
    #[arg(long = "define", value_name = "NAME=PIPELINE", value_parser = parse_define)]
    defines: Vec<(String, String)>,
}

#[derive(Args)]
struct DumpArgs {
    /// Print the parsed pipeline and stop
    #[arg(long)]
    dump_ast: bool,
    /// Print the IR and stop
    #[arg(long)]
    dump_ir: bool,
    /// Print the instantiated IR and stop
    #[arg(long)]
    dump_inst_ir: bool,
    /// Print the optimized IR and stop
    #[arg(long)]
    dump_opt_ir: bool,
    /// Print the executable plan and stop
    #[arg(long)]
    dump_finalized: bool,
    /// Skip filter pushdown
    #[arg(long)]
    no_optimize: bool,
}

impl From<&DumpArgs> for ExecConfig {
    fn from(args: &DumpArgs) -> Self {
        ExecConfig {
            dump_ast: args.dump_ast,
            dump_ir: args.dump_ir,
            dump_inst_ir: args.dump_inst_ir,
            dump_opt_ir: args.dump_opt_ir,
            dump_finalized: args.dump_finalized,
            optimize: !args.no_optimize,
        }
    }
}

fn parse_define(arg: &str) -> Result<(String, String), String> {
    match arg.split_once('=') {
        Some((name, pipeline)) if !name.trim().is_empty() => Ok((name.trim().to_string(), pipeline.to_string())),
        _ => Err(format!("expected NAME=PIPELINE, got `{}`", arg)),
    }
}

fn main() -> ExitCode {
    init_tracing();
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .build(),
        )
    }))
    .ok();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr, filtered by `SLUICE_LOG` (e.g. `SLUICE_LOG=sluice_ir=trace`).
fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_env("SLUICE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .with(filter)
        .init();
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Check { pipeline, events } => cmd_check(&pipeline, events),
        Command::Run {
            pipeline,
            input,
            batch_size,
            stats,
            dumps,
        } => cmd_run(&pipeline, input, batch_size, stats, &dumps),
        Command::Fmt { file, check } => cmd_fmt(&file, check),
    }
}

/// A pipeline source and the name it is reported under.
struct Source {
    name: String,
    text: String,
}

impl PipelineArgs {
    fn source(&self) -> Result<Source, Box<dyn std::error::Error>> {
        match (&self.file, &self.expr) {
            (_, Some(expr)) => Ok(Source {
                name: "<expr>".to_string(),
                text: expr.clone(),
            }),
            (Some(file), None) => Ok(Source {
                name: file.display().to_string(),
                text: std::fs::read_to_string(file)?,
            }),
            (None, None) => Err("no pipeline given".into()),
        }
    }

    /// The builtin registry plus every `--define`.
    fn registry(&self) -> Result<Registry, Box<dyn std::error::Error>> {
        let mut reg = Registry::builtin();
        for (name, text) in &self.defines {
            let dh = Collector::new();
            let source = Source {
                name: format!("--define {}", name),
                text: text.clone(),
            };
            match parse_source(text, &dh) {
                Ok(definition) => reg.add_user_defined(name.as_str(), definition),
                Err(_) => {
                    report_all(&dh, &source);
                    return Err(format!("invalid definition of `{}`", name).into());
                }
            }
        }
        Ok(reg)
    }
}

fn cmd_check(args: &PipelineArgs, events: bool) -> Result<(), Box<dyn std::error::Error>> {
    let source = args.source()?;
    let reg = args.registry()?;
    let dh = Collector::new();
    let input = if events { ElementType::Events } else { ElementType::Void };
    let result = run_stages(&source.text, input, &reg, &dh, &ExecConfig::default());
    report_all(&dh, &source);
    match result {
        Ok(Staged::Plan { plan, output }) => {
            println!("OK: {} -> {}, {} operator(s)", input, output, plan.len());
            Ok(())
        }
        Ok(Staged::Dump(_)) => Ok(()),
        Err(_) => Err("compilation failed".into()),
    }
}

fn cmd_run(
    args: &PipelineArgs,
    input: Option<PathBuf>,
    batch_size: usize,
    stats: bool,
    dumps: &DumpArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let source = args.source()?;
    let reg = args.registry()?;
    let dh = Collector::new();
    let records = match &input {
        Some(path) => load_records_file(path, reg.functions())?,
        None => Vec::new(),
    };
    let input_type = if input.is_some() { ElementType::Events } else { ElementType::Void };

    let result = run_stages(&source.text, input_type, &reg, &dh, &ExecConfig::from(dumps));
    report_all(&dh, &source);
    let plan = match result {
        Ok(Staged::Dump(text)) => {
            println!("{}", text);
            return Ok(());
        }
        Ok(Staged::Plan { plan, .. }) => plan,
        Err(_) => return Err("compilation failed".into()),
    };

    let executor = Executor::new(reg.functions(), &dh).with_batch_size(batch_size)?;
    let outcome = executor.run(plan, records);
    report_all(&dh, &source);
    let output = outcome?;
    for record in &output.records {
        println!("{}", record);
    }
    if stats {
        eprintln!(
            "{} events in, {} events out, {} batch(es) in {}ms",
            output.stats.rows_read, output.stats.rows_written, output.stats.batches, output.stats.duration_ms
        );
    }
    Ok(())
}

fn cmd_fmt(file: &Path, check: bool) -> Result<(), Box<dyn std::error::Error>> {
    let source = Source {
        name: file.display().to_string(),
        text: std::fs::read_to_string(file)?,
    };
    let dh = Collector::new();
    let Ok(pipeline) = parse_source(&source.text, &dh) else {
        report_all(&dh, &source);
        return Err("parsing failed".into());
    };
    let formatted = format_pipeline(&pipeline);
    if check {
        if source.text.trim() != formatted.trim() {
            println!("Would reformat: {}", file.display());
            return Err("file needs formatting".into());
        }
        println!("OK: {}", file.display());
    } else {
        std::fs::write(file, &formatted)?;
        println!("Formatted: {}", file.display());
    }
    Ok(())
}

/// Render and drain everything collected so far.
fn report_all(dh: &Collector, source: &Source) {
    for diag in dh.take() {
        eprintln!("{:?}", to_report(diag, source));
    }
}

fn to_report(diag: Diagnostic, source: &Source) -> Report {
    let severity = match diag.severity {
        Severity::Error => miette::Severity::Error,
        Severity::Warning => miette::Severity::Warning,
        Severity::Note => miette::Severity::Advice,
    };
    let labels = diag
        .annotations
        .iter()
        .filter(|a| !a.span.is_unknown())
        .map(|a| {
            let text = (!a.text.is_empty()).then(|| a.text.clone());
            if a.primary {
                LabeledSpan::new_primary_with_span(text, a.span)
            } else {
                LabeledSpan::new_with_span(text, a.span)
            }
        });
    let mut help: Vec<String> = diag.hints.iter().map(|h| format!("hint: {}", h)).collect();
    help.extend(diag.notes.iter().map(|n| format!("note: {}", n)));
    if let Some(usage) = &diag.usage {
        help.push(format!("usage: {}", usage));
    }
    let mut report = MietteDiagnostic::new(diag.message)
        .with_severity(severity)
        .with_labels(labels);
    if !help.is_empty() {
        report = report.with_help(help.join("\n"));
    }
    if let Some(docs) = diag.docs {
        report = report.with_url(docs);
    }
    Report::new(report).with_source_code(NamedSource::new(&source.name, source.text.clone()))
}
