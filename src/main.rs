use std::io::Write;

use clap::{Parser, ValueEnum};
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tracing_subscriber::EnvFilter;

use batchrun::config::{ExecutionPolicy, ExecutorConfig};
use batchrun::exec::BatchExecutor;
use batchrun::precache::Precacher;
use batchrun::shutdown;

#[derive(Parser, Debug)]
#[command(name = "batchrun")]
#[command(version)]
#[command(about = "Run a command over many file arguments in argument-length-safe batches")]
struct Args {
    /// File holding newline-separated file arguments, or "-" for stdin
    #[arg(long, short = 'f', default_value = "-")]
    files: String,

    /// Force a single invocation covering every file argument
    #[arg(long)]
    serial: bool,

    /// Ask the invoked tool for colorized output
    #[arg(long)]
    color: bool,

    /// Maximum number of chunk subprocesses running at once
    /// (default: available CPUs)
    #[arg(long, short = 'j')]
    jobs: Option<usize>,

    /// Override the platform argument-length limit, in bytes
    #[arg(long)]
    max_arg_length: Option<usize>,

    /// Pull the docker image the command refers to before the batch starts
    #[arg(long)]
    precache: bool,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,

    /// The base command: program followed by its fixed arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    command: Vec<String>,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Serialize)]
struct BatchReport {
    exit_code: i32,
    files: usize,
    output: String,
    started_at_ms: i64,
    finished_at_ms: i64,
}

/// Read the file-argument list: one path per line, blank lines ignored.
async fn read_file_args(source: &str) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let contents = if source == "-" {
        let mut buf = String::new();
        tokio::io::stdin().read_to_string(&mut buf).await?;
        buf
    } else {
        tokio::fs::read_to_string(source).await?
    };

    Ok(contents
        .lines()
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr; stdout carries the batch output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let files = read_file_args(&args.files).await?;

    let policy = ExecutionPolicy {
        require_serial: args.serial,
        color: args.color,
    };

    let mut config =
        ExecutorConfig::default().with_cancellation(shutdown::install_shutdown_handler());
    if let Some(jobs) = args.jobs {
        config = config.with_max_workers(jobs);
    }
    if let Some(max_arg_length) = args.max_arg_length {
        config = config.with_max_arg_length(max_arg_length);
    }

    if args.precache {
        Precacher::default().warm(&args.command).await;
    }

    let started_at = chrono::Utc::now();
    let result = BatchExecutor::new(config)
        .run(&args.command, &files, &policy)
        .await?;
    let finished_at = chrono::Utc::now();

    match args.output {
        OutputFormat::Json => {
            let report = BatchReport {
                exit_code: result.exit_code,
                files: files.len(),
                output: String::from_utf8_lossy(&result.output).into_owned(),
                started_at_ms: started_at.timestamp_millis(),
                finished_at_ms: finished_at.timestamp_millis(),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Table => {
            std::io::stdout().write_all(&result.output)?;
        }
    }

    std::process::exit(result.exit_code);
}
