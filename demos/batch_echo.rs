use clap::Parser;

use batchrun::config::{ExecutionPolicy, ExecutorConfig};
use batchrun::exec::BatchExecutor;

#[derive(Parser, Debug)]
#[command(name = "batch-echo")]
#[command(about = "Echo generated file arguments through the batch executor")]
struct Args {
    /// Number of synthetic file arguments to generate
    #[arg(long, default_value = "100")]
    count: usize,

    /// Argument-length limit, small enough to make the chunking visible
    #[arg(long, default_value = "512")]
    max_arg_length: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let command = vec!["echo".to_string()];
    let files: Vec<String> = (0..args.count)
        .map(|i| format!("file-{i:04}.txt"))
        .collect();

    let executor =
        BatchExecutor::new(ExecutorConfig::default().with_max_arg_length(args.max_arg_length));
    let result = executor
        .run(&command, &files, &ExecutionPolicy::default())
        .await?;

    // One echo line per chunk.
    print!("{}", String::from_utf8_lossy(&result.output));
    println!("exit code: {}", result.exit_code);

    Ok(())
}
