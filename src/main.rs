// src/main.rs

use batchdag::dispatch::RunOutcome;
use batchdag::{cli, logging, run};

#[tokio::main]
async fn main() {
    if let Err(err) = run_main().await {
        eprintln!("batchdag error: {err:?}");
        std::process::exit(1);
    }
}

async fn run_main() -> anyhow::Result<()> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    match run(args).await? {
        RunOutcome::Completed(_) => {}
        RunOutcome::Aborted => println!("Aborted; nothing was submitted."),
    }
    Ok(())
}
