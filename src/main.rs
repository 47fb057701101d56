// src/main.rs

use gridstage::{cli, logging, run};

/// Exit statuses above this are truncated by the OS.
const MAX_EXIT_CODE: usize = 255;

#[tokio::main]
async fn main() {
    match run_main().await {
        Ok(errors) => std::process::exit(errors.min(MAX_EXIT_CODE) as i32),
        Err(err) => {
            eprintln!("gridstage error: {err:?}");
            std::process::exit(1);
        }
    }
}

async fn run_main() -> anyhow::Result<usize> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    Ok(run(args).await?)
}
