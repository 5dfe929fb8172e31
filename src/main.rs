use clap::Parser;
use epf_ingest::cli::{args::Args, commands};
use std::process;

fn main() {
    let args = Args::parse();

    let _log_guard = match commands::setup_logging(&args) {
        Ok(guard) => guard,
        Err(error) => {
            eprintln!("Failed to initialize logging: {:#}", error);
            process::exit(1);
        }
    };

    let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        eprintln!("Failed to create async runtime: {}", e);
        process::exit(1);
    });

    let result = runtime.block_on(async {
        // The import is synchronous database work; run it off the reactor so
        // CTRL+C can still be observed. Progress already saved in the
        // snapshot lets the next run continue with --resume.
        let import_args = args.clone();
        let import = tokio::task::spawn_blocking(move || commands::run(&import_args));
        let shutdown_signal = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("Failed to listen for CTRL+C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            joined = import => match joined {
                Ok(result) => result,
                Err(join_error) => Err(anyhow::anyhow!("Import task failed: {}", join_error)),
            },
            _ = shutdown_signal => {
                eprintln!(
                    "\nReceived CTRL+C; progress is saved in {}, continue with --resume",
                    args.snapshot_file.display()
                );
                process::exit(130)
            }
        }
    });

    match result {
        Ok(summary) => {
            commands::print_summary(&summary);
            process::exit(if summary.is_clean() { 0 } else { 2 });
        }
        Err(error) => {
            eprintln!("Error: {:#}", error);
            process::exit(1);
        }
    }
}
