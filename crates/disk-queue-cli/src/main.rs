use disk_queue_cli::run_cli;
use tracing::error;

fn main() {
    // Run CLI and handle errors
    if let Err(e) = run_cli() {
        error!("CLI error: {}", e);
        eprintln!("error: {}", e);

        // Exit with appropriate code based on error type
        std::process::exit(e.exit_code());
    }
}
