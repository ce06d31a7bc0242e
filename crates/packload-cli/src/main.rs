use packload_core::logging;

mod cli;

use crate::cli::CliCommand;

#[tokio::main]
async fn main() {
    let target = logging::init_logging();
    tracing::debug!(%target, "log target");

    if let Err(err) = CliCommand::run_from_args().await {
        eprintln!("packload error: {:#}", err);
        std::process::exit(1);
    }
}
