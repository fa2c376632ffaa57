use clap::Parser;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use osync::cli::Cli;
use osync::error::RunError;
use osync::message;
use osync::storage;
use osync::sync::Sync;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let full_command = std::env::args().collect::<Vec<_>>().join(" ");
    let options = cli.sync_options();

    let (srcurl, dsturl) = match cli.validate() {
        Ok(urls) => urls,
        Err(err) => {
            message::print_error(&full_command, "sync", &err, options.log_format);
            return ExitCode::from(1);
        }
    };

    let src_client = match storage::client_for(&srcurl, &options.storage) {
        Ok(client) => client,
        Err(err) => {
            message::print_error(&full_command, "sync", &err, options.log_format);
            return ExitCode::from(1);
        }
    };
    let dst_client = match storage::client_for(&dsturl, &options.storage) {
        Ok(client) => client,
        Err(err) => {
            message::print_error(&full_command, "sync", &err, options.log_format);
            return ExitCode::from(1);
        }
    };

    // One cancellation context for the whole run; Ctrl-C turns in-flight
    // work into silent skips.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let run = Sync::new(
        src_client,
        dst_client,
        srcurl,
        dsturl,
        options,
        cancel,
        full_command,
    );

    match run.run().await {
        Ok(()) => ExitCode::SUCCESS,
        // Per-item failures were already printed by the sink.
        Err(RunError::Aggregate(_)) => ExitCode::from(1),
        Err(RunError::Fatal(_)) => ExitCode::from(2),
    }
}
