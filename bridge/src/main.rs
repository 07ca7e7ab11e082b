use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use log::debug;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

use tfchain_bridge::bridge::Bridge;
use tfchain_bridge::config::BridgeConfig;
use tfchain_bridge::error::is_cancelled;
use tfchain_bridge::logger::{self, LogSource};

/// Deadline for connecting to tfchain and horizon at startup.
const INIT_TIMEOUT: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> ExitCode {
    let config = BridgeConfig::parse();
    logger::init(config.debug);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(err) => {
                    logger::failure(
                        "signal_handler_failed",
                        "availability",
                        "",
                        &format!("cannot install SIGTERM handler: {err}"),
                    );
                    return;
                }
            };
            debug!("awaiting signal");
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
            debug!("shutting down now");
            cancel.cancel();
        }
    });

    let bridge = match tokio::time::timeout(INIT_TIMEOUT, Bridge::new(&config)).await {
        Ok(Ok(bridge)) => bridge,
        Ok(Err(err)) => {
            logger::failure(
                "bridge_init_aborted",
                "availability",
                "",
                &format!("the bridge instance cannot be started: {err:#}"),
            );
            return ExitCode::FAILURE;
        }
        Err(_) => {
            logger::failure(
                "bridge_init_aborted",
                "availability",
                "",
                "the bridge instance cannot be started: init deadline exceeded",
            );
            return ExitCode::FAILURE;
        }
    };

    logger::log_source(&LogSource {
        instance_public_key: bridge.stellar_address().to_string(),
        bridge_wallet_address: config.stellar.stellar_bridge_account.clone(),
        stellar_network: config.stellar.stellar_network.to_string(),
        tfchain_url: config.tfchain_url.clone(),
    });

    match bridge.start(cancel).await {
        Err(err) if !is_cancelled(&err) => {
            logger::failure(
                "bridge_unexpectedly_exited",
                "availability",
                "",
                &format!("the bridge instance has exited unexpectedly: {err:#}"),
            );
            ExitCode::FAILURE
        }
        _ => {
            logger::event(
                "bridge_stopped",
                "availability",
                "",
                "the bridge instance has stopped",
            );
            ExitCode::SUCCESS
        }
    }
}
