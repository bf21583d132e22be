use std::process::ExitCode;

use signalbus::archive::ArchiveWriter;
use signalbus::assistant_client::AssistantClient;
use signalbus::auth::AuthorizationPolicy;
use signalbus::config::Config;
use signalbus::error::BridgeError;
use signalbus::group_cache::GroupResolver;
use signalbus::receive_loop::ReceiveLoop;
use signalbus::router::MessageRouter;
use signalbus::signal_client::SignalClient;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "fatal startup error");
            ExitCode::FAILURE
        }
    }
}

/// Constructs every component and supervises the two long-lived tasks.
/// Both fallible startup steps fold into [`BridgeError`] here, at the one
/// boundary that needs the union of every component's error type (§4.12).
async fn run() -> Result<(), BridgeError> {
    let config = Config::from_env().map_err(BridgeError::from)?;

    if config.authorization_whitelist.is_empty() {
        warn!("AUTHORIZATION_WHITELIST is empty, every inbound message will be denied");
    }

    let cancellation = CancellationToken::new();

    info!("connecting to database...");
    let (archive_writer, archive_handle) = ArchiveWriter::connect(
        &config.database.connection_url(),
        config.archive.max_connections,
        config.archive.queue_capacity,
        config.archive.batch_size,
        config.archive.batch_timeout,
        cancellation.clone(),
    )
    .await
    .map_err(BridgeError::from)?;
    info!("migrations applied");

    let http = reqwest::Client::new();
    let groups = GroupResolver::new(
        http.clone(),
        format!("http://{}", config.signal_endpoint),
        config.registered_account.clone(),
        config.group_cache_size,
    );
    let auth = AuthorizationPolicy::new(&config.authorization_whitelist);
    let signal = SignalClient::new(
        http.clone(),
        format!("http://{}", config.signal_endpoint),
        config.registered_account.clone(),
    );
    let assistant = AssistantClient::new(http, config.webhook_url.clone(), &config.auth_token);

    let router = MessageRouter::new(
        config.registered_account.clone(),
        auth,
        groups,
        archive_handle,
        signal,
        assistant,
    );
    let receive_loop = ReceiveLoop::new(
        &format!("http://{}", config.signal_endpoint),
        &config.registered_account,
        router,
        cancellation.clone(),
    );

    let mut archive_task = tokio::spawn(archive_writer.run());
    let mut receive_task = tokio::spawn(async move { receive_loop.run().await });

    tokio::select! {
        () = shutdown_signal() => {
            info!("shutdown signal received, draining");
            cancellation.cancel();
            let _ = receive_task.await;
            let _ = archive_task.await;
        }
        _ = &mut receive_task => {
            warn!("receive loop exited unexpectedly");
            cancellation.cancel();
            let _ = archive_task.await;
        }
        _ = &mut archive_task => {
            warn!("archive writer exited unexpectedly");
            cancellation.cancel();
            let _ = receive_task.await;
        }
    }

    Ok(())
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger graceful shutdown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
