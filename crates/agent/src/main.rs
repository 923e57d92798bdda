use std::sync::Arc;

use totem_agent::{
    AgentConfig, HttpQueueClient, PollingLoop, PrintExecutor, RawTcpExecutor, SpoolExecutor,
};

#[tokio::main]
async fn main() {
    totem_observability::init();

    let config = match AgentConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            // Fatal: refuse to start rather than poll with a broken setup.
            eprintln!("configuration error: {err}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        terminal_id = %config.terminal_id,
        backend_url = %config.backend_url,
        interval_ms = config.polling_interval.as_millis() as u64,
        "starting print agent"
    );

    let client = match HttpQueueClient::new(
        &config.backend_url,
        config.terminal_id.clone(),
        &config.agent_token,
    ) {
        Ok(client) => client,
        Err(err) => {
            eprintln!("failed to construct backend client: {err}");
            std::process::exit(1);
        }
    };

    let printer: Arc<dyn PrintExecutor> = match &config.printer_addr {
        Some(addr) => Arc::new(RawTcpExecutor::new(addr.clone())),
        None => Arc::new(SpoolExecutor::new(config.printer_name.clone())),
    };

    let polling = PollingLoop::from_config(client, printer, &config);
    let shutdown = polling.shutdown_signal();

    tokio::spawn(async move {
        wait_for_termination().await;
        tracing::info!("termination signal received, draining");
        shutdown.trigger();
    });

    polling.run().await;
    tracing::info!("print agent stopped");
}

/// Resolve on SIGINT or SIGTERM.
async fn wait_for_termination() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
