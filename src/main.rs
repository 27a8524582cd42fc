//! hdfs-linkd entry point.

use std::sync::Arc;

use log::{error, info};
use tokio::signal;
use tokio::sync::mpsc;

use hdfs_link::resolver::HickoryResolver;
use hdfs_link::transport::{StdioTransport, Transport};
use hdfs_link::{role_from_config, run_agent, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    // Load configuration
    let cfg = Config::load()?;
    info!("Starting hdfs-linkd with config: {:?}", cfg);

    let transport = Arc::new(StdioTransport::stdio());
    let (input_tx, input_rx) = mpsc::channel(cfg.channel_capacity);
    let (output_tx, mut output_rx) = mpsc::channel(cfg.channel_capacity);

    // Event source
    let transport_in = Arc::clone(&transport);
    let reader_handle = tokio::spawn(async move {
        if let Err(e) = transport_in.run(input_tx).await {
            error!("Transport failed: {}", e);
        }
    });

    // Output sink
    let transport_out = Arc::clone(&transport);
    let writer_handle = tokio::spawn(async move {
        while let Some(output) = output_rx.recv().await {
            if let Err(e) = transport_out.deliver(&output).await {
                error!("Failed to deliver output: {}", e);
                break;
            }
        }
    });

    // Reconciliation
    let mut role = role_from_config(&cfg);
    let mut agent_handle = tokio::spawn(async move {
        let resolver = HickoryResolver::new();
        if let Err(e) = run_agent(role.as_mut(), &resolver, input_rx, output_tx).await {
            error!("Agent failed: {}", e);
        }
    });

    tokio::select! {
        res = signal::ctrl_c() => match res {
            Ok(()) => info!("Received Ctrl+C, shutting down..."),
            Err(err) => error!("Unable to listen for shutdown signal: {}", err),
        },
        _ = &mut agent_handle => {
            // Let the sink flush what the agent produced.
            let _ = writer_handle.await;
            reader_handle.abort();
            info!("Shutdown complete.");
            return Ok(());
        }
    }

    reader_handle.abort();
    agent_handle.abort();
    writer_handle.abort();

    info!("Shutdown complete.");
    Ok(())
}
