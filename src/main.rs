use std::error::Error;
use std::sync::Arc;

use scaleout_transport::config::load_config;
use scaleout_transport::utils::logging;
use scaleout_transport::{ConnectionManager, Message, PartitionRouter};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let settings = load_config()?;
    logging::init(&settings.logging.level);

    let connection = ConnectionManager::open(
        &settings.transport.endpoint,
        settings.connection_options(),
    )?;

    let receiver = |stream_id: &str, sequence_number: u64, messages: Vec<Message>| {
        info!(
            stream_id = %stream_id,
            sequence_number,
            count = messages.len(),
            "Received batch"
        );
    };
    let router = PartitionRouter::start(
        Arc::new(connection),
        settings.router_options(),
        Arc::new(receiver),
    )
    .await?;

    let node = uuid::Uuid::new_v4().to_string();
    match router
        .send(vec![Message::new(node.as_str(), "node", "online")])
        .await
    {
        Ok(()) => {
            info!(node = %node, topics = ?router.topics(), "Transport running, press Ctrl-C to stop");
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
        }
        Err(e) => error!(node = %node, error = %e, "Failed to announce node, shutting down"),
    }

    router.shutdown().await?;
    Ok(())
}
