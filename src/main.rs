//! Length-prefixed echo server built on `wiresession`.
//!
//! Every frame received is written back to its sender.

mod cli;

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use clap::Parser;
use tracing::info;
use wiresession::{
    BoxError,
    Handler,
    LengthPrefixedProtocol,
    MetricsMonitor,
    Session,
    SessionConfig,
    SessionError,
    SessionServer,
    StateEvent,
    protocol::LENGTH_HEADER_SIZE,
};

struct Echo {
    protocol: LengthPrefixedProtocol,
}

impl Handler for Echo {
    type Message = Bytes;

    fn process(&self, session: &Session, message: Bytes) -> Result<(), BoxError> {
        let mut frame = BytesMut::with_capacity(LENGTH_HEADER_SIZE + message.len());
        self.protocol.encode(&message, &mut frame)?;
        session.write(&frame)?;
        Ok(())
    }

    fn state_event(&self, session: &Session, event: StateEvent, cause: Option<&SessionError>) {
        if let Some(cause) = cause {
            info!(id = %session.id(), %event, %cause, "echo session event");
        }
    }
}

#[cfg(feature = "metrics")]
fn install_metrics(addr: std::net::SocketAddr) -> Result<(), BoxError> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    info!(%addr, "serving metrics");
    Ok(())
}

#[cfg(not(feature = "metrics"))]
fn install_metrics(addr: std::net::SocketAddr) -> Result<(), BoxError> {
    tracing::warn!(%addr, "built without the metrics feature; ignoring --metrics-addr");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt::init();

    let cli = cli::Cli::parse();
    if let Some(addr) = cli.metrics_addr {
        install_metrics(addr)?;
    }

    let protocol = LengthPrefixedProtocol::new(cli.max_frame);
    let config = SessionConfig::default()
        .buffer_size(cli.buffer_size.max(LENGTH_HEADER_SIZE + protocol.max_frame_length()))
        .monitor(Arc::new(MetricsMonitor));
    let server = SessionServer::new(protocol, Echo { protocol })
        .config(config)
        .bind(cli.listen)?;
    info!(addr = ?server.local_addr(), "echo server starting");
    server.run().await?;
    Ok(())
}
