//! Command line interface for the `wiresession` echo server.
//!
//! Also consumed by the build script to render the man page, so it depends
//! on nothing but `clap` and `std`.

use std::net::SocketAddr;

use clap::Parser;

/// Command line arguments for the `wiresession` binary.
#[derive(Debug, Parser)]
#[command(
    name = "wiresession",
    version,
    about = "Length-prefixed TCP echo server built on the wiresession engine"
)]
pub struct Cli {
    /// Address to listen on.
    #[arg(short, long, default_value = "127.0.0.1:7878")]
    pub listen: SocketAddr,

    /// Read buffer size per session, in bytes.
    #[arg(long, default_value_t = 4096)]
    pub buffer_size: usize,

    /// Largest accepted frame payload, in bytes.
    #[arg(long, default_value_t = 1024)]
    pub max_frame: usize,

    /// Serve Prometheus metrics on this address.
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,
}
