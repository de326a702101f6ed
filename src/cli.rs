//! Command line interface for the `wsengine` demo server.

use std::net::SocketAddr;

use clap::Parser;

/// Command line arguments for the `wsengine` binary.
#[derive(Debug, Parser)]
#[command(
    name = "wsengine",
    version,
    about = "WebSocket echo and broadcast demo server"
)]
pub struct Cli {
    /// Address to listen on.
    #[arg(short, long, default_value = "127.0.0.1:9001")]
    pub bind: SocketAddr,

    /// Seconds of inactivity before a connection is closed.
    #[arg(long, default_value_t = 60)]
    pub ttl_secs: u64,

    /// Largest inbound message in bytes.
    #[arg(long, default_value_t = 64 * 1024)]
    pub max_frame_size: usize,

    /// Serve Prometheus metrics on this address.
    #[arg(long)]
    pub metrics_bind: Option<SocketAddr>,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::Cli;

    #[test]
    fn defaults_apply() {
        let cli = Cli::parse_from(["wsengine"]);
        assert_eq!(cli.bind.to_string(), "127.0.0.1:9001");
        assert_eq!(cli.ttl_secs, 60);
        assert!(cli.metrics_bind.is_none());
    }

    #[test]
    fn parses_overrides() {
        let cli = Cli::parse_from([
            "wsengine",
            "--bind",
            "0.0.0.0:8080",
            "--ttl-secs",
            "5",
            "--max-frame-size",
            "1024",
        ]);
        assert_eq!(cli.bind.port(), 8080);
        assert_eq!(cli.ttl_secs, 5);
        assert_eq!(cli.max_frame_size, 1024);
    }
}
