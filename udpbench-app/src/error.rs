use std::io;

use thiserror::Error;

/// Rejected generator parameters. Nothing is sent when configuration fails.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("packets per iteration must be positive, got {0}")]
    NonPositivePacketCount(i64),
    #[error("rate of {rate} pps is below the minimum of {min} pps")]
    RateBelowMinimum { rate: i64, min: i64 },
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to resolve {host}:{port}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },
    #[error("no IPv4 address found for {host}:{port}")]
    NoIpv4Address { host: String, port: u16 },
    #[error("socket error: {0}")]
    Io(#[from] io::Error),
}
