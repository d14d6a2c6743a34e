use std::io;
use std::net::Ipv4Addr;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("malformed frame: {0}")]
    Malformed(&'static str),

    #[error("{table} table full")]
    TableFull { table: &'static str },

    #[error("no gateway available for {0}")]
    NoGateway(Ipv4Addr),

    #[error("no resolved route for {0}")]
    NoRoute(Ipv4Addr),

    #[error("resolution of {0} timed out")]
    Timeout(Ipv4Addr),

    #[error("resolution of {0} cancelled")]
    Cancelled(Ipv4Addr),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("transmit failed: {0}")]
    Transmit(String),
}

pub type Result<T> = std::result::Result<T, Error>;
