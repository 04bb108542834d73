//! Transport establishment seam.

use std::io;

use async_trait::async_trait;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};

/// Dials the byte stream a shard connection runs over.
///
/// TLS termination, proxies, and in-memory test transports all slot in
/// here; the registry only requires an ordered byte stream.
#[async_trait]
pub trait Connector: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    /// Establish a stream to the given endpoint.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the dial fails.
    async fn connect(&self, host: &str, port: u16) -> io::Result<Self::Stream>;
}

/// Plain TCP connector.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self, host: &str, port: u16) -> io::Result<TcpStream> {
        TcpStream::connect((host, port)).await
    }
}
