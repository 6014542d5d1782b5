//! TCP connector that dials lazily on the first `send`, mirroring how a peer
//! connection is only worth the cost of a handshake if we actually have
//! something to say to it.
use super::{WireError, WireResult};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::instrument;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TcpConnector {
    addr: SocketAddr,
    stream: Option<TcpStream>,
}

impl TcpConnector {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr, stream: None }
    }

    async fn ensure_connected(&mut self) -> WireResult<&mut TcpStream> {
        if self.stream.is_none() {
            let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(self.addr))
                .await
                .map_err(|_| WireError::Timeout)??;
            self.stream = Some(stream);
        }
        Ok(self.stream.as_mut().expect("just set"))
    }

    /// Dials now rather than waiting for the first `send`, for callers (like
    /// `peer::session::connect`) that need the raw, unsplit `TcpStream`
    /// immediately after connecting instead of going through `send`/`recv`.
    pub async fn dial(&mut self) -> WireResult<()> {
        self.ensure_connected().await?;
        Ok(())
    }

    /// Hands back the underlying stream once connected, consuming the
    /// connector. `None` if `dial`/`send` was never called.
    pub fn into_stream(self) -> Option<TcpStream> {
        self.stream
    }

    #[instrument(skip(self, buf), level = "trace")]
    pub async fn send(&mut self, buf: &[u8]) -> WireResult<()> {
        let stream = self.ensure_connected().await?;
        stream.write_all(buf).await?;
        Ok(())
    }

    /// Reads up to `max_len` bytes with a per-call deadline, returning
    /// whatever the socket has ready (at least one byte, unless EOF).
    #[instrument(skip(self), level = "trace")]
    pub async fn recv(&mut self, max_len: usize, read_timeout: Duration) -> WireResult<Vec<u8>> {
        let stream = self.stream.as_mut().ok_or(WireError::ConnectionClosed)?;
        let mut buf = vec![0u8; max_len];
        let n = timeout(read_timeout, stream.read(&mut buf))
            .await
            .map_err(|_| WireError::Timeout)??;
        if n == 0 {
            return Err(WireError::ConnectionClosed);
        }
        buf.truncate(n);
        Ok(buf)
    }

    /// Reads exactly `len` bytes, retrying short reads until the deadline.
    #[instrument(skip(self), level = "trace")]
    pub async fn recv_all(&mut self, len: usize, read_timeout: Duration) -> WireResult<Vec<u8>> {
        let stream = self.stream.as_mut().ok_or(WireError::ConnectionClosed)?;
        let mut buf = vec![0u8; len];
        timeout(read_timeout, stream.read_exact(&mut buf))
            .await
            .map_err(|_| WireError::Timeout)??;
        Ok(buf)
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Adopts an already-connected stream, e.g. from an inbound listener.
    pub fn from_stream(addr: SocketAddr, stream: TcpStream) -> Self {
        Self { addr, stream: Some(stream) }
    }
}
