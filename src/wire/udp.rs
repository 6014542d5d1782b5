//! Unconnected UDP socket wrapper used by the UDP tracker client: every send
//! targets an explicit address and every receive carries its own deadline,
//! since there is no connection state to lean on.
use super::{WireError, WireResult};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::instrument;

pub struct UdpConnector {
    socket: UdpSocket,
}

impl UdpConnector {
    pub async fn bind() -> WireResult<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        Ok(Self { socket })
    }

    #[instrument(skip(self, buf), level = "trace")]
    pub async fn send_to(&self, buf: &[u8], addr: SocketAddr) -> WireResult<()> {
        self.socket.send_to(buf, addr).await?;
        Ok(())
    }

    #[instrument(skip(self), level = "trace")]
    pub async fn recv(&self, max_len: usize, read_timeout: Duration) -> WireResult<(Vec<u8>, SocketAddr)> {
        let mut buf = vec![0u8; max_len];
        let (n, from) = timeout(read_timeout, self.socket.recv_from(&mut buf))
            .await
            .map_err(|_| WireError::Timeout)??;
        buf.truncate(n);
        Ok((buf, from))
    }
}
