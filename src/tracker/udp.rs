//! BEP 15 UDP tracker announce protocol: a connect handshake that exchanges
//! a short-lived connection id, followed by an announce carrying that id.
use super::{AnnounceRequest, AnnounceResponse, TrackerError, TrackerResult};
use crate::wire::udp::UdpConnector;
use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use rand::Rng;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::instrument;
use url::Url;

const MAGIC_CONSTANT: u64 = 0x41727101980;
const ACTION_CONNECT: u32 = 0;
const ACTION_ANNOUNCE: u32 = 1;
const ACTION_ERROR: u32 = 3;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const ANNOUNCE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct UdpTracker {
    connector: UdpConnector,
    addr: SocketAddr,
}

impl UdpTracker {
    pub async fn connect_to(url: &Url) -> TrackerResult<Self> {
        let host = url
            .host_str()
            .ok_or_else(|| TrackerError::Malformed("udp tracker URL has no host".into()))?;
        let port = url
            .port()
            .ok_or_else(|| TrackerError::Malformed("udp tracker URL has no port".into()))?;
        let addr = tokio::net::lookup_host((host, port))
            .await?
            .next()
            .ok_or_else(|| TrackerError::Malformed(format!("could not resolve {host}")))?;
        Ok(Self {
            connector: UdpConnector::bind().await?,
            addr,
        })
    }

    #[instrument(skip(self), level = "debug")]
    async fn establish_connection_id(&self) -> TrackerResult<u64> {
        let tid: u32 = rand::rng().random();
        let mut packet = Vec::with_capacity(16);
        packet.write_u64::<BigEndian>(MAGIC_CONSTANT).unwrap();
        packet.write_u32::<BigEndian>(ACTION_CONNECT).unwrap();
        packet.write_u32::<BigEndian>(tid).unwrap();
        self.connector.send_to(&packet, self.addr).await?;

        let (resp, _) = self.connector.recv(16, CONNECT_TIMEOUT).await?;
        if resp.len() < 16 {
            return Err(TrackerError::Malformed("connect response too short".into()));
        }
        let action = BigEndian::read_u32(&resp[0..4]);
        let transaction_id = BigEndian::read_u32(&resp[4..8]);
        if transaction_id != tid {
            return Err(TrackerError::TransactionMismatch);
        }
        if action != ACTION_CONNECT {
            return Err(TrackerError::Malformed(format!("unexpected connect action {action}")));
        }
        Ok(BigEndian::read_u64(&resp[8..16]))
    }

    #[instrument(skip(self, request), level = "debug")]
    pub async fn announce(&self, request: &AnnounceRequest) -> TrackerResult<AnnounceResponse> {
        let connection_id = self.establish_connection_id().await?;
        let tid: u32 = rand::rng().random();
        let key: u32 = rand::rng().random();

        let mut packet = Vec::with_capacity(98);
        packet.write_u64::<BigEndian>(connection_id).unwrap();
        packet.write_u32::<BigEndian>(ACTION_ANNOUNCE).unwrap();
        packet.write_u32::<BigEndian>(tid).unwrap();
        packet.extend_from_slice(&request.info_hash);
        packet.extend_from_slice(&request.peer_id);
        packet.write_u64::<BigEndian>(request.downloaded as u64).unwrap();
        packet.write_u64::<BigEndian>(request.left as u64).unwrap();
        packet.write_u64::<BigEndian>(request.uploaded as u64).unwrap();
        packet.write_u32::<BigEndian>(0).unwrap(); // event: none
        packet.write_u32::<BigEndian>(0).unwrap(); // IP: default
        packet.write_u32::<BigEndian>(key).unwrap();
        packet.write_i32::<BigEndian>(-1).unwrap(); // num_want: default
        packet.write_u16::<BigEndian>(request.port).unwrap();

        self.connector.send_to(&packet, self.addr).await?;
        let (resp, _) = self.connector.recv(2048, ANNOUNCE_TIMEOUT).await?;
        if resp.len() < 8 {
            return Err(TrackerError::Malformed("announce response too short".into()));
        }
        let action = BigEndian::read_u32(&resp[0..4]);
        let transaction_id = BigEndian::read_u32(&resp[4..8]);

        if action == ACTION_ERROR {
            let message = String::from_utf8_lossy(&resp[8..]).into_owned();
            return Err(TrackerError::Failure(message));
        }
        if transaction_id != tid {
            return Err(TrackerError::TransactionMismatch);
        }
        if action != ACTION_ANNOUNCE || resp.len() < 20 {
            return Err(TrackerError::Malformed(format!("unexpected announce action {action}")));
        }

        let interval = BigEndian::read_u32(&resp[8..12]);
        let peers = super::parse_compact_peers(&resp[20..]);
        Ok(AnnounceResponse { interval, peers })
    }
}
