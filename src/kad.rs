//! Contract to the external Kademlia engine.
//!
//! The routing table, node liveness pinging and the wire protocol all live
//! behind [DhtEngine]; the harness only schedules searches and
//! announcements and consumes the discovery events the engine emits.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use bytes::Bytes;

use crate::common::{Id, Node};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Address family a search or announcement operates on.
pub enum AddressFamily {
    V4,
    V6,
}

#[derive(Debug, Clone)]
/// Discovery events delivered by the DHT engine while a search progresses.
pub enum DhtEvent {
    /// A responder returned zero or more packed peer addresses for `target`.
    Values {
        target: Id,
        from: Node,
        family: AddressFamily,
        /// Compact ip/port groups; see [decode_compact_peers].
        data: Bytes,
    },
    /// A responder signalled it has no more results for `target`.
    SearchDone {
        target: Id,
        from: Node,
        family: AddressFamily,
    },
}

/// Operations the harness drives on the external Kademlia engine.
pub trait DhtEngine {
    /// Consume pending datagrams and run the engine's own periodic work.
    /// Called once per reactor turn with the descriptor readiness.
    fn drive(&mut self, now: u64, readable: bool);

    /// Next discovery event, if any. Drained after every [DhtEngine::drive].
    fn poll_event(&mut self) -> Option<DhtEvent>;

    /// Start an iterative search for peers of `target`.
    fn start_search(&mut self, target: Id, port: u16, family: AddressFamily) -> Result<()>;

    /// Claim to serve `target` on `port`.
    fn announce(&mut self, target: Id, port: u16) -> Result<()>;

    /// Issue one more peer request to a responder that is still yielding
    /// new addresses for `target`.
    fn request_more(&mut self, target: Id, responder: &Node) -> Result<()>;

    /// Number of good nodes in the routing table. Announcement and
    /// ingestion work is skipped while this is zero.
    fn count_nodes(&self, family: AddressFamily) -> usize;
}

/// Decode compact ip/port groups: 6 bytes per v4 peer, 18 per v6, port in
/// network byte order. A trailing partial group is ignored.
pub fn decode_compact_peers(data: &[u8], family: AddressFamily) -> Vec<SocketAddr> {
    let group = match family {
        AddressFamily::V4 => 6,
        AddressFamily::V6 => 18,
    };

    data.chunks_exact(group)
        .map(|chunk| {
            let (ip_bytes, port_bytes) = chunk.split_at(group - 2);
            let port = u16::from_be_bytes([port_bytes[0], port_bytes[1]]);

            let ip = match family {
                AddressFamily::V4 => {
                    let mut octets = [0u8; 4];
                    octets.copy_from_slice(ip_bytes);
                    IpAddr::V4(Ipv4Addr::from(octets))
                }
                AddressFamily::V6 => {
                    let mut octets = [0u8; 16];
                    octets.copy_from_slice(ip_bytes);
                    IpAddr::V6(Ipv6Addr::from(octets))
                }
            };

            SocketAddr::new(ip, port)
        })
        .collect()
}
