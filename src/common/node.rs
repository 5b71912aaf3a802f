//! Identity of a DHT node seen while crawling.

use std::net::SocketAddr;

use crate::common::Id;

#[derive(Debug, Clone, PartialEq, Eq)]
/// A DHT node that was queried or responded during a crawl.
///
/// Tracked separately from the engine's own routing records; the harness
/// only needs enough identity to attribute results and follow-up requests.
pub struct Node {
    pub id: Id,
    pub address: SocketAddr,
}

impl Node {
    pub fn new(id: Id, address: SocketAddr) -> Self {
        Self { id, address }
    }
}
