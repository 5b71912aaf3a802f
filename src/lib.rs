//! Measurement harness that crawls a Kademlia DHT for the peers of
//! configured identifiers and announces itself on rotating port ranges.
//!
//! The harness sits on top of an external DHT engine (the [kad::DhtEngine]
//! trait): it starts peer searches, aggregates and deduplicates the
//! addresses responders reveal, writes them to daily log files, and keeps
//! a set of identifiers announced across a band of ports whose assignments
//! are persisted for later correlation. Everything runs single-threaded on
//! one [reactor::Reactor].

mod common;
mod error;
mod logfile;

pub mod announce;
pub mod config;
pub mod crawler;
pub mod harness;
pub mod kad;
pub mod reactor;
pub mod results;

pub use crate::common::{date_tag, now, parse_date_tag, Id, Node, ID_SIZE};
pub use crate::config::{Config, CursorMode, ExpiryMode};
pub use crate::error::Error;
pub use crate::harness::{setup, Harness};

pub type Result<T, E = Error> = std::result::Result<T, E>;
