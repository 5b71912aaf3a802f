//! Top-level wiring of the engines onto the run loop.

use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::Ordering;

use tracing::error;

use crate::announce::{AddResult, AnnounceTable, Lifetime};
use crate::common::Id;
use crate::config::Config;
use crate::crawler::Crawler;
use crate::kad::DhtEngine;
use crate::reactor::Reactor;
use crate::results::ResultTable;
use crate::Result;

/// The measurement harness: one DHT engine plus the crawl and
/// announcement state it drives.
pub struct Harness<E> {
    pub dht: E,
    pub results: ResultTable,
    pub announces: AnnounceTable,
    pub crawler: Crawler,
}

impl<E: DhtEngine> Harness<E> {
    pub fn new(config: &Config, dht: E) -> Self {
        Self {
            dht,
            results: ResultTable::new(config),
            announces: AnnounceTable::new(config),
            crawler: Crawler::new(config),
        }
    }

    /// Start a crawl for the peers of `query`. Returns None when the
    /// result table is at capacity.
    pub fn lookup(&mut self, query: &str, filename: &str, tag: &str, now: u64) -> Result<Option<Id>> {
        self.crawler
            .start(query, filename, tag, &mut self.results, &mut self.dht, now)
    }

    /// Announce `query` on the next rotation port range.
    pub fn announce(
        &mut self,
        query: &str,
        lifetime: Lifetime,
        filename: &str,
        tag: &str,
        now: u64,
    ) -> Result<AddResult> {
        self.announces.add(query, 0, lifetime, filename, tag, now)
    }
}

/// Register the harness handlers on `reactor`, in dispatch order: the DHT
/// engine (watching `dht_fd` when given), result-table maintenance, and
/// announcement maintenance.
///
/// A corrupt mapping file during announcement maintenance is
/// unrecoverable; the handler reports it and stops the run loop.
pub fn setup<E: DhtEngine + 'static>(
    reactor: &mut Reactor<Harness<E>>,
    dht_fd: Option<RawFd>,
) -> io::Result<()> {
    reactor.register(
        dht_fd,
        Box::new(|harness: &mut Harness<E>, now, readable| {
            let Harness {
                dht,
                crawler,
                results,
                ..
            } = harness;

            dht.drive(now, readable);
            while let Some(event) = dht.poll_event() {
                crawler.on_event(event, results, dht, now);
            }
        }),
    )?;

    reactor.register(
        None,
        Box::new(|harness: &mut Harness<E>, now, _| {
            harness.results.on_tick(now);
        }),
    )?;

    let fatal = reactor.running_flag();
    reactor.register(
        None,
        Box::new(move |harness: &mut Harness<E>, now, _| {
            if let Err(e) = harness.announces.on_tick(now, &mut harness.dht) {
                error!(error = %e, "announcement maintenance failed, shutting down");
                fatal.store(false, Ordering::SeqCst);
            }
        }),
    )?;

    Ok(())
}
