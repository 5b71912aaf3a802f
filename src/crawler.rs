//! Crawl orchestration on top of the DHT engine.
//!
//! Starts peer searches, folds the engine's discovery events into the
//! result table, and keeps pulling on responders that still yield new
//! addresses until every responder is either done or has gone dry.

use tracing::{debug, info, warn};

use crate::common::Id;
use crate::config::Config;
use crate::kad::{decode_compact_peers, AddressFamily, DhtEngine, DhtEvent};
use crate::results::{AddOutcome, ResultTable};
use crate::Result;

#[derive(Debug)]
/// Search policy shared by all crawls.
pub struct Crawler {
    search_port: u16,
    no_new_results_limit: u32,
}

impl Crawler {
    pub fn new(config: &Config) -> Self {
        Self {
            search_port: config.search_port,
            no_new_results_limit: config.no_new_results_limit,
        }
    }

    /// Start (or restart) a crawl for `query`, labelled with `filename` and
    /// `tag` in the result log. Returns the identifier of the started crawl,
    /// or None when the result table is at capacity.
    pub fn start<E: DhtEngine>(
        &self,
        query: &str,
        filename: &str,
        tag: &str,
        results: &mut ResultTable,
        dht: &mut E,
        now: u64,
    ) -> Result<Option<Id>> {
        let id = Id::from_query(query);

        if results.create_or_replace(id, filename, tag, now).is_none() {
            return Ok(None);
        }

        info!(%id, filename, "crawl started");
        dht.start_search(id, self.search_port, AddressFamily::V4)?;

        Ok(Some(id))
    }

    /// Fold one discovery event into the result table and decide whether
    /// the responder deserves another request.
    pub fn on_event<E: DhtEngine>(
        &self,
        event: DhtEvent,
        results: &mut ResultTable,
        dht: &mut E,
        now: u64,
    ) {
        let target = match &event {
            DhtEvent::Values { target, .. } | DhtEvent::SearchDone { target, .. } => *target,
        };

        if results.find(&target).is_none() {
            debug!(id = %target, "event for unknown crawl dropped");
            return;
        }

        match event {
            DhtEvent::Values {
                target,
                from,
                family,
                data,
            } => {
                let addrs = decode_compact_peers(&data, family);

                let bucket = match results.find_mut(&target) {
                    Some(bucket) => bucket,
                    None => return,
                };

                let mut had_new = false;
                for addr in &addrs {
                    if bucket.add_address(*addr) == AddOutcome::New {
                        had_new = true;
                    }
                }

                let limit = self.no_new_results_limit;
                let done = bucket.done;
                let record = bucket.responder_mut(&from, now);
                for addr in addrs {
                    record.credit(addr);
                }
                record.record_reply(had_new, now);

                if record.exhausted(limit) {
                    record.abandon();
                }

                let keep_querying = !done && !record.abandoned;
                if keep_querying {
                    record.record_request(now);
                    if let Err(e) = dht.request_more(target, &from) {
                        warn!(id = %target, responder = %from.address, error = %e, "follow-up request failed");
                    }
                }
            }
            DhtEvent::SearchDone { target, from, .. } => {
                if let Some(bucket) = results.find_mut(&target) {
                    let record = bucket.responder_mut(&from, now);
                    record.done = true;
                    record.outstanding_requests = 0;
                }
            }
        }

        let converged = results
            .find(&target)
            .map(|bucket| bucket.converged(self.no_new_results_limit))
            .unwrap_or(false);

        if converged {
            results.finalize_responders(&target, now);
            results.finalize(&target, true, now);
        }
    }
}
