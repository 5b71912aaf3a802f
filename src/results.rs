//! Result aggregation for running crawls.
//!
//! Every live crawl owns one [ResultBucket]: the deduplicated peer
//! addresses found so far plus per-responder bookkeeping for the
//! termination heuristic. Buckets are written out as daily log files when
//! a crawl converges, is replaced, or ages out.

use std::net::SocketAddr;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::common::{date_tag, Id, Node};
use crate::config::Config;
use crate::logfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// What adding one address to a bucket did.
pub enum AddOutcome {
    /// First sighting, retained.
    New,
    /// Already present, dropped.
    Duplicate,
    /// Bucket is finished or full, dropped.
    Rejected,
}

#[derive(Debug)]
/// Per-responder progress of one crawl.
pub struct ResponderRecord {
    pub node: Node,
    /// Requests sent that have not seen a reply yet.
    pub outstanding_requests: u32,
    /// Replies that contributed at least one previously unseen address.
    pub new_result_count: u32,
    /// Replies that contributed nothing new.
    pub no_new_result_count: u32,
    /// Current run of consecutive no-new replies.
    pub sequential_no_new: u32,
    /// Set once the run limit is hit; never cleared, so a responder that
    /// went quiet stays retired even if a late reply carries something new.
    pub abandoned: bool,
    /// Responder signalled it has nothing further.
    pub done: bool,
    pub first_seen_at: u64,
    pub last_request_at: u64,
    pub last_reply_at: u64,
    /// Every distinct address this responder handed us, for the summary
    /// log line.
    revealed: Vec<SocketAddr>,
}

impl ResponderRecord {
    fn new(node: Node, now: u64) -> Self {
        Self {
            node,
            outstanding_requests: 0,
            new_result_count: 0,
            no_new_result_count: 0,
            sequential_no_new: 0,
            abandoned: false,
            done: false,
            first_seen_at: now,
            last_request_at: 0,
            last_reply_at: now,
            revealed: Vec::new(),
        }
    }

    /// Note a reply. `had_new` says whether it contained at least one
    /// address the bucket had not seen before.
    pub fn record_reply(&mut self, had_new: bool, now: u64) {
        self.outstanding_requests = self.outstanding_requests.saturating_sub(1);
        self.last_reply_at = now;

        if had_new {
            self.new_result_count += 1;
            self.sequential_no_new = 0;
        } else {
            self.no_new_result_count += 1;
            self.sequential_no_new += 1;
        }
    }

    /// Note a follow-up request sent to this responder.
    pub fn record_request(&mut self, now: u64) {
        self.outstanding_requests += 1;
        self.last_request_at = now;
    }

    /// Attribute `addr` to this responder, once.
    pub fn credit(&mut self, addr: SocketAddr) {
        if !self.revealed.contains(&addr) {
            self.revealed.push(addr);
        }
    }

    /// Retire the responder permanently.
    pub fn abandon(&mut self) {
        self.abandoned = true;
    }

    /// Whether this responder should not be queried again.
    pub fn exhausted(&self, limit: u32) -> bool {
        self.abandoned || self.sequential_no_new >= limit
    }
}

#[derive(Debug)]
/// Addresses and responder state of one live crawl.
pub struct ResultBucket {
    pub id: Id,
    pub started_at: u64,
    /// Set once the bucket stops accepting addresses.
    pub done: bool,
    /// Label carried into every result log line.
    pub filename: String,
    /// Date tag carried into every result log line.
    pub date_tag: String,
    entries: Vec<SocketAddr>,
    responders: Vec<ResponderRecord>,
    max_entries: usize,
}

impl ResultBucket {
    fn new(id: Id, filename: String, date_tag: String, max_entries: usize, now: u64) -> Self {
        Self {
            id,
            started_at: now,
            done: false,
            filename,
            date_tag,
            entries: Vec::new(),
            responders: Vec::new(),
            max_entries,
        }
    }

    /// Add an address if the bucket is live, below capacity and has not
    /// seen it before.
    pub fn add_address(&mut self, addr: SocketAddr) -> AddOutcome {
        if self.done || self.entries.len() >= self.max_entries {
            return AddOutcome::Rejected;
        }

        if self.entries.contains(&addr) {
            return AddOutcome::Duplicate;
        }

        self.entries.push(addr);
        AddOutcome::New
    }

    /// Up to `limit` collected addresses, in discovery order.
    pub fn collect(&self, limit: usize) -> Vec<SocketAddr> {
        self.entries.iter().take(limit).copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Responder record for `node`, created on first contact.
    pub fn responder_mut(&mut self, node: &Node, now: u64) -> &mut ResponderRecord {
        if let Some(index) = self
            .responders
            .iter()
            .position(|record| record.node.address == node.address)
        {
            return &mut self.responders[index];
        }

        self.responders.push(ResponderRecord::new(node.clone(), now));
        let last = self.responders.len() - 1;
        &mut self.responders[last]
    }

    pub fn responders(&self) -> &[ResponderRecord] {
        &self.responders
    }

    /// Whether every known responder is finished and nothing is in flight.
    /// False until at least one responder has been heard from.
    pub fn converged(&self, limit: u32) -> bool {
        !self.responders.is_empty()
            && self.responders.iter().all(|record| {
                (record.done || record.exhausted(limit)) && record.outstanding_requests == 0
            })
    }
}

#[derive(Debug)]
/// All live crawl buckets plus the expiry schedule.
pub struct ResultTable {
    buckets: Vec<ResultBucket>,
    /// Lifetime count of buckets ever created.
    pub total_created: u64,
    max_searches: usize,
    max_results_per_search: usize,
    max_lifetime: u64,
    expire_interval: u64,
    next_expire: u64,
    result_log_dir: PathBuf,
    responder_log_dir: PathBuf,
}

impl ResultTable {
    pub fn new(config: &Config) -> Self {
        Self {
            buckets: Vec::new(),
            total_created: 0,
            max_searches: config.max_searches,
            max_results_per_search: config.max_results_per_search,
            max_lifetime: config.max_search_lifetime,
            expire_interval: config.results_expire_interval,
            next_expire: 0,
            result_log_dir: config.result_log_dir.clone(),
            responder_log_dir: config.responder_log_dir.clone(),
        }
    }

    pub fn find(&self, id: &Id) -> Option<&ResultBucket> {
        self.buckets.iter().find(|bucket| bucket.id == *id)
    }

    pub fn find_mut(&mut self, id: &Id) -> Option<&mut ResultBucket> {
        self.buckets.iter_mut().find(|bucket| bucket.id == *id)
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Open a fresh bucket for `id`, writing out and replacing any live
    /// bucket with the same identifier. Returns None when the table is at
    /// capacity.
    pub fn create_or_replace(
        &mut self,
        id: Id,
        filename: &str,
        tag: &str,
        now: u64,
    ) -> Option<&mut ResultBucket> {
        if self.find(&id).is_some() {
            self.finalize(&id, false, now);
        }

        if self.buckets.len() >= self.max_searches {
            warn!(limit = self.max_searches, "result table full, crawl rejected");
            return None;
        }

        let bucket = ResultBucket::new(
            id,
            filename.to_string(),
            tag.to_string(),
            self.max_results_per_search,
            now,
        );
        self.buckets.insert(0, bucket);
        self.total_created += 1;

        Some(&mut self.buckets[0])
    }

    /// Write the bucket's addresses to the daily result log and drop it.
    /// `natural` distinguishes convergence from replacement or expiry in
    /// the diagnostic output.
    pub fn finalize(&mut self, id: &Id, natural: bool, now: u64) {
        let index = match self.buckets.iter().position(|bucket| bucket.id == *id) {
            Some(index) => index,
            None => return,
        };
        let bucket = self.buckets.remove(index);

        info!(
            id = %bucket.id,
            results = bucket.entries.len(),
            natural,
            "crawl finished"
        );

        if bucket.entries.is_empty() {
            return;
        }

        let path = self.result_log_dir.join(format!("{}.log", date_tag(now)));
        let lines: Vec<String> = bucket
            .entries
            .iter()
            .map(|addr| {
                format!(
                    "{} {} {} {} seeder {} {}",
                    now,
                    bucket.filename,
                    bucket.date_tag,
                    bucket.id,
                    addr.ip(),
                    addr.port()
                )
            })
            .collect();

        logfile::append_lines(&path, lines);
    }

    /// Write the per-responder detail and summary lines for `id` to the
    /// daily responder log and clear the responder records.
    pub fn finalize_responders(&mut self, id: &Id, now: u64) {
        let responder_log_dir = self.responder_log_dir.clone();
        let bucket = match self.find_mut(id) {
            Some(bucket) => bucket,
            None => return,
        };

        if bucket.responders.is_empty() {
            return;
        }

        let path = responder_log_dir.join(format!("responders_{}.log", date_tag(now)));
        let mut lines = Vec::new();

        for record in &bucket.responders {
            for addr in &record.revealed {
                lines.push(format!(
                    "{} {} {} {} {} {}",
                    now,
                    bucket.id,
                    record.node.address,
                    record.node.id,
                    addr.ip(),
                    addr.port()
                ));
            }
            lines.push(format!(
                "#{} {} {} {} {} {} {} {}",
                now,
                bucket.id,
                record.node.id,
                record.node.address,
                record.revealed.len(),
                record.new_result_count,
                record.no_new_result_count,
                record.sequential_no_new
            ));
        }

        logfile::append_lines(&path, lines);
        bucket.responders.clear();
    }

    /// Reclaim at most one bucket older than the lifetime ceiling. A
    /// backlog drains across subsequent passes.
    pub fn expire_one(&mut self, now: u64) {
        let cutoff = now.saturating_sub(self.max_lifetime);

        let expired = self
            .buckets
            .iter()
            .find(|bucket| bucket.started_at < cutoff)
            .map(|bucket| bucket.id);

        if let Some(id) = expired {
            debug!(%id, "crawl aged out");
            self.finalize(&id, false, now);
        }
    }

    /// Periodic maintenance entry point, safe to call every reactor turn.
    pub fn on_tick(&mut self, now: u64) {
        if self.next_expire <= now {
            self.expire_one(now);
            self.next_expire = now + self.expire_interval;
        }
    }
}
