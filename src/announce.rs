//! Announcement scheduling over the rotating port band.
//!
//! Each entry claims a range of consecutive ports for one identifier and
//! re-announces them periodically. Base ports come from a [PortCursor]
//! walking the band in stride steps; every assignment is persisted to the
//! mapping file so a later pass can correlate inbound connections with
//! the identifier they were announced for.

mod cursor;
mod mapfile;

use std::fs;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::common::Id;
use crate::config::{Config, CursorMode, ExpiryMode};
use crate::kad::{AddressFamily, DhtEngine};
use crate::Result;

pub use cursor::{FileCursor, MemoryCursor, PortCursor};
pub use mapfile::RETENTION_DAYS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// What adding an announcement did.
pub enum AddResult {
    /// New entry; carries the assigned base port.
    Created(u16),
    /// Entry already existed; its schedule was refreshed.
    Refreshed,
    /// Table is at capacity.
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
/// When an announcement entry stops being maintained.
pub enum Lifetime {
    /// Dropped once the maintenance pass runs after this epoch second.
    Until(u64),
    /// Maintained for the lifetime of the process.
    Never,
}

impl Lifetime {
    fn expired(&self, now: u64) -> bool {
        match self {
            Lifetime::Until(deadline) => *deadline < now,
            Lifetime::Never => false,
        }
    }
}

#[derive(Debug)]
/// One identifier being announced on a port range.
pub struct AnnounceEntry {
    pub id: Id,
    /// First port of the announced range.
    pub base_port: u16,
    /// Next epoch second this entry is due for re-announcement.
    pub refresh_at: u64,
    pub expire_at: Lifetime,
}

#[derive(Debug)]
/// All live announcement entries plus the rotation cursor and schedules.
pub struct AnnounceTable {
    entries: Vec<AnnounceEntry>,
    cursor: Box<dyn PortCursor>,
    expiry_mode: ExpiryMode,
    announce_interval: u64,
    maintenance_interval: u64,
    announce_lifetime: u64,
    ports_per_announce: u16,
    max_announcements: usize,
    /// Prune the mapping file after ingestion rounds that created entries.
    gc_after_ingest: bool,
    port_map_path: PathBuf,
    ingest_path: Option<PathBuf>,
    next_announce: u64,
    next_expire: u64,
}

impl AnnounceTable {
    pub fn new(config: &Config) -> Self {
        let cursor: Box<dyn PortCursor> = match config.cursor_mode {
            CursorMode::FileBacked => Box::new(FileCursor::new(
                config.port_map_path.clone(),
                config.min_port,
                config.max_port,
                config.port_stride,
            )),
            CursorMode::InMemory => Box::new(MemoryCursor::new(
                config.min_port,
                config.max_port,
                config.port_stride,
            )),
        };

        Self {
            entries: Vec::new(),
            cursor,
            expiry_mode: config.expiry_mode,
            announce_interval: config.announce_interval,
            maintenance_interval: config.maintenance_interval,
            announce_lifetime: config.announce_lifetime,
            ports_per_announce: config.ports_per_announce,
            max_announcements: config.max_announcements,
            gc_after_ingest: config.cursor_mode == CursorMode::FileBacked,
            port_map_path: config.port_map_path.clone(),
            ingest_path: config.ingest_path.clone(),
            next_announce: 0,
            next_expire: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn find(&self, id: &Id) -> Option<&AnnounceEntry> {
        self.entries.iter().find(|entry| entry.id == *id)
    }

    /// Add (or refresh) the announcement for `query`.
    ///
    /// A zero `requested_port` lets the rotation cursor assign the base
    /// port; every fresh assignment is appended to the mapping file with
    /// `filename` and `tag`. Re-adding an existing identifier makes it due
    /// immediately and only ever extends its lifetime, it never allocates
    /// another port.
    pub fn add(
        &mut self,
        query: &str,
        requested_port: u16,
        lifetime: Lifetime,
        filename: &str,
        tag: &str,
        now: u64,
    ) -> Result<AddResult> {
        let id = Id::from_query(query);

        if let Some(entry) = self.entries.iter_mut().find(|entry| entry.id == id) {
            entry.refresh_at = now;
            if lifetime > entry.expire_at {
                entry.expire_at = lifetime;
            }
            self.next_announce = 0;
            return Ok(AddResult::Refreshed);
        }

        if self.entries.len() >= self.max_announcements {
            warn!(limit = self.max_announcements, "announcement table full");
            return Ok(AddResult::Rejected);
        }

        let base_port = if requested_port != 0 {
            requested_port
        } else {
            self.cursor.next_base_port()?
        };

        // A lifetime already in the past still gets a short grace window.
        let expire_at = match lifetime {
            Lifetime::Until(deadline) if deadline <= now => Lifetime::Until(now + 100),
            other => other,
        };

        mapfile::append_record(&self.port_map_path, base_port, &id, filename, tag);

        info!(%id, base_port, filename, "announcement added");

        self.entries.insert(
            0,
            AnnounceEntry {
                id,
                base_port,
                refresh_at: 0,
                expire_at,
            },
        );
        self.next_announce = 0;

        Ok(AddResult::Created(base_port))
    }

    /// Announce every due entry on its full port range and push its next
    /// refresh out by the announce interval.
    fn announce_due<E: DhtEngine>(&mut self, now: u64, dht: &mut E) {
        for entry in &mut self.entries {
            if entry.refresh_at > now {
                continue;
            }

            for offset in 0..self.ports_per_announce {
                let port = entry.base_port.saturating_add(offset);
                if let Err(e) = dht.announce(entry.id, port) {
                    warn!(id = %entry.id, port, error = %e, "announce failed");
                }
            }

            debug!(id = %entry.id, base_port = entry.base_port, "announced port range");
            entry.refresh_at = now + self.announce_interval;
        }
    }

    /// Drop at most one expired entry per pass. A backlog drains across
    /// subsequent passes.
    fn expire(&mut self, now: u64) {
        if let Some(index) = self
            .entries
            .iter()
            .position(|entry| entry.expire_at.expired(now))
        {
            let entry = self.entries.remove(index);
            debug!(id = %entry.id, "announcement expired");
        }
    }

    /// Pull identifiers from the external ingest file, if one is
    /// configured. Each line carries `hexid filename datetag`; malformed
    /// lines are skipped. Returns how many entries were created.
    fn ingest_external(&mut self, now: u64) -> Result<usize> {
        let path = match &self.ingest_path {
            Some(path) => path.clone(),
            None => return Ok(0),
        };

        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ingest file unreadable, skipping round");
                return Ok(0);
            }
        };

        let lifetime = match self.expiry_mode {
            ExpiryMode::Expiring => Lifetime::Until(now + self.announce_lifetime),
            ExpiryMode::Permanent => Lifetime::Never,
        };

        let mut created = 0usize;
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }

            let mut fields = line.split_whitespace();
            let (query, filename, tag) = match (fields.next(), fields.next(), fields.next()) {
                (Some(query), Some(filename), Some(tag)) => (query, filename, tag),
                _ => {
                    warn!(line, "malformed ingest record skipped");
                    continue;
                }
            };

            if let AddResult::Created(_) = self.add(query, 0, lifetime, filename, tag, now)? {
                created += 1;
            }
        }

        if created > 0 && self.gc_after_ingest {
            if let Err(e) = mapfile::collect_garbage(&self.port_map_path, now) {
                warn!(error = %e, "mapping file prune failed");
            }
        }

        Ok(created)
    }

    /// Periodic maintenance entry point, safe to call every reactor turn.
    ///
    /// Announcement and ingestion wait until the routing table has nodes;
    /// expiry runs regardless. Only a corrupt mapping file propagates as
    /// an error.
    pub fn on_tick<E: DhtEngine>(&mut self, now: u64, dht: &mut E) -> Result<()> {
        if self.expiry_mode == ExpiryMode::Expiring && self.next_expire <= now {
            self.expire(now);
            self.next_expire = now + self.maintenance_interval;
        }

        if self.next_announce <= now && dht.count_nodes(AddressFamily::V4) != 0 {
            let created = self.ingest_external(now)?;
            if created > 0 {
                debug!(created, "ingested external announcements");
            }

            self.announce_due(now, dht);
            self.next_announce = now + self.maintenance_interval;
        }

        Ok(())
    }
}
