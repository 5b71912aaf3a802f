//! Harness configurations.

use std::path::PathBuf;

/// Ceiling on simultaneously live result buckets.
pub const DEFAULT_MAX_SEARCHES: usize = 2048;
/// Ceiling on addresses retained per result bucket.
pub const DEFAULT_MAX_RESULTS_PER_SEARCH: usize = 16384;
/// Seconds a result bucket may live before the expiry pass reclaims it.
pub const DEFAULT_MAX_SEARCH_LIFETIME: u64 = 32 * 60;
/// Seconds between result-bucket expiry passes.
pub const DEFAULT_RESULTS_EXPIRE_INTERVAL: u64 = 2 * 60;
/// First port of the announcement rotation band.
pub const DEFAULT_MIN_PORT: u16 = 6882;
/// One past the last port of the announcement rotation band.
pub const DEFAULT_MAX_PORT: u16 = 65000;
/// Consecutive ports announced per entry.
pub const DEFAULT_PORTS_PER_ANNOUNCE: u16 = 10;
/// Ceiling on simultaneously live announcement entries.
pub const DEFAULT_MAX_ANNOUNCEMENTS: usize = 8192;
/// Consecutive no-new-result replies before a responder is abandoned.
pub const DEFAULT_NO_NEW_RESULTS_LIMIT: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// How the next announcement base port is derived.
pub enum CursorMode {
    /// Read the last assigned port back from the mapping-file tail, so the
    /// rotation continues where it left off across process restarts.
    FileBacked,
    /// Track the rotation cursor in memory only; it restarts from the band
    /// floor with the process.
    InMemory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Whether announcement entries ever expire.
pub enum ExpiryMode {
    /// Entries past their lifetime are dropped by the maintenance pass.
    Expiring,
    /// Self-announcements last for the lifetime of the process.
    Permanent,
}

#[derive(Debug, Clone)]
/// Harness configurations.
///
/// The two deployment variants of the measurement setup differ only in a
/// handful of fields; [Config::persistent] and [Config::ephemeral] are the
/// presets for them. Variant selection happens here once at startup, the
/// engines never branch on build features.
pub struct Config {
    /// Announcement port allocation source.
    ///
    /// Defaults to [CursorMode::FileBacked]
    pub cursor_mode: CursorMode,
    /// Announcement entry lifetime behavior.
    ///
    /// Defaults to [ExpiryMode::Expiring]
    pub expiry_mode: ExpiryMode,
    /// First port of the rotation band.
    ///
    /// Defaults to [DEFAULT_MIN_PORT]
    pub min_port: u16,
    /// One past the last port of the rotation band; allocations wrap back to
    /// [Config::min_port] before reaching it.
    ///
    /// Defaults to [DEFAULT_MAX_PORT]
    pub max_port: u16,
    /// Distance between consecutively assigned base ports.
    ///
    /// Defaults to 50 (persistent variant); the ephemeral preset uses 100.
    pub port_stride: u16,
    /// Number of consecutive ports announced per entry, starting at its
    /// base port.
    ///
    /// Defaults to [DEFAULT_PORTS_PER_ANNOUNCE]
    pub ports_per_announce: u16,
    /// Seconds until a due entry is re-announced.
    ///
    /// Defaults to 20 minutes (persistent variant); ephemeral uses 10.
    pub announce_interval: u64,
    /// Seconds between announcement maintenance passes.
    ///
    /// Defaults to 5 minutes (persistent variant); ephemeral uses 1.
    pub maintenance_interval: u64,
    /// Seconds a newly ingested announcement lives ([ExpiryMode::Expiring]
    /// only).
    ///
    /// Defaults to 20 minutes
    pub announce_lifetime: u64,
    /// Ceiling on live announcement entries; `add` rejects past it.
    ///
    /// Defaults to [DEFAULT_MAX_ANNOUNCEMENTS]
    pub max_announcements: usize,
    /// Ceiling on live result buckets; crawl starts are rejected past it.
    ///
    /// Defaults to [DEFAULT_MAX_SEARCHES]
    pub max_searches: usize,
    /// Ceiling on addresses retained in one result bucket.
    ///
    /// Defaults to [DEFAULT_MAX_RESULTS_PER_SEARCH]
    pub max_results_per_search: usize,
    /// Seconds a result bucket may live before the expiry pass reclaims it.
    ///
    /// Defaults to [DEFAULT_MAX_SEARCH_LIFETIME]
    pub max_search_lifetime: u64,
    /// Seconds between result-bucket expiry passes.
    ///
    /// Defaults to [DEFAULT_RESULTS_EXPIRE_INTERVAL]
    pub results_expire_interval: u64,
    /// Consecutive no-new-result replies before the crawl stops querying a
    /// responder.
    ///
    /// Defaults to [DEFAULT_NO_NEW_RESULTS_LIMIT]
    pub no_new_results_limit: u32,
    /// Port passed to the DHT engine when starting a search (0 for a pure
    /// search).
    ///
    /// Defaults to 0
    pub search_port: u16,
    /// Directory for the daily crawl-result logs.
    pub result_log_dir: PathBuf,
    /// Directory for the daily per-responder logs.
    pub responder_log_dir: PathBuf,
    /// The persisted port-to-identifier mapping file.
    pub port_map_path: PathBuf,
    /// External identifier list ingested each maintenance pass, one
    /// `hexid filename datetag` record per line.
    ///
    /// Defaults to None (no ingestion)
    pub ingest_path: Option<PathBuf>,
}

impl Config {
    /// The persistent-rotation variant: file-backed port cursor, expiring
    /// announcements, 20 minute announce interval, stride 50.
    pub fn persistent() -> Self {
        Self::default()
    }

    /// The ephemeral variant: in-memory port cursor, permanent
    /// announcements, 10 minute announce interval, stride 100.
    pub fn ephemeral() -> Self {
        Self {
            cursor_mode: CursorMode::InMemory,
            expiry_mode: ExpiryMode::Permanent,
            port_stride: 100,
            announce_interval: 10 * 60,
            maintenance_interval: 60,
            ..Self::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cursor_mode: CursorMode::FileBacked,
            expiry_mode: ExpiryMode::Expiring,
            min_port: DEFAULT_MIN_PORT,
            max_port: DEFAULT_MAX_PORT,
            port_stride: 50,
            ports_per_announce: DEFAULT_PORTS_PER_ANNOUNCE,
            announce_interval: 20 * 60,
            maintenance_interval: 5 * 60,
            announce_lifetime: 20 * 60,
            max_announcements: DEFAULT_MAX_ANNOUNCEMENTS,
            max_searches: DEFAULT_MAX_SEARCHES,
            max_results_per_search: DEFAULT_MAX_RESULTS_PER_SEARCH,
            max_search_lifetime: DEFAULT_MAX_SEARCH_LIFETIME,
            results_expire_interval: DEFAULT_RESULTS_EXPIRE_INTERVAL,
            no_new_results_limit: DEFAULT_NO_NEW_RESULTS_LIMIT,
            search_port: 0,
            result_log_dir: PathBuf::from("results"),
            responder_log_dir: PathBuf::from("responders"),
            port_map_path: PathBuf::from("port_map"),
            ingest_path: None,
        }
    }
}
