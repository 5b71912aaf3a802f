//! The persisted port-to-identifier mapping file.
//!
//! One whitespace-separated record per line: base port, hex identifier,
//! filename label, date tag. Appended on every port assignment and pruned
//! by age after ingestion rounds.

use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, warn};

use crate::common::{parse_date_tag, Id};
use crate::logfile;

/// Days a mapping record survives before garbage collection drops it.
pub const RETENTION_DAYS: u64 = 3;

/// Append one assignment record.
pub(crate) fn append_record(path: &Path, port: u16, id: &Id, filename: &str, tag: &str) {
    logfile::append_lines(path, [format!("{} {} {} {}", port, id, filename, tag)]);
}

/// Rewrite the mapping file keeping only records younger than
/// [RETENTION_DAYS]. The replacement is written to a sibling temp file and
/// renamed over the original, so readers never see a half-written file.
pub(crate) fn collect_garbage(path: &Path, now: u64) -> io::Result<()> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    let cutoff = now.saturating_sub(RETENTION_DAYS * 24 * 60 * 60) as i64;
    let mut kept = String::new();
    let mut dropped = 0usize;

    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }

        let tag = line.split_whitespace().nth(3);
        match tag.and_then(parse_date_tag) {
            Some(stamp) if stamp > cutoff => {
                kept.push_str(line);
                kept.push('\n');
            }
            Some(_) => dropped += 1,
            None => {
                warn!(line, "unparseable mapping record dropped");
                dropped += 1;
            }
        }
    }

    if dropped == 0 {
        return Ok(());
    }

    let tmp = path.with_extension("tmp");
    fs::write(&tmp, kept)?;
    fs::rename(&tmp, path)?;

    debug!(path = %path.display(), dropped, "mapping file pruned");

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::common::date_tag;

    #[test]
    fn append_and_prune_by_age() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("port_map");
        let now = 1_704_067_200u64; // 2024-01-01

        let id = Id::random();
        append_record(&path, 6882, &id, "old", &date_tag(now - 5 * 24 * 60 * 60));
        append_record(&path, 6932, &id, "fresh", &date_tag(now));

        collect_garbage(&path, now).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert!(!contents.contains("old"));
        assert!(contents.contains(&format!("6932 {} fresh", id)));
    }

    #[test]
    fn prune_preserves_record_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("port_map");
        let now = 1_704_067_200u64;
        let tag = date_tag(now);
        let stale = date_tag(now - 10 * 24 * 60 * 60);

        fs::write(
            &path,
            format!(
                "6882 aa a {t}\n7000 bb b {s}\n6932 cc c {t}\n",
                t = tag,
                s = stale
            ),
        )
        .unwrap();

        collect_garbage(&path, now).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents,
            format!("6882 aa a {t}\n6932 cc c {t}\n", t = tag)
        );
    }

    #[test]
    fn missing_file_is_fine() {
        let dir = tempfile::tempdir().unwrap();

        collect_garbage(&dir.path().join("port_map"), 1_704_067_200).unwrap();
    }

    #[test]
    fn unparseable_tags_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("port_map");
        let now = 1_704_067_200u64;

        fs::write(
            &path,
            format!("6882 aa a not-a-date\n6932 bb b {}\n", date_tag(now)),
        )
        .unwrap();

        collect_garbage(&path, now).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert!(!contents.contains("not-a-date"));
        assert!(contents.contains("6932"));
    }
}
