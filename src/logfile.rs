//! Append-only log writing with bounded degradation.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::thread;
use std::time::Duration;

use tracing::error;

/// Delay before the single reopen attempt after a failed open.
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Append `lines` (without trailing newlines) to `path`.
///
/// A failed open is retried once after [RETRY_DELAY]; if the retry also
/// fails the lines go to stderr instead. Log failures are never fatal.
pub(crate) fn append_lines<I, S>(path: &Path, lines: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let file = open_append(path).or_else(|first| {
        thread::sleep(RETRY_DELAY);
        open_append(path).map_err(|second| {
            error!(
                path = %path.display(),
                %first,
                %second,
                "failed to open log file, writing to stderr"
            );
            second
        })
    });

    match file {
        Ok(mut file) => {
            for line in lines {
                if let Err(e) = writeln!(file, "{}", line.as_ref()) {
                    error!(path = %path.display(), error = %e, "log write failed");
                    return;
                }
            }
        }
        Err(_) => {
            let stderr = io::stderr();
            let mut out = stderr.lock();
            for line in lines {
                let _ = writeln!(out, "{}", line.as_ref());
            }
        }
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}
