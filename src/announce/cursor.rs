//! Base-port allocation for the announcement rotation.

use std::fmt::Debug;
use std::fs;
use std::path::PathBuf;

use tracing::debug;

use crate::{Error, Result};

/// Source of the next base port in the rotation band.
pub trait PortCursor: Debug {
    /// Allocate the next base port. Consecutive calls walk the band
    /// `[min_port, max_port)` in stride steps, wrapping to the floor.
    fn next_base_port(&mut self) -> Result<u16>;
}

#[derive(Debug)]
/// Cursor recovered from the mapping-file tail, so the rotation survives
/// process restarts.
pub struct FileCursor {
    path: PathBuf,
    min_port: u16,
    max_port: u16,
    stride: u16,
}

impl FileCursor {
    pub fn new(path: PathBuf, min_port: u16, max_port: u16, stride: u16) -> Self {
        Self {
            path,
            min_port,
            max_port,
            stride,
        }
    }
}

impl PortCursor for FileCursor {
    fn next_base_port(&mut self) -> Result<u16> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(_) => {
                debug!(path = %self.path.display(), "no mapping file, rotation starts at the floor");
                return Ok(self.min_port);
            }
        };

        let last = match contents.lines().rev().find(|line| !line.trim().is_empty()) {
            Some(line) => line,
            None => return Ok(self.min_port),
        };

        let last_port: u16 = last
            .split_whitespace()
            .next()
            .and_then(|field| field.parse().ok())
            .ok_or_else(|| Error::CorruptPortMap(last.to_string()))?;

        if last_port < self.min_port {
            return Err(Error::CorruptPortMap(last.to_string()));
        }

        let next = last_port.saturating_add(self.stride);
        if next >= self.max_port {
            Ok(self.min_port)
        } else {
            Ok(next)
        }
    }
}

#[derive(Debug)]
/// Cursor held in memory; the rotation restarts at the band floor with
/// the process.
pub struct MemoryCursor {
    next: u16,
    min_port: u16,
    max_port: u16,
    stride: u16,
}

impl MemoryCursor {
    pub fn new(min_port: u16, max_port: u16, stride: u16) -> Self {
        Self {
            next: min_port,
            min_port,
            max_port,
            stride,
        }
    }
}

impl PortCursor for MemoryCursor {
    fn next_base_port(&mut self) -> Result<u16> {
        let port = self.next;

        let advanced = port.saturating_add(self.stride);
        self.next = if advanced >= self.max_port {
            self.min_port
        } else {
            advanced
        };

        Ok(port)
    }
}
