// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transfer plane: ephemeral Transfer Sessions, the receive state
//! machine (C6, `acceptor`) and the send state machine (C7, `sender`).

pub mod acceptor;
pub mod sender;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Direction of a transfer session, for progress reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Send,
    Recv,
}

/// One `progress_stream()` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub session_id: u64,
    pub direction: Direction,
    pub bytes: u64,
    pub total: u64,
}

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-local, monotonically increasing session id so
/// progress events can be attributed to a specific in-flight transfer.
pub fn next_session_id() -> u64 {
    NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed)
}

/// Resolve a collision-free output path under `dir` for `filename`,
/// appending ` (n)` before the extension when one is already taken.
/// Pure function: does not touch the filesystem beyond querying the
/// caller-provided existence check, so it is unit-testable without I/O.
pub fn resolve_collision_path(dir: &Path, filename: &str, exists: impl Fn(&Path) -> bool) -> PathBuf {
    let candidate = dir.join(filename);
    if !exists(&candidate) {
        return candidate;
    }

    let (stem, ext) = split_stem_ext(filename);
    for n in 1..u32::MAX {
        let name = match &ext {
            Some(ext) => format!("{stem} ({n}).{ext}"),
            None => format!("{stem} ({n})"),
        };
        let candidate = dir.join(name);
        if !exists(&candidate) {
            return candidate;
        }
    }
    unreachable!("exhausted u32 collision suffixes")
}

fn split_stem_ext(filename: &str) -> (&str, Option<&str>) {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (filename, None),
    }
}

/// Create the download directory if it does not already exist.
pub async fn ensure_download_dir(dir: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn resolve_collision_path_returns_plain_name_when_free() {
        let path = resolve_collision_path(Path::new("/downloads"), "hello.txt", |_| false);
        assert_eq!(path, Path::new("/downloads/hello.txt"));
    }

    #[test]
    fn resolve_collision_path_appends_suffix_before_extension() {
        let taken: HashSet<PathBuf> = [PathBuf::from("/downloads/hello.txt")].into();
        let path = resolve_collision_path(Path::new("/downloads"), "hello.txt", |p| {
            taken.contains(p)
        });
        assert_eq!(path, Path::new("/downloads/hello (1).txt"));
    }

    #[test]
    fn resolve_collision_path_increments_past_multiple_collisions() {
        let taken: HashSet<PathBuf> = [
            PathBuf::from("/downloads/hello.txt"),
            PathBuf::from("/downloads/hello (1).txt"),
            PathBuf::from("/downloads/hello (2).txt"),
        ]
        .into();
        let path = resolve_collision_path(Path::new("/downloads"), "hello.txt", |p| {
            taken.contains(p)
        });
        assert_eq!(path, Path::new("/downloads/hello (3).txt"));
    }

    #[test]
    fn resolve_collision_path_handles_extensionless_files() {
        let taken: HashSet<PathBuf> = [PathBuf::from("/downloads/README")].into();
        let path = resolve_collision_path(Path::new("/downloads"), "README", |p| {
            taken.contains(p)
        });
        assert_eq!(path, Path::new("/downloads/README (1)"));
    }

    #[test]
    fn session_ids_are_monotonically_increasing() {
        let a = next_session_id();
        let b = next_session_id();
        assert!(b > a);
    }
}
