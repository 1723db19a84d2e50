//! Output file sequencing.
//!
//! Frames land in a per-night directory named by UTC date, as
//! `<prefix>-NNNN.fits` with a monotonically increasing four-digit counter.
//! The counter is recovered by scanning the directory, so it survives
//! restarts; a `(n)` suffix is appended if the chosen path somehow already
//! exists. Observer-supplied names are honored when safe and fall back to
//! the sequenced default otherwise.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::warn;

/// Path characters that disqualify an observer-supplied file name.
const UNSAFE_CHARS: [char; 9] = [':', '<', '>', '/', '\\', '"', '|', '?', '*'];

/// Allocates collision-free FITS paths under a date-bucketed root.
#[derive(Debug, Clone)]
pub struct FileSequencer {
    root: PathBuf,
    prefix: String,
}

impl FileSequencer {
    pub fn new(root: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            prefix: prefix.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for one observing night.
    pub fn bucket_dir(&self, date: NaiveDate) -> PathBuf {
        self.root.join(date.format("%Y-%m-%d").to_string())
    }

    /// Next `<prefix>-NNNN.fits` path for the night, creating the bucket
    /// directory if needed.
    pub fn next_path(&self, date: NaiveDate) -> std::io::Result<PathBuf> {
        let dir = self.bucket_dir(date);
        std::fs::create_dir_all(&dir)?;

        let next = self.highest_sequence(&dir)?.map_or(0, |n| n + 1);
        let candidate = dir.join(format!("{}-{:04}.fits", self.prefix, next));
        Ok(disambiguate(candidate))
    }

    /// Path for an observer-supplied name, or the sequenced default when the
    /// name is empty or unsafe.
    pub fn named_path(&self, date: NaiveDate, requested: &str) -> std::io::Result<PathBuf> {
        let trimmed = requested.trim();
        if trimmed.is_empty() || trimmed.contains(UNSAFE_CHARS) || trimmed.contains("..") {
            warn!(requested, "unsafe file name, using sequenced default");
            return self.next_path(date);
        }

        let dir = self.bucket_dir(date);
        std::fs::create_dir_all(&dir)?;

        let mut name = trimmed.to_string();
        if name.ends_with('.') {
            name.push_str("fits");
        } else if !name.ends_with(".fits") {
            name.push_str(".fits");
        }
        Ok(disambiguate(dir.join(name)))
    }

    /// Highest sequence number already present in a bucket directory.
    fn highest_sequence(&self, dir: &Path) -> std::io::Result<Option<u32>> {
        let mut highest = None;
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(seq) = self.parse_sequence(name) {
                highest = Some(highest.map_or(seq, |h: u32| h.max(seq)));
            }
        }
        Ok(highest)
    }

    fn parse_sequence(&self, file_name: &str) -> Option<u32> {
        let rest = file_name.strip_prefix(&self.prefix)?.strip_prefix('-')?;
        let digits = rest.strip_suffix(".fits")?;
        if digits.len() == 4 && digits.bytes().all(|b| b.is_ascii_digit()) {
            digits.parse().ok()
        } else {
            None
        }
    }
}

/// Append a `(n)` suffix before the extension until the path is unused.
fn disambiguate(path: PathBuf) -> PathBuf {
    if !path.exists() {
        return path;
    }
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("img");
    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let mut n = 0u32;
    loop {
        let candidate = dir.join(format!("{stem}({n}).fits"));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 14).unwrap()
    }

    fn touch(path: &Path) {
        std::fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_sequence_starts_at_zero_and_increments() {
        let dir = TempDir::new().unwrap();
        let seq = FileSequencer::new(dir.path(), "img");

        let first = seq.next_path(date()).unwrap();
        assert_eq!(first.file_name().unwrap(), "img-0000.fits");
        touch(&first);

        let second = seq.next_path(date()).unwrap();
        assert_eq!(second.file_name().unwrap(), "img-0001.fits");
    }

    #[test]
    fn test_sequence_recovers_after_restart() {
        let dir = TempDir::new().unwrap();
        let bucket = dir.path().join("2026-03-14");
        std::fs::create_dir_all(&bucket).unwrap();
        touch(&bucket.join("img-0000.fits"));
        touch(&bucket.join("img-0041.fits"));
        touch(&bucket.join("other-0100.fits"));

        let seq = FileSequencer::new(dir.path(), "img");
        let next = seq.next_path(date()).unwrap();
        assert_eq!(next.file_name().unwrap(), "img-0042.fits");
    }

    #[test]
    fn test_buckets_by_date() {
        let dir = TempDir::new().unwrap();
        let seq = FileSequencer::new(dir.path(), "img");
        let path = seq.next_path(date()).unwrap();
        assert!(path.starts_with(dir.path().join("2026-03-14")));
    }

    #[test]
    fn test_named_path_appends_extension() {
        let dir = TempDir::new().unwrap();
        let seq = FileSequencer::new(dir.path(), "img");

        let a = seq.named_path(date(), "m51").unwrap();
        assert_eq!(a.file_name().unwrap(), "m51.fits");
        let b = seq.named_path(date(), "m51.fits").unwrap();
        assert_eq!(b.file_name().unwrap(), "m51.fits");
        let c = seq.named_path(date(), "m51.").unwrap();
        assert_eq!(c.file_name().unwrap(), "m51.fits");
    }

    #[test]
    fn test_named_path_collision_suffix() {
        let dir = TempDir::new().unwrap();
        let seq = FileSequencer::new(dir.path(), "img");

        let a = seq.named_path(date(), "m51").unwrap();
        touch(&a);
        let b = seq.named_path(date(), "m51").unwrap();
        assert_eq!(b.file_name().unwrap(), "m51(0).fits");
        touch(&b);
        let c = seq.named_path(date(), "m51").unwrap();
        assert_eq!(c.file_name().unwrap(), "m51(1).fits");
    }

    #[test]
    fn test_unsafe_names_fall_back_to_sequence() {
        let dir = TempDir::new().unwrap();
        let seq = FileSequencer::new(dir.path(), "img");

        for bad in ["", "  ", "a:b", "a/b", "a\\b", "up..dir", "what?"] {
            let path = seq.named_path(date(), bad).unwrap();
            assert_eq!(path.file_name().unwrap(), "img-0000.fits", "name {bad:?}");
        }
    }
}
