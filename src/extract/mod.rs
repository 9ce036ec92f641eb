//! Archive Extraction Pipeline
//!
//! Extracts vendor archives (zip or tar+gzip) into a destination directory
//! while defending against path-traversal and resource-exhaustion attacks:
//!
//! 1. Every entry name passes through [`safe_join`] before any filesystem
//!    operation; this defeats zip-slip / tar-slip.
//! 2. Per-entry and cumulative size limits are enforced before the copy, and
//!    the copy itself is bounded with a hard [`Read::take`] cap so lying
//!    metadata cannot inflate the bytes written.
//! 3. Symlinks and special-device entries are never materialized.
//!
//! Both formats funnel through one entry-writing routine so the security
//! checks cannot drift apart. Entries are processed in archive order; there
//! is no parallel extraction.

pub mod path;
mod tar;
mod zip;

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;
use tracing::debug;

pub use path::safe_join;

/// Default per-entry cap: 128 MiB.
pub const DEFAULT_MAX_ENTRY_BYTES: u64 = 128 << 20;

/// Default cumulative cap per archive: 512 MiB.
pub const DEFAULT_MAX_TOTAL_BYTES: u64 = 512 << 20;

/// Size caps applied during extraction.
///
/// Both caps are enforced before or during the copy, never after, so a
/// malicious archive cannot commit disk or memory beyond them.
#[derive(Debug, Clone)]
pub struct ExtractLimits {
    /// Maximum declared bytes for a single entry.
    pub max_entry_bytes: u64,

    /// Maximum cumulative declared bytes across the whole archive.
    pub max_total_bytes: u64,
}

impl Default for ExtractLimits {
    fn default() -> Self {
        Self {
            max_entry_bytes: DEFAULT_MAX_ENTRY_BYTES,
            max_total_bytes: DEFAULT_MAX_TOTAL_BYTES,
        }
    }
}

/// Error types for archive extraction
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// A single entry declares more bytes than the per-entry cap.
    #[error("archive entry '{name}' too large: {size} bytes (limit {limit})")]
    EntryTooLarge { name: String, size: u64, limit: u64 },

    /// The archive as a whole exceeds the cumulative cap.
    #[error("archive exceeds total extraction limit of {limit} bytes")]
    TotalTooLarge { limit: u64 },

    /// An entry name resolves outside the destination root.
    #[error("unsafe path in archive: {0}")]
    PathEscape(String),

    /// The input is neither a zip nor a gzip-compressed tar.
    #[error("unrecognized archive format")]
    UnsupportedFormat,

    /// The archive structure itself could not be read.
    #[error("malformed archive: {0}")]
    Malformed(String),

    /// Filesystem failure; the extraction is aborted as a whole.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// What an archive entry is, independent of container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryKind {
    /// Regular file; `executable` reflects the source mode bits.
    File { executable: bool },
    /// Directory entry.
    Directory,
    /// Symlink, device, or anything else we refuse to materialize.
    Unsupported,
}

/// Per-entry metadata shared by the tar and zip walkers.
#[derive(Debug, Clone)]
pub(crate) struct EntryMeta {
    pub name: String,
    pub kind: EntryKind,
    /// Declared uncompressed size; zero for directories.
    pub size: u64,
}

/// The single funnel both walkers feed entries through.
///
/// Holds the running total so the cumulative cap is enforced across the
/// whole archive regardless of container format.
pub(crate) struct EntryWriter<'a, F> {
    dest: &'a Path,
    limits: &'a ExtractLimits,
    filter: F,
    total: u64,
}

impl<F: FnMut(&str) -> bool> EntryWriter<'_, F> {
    /// Apply one entry: filter, reject unsafe kinds, enforce limits, and
    /// materialize the entry under the destination root.
    fn apply(&mut self, meta: &EntryMeta, reader: &mut dyn Read) -> Result<(), ExtractError> {
        if !(self.filter)(&meta.name) {
            debug!(entry = %meta.name, "skipping filtered entry");
            return Ok(());
        }

        match meta.kind {
            EntryKind::Unsupported => {
                debug!(entry = %meta.name, "skipping symlink or special entry");
                Ok(())
            }
            EntryKind::Directory => {
                let target = safe_join(self.dest, &meta.name)?;
                fs::create_dir_all(&target)?;
                Ok(())
            }
            EntryKind::File { executable } => {
                if meta.size > self.limits.max_entry_bytes {
                    return Err(ExtractError::EntryTooLarge {
                        name: meta.name.clone(),
                        size: meta.size,
                        limit: self.limits.max_entry_bytes,
                    });
                }
                if self.total.saturating_add(meta.size) > self.limits.max_total_bytes {
                    return Err(ExtractError::TotalTooLarge {
                        limit: self.limits.max_total_bytes,
                    });
                }

                let target = safe_join(self.dest, &meta.name)?;
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }

                // Truncate-then-write keeps re-extraction idempotent. The
                // take() bound caps the actual bytes read no matter what the
                // entry header claims.
                let mut out = File::create(&target)?;
                io::copy(&mut reader.take(meta.size), &mut out)?;
                self.total += meta.size;

                #[cfg(unix)]
                if executable {
                    use std::os::unix::fs::PermissionsExt;
                    fs::set_permissions(&target, fs::Permissions::from_mode(0o755))?;
                }
                #[cfg(not(unix))]
                let _ = executable;

                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    TarGz,
    Zip,
}

/// Sniff the container format from magic bytes rather than the file name.
fn sniff_format(src: &Path) -> Result<Format, ExtractError> {
    let mut magic = [0u8; 4];
    let mut file = File::open(src)?;
    let read = file.read(&mut magic)?;

    if read >= 2 && magic[0] == 0x1f && magic[1] == 0x8b {
        return Ok(Format::TarGz);
    }
    if read >= 4 && magic[..2] == *b"PK" && (magic[2] == 3 || magic[2] == 5) {
        return Ok(Format::Zip);
    }
    Err(ExtractError::UnsupportedFormat)
}

/// Extract an archive into `dest`, keeping only entries whose names pass
/// `filter`. Returns the cumulative declared bytes extracted.
///
/// Entries are processed strictly in archive order. On any error the
/// extraction aborts as a whole; partially extracted state is left on disk
/// and callers are expected to re-provision idempotently rather than trust
/// an aborted tree.
pub fn extract_archive<F>(
    src: &Path,
    dest: &Path,
    limits: &ExtractLimits,
    filter: F,
) -> Result<u64, ExtractError>
where
    F: FnMut(&str) -> bool,
{
    let format = sniff_format(src)?;
    let mut writer = EntryWriter {
        dest,
        limits,
        filter,
        total: 0,
    };

    match format {
        Format::TarGz => tar::extract(src, &mut writer)?,
        Format::Zip => zip::extract(src, &mut writer)?,
    }

    debug!(bytes = writer.total, dest = %dest.display(), "extraction complete");
    Ok(writer.total)
}

/// Convenience wrapper for callers that want the whole archive.
pub fn extract_all(src: &Path, dest: &Path, limits: &ExtractLimits) -> Result<u64, ExtractError> {
    extract_archive(src, dest, limits, |_| true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Build a tar.gz on disk from (name, kind, contents) triples.
    fn write_targz(dir: &Path, entries: &[(&str, TestEntry)]) -> PathBuf {
        let path = dir.join("fixture.tar.gz");
        let file = File::create(&path).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = ::tar::Builder::new(encoder);

        for (name, entry) in entries {
            match entry {
                TestEntry::File { data, mode } => {
                    let mut header = ::tar::Header::new_gnu();
                    header.set_size(data.len() as u64);
                    header.set_mode(*mode);
                    header.set_cksum();
                    builder.append_data(&mut header, name, data.as_slice()).unwrap();
                }
                TestEntry::Dir => {
                    let mut header = ::tar::Header::new_gnu();
                    header.set_size(0);
                    header.set_mode(0o755);
                    header.set_entry_type(::tar::EntryType::Directory);
                    header.set_cksum();
                    builder.append_data(&mut header, name, io::empty()).unwrap();
                }
                TestEntry::Symlink { target } => {
                    let mut header = ::tar::Header::new_gnu();
                    header.set_size(0);
                    header.set_mode(0o777);
                    header.set_entry_type(::tar::EntryType::Symlink);
                    header.set_cksum();
                    builder
                        .append_link(&mut header, name, Path::new(target))
                        .unwrap();
                }
            }
        }
        builder.into_inner().unwrap().finish().unwrap();
        path
    }

    /// Build a zip on disk from (name, data, unix mode) triples.
    fn write_zip(dir: &Path, entries: &[(&str, Vec<u8>, u32)]) -> PathBuf {
        use ::zip::write::SimpleFileOptions;

        let path = dir.join("fixture.zip");
        let file = File::create(&path).unwrap();
        let mut writer = ::zip::ZipWriter::new(file);

        for (name, data, mode) in entries {
            if name.ends_with('/') {
                writer
                    .add_directory(name.trim_end_matches('/'), SimpleFileOptions::default())
                    .unwrap();
            } else {
                let options = SimpleFileOptions::default().unix_permissions(*mode);
                writer.start_file(*name, options).unwrap();
                writer.write_all(data).unwrap();
            }
        }
        writer.finish().unwrap();
        path
    }

    enum TestEntry {
        File { data: Vec<u8>, mode: u32 },
        Dir,
        Symlink { target: String },
    }

    fn small_limits() -> ExtractLimits {
        ExtractLimits {
            max_entry_bytes: 64,
            max_total_bytes: 128,
        }
    }

    #[test]
    fn round_trip_one_dir_one_file() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("out");
        let payload = b"hello bundle".to_vec();
        let archive = write_targz(
            tmp.path(),
            &[
                ("awscli/", TestEntry::Dir),
                (
                    "awscli/dist/aws",
                    TestEntry::File {
                        data: payload.clone(),
                        mode: 0o755,
                    },
                ),
            ],
        );

        let total = extract_all(&archive, &dest, &ExtractLimits::default()).unwrap();
        assert_eq!(total, payload.len() as u64);
        assert!(dest.join("awscli").is_dir());
        assert_eq!(fs::read(dest.join("awscli/dist/aws")).unwrap(), payload);
    }

    #[cfg(unix)]
    #[test]
    fn executable_bit_is_preserved() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("out");
        let archive = write_targz(
            tmp.path(),
            &[(
                "bin/tool",
                TestEntry::File {
                    data: b"#!/bin/sh\n".to_vec(),
                    mode: 0o755,
                },
            )],
        );

        extract_all(&archive, &dest, &ExtractLimits::default()).unwrap();
        let mode = fs::metadata(dest.join("bin/tool")).unwrap().permissions().mode();
        assert_ne!(mode & 0o111, 0);
    }

    #[test]
    fn zero_byte_entry_produces_empty_file() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("out");
        let archive = write_targz(
            tmp.path(),
            &[(
                "empty.txt",
                TestEntry::File {
                    data: Vec::new(),
                    mode: 0o644,
                },
            )],
        );

        extract_all(&archive, &dest, &ExtractLimits::default()).unwrap();
        assert_eq!(fs::metadata(dest.join("empty.txt")).unwrap().len(), 0);
    }

    #[test]
    fn re_extraction_overwrites_existing_file() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("out");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("data.txt"), b"stale and much longer contents").unwrap();

        let archive = write_targz(
            tmp.path(),
            &[(
                "data.txt",
                TestEntry::File {
                    data: b"fresh".to_vec(),
                    mode: 0o644,
                },
            )],
        );

        extract_all(&archive, &dest, &ExtractLimits::default()).unwrap();
        assert_eq!(fs::read(dest.join("data.txt")).unwrap(), b"fresh");
    }

    #[test]
    fn symlink_entries_are_never_materialized() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("out");
        let archive = write_targz(
            tmp.path(),
            &[
                (
                    "link",
                    TestEntry::Symlink {
                        target: "../../outside".to_string(),
                    },
                ),
                (
                    "real.txt",
                    TestEntry::File {
                        data: b"ok".to_vec(),
                        mode: 0o644,
                    },
                ),
            ],
        );

        extract_all(&archive, &dest, &ExtractLimits::default()).unwrap();
        assert!(!dest.join("link").exists());
        assert!(dest.join("real.txt").exists());
    }

    #[test]
    fn traversal_entry_fails_and_writes_nothing_outside() {
        // tar::Builder refuses to write `..` paths, so forge the header's
        // raw name bytes the way a hostile archive would.
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("out");
        let archive_path = tmp.path().join("evil.tar.gz");

        let file = File::create(&archive_path).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = ::tar::Builder::new(encoder);

        let payload = b"evil";
        let mut header = ::tar::Header::new_gnu();
        let name = b"../escape.txt";
        header.as_old_mut().name[..name.len()].copy_from_slice(name);
        header.set_size(payload.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, payload.as_slice()).unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let err = extract_all(&archive_path, &dest, &ExtractLimits::default()).unwrap_err();
        assert!(matches!(err, ExtractError::PathEscape(_)), "{err}");
        assert!(!tmp.path().join("escape.txt").exists());
    }

    #[test]
    fn oversized_entry_is_rejected_before_copy() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("out");
        let archive = write_targz(
            tmp.path(),
            &[(
                "big.bin",
                TestEntry::File {
                    data: vec![0u8; 65],
                    mode: 0o644,
                },
            )],
        );

        let err = extract_all(&archive, &dest, &small_limits()).unwrap_err();
        assert!(matches!(err, ExtractError::EntryTooLarge { .. }), "{err}");
        assert!(!dest.join("big.bin").exists());
    }

    #[test]
    fn cumulative_limit_fails_before_offending_entry_is_written() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("out");
        let archive = write_targz(
            tmp.path(),
            &[
                (
                    "a.bin",
                    TestEntry::File {
                        data: vec![1u8; 60],
                        mode: 0o644,
                    },
                ),
                (
                    "b.bin",
                    TestEntry::File {
                        data: vec![2u8; 60],
                        mode: 0o644,
                    },
                ),
                (
                    "c.bin",
                    TestEntry::File {
                        data: vec![3u8; 60],
                        mode: 0o644,
                    },
                ),
            ],
        );

        let err = extract_all(&archive, &dest, &small_limits()).unwrap_err();
        assert!(matches!(err, ExtractError::TotalTooLarge { .. }), "{err}");
        // The first two fit under the 128-byte total; the third must not.
        assert!(dest.join("a.bin").exists());
        assert!(dest.join("b.bin").exists());
        assert!(!dest.join("c.bin").exists());
    }

    #[test]
    fn filter_skips_entries_outside_expected_subtree() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("out");
        let archive = write_targz(
            tmp.path(),
            &[
                (
                    "awscli/dist/aws",
                    TestEntry::File {
                        data: b"bin".to_vec(),
                        mode: 0o755,
                    },
                ),
                (
                    "README.md",
                    TestEntry::File {
                        data: b"docs".to_vec(),
                        mode: 0o644,
                    },
                ),
            ],
        );

        extract_archive(&archive, &dest, &ExtractLimits::default(), |name| {
            name.starts_with("awscli/")
        })
        .unwrap();
        assert!(dest.join("awscli/dist/aws").exists());
        assert!(!dest.join("README.md").exists());
    }

    #[test]
    fn zip_round_trip_through_same_pipeline() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("out");
        let archive = write_zip(
            tmp.path(),
            &[
                ("awscli/", Vec::new(), 0o755),
                ("awscli/dist/aws", b"zip binary".to_vec(), 0o755),
            ],
        );

        let total = extract_all(&archive, &dest, &ExtractLimits::default()).unwrap();
        assert_eq!(total, 10);
        assert_eq!(fs::read(dest.join("awscli/dist/aws")).unwrap(), b"zip binary");
    }

    #[test]
    fn zip_traversal_entry_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("out");
        let archive = write_zip(tmp.path(), &[("../escape.txt", b"evil".to_vec(), 0o644)]);

        let err = extract_all(&archive, &dest, &ExtractLimits::default()).unwrap_err();
        assert!(matches!(err, ExtractError::PathEscape(_)), "{err}");
        assert!(!tmp.path().join("escape.txt").exists());
    }

    #[test]
    fn zip_oversized_entry_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("out");
        let archive = write_zip(tmp.path(), &[("big.bin", vec![0u8; 65], 0o644)]);

        let err = extract_all(&archive, &dest, &small_limits()).unwrap_err();
        assert!(matches!(err, ExtractError::EntryTooLarge { .. }), "{err}");
    }

    #[test]
    fn garbage_input_is_unsupported() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("noise.bin");
        fs::write(&path, b"not an archive at all").unwrap();

        let err = extract_all(&path, &tmp.path().join("out"), &ExtractLimits::default())
            .unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedFormat), "{err}");
    }
}
