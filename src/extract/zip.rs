//! zip entry walker.
//!
//! Walks a zip archive by index and feeds each entry to the shared
//! [`EntryWriter`] funnel. The central directory gives the declared
//! uncompressed size up front, so the size caps run before any content
//! is inflated.

use super::{EntryKind, EntryMeta, EntryWriter, ExtractError};
use std::fs::File;
use std::path::Path;
use zip::ZipArchive;

/// Unix file-type bits carried in the zip external attributes.
const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

pub(crate) fn extract<F>(src: &Path, writer: &mut EntryWriter<'_, F>) -> Result<(), ExtractError>
where
    F: FnMut(&str) -> bool,
{
    let file = File::open(src)?;
    let mut archive =
        ZipArchive::new(file).map_err(|e| ExtractError::Malformed(e.to_string()))?;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| ExtractError::Malformed(e.to_string()))?;

        let name = entry.name().to_string();
        let mode = entry.unix_mode();

        let kind = if mode.is_some_and(|m| m & S_IFMT == S_IFLNK) {
            EntryKind::Unsupported
        } else if entry.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File {
                executable: mode.is_some_and(|m| m & 0o111 != 0),
            }
        };

        let meta = EntryMeta {
            name,
            kind,
            size: entry.size(),
        };
        writer.apply(&meta, &mut entry)?;
    }

    Ok(())
}
