//! tar+gzip entry walker.
//!
//! Streams entries out of a gzip-compressed tarball and feeds each one to
//! the shared [`EntryWriter`] funnel. The tar header carries the declared
//! size and mode bits before any content is read, which is what lets the
//! size caps run ahead of the copy.

use super::{EntryKind, EntryMeta, EntryWriter, ExtractError};
use flate2::read::GzDecoder;
use std::fs::File;
use std::path::Path;
use tar::{Archive, EntryType};

pub(crate) fn extract<F>(src: &Path, writer: &mut EntryWriter<'_, F>) -> Result<(), ExtractError>
where
    F: FnMut(&str) -> bool,
{
    let file = File::open(src)?;
    let decoder = GzDecoder::new(file);
    let mut archive = Archive::new(decoder);

    // Entries are streamed through the shared writer; the tar crate's own
    // unpack (and its permission handling) is never used.
    let entries = archive
        .entries()
        .map_err(|e| ExtractError::Malformed(e.to_string()))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| ExtractError::Malformed(e.to_string()))?;

        let name = entry
            .path()
            .map_err(|e| ExtractError::Malformed(e.to_string()))?
            .to_string_lossy()
            .into_owned();

        let kind = match entry.header().entry_type() {
            EntryType::Regular => {
                let mode = entry.header().mode().unwrap_or(0);
                EntryKind::File {
                    executable: mode & 0o111 != 0,
                }
            }
            EntryType::Directory => EntryKind::Directory,
            // Symlinks, hard links, devices, fifos: never materialized.
            _ => EntryKind::Unsupported,
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
