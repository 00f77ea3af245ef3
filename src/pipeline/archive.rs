//! Zip archive expansion.

use std::io::{Cursor, Read};

use tracing::debug;

use crate::error::PipelineError;

/// One file extracted from an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveMember {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Expand a zip archive into its members, in archive order.
///
/// Every member is read fully before returning. Directory entries carry no
/// content and are skipped. An archive with no files yields an empty vec.
pub fn expand(archive_bytes: &[u8]) -> Result<Vec<ArchiveMember>, PipelineError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(archive_bytes))
        .map_err(|e| PipelineError::format("archive", e))?;

    let mut members = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| PipelineError::format("archive", e))?;
        if entry.is_dir() {
            continue;
        }

        let name = entry.name().to_string();
        let mut bytes = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
        entry
            .read_to_end(&mut bytes)
            .map_err(|e| PipelineError::format("archive", format!("{name}: {e}")))?;

        debug!(member = %name, bytes = bytes.len(), "Expanded archive member");
        members.push(ArchiveMember { name, bytes });
    }

    Ok(members)
}
