//! Packs the successful outputs of a batch into a single zip archive.

use crate::job_controller::pool::Settled;
use crate::pipeline::error::BatchError;
use crate::pipeline::transform::OutputImage;
use log::debug;
use std::collections::HashMap;
use std::io::{Cursor, Write};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// File name suggested to clients downloading an archive.
pub const ARCHIVE_FILE_NAME: &str = "modified_images.zip";

/// Serialized archive plus the names of the entries it holds, in order.
#[derive(Debug, Clone)]
pub struct ArchivePayload {
    bytes: Vec<u8>,
    entry_names: Vec<String>,
}

impl ArchivePayload {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn entry_names(&self) -> &[String] {
        &self.entry_names
    }

    pub fn len(&self) -> usize {
        self.entry_names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entry_names.is_empty()
    }
}

/// Writes every `Success` of `results` into a new archive; failures are skipped.
///
/// When two outputs share a name the later one wins. The entry keeps the
/// position where the name first appeared.
pub fn assemble<E>(results: &[Settled<OutputImage, E>]) -> Result<ArchivePayload, BatchError> {
    let mut entries: Vec<(&str, &[u8])> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for output in results.iter().filter_map(Settled::success) {
        match positions.get(output.name.as_str()) {
            Some(&pos) => {
                debug!("archive: '{}' replaced by a later output", output.name);
                entries[pos].1 = output.bytes.as_slice();
            }
            None => {
                positions.insert(output.name.as_str(), entries.len());
                entries.push((output.name.as_str(), output.bytes.as_slice()));
            }
        }
    }

    // PNG data is already deflated.
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, bytes) in &entries {
        zip.start_file(*name, options)?;
        zip.write_all(bytes).map_err(ZipError::from)?;
    }
    let bytes = zip.finish()?.into_inner();

    debug!("archive: {} entries, {} bytes", entries.len(), bytes.len());
    Ok(ArchivePayload {
        bytes,
        entry_names: entries.iter().map(|(name, _)| name.to_string()).collect(),
    })
}
