//! NRRD reader and writer producing [`Volume`]s.
//!
//! Supports attached and single detached payloads in raw, gzip, ascii and hex
//! encodings. Spatial fields are parsed into [`VolumeMetadata`] but never
//! applied to the samples.
//!
//! [`VolumeMetadata`]: volume_metrics_types::VolumeMetadata

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use volume_metrics_types::{Shape, Volume, VolumeError, VolumeResult};

pub mod header;
pub mod payload;
pub mod writer;

pub use header::{ByteSkip, Encoding, Endian, NrrdHeader, parse_header};
pub use writer::{WriteEncoding, WriteOptions, write};

/// Extension of attached NRRD files, without the dot.
pub const EXTENSION: &str = "nrrd";

/// Loads the volume stored at `path`.
pub fn load(path: &Path) -> VolumeResult<Volume> {
    let file = File::open(path).map_err(|source| VolumeError::io(path, source))?;
    let mut reader = BufReader::new(file);
    let header = parse_header(&mut reader).map_err(|err| with_path(err, path))?;

    let samples = match header.data_file.as_ref() {
        Some(data_file) => {
            let data_path = resolve_data_file(path, data_file);
            let data = File::open(&data_path).map_err(|source| VolumeError::io(&data_path, source))?;
            payload::read_payload(&header, BufReader::new(data))
                .map_err(|err| with_path(err, &data_path))?
        }
        None => payload::read_payload(&header, reader).map_err(|err| with_path(err, path))?,
    };

    let shape = Shape::new(header.sizes.clone());
    Ok(Volume::from_owned(shape, header.scalar_type, samples)?.with_metadata(header.metadata))
}

fn resolve_data_file(header_path: &Path, data_file: &Path) -> PathBuf {
    if data_file.is_absolute() {
        return data_file.to_path_buf();
    }
    header_path
        .parent()
        .map(|dir| dir.join(data_file))
        .unwrap_or_else(|| data_file.to_path_buf())
}

/// Replaces the placeholder path that stream-level readers attach to I/O errors.
fn with_path(err: VolumeError, path: &Path) -> VolumeError {
    match err {
        VolumeError::Io { source, .. } => VolumeError::io(path, source),
        other => other,
    }
}

#[cfg(test)]
mod tests;
