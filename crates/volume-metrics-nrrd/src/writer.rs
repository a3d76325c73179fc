use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;
use volume_metrics_types::{ScalarType, Volume, VolumeError, VolumeMetadata, VolumeResult};

use crate::header::Encoding;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WriteEncoding {
    Raw,
    Gzip,
}

#[derive(Copy, Clone, Debug)]
pub struct WriteOptions {
    pub encoding: WriteEncoding,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            encoding: WriteEncoding::Raw,
        }
    }
}

/// Writes `volume` as a single attached NRRD file in little-endian order.
///
/// Samples are narrowed back to the volume's scalar type with `as` casts.
pub fn write(path: &Path, volume: &Volume, options: WriteOptions) -> VolumeResult<()> {
    let file = File::create(path).map_err(|source| VolumeError::io(path, source))?;
    let mut out = BufWriter::new(file);
    let encoding = match options.encoding {
        WriteEncoding::Raw => Encoding::Raw,
        WriteEncoding::Gzip => Encoding::Gzip,
    };

    let header = render_header(volume, encoding);
    out.write_all(header.as_bytes())
        .map_err(|source| VolumeError::io(path, source))?;

    let payload = encode_samples(volume.data(), volume.scalar_type());
    match options.encoding {
        WriteEncoding::Raw => out
            .write_all(&payload)
            .map_err(|source| VolumeError::io(path, source))?,
        WriteEncoding::Gzip => {
            let mut encoder = GzEncoder::new(&mut out, Compression::default());
            encoder
                .write_all(&payload)
                .map_err(|source| VolumeError::io(path, source))?;
            encoder
                .finish()
                .map_err(|source| VolumeError::io(path, source))?;
        }
    }
    out.flush().map_err(|source| VolumeError::io(path, source))
}

fn render_header(volume: &Volume, encoding: Encoding) -> String {
    let shape = volume.shape();
    let sizes = shape
        .dims()
        .iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    let mut header = String::from("NRRD0004\n");
    header.push_str("# Complete NRRD file format specification at:\n");
    header.push_str("# http://teem.sourceforge.net/nrrd/format.html\n");
    header.push_str(&format!("type: {}\n", volume.scalar_type()));
    header.push_str(&format!("dimension: {}\n", shape.ndim()));
    header.push_str(&format!("sizes: {sizes}\n"));
    if volume.scalar_type().size_bytes() > 1 {
        header.push_str("endian: little\n");
    }
    header.push_str(&format!("encoding: {}\n", encoding.as_str()));
    render_metadata(&mut header, volume.metadata());
    header.push('\n');
    header
}

fn render_metadata(header: &mut String, metadata: &VolumeMetadata) {
    if let Some(space) = metadata.space.as_ref() {
        header.push_str(&format!("space: {space}\n"));
    }
    if let Some(directions) = metadata.space_directions.as_ref() {
        let rendered = directions
            .iter()
            .map(|axis| match axis {
                Some(vector) => render_vector(vector),
                None => "none".to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ");
        header.push_str(&format!("space directions: {rendered}\n"));
    }
    if let Some(origin) = metadata.space_origin.as_ref() {
        header.push_str(&format!("space origin: {}\n", render_vector(origin)));
    }
    for (key, value) in &metadata.key_values {
        header.push_str(&format!("{key}:={value}\n"));
    }
}

fn render_vector(vector: &[f64]) -> String {
    let parts = vector
        .iter()
        .map(f64::to_string)
        .collect::<Vec<_>>()
        .join(",");
    format!("({parts})")
}

fn encode_samples(samples: &[f64], scalar_type: ScalarType) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * scalar_type.size_bytes());
    for &value in samples {
        match scalar_type {
            ScalarType::Int8 => bytes.extend_from_slice(&(value as i8).to_le_bytes()),
            ScalarType::UInt8 => bytes.push(value as u8),
            ScalarType::Int16 => bytes.extend_from_slice(&(value as i16).to_le_bytes()),
            ScalarType::UInt16 => bytes.extend_from_slice(&(value as u16).to_le_bytes()),
            ScalarType::Int32 => bytes.extend_from_slice(&(value as i32).to_le_bytes()),
            ScalarType::UInt32 => bytes.extend_from_slice(&(value as u32).to_le_bytes()),
            ScalarType::Int64 => bytes.extend_from_slice(&(value as i64).to_le_bytes()),
            ScalarType::UInt64 => bytes.extend_from_slice(&(value as u64).to_le_bytes()),
            ScalarType::Float => bytes.extend_from_slice(&(value as f32).to_le_bytes()),
            ScalarType::Double => bytes.extend_from_slice(&value.to_le_bytes()),
        }
    }
    bytes
}
