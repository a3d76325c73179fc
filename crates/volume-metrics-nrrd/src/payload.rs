use std::io::{self, BufRead, Read};

use flate2::read::MultiGzDecoder;
use volume_metrics_types::{ScalarType, VolumeError, VolumeResult};

use crate::header::{ByteSkip, Encoding, Endian, NrrdHeader};

/// Decodes the payload that `reader` is positioned at into widened samples.
pub fn read_payload<R: BufRead>(header: &NrrdHeader, mut reader: R) -> VolumeResult<Vec<f64>> {
    let count = header
        .element_count()
        .ok_or_else(|| VolumeError::InvalidVolume {
            reason: format!("element count of sizes {:?} overflowed", header.sizes),
        })?;
    let expected = header
        .payload_bytes()
        .ok_or_else(|| VolumeError::InvalidVolume {
            reason: "payload byte length overflowed".to_string(),
        })?;

    skip_lines(&mut reader, header.line_skip)?;

    match header.encoding {
        Encoding::Raw => {
            let bytes = match header.byte_skip {
                ByteSkip::Bytes(skip) => {
                    skip_bytes(&mut reader, skip)?;
                    read_exact_prefix(&mut reader, expected)?
                }
                ByteSkip::FromEnd => {
                    let all = read_all(&mut reader)?;
                    if all.len() < expected {
                        return Err(VolumeError::PayloadLength {
                            expected,
                            actual: all.len(),
                        });
                    }
                    all[all.len() - expected..].to_vec()
                }
            };
            decode_binary(&bytes, header.scalar_type, header.endian)
        }
        Encoding::Gzip => {
            let mut decoder = io::BufReader::new(MultiGzDecoder::new(reader));
            if let ByteSkip::Bytes(skip) = header.byte_skip {
                skip_bytes(&mut decoder, skip).map_err(into_decompress)?;
            }
            let bytes = read_exact_prefix(&mut decoder, expected).map_err(into_decompress)?;
            decode_binary(&bytes, header.scalar_type, header.endian)
        }
        Encoding::Hex => {
            let text = read_all(&mut reader)?;
            let bytes = decode_hex(&text, expected)?;
            decode_binary(&bytes, header.scalar_type, header.endian)
        }
        Encoding::Ascii => {
            let text = read_all(&mut reader)?;
            decode_ascii(&text, count)
        }
    }
}

fn into_decompress(err: VolumeError) -> VolumeError {
    match err {
        VolumeError::Io { source, .. } => VolumeError::Decompress { source },
        other => other,
    }
}

fn payload_io(source: io::Error) -> VolumeError {
    VolumeError::io("<payload>", source)
}

fn skip_lines<R: BufRead>(reader: &mut R, lines: usize) -> VolumeResult<()> {
    let mut sink = Vec::new();
    for _ in 0..lines {
        sink.clear();
        let read = reader.read_until(b'\n', &mut sink).map_err(payload_io)?;
        if read == 0 {
            return Err(VolumeError::PayloadLength {
                expected: lines,
                actual: 0,
            });
        }
    }
    Ok(())
}

fn skip_bytes<R: Read>(reader: &mut R, bytes: u64) -> VolumeResult<()> {
    let skipped = io::copy(&mut reader.take(bytes), &mut io::sink()).map_err(payload_io)?;
    if skipped < bytes {
        return Err(VolumeError::PayloadLength {
            expected: bytes as usize,
            actual: skipped as usize,
        });
    }
    Ok(())
}

fn read_all<R: Read>(reader: &mut R) -> VolumeResult<Vec<u8>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).map_err(payload_io)?;
    Ok(buf)
}

/// Reads exactly `expected` bytes; trailing data is ignored.
///
/// The buffer grows with the data actually read, never with the size the
/// header declares.
fn read_exact_prefix<R: Read>(reader: &mut R, expected: usize) -> VolumeResult<Vec<u8>> {
    let mut buf = Vec::new();
    reader
        .take(expected as u64)
        .read_to_end(&mut buf)
        .map_err(payload_io)?;
    if buf.len() < expected {
        return Err(VolumeError::PayloadLength {
            expected,
            actual: buf.len(),
        });
    }
    Ok(buf)
}

fn decode_hex(text: &[u8], expected: usize) -> VolumeResult<Vec<u8>> {
    let mut bytes = Vec::with_capacity(expected.min(text.len() / 2));
    let mut high: Option<u8> = None;
    for &ch in text {
        if ch.is_ascii_whitespace() {
            continue;
        }
        let nibble = (ch as char)
            .to_digit(16)
            .ok_or_else(|| VolumeError::InvalidValue {
                reason: format!("'{}' is not a hex digit", ch as char),
            })? as u8;
        match high.take() {
            Some(h) => {
                bytes.push((h << 4) | nibble);
                if bytes.len() == expected {
                    return Ok(bytes);
                }
            }
            None => high = Some(nibble),
        }
    }
    Err(VolumeError::PayloadLength {
        expected,
        actual: bytes.len(),
    })
}

fn decode_ascii(text: &[u8], count: usize) -> VolumeResult<Vec<f64>> {
    let text = std::str::from_utf8(text).map_err(|_| VolumeError::InvalidValue {
        reason: "ascii payload is not valid UTF-8".to_string(),
    })?;
    let mut values = Vec::with_capacity(count.min(text.len() / 2 + 1));
    for token in text
        .split(|c: char| c.is_ascii_whitespace() || c == ',')
        .filter(|token| !token.is_empty())
        .take(count)
    {
        let value = token
            .parse::<f64>()
            .map_err(|_| VolumeError::InvalidValue {
                reason: format!("'{token}' is not a number"),
            })?;
        values.push(value);
    }
    if values.len() < count {
        return Err(VolumeError::PayloadLength {
            expected: count,
            actual: values.len(),
        });
    }
    Ok(values)
}

fn decode_binary(
    bytes: &[u8],
    scalar_type: ScalarType,
    endian: Option<Endian>,
) -> VolumeResult<Vec<f64>> {
    let little = !matches!(endian, Some(Endian::Big));
    macro_rules! widen {
        ($ty:ty, $n:expr) => {
            bytes
                .chunks_exact($n)
                .map(|chunk| {
                    let mut raw = [0u8; $n];
                    raw.copy_from_slice(chunk);
                    let value = if little {
                        <$ty>::from_le_bytes(raw)
                    } else {
                        <$ty>::from_be_bytes(raw)
                    };
                    value as f64
                })
                .collect::<Vec<f64>>()
        };
    }
    let values: Vec<f64> = match scalar_type {
        ScalarType::Int8 => bytes.iter().map(|&b| b as i8 as f64).collect(),
        ScalarType::UInt8 => bytes.iter().map(|&b| b as f64).collect(),
        ScalarType::Int16 => widen!(i16, 2),
        ScalarType::UInt16 => widen!(u16, 2),
        ScalarType::Int32 => widen!(i32, 4),
        ScalarType::UInt32 => widen!(u32, 4),
        ScalarType::Int64 => widen!(i64, 8),
        ScalarType::UInt64 => widen!(u64, 8),
        ScalarType::Float => widen!(f32, 4),
        ScalarType::Double => widen!(f64, 8),
    };
    Ok(values)
}
