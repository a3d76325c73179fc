use std::fs;
use std::io::Write;

use flate2::Compression;
use flate2::write::GzEncoder;
use tempfile::tempdir;
use volume_metrics_types::{ScalarType, Shape, Volume, VolumeError, VolumeMetadata};

use crate::{WriteEncoding, WriteOptions, load, write};

fn ramp(shape: Vec<usize>, scalar_type: ScalarType) -> Volume {
    let count = shape.iter().product::<usize>();
    let data = (0..count).map(|i| (i % 200) as f64).collect();
    Volume::from_owned(Shape::new(shape), scalar_type, data).unwrap()
}

#[test]
fn written_gzip_volume_loads_back_with_metadata() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("scan.nrrd");
    let mut metadata = VolumeMetadata {
        space: Some("left-posterior-superior".to_string()),
        space_directions: Some(vec![
            Some(vec![1.0, 0.0, 0.0]),
            Some(vec![0.0, 1.0, 0.0]),
            Some(vec![0.0, 0.0, 2.5]),
        ]),
        space_origin: Some(vec![0.0, -4.0, 12.5]),
        ..VolumeMetadata::default()
    };
    metadata
        .key_values
        .insert("protocol".to_string(), "t1".to_string());
    let volume = ramp(vec![6, 5, 4], ScalarType::Int16).with_metadata(metadata.clone());

    write(
        &path,
        &volume,
        WriteOptions {
            encoding: WriteEncoding::Gzip,
        },
    )
    .unwrap();
    let loaded = load(&path).unwrap();

    assert_eq!(loaded.shape(), volume.shape());
    assert_eq!(loaded.scalar_type(), ScalarType::Int16);
    assert_eq!(loaded.data(), volume.data());
    assert_eq!(loaded.metadata(), &metadata);
}

#[test]
fn float_raw_volume_keeps_fractional_samples() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("float.nrrd");
    let data = vec![0.5, -1.25, 255.75, 3.0];
    let volume = Volume::from_owned(Shape::new(vec![2, 2]), ScalarType::Float, data.clone()).unwrap();
    write(&path, &volume, WriteOptions::default()).unwrap();
    assert_eq!(load(&path).unwrap().data(), data.as_slice());
}

#[test]
fn detached_payload_honours_line_skip() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("payload.raw"), b"junk line\n\x01\x02\x03\x04").unwrap();
    let header_path = dir.path().join("detached.nrrd");
    fs::write(
        &header_path,
        "NRRD0004\ntype: uint8\ndimension: 2\nsizes: 2 2\nencoding: raw\nline skip: 1\ndata file: payload.raw\n",
    )
    .unwrap();

    let volume = load(&header_path).unwrap();
    assert_eq!(volume.shape().dims(), &[2, 2]);
    assert_eq!(volume.data(), &[1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn negative_byte_skip_reads_trailing_bytes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tail.nrrd");
    let mut bytes = b"NRRD0004\ntype: uint16\ndimension: 1\nsizes: 2\nendian: little\nencoding: raw\nbyte skip: -1\n\n".to_vec();
    bytes.extend_from_slice(&[0xAA, 0xBB, 0x10, 0x00, 0x20, 0x00]);
    fs::write(&path, bytes).unwrap();

    assert_eq!(load(&path).unwrap().data(), &[16.0, 32.0]);
}

#[test]
fn gzip_payload_with_byte_skip_after_decompression() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("skip.nrrd");
    let mut bytes = b"NRRD0004\ntype: uchar\ndimension: 1\nsizes: 3\nencoding: gzip\nbyte skip: 2\n\n".to_vec();
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&[9, 9, 7, 8, 9]).unwrap();
    bytes.extend(encoder.finish().unwrap());
    fs::write(&path, bytes).unwrap();

    assert_eq!(load(&path).unwrap().data(), &[7.0, 8.0, 9.0]);
}

#[test]
fn ascii_payload_parses_numbers() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("text.nrrd");
    fs::write(
        &path,
        "NRRD0004\ntype: double\ndimension: 2\nsizes: 3 1\nencoding: ascii\n\n1.5 2\n-3\n",
    )
    .unwrap();

    assert_eq!(load(&path).unwrap().data(), &[1.5, 2.0, -3.0]);
}

#[test]
fn truncated_payload_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("short.nrrd");
    let mut bytes = b"NRRD0004\ntype: uchar\ndimension: 2\nsizes: 4 4\nencoding: raw\n\n".to_vec();
    bytes.extend_from_slice(&[0u8; 10]);
    fs::write(&path, bytes).unwrap();

    let err = load(&path).unwrap_err();
    assert!(matches!(
        err,
        VolumeError::PayloadLength {
            expected: 16,
            actual: 10
        }
    ));
}

#[test]
fn corrupt_gzip_reports_decompression_failure() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("corrupt.nrrd");
    let mut bytes = b"NRRD0004\ntype: uchar\ndimension: 1\nsizes: 4\nencoding: gzip\n\n".to_vec();
    bytes.extend_from_slice(b"definitely not gzip");
    fs::write(&path, bytes).unwrap();

    assert!(matches!(
        load(&path).unwrap_err(),
        VolumeError::Decompress { .. }
    ));
}

#[test]
fn missing_file_names_the_path() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("absent.nrrd");
    let err = load(&path).unwrap_err();
    assert!(err.to_string().contains("absent.nrrd"));
}

#[test]
fn huge_declared_shape_fails_without_allocating_it() {
    let dir = tempdir().unwrap();
    for encoding in ["raw", "gzip", "hex", "ascii"] {
        let path = dir.path().join(format!("huge-{encoding}.nrrd"));
        let mut bytes = format!(
            "NRRD0004\ntype: uchar\ndimension: 3\nsizes: 100000 100000 100000\nencoding: {encoding}\n\n"
        )
        .into_bytes();
        if encoding == "gzip" {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&[1, 2]).unwrap();
            bytes.extend(encoder.finish().unwrap());
        } else if encoding == "raw" {
            bytes.extend_from_slice(&[1, 2]);
        } else {
            bytes.extend_from_slice(b"01 02\n");
        }
        fs::write(&path, bytes).unwrap();

        let err = load(&path).unwrap_err();
        assert!(
            matches!(err, VolumeError::PayloadLength { .. }),
            "{encoding}: {err}"
        );
    }
}
