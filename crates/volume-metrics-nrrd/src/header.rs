use std::io::BufRead;
use std::path::PathBuf;
use std::str::FromStr;

use volume_metrics_types::{ScalarType, VolumeError, VolumeMetadata, VolumeResult};

const MAGIC_PREFIX: &str = "NRRD000";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Encoding {
    Raw,
    Gzip,
    Ascii,
    Hex,
}

impl Encoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Raw => "raw",
            Encoding::Gzip => "gzip",
            Encoding::Ascii => "ascii",
            Encoding::Hex => "hex",
        }
    }

    fn is_binary(&self) -> bool {
        !matches!(self, Encoding::Ascii)
    }
}

impl FromStr for Encoding {
    type Err = VolumeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" => Ok(Encoding::Raw),
            "gzip" | "gz" => Ok(Encoding::Gzip),
            "ascii" | "text" | "txt" => Ok(Encoding::Ascii),
            "hex" => Ok(Encoding::Hex),
            other => Err(VolumeError::UnsupportedEncoding {
                name: other.to_string(),
            }),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// Where the payload starts once line skipping is done.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ByteSkip {
    Bytes(u64),
    /// `byte skip: -1`: the payload is the trailing bytes of the file.
    FromEnd,
}

#[derive(Clone, Debug)]
pub struct NrrdHeader {
    pub version: u8,
    pub scalar_type: ScalarType,
    pub sizes: Vec<usize>,
    pub encoding: Encoding,
    pub endian: Option<Endian>,
    pub line_skip: usize,
    pub byte_skip: ByteSkip,
    pub data_file: Option<PathBuf>,
    pub metadata: VolumeMetadata,
}

impl NrrdHeader {
    pub fn element_count(&self) -> Option<usize> {
        self.sizes
            .iter()
            .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
    }

    pub fn payload_bytes(&self) -> Option<usize> {
        self.element_count()?
            .checked_mul(self.scalar_type.size_bytes())
    }
}

#[derive(Default)]
struct PartialHeader {
    scalar_type: Option<ScalarType>,
    dimension: Option<usize>,
    sizes: Option<Vec<usize>>,
    encoding: Option<Encoding>,
    endian: Option<Endian>,
    line_skip: usize,
    byte_skip: Option<ByteSkip>,
    data_file: Option<PathBuf>,
    metadata: VolumeMetadata,
}

/// Reads header lines up to (and including) the blank separator line.
///
/// The reader is left positioned at the first payload byte of an attached
/// payload.
pub fn parse_header<R: BufRead>(reader: &mut R) -> VolumeResult<NrrdHeader> {
    let mut line_no = 1usize;
    let magic = read_line(reader, line_no)?
        .ok_or_else(|| VolumeError::header(line_no, "empty file"))?;
    let version = parse_magic(&magic)?;

    let mut partial = PartialHeader::default();
    loop {
        line_no += 1;
        let Some(line) = read_line(reader, line_no)? else {
            break;
        };
        if line.is_empty() {
            break;
        }
        if line.starts_with('#') {
            continue;
        }
        apply_line(&mut partial, &line, line_no)?;
    }

    finish(partial, version, line_no)
}

fn read_line<R: BufRead>(reader: &mut R, line_no: usize) -> VolumeResult<Option<String>> {
    let mut buf = Vec::new();
    let read = reader
        .read_until(b'\n', &mut buf)
        .map_err(|source| VolumeError::io("<header>", source))?;
    if read == 0 {
        return Ok(None);
    }
    while matches!(buf.last(), Some(b'\n' | b'\r')) {
        buf.pop();
    }
    String::from_utf8(buf)
        .map(Some)
        .map_err(|_| VolumeError::header(line_no, "header line is not valid UTF-8"))
}

fn parse_magic(line: &str) -> VolumeResult<u8> {
    let digit = line
        .trim()
        .strip_prefix(MAGIC_PREFIX)
        .filter(|rest| rest.len() == 1)
        .and_then(|rest| rest.parse::<u8>().ok())
        .filter(|version| (1..=5).contains(version));
    digit.ok_or_else(|| VolumeError::header(1, format!("bad magic '{}'", line.trim())))
}

fn apply_line(partial: &mut PartialHeader, line: &str, line_no: usize) -> VolumeResult<()> {
    let kv_index = line.find(":=");
    let field_index = line.find(": ");
    match (kv_index, field_index) {
        (Some(kv), field) if field.is_none_or(|f| kv < f) => {
            let key = line[..kv].to_string();
            let value = line[kv + 2..].to_string();
            partial.metadata.key_values.insert(key, value);
            Ok(())
        }
        (_, Some(field)) => {
            let name = line[..field].trim().to_ascii_lowercase();
            let value = line[field + 2..].trim();
            apply_field(partial, &name, value, line_no)
        }
        _ => Err(VolumeError::header(
            line_no,
            format!("expected 'field: value', got '{line}'"),
        )),
    }
}

fn apply_field(
    partial: &mut PartialHeader,
    name: &str,
    value: &str,
    line_no: usize,
) -> VolumeResult<()> {
    match name {
        "type" => partial.scalar_type = Some(parse_scalar_type(value)?),
        "dimension" => partial.dimension = Some(parse_number(value, "dimension", line_no)?),
        "sizes" => {
            let sizes = value
                .split_whitespace()
                .map(|token| parse_number::<usize>(token, "sizes", line_no))
                .collect::<VolumeResult<Vec<_>>>()?;
            partial.sizes = Some(sizes);
        }
        "encoding" => partial.encoding = Some(value.parse()?),
        "endian" => {
            partial.endian = Some(match value.to_ascii_lowercase().as_str() {
                "little" => Endian::Little,
                "big" => Endian::Big,
                other => {
                    return Err(VolumeError::header(
                        line_no,
                        format!("unknown endian '{other}'"),
                    ));
                }
            })
        }
        "line skip" | "lineskip" => {
            partial.line_skip = parse_number(value, "line skip", line_no)?;
        }
        "byte skip" | "byteskip" => {
            let skip: i64 = parse_number(value, "byte skip", line_no)?;
            partial.byte_skip = Some(match skip {
                -1 => ByteSkip::FromEnd,
                n if n >= 0 => ByteSkip::Bytes(n as u64),
                n => {
                    return Err(VolumeError::header(
                        line_no,
                        format!("byte skip must be -1 or non-negative, got {n}"),
                    ));
                }
            });
        }
        "data file" | "datafile" => partial.data_file = Some(parse_data_file(value, line_no)?),
        "space" => partial.metadata.space = Some(value.to_string()),
        "space dimension" => {
            partial.metadata.space_dimension =
                Some(parse_number(value, "space dimension", line_no)?);
        }
        "space directions" => {
            partial.metadata.space_directions = Some(parse_vector_list(value, line_no)?);
        }
        "space origin" => {
            let origin = parse_vector_list(value, line_no)?
                .into_iter()
                .next()
                .flatten()
                .ok_or_else(|| VolumeError::header(line_no, "space origin must be a vector"))?;
            partial.metadata.space_origin = Some(origin);
        }
        "spacings" => {
            let spacings = value
                .split_whitespace()
                .map(|token| parse_float(token, line_no))
                .collect::<VolumeResult<Vec<_>>>()?;
            partial.metadata.spacings = Some(spacings);
        }
        "kinds" => {
            partial.metadata.kinds =
                Some(value.split_whitespace().map(str::to_string).collect());
        }
        // Remaining NRRD fields (content, units, labels, min, max, ...) are
        // informational only.
        _ => {}
    }
    Ok(())
}

fn finish(partial: PartialHeader, version: u8, line_no: usize) -> VolumeResult<NrrdHeader> {
    let scalar_type = partial
        .scalar_type
        .ok_or_else(|| VolumeError::header(line_no, "missing required field 'type'"))?;
    let dimension = partial
        .dimension
        .ok_or_else(|| VolumeError::header(line_no, "missing required field 'dimension'"))?;
    let sizes = partial
        .sizes
        .ok_or_else(|| VolumeError::header(line_no, "missing required field 'sizes'"))?;
    let encoding = partial
        .encoding
        .ok_or_else(|| VolumeError::header(line_no, "missing required field 'encoding'"))?;

    if sizes.len() != dimension {
        return Err(VolumeError::header(
            line_no,
            format!(
                "dimension is {dimension} but sizes lists {} axes",
                sizes.len()
            ),
        ));
    }
    if encoding.is_binary() && scalar_type.size_bytes() > 1 && partial.endian.is_none() {
        return Err(VolumeError::header(
            line_no,
            format!(
                "missing required field 'endian' for {} {}",
                encoding.as_str(),
                scalar_type
            ),
        ));
    }
    let byte_skip = partial.byte_skip.unwrap_or(ByteSkip::Bytes(0));
    if byte_skip == ByteSkip::FromEnd && encoding != Encoding::Raw {
        return Err(VolumeError::header(
            line_no,
            "byte skip -1 is only valid for raw encoding",
        ));
    }

    Ok(NrrdHeader {
        version,
        scalar_type,
        sizes,
        encoding,
        endian: partial.endian,
        line_skip: partial.line_skip,
        byte_skip,
        data_file: partial.data_file,
        metadata: partial.metadata,
    })
}

pub(crate) fn parse_scalar_type(value: &str) -> VolumeResult<ScalarType> {
    let normalized = value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase();
    let scalar = match normalized.as_str() {
        "signed char" | "int8" | "int8_t" => ScalarType::Int8,
        "uchar" | "unsigned char" | "uint8" | "uint8_t" => ScalarType::UInt8,
        "short" | "short int" | "signed short" | "signed short int" | "int16" | "int16_t" => {
            ScalarType::Int16
        }
        "ushort" | "unsigned short" | "unsigned short int" | "uint16" | "uint16_t" => {
            ScalarType::UInt16
        }
        "int" | "signed int" | "int32" | "int32_t" => ScalarType::Int32,
        "uint" | "unsigned int" | "uint32" | "uint32_t" => ScalarType::UInt32,
        "longlong" | "long long" | "long long int" | "signed long long"
        | "signed long long int" | "int64" | "int64_t" => ScalarType::Int64,
        "ulonglong" | "unsigned long long" | "unsigned long long int" | "uint64"
        | "uint64_t" => ScalarType::UInt64,
        "float" => ScalarType::Float,
        "double" => ScalarType::Double,
        _ => {
            return Err(VolumeError::UnsupportedType { name: normalized });
        }
    };
    Ok(scalar)
}

fn parse_number<T: FromStr>(value: &str, field: &str, line_no: usize) -> VolumeResult<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| VolumeError::header(line_no, format!("invalid {field} '{value}'")))
}

fn parse_float(token: &str, line_no: usize) -> VolumeResult<f64> {
    match token.to_ascii_lowercase().as_str() {
        "nan" => Ok(f64::NAN),
        _ => parse_number(token, "number", line_no),
    }
}

/// A single detached file. The name may contain spaces; `LIST` and the
/// `<format> <min> <max> <step> [<subdim>]` pattern form are rejected.
fn parse_data_file(value: &str, line_no: usize) -> VolumeResult<PathBuf> {
    let value = value.trim();
    let tokens: Vec<&str> = value.split_whitespace().collect();
    let Some(first) = tokens.first() else {
        return Err(VolumeError::header(line_no, "empty data file"));
    };
    let numeric_tail = tokens.len() >= 4
        && tokens.len() <= 5
        && tokens[1..].iter().all(|token| token.parse::<i64>().is_ok());
    if first.eq_ignore_ascii_case("list") || numeric_tail {
        return Err(VolumeError::header(
            line_no,
            "multi-file data (LIST or format patterns) is not supported",
        ));
    }
    Ok(PathBuf::from(value))
}

/// Parses `(1,0,0) (0,1,0) none` style lists.
fn parse_vector_list(value: &str, line_no: usize) -> VolumeResult<Vec<Option<Vec<f64>>>> {
    let mut vectors = Vec::new();
    let mut rest = value.trim();
    while !rest.is_empty() {
        if let Some(inner) = rest.strip_prefix('(') {
            let close = inner
                .find(')')
                .ok_or_else(|| VolumeError::header(line_no, "unterminated vector"))?;
            let components = inner[..close]
                .split(',')
                .map(|token| parse_float(token.trim(), line_no))
                .collect::<VolumeResult<Vec<_>>>()?;
            vectors.push(Some(components));
            rest = inner[close + 1..].trim_start();
        } else {
            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            let word = &rest[..end];
            if !word.eq_ignore_ascii_case("none") {
                return Err(VolumeError::header(
                    line_no,
                    format!("expected vector or 'none', got '{word}'"),
                ));
            }
            vectors.push(None);
            rest = rest[end..].trim_start();
        }
    }
    Ok(vectors)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn parse(text: &str) -> VolumeResult<NrrdHeader> {
        parse_header(&mut Cursor::new(text.as_bytes().to_vec()))
    }

    #[test]
    fn parses_spatial_metadata_and_key_values() {
        let header = parse(
            "NRRD0004\n\
             # comment\n\
             type: unsigned short\n\
             dimension: 3\n\
             space: left-posterior-superior\n\
             sizes: 4 5 6\n\
             space directions: (0.5,0,0) (0, 0.5, 0) (0,0,1.25)\n\
             kinds: domain domain domain\n\
             endian: big\n\
             encoding: gzip\n\
             space origin: (-10,-20.5,3)\n\
             modality:=MR\n\
             \n",
        )
        .unwrap();
        assert_eq!(header.version, 4);
        assert_eq!(header.scalar_type, ScalarType::UInt16);
        assert_eq!(header.sizes, vec![4, 5, 6]);
        assert_eq!(header.encoding, Encoding::Gzip);
        assert_eq!(header.endian, Some(Endian::Big));
        assert_eq!(header.payload_bytes(), Some(240));
        let directions = header.metadata.space_directions.unwrap();
        assert_eq!(directions[1], Some(vec![0.0, 0.5, 0.0]));
        assert_eq!(header.metadata.space_origin, Some(vec![-10.0, -20.5, 3.0]));
        assert_eq!(
            header.metadata.key_values.get("modality").map(String::as_str),
            Some("MR")
        );
    }

    #[test]
    fn none_marks_non_spatial_axis() {
        let list = parse_vector_list("none (1,0) (0,1)", 1).unwrap();
        assert_eq!(list.len(), 3);
        assert!(list[0].is_none());
    }

    #[test]
    fn rejects_bad_magic() {
        let err = parse("NRRX0004\n").unwrap_err();
        assert!(matches!(err, VolumeError::Header { line: 1, .. }));
    }

    #[test]
    fn requires_endian_for_wide_binary_types() {
        let err = parse("NRRD0004\ntype: float\ndimension: 1\nsizes: 3\nencoding: raw\n\n")
            .unwrap_err();
        assert!(err.to_string().contains("endian"));
    }

    #[test]
    fn ascii_does_not_need_endian() {
        let header =
            parse("NRRD0005\ntype: double\ndimension: 1\nsizes: 3\nencoding: text\n\n").unwrap();
        assert_eq!(header.encoding, Encoding::Ascii);
        assert!(header.endian.is_none());
    }

    #[test]
    fn dimension_must_match_sizes() {
        let err = parse("NRRD0004\ntype: uchar\ndimension: 3\nsizes: 3 3\nencoding: raw\n\n")
            .unwrap_err();
        assert!(err.to_string().contains("dimension"));
    }

    #[test]
    fn rejects_unsupported_encoding_and_type() {
        let err = parse("NRRD0004\ntype: uchar\ndimension: 1\nsizes: 3\nencoding: bzip2\n\n")
            .unwrap_err();
        assert!(matches!(err, VolumeError::UnsupportedEncoding { .. }));
        let err = parse("NRRD0004\ntype: block\n").unwrap_err();
        assert!(matches!(err, VolumeError::UnsupportedType { .. }));
    }

    #[test]
    fn data_file_names_may_contain_spaces() {
        let header = parse(
            "NRRD0004\ntype: uchar\ndimension: 1\nsizes: 3\nencoding: raw\ndata file: scan 01 final.raw\n\n",
        )
        .unwrap();
        assert_eq!(header.data_file, Some(PathBuf::from("scan 01 final.raw")));
    }

    #[test]
    fn rejects_data_file_patterns() {
        let err = parse(
            "NRRD0004\ntype: uchar\ndimension: 2\nsizes: 3 2\nencoding: raw\ndata file: slice%03d.raw 1 2 1\n\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("format patterns"));
    }

    #[test]
    fn rejects_list_data_files() {
        let err = parse(
            "NRRD0004\ntype: uchar\ndimension: 1\nsizes: 3\nencoding: raw\ndata file: LIST\n\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("LIST"));
    }
}
