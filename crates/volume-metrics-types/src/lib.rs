//! Shared domain models for the volume-metrics workspace.
//!
//! This crate centralizes the data structures passed between the NRRD loader,
//! the metric engine, and the batch CLI. Keep it free of I/O and heavy
//! dependencies so every crate can depend on it.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

pub type VolumeResult<T> = Result<T, VolumeError>;

/// Extent of every axis of a volume, fastest axis first.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Shape(Vec<usize>);

impl Shape {
    pub fn new(dims: Vec<usize>) -> Self {
        Self(dims)
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    pub fn ndim(&self) -> usize {
        self.0.len()
    }

    /// Number of elements, `None` when the product overflows.
    pub fn element_count(&self) -> Option<usize> {
        self.0
            .iter()
            .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
    }
}

impl From<Vec<usize>> for Shape {
    fn from(value: Vec<usize>) -> Self {
        Self(value)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("()");
        }
        let mut first = true;
        for dim in &self.0 {
            if !first {
                f.write_str("x")?;
            }
            write!(f, "{dim}")?;
            first = false;
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float,
    Double,
}

impl ScalarType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarType::Int8 => "int8",
            ScalarType::UInt8 => "uint8",
            ScalarType::Int16 => "int16",
            ScalarType::UInt16 => "uint16",
            ScalarType::Int32 => "int32",
            ScalarType::UInt32 => "uint32",
            ScalarType::Int64 => "int64",
            ScalarType::UInt64 => "uint64",
            ScalarType::Float => "float",
            ScalarType::Double => "double",
        }
    }

    pub fn size_bytes(&self) -> usize {
        match self {
            ScalarType::Int8 | ScalarType::UInt8 => 1,
            ScalarType::Int16 | ScalarType::UInt16 => 2,
            ScalarType::Int32 | ScalarType::UInt32 | ScalarType::Float => 4,
            ScalarType::Int64 | ScalarType::UInt64 | ScalarType::Double => 8,
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Spatial calibration and free-form annotations carried by a volume file.
///
/// Loaders fill this in for completeness; metric computation ignores it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VolumeMetadata {
    pub space: Option<String>,
    pub space_dimension: Option<usize>,
    /// One entry per axis; `None` marks a non-spatial axis.
    pub space_directions: Option<Vec<Option<Vec<f64>>>>,
    pub space_origin: Option<Vec<f64>>,
    pub spacings: Option<Vec<f64>>,
    pub kinds: Option<Vec<String>>,
    pub key_values: BTreeMap<String, String>,
}

#[derive(Clone)]
pub struct Volume {
    shape: Shape,
    scalar_type: ScalarType,
    data: Arc<[f64]>,
    metadata: VolumeMetadata,
}

impl fmt::Debug for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Volume")
            .field("shape", &self.shape)
            .field("scalar_type", &self.scalar_type)
            .field("elements", &self.data.len())
            .finish()
    }
}

impl Volume {
    pub fn from_owned(shape: Shape, scalar_type: ScalarType, data: Vec<f64>) -> VolumeResult<Self> {
        let expected = shape
            .element_count()
            .ok_or_else(|| VolumeError::InvalidVolume {
                reason: format!("element count of shape {shape} overflowed"),
            })?;
        if data.len() != expected {
            return Err(VolumeError::InvalidVolume {
                reason: format!(
                    "shape {shape} needs {expected} elements, got {}",
                    data.len()
                ),
            });
        }
        Ok(Self {
            shape,
            scalar_type,
            data: Arc::from(data.into_boxed_slice()),
            metadata: VolumeMetadata::default(),
        })
    }

    pub fn with_metadata(mut self, metadata: VolumeMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn scalar_type(&self) -> ScalarType {
        self.scalar_type
    }

    /// Flattened intensities in file order.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn metadata(&self) -> &VolumeMetadata {
        &self.metadata
    }
}

#[derive(Debug, Error)]
pub enum VolumeError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed header (line {line}): {message}")]
    Header { line: usize, message: String },

    #[error("unsupported scalar type '{name}'")]
    UnsupportedType { name: String },

    #[error("unsupported encoding '{name}'")]
    UnsupportedEncoding { name: String },

    #[error("payload holds {actual} bytes, expected {expected}")]
    PayloadLength { expected: usize, actual: usize },

    #[error("failed to decompress payload: {source}")]
    Decompress {
        #[source]
        source: std::io::Error,
    },

    #[error("invalid payload value: {reason}")]
    InvalidValue { reason: String },

    #[error("invalid volume: {reason}")]
    InvalidVolume { reason: String },
}

impl VolumeError {
    pub fn header(line: usize, message: impl Into<String>) -> Self {
        VolumeError::Header {
            line,
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        VolumeError::Io {
            path: path.into(),
            source,
        }
    }
}

/// The four similarity scores computed for one template/candidate pair.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MetricValues {
    pub nmi: f64,
    pub mse: f64,
    pub correlation: f64,
    pub ncc: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum MetricOutcome {
    Computed(MetricValues),
    /// Soft failure: the candidate cannot be compared voxel by voxel.
    ShapeMismatch { template: Shape, candidate: Shape },
}

impl MetricOutcome {
    pub fn values(&self) -> Option<&MetricValues> {
        match self {
            MetricOutcome::Computed(values) => Some(values),
            MetricOutcome::ShapeMismatch { .. } => None,
        }
    }

    pub fn error_message(&self) -> Option<String> {
        match self {
            MetricOutcome::Computed(_) => None,
            MetricOutcome::ShapeMismatch {
                template,
                candidate,
            } => Some(format!(
                "the images must have the same dimensions (template {template}, image {candidate})"
            )),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MetricResult {
    pub image: String,
    pub outcome: MetricOutcome,
}

impl MetricResult {
    pub fn new(image: impl Into<String>, outcome: MetricOutcome) -> Self {
        Self {
            image: image.into(),
            outcome,
        }
    }
}
