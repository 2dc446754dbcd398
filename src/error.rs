use crate::device::Device;
use thiserror::Error as ThisError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors reported by the engine layer and the numerical kernels.
///
/// All failures are local and synchronous: they are returned at the point of
/// the offending call, and no operation retries or recovers internally.
#[derive(Debug, Clone, ThisError)]
pub enum Error {
    #[error("engine `{0}` is not registered")]
    UnknownEngine(String),

    #[error("`{0}` is not a canonical operation name")]
    UnknownOperation(String),

    #[error("operation `{op}` is not supported by engine `{engine}`")]
    UnsupportedOperation { engine: String, op: String },

    #[error("engine `{engine}` does not support device `{device}`")]
    UnsupportedDevice { engine: String, device: Device },

    #[error("`{0}` is not a recognized device specification")]
    InvalidDevice(String),

    #[error("vmap requires equal vectorization axes, got in_axis={in_axis}, out_axis={out_axis}")]
    VmapAxisMismatch { in_axis: usize, out_axis: usize },

    #[error("shape mismatch in `{op}`: expected {expected}, got {actual}")]
    ShapeMismatch {
        op: String,
        expected: String,
        actual: String,
    },

    #[error("axis {axis} is out of bounds in `{op}` for a tensor of rank {ndim}")]
    InvalidAxis { op: String, axis: usize, ndim: usize },

    #[error("invalid einsum specification `{spec}`: {reason}")]
    EinsumSpec { spec: String, reason: String },

    #[error("degenerate (zero measure) entity {entity} in `{op}`")]
    DegenerateGeometry { op: String, entity: usize },
}

impl Error {
    pub(crate) fn shape_mismatch(
        op: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Error::ShapeMismatch {
            op: op.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub(crate) fn unsupported_op(engine: impl Into<String>, op: impl Into<String>) -> Self {
        Error::UnsupportedOperation {
            engine: engine.into(),
            op: op.into(),
        }
    }
}
