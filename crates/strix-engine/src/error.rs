use std::path::PathBuf;

use thiserror::Error;

use crate::heap::HeapClass;

/// Failure reported by a [`GpuDevice`](crate::device::GpuDevice) call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeviceError {
    #[error("device out of memory ({requested} bytes requested)")]
    OutOfMemory { requested: u64 },

    #[error("unknown {0} handle")]
    UnknownHandle(&'static str),

    #[error("access out of bounds: {offset} + {len} exceeds {size} bytes")]
    OutOfBounds { offset: u64, len: u64, size: u64 },

    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Engine error taxonomy.
///
/// Only [`OutOfFrameMemory`](RenderError::OutOfFrameMemory) and
/// [`OutdatedSwapchain`](RenderError::OutdatedSwapchain) are expected at
/// runtime; the frame loop drops the frame and carries on. Everything else
/// fails the operation that raised it.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("{heap:?} frame heap cannot serve {requested} bytes")]
    OutOfFrameMemory {
        heap: HeapClass,
        requested: u64,
        #[source]
        source: Option<DeviceError>,
    },

    #[error("device allocation of {requested} bytes failed")]
    OutOfDeviceMemory {
        requested: u64,
        #[source]
        source: DeviceError,
    },

    #[error("file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("swapchain is outdated")]
    OutdatedSwapchain,

    #[error("failed to decode {}: {message}", path.display())]
    Decode { path: PathBuf, message: String },

    #[error(transparent)]
    Device(#[from] DeviceError),
}

impl RenderError {
    /// True when the frame should be skipped and the next one attempted.
    pub fn is_frame_recoverable(&self) -> bool {
        matches!(
            self,
            RenderError::OutOfFrameMemory { .. } | RenderError::OutdatedSwapchain
        )
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        RenderError::InvalidValue(message.into())
    }

    /// Maps a failed resource allocation: exhaustion becomes
    /// `OutOfDeviceMemory`, anything else stays a device error.
    pub(crate) fn from_allocation(requested: u64, err: DeviceError) -> Self {
        match err {
            DeviceError::OutOfMemory { .. } => RenderError::OutOfDeviceMemory {
                requested,
                source: err,
            },
            other => RenderError::Device(other),
        }
    }
}

pub type Result<T, E = RenderError> = std::result::Result<T, E>;
