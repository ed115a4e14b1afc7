// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the frame pipeline
//!
//! Configuration failures are returned synchronously, per-frame failures are
//! reported through [`SdkEvent::FrameProcessed`](crate::pipelines::SdkEvent)
//! and state-machine violations come back as [`SdkError::InvalidState`].

use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::backends::InputSourceKind;

/// Result type alias using SdkError
pub type SdkResult<T> = Result<T, SdkError>;

/// Stable numeric error codes exposed to observers and the CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(i32)]
pub enum ErrorCode {
    Unknown = 1000,
    LicenseInvalid = 1001,
    LicenseExpired = 1002,
    NetworkError = 1003,
    CameraPermissionDenied = 1004,
    CameraUnavailable = 1005,
    EffectLoadFailed = 1006,
    InitializationFailed = 1007,
    ResourceNotFound = 1008,
    InvalidParameter = 1009,
    MemoryError = 1010,
    FeatureNotEnabled = 403,
    SourceConflict = 2001,
    NonMonotonicTimestamp = 2002,
    EmptyRecording = 2003,
    InvalidStateForOperation = 2004,
    InvalidFrameFormat = 2005,
    AlreadyRecording = 2006,
    ProcessingFault = 2007,
}

impl ErrorCode {
    /// Numeric value of the code
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

/// Main error type
#[derive(Debug, Clone)]
pub enum SdkError {
    /// Licence key rejected by the validation service
    LicenseInvalid(String),
    /// Licence key valid but past its expiry date
    LicenseExpired(String),
    /// Validation or cloud service unreachable (includes timeouts)
    Network(String),
    /// Camera access denied by the platform
    CameraPermissionDenied,
    /// Camera missing or busy
    CameraUnavailable(String),
    /// Initialization could not complete
    InitializationFailed(String),
    /// File, filter or stage not found
    ResourceNotFound(String),
    /// Parameter rejected (unknown name, non-finite value)
    InvalidParameter(String),
    /// Allocation or cache budget failure
    Memory(String),
    /// Feature not covered by the current licence
    FeatureNotEnabled(String),
    /// Operation not allowed in the current state
    InvalidState {
        operation: &'static str,
        state: String,
    },
    /// Frame geometry or format errors
    Frame(FrameError),
    /// Effect file and filter chain errors
    Effect(EffectError),
    /// Input arbitration errors
    Source(SourceError),
    /// Recording sink errors
    Recording(RecordingError),
    /// Filesystem errors
    Io(String),
}

/// Frame buffer validation errors
#[derive(Debug, Clone)]
pub enum FrameError {
    /// Width or height is zero
    InvalidDimensions { width: u32, height: u32 },
    /// Row stride shorter than one row of pixels
    StrideTooSmall { stride: u32, minimum: u32 },
    /// Payload shorter than the geometry requires
    PayloadTooShort { length: usize, expected: usize },
    /// Pixel format unknown or not inferable
    UnrecognizedFormat(String),
}

/// Effect loading and filter processing errors
#[derive(Debug, Clone)]
pub enum EffectError {
    /// Effect file could not be read or parsed
    LoadFailed { path: String, reason: String },
    /// Effect pass kind is not known
    UnknownPassKind(String),
    /// Parameter bound to a pass that does not exist
    InvalidBinding { parameter: String, pass: u32 },
    /// Built-in filter name is not known
    UnknownBuiltIn(String),
    /// A pass could not process the frame
    PassFault { pass: String, reason: String },
    /// Processing was cancelled mid-frame
    Cancelled,
}

/// Input arbitration errors
#[derive(Debug, Clone)]
pub enum SourceError {
    /// Another source holds the active slot
    Conflict {
        active: InputSourceKind,
        requested: InputSourceKind,
    },
    /// No source of this kind has been registered
    NotRegistered(InputSourceKind),
    /// Source kind not allowed in the current processing mode
    ModeRejected {
        kind: InputSourceKind,
        mode: String,
    },
    /// Source failed to start or produce frames
    Failed(String),
}

/// Recording sink errors
#[derive(Debug, Clone)]
pub enum RecordingError {
    /// Recording already in progress
    AlreadyRecording,
    /// Sample timestamp not after the previous one
    NonMonotonicTimestamp { previous: Duration, received: Duration },
    /// Stopped without any video frame written
    EmptyRecording,
    /// Audio appended while audio is disabled
    AudioDisabled,
    /// Container write or finalisation failure
    Mux(String),
}

impl SdkError {
    /// Map the error to its stable numeric code
    pub fn code(&self) -> ErrorCode {
        match self {
            SdkError::LicenseInvalid(_) => ErrorCode::LicenseInvalid,
            SdkError::LicenseExpired(_) => ErrorCode::LicenseExpired,
            SdkError::Network(_) => ErrorCode::NetworkError,
            SdkError::CameraPermissionDenied => ErrorCode::CameraPermissionDenied,
            SdkError::CameraUnavailable(_) => ErrorCode::CameraUnavailable,
            SdkError::InitializationFailed(_) => ErrorCode::InitializationFailed,
            SdkError::ResourceNotFound(_) => ErrorCode::ResourceNotFound,
            SdkError::InvalidParameter(_) => ErrorCode::InvalidParameter,
            SdkError::Memory(_) => ErrorCode::MemoryError,
            SdkError::FeatureNotEnabled(_) => ErrorCode::FeatureNotEnabled,
            SdkError::InvalidState { .. } => ErrorCode::InvalidStateForOperation,
            SdkError::Frame(_) => ErrorCode::InvalidFrameFormat,
            SdkError::Effect(e) => match e {
                EffectError::LoadFailed { .. }
                | EffectError::UnknownPassKind(_)
                | EffectError::InvalidBinding { .. } => ErrorCode::EffectLoadFailed,
                EffectError::UnknownBuiltIn(_) => ErrorCode::InvalidParameter,
                EffectError::PassFault { .. } | EffectError::Cancelled => {
                    ErrorCode::ProcessingFault
                }
            },
            SdkError::Source(e) => match e {
                SourceError::Conflict { .. } => ErrorCode::SourceConflict,
                SourceError::NotRegistered(_) => ErrorCode::ResourceNotFound,
                SourceError::ModeRejected { .. } => ErrorCode::InvalidStateForOperation,
                SourceError::Failed(_) => ErrorCode::Unknown,
            },
            SdkError::Recording(e) => match e {
                RecordingError::AlreadyRecording => ErrorCode::AlreadyRecording,
                RecordingError::NonMonotonicTimestamp { .. } => ErrorCode::NonMonotonicTimestamp,
                RecordingError::EmptyRecording => ErrorCode::EmptyRecording,
                RecordingError::AudioDisabled => ErrorCode::InvalidStateForOperation,
                RecordingError::Mux(_) => ErrorCode::Unknown,
            },
            SdkError::Io(_) => ErrorCode::ResourceNotFound,
        }
    }

    /// Shorthand for an invalid-state error
    pub fn invalid_state(operation: &'static str, state: impl fmt::Debug) -> Self {
        SdkError::InvalidState {
            operation,
            state: format!("{:?}", state),
        }
    }
}

impl fmt::Display for SdkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SdkError::LicenseInvalid(msg) => write!(f, "License invalid: {}", msg),
            SdkError::LicenseExpired(msg) => write!(f, "License expired: {}", msg),
            SdkError::Network(msg) => write!(f, "Network error: {}", msg),
            SdkError::CameraPermissionDenied => write!(f, "Camera permission denied"),
            SdkError::CameraUnavailable(msg) => write!(f, "Camera unavailable: {}", msg),
            SdkError::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            SdkError::ResourceNotFound(msg) => write!(f, "Resource not found: {}", msg),
            SdkError::InvalidParameter(msg) => write!(f, "Invalid parameter: {}", msg),
            SdkError::Memory(msg) => write!(f, "Memory error: {}", msg),
            SdkError::FeatureNotEnabled(feature) => {
                write!(f, "Feature not enabled by license: {}", feature)
            }
            SdkError::InvalidState { operation, state } => {
                write!(f, "Cannot {} while in state {}", operation, state)
            }
            SdkError::Frame(e) => write!(f, "Invalid frame: {}", e),
            SdkError::Effect(e) => write!(f, "Effect error: {}", e),
            SdkError::Source(e) => write!(f, "Input source error: {}", e),
            SdkError::Recording(e) => write!(f, "Recording error: {}", e),
            SdkError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::InvalidDimensions { width, height } => {
                write!(f, "dimensions must be positive, got {}x{}", width, height)
            }
            FrameError::StrideTooSmall { stride, minimum } => {
                write!(f, "stride {} is smaller than row size {}", stride, minimum)
            }
            FrameError::PayloadTooShort { length, expected } => {
                write!(f, "payload has {} bytes, geometry needs {}", length, expected)
            }
            FrameError::UnrecognizedFormat(msg) => write!(f, "unrecognized format: {}", msg),
        }
    }
}

impl fmt::Display for EffectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EffectError::LoadFailed { path, reason } => {
                write!(f, "failed to load {}: {}", path, reason)
            }
            EffectError::UnknownPassKind(kind) => write!(f, "unknown pass kind '{}'", kind),
            EffectError::InvalidBinding { parameter, pass } => {
                write!(f, "parameter '{}' bound to missing pass {}", parameter, pass)
            }
            EffectError::UnknownBuiltIn(name) => write!(f, "unknown built-in filter '{}'", name),
            EffectError::PassFault { pass, reason } => {
                write!(f, "pass '{}' failed: {}", pass, reason)
            }
            EffectError::Cancelled => write!(f, "processing cancelled"),
        }
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Conflict { active, requested } => {
                write!(f, "{} requested while {} is active", requested, active)
            }
            SourceError::NotRegistered(kind) => write!(f, "no {} source registered", kind),
            SourceError::ModeRejected { kind, mode } => {
                write!(f, "{} source not allowed in {} mode", kind, mode)
            }
            SourceError::Failed(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for RecordingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordingError::AlreadyRecording => write!(f, "Recording already in progress"),
            RecordingError::NonMonotonicTimestamp { previous, received } => write!(
                f,
                "timestamp {:.3}s is not after previous {:.3}s",
                received.as_secs_f64(),
                previous.as_secs_f64()
            ),
            RecordingError::EmptyRecording => write!(f, "No frames were recorded"),
            RecordingError::AudioDisabled => write!(f, "Audio is disabled for this recording"),
            RecordingError::Mux(msg) => write!(f, "Container error: {}", msg),
        }
    }
}

impl std::error::Error for SdkError {}
impl std::error::Error for FrameError {}
impl std::error::Error for EffectError {}
impl std::error::Error for SourceError {}
impl std::error::Error for RecordingError {}

impl From<FrameError> for SdkError {
    fn from(err: FrameError) -> Self {
        SdkError::Frame(err)
    }
}

impl From<EffectError> for SdkError {
    fn from(err: EffectError) -> Self {
        SdkError::Effect(err)
    }
}

impl From<SourceError> for SdkError {
    fn from(err: SourceError) -> Self {
        SdkError::Source(err)
    }
}

impl From<RecordingError> for SdkError {
    fn from(err: RecordingError) -> Self {
        SdkError::Recording(err)
    }
}

impl From<std::io::Error> for SdkError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => SdkError::ResourceNotFound(err.to_string()),
            std::io::ErrorKind::OutOfMemory => SdkError::Memory(err.to_string()),
            _ => SdkError::Io(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for SdkError {
    fn from(err: serde_json::Error) -> Self {
        SdkError::InvalidParameter(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_codes_are_stable() {
        assert_eq!(ErrorCode::LicenseInvalid.as_i32(), 1001);
        assert_eq!(ErrorCode::MemoryError.as_i32(), 1010);
        assert_eq!(ErrorCode::FeatureNotEnabled.as_i32(), 403);
    }

    #[test]
    fn test_nested_errors_map_to_pipeline_codes() {
        let err: SdkError = RecordingError::EmptyRecording.into();
        assert_eq!(err.code(), ErrorCode::EmptyRecording);

        let err: SdkError = SourceError::Conflict {
            active: InputSourceKind::Camera,
            requested: InputSourceKind::ExternalData,
        }
        .into();
        assert_eq!(err.code(), ErrorCode::SourceConflict);
        assert!(err.to_string().contains("camera"));
    }

    #[test]
    fn test_io_not_found_maps_to_resource_not_found() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.fx.json");
        let err: SdkError = io.into();
        assert_eq!(err.code(), ErrorCode::ResourceNotFound);
    }
}
