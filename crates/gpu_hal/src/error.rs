//! Unified result taxonomy
//!
//! Every fallible operation in the crate returns [`Result`]. Native driver
//! status codes are folded into [`Error`] by [`map_vk_result`], which is total:
//! any status without a dedicated variant is passed through as
//! [`Error::Native`] instead of being dropped.

use ash::vk;
use thiserror::Error;

/// Errors surfaced by instance, adapter and device operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The caller violated an API contract (missing adapter, bad queue request, ...)
    #[error("Invalid usage: {0}")]
    InvalidUsage(String),

    /// A requested extension is unknown or not supported by the active driver
    #[error("Extension not supported: {0}")]
    ExtensionNotSupported(String),

    /// A requested adapter feature is not supported
    #[error("Feature not supported: {0}")]
    FeatureNotSupported(String),

    /// The logical device or the adapter it was created from is gone
    #[error("Device lost")]
    DeviceLost,

    /// The adapter disappeared from the last enumeration
    #[error("Device removed")]
    DeviceRemoved,

    /// The driver reported a timeout
    #[error("Timeout")]
    Timeout,

    /// The driver reported that the operation has not completed yet
    #[error("Not ready")]
    NotReady,

    /// The driver returned fewer results than were available
    #[error("Incomplete result")]
    Incomplete,

    /// Host memory allocation failed inside the driver
    #[error("Out of host memory")]
    OutOfHostMemory,

    /// Device memory allocation failed inside the driver
    #[error("Out of device memory")]
    OutOfDeviceMemory,

    /// Native object initialisation failed for implementation-specific reasons
    #[error("Initialization failed")]
    InitializationFailed,

    /// The installed driver does not support the requested API version
    #[error("Incompatible driver")]
    IncompatibleDriver,

    /// Too many native objects of a type have been created
    #[error("Too many objects")]
    TooManyObjects,

    /// The native driver library could not be loaded
    #[error("Failed to load native driver: {0}")]
    Loader(String),

    /// Native failure status without a dedicated variant
    #[error("Native driver error: {0:?}")]
    Native(vk::Result),
}

impl Error {
    /// Whether the caller has to re-enumerate adapters before trying again
    pub fn requires_reenumeration(&self) -> bool {
        matches!(self, Self::DeviceLost | Self::DeviceRemoved)
    }
}

/// Only failure statuses convert; `SUCCESS` is a caller bug.
impl From<vk::Result> for Error {
    fn from(result: vk::Result) -> Self {
        debug_assert_ne!(result, vk::Result::SUCCESS, "converted a success status into an error");
        match map_vk_result(result) {
            Err(error) => error,
            Ok(()) => Self::Native(result),
        }
    }
}

/// Result type for HAL operations
pub type Result<T> = std::result::Result<T, Error>;

/// Map a native status code onto the unified taxonomy.
///
/// `SUCCESS` is the only status mapping to `Ok(())`. Positive non-success
/// statuses (timeout, not-ready, incomplete) are returned as errors so each
/// call site decides whether they are fatal.
pub fn map_vk_result(result: vk::Result) -> Result<()> {
    let error = match result {
        vk::Result::SUCCESS => return Ok(()),
        vk::Result::TIMEOUT => Error::Timeout,
        vk::Result::NOT_READY => Error::NotReady,
        vk::Result::INCOMPLETE => Error::Incomplete,
        vk::Result::ERROR_DEVICE_LOST => Error::DeviceLost,
        vk::Result::ERROR_OUT_OF_HOST_MEMORY => Error::OutOfHostMemory,
        vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => Error::OutOfDeviceMemory,
        vk::Result::ERROR_INITIALIZATION_FAILED => Error::InitializationFailed,
        vk::Result::ERROR_INCOMPATIBLE_DRIVER => Error::IncompatibleDriver,
        vk::Result::ERROR_TOO_MANY_OBJECTS => Error::TooManyObjects,
        vk::Result::ERROR_LAYER_NOT_PRESENT => {
            Error::ExtensionNotSupported("native layer not present".to_string())
        }
        vk::Result::ERROR_EXTENSION_NOT_PRESENT => {
            Error::ExtensionNotSupported("native extension not present".to_string())
        }
        vk::Result::ERROR_FEATURE_NOT_PRESENT => {
            Error::FeatureNotSupported("native feature not present".to_string())
        }
        other => Error::Native(other),
    };

    Err(error)
}
