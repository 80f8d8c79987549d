//! Instance extension negotiation
//!
//! Callers request optional instance capabilities as a list of
//! [`InstanceExtension`] values. [`negotiate`] checks every request against
//! what the active driver build supports and folds the accepted ones into
//! layer names, extension names and a chain of optional creation structures.
//! Negotiation is all-or-nothing: the first rejected request aborts it.
//!
//! Chain links are always added at the front, so the final chain lists them
//! in reverse order of application. Some drivers are sensitive to chain
//! order; this order is part of the contract.

use ash::vk;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::driver::Driver;
use crate::error::{Error, Result};

/// Khronos validation layer
pub const VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";
/// Instance extension enabling fine-grained validation features
pub const VALIDATION_FEATURES_EXTENSION: &str = "VK_EXT_validation_features";
/// Instance extension used to route validation messages to a sink
pub const DEBUG_UTILS_EXTENSION: &str = "VK_EXT_debug_utils";

/// Optional instance capability request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceExtension {
    /// Validate API calls, their parameters and context
    ApiValidation {
        /// Whether the capability is turned on
        enable: bool,
    },
    /// Validate shader operations such as buffer reads and writes
    GpuValidation {
        /// Whether the capability is turned on
        enable: bool,
    },
}

impl InstanceExtension {
    /// Build an enabled request of the given kind
    pub fn enabled(kind: InstanceExtensionKind) -> Self {
        match kind {
            InstanceExtensionKind::ApiValidation => Self::ApiValidation { enable: true },
            InstanceExtensionKind::GpuValidation => Self::GpuValidation { enable: true },
        }
    }

    /// Kind tag of this request
    pub fn kind(&self) -> InstanceExtensionKind {
        match self {
            Self::ApiValidation { .. } => InstanceExtensionKind::ApiValidation,
            Self::GpuValidation { .. } => InstanceExtensionKind::GpuValidation,
        }
    }

    /// Whether the request turns the capability on
    pub fn is_enabled(&self) -> bool {
        match *self {
            Self::ApiValidation { enable } | Self::GpuValidation { enable } => enable,
        }
    }
}

/// Kind tag of an instance extension, used for support queries and configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InstanceExtensionKind {
    /// See [`InstanceExtension::ApiValidation`]
    ApiValidation,
    /// See [`InstanceExtension::GpuValidation`]
    GpuValidation,
}

impl fmt::Display for InstanceExtensionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApiValidation => write!(f, "api_validation"),
            Self::GpuValidation => write!(f, "gpu_validation"),
        }
    }
}

impl FromStr for InstanceExtensionKind {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "api_validation" => Ok(Self::ApiValidation),
            "gpu_validation" => Ok(Self::GpuValidation),
            other => Err(Error::ExtensionNotSupported(other.to_string())),
        }
    }
}

/// Optional structure chained onto the native instance creation info
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainLink {
    /// Validation features to enable
    ValidationFeatures(Vec<vk::ValidationFeatureEnableEXT>),
    /// Messenger capturing messages emitted during instance creation
    DebugMessenger,
}

/// Layers and extensions the active driver build exposes
#[derive(Debug, Clone, Default)]
pub struct DriverSupport {
    layers: HashSet<String>,
    extensions: HashSet<String>,
}

impl DriverSupport {
    /// Support set from explicit layer and extension names
    pub fn new<L, E>(layers: L, extensions: E) -> Self
    where
        L: IntoIterator<Item = String>,
        E: IntoIterator<Item = String>,
    {
        Self {
            layers: layers.into_iter().collect(),
            extensions: extensions.into_iter().collect(),
        }
    }

    /// Query the driver for its instance layers and extensions
    pub fn query(driver: &dyn Driver) -> Result<Self> {
        Ok(Self::new(driver.instance_layers()?, driver.instance_extensions()?))
    }

    /// Whether the named layer is available
    pub fn has_layer(&self, name: &str) -> bool {
        self.layers.contains(name)
    }

    /// Whether the named instance extension is available
    pub fn has_extension(&self, name: &str) -> bool {
        self.extensions.contains(name)
    }

    /// Whether an extension kind can be enabled on this driver
    pub fn supports(&self, kind: InstanceExtensionKind) -> bool {
        match kind {
            InstanceExtensionKind::ApiValidation => self.has_layer(VALIDATION_LAYER),
            InstanceExtensionKind::GpuValidation => {
                self.has_layer(VALIDATION_LAYER)
                    && self.has_extension(VALIDATION_FEATURES_EXTENSION)
            }
        }
    }
}

/// Query whether an instance extension kind is available on the driver.
///
/// Driver query failures are reported as unsupported.
pub fn query_instance_extension_support(driver: &dyn Driver, kind: InstanceExtensionKind) -> bool {
    DriverSupport::query(driver).is_ok_and(|support| support.supports(kind))
}

/// Native creation data assembled from accepted extensions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NegotiatedExtensions {
    /// Layer names, in first-request order
    pub layers: Vec<&'static str>,
    /// Instance extension names, in first-request order
    pub extensions: Vec<&'static str>,
    /// Chained structures, head first
    pub chain: Vec<ChainLink>,
}

impl NegotiatedExtensions {
    fn push_layer(&mut self, name: &'static str) {
        if !self.layers.contains(&name) {
            self.layers.push(name);
        }
    }

    fn push_extension(&mut self, name: &'static str) {
        if !self.extensions.contains(&name) {
            self.extensions.push(name);
        }
    }

    fn link_front(&mut self, link: ChainLink) {
        self.chain.insert(0, link);
    }

    /// Whether a chain link is present
    pub fn has_link(&self, link: &ChainLink) -> bool {
        self.chain.contains(link)
    }
}

/// Negotiate the requested extensions against the driver support set.
///
/// `route_messages` asks for a debug messenger link when the driver can
/// provide one; it is linked after every extension so it heads the chain.
/// Never calls into the driver.
pub fn negotiate(
    requested: &[InstanceExtension],
    support: &DriverSupport,
    route_messages: bool,
) -> Result<NegotiatedExtensions> {
    let mut negotiated = NegotiatedExtensions::default();
    let mut seen = HashSet::new();

    for extension in requested {
        let kind = extension.kind();
        if !seen.insert(kind) {
            return Err(Error::InvalidUsage(format!(
                "instance extension {kind} requested more than once"
            )));
        }

        if !extension.is_enabled() {
            continue;
        }

        if !support.supports(kind) {
            return Err(Error::ExtensionNotSupported(kind.to_string()));
        }

        match extension {
            InstanceExtension::ApiValidation { .. } => {
                negotiated.push_layer(VALIDATION_LAYER);
            }
            InstanceExtension::GpuValidation { .. } => {
                negotiated.push_layer(VALIDATION_LAYER);
                negotiated.push_extension(VALIDATION_FEATURES_EXTENSION);
                negotiated.link_front(ChainLink::ValidationFeatures(vec![
                    vk::ValidationFeatureEnableEXT::GPU_ASSISTED,
                    vk::ValidationFeatureEnableEXT::GPU_ASSISTED_RESERVE_BINDING_SLOT,
                ]));
            }
        }
    }

    if route_messages {
        if support.has_extension(DEBUG_UTILS_EXTENSION) {
            negotiated.push_extension(DEBUG_UTILS_EXTENSION);
            negotiated.link_front(ChainLink::DebugMessenger);
        } else {
            log::warn!(
                "{DEBUG_UTILS_EXTENSION} unavailable, validation messages will not be forwarded"
            );
        }
    }

    Ok(negotiated)
}
