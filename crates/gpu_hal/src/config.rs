//! Configuration system
//!
//! Instance and device settings can be kept in TOML or RON files and turned
//! into live objects. Names in files are the lowercase forms used by the
//! `FromStr` implementations of the corresponding types.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::adapter::{AdapterExtension, AdapterFeatures, AdapterType, QueueDesc};
use crate::device::{Device, DeviceDesc};
use crate::driver::Driver;
use crate::error::Error;
use crate::extensions::{InstanceExtension, InstanceExtensionKind};
use crate::instance::{Instance, InstanceDesc};
use crate::messages::LogSink;

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from a `.toml` or `.ron` file
    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        match format_of(path)? {
            Format::Toml => {
                toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
            }
            Format::Ron => ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
        }
    }

    /// Save configuration to a `.toml` or `.ron` file
    fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = match format_of(path)? {
            Format::Toml => {
                toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
            }
            Format::Ron => ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?,
        };

        std::fs::write(path, contents)?;
        Ok(())
    }
}

enum Format {
    Toml,
    Ron,
}

fn format_of(path: &Path) -> Result<Format, ConfigError> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => Ok(Format::Toml),
        Some("ron") => Ok(Format::Ron),
        _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Settings rejected by the abstraction layer
    #[error("Invalid configuration: {0}")]
    Invalid(#[from] Error),
}

/// Instance settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    /// Application name for instance creation
    pub application_name: String,
    /// Application version (major, minor, patch)
    pub application_version: (u32, u32, u32),
    /// Enabled instance extensions, e.g. `api_validation`
    pub extensions: Vec<String>,
    /// Forward validation messages to the `log` facade
    pub log_messages: bool,
}

impl InstanceConfig {
    /// Create an instance configuration
    pub fn new(application_name: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
            ..Self::default()
        }
    }

    /// Set application version
    pub fn with_version(mut self, major: u32, minor: u32, patch: u32) -> Self {
        self.application_version = (major, minor, patch);
        self
    }

    /// Enable an instance extension
    pub fn with_extension(mut self, kind: InstanceExtensionKind) -> Self {
        self.extensions.push(kind.to_string());
        self
    }

    /// Forward validation messages to the `log` facade
    pub fn with_log_messages(mut self, enable: bool) -> Self {
        self.log_messages = enable;
        self
    }

    /// Parse the extension names
    pub fn extensions(&self) -> Result<Vec<InstanceExtension>, Error> {
        self.extensions
            .iter()
            .map(|name| name.parse().map(InstanceExtension::enabled))
            .collect()
    }

    /// Create an instance with these settings
    pub fn create_instance(&self, driver: &dyn Driver) -> Result<Instance, Error> {
        let extensions = self.extensions()?;
        let (major, minor, patch) = self.application_version;

        let mut desc = InstanceDesc::new(&self.application_name)
            .with_version(major, minor, patch)
            .with_extensions(&extensions);
        if self.log_messages {
            desc = desc.with_message_sink(Arc::new(LogSink));
        }

        Instance::new(driver, &desc)
    }
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            application_name: "gpu_hal application".to_string(),
            application_version: (0, 1, 0),
            extensions: Vec::new(),
            log_messages: cfg!(debug_assertions),
        }
    }
}

/// Device settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Adapter type picked when several adapters are present
    pub preferred_adapter_type: AdapterType,
    /// Queues to acquire; empty means a single default queue
    pub queues: Vec<QueueDesc>,
    /// Required features, e.g. `sampler_anisotropy`
    pub features: Vec<String>,
    /// Required adapter extensions, e.g. `swapchain`
    pub extensions: Vec<String>,
}

impl DeviceConfig {
    /// Set the preferred adapter type
    pub fn with_preferred_adapter_type(mut self, adapter_type: AdapterType) -> Self {
        self.preferred_adapter_type = adapter_type;
        self
    }

    /// Request a queue
    pub fn with_queue(mut self, queue: QueueDesc) -> Self {
        self.queues.push(queue);
        self
    }

    /// Require a feature by name
    pub fn with_feature(mut self, name: impl Into<String>) -> Self {
        self.features.push(name.into());
        self
    }

    /// Require an adapter extension
    pub fn with_extension(mut self, extension: AdapterExtension) -> Self {
        self.extensions.push(extension.to_string());
        self
    }

    /// Parse the feature names
    pub fn features(&self) -> Result<AdapterFeatures, Error> {
        self.features.iter().try_fold(AdapterFeatures::empty(), |features, name| {
            AdapterFeatures::from_name(&name.to_ascii_uppercase())
                .map(|feature| features | feature)
                .ok_or_else(|| Error::FeatureNotSupported(name.clone()))
        })
    }

    /// Parse the extension names
    pub fn extensions(&self) -> Result<Vec<AdapterExtension>, Error> {
        self.extensions.iter().map(|name| name.parse()).collect()
    }

    /// Enumerate adapters, pick one and create a device on it
    pub fn create_device(&self, instance: &mut Instance) -> Result<Device, Error> {
        let features = self.features()?;
        let extensions = self.extensions()?;

        let adapters = instance.enumerate_adapters()?;
        let adapter = instance
            .select_adapter(&adapters, self.preferred_adapter_type)
            .ok_or(Error::InitializationFailed)?;

        let desc = DeviceDesc::new(adapter)
            .with_features(features)
            .with_extensions(&extensions)
            .with_queues(&self.queues);

        instance.create_device(&desc)
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            preferred_adapter_type: AdapterType::Discrete,
            queues: Vec::new(),
            features: Vec::new(),
            extensions: Vec::new(),
        }
    }
}

/// Complete configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HalConfig {
    /// Instance settings
    pub instance: InstanceConfig,
    /// Device settings
    pub device: DeviceConfig,
}

impl HalConfig {
    /// Check every name without touching a driver
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instance.application_name.is_empty() {
            return Err(Error::InvalidUsage("application name is empty".to_string()).into());
        }

        self.instance.extensions()?;
        self.device.features()?;
        self.device.extensions()?;
        Ok(())
    }
}

impl Config for HalConfig {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{QueuePriority, QueueType};
    use crate::driver::mock::{MockDriver, MockGpu};

    fn sample() -> HalConfig {
        HalConfig {
            instance: InstanceConfig::new("config tests")
                .with_version(1, 2, 3)
                .with_extension(InstanceExtensionKind::ApiValidation),
            device: DeviceConfig::default()
                .with_preferred_adapter_type(AdapterType::Integrated)
                .with_queue(QueueDesc::new(QueueType::Graphics, QueuePriority::High))
                .with_queue(QueueDesc::new(QueueType::Transfer, QueuePriority::Normal))
                .with_feature("sampler_anisotropy")
                .with_extension(AdapterExtension::Swapchain),
        }
    }

    #[test]
    fn test_default_config_validates() {
        assert!(HalConfig::default().validate().is_ok());
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_unknown_names_are_rejected() {
        let mut config = sample();
        config.instance.extensions.push("shader_printf".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid(Error::ExtensionNotSupported(_)))
        ));

        let config = HalConfig {
            device: DeviceConfig::default().with_feature("ray_tracing"),
            ..HalConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid(Error::FeatureNotSupported(name))) if name == "ray_tracing"
        ));
    }

    #[test]
    fn test_feature_names() {
        let config = DeviceConfig::default()
            .with_feature("geometry_shader")
            .with_feature("WIDE_LINES");

        assert_eq!(
            config.features().unwrap(),
            AdapterFeatures::GEOMETRY_SHADER | AdapterFeatures::WIDE_LINES
        );
    }

    #[test]
    fn test_toml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hal.toml");

        let config = sample();
        config.save_to_file(&path).unwrap();
        assert_eq!(HalConfig::load_from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_ron_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hal.ron");

        let config = sample();
        config.save_to_file(&path).unwrap();
        assert_eq!(HalConfig::load_from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(
            &path,
            r#"
[instance]
application_name = "partial"

[[device.queues]]
queue_type = "Compute"
"#,
        )
        .unwrap();

        let config = HalConfig::load_from_file(&path).unwrap();
        assert_eq!(config.instance.application_name, "partial");
        assert_eq!(config.instance.application_version, (0, 1, 0));
        assert_eq!(config.device.preferred_adapter_type, AdapterType::Discrete);
        assert_eq!(
            config.device.queues,
            vec![QueueDesc::new(QueueType::Compute, QueuePriority::Normal)]
        );
    }

    #[test]
    fn test_unsupported_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hal.json");

        assert!(matches!(
            sample().save_to_file(&path),
            Err(ConfigError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            HalConfig::load_from_file(dir.path().join("missing.toml")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.ron");
        std::fs::write(&path, "(instance: ").unwrap();

        assert!(matches!(
            HalConfig::load_from_file(&path),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_create_from_config() {
        let driver = MockDriver::new(vec![MockGpu::discrete(1), MockGpu::integrated(2)]);
        let config = HalConfig {
            instance: InstanceConfig::new("config tests").with_log_messages(false),
            device: sample().device,
        };

        let mut instance = config.instance.create_instance(&driver).unwrap();
        let device = config.device.create_device(&mut instance).unwrap();

        let adapter = instance.query_adapter_info(device.adapter()).unwrap();
        assert_eq!(adapter.adapter_type, AdapterType::Integrated);
        assert_eq!(device.queue_count(QueueType::Graphics), 1);
        assert_eq!(device.queue_count(QueueType::Transfer), 1);
        assert!(device.has_extension(AdapterExtension::Swapchain));
    }

    #[test]
    fn test_create_instance_rejects_unsupported_extension() {
        let driver = MockDriver::new(vec![]);
        let config = InstanceConfig::new("config tests")
            .with_extension(InstanceExtensionKind::GpuValidation);

        assert!(matches!(
            config.create_instance(&driver),
            Err(Error::ExtensionNotSupported(_))
        ));
        assert_eq!(driver.state().instance_calls, 0);
    }

    #[test]
    fn test_unknown_extension_alongside_supported_one() {
        let driver = MockDriver::new(vec![]).with_validation();
        let config = InstanceConfig {
            extensions: vec!["api_validation".to_string(), "bogus".to_string()],
            ..InstanceConfig::new("config tests")
        };

        assert!(matches!(
            config.create_instance(&driver),
            Err(Error::ExtensionNotSupported(name)) if name == "bogus"
        ));
        assert_eq!(driver.state().instance_calls, 0);
        assert_eq!(driver.state().live_instances, 0);
    }
}
