//! # gpu_hal
//!
//! A small hardware abstraction layer over the native GPU driver. It covers
//! instance creation, adapter enumeration with stable adapter identity, and
//! logical device creation with queue acquisition. Rendering stops at the
//! device and its queues.
//!
//! ## Features
//!
//! - **Stable adapters**: repeated enumeration returns the same handle for the
//!   same GPU; removed GPUs stay addressable and report their loss
//! - **Unified errors**: native status codes map onto a single [`Error`] type
//! - **Negotiated extensions**: optional validation capabilities are checked
//!   against the driver before anything is created
//! - **Configuration files**: instance and device settings in TOML or RON
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gpu_hal::prelude::*;
//!
//! fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//!     gpu_hal::logging::init();
//!
//!     let extensions = [InstanceExtension::ApiValidation { enable: true }];
//!     let mut instance = create_instance(
//!         &InstanceDesc::new("quick start").with_extensions(&extensions),
//!     )?;
//!
//!     let adapters = instance.enumerate_adapters()?;
//!     let adapter = instance
//!         .select_adapter(&adapters, AdapterType::Discrete)
//!         .ok_or("no adapter")?;
//!     println!("{:?}", instance.query_adapter_info(adapter)?);
//!
//!     let queues = [QueueDesc::new(QueueType::Graphics, QueuePriority::High)];
//!     let device = instance.create_device(&DeviceDesc::new(adapter).with_queues(&queues))?;
//!     let _graphics = device.queue(QueueType::Graphics, 0)?;
//!
//!     instance.destroy_device(Some(device));
//!     destroy_instance(Some(instance));
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names)]

pub mod adapter;
pub mod config;
pub mod device;
pub mod driver;
pub mod error;
pub mod extensions;
pub mod instance;
pub mod logging;
pub mod messages;

pub use adapter::{
    Adapter, AdapterExtension, AdapterFeatures, AdapterHandle, AdapterInfo, AdapterKey, AdapterType,
    QueueDesc, QueuePriority, QueueType,
};
pub use device::{Device, DeviceDesc, Queue};
pub use error::{map_vk_result, Error, Result};
pub use extensions::{query_instance_extension_support, InstanceExtension, InstanceExtensionKind};
pub use instance::{create_instance, destroy_instance, Instance, InstanceDesc};
pub use messages::{LogSink, MessageSeverity, MessageSink, MessageSource};

/// Common imports for users
pub mod prelude {
    pub use crate::{
        config::{Config, DeviceConfig, HalConfig, InstanceConfig},
        create_instance, destroy_instance, AdapterExtension, AdapterFeatures, AdapterHandle,
        AdapterInfo, AdapterType, Device, DeviceDesc, Error, Instance, InstanceDesc,
        InstanceExtension, LogSink, MessageSink, Queue, QueueDesc, QueuePriority, QueueType,
        Result,
    };
}
