//! Native driver boundary
//!
//! The instance, adapter and device layers talk to the native driver only
//! through the traits in this module. Native objects are released when their
//! boxed trait object is dropped.
//!
//! Native calls are not assumed to be re-entrant per instance; callers of
//! [`NativeInstance`] serialise access (the crate does so through `&mut`
//! receivers on enumeration).

pub mod vulkan;

#[cfg(test)]
pub(crate) mod mock;

use ash::vk;
use std::sync::Arc;

use crate::adapter::AdapterKey;
use crate::extensions::ChainLink;
use crate::messages::MessageSink;

pub use vulkan::VulkanDriver;

/// Status-carrying result of a native call
pub type NativeResult<T> = std::result::Result<T, vk::Result>;

/// Fully negotiated native instance creation data
#[derive(Clone)]
pub struct NativeInstanceDesc {
    /// Application name reported to the driver
    pub application_name: String,
    /// Packed application version
    pub application_version: u32,
    /// Layer names to enable
    pub layers: Vec<&'static str>,
    /// Instance extension names to enable
    pub extensions: Vec<&'static str>,
    /// Chained creation structures, head first
    pub chain: Vec<ChainLink>,
    /// Receiver for validation messages, used by [`ChainLink::DebugMessenger`]
    pub message_sink: Option<Arc<dyn MessageSink>>,
}

/// Queues requested from one queue family
#[derive(Debug, Clone, PartialEq)]
pub struct NativeQueueRequest {
    /// Queue family index
    pub family: u32,
    /// One priority per queue
    pub priorities: Vec<f32>,
}

/// Native logical device creation data
#[derive(Debug, Clone)]
pub struct NativeDeviceDesc {
    /// Queue requests, at most one per family
    pub queues: Vec<NativeQueueRequest>,
    /// Device extension names to enable
    pub extensions: Vec<&'static str>,
    /// Core features to enable
    pub features: vk::PhysicalDeviceFeatures,
}

/// Entry point into a native driver
pub trait Driver: Send + Sync {
    /// Short backend name for logging
    fn name(&self) -> &str;

    /// Instance layers exposed by the driver build
    fn instance_layers(&self) -> NativeResult<Vec<String>>;

    /// Instance extensions exposed by the driver build and its layers
    fn instance_extensions(&self) -> NativeResult<Vec<String>>;

    /// Create the top-level driver context
    fn create_instance(&self, desc: &NativeInstanceDesc) -> NativeResult<Box<dyn NativeInstance>>;
}

/// Native top-level driver context
pub trait NativeInstance: Send {
    /// Count pass of physical device enumeration.
    ///
    /// Returns the raw status together with whatever count the driver wrote,
    /// so non-fatal statuses can still use the count.
    fn physical_device_count(&self) -> (vk::Result, u32);

    /// Fill pass of physical device enumeration, sized to `capacity`
    fn physical_devices(&self, capacity: u32) -> NativeResult<Vec<vk::PhysicalDevice>>;

    /// Stable identity of a physical device
    fn identity(&self, physical_device: vk::PhysicalDevice) -> AdapterKey;

    /// Fixed-layout device properties
    fn properties(&self, physical_device: vk::PhysicalDevice) -> vk::PhysicalDeviceProperties;

    /// Fixed-layout core feature support
    fn features(&self, physical_device: vk::PhysicalDevice) -> vk::PhysicalDeviceFeatures;

    /// Queue families of a physical device
    fn queue_families(&self, physical_device: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties>;

    /// Device extension names supported by a physical device
    fn device_extensions(&self, physical_device: vk::PhysicalDevice) -> NativeResult<Vec<String>>;

    /// Create a logical device
    fn create_device(
        &self,
        physical_device: vk::PhysicalDevice,
        desc: &NativeDeviceDesc,
    ) -> NativeResult<Box<dyn NativeDevice>>;
}

/// Native logical device
pub trait NativeDevice: Send {
    /// Queue handle for a family and index requested at creation
    fn queue(&self, family: u32, index: u32) -> vk::Queue;

    /// Block until all queues are idle
    fn wait_idle(&self) -> NativeResult<()>;
}
