//! Adapter identity and descriptive types
//!
//! An [`Adapter`] is the long-lived record for one physical GPU. Records live
//! in an arena owned by the [`Instance`](crate::Instance) and are addressed by
//! [`AdapterHandle`]. Handles stay valid until the instance is destroyed; an
//! adapter that vanished from the last enumeration keeps its record but is
//! flagged invalid.

use ash::vk;
use serde::{Deserialize, Serialize};
use std::ffi::c_char;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

slotmap::new_key_type! {
    /// Slot of an adapter record in its instance's arena
    pub(crate) struct AdapterSlot;
}

/// Stable handle to an adapter record owned by an instance
///
/// A handle carries the id of the instance that issued it and never
/// resolves against another instance's adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AdapterHandle {
    instance: u64,
    slot: AdapterSlot,
}

impl AdapterHandle {
    pub(crate) const fn new(instance: u64, slot: AdapterSlot) -> Self {
        Self { instance, slot }
    }

    pub(crate) const fn instance(self) -> u64 {
        self.instance
    }

    pub(crate) const fn slot(self) -> AdapterSlot {
        self.slot
    }
}

/// Identity of a physical GPU, independent of the raw native handle
///
/// Built from the device UUID when the driver reports one, otherwise from
/// the raw handle value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AdapterKey([u8; vk::UUID_SIZE]);

impl AdapterKey {
    /// Key from a driver-reported device UUID
    pub const fn from_uuid(uuid: [u8; vk::UUID_SIZE]) -> Self {
        Self(uuid)
    }

    /// Key from a raw native handle value
    pub fn from_raw_handle(raw: u64) -> Self {
        let mut bytes = [0u8; vk::UUID_SIZE];
        bytes[vk::UUID_SIZE - 8..].copy_from_slice(&raw.to_be_bytes());
        Self(bytes)
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8; vk::UUID_SIZE] {
        &self.0
    }
}

impl fmt::Display for AdapterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if matches!(i, 4 | 6 | 8 | 10) {
                write!(f, "-")?;
            }
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Cached record for one physical GPU
#[derive(Debug, Clone)]
pub struct Adapter {
    key: AdapterKey,
    native: vk::PhysicalDevice,
    valid: bool,
}

impl Adapter {
    pub(crate) fn new(key: AdapterKey, native: vk::PhysicalDevice) -> Self {
        Self { key, native, valid: true }
    }

    /// Identity key, fixed for the lifetime of the record
    pub fn key(&self) -> AdapterKey {
        self.key
    }

    /// Whether the adapter was present in the last enumeration
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub(crate) fn invalidate(&mut self) {
        self.valid = false;
    }

    /// Re-associate the latest native handle and mark the adapter present.
    pub(crate) fn revalidate(&mut self, native: vk::PhysicalDevice) {
        self.native = native;
        self.valid = true;
    }

    /// Native handle, only while the adapter is present
    pub(crate) fn live_handle(&self) -> Option<vk::PhysicalDevice> {
        self.valid.then_some(self.native)
    }
}

/// Physical class of an adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdapterType {
    /// Unknown or CPU-backed adapter
    Other,
    /// GPU sharing memory with the host
    Integrated,
    /// Dedicated GPU
    Discrete,
    /// Virtualised GPU
    Virtual,
}

impl AdapterType {
    pub(crate) fn from_vk(device_type: vk::PhysicalDeviceType) -> Self {
        match device_type {
            vk::PhysicalDeviceType::INTEGRATED_GPU => Self::Integrated,
            vk::PhysicalDeviceType::DISCRETE_GPU => Self::Discrete,
            vk::PhysicalDeviceType::VIRTUAL_GPU => Self::Virtual,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for AdapterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other => write!(f, "Other"),
            Self::Integrated => write!(f, "Integrated"),
            Self::Discrete => write!(f, "Discrete"),
            Self::Virtual => write!(f, "Virtual"),
        }
    }
}

/// Descriptive information about an adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterInfo {
    /// PCI vendor id
    pub vendor_id: u32,
    /// Vendor-specific device id
    pub adapter_id: u32,
    /// Human-readable adapter name
    pub adapter_name: String,
    /// Physical class of the adapter
    pub adapter_type: AdapterType,
}

impl AdapterInfo {
    pub(crate) fn from_properties(properties: &vk::PhysicalDeviceProperties) -> Self {
        Self {
            vendor_id: properties.vendor_id,
            adapter_id: properties.device_id,
            adapter_name: fixed_c_string(&properties.device_name),
            adapter_type: AdapterType::from_vk(properties.device_type),
        }
    }
}

/// Read a NUL-terminated fixed-size native string; stops at the array end
/// if no terminator is present.
pub(crate) fn fixed_c_string(chars: &[c_char]) -> String {
    #[allow(clippy::cast_sign_loss)]
    let bytes: Vec<u8> = chars
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

bitflags::bitflags! {
    /// Optional adapter features, requested at device creation
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AdapterFeatures: u32 {
        /// Geometry shader stage
        const GEOMETRY_SHADER = 1 << 0;
        /// Tessellation shader stages
        const TESSELLATION_SHADER = 1 << 1;
        /// Anisotropic texture filtering
        const SAMPLER_ANISOTROPY = 1 << 2;
        /// Multiple indirect draws per call
        const MULTI_DRAW_INDIRECT = 1 << 3;
        /// 64-bit floats in shaders
        const SHADER_FLOAT64 = 1 << 4;
        /// BC texture compression formats
        const TEXTURE_COMPRESSION_BC = 1 << 5;
        /// Wireframe and point fill modes
        const FILL_MODE_NON_SOLID = 1 << 6;
        /// Line widths other than 1.0
        const WIDE_LINES = 1 << 7;
        /// Depth clamping
        const DEPTH_CLAMP = 1 << 8;
        /// Per-attachment blend state
        const INDEPENDENT_BLEND = 1 << 9;
    }
}

macro_rules! native_features {
    ($($flag:ident => $field:ident),* $(,)?) => {
        impl AdapterFeatures {
            /// Native feature bits without a flag here are ignored.
            pub(crate) fn from_vk(native: &vk::PhysicalDeviceFeatures) -> Self {
                let mut features = Self::empty();
                $(
                    if native.$field != vk::FALSE {
                        features |= Self::$flag;
                    }
                )*
                features
            }

            pub(crate) fn to_vk(self) -> vk::PhysicalDeviceFeatures {
                let mut native = vk::PhysicalDeviceFeatures::default();
                $(
                    native.$field = vk::Bool32::from(self.contains(Self::$flag));
                )*
                native
            }
        }
    };
}

native_features! {
    GEOMETRY_SHADER => geometry_shader,
    TESSELLATION_SHADER => tessellation_shader,
    SAMPLER_ANISOTROPY => sampler_anisotropy,
    MULTI_DRAW_INDIRECT => multi_draw_indirect,
    SHADER_FLOAT64 => shader_float64,
    TEXTURE_COMPRESSION_BC => texture_compression_bc,
    FILL_MODE_NON_SOLID => fill_mode_non_solid,
    WIDE_LINES => wide_lines,
    DEPTH_CLAMP => depth_clamp,
    INDEPENDENT_BLEND => independent_blend,
}

/// Optional adapter-level extensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterExtension {
    /// Presentation to surfaces
    Swapchain,
    /// Rendering without render pass objects
    DynamicRendering,
    /// Revised pipeline barrier and submission API
    Synchronization2,
}

impl AdapterExtension {
    /// Native extension name
    pub fn native_name(self) -> &'static str {
        match self {
            Self::Swapchain => "VK_KHR_swapchain",
            Self::DynamicRendering => "VK_KHR_dynamic_rendering",
            Self::Synchronization2 => "VK_KHR_synchronization2",
        }
    }
}

impl fmt::Display for AdapterExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Swapchain => write!(f, "swapchain"),
            Self::DynamicRendering => write!(f, "dynamic_rendering"),
            Self::Synchronization2 => write!(f, "synchronization2"),
        }
    }
}

impl FromStr for AdapterExtension {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "swapchain" => Ok(Self::Swapchain),
            "dynamic_rendering" => Ok(Self::DynamicRendering),
            "synchronization2" => Ok(Self::Synchronization2),
            other => Err(Error::ExtensionNotSupported(other.to_string())),
        }
    }
}

/// Kind of work a queue accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueueType {
    /// Graphics, compute and transfer work
    Graphics,
    /// Compute and transfer work
    Compute,
    /// Transfer work only
    Transfer,
}

impl QueueType {
    /// Pick the queue family serving this queue type.
    ///
    /// Compute and transfer prefer dedicated families so they can run
    /// alongside graphics work.
    pub(crate) fn resolve_family(self, families: &[vk::QueueFamilyProperties]) -> Option<u32> {
        match self {
            Self::Graphics => {
                find_family(families, |flags| flags.contains(vk::QueueFlags::GRAPHICS))
            }
            Self::Compute => find_family(families, |flags| {
                flags.contains(vk::QueueFlags::COMPUTE) && !flags.contains(vk::QueueFlags::GRAPHICS)
            })
            .or_else(|| find_family(families, |flags| flags.contains(vk::QueueFlags::COMPUTE))),
            Self::Transfer => find_family(families, |flags| {
                flags.contains(vk::QueueFlags::TRANSFER)
                    && !flags.intersects(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)
            })
            // graphics and compute families implicitly accept transfers
            .or_else(|| {
                find_family(families, |flags| {
                    flags.intersects(
                        vk::QueueFlags::TRANSFER
                            | vk::QueueFlags::GRAPHICS
                            | vk::QueueFlags::COMPUTE,
                    )
                })
            }),
        }
    }
}

fn find_family(
    families: &[vk::QueueFamilyProperties],
    predicate: impl Fn(vk::QueueFlags) -> bool,
) -> Option<u32> {
    families
        .iter()
        .position(|family| family.queue_count > 0 && predicate(family.queue_flags))
        .and_then(|index| u32::try_from(index).ok())
}

impl fmt::Display for QueueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Graphics => write!(f, "Graphics"),
            Self::Compute => write!(f, "Compute"),
            Self::Transfer => write!(f, "Transfer"),
        }
    }
}

/// Scheduling priority of a requested queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum QueuePriority {
    /// Regular priority
    #[default]
    Normal,
    /// Preferred by the scheduler
    High,
}

impl QueuePriority {
    /// Native priority value
    pub fn value(self) -> f32 {
        match self {
            Self::Normal => 0.5,
            Self::High => 1.0,
        }
    }
}

/// One queue requested at device creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueDesc {
    /// Kind of work the queue accepts
    pub queue_type: QueueType,
    /// Scheduling priority
    #[serde(default)]
    pub priority: QueuePriority,
}

impl QueueDesc {
    /// Create a queue request
    pub fn new(queue_type: QueueType, priority: QueuePriority) -> Self {
        Self { queue_type, priority }
    }
}
