//! Instance management and adapter enumeration
//!
//! An [`Instance`] owns the native driver context and the adapter cache.
//! The cache maps each physical GPU's [`AdapterKey`] to an arena slot, so
//! repeated enumeration returns the same [`AdapterHandle`] for the same GPU
//! even if the driver hands out a different raw handle. GPUs that vanish
//! keep their slot but are flagged invalid; operations on them fail with
//! [`Error::DeviceRemoved`] or [`Error::DeviceLost`].
//!
//! # Thread safety
//!
//! Enumeration mutates the cache and takes `&mut self`; sharing one instance
//! across threads requires external synchronisation. Separate instances
//! share nothing.

use ash::vk;
use slotmap::SlotMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::adapter::{
    Adapter, AdapterExtension, AdapterFeatures, AdapterHandle, AdapterInfo, AdapterKey,
    AdapterSlot, AdapterType, QueueType,
};
use crate::driver::{Driver, NativeInstance, NativeInstanceDesc, VulkanDriver};
use crate::error::{Error, Result};
use crate::extensions::{negotiate, DriverSupport, InstanceExtension};
use crate::messages::MessageSink;

/// Instance creation parameters
#[derive(Clone)]
pub struct InstanceDesc<'a> {
    /// Application name reported to the driver
    pub application_name: &'a str,
    /// Application version (major, minor, patch)
    pub application_version: (u32, u32, u32),
    /// Optional capabilities to negotiate
    pub extensions: &'a [InstanceExtension],
    /// Receiver for native validation messages
    pub message_sink: Option<Arc<dyn MessageSink>>,
}

impl<'a> InstanceDesc<'a> {
    /// Descriptor with no extensions and no message sink
    pub fn new(application_name: &'a str) -> Self {
        Self {
            application_name,
            application_version: (0, 1, 0),
            extensions: &[],
            message_sink: None,
        }
    }

    /// Set the application version
    pub fn with_version(mut self, major: u32, minor: u32, patch: u32) -> Self {
        self.application_version = (major, minor, patch);
        self
    }

    /// Set the requested extensions
    pub fn with_extensions(mut self, extensions: &'a [InstanceExtension]) -> Self {
        self.extensions = extensions;
        self
    }

    /// Route native validation messages to a sink
    pub fn with_message_sink(mut self, sink: Arc<dyn MessageSink>) -> Self {
        self.message_sink = Some(sink);
        self
    }
}

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// Top-level driver context owning the adapter cache
pub struct Instance {
    id: u64,
    // Adapter records go before the native context they were enumerated from.
    adapters: SlotMap<AdapterSlot, Adapter>,
    cache: HashMap<AdapterKey, AdapterSlot>,
    pub(crate) native: Box<dyn NativeInstance>,
    message_sink: Option<Arc<dyn MessageSink>>,
}

/// Create an instance on the system Vulkan driver
pub fn create_instance(desc: &InstanceDesc<'_>) -> Result<Instance> {
    let driver = VulkanDriver::load()?;
    Instance::new(&driver, desc)
}

/// Destroy an instance; `None` is a no-op.
///
/// Devices created from the instance must be destroyed first.
pub fn destroy_instance(instance: Option<Instance>) {
    drop(instance);
}

impl Instance {
    /// Create an instance on the given driver.
    ///
    /// Extensions are negotiated before any native call; a rejected
    /// extension leaves nothing allocated.
    pub fn new(driver: &dyn Driver, desc: &InstanceDesc<'_>) -> Result<Self> {
        if desc.application_name.contains('\0') {
            return Err(Error::InvalidUsage(
                "application name contains an interior NUL".to_string(),
            ));
        }

        let support = DriverSupport::query(driver)?;
        let negotiated = negotiate(desc.extensions, &support, desc.message_sink.is_some())?;

        let (major, minor, patch) = desc.application_version;
        let native_desc = NativeInstanceDesc {
            application_name: desc.application_name.to_string(),
            application_version: vk::make_api_version(0, major, minor, patch),
            layers: negotiated.layers,
            extensions: negotiated.extensions,
            chain: negotiated.chain,
            message_sink: desc.message_sink.clone(),
        };

        let native = driver.create_instance(&native_desc).map_err(|status| {
            log::debug!("{} instance creation failed: {:?}", driver.name(), status);
            Error::from(status)
        })?;

        log::info!(
            "Created {} instance for '{}' ({} layers, {} extensions)",
            driver.name(),
            desc.application_name,
            native_desc.layers.len(),
            native_desc.extensions.len()
        );

        Ok(Self {
            id: NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed),
            adapters: SlotMap::with_key(),
            cache: HashMap::new(),
            native,
            message_sink: desc.message_sink.clone(),
        })
    }

    /// Enumerate the physical GPUs currently present.
    ///
    /// Returns one handle per present GPU. Handles for GPUs seen before are
    /// reused; GPUs that disappeared stay cached but flagged invalid and are
    /// omitted from the result.
    pub fn enumerate_adapters(&mut self) -> Result<Vec<AdapterHandle>> {
        for adapter in self.adapters.values_mut() {
            adapter.invalidate();
        }

        let (status, count) = self.native.physical_device_count();
        match status {
            vk::Result::SUCCESS => {}
            vk::Result::TIMEOUT => {
                log::debug!("Physical device count timed out, continuing with {count}");
            }
            other => return Err(other.into()),
        }

        let physical_devices = self.native.physical_devices(count)?;

        let mut present = Vec::with_capacity(physical_devices.len());
        for physical_device in physical_devices {
            let key = self.native.identity(physical_device);

            let cached = self
                .cache
                .get(&key)
                .copied()
                .and_then(|slot| self.adapters.get_mut(slot).map(|adapter| (slot, adapter)));

            let slot = if let Some((slot, adapter)) = cached {
                adapter.revalidate(physical_device);
                slot
            } else {
                let slot = self.adapters.insert(Adapter::new(key, physical_device));
                self.cache.insert(key, slot);
                log::debug!("Cached new adapter {key}");
                slot
            };

            let handle = AdapterHandle::new(self.id, slot);

            if !present.contains(&handle) {
                present.push(handle);
            }
        }

        for adapter in self.adapters.values().filter(|adapter| !adapter.is_valid()) {
            log::warn!("Adapter {} is no longer present", adapter.key());
        }

        Ok(present)
    }

    /// Adapter record for a handle, valid or not.
    ///
    /// Handles issued by another instance resolve to `None`.
    pub fn adapter(&self, handle: AdapterHandle) -> Option<&Adapter> {
        if handle.instance() != self.id {
            return None;
        }

        self.adapters.get(handle.slot())
    }

    /// Number of cached adapter records, including invalid ones
    pub fn cached_adapter_count(&self) -> usize {
        self.adapters.len()
    }

    /// Message sink this instance forwards validation messages to
    pub fn message_sink(&self) -> Option<&Arc<dyn MessageSink>> {
        self.message_sink.as_ref()
    }

    /// Native handle of a present adapter; `missing` is returned when the
    /// adapter is no longer present.
    pub(crate) fn physical_device(
        &self,
        handle: AdapterHandle,
        missing: Error,
    ) -> Result<vk::PhysicalDevice> {
        let adapter = self.adapter(handle).ok_or_else(|| {
            Error::InvalidUsage("adapter does not belong to this instance".to_string())
        })?;

        adapter.live_handle().ok_or(missing)
    }

    /// Descriptive information about an adapter
    pub fn query_adapter_info(&self, handle: AdapterHandle) -> Result<AdapterInfo> {
        let physical_device = self.physical_device(handle, Error::DeviceRemoved)?;
        Ok(AdapterInfo::from_properties(&self.native.properties(physical_device)))
    }

    /// Optional features the adapter supports
    pub fn query_adapter_features(&self, handle: AdapterHandle) -> Result<AdapterFeatures> {
        let physical_device = self.physical_device(handle, Error::DeviceRemoved)?;
        Ok(AdapterFeatures::from_vk(&self.native.features(physical_device)))
    }

    /// Whether the adapter supports an adapter extension
    pub fn query_adapter_extension_support(
        &self,
        handle: AdapterHandle,
        extension: AdapterExtension,
    ) -> Result<bool> {
        let physical_device = self.physical_device(handle, Error::DeviceRemoved)?;
        let available = self.native.device_extensions(physical_device)?;
        Ok(available.iter().any(|name| name == extension.native_name()))
    }

    /// Maximum number of queues of a type that can be requested
    pub fn query_queue_count(&self, handle: AdapterHandle, queue_type: QueueType) -> Result<u32> {
        let physical_device = self.physical_device(handle, Error::DeviceRemoved)?;
        let families = self.native.queue_families(physical_device);

        Ok(queue_type
            .resolve_family(&families)
            .and_then(|family| families.get(family as usize))
            .map_or(0, |family| family.queue_count))
    }

    /// Pick an adapter from an enumeration result.
    ///
    /// Prefers the first valid adapter of `preferred` type, then the first
    /// valid adapter of any type.
    pub fn select_adapter(
        &self,
        adapters: &[AdapterHandle],
        preferred: AdapterType,
    ) -> Option<AdapterHandle> {
        let candidates: Vec<(AdapterHandle, AdapterInfo)> = adapters
            .iter()
            .filter_map(|&handle| {
                self.query_adapter_info(handle)
                    .ok()
                    .map(|info| (handle, info))
            })
            .collect();

        candidates
            .iter()
            .find(|(_, info)| info.adapter_type == preferred)
            .or_else(|| candidates.first())
            .map(|(handle, info)| {
                log::info!("Selected adapter {} ({})", info.adapter_name, info.adapter_type);
                *handle
            })
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        log::debug!("Destroying instance with {} cached adapters", self.adapters.len());
        self.cache.clear();
        self.adapters.clear();
    }
}
