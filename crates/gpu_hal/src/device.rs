//! Logical devices and queue acquisition

use ash::vk;
use std::collections::HashMap;

use crate::adapter::{
    AdapterExtension, AdapterFeatures, AdapterHandle, QueueDesc, QueuePriority, QueueType,
};
use crate::driver::{NativeDevice, NativeDeviceDesc, NativeQueueRequest};
use crate::error::{Error, Result};
use crate::instance::Instance;

/// Device creation parameters
#[derive(Debug, Clone, Default)]
pub struct DeviceDesc<'a> {
    /// Adapter to create the device on
    pub adapter: Option<AdapterHandle>,
    /// Features to enable; all must be supported by the adapter
    pub features: AdapterFeatures,
    /// Adapter extensions to enable
    pub extensions: &'a [AdapterExtension],
    /// Queues to acquire; empty means one queue from the first family
    pub queues: &'a [QueueDesc],
}

impl<'a> DeviceDesc<'a> {
    /// Descriptor for an adapter with no features, extensions or queues
    pub fn new(adapter: AdapterHandle) -> Self {
        Self {
            adapter: Some(adapter),
            ..Self::default()
        }
    }

    /// Set the features to enable
    pub fn with_features(mut self, features: AdapterFeatures) -> Self {
        self.features = features;
        self
    }

    /// Set the extensions to enable
    pub fn with_extensions(mut self, extensions: &'a [AdapterExtension]) -> Self {
        self.extensions = extensions;
        self
    }

    /// Set the queues to acquire
    pub fn with_queues(mut self, queues: &'a [QueueDesc]) -> Self {
        self.queues = queues;
        self
    }
}

/// Queue acquired at device creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Queue {
    handle: vk::Queue,
    queue_type: QueueType,
    priority: QueuePriority,
    family: u32,
    index: u32,
}

impl Queue {
    /// Native queue handle
    pub fn handle(&self) -> vk::Queue {
        self.handle
    }

    /// Kind of work the queue was requested for
    pub fn queue_type(&self) -> QueueType {
        self.queue_type
    }

    /// Requested priority
    pub fn priority(&self) -> QueuePriority {
        self.priority
    }

    /// Queue family index
    pub fn family(&self) -> u32 {
        self.family
    }

    /// Index within the queue family
    pub fn index(&self) -> u32 {
        self.index
    }
}

/// Placement of one requested queue
#[derive(Debug, Clone, Copy, PartialEq)]
struct QueueSlot {
    queue_type: QueueType,
    priority: QueuePriority,
    family: u32,
    index: u32,
}

/// Queue placement for a device, grouped per family
#[derive(Debug, Clone, Default, PartialEq)]
struct QueuePlan {
    requests: Vec<NativeQueueRequest>,
    slots: Vec<QueueSlot>,
}

impl QueuePlan {
    /// Place requested queues into families.
    ///
    /// Queues of one family share a single request, in request order.
    fn build(queues: &[QueueDesc], families: &[vk::QueueFamilyProperties]) -> Result<Self> {
        if queues.is_empty() {
            return Self::single_default(families);
        }

        let mut plan = Self::default();
        for desc in queues {
            let family = desc.queue_type.resolve_family(families).ok_or_else(|| {
                Error::FeatureNotSupported(format!(
                    "no queue family accepts {} work",
                    desc.queue_type
                ))
            })?;

            let available = families.get(family as usize).map_or(0, |f| f.queue_count);
            let index = plan.push(family, desc.priority.value());
            if index >= available {
                return Err(Error::InvalidUsage(format!(
                    "requested {} queues from family {family}, which has {available}",
                    index + 1
                )));
            }

            plan.slots.push(QueueSlot {
                queue_type: desc.queue_type,
                priority: desc.priority,
                family,
                index,
            });
        }

        Ok(plan)
    }

    /// One high priority queue from family 0
    fn single_default(families: &[vk::QueueFamilyProperties]) -> Result<Self> {
        let first = families
            .first()
            .filter(|family| family.queue_count > 0)
            .ok_or_else(|| Error::InvalidUsage("adapter exposes no queues".to_string()))?;

        let queue_type = if first.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            QueueType::Graphics
        } else if first.queue_flags.contains(vk::QueueFlags::COMPUTE) {
            QueueType::Compute
        } else {
            QueueType::Transfer
        };

        log::debug!("No queues requested, using one {queue_type} queue from family 0");

        let mut plan = Self::default();
        plan.push(0, QueuePriority::High.value());
        plan.slots.push(QueueSlot {
            queue_type,
            priority: QueuePriority::High,
            family: 0,
            index: 0,
        });
        Ok(plan)
    }

    /// Add a queue to a family request, returning its index in the family
    fn push(&mut self, family: u32, priority: f32) -> u32 {
        let existing = self.requests.iter().position(|r| r.family == family);
        let request = if let Some(position) = existing {
            &mut self.requests[position]
        } else {
            self.requests.push(NativeQueueRequest {
                family,
                priorities: Vec::new(),
            });
            let last = self.requests.len() - 1;
            &mut self.requests[last]
        };

        request.priorities.push(priority);
        u32::try_from(request.priorities.len() - 1).unwrap_or(u32::MAX)
    }
}

/// Logical device bound to one adapter
///
/// Destroy every device before the [`Instance`] it was created from. The
/// device keeps the native loader alive on its own, but the driver requires
/// child objects to go first.
pub struct Device {
    adapter: AdapterHandle,
    features: AdapterFeatures,
    extensions: Vec<AdapterExtension>,
    queues: HashMap<QueueType, Vec<Queue>>,
    native: Box<dyn NativeDevice>,
}

impl Device {
    /// Adapter the device was created on
    pub fn adapter(&self) -> AdapterHandle {
        self.adapter
    }

    /// Enabled features
    pub fn features(&self) -> AdapterFeatures {
        self.features
    }

    /// Enabled adapter extensions
    pub fn extensions(&self) -> &[AdapterExtension] {
        &self.extensions
    }

    /// Whether an adapter extension was enabled
    pub fn has_extension(&self, extension: AdapterExtension) -> bool {
        self.extensions.contains(&extension)
    }

    /// Number of acquired queues of a type
    pub fn queue_count(&self, queue_type: QueueType) -> usize {
        self.queues.get(&queue_type).map_or(0, Vec::len)
    }

    /// Acquired queue of a type, in request order
    pub fn queue(&self, queue_type: QueueType, index: usize) -> Result<Queue> {
        self.queues
            .get(&queue_type)
            .and_then(|queues| queues.get(index))
            .copied()
            .ok_or_else(|| {
                Error::InvalidUsage(format!(
                    "{queue_type} queue {index} was not requested (have {})",
                    self.queue_count(queue_type)
                ))
            })
    }

    /// Block until every queue of the device is idle
    pub fn wait_idle(&self) -> Result<()> {
        self.native.wait_idle().map_err(Error::from)
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        log::debug!("Destroying device");
    }
}

impl Instance {
    /// Create a logical device on an enumerated adapter.
    ///
    /// Arguments, features, extensions and queue placement are all checked
    /// before the driver is called.
    pub fn create_device(&self, desc: &DeviceDesc<'_>) -> Result<Device> {
        let handle = desc
            .adapter
            .ok_or_else(|| Error::InvalidUsage("device descriptor has no adapter".to_string()))?;
        let physical_device = self.physical_device(handle, Error::DeviceLost)?;

        let supported = AdapterFeatures::from_vk(&self.native.features(physical_device));
        let missing = desc.features.difference(supported);
        if !missing.is_empty() {
            return Err(Error::FeatureNotSupported(format!("{missing:?}")));
        }

        let available = self.native.device_extensions(physical_device)?;
        let mut extensions: Vec<AdapterExtension> = Vec::with_capacity(desc.extensions.len());
        for &extension in desc.extensions {
            if !available.iter().any(|name| name == extension.native_name()) {
                return Err(Error::ExtensionNotSupported(extension.native_name().to_string()));
            }
            if !extensions.contains(&extension) {
                extensions.push(extension);
            }
        }

        let families = self.native.queue_families(physical_device);
        let plan = QueuePlan::build(desc.queues, &families)?;

        let native_desc = NativeDeviceDesc {
            queues: plan.requests,
            extensions: extensions.iter().map(|extension| extension.native_name()).collect(),
            features: desc.features.to_vk(),
        };

        let native = self
            .native
            .create_device(physical_device, &native_desc)
            .map_err(Error::from)?;

        let mut queues: HashMap<QueueType, Vec<Queue>> = HashMap::new();
        for slot in plan.slots {
            queues.entry(slot.queue_type).or_default().push(Queue {
                handle: native.queue(slot.family, slot.index),
                queue_type: slot.queue_type,
                priority: slot.priority,
                family: slot.family,
                index: slot.index,
            });
        }

        log::info!(
            "Created device on adapter {} ({} queues, {} extensions)",
            self.adapter(handle).map_or_else(String::new, |adapter| adapter.key().to_string()),
            queues.values().map(Vec::len).sum::<usize>(),
            extensions.len()
        );

        Ok(Device {
            adapter: handle,
            features: desc.features,
            extensions,
            queues,
            native,
        })
    }

    /// Destroy a device; `None` is a no-op
    pub fn destroy_device(&self, device: Option<Device>) {
        drop(device);
    }
}
