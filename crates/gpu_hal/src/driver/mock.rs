//! Scriptable in-memory driver for tests
//!
//! Topology, support sets and failure statuses can be changed at any time
//! through [`MockDriver::state`]; every native object created from the
//! driver shares the same state and is counted while alive.

use ash::vk::{self, Handle};
use std::collections::HashMap;
use std::ffi::c_char;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{
    Driver, NativeDevice, NativeDeviceDesc, NativeInstance, NativeInstanceDesc, NativeResult,
};
use crate::adapter::AdapterKey;
use crate::extensions::{
    ChainLink, DEBUG_UTILS_EXTENSION, VALIDATION_FEATURES_EXTENSION, VALIDATION_LAYER,
};

/// Simulated physical GPU
#[derive(Debug, Clone)]
pub(crate) struct MockGpu {
    pub(crate) uuid: [u8; 16],
    pub(crate) name: String,
    pub(crate) vendor_id: u32,
    pub(crate) device_id: u32,
    pub(crate) device_type: vk::PhysicalDeviceType,
    pub(crate) features: vk::PhysicalDeviceFeatures,
    pub(crate) queue_families: Vec<vk::QueueFamilyProperties>,
    pub(crate) extensions: Vec<String>,
}

impl MockGpu {
    pub(crate) fn new(id: u8, name: &str, device_type: vk::PhysicalDeviceType) -> Self {
        let mut uuid = [0u8; 16];
        uuid[0] = id;
        uuid[15] = 0xa5;

        Self {
            uuid,
            name: name.to_string(),
            vendor_id: 0x1000 + u32::from(id),
            device_id: 0x2000 + u32::from(id),
            device_type,
            features: vk::PhysicalDeviceFeatures {
                sampler_anisotropy: vk::TRUE,
                geometry_shader: vk::TRUE,
                ..Default::default()
            },
            queue_families: vec![
                vk::QueueFamilyProperties {
                    queue_flags: vk::QueueFlags::GRAPHICS
                        | vk::QueueFlags::COMPUTE
                        | vk::QueueFlags::TRANSFER,
                    queue_count: 2,
                    ..Default::default()
                },
                vk::QueueFamilyProperties {
                    queue_flags: vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
                    queue_count: 1,
                    ..Default::default()
                },
                vk::QueueFamilyProperties {
                    queue_flags: vk::QueueFlags::TRANSFER,
                    queue_count: 1,
                    ..Default::default()
                },
            ],
            extensions: vec!["VK_KHR_swapchain".to_string()],
        }
    }

    pub(crate) fn discrete(id: u8) -> Self {
        Self::new(id, &format!("Mock Discrete {id}"), vk::PhysicalDeviceType::DISCRETE_GPU)
    }

    pub(crate) fn integrated(id: u8) -> Self {
        Self::new(id, &format!("Mock Integrated {id}"), vk::PhysicalDeviceType::INTEGRATED_GPU)
    }

    pub(crate) fn key(&self) -> AdapterKey {
        AdapterKey::from_uuid(self.uuid)
    }
}

/// What the last successful or failed instance creation asked for
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordedInstance {
    pub(crate) application_name: String,
    pub(crate) layers: Vec<&'static str>,
    pub(crate) extensions: Vec<&'static str>,
    pub(crate) chain: Vec<ChainLink>,
    pub(crate) has_sink: bool,
}

/// Shared driver state
#[derive(Debug, Default)]
pub(crate) struct MockState {
    pub(crate) layers: Vec<String>,
    pub(crate) extensions: Vec<String>,
    pub(crate) gpus: Vec<MockGpu>,
    pub(crate) count_status: vk::Result,
    pub(crate) fill_status: Option<vk::Result>,
    pub(crate) instance_failure: Option<vk::Result>,
    pub(crate) device_failure: Option<vk::Result>,
    pub(crate) device_lost: bool,
    pub(crate) reissue_handles: bool,
    pub(crate) instance_calls: usize,
    pub(crate) device_calls: usize,
    pub(crate) live_instances: usize,
    pub(crate) live_devices: usize,
    pub(crate) last_instance: Option<RecordedInstance>,
    pub(crate) last_device: Option<NativeDeviceDesc>,
    generation: u64,
    handles: HashMap<u64, [u8; 16]>,
}

impl MockState {
    fn gpu(&self, physical_device: vk::PhysicalDevice) -> Option<&MockGpu> {
        let uuid = self.handles.get(&physical_device.as_raw())?;
        self.gpus.iter().find(|gpu| &gpu.uuid == uuid)
    }
}

/// Cloneable handle to a shared mock driver state
#[derive(Debug, Clone, Default)]
pub(crate) struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    pub(crate) fn new(gpus: Vec<MockGpu>) -> Self {
        let driver = Self::default();
        driver.state().gpus = gpus;
        driver
    }

    /// Expose the validation layer, validation features and debug utils
    pub(crate) fn with_validation(self) -> Self {
        {
            let mut state = self.state();
            state.layers.push(VALIDATION_LAYER.to_string());
            state.extensions.push(VALIDATION_FEATURES_EXTENSION.to_string());
            state.extensions.push(DEBUG_UTILS_EXTENSION.to_string());
        }
        self
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub(crate) fn remove_gpu(&self, uuid: [u8; 16]) {
        self.state().gpus.retain(|gpu| gpu.uuid != uuid);
    }
}

impl Driver for MockDriver {
    fn name(&self) -> &str {
        "Mock"
    }

    fn instance_layers(&self) -> NativeResult<Vec<String>> {
        Ok(self.state().layers.clone())
    }

    fn instance_extensions(&self) -> NativeResult<Vec<String>> {
        Ok(self.state().extensions.clone())
    }

    fn create_instance(&self, desc: &NativeInstanceDesc) -> NativeResult<Box<dyn NativeInstance>> {
        let mut state = self.state();
        state.instance_calls += 1;
        state.last_instance = Some(RecordedInstance {
            application_name: desc.application_name.clone(),
            layers: desc.layers.clone(),
            extensions: desc.extensions.clone(),
            chain: desc.chain.clone(),
            has_sink: desc.message_sink.is_some(),
        });

        if let Some(status) = state.instance_failure {
            return Err(status);
        }

        state.live_instances += 1;
        Ok(Box::new(MockInstance {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockInstance {
    state: Arc<Mutex<MockState>>,
}

impl MockInstance {
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }
}

impl NativeInstance for MockInstance {
    fn physical_device_count(&self) -> (vk::Result, u32) {
        let state = self.state();
        (state.count_status, state.gpus.len() as u32)
    }

    fn physical_devices(&self, capacity: u32) -> NativeResult<Vec<vk::PhysicalDevice>> {
        let mut state = self.state();
        if let Some(status) = state.fill_status {
            return Err(status);
        }

        if state.reissue_handles {
            state.generation += 1;
            state.handles.clear();
        }

        let generation = state.generation;
        let uuids: Vec<[u8; 16]> = state
            .gpus
            .iter()
            .take(capacity as usize)
            .map(|gpu| gpu.uuid)
            .collect();

        let mut devices = Vec::with_capacity(uuids.len());
        for uuid in uuids {
            let raw = (generation << 32) | (u64::from(uuid[0]) + 1);
            state.handles.insert(raw, uuid);
            devices.push(vk::PhysicalDevice::from_raw(raw));
        }

        Ok(devices)
    }

    fn identity(&self, physical_device: vk::PhysicalDevice) -> AdapterKey {
        self.state()
            .gpu(physical_device)
            .map_or_else(|| AdapterKey::from_raw_handle(physical_device.as_raw()), MockGpu::key)
    }

    fn properties(&self, physical_device: vk::PhysicalDevice) -> vk::PhysicalDeviceProperties {
        let state = self.state();
        let mut properties = vk::PhysicalDeviceProperties {
            api_version: vk::API_VERSION_1_1,
            ..Default::default()
        };

        if let Some(gpu) = state.gpu(physical_device) {
            properties.vendor_id = gpu.vendor_id;
            properties.device_id = gpu.device_id;
            properties.device_type = gpu.device_type;
            for (dst, src) in properties.device_name.iter_mut().zip(gpu.name.bytes()) {
                *dst = src as c_char;
            }
        }

        properties
    }

    fn features(&self, physical_device: vk::PhysicalDevice) -> vk::PhysicalDeviceFeatures {
        self.state()
            .gpu(physical_device)
            .map(|gpu| gpu.features)
            .unwrap_or_default()
    }

    fn queue_families(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Vec<vk::QueueFamilyProperties> {
        self.state()
            .gpu(physical_device)
            .map(|gpu| gpu.queue_families.clone())
            .unwrap_or_default()
    }

    fn device_extensions(&self, physical_device: vk::PhysicalDevice) -> NativeResult<Vec<String>> {
        Ok(self
            .state()
            .gpu(physical_device)
            .map(|gpu| gpu.extensions.clone())
            .unwrap_or_default())
    }

    fn create_device(
        &self,
        _physical_device: vk::PhysicalDevice,
        desc: &NativeDeviceDesc,
    ) -> NativeResult<Box<dyn NativeDevice>> {
        let mut state = self.state();
        state.device_calls += 1;
        state.last_device = Some(desc.clone());

        if let Some(status) = state.device_failure {
            return Err(status);
        }

        state.live_devices += 1;
        Ok(Box::new(MockDevice {
            state: Arc::clone(&self.state),
        }))
    }
}

impl Drop for MockInstance {
    fn drop(&mut self) {
        self.state().live_instances -= 1;
    }
}

struct MockDevice {
    state: Arc<Mutex<MockState>>,
}

impl NativeDevice for MockDevice {
    fn queue(&self, family: u32, index: u32) -> vk::Queue {
        vk::Queue::from_raw((u64::from(family) << 16) | (u64::from(index) + 1))
    }

    fn wait_idle(&self) -> NativeResult<()> {
        if self.state.lock().unwrap().device_lost {
            Err(vk::Result::ERROR_DEVICE_LOST)
        } else {
            Ok(())
        }
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.state.lock().unwrap().live_devices -= 1;
    }
}
