//! Vulkan driver backend
//!
//! Implements the driver boundary on top of `ash`. Native objects are
//! wrapped with RAII cleanup: dropping a [`VulkanInstance`] or
//! [`VulkanDevice`] destroys the underlying handle.

use ash::extensions::ext::DebugUtils;
use ash::vk::{self, Handle};
use ash::{Device, Entry, Instance};
use std::ffi::{c_char, c_void, CStr, CString};
use std::ptr;
use std::sync::Arc;

use super::{
    Driver, NativeDevice, NativeDeviceDesc, NativeInstance, NativeInstanceDesc, NativeResult,
};
use crate::adapter::{fixed_c_string, AdapterKey};
use crate::error::{Error, Result};
use crate::extensions::{ChainLink, VALIDATION_LAYER};
use crate::messages::{MessageSeverity, MessageSink, MessageSource};

const ENGINE_NAME: &str = "gpu_hal";

/// Driver backed by the system Vulkan loader
pub struct VulkanDriver {
    entry: Entry,
}

impl VulkanDriver {
    /// Load the Vulkan loader library
    pub fn load() -> Result<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| Error::Loader(format!("Failed to load Vulkan: {e}")))?;

        Ok(Self { entry })
    }
}

fn to_c_strings(names: &[&str]) -> NativeResult<Vec<CString>> {
    names
        .iter()
        .map(|name| CString::new(*name).map_err(|_| vk::Result::ERROR_INITIALIZATION_FAILED))
        .collect()
}

fn pointers(names: &[CString]) -> Vec<*const c_char> {
    names.iter().map(|name| name.as_ptr()).collect()
}

fn messenger_create_info(user_data: *mut c_void) -> vk::DebugUtilsMessengerCreateInfoEXT {
    vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(forward_message))
        .user_data(user_data)
        .build()
}

impl Driver for VulkanDriver {
    fn name(&self) -> &str {
        "Vulkan"
    }

    fn instance_layers(&self) -> NativeResult<Vec<String>> {
        let layers = self.entry.enumerate_instance_layer_properties()?;
        Ok(layers.iter().map(|layer| fixed_c_string(&layer.layer_name)).collect())
    }

    fn instance_extensions(&self) -> NativeResult<Vec<String>> {
        let mut properties = self.entry.enumerate_instance_extension_properties(None)?;

        // validation features are exposed by the validation layer itself
        if self.instance_layers()?.iter().any(|layer| layer == VALIDATION_LAYER) {
            let layer = CString::new(VALIDATION_LAYER)
                .map_err(|_| vk::Result::ERROR_INITIALIZATION_FAILED)?;
            properties.extend(
                self.entry
                    .enumerate_instance_extension_properties(Some(layer.as_c_str()))?,
            );
        }

        Ok(properties
            .iter()
            .map(|extension| fixed_c_string(&extension.extension_name))
            .collect())
    }

    fn create_instance(&self, desc: &NativeInstanceDesc) -> NativeResult<Box<dyn NativeInstance>> {
        let app_name = CString::new(desc.application_name.as_str())
            .map_err(|_| vk::Result::ERROR_INITIALIZATION_FAILED)?;
        let engine_name =
            CString::new(ENGINE_NAME).map_err(|_| vk::Result::ERROR_INITIALIZATION_FAILED)?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(desc.application_version)
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_1);

        let layers = to_c_strings(&desc.layers)?;
        let layer_ptrs = pointers(&layers);
        let extensions = to_c_strings(&desc.extensions)?;
        let extension_ptrs = pointers(&extensions);

        // Boxed so the pointer handed to the driver stays put when the
        // instance wrapper moves.
        let sink = desc.message_sink.clone().map(Box::new);
        let user_data = sink
            .as_deref()
            .map_or(ptr::null_mut(), |sink: &Arc<dyn MessageSink>| {
                (sink as *const Arc<dyn MessageSink>).cast_mut().cast::<c_void>()
            });

        // Each link kind occurs at most once, so one slot per kind suffices.
        // Walk tail to head so the first link ends up directly behind the
        // create info.
        let mut validation_features = vk::ValidationFeaturesEXT::default();
        let mut messenger_info = messenger_create_info(user_data);
        let mut head: *const c_void = ptr::null();
        for link in desc.chain.iter().rev() {
            match link {
                ChainLink::ValidationFeatures(enables) => {
                    validation_features.enabled_validation_feature_count = enables.len() as u32;
                    validation_features.p_enabled_validation_features = enables.as_ptr();
                    validation_features.p_next = head;
                    head = ptr::addr_of!(validation_features).cast();
                }
                ChainLink::DebugMessenger => {
                    messenger_info.p_next = head;
                    head = ptr::addr_of!(messenger_info).cast();
                }
            }
        }

        let mut create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_layer_names(&layer_ptrs)
            .enabled_extension_names(&extension_ptrs)
            .build();
        create_info.p_next = head;

        let instance = unsafe { self.entry.create_instance(&create_info, None)? };

        let messenger = if desc.chain.contains(&ChainLink::DebugMessenger) {
            let debug_utils = DebugUtils::new(&self.entry, &instance);
            let info = messenger_create_info(user_data);
            match unsafe { debug_utils.create_debug_utils_messenger(&info, None) } {
                Ok(messenger) => Some((debug_utils, messenger)),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        log::debug!(
            "Vulkan instance created with layers {:?} and extensions {:?}",
            desc.layers,
            desc.extensions
        );

        Ok(Box::new(VulkanInstance {
            instance,
            messenger,
            _sink: sink,
            entry: self.entry.clone(),
        }))
    }
}

/// Vulkan instance wrapper with RAII cleanup
pub struct VulkanInstance {
    instance: Instance,
    messenger: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
    // Referenced by the messenger's user data; dropped after the instance.
    _sink: Option<Box<Arc<dyn MessageSink>>>,
    // Keeps the loader library mapped while the instance exists; shared
    // with every device created from it.
    entry: Entry,
}

impl NativeInstance for VulkanInstance {
    fn physical_device_count(&self) -> (vk::Result, u32) {
        let mut count = 0u32;
        let status = unsafe {
            (self.instance.fp_v1_0().enumerate_physical_devices)(
                self.instance.handle(),
                &mut count,
                ptr::null_mut(),
            )
        };
        (status, count)
    }

    fn physical_devices(&self, capacity: u32) -> NativeResult<Vec<vk::PhysicalDevice>> {
        let mut count = capacity;
        let mut devices = vec![vk::PhysicalDevice::null(); capacity as usize];
        let status = unsafe {
            (self.instance.fp_v1_0().enumerate_physical_devices)(
                self.instance.handle(),
                &mut count,
                devices.as_mut_ptr(),
            )
        };

        if status != vk::Result::SUCCESS {
            return Err(status);
        }

        devices.truncate(count as usize);
        Ok(devices)
    }

    fn identity(&self, physical_device: vk::PhysicalDevice) -> AdapterKey {
        let properties = unsafe { self.instance.get_physical_device_properties(physical_device) };
        if properties.api_version < vk::API_VERSION_1_1 {
            return AdapterKey::from_raw_handle(physical_device.as_raw());
        }

        let mut id_properties = vk::PhysicalDeviceIDProperties::default();
        {
            let mut properties2 =
                vk::PhysicalDeviceProperties2::builder().push_next(&mut id_properties);
            unsafe {
                self.instance
                    .get_physical_device_properties2(physical_device, &mut properties2);
            }
        }

        AdapterKey::from_uuid(id_properties.device_uuid)
    }

    fn properties(&self, physical_device: vk::PhysicalDevice) -> vk::PhysicalDeviceProperties {
        unsafe { self.instance.get_physical_device_properties(physical_device) }
    }

    fn features(&self, physical_device: vk::PhysicalDevice) -> vk::PhysicalDeviceFeatures {
        unsafe { self.instance.get_physical_device_features(physical_device) }
    }

    fn queue_families(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Vec<vk::QueueFamilyProperties> {
        unsafe {
            self.instance
                .get_physical_device_queue_family_properties(physical_device)
        }
    }

    fn device_extensions(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> NativeResult<Vec<String>> {
        let extensions = unsafe {
            self.instance
                .enumerate_device_extension_properties(physical_device)?
        };

        Ok(extensions
            .iter()
            .map(|extension| fixed_c_string(&extension.extension_name))
            .collect())
    }

    fn create_device(
        &self,
        physical_device: vk::PhysicalDevice,
        desc: &NativeDeviceDesc,
    ) -> NativeResult<Box<dyn NativeDevice>> {
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = desc
            .queues
            .iter()
            .map(|request| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(request.family)
                    .queue_priorities(&request.priorities)
                    .build()
            })
            .collect();

        let extensions = to_c_strings(&desc.extensions)?;
        let extension_ptrs = pointers(&extensions);

        // Device layers are deprecated and left empty.
        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_features(&desc.features);

        let device = unsafe {
            self.instance
                .create_device(physical_device, &create_info, None)?
        };

        Ok(Box::new(VulkanDevice {
            device,
            _entry: self.entry.clone(),
        }))
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some((debug_utils, messenger)) = &self.messenger {
                debug_utils.destroy_debug_utils_messenger(*messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}

/// Vulkan logical device wrapper with RAII cleanup
pub struct VulkanDevice {
    device: Device,
    // Keeps the loader library mapped until the device is destroyed.
    _entry: Entry,
}

impl NativeDevice for VulkanDevice {
    fn queue(&self, family: u32, index: u32) -> vk::Queue {
        unsafe { self.device.get_device_queue(family, index) }
    }

    fn wait_idle(&self) -> NativeResult<()> {
        unsafe { self.device.device_wait_idle() }
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            // Ensure device is idle before destruction
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}

fn message_severity(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> MessageSeverity {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        MessageSeverity::Error
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        MessageSeverity::Warning
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        MessageSeverity::Info
    } else {
        MessageSeverity::Verbose
    }
}

fn message_source(message_type: vk::DebugUtilsMessageTypeFlagsEXT) -> MessageSource {
    if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        MessageSource::Validation
    } else {
        MessageSource::Implementation
    }
}

/// Debug messenger callback forwarding to the instance's message sink
unsafe extern "system" fn forward_message(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    user_data: *mut c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || user_data.is_null() {
        return vk::FALSE;
    }

    let sink = &*(user_data as *const Arc<dyn MessageSink>);
    let message_ptr = (*callback_data).p_message;
    let message = if message_ptr.is_null() {
        std::borrow::Cow::Borrowed("")
    } else {
        CStr::from_ptr(message_ptr).to_string_lossy()
    };

    sink.message(message_severity(severity), message_source(message_type), &message);

    vk::FALSE
}
