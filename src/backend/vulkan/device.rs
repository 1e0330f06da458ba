//! Vulkan physical and logical device management.

use std::ffi::CStr;

use ash::vk;

use crate::caps::{Caps, FormatCaps};
use crate::error::GraphicsError;
use crate::types::TextureFormat;

use super::conversion::{convert_texture_format, sample_count_mask};

/// Select the best physical device for rendering.
///
/// Prefers discrete GPUs over integrated GPUs, then larger texture limits.
pub fn select_physical_device(
    instance: &ash::Instance,
) -> Result<vk::PhysicalDevice, GraphicsError> {
    let devices = unsafe { instance.enumerate_physical_devices() }.map_err(|e| {
        GraphicsError::InitializationFailed(format!(
            "Failed to enumerate physical devices: {:?}",
            e
        ))
    })?;

    if devices.is_empty() {
        return Err(GraphicsError::InitializationFailed(
            "No Vulkan-capable GPU found".to_string(),
        ));
    }

    let mut best_device = None;
    let mut best_score = 0;

    for device in devices {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        if properties.api_version < super::instance::REQUIRED_API_VERSION {
            continue;
        }

        // Never zero, so any device that passes the version check is selectable
        let mut score = 1;
        if properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
            score += 1000;
        } else if properties.device_type == vk::PhysicalDeviceType::INTEGRATED_GPU {
            score += 100;
        }
        score += properties.limits.max_image_dimension2_d / 1024;

        let device_name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) };
        log::info!(
            "Found GPU: {:?} (type: {:?}, score: {})",
            device_name,
            properties.device_type,
            score
        );

        if score > best_score {
            best_score = score;
            best_device = Some(device);
        }
    }

    best_device
        .ok_or_else(|| GraphicsError::InitializationFailed("No suitable GPU found".to_string()))
}

/// Find a queue family that supports graphics operations.
pub fn find_graphics_queue_family(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> Result<u32, GraphicsError> {
    let queue_families =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

    queue_families
        .iter()
        .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|index| index as u32)
        .ok_or_else(|| {
            GraphicsError::InitializationFailed("No graphics queue family found".to_string())
        })
}

/// Create a logical device with dynamic rendering enabled.
pub fn create_logical_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    graphics_queue_family: u32,
) -> Result<ash::Device, GraphicsError> {
    let queue_priorities = [1.0f32];
    let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
        .queue_family_index(graphics_queue_family)
        .queue_priorities(&queue_priorities)];

    let device_extensions = [ash::khr::dynamic_rendering::NAME.as_ptr()];

    let features = vk::PhysicalDeviceFeatures::default();
    let mut dynamic_rendering_features =
        vk::PhysicalDeviceDynamicRenderingFeatures::default().dynamic_rendering(true);

    let create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&device_extensions)
        .enabled_features(&features)
        .push_next(&mut dynamic_rendering_features);

    unsafe { instance.create_device(physical_device, &create_info, None) }.map_err(|e| {
        GraphicsError::InitializationFailed(format!("Failed to create logical device: {:?}", e))
    })
}

/// Build [`Caps`] from device limits and per-format features.
pub fn query_caps(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Caps {
    let properties = unsafe { instance.get_physical_device_properties(physical_device) };
    let limits = properties.limits;

    let mut caps = Caps::default();
    caps.max_texture_size = limits.max_image_dimension2_d;
    caps.max_render_target_size = limits
        .max_framebuffer_width
        .min(limits.max_framebuffer_height);
    caps.min_uniform_buffer_offset_alignment =
        (limits.min_uniform_buffer_offset_alignment as u32).max(1);
    caps.protected_content = false;

    let color_samples = sample_count_mask(limits.framebuffer_color_sample_counts);
    let depth_samples = sample_count_mask(
        limits.framebuffer_depth_sample_counts & limits.framebuffer_stencil_sample_counts,
    );
    // highest set bit is the largest count
    caps.max_sample_count = 31 - color_samples.max(2).leading_zeros();

    for format in TextureFormat::ALL {
        let features = unsafe {
            instance.get_physical_device_format_properties(
                physical_device,
                convert_texture_format(format),
            )
        }
        .optimal_tiling_features;

        let texturable = features.contains(vk::FormatFeatureFlags::SAMPLED_IMAGE);
        let (renderable, sample_counts) = if format.is_depth_stencil() {
            (
                features.contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT),
                depth_samples,
            )
        } else {
            (
                features.contains(vk::FormatFeatureFlags::COLOR_ATTACHMENT_BLEND),
                color_samples,
            )
        };
        caps.set_format_caps(
            format,
            FormatCaps {
                texturable,
                renderable,
                sample_counts: if renderable { sample_counts } else { 0 },
            },
        );
    }

    log::debug!(
        "Vulkan caps: max texture {}, max samples {}, ubo alignment {}",
        caps.max_texture_size,
        caps.max_sample_count,
        caps.min_uniform_buffer_offset_alignment
    );
    caps
}
