//! Native Vulkan backend implementation using ash.
//!
//! Rendering is offscreen: targets are plain images drawn through dynamic
//! rendering (`VK_KHR_dynamic_rendering`). Buffers live in host-visible
//! memory from gpu-allocator and are written through their persistent
//! mapping. Validation layers are enabled when requested.

mod command;
mod conversion;
mod debug;
mod device;
mod instance;
mod pipeline;

pub use command::VulkanCommandBuffer;

use std::sync::Arc;

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use parking_lot::Mutex;

use crate::caps::Caps;
use crate::config::BackendType;
use crate::error::{GraphicsError, GraphicsResult};
use crate::types::{BufferDescriptor, TextureDescriptor};

use super::{
    GpuBuffer, GpuDevice, GpuPipeline, GpuResource, GpuTexture, PipelineDescriptor, Recyclable,
};

use self::conversion::{
    aspect_mask, convert_buffer_usage, convert_result_error, convert_sample_count,
    convert_texture_format, convert_texture_usage,
};

/// Instance, device and allocator shared by the device and command buffer
/// halves. Destroyed when the last half is dropped.
pub(crate) struct VulkanShared {
    /// Keeps the loader alive for the lifetime of the instance.
    _entry: ash::Entry,
    instance: ash::Instance,
    debug_utils: Option<ash::ext::debug_utils::Instance>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
    device: ash::Device,
    graphics_queue: vk::Queue,
    graphics_queue_family: u32,
    dynamic_rendering: ash::khr::dynamic_rendering::Device,
    /// `None` once dropped; the allocator must go before the device.
    allocator: Mutex<Option<Allocator>>,
}

impl Drop for VulkanShared {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            drop(self.allocator.lock().take());

            self.device.destroy_device(None);

            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils, self.debug_messenger)
            {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            self.instance.destroy_instance(None);
        }
        log::debug!("Vulkan device destroyed");
    }
}

/// Create the device and command buffer halves of the Vulkan backend.
pub fn create_vulkan_backend(
    validation: bool,
) -> GraphicsResult<(VulkanDevice, VulkanCommandBuffer)> {
    let entry = unsafe { ash::Entry::load() }.map_err(|e| {
        GraphicsError::InitializationFailed(format!("Failed to load Vulkan: {}", e))
    })?;

    let instance::InstanceBundle {
        instance,
        debug_utils,
        debug_messenger,
    } = instance::create_instance(&entry, validation)?;

    let destroy_instance = |instance: &ash::Instance| unsafe {
        if let (Some(debug_utils), Some(messenger)) = (&debug_utils, debug_messenger) {
            debug_utils.destroy_debug_utils_messenger(messenger, None);
        }
        instance.destroy_instance(None);
    };

    let selected = device::select_physical_device(&instance).and_then(|physical_device| {
        let family = device::find_graphics_queue_family(&instance, physical_device)?;
        let logical = device::create_logical_device(&instance, physical_device, family)?;
        Ok((physical_device, family, logical))
    });
    let (physical_device, graphics_queue_family, device) = match selected {
        Ok(selected) => selected,
        Err(err) => {
            destroy_instance(&instance);
            return Err(err);
        }
    };

    let allocator = match Allocator::new(&AllocatorCreateDesc {
        instance: instance.clone(),
        device: device.clone(),
        physical_device,
        debug_settings: Default::default(),
        buffer_device_address: false,
        allocation_sizes: gpu_allocator::AllocationSizes::default(),
    }) {
        Ok(allocator) => allocator,
        Err(e) => {
            unsafe { device.destroy_device(None) };
            destroy_instance(&instance);
            return Err(GraphicsError::InitializationFailed(format!(
                "Failed to create memory allocator: {}",
                e
            )));
        }
    };

    let caps = device::query_caps(&instance, physical_device);
    let graphics_queue = unsafe { device.get_device_queue(graphics_queue_family, 0) };
    let dynamic_rendering = ash::khr::dynamic_rendering::Device::new(&instance, &device);

    let shared = Arc::new(VulkanShared {
        _entry: entry,
        instance,
        debug_utils,
        debug_messenger,
        device,
        graphics_queue,
        graphics_queue_family,
        dynamic_rendering,
        allocator: Mutex::new(Some(allocator)),
    });

    let command_buffer = VulkanCommandBuffer::new(Arc::clone(&shared))?;

    log::info!("Vulkan backend initialized (validation: {})", validation);

    Ok((VulkanDevice { shared, caps }, command_buffer))
}

/// Resource creation half of the Vulkan backend.
pub struct VulkanDevice {
    shared: Arc<VulkanShared>,
    caps: Caps,
}

impl std::fmt::Debug for VulkanDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanDevice")
            .field("queue_family", &self.shared.graphics_queue_family)
            .finish_non_exhaustive()
    }
}

impl VulkanDevice {
    fn allocate(
        &self,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: gpu_allocator::MemoryLocation,
        linear: bool,
    ) -> GraphicsResult<gpu_allocator::vulkan::Allocation> {
        let mut allocator = self.shared.allocator.lock();
        let allocator = allocator
            .as_mut()
            .ok_or_else(|| GraphicsError::Internal("allocator already destroyed".to_string()))?;
        allocator
            .allocate(&gpu_allocator::vulkan::AllocationCreateDesc {
                name,
                requirements,
                location,
                linear,
                allocation_scheme: gpu_allocator::vulkan::AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| match e {
                gpu_allocator::AllocationError::OutOfMemory => GraphicsError::OutOfMemory,
                other => GraphicsError::ResourceCreationFailed(format!(
                    "Failed to allocate memory for '{}': {}",
                    name, other
                )),
            })
    }

    fn free(&self, allocation: Option<gpu_allocator::vulkan::Allocation>) {
        let Some(allocation) = allocation else {
            return;
        };
        if let Some(allocator) = self.shared.allocator.lock().as_mut() {
            if let Err(e) = allocator.free(allocation) {
                log::warn!("Failed to free allocation: {}", e);
            }
        }
    }
}

impl Recyclable for VulkanDevice {
    fn on_recycle(&self, resource: &GpuResource) {
        // Recycled targets are fully redrawn, so the old contents can be dropped
        if let GpuResource::Texture(texture) = resource {
            if let GpuTexture::Vulkan { layout, .. } = texture.as_ref() {
                *layout.lock() = vk::ImageLayout::UNDEFINED;
            }
        }
    }
}

impl GpuDevice for VulkanDevice {
    fn name(&self) -> &'static str {
        "Vulkan Backend (ash)"
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Vulkan
    }

    fn caps(&self) -> &Caps {
        &self.caps
    }

    fn create_buffer(&self, desc: &BufferDescriptor) -> GraphicsResult<GpuBuffer> {
        let device = &self.shared.device;
        let buffer_info = vk::BufferCreateInfo::default()
            .size(desc.size)
            .usage(convert_buffer_usage(desc.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.create_buffer(&buffer_info, None) }
            .map_err(|e| convert_result_error("Failed to create buffer", e))?;

        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
        let name = desc.label.as_deref().unwrap_or("buffer");
        // Every buffer is written from the host through its mapping
        let allocation =
            match self.allocate(name, requirements, gpu_allocator::MemoryLocation::CpuToGpu, true) {
                Ok(allocation) => allocation,
                Err(err) => {
                    unsafe { device.destroy_buffer(buffer, None) };
                    return Err(err);
                }
            };

        if let Err(e) =
            unsafe { device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) }
        {
            unsafe { device.destroy_buffer(buffer, None) };
            self.free(Some(allocation));
            return Err(convert_result_error("Failed to bind buffer memory", e));
        }

        log::trace!("VulkanDevice: created buffer {:?} ({} bytes)", name, desc.size);
        Ok(GpuBuffer::Vulkan {
            buffer,
            allocation: Mutex::new(Some(allocation)),
            size: desc.size,
        })
    }

    fn write_buffer(&self, buffer: &GpuBuffer, offset: u64, data: &[u8]) -> GraphicsResult<()> {
        let GpuBuffer::Vulkan {
            allocation, size, ..
        } = buffer
        else {
            return Err(GraphicsError::Internal(
                "write_buffer called with non-Vulkan buffer".to_string(),
            ));
        };
        if offset + data.len() as u64 > *size {
            return Err(GraphicsError::InvalidParameter(format!(
                "write of {} bytes at {} exceeds buffer size {}",
                data.len(),
                offset,
                size
            )));
        }

        let guard = allocation.lock();
        let Some(allocation) = guard.as_ref() else {
            return Err(GraphicsError::Internal(
                "Buffer allocation is None".to_string(),
            ));
        };
        let Some(mapped_ptr) = allocation.mapped_ptr() else {
            return Err(GraphicsError::Internal(
                "Buffer is not mapped for CPU access".to_string(),
            ));
        };

        // SAFETY: the range was checked against the buffer size and the
        // mapping stays valid while the allocation is alive
        unsafe {
            let dst = mapped_ptr.as_ptr().cast::<u8>().add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }
        Ok(())
    }

    fn create_texture(&self, desc: &TextureDescriptor) -> GraphicsResult<GpuTexture> {
        let device = &self.shared.device;
        let format = convert_texture_format(desc.format);

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: desc.width,
                height: desc.height,
                depth: 1,
            })
            .mip_levels(desc.mip_level_count.max(1))
            .array_layers(1)
            .samples(convert_sample_count(desc.sample_count))
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(convert_texture_usage(desc.usage, desc.format))
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.create_image(&image_info, None) }
            .map_err(|e| convert_result_error("Failed to create image", e))?;

        let requirements = unsafe { device.get_image_memory_requirements(image) };
        let name = desc.label.as_deref().unwrap_or("texture");
        let allocation =
            match self.allocate(name, requirements, gpu_allocator::MemoryLocation::GpuOnly, false) {
                Ok(allocation) => allocation,
                Err(err) => {
                    unsafe { device.destroy_image(image, None) };
                    return Err(err);
                }
            };

        if let Err(e) =
            unsafe { device.bind_image_memory(image, allocation.memory(), allocation.offset()) }
        {
            unsafe { device.destroy_image(image, None) };
            self.free(Some(allocation));
            return Err(convert_result_error("Failed to bind image memory", e));
        }

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping::default())
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect_mask(desc.format),
                base_mip_level: 0,
                level_count: desc.mip_level_count.max(1),
                base_array_layer: 0,
                layer_count: 1,
            });

        let view = match unsafe { device.create_image_view(&view_info, None) } {
            Ok(view) => view,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                self.free(Some(allocation));
                return Err(convert_result_error("Failed to create image view", e));
            }
        };

        log::trace!(
            "VulkanDevice: created texture {:?} ({}x{}, {:?})",
            name,
            desc.width,
            desc.height,
            desc.format
        );
        Ok(GpuTexture::Vulkan {
            image,
            view,
            allocation: Mutex::new(Some(allocation)),
            layout: Mutex::new(vk::ImageLayout::UNDEFINED),
            desc: desc.clone(),
        })
    }

    fn create_pipeline(&self, desc: &PipelineDescriptor<'_>) -> GraphicsResult<GpuPipeline> {
        pipeline::create_pipeline(&self.shared.device, desc)
    }

    fn destroy_resource(&self, resource: GpuResource) {
        let device = &self.shared.device;
        match resource {
            GpuResource::Buffer(buffer) => {
                if let GpuBuffer::Vulkan {
                    buffer, allocation, ..
                } = buffer.as_ref()
                {
                    unsafe { device.destroy_buffer(*buffer, None) };
                    self.free(allocation.lock().take());
                }
            }
            GpuResource::Texture(texture) => {
                if let GpuTexture::Vulkan {
                    image,
                    view,
                    allocation,
                    ..
                } = texture.as_ref()
                {
                    unsafe {
                        device.destroy_image_view(*view, None);
                        device.destroy_image(*image, None);
                    }
                    self.free(allocation.lock().take());
                }
            }
            GpuResource::Pipeline(pipeline) => {
                if let GpuPipeline::Vulkan {
                    pipeline,
                    layout,
                    set_layout,
                    ..
                } = pipeline.as_ref()
                {
                    unsafe {
                        device.destroy_pipeline(*pipeline, None);
                        device.destroy_pipeline_layout(*layout, None);
                        device.destroy_descriptor_set_layout(*set_layout, None);
                    }
                }
            }
        }
    }

    fn wait_idle(&self) {
        if let Err(e) = unsafe { self.shared.device.device_wait_idle() } {
            log::error!("vkDeviceWaitIdle failed: {:?}", e);
        }
    }
}
