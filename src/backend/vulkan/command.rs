//! Vulkan command recording and submission.

use std::sync::Arc;

use ash::vk;

use crate::backend::command::{Bindable, CommandBuffer, Drawable, RenderPassInfo};
use crate::backend::{GpuBuffer, GpuPipeline, GpuTexture};
use crate::error::{GraphicsError, GraphicsResult};
use crate::types::{IndexType, LoadOp, Rect2i};

use super::VulkanShared;
use super::conversion::{
    aspect_mask, convert_index_type, convert_load_op, convert_result_error, convert_store_op,
};

/// Uniform descriptor sets per descriptor pool.
const MAX_DESCRIPTOR_SETS: u32 = 4096;

fn create_descriptor_pool(device: &ash::Device) -> GraphicsResult<vk::DescriptorPool> {
    let pool_sizes = [vk::DescriptorPoolSize {
        ty: vk::DescriptorType::UNIFORM_BUFFER,
        descriptor_count: MAX_DESCRIPTOR_SETS,
    }];
    let info = vk::DescriptorPoolCreateInfo::default()
        .max_sets(MAX_DESCRIPTOR_SETS)
        .pool_sizes(&pool_sizes);
    unsafe { device.create_descriptor_pool(&info, None) }
        .map_err(|e| convert_result_error("Failed to create descriptor pool", e))
}

/// Access and stage scope of an image in `layout`, for barriers.
fn layout_scope(layout: vk::ImageLayout) -> (vk::AccessFlags, vk::PipelineStageFlags) {
    match layout {
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => (
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ),
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL => (
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
        ),
        _ => (vk::AccessFlags::empty(), vk::PipelineStageFlags::TOP_OF_PIPE),
    }
}

/// A primary command buffer recording against one queue.
///
/// Not shared between threads: the render thread records, submits and waits.
/// Each uniform binding allocates a descriptor set. When a pool runs dry the
/// next one in the chain is used, created on demand; all pools are reset
/// when recording restarts.
pub struct VulkanCommandBuffer {
    shared: Arc<VulkanShared>,
    command_pool: vk::CommandPool,
    cmd: vk::CommandBuffer,
    fence: vk::Fence,
    descriptor_pools: Vec<vk::DescriptorPool>,
    active_pool: usize,
    recording: bool,
    has_work: bool,
    bound_layout: Option<(vk::PipelineLayout, vk::DescriptorSetLayout)>,
    render_area: vk::Rect2D,
}

impl std::fmt::Debug for VulkanCommandBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanCommandBuffer")
            .field("recording", &self.recording)
            .finish_non_exhaustive()
    }
}

impl VulkanCommandBuffer {
    pub(super) fn new(shared: Arc<VulkanShared>) -> GraphicsResult<Self> {
        let device = &shared.device;

        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(shared.graphics_queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = unsafe { device.create_command_pool(&pool_info, None) }.map_err(|e| {
            GraphicsError::InitializationFailed(format!("Failed to create command pool: {:?}", e))
        })?;

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let cmd = match unsafe { device.allocate_command_buffers(&alloc_info) } {
            Ok(buffers) => buffers[0],
            Err(e) => {
                unsafe { device.destroy_command_pool(command_pool, None) };
                return Err(GraphicsError::InitializationFailed(format!(
                    "Failed to allocate command buffer: {:?}",
                    e
                )));
            }
        };

        let fence = match unsafe { device.create_fence(&vk::FenceCreateInfo::default(), None) } {
            Ok(fence) => fence,
            Err(e) => {
                unsafe { device.destroy_command_pool(command_pool, None) };
                return Err(GraphicsError::InitializationFailed(format!(
                    "Failed to create fence: {:?}",
                    e
                )));
            }
        };

        let descriptor_pool = match create_descriptor_pool(device) {
            Ok(pool) => pool,
            Err(e) => {
                unsafe {
                    device.destroy_fence(fence, None);
                    device.destroy_command_pool(command_pool, None);
                }
                return Err(GraphicsError::InitializationFailed(e.to_string()));
            }
        };

        Ok(Self {
            shared,
            command_pool,
            cmd,
            fence,
            descriptor_pools: vec![descriptor_pool],
            active_pool: 0,
            recording: false,
            has_work: false,
            bound_layout: None,
            render_area: vk::Rect2D::default(),
        })
    }

    fn device(&self) -> &ash::Device {
        &self.shared.device
    }

    /// Move `texture` to `new_layout`, discarding contents when `discard`.
    fn transition(&self, texture: &GpuTexture, new_layout: vk::ImageLayout, discard: bool) {
        let GpuTexture::Vulkan {
            image,
            layout,
            desc,
            ..
        } = texture
        else {
            return;
        };
        let mut current = layout.lock();
        let old_layout = if discard {
            vk::ImageLayout::UNDEFINED
        } else {
            *current
        };
        if old_layout == new_layout {
            return;
        }
        let (src_access, src_stage) = layout_scope(*current);
        let (dst_access, dst_stage) = layout_scope(new_layout);

        let barrier = vk::ImageMemoryBarrier::default()
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(*image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect_mask(desc.format),
                base_mip_level: 0,
                level_count: vk::REMAINING_MIP_LEVELS,
                base_array_layer: 0,
                layer_count: vk::REMAINING_ARRAY_LAYERS,
            })
            .src_access_mask(src_access)
            .dst_access_mask(dst_access);

        unsafe {
            self.device().cmd_pipeline_barrier(
                self.cmd,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
        *current = new_layout;
    }

    /// Allocate a descriptor set for `set_layout`, moving on to the next pool
    /// in the chain when the active one is exhausted.
    fn allocate_descriptor_set(&mut self, set_layout: vk::DescriptorSetLayout) -> Option<vk::DescriptorSet> {
        let set_layouts = [set_layout];
        let mut advanced = false;
        loop {
            let alloc_info = vk::DescriptorSetAllocateInfo::default()
                .descriptor_pool(self.descriptor_pools[self.active_pool])
                .set_layouts(&set_layouts);
            match unsafe { self.device().allocate_descriptor_sets(&alloc_info) } {
                Ok(sets) => return sets.first().copied(),
                Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL)
                    if !advanced =>
                {
                    advanced = true;
                    if self.active_pool + 1 == self.descriptor_pools.len() {
                        match create_descriptor_pool(self.device()) {
                            Ok(pool) => self.descriptor_pools.push(pool),
                            Err(err) => {
                                log::error!("VulkanCommandBuffer: {err}");
                                return None;
                            }
                        }
                        log::debug!(
                            "VulkanCommandBuffer: descriptor pool chain grew to {}",
                            self.descriptor_pools.len()
                        );
                    }
                    self.active_pool += 1;
                }
                Err(e) => {
                    log::error!("VulkanCommandBuffer: failed to allocate descriptor set: {:?}", e);
                    return None;
                }
            }
        }
    }

    fn full_scissor(&self) {
        unsafe {
            self.device()
                .cmd_set_scissor(self.cmd, 0, &[self.render_area]);
        }
    }
}

impl Bindable for VulkanCommandBuffer {
    fn bind_pipeline(&mut self, pipeline: &GpuPipeline) -> bool {
        let GpuPipeline::Vulkan {
            pipeline,
            layout,
            set_layout,
            ..
        } = pipeline
        else {
            return false;
        };
        unsafe {
            self.device()
                .cmd_bind_pipeline(self.cmd, vk::PipelineBindPoint::GRAPHICS, *pipeline);
        }
        self.bound_layout = Some((*layout, *set_layout));
        // Scissor is dynamic state; ops without a clip expect the full target
        self.full_scissor();
        true
    }

    fn bind_index_buffer(&mut self, index_type: IndexType, buffer: &GpuBuffer, offset: u64) {
        if let GpuBuffer::Vulkan { buffer, .. } = buffer {
            unsafe {
                self.device().cmd_bind_index_buffer(
                    self.cmd,
                    *buffer,
                    offset,
                    convert_index_type(index_type),
                );
            }
        }
    }

    fn bind_vertex_buffer(&mut self, binding: u32, buffer: &GpuBuffer, offset: u64) {
        if let GpuBuffer::Vulkan { buffer, .. } = buffer {
            unsafe {
                self.device()
                    .cmd_bind_vertex_buffers(self.cmd, binding, &[*buffer], &[offset]);
            }
        }
    }

    fn bind_uniform_buffer(&mut self, binding: u32, buffer: &GpuBuffer, offset: u64, size: u64) -> bool {
        let GpuBuffer::Vulkan { buffer, .. } = buffer else {
            return false;
        };
        let Some((layout, set_layout)) = self.bound_layout else {
            log::warn!("VulkanCommandBuffer: uniform bound without a pipeline");
            return false;
        };
        let Some(set) = self.allocate_descriptor_set(set_layout) else {
            return false;
        };

        let buffer_infos = [vk::DescriptorBufferInfo::default()
            .buffer(*buffer)
            .offset(offset)
            .range(size)];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(binding)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(&buffer_infos);

        unsafe {
            self.device().update_descriptor_sets(&[write], &[]);
            self.device().cmd_bind_descriptor_sets(
                self.cmd,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                &[set],
                &[],
            );
        }
        true
    }

    fn set_scissor(&mut self, rect: Rect2i) {
        let scissor = vk::Rect2D {
            offset: vk::Offset2D {
                x: rect.left,
                y: rect.top,
            },
            extent: vk::Extent2D {
                width: rect.width().max(0) as u32,
                height: rect.height().max(0) as u32,
            },
        };
        unsafe {
            self.device().cmd_set_scissor(self.cmd, 0, &[scissor]);
        }
    }
}

impl Drawable for VulkanCommandBuffer {
    fn draw_instanced(
        &mut self,
        instance_count: u32,
        base_instance: u32,
        vertex_count: u32,
        base_vertex: u32,
    ) {
        unsafe {
            self.device().cmd_draw(
                self.cmd,
                vertex_count,
                instance_count,
                base_vertex,
                base_instance,
            );
        }
    }

    fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        base_index: u32,
        instance_count: u32,
        base_instance: u32,
        base_vertex: u32,
    ) {
        unsafe {
            self.device().cmd_draw_indexed(
                self.cmd,
                index_count,
                instance_count,
                base_index,
                base_vertex as i32,
                base_instance,
            );
        }
    }
}

impl CommandBuffer for VulkanCommandBuffer {
    fn begin(&mut self) -> GraphicsResult<()> {
        if self.recording {
            return Err(GraphicsError::Internal(
                "command buffer is already recording".to_string(),
            ));
        }
        let device = &self.shared.device;
        unsafe {
            device
                .reset_command_buffer(self.cmd, vk::CommandBufferResetFlags::empty())
                .map_err(|e| convert_result_error("Failed to reset command buffer", e))?;
            for &pool in &self.descriptor_pools {
                device
                    .reset_descriptor_pool(pool, vk::DescriptorPoolResetFlags::empty())
                    .map_err(|e| convert_result_error("Failed to reset descriptor pool", e))?;
            }
            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device
                .begin_command_buffer(self.cmd, &begin_info)
                .map_err(|e| convert_result_error("Failed to begin command buffer", e))?;
        }
        self.active_pool = 0;
        self.recording = true;
        self.has_work = false;
        Ok(())
    }

    fn end(&mut self) -> GraphicsResult<()> {
        if !self.recording {
            return Ok(());
        }
        self.recording = false;
        self.bound_layout = None;
        unsafe { self.shared.device.end_command_buffer(self.cmd) }
            .map_err(|e| convert_result_error("Failed to end command buffer", e))
    }

    fn is_recording(&self) -> bool {
        self.recording
    }

    fn begin_render_pass(
        &mut self,
        target: &GpuTexture,
        stencil: Option<&GpuTexture>,
        info: &RenderPassInfo,
    ) -> bool {
        let GpuTexture::Vulkan { view, desc, .. } = target else {
            return false;
        };
        if !self.recording || desc.format.is_depth_stencil() {
            return false;
        }
        let stencil_view = match stencil.filter(|_| info.uses_stencil()) {
            Some(GpuTexture::Vulkan {
                view,
                desc: stencil_desc,
                ..
            }) if stencil_desc.format.has_stencil() => Some(*view),
            None if !info.uses_stencil() => None,
            _ => {
                log::warn!("VulkanCommandBuffer: stencil ops without a Vulkan stencil attachment");
                return false;
            }
        };
        let view = *view;
        let extent = vk::Extent2D {
            width: desc.width,
            height: desc.height,
        };

        self.transition(
            target,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            info.color_load != LoadOp::Load,
        );
        if let (Some(stencil), Some(_)) = (stencil, stencil_view) {
            self.transition(
                stencil,
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                info.stencil_load != LoadOp::Load,
            );
        }

        let color_attachments = [vk::RenderingAttachmentInfo::default()
            .image_view(view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(convert_load_op(info.color_load))
            .store_op(convert_store_op(info.color_store))
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: info.clear_color,
                },
            })];

        self.render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        let stencil_attachment = stencil_view.map(|view| {
            vk::RenderingAttachmentInfo::default()
                .image_view(view)
                .image_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                .load_op(convert_load_op(info.stencil_load))
                .store_op(convert_store_op(info.stencil_store))
                .clear_value(vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue {
                        depth: 0.0,
                        stencil: info.clear_stencil,
                    },
                })
        });
        let mut rendering_info = vk::RenderingInfo::default()
            .render_area(self.render_area)
            .layer_count(1)
            .color_attachments(&color_attachments);
        if let Some(stencil_attachment) = &stencil_attachment {
            rendering_info = rendering_info.stencil_attachment(stencil_attachment);
        }

        // Positive height: NDC -1 lands on image row 0, as in GL
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };

        unsafe {
            self.shared
                .dynamic_rendering
                .cmd_begin_rendering(self.cmd, &rendering_info);
            self.device().cmd_set_viewport(self.cmd, 0, &[viewport]);
        }
        self.full_scissor();
        self.has_work = true;
        log::trace!(
            "VulkanCommandBuffer: render pass on {}x{} ({:?})",
            extent.width,
            extent.height,
            info.color_load
        );
        true
    }

    fn end_render_pass(&mut self, _target: &GpuTexture, _stencil: Option<&GpuTexture>, _info: &RenderPassInfo) {
        unsafe {
            self.shared.dynamic_rendering.cmd_end_rendering(self.cmd);
        }
        self.bound_layout = None;
    }

    fn submit(&mut self) -> GraphicsResult<()> {
        self.end()?;
        if !self.has_work {
            return Ok(());
        }
        self.has_work = false;

        let device = &self.shared.device;
        let command_buffers = [self.cmd];
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
        unsafe {
            device
                .queue_submit(self.shared.graphics_queue, &[submit_info], self.fence)
                .map_err(|e| convert_result_error("Failed to submit command buffer", e))?;
            device
                .wait_for_fences(&[self.fence], true, u64::MAX)
                .map_err(|e| convert_result_error("Failed to wait for fence", e))?;
            device
                .reset_fences(&[self.fence])
                .map_err(|e| convert_result_error("Failed to reset fence", e))?;
        }
        Ok(())
    }
}

impl Drop for VulkanCommandBuffer {
    fn drop(&mut self) {
        let device = &self.shared.device;
        unsafe {
            let _ = device.device_wait_idle();
            for &pool in &self.descriptor_pools {
                device.destroy_descriptor_pool(pool, None);
            }
            device.destroy_fence(self.fence, None);
            device.destroy_command_pool(self.command_pool, None);
        }
    }
}
