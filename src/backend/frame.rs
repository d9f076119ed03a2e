// Per-frame command recording and submission
//
// Single frame in flight: one command buffer, re-recorded every frame
// after the fence says the GPU is done with it.

use super::gpu::Gpu;
use super::swapchain::Swapchain;
use super::sync::FrameSync;
use crate::error::{BootstrapError, FrameError};
use ash::vk;
use std::sync::Arc;

const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];
const TRIANGLE_VERTICES: u32 = 3;

/// Queues a frame is submitted and presented on.
#[derive(Debug, Clone, Copy)]
pub struct FrameQueues {
    pub graphics_family: u32,
    pub graphics: vk::Queue,
    pub present: vk::Queue,
}

pub struct FrameExecutor<G: Gpu> {
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    sync: FrameSync<G>,
    queues: FrameQueues,
    fence_timeout_ns: u64,
    gpu: Arc<G>,
}

impl<G: Gpu> FrameExecutor<G> {
    pub fn new(
        gpu: Arc<G>,
        queues: FrameQueues,
        fence_timeout_ns: u64,
    ) -> Result<Self, BootstrapError> {
        let sync = FrameSync::new(gpu.clone())?;

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queues.graphics_family);

        let command_pool = gpu
            .create_command_pool(&pool_info)
            .map_err(failed_at("command pool"))?;

        let command_buffer = match gpu.allocate_command_buffer(command_pool) {
            Ok(cmd) => cmd,
            Err(result) => {
                gpu.destroy_command_pool(command_pool);
                return Err(failed_at("command buffer")(result));
            }
        };

        log::debug!(
            "Frame resources ready (fence timeout {} ns)",
            fence_timeout_ns
        );

        Ok(Self {
            command_pool,
            command_buffer,
            sync,
            queues,
            fence_timeout_ns,
            gpu,
        })
    }

    #[cfg(test)]
    pub fn sync(&self) -> &FrameSync<G> {
        &self.sync
    }

    /// Run one wait → acquire → record → submit → present cycle.
    ///
    /// Any failure abandons the rest of the cycle; the next call starts
    /// over from the wait.
    pub fn draw_frame(
        &mut self,
        swapchain: &Swapchain<G>,
        render_pass: vk::RenderPass,
        pipeline: vk::Pipeline,
    ) -> Result<(), FrameError> {
        self.sync.wait_and_reset(self.fence_timeout_ns)?;

        // No swapchain recreation, so suboptimal counts as a failed acquire
        let (image_index, suboptimal) = self
            .gpu
            .acquire_next_image(swapchain.handle, u64::MAX, self.sync.image_available)
            .map_err(FrameError::Acquire)?;
        if suboptimal {
            return Err(FrameError::Acquire(vk::Result::SUBOPTIMAL_KHR));
        }

        let framebuffer = swapchain
            .image(image_index)
            .map(|slot| slot.framebuffer)
            .ok_or(FrameError::ImageIndexOutOfRange {
                index: image_index,
                count: swapchain.len(),
            })?;

        self.record(framebuffer, swapchain.extent, render_pass, pipeline)?;

        let wait_semaphores = [self.sync.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [self.command_buffer];
        let signal_semaphores = [self.sync.render_finished];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        self.gpu
            .queue_submit(self.queues.graphics, &submit_info, self.sync.in_flight)
            .map_err(FrameError::Submit)?;
        self.sync.submitted();

        let swapchains = [swapchain.handle];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let suboptimal = self
            .gpu
            .queue_present(self.queues.present, &present_info)
            .map_err(FrameError::Present)?;
        if suboptimal {
            return Err(FrameError::Present(vk::Result::SUBOPTIMAL_KHR));
        }

        Ok(())
    }

    fn record(
        &self,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        render_pass: vk::RenderPass,
        pipeline: vk::Pipeline,
    ) -> Result<(), FrameError> {
        let cmd = self.command_buffer;

        self.gpu
            .reset_command_buffer(cmd)
            .map_err(record_failed("reset"))?;
        self.gpu
            .begin_command_buffer(cmd)
            .map_err(record_failed("begin"))?;

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: CLEAR_COLOR,
            },
        }];

        let render_pass_info = vk::RenderPassBeginInfo::builder()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clear_values);

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };

        self.gpu.cmd_begin_render_pass(cmd, &render_pass_info);
        self.gpu.cmd_bind_pipeline(cmd, pipeline);
        self.gpu.cmd_set_viewport(cmd, &viewport);
        self.gpu.cmd_set_scissor(cmd, &scissor);
        self.gpu.cmd_draw(cmd, TRIANGLE_VERTICES, 1);
        self.gpu.cmd_end_render_pass(cmd);

        self.gpu
            .end_command_buffer(cmd)
            .map_err(record_failed("end"))
    }
}

impl<G: Gpu> Drop for FrameExecutor<G> {
    fn drop(&mut self) {
        // The pool and sync objects may still be referenced by the last frame
        if let Err(e) = self.gpu.wait_idle() {
            log::warn!("wait_idle before frame teardown failed: {}", e);
        }
        self.gpu.destroy_command_pool(self.command_pool);
    }
}

fn failed_at(stage: &'static str) -> impl Fn(vk::Result) -> BootstrapError {
    move |result| BootstrapError::FrameResources { stage, result }
}

fn record_failed(step: &'static str) -> impl Fn(vk::Result) -> FrameError {
    move |result| FrameError::Record { step, result }
}
