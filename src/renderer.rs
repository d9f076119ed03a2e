// Renderer - owns every Vulkan object for one window
//
// Bootstrap threads each stage's output into the next. Field order is the
// reverse of creation so teardown happens in the right order on drop.

use crate::backend::shader::load_spirv;
use crate::backend::{
    FrameExecutor, FrameQueues, GraphicsContext, Pipeline, RenderPass, Swapchain, SwapchainDesc,
    SurfaceSupport,
};
use crate::config::Config;
use crate::error::{BootstrapError, FrameError};
use ash::vk;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::sync::Arc;
use winit::window::Window;

pub struct Renderer {
    frame: FrameExecutor<GraphicsContext>,
    pipeline: Pipeline<GraphicsContext>,
    swapchain: Swapchain<GraphicsContext>,
    render_pass: RenderPass<GraphicsContext>,
    context: Arc<GraphicsContext>,
}

impl Renderer {
    /// Bring up Vulkan for `window`. The first failing stage aborts the rest.
    pub fn new(window: &Window, config: &Config) -> Result<Self, BootstrapError> {
        let context = GraphicsContext::new(
            &config.window.title,
            config.debug.validation_layers,
            window.raw_display_handle(),
            window.raw_window_handle(),
        )?;

        let support = SurfaceSupport::query(
            &context.probe(),
            context.physical_device,
            config.present_mode(),
        )?;
        log::info!(
            "Surface: {:?} / {:?}, present mode {:?}",
            support.format.format,
            support.format.color_space,
            support.present_mode
        );

        let render_pass = RenderPass::new(context.clone(), support.format.format)?;

        let size = window.inner_size();
        let swapchain = Swapchain::new(
            context.clone(),
            &SwapchainDesc {
                surface: context.instance.surface,
                support: &support,
                queue_families: context.queue_families,
                framebuffer_size: vk::Extent2D {
                    width: size.width,
                    height: size.height,
                },
                old_swapchain: vk::SwapchainKHR::null(),
            },
            render_pass.handle,
        )?;

        let vertex = load_spirv(&config.shaders.vertex)?;
        let fragment = load_spirv(&config.shaders.fragment)?;
        let pipeline = Pipeline::new(context.clone(), render_pass.handle, &vertex, &fragment)?;

        let frame = FrameExecutor::new(
            context.clone(),
            FrameQueues {
                graphics_family: context.queue_families.graphics,
                graphics: context.graphics_queue,
                present: context.present_queue,
            },
            config.fence_timeout_ns(),
        )?;

        log::info!(
            "Renderer ready: {}x{}, {} swapchain images",
            swapchain.extent.width,
            swapchain.extent.height,
            swapchain.len()
        );

        Ok(Self {
            frame,
            pipeline,
            swapchain,
            render_pass,
            context,
        })
    }

    pub fn draw_frame(&mut self) -> Result<(), FrameError> {
        self.frame.draw_frame(
            &self.swapchain,
            self.render_pass.handle,
            self.pipeline.pipeline,
        )
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        // Fields drop after this, frame resources first and the context last
        log::info!(
            "Cleaning up Vulkan resources on {}",
            self.context.device_name()
        );
    }
}
