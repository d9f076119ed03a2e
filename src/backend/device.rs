// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Instance creation, with validation layers on request
// - Window surface creation
// - Physical device + queue family selection
// - Logical device + graphics/present queue creation

use super::gpu::Gpu;
use super::probe::{
    bounded, ensure_extensions, ensure_layers, name_of, query_failed, select_physical_device,
    select_queue_families, AshProbe, Probe, QueueFamilyIndices,
};
use crate::error::BootstrapError;
use ash::extensions::{ext::DebugUtils, khr};
use ash::prelude::VkResult;
use ash::{vk, Entry};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::ffi::{CStr, CString};
use std::sync::Arc;

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

static QUEUE_PRIORITIES: [f32; 1] = [1.0];

/// Layers and extensions the instance will be created with.
#[derive(Debug)]
pub struct InstanceRequest {
    pub layers: Vec<&'static CStr>,
    pub extensions: Vec<&'static CStr>,
}

impl InstanceRequest {
    /// Check everything we are about to ask for against what the loader offers.
    /// Nothing is created if this fails.
    pub fn negotiate(
        enable_validation: bool,
        surface_extensions: &[&'static CStr],
        available_layers: &[vk::LayerProperties],
        available_extensions: &[vk::ExtensionProperties],
    ) -> Result<Self, BootstrapError> {
        let mut layers = Vec::new();
        let mut extensions = surface_extensions.to_vec();

        if enable_validation {
            layers.push(VALIDATION_LAYER);
            extensions.push(DebugUtils::name());
        }

        ensure_layers(&layers, available_layers)?;
        ensure_extensions(&extensions, available_extensions)?;

        Ok(Self { layers, extensions })
    }
}

/// Physical device and queue families the logical device will be built on.
#[derive(Debug, Clone, Copy)]
pub struct DevicePlan {
    pub physical_device: vk::PhysicalDevice,
    pub queue_families: QueueFamilyIndices,
}

impl DevicePlan {
    pub fn select(probe: &impl Probe) -> Result<Self, BootstrapError> {
        let physical_device = select_physical_device(probe)?;

        let families = bounded("queue family", probe.queue_families(physical_device))?;
        let queue_families =
            select_queue_families(&families, |i| probe.present_support(physical_device, i))?;

        let extensions = bounded(
            "device extension",
            probe
                .device_extensions(physical_device)
                .map_err(query_failed("device extensions"))?,
        )?;
        ensure_extensions(&required_device_extensions(), &extensions)?;

        Ok(Self {
            physical_device,
            queue_families,
        })
    }

    /// One entry per distinct family; a family must not appear twice.
    pub fn queue_create_infos(&self) -> Vec<vk::DeviceQueueCreateInfo> {
        self.queue_families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&QUEUE_PRIORITIES)
                    .build()
            })
            .collect()
    }
}

pub fn required_device_extensions() -> [&'static CStr; 1] {
    [khr::Swapchain::name()]
}

/// Instance-level objects. Dropping this destroys the surface, the debug
/// messenger and the instance, in that order.
pub struct VulkanInstance {
    pub instance: ash::Instance,
    pub surface_loader: khr::Surface,
    pub surface: vk::SurfaceKHR,
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
    entry: Entry,
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            self.surface_loader.destroy_surface(self.surface, None);
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Instance, surface, logical device and its two queues.
pub struct GraphicsContext {
    pub device: ash::Device,
    pub swapchain_loader: khr::Swapchain,
    pub physical_device: vk::PhysicalDevice,
    pub queue_families: QueueFamilyIndices,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub properties: vk::PhysicalDeviceProperties,
    // Dropped after the device (see Drop below)
    pub instance: VulkanInstance,
}

impl GraphicsContext {
    /// Create the context for a window.
    ///
    /// # Arguments
    /// * `app_name` - Application name reported to the driver
    /// * `enable_validation` - Request `VK_LAYER_KHRONOS_validation`
    /// * `display`, `window` - Raw handles of the target window
    pub fn new(
        app_name: &str,
        enable_validation: bool,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> Result<Arc<Self>, BootstrapError> {
        log::info!("Creating Vulkan context: {}", app_name);

        let entry = unsafe { Entry::load() }?;

        let mut instance = Self::create_instance(entry, app_name, enable_validation, display)?;

        if enable_validation {
            instance.debug_utils = Some(Self::setup_debug_messenger(&instance)?);
        }

        instance.surface = unsafe {
            ash_window::create_surface(&instance.entry, &instance.instance, display, window, None)
        }
        .map_err(BootstrapError::SurfaceCreation)?;

        let plan = DevicePlan::select(&AshProbe {
            instance: &instance.instance,
            surface_loader: &instance.surface_loader,
            surface: instance.surface,
        })?;

        let device = Self::create_logical_device(&instance.instance, &plan)?;

        let families = plan.queue_families;
        let (graphics_queue, present_queue) = unsafe {
            (
                device.get_device_queue(families.graphics, 0),
                device.get_device_queue(families.present, 0),
            )
        };

        let swapchain_loader = khr::Swapchain::new(&instance.instance, &device);
        let properties = unsafe {
            instance
                .instance
                .get_physical_device_properties(plan.physical_device)
        };

        log::info!("Selected GPU: {}", name_of(&properties.device_name).to_string_lossy());
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );
        log::info!(
            "Queue families: graphics {}, present {}{}",
            families.graphics,
            families.present,
            if families.is_shared() { " (shared)" } else { "" }
        );

        Ok(Arc::new(Self {
            device,
            swapchain_loader,
            physical_device: plan.physical_device,
            queue_families: families,
            graphics_queue,
            present_queue,
            properties,
            instance,
        }))
    }

    pub fn device_name(&self) -> std::borrow::Cow<'_, str> {
        name_of(&self.properties.device_name).to_string_lossy()
    }

    /// Capability queries against this context's surface
    pub fn probe(&self) -> AshProbe<'_> {
        AshProbe {
            instance: &self.instance.instance,
            surface_loader: &self.instance.surface_loader,
            surface: self.instance.surface,
        }
    }

    fn create_instance(
        entry: Entry,
        app_name: &str,
        enable_validation: bool,
        display: RawDisplayHandle,
    ) -> Result<VulkanInstance, BootstrapError> {
        let surface_extensions = ash_window::enumerate_required_extensions(display)
            .map_err(query_failed("required surface extensions"))?
            .iter()
            .map(|&name| unsafe { CStr::from_ptr(name) })
            .collect::<Vec<_>>();

        let available_layers = bounded(
            "instance layer",
            entry
                .enumerate_instance_layer_properties()
                .map_err(query_failed("instance layers"))?,
        )?;
        let available_extensions = bounded(
            "instance extension",
            entry
                .enumerate_instance_extension_properties(None)
                .map_err(query_failed("instance extensions"))?,
        )?;

        let request = InstanceRequest::negotiate(
            enable_validation,
            &surface_extensions,
            &available_layers,
            &available_extensions,
        )?;

        // Titles with interior NULs fall back to the crate name
        let app_name_cstr = CString::new(app_name)
            .unwrap_or_else(|_| CString::from(c"triangle-renderer"));

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"No engine")
            .api_version(vk::API_VERSION_1_0);

        let layer_names: Vec<_> = request.layers.iter().map(|l| l.as_ptr()).collect();
        let extension_names: Vec<_> = request.extensions.iter().map(|e| e.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_names)
            .enabled_layer_names(&layer_names);

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .map_err(BootstrapError::InstanceCreation)?;

        if enable_validation {
            log::info!("Validation layers enabled");
        }

        let surface_loader = khr::Surface::new(&entry, &instance);

        Ok(VulkanInstance {
            instance,
            surface_loader,
            surface: vk::SurfaceKHR::null(),
            debug_utils: None,
            entry,
        })
    }

    fn setup_debug_messenger(
        instance: &VulkanInstance,
    ) -> Result<(DebugUtils, vk::DebugUtilsMessengerEXT), BootstrapError> {
        let debug_utils = DebugUtils::new(&instance.entry, &instance.instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .map_err(BootstrapError::InstanceCreation)?;

        Ok((debug_utils, messenger))
    }

    fn create_logical_device(
        instance: &ash::Instance,
        plan: &DevicePlan,
    ) -> Result<ash::Device, BootstrapError> {
        let queue_create_infos = plan.queue_create_infos();
        let extensions: Vec<_> = required_device_extensions()
            .iter()
            .map(|e| e.as_ptr())
            .collect();
        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features);

        unsafe { instance.create_device(plan.physical_device, &create_info, None) }
            .map_err(BootstrapError::DeviceCreation)
    }
}

impl Drop for GraphicsContext {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan context...");

        let _ = self.wait_idle();

        // Instance-level objects go when `self.instance` drops, after this.
        unsafe {
            self.device.destroy_device(None);
        }
    }
}

impl Gpu for GraphicsContext {
    fn create_swapchain(&self, info: &vk::SwapchainCreateInfoKHR) -> VkResult<vk::SwapchainKHR> {
        unsafe { self.swapchain_loader.create_swapchain(info, None) }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        unsafe { self.swapchain_loader.get_swapchain_images(swapchain) }
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) }
    }

    fn create_image_view(&self, info: &vk::ImageViewCreateInfo) -> VkResult<vk::ImageView> {
        unsafe { self.device.create_image_view(info, None) }
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) }
    }

    fn create_framebuffer(&self, info: &vk::FramebufferCreateInfo) -> VkResult<vk::Framebuffer> {
        unsafe { self.device.create_framebuffer(info, None) }
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        unsafe { self.device.destroy_framebuffer(framebuffer, None) }
    }

    fn create_render_pass(&self, info: &vk::RenderPassCreateInfo) -> VkResult<vk::RenderPass> {
        unsafe { self.device.create_render_pass(info, None) }
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        unsafe { self.device.destroy_render_pass(render_pass, None) }
    }

    fn create_shader_module(&self, code: &[u32]) -> VkResult<vk::ShaderModule> {
        let create_info = vk::ShaderModuleCreateInfo::builder().code(code);
        unsafe { self.device.create_shader_module(&create_info, None) }
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        unsafe { self.device.destroy_shader_module(module, None) }
    }

    fn create_pipeline_layout(
        &self,
        info: &vk::PipelineLayoutCreateInfo,
    ) -> VkResult<vk::PipelineLayout> {
        unsafe { self.device.create_pipeline_layout(info, None) }
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        unsafe { self.device.destroy_pipeline_layout(layout, None) }
    }

    fn create_graphics_pipeline(
        &self,
        info: &vk::GraphicsPipelineCreateInfo,
    ) -> VkResult<vk::Pipeline> {
        let result = unsafe {
            self.device.create_graphics_pipelines(
                vk::PipelineCache::null(),
                std::slice::from_ref(info),
                None,
            )
        };

        match result {
            Ok(pipelines) => pipelines
                .first()
                .copied()
                .ok_or(vk::Result::ERROR_INITIALIZATION_FAILED),
            Err((pipelines, e)) => {
                for pipeline in pipelines.into_iter().filter(|p| *p != vk::Pipeline::null()) {
                    self.destroy_pipeline(pipeline);
                }
                Err(e)
            }
        }
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe { self.device.destroy_pipeline(pipeline, None) }
    }

    fn create_command_pool(&self, info: &vk::CommandPoolCreateInfo) -> VkResult<vk::CommandPool> {
        unsafe { self.device.create_command_pool(info, None) }
    }

    fn allocate_command_buffer(&self, pool: vk::CommandPool) -> VkResult<vk::CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = unsafe { self.device.allocate_command_buffers(&alloc_info) }?;
        buffers
            .first()
            .copied()
            .ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        unsafe { self.device.destroy_command_pool(pool, None) }
    }

    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        unsafe {
            self.device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
        }
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::builder();
        unsafe { self.device.begin_command_buffer(cmd, &begin_info) }
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        unsafe { self.device.end_command_buffer(cmd) }
    }

    fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, info: &vk::RenderPassBeginInfo) {
        unsafe {
            self.device
                .cmd_begin_render_pass(cmd, info, vk::SubpassContents::INLINE)
        }
    }

    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline) {
        unsafe {
            self.device
                .cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline)
        }
    }

    fn cmd_set_viewport(&self, cmd: vk::CommandBuffer, viewport: &vk::Viewport) {
        unsafe {
            self.device
                .cmd_set_viewport(cmd, 0, std::slice::from_ref(viewport))
        }
    }

    fn cmd_set_scissor(&self, cmd: vk::CommandBuffer, scissor: &vk::Rect2D) {
        unsafe {
            self.device
                .cmd_set_scissor(cmd, 0, std::slice::from_ref(scissor))
        }
    }

    fn cmd_draw(&self, cmd: vk::CommandBuffer, vertex_count: u32, instance_count: u32) {
        unsafe { self.device.cmd_draw(cmd, vertex_count, instance_count, 0, 0) }
    }

    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_render_pass(cmd) }
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        unsafe { self.device.create_semaphore(&semaphore_info, None) }
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) }
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let fence_info = vk::FenceCreateInfo::builder().flags(flags);
        unsafe { self.device.create_fence(&fence_info, None) }
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) }
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> VkResult<()> {
        unsafe { self.device.wait_for_fences(&[fence], true, timeout_ns) }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        unsafe { self.device.reset_fences(&[fence]) }
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        unsafe {
            self.swapchain_loader
                .acquire_next_image(swapchain, timeout_ns, signal, vk::Fence::null())
        }
    }

    fn queue_submit(
        &self,
        queue: vk::Queue,
        submit: &vk::SubmitInfo,
        fence: vk::Fence,
    ) -> VkResult<()> {
        unsafe {
            self.device
                .queue_submit(queue, std::slice::from_ref(submit), fence)
        }
    }

    fn queue_present(&self, queue: vk::Queue, present: &vk::PresentInfoKHR) -> VkResult<bool> {
        unsafe { self.swapchain_loader.queue_present(queue, present) }
    }

    fn wait_idle(&self) -> VkResult<()> {
        unsafe { self.device.device_wait_idle() }
    }
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}
