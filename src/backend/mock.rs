// Scripted Vulkan backend for unit tests
//
// `MockGpu` hands out fake handles and tracks what a validation layer
// would: object lifetimes, fence state and command buffer state. Misuse is
// collected as violations instead of panicking so tests can assert on it.

use super::gpu::Gpu;
use super::probe::{Probe, SurfaceSupport, SURFACE_FORMAT};
use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::ffi::c_char;

#[derive(Debug, Clone, Copy)]
pub struct SwapchainRecord {
    pub min_image_count: u32,
    pub sharing_mode: vk::SharingMode,
    pub queue_family_index_count: u32,
    pub old_swapchain_null: bool,
    pub present_mode: vk::PresentModeKHR,
}

#[derive(Debug, Clone, Copy)]
pub struct RenderPassRecord {
    pub attachment_count: u32,
    pub format: vk::Format,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub initial_layout: vk::ImageLayout,
    pub final_layout: vk::ImageLayout,
    pub subpass_count: u32,
    pub dependency_count: u32,
    pub dependency_src_subpass: u32,
    pub dependency_dst_access: vk::AccessFlags,
}

#[derive(Debug, Clone)]
pub struct PipelineRecord {
    pub stage_count: u32,
    pub vertex_binding_count: u32,
    pub vertex_attribute_count: u32,
    pub topology: vk::PrimitiveTopology,
    pub dynamic_states: Vec<vk::DynamicState>,
    pub viewport_count: u32,
    pub scissor_count: u32,
    pub static_viewports_null: bool,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub samples: vk::SampleCountFlags,
    pub blend_enable: bool,
    pub src_color: vk::BlendFactor,
    pub dst_color: vk::BlendFactor,
    pub src_alpha: vk::BlendFactor,
    pub dst_alpha: vk::BlendFactor,
    pub render_pass: vk::RenderPass,
}

#[derive(Debug, Clone)]
pub struct SubmitRecord {
    pub queue: vk::Queue,
    pub wait_semaphores: Vec<vk::Semaphore>,
    pub wait_stages: Vec<vk::PipelineStageFlags>,
    pub command_buffers: Vec<vk::CommandBuffer>,
    pub signal_semaphores: Vec<vk::Semaphore>,
    pub fence: vk::Fence,
}

#[derive(Debug, Clone)]
pub struct PresentRecord {
    pub queue: vk::Queue,
    pub wait_semaphores: Vec<vk::Semaphore>,
    pub swapchains: Vec<vk::SwapchainKHR>,
    pub image_indices: Vec<u32>,
}

/// A command recorded into a command buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    BeginRenderPass {
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        area: (u32, u32),
        clear: [f32; 4],
    },
    BindPipeline(vk::Pipeline),
    /// x, y, width, height, min depth, max depth
    SetViewport([f32; 6]),
    /// x, y, width, height
    SetScissor((i32, i32, u32, u32)),
    Draw {
        vertex_count: u32,
        instance_count: u32,
    },
    EndRenderPass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmdState {
    Initial,
    Recording,
    Executable,
    Pending,
}

#[derive(Debug, Clone, Copy)]
struct CmdSlot {
    pool: u64,
    state: CmdState,
}

#[derive(Debug, Clone, Copy)]
struct FenceSlot {
    signaled: bool,
    pending: bool,
}

#[derive(Default)]
struct State {
    next_handle: u64,
    live: HashMap<&'static str, HashSet<u64>>,
    created: HashMap<&'static str, usize>,
    destroyed: HashMap<&'static str, usize>,
    calls: HashMap<&'static str, usize>,
    failures: HashMap<&'static str, (usize, vk::Result)>,
    suboptimal_calls: HashMap<&'static str, usize>,
    acquire_overrides: HashMap<usize, u32>,
    violations: Vec<String>,
    events: Vec<&'static str>,
    swapchain_image_count: usize,
    acquired: usize,
    fences: HashMap<u64, FenceSlot>,
    command_buffers: HashMap<u64, CmdSlot>,
    commands: Vec<Command>,
    last_swapchain: Option<SwapchainRecord>,
    last_render_pass: Option<RenderPassRecord>,
    last_pipeline: Option<PipelineRecord>,
    last_submit: Option<SubmitRecord>,
    last_present: Option<PresentRecord>,
}

impl State {
    /// Count a call to `op` and fail it if it is the scripted one.
    fn call(&mut self, op: &'static str) -> VkResult<()> {
        let count = self.calls.entry(op).or_insert(0);
        *count += 1;
        let count = *count;
        match self.failures.get(op) {
            Some(&(nth, result)) if nth == count => Err(result),
            _ => Ok(()),
        }
    }

    /// Whether the latest call to `op` is scripted to report suboptimal.
    fn suboptimal(&self, op: &'static str) -> bool {
        let count = self.calls.get(op).copied().unwrap_or(0);
        self.suboptimal_calls.get(op) == Some(&count)
    }

    fn handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn create(&mut self, kind: &'static str) -> u64 {
        let raw = self.handle();
        self.live.entry(kind).or_default().insert(raw);
        *self.created.entry(kind).or_insert(0) += 1;
        raw
    }

    /// Destroying a null handle is a no-op, as in Vulkan.
    fn destroy(&mut self, kind: &'static str, raw: u64) {
        if raw == 0 {
            return;
        }
        let removed = self
            .live
            .get_mut(kind)
            .map_or(false, |set| set.remove(&raw));
        if removed {
            *self.destroyed.entry(kind).or_insert(0) += 1;
        } else {
            self.violations
                .push(format!("destroy of unknown {} {:#x}", kind, raw));
        }
    }

    fn violation(&mut self, message: String) {
        self.violations.push(message);
    }

    fn cmd_state(&self, cmd: vk::CommandBuffer) -> Option<CmdState> {
        self.command_buffers.get(&cmd.as_raw()).map(|slot| slot.state)
    }

    fn set_cmd_state(&mut self, cmd: vk::CommandBuffer, state: CmdState) {
        if let Some(slot) = self.command_buffers.get_mut(&cmd.as_raw()) {
            slot.state = state;
        }
    }

    fn set_fence(&mut self, fence: vk::Fence, signaled: bool, pending: bool) {
        if let Some(slot) = self.fences.get_mut(&fence.as_raw()) {
            *slot = FenceSlot { signaled, pending };
        }
    }

    fn expect_recording(&mut self, cmd: vk::CommandBuffer, what: &str) {
        let state = self.cmd_state(cmd);
        if state != Some(CmdState::Recording) {
            self.violation(format!("{} outside recording ({:?})", what, state));
        }
    }

    fn record(&mut self, cmd: vk::CommandBuffer, what: &str, command: Command) {
        self.expect_recording(cmd, what);
        self.commands.push(command);
    }

    /// Everything submitted so far has finished executing.
    fn retire_all(&mut self) {
        for fence in self.fences.values_mut() {
            if fence.pending {
                fence.pending = false;
                fence.signaled = true;
            }
        }
        for slot in self.command_buffers.values_mut() {
            if slot.state == CmdState::Pending {
                slot.state = CmdState::Executable;
            }
        }
    }
}

/// Slice view of a Vulkan `(count, pointer)` pair.
unsafe fn slice<'a, T>(ptr: *const T, count: u32) -> &'a [T] {
    if count == 0 || ptr.is_null() {
        &[]
    } else {
        std::slice::from_raw_parts(ptr, count as usize)
    }
}

pub struct MockGpu {
    state: Mutex<State>,
}

impl MockGpu {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_handle: 0x1000,
                swapchain_image_count: 3,
                ..Default::default()
            }),
        }
    }

    /// Fail the `nth` call (1-based) to `op` with an out-of-memory error.
    pub fn fail_nth(&self, op: &'static str, nth: usize) {
        self.fail_nth_with(op, nth, vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
    }

    pub fn fail_nth_with(&self, op: &'static str, nth: usize, result: vk::Result) {
        self.state.lock().failures.insert(op, (nth, result));
    }

    /// Make the `nth` call to `op` succeed with the suboptimal flag set.
    pub fn suboptimal_nth(&self, op: &'static str, nth: usize) {
        self.state.lock().suboptimal_calls.insert(op, nth);
    }

    /// Make the `nth` acquire return `index` instead of the next image.
    pub fn acquire_index_nth(&self, nth: usize, index: u32) {
        self.state.lock().acquire_overrides.insert(nth, index);
    }

    pub fn set_swapchain_image_count(&self, count: usize) {
        self.state.lock().swapchain_image_count = count;
    }

    pub fn live(&self, kind: &str) -> usize {
        self.state.lock().live.get(kind).map_or(0, HashSet::len)
    }

    pub fn created(&self, kind: &str) -> usize {
        self.state.lock().created.get(kind).copied().unwrap_or(0)
    }

    pub fn destroyed(&self, kind: &str) -> usize {
        self.state.lock().destroyed.get(kind).copied().unwrap_or(0)
    }

    pub fn violations(&self) -> Vec<String> {
        self.state.lock().violations.clone()
    }

    /// Fence and queue operations in call order.
    pub fn events(&self) -> Vec<&'static str> {
        self.state.lock().events.clone()
    }

    pub fn clear_events(&self) {
        self.state.lock().events.clear();
    }

    /// Commands from the most recent recording.
    pub fn commands(&self) -> Vec<Command> {
        self.state.lock().commands.clone()
    }

    pub fn fence_signaled(&self, fence: vk::Fence) -> bool {
        self.state
            .lock()
            .fences
            .get(&fence.as_raw())
            .map_or(false, |slot| slot.signaled)
    }

    pub fn last_swapchain(&self) -> Option<SwapchainRecord> {
        self.state.lock().last_swapchain
    }

    pub fn last_render_pass(&self) -> Option<RenderPassRecord> {
        self.state.lock().last_render_pass
    }

    pub fn last_pipeline(&self) -> Option<PipelineRecord> {
        self.state.lock().last_pipeline.clone()
    }

    pub fn last_submit(&self) -> Option<SubmitRecord> {
        self.state.lock().last_submit.clone()
    }

    pub fn last_present(&self) -> Option<PresentRecord> {
        self.state.lock().last_present.clone()
    }
}

impl Gpu for MockGpu {
    fn create_swapchain(&self, info: &vk::SwapchainCreateInfoKHR) -> VkResult<vk::SwapchainKHR> {
        let mut s = self.state.lock();
        s.call("create_swapchain")?;
        s.last_swapchain = Some(SwapchainRecord {
            min_image_count: info.min_image_count,
            sharing_mode: info.image_sharing_mode,
            queue_family_index_count: info.queue_family_index_count,
            old_swapchain_null: info.old_swapchain == vk::SwapchainKHR::null(),
            present_mode: info.present_mode,
        });
        Ok(vk::SwapchainKHR::from_raw(s.create("swapchain")))
    }

    fn swapchain_images(&self, _swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        let mut s = self.state.lock();
        s.call("swapchain_images")?;
        let mut images = Vec::with_capacity(s.swapchain_image_count);
        for _ in 0..s.swapchain_image_count {
            images.push(vk::Image::from_raw(s.handle()));
        }
        Ok(images)
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        self.state.lock().destroy("swapchain", swapchain.as_raw());
    }

    fn create_image_view(&self, _info: &vk::ImageViewCreateInfo) -> VkResult<vk::ImageView> {
        let mut s = self.state.lock();
        s.call("create_image_view")?;
        Ok(vk::ImageView::from_raw(s.create("image_view")))
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.state.lock().destroy("image_view", view.as_raw());
    }

    fn create_framebuffer(&self, _info: &vk::FramebufferCreateInfo) -> VkResult<vk::Framebuffer> {
        let mut s = self.state.lock();
        s.call("create_framebuffer")?;
        Ok(vk::Framebuffer::from_raw(s.create("framebuffer")))
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.state.lock().destroy("framebuffer", framebuffer.as_raw());
    }

    fn create_render_pass(&self, info: &vk::RenderPassCreateInfo) -> VkResult<vk::RenderPass> {
        let mut s = self.state.lock();
        s.call("create_render_pass")?;

        let (attachments, dependencies) = unsafe {
            (
                slice(info.p_attachments, info.attachment_count),
                slice(info.p_dependencies, info.dependency_count),
            )
        };
        let attachment = attachments.first().copied().unwrap_or_default();
        let dependency = dependencies.first().copied().unwrap_or_default();
        s.last_render_pass = Some(RenderPassRecord {
            attachment_count: info.attachment_count,
            format: attachment.format,
            load_op: attachment.load_op,
            store_op: attachment.store_op,
            initial_layout: attachment.initial_layout,
            final_layout: attachment.final_layout,
            subpass_count: info.subpass_count,
            dependency_count: info.dependency_count,
            dependency_src_subpass: dependency.src_subpass,
            dependency_dst_access: dependency.dst_access_mask,
        });
        Ok(vk::RenderPass::from_raw(s.create("render_pass")))
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.state.lock().destroy("render_pass", render_pass.as_raw());
    }

    fn create_shader_module(&self, _code: &[u32]) -> VkResult<vk::ShaderModule> {
        let mut s = self.state.lock();
        s.call("create_shader_module")?;
        Ok(vk::ShaderModule::from_raw(s.create("shader_module")))
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        self.state.lock().destroy("shader_module", module.as_raw());
    }

    fn create_pipeline_layout(
        &self,
        _info: &vk::PipelineLayoutCreateInfo,
    ) -> VkResult<vk::PipelineLayout> {
        let mut s = self.state.lock();
        s.call("create_pipeline_layout")?;
        Ok(vk::PipelineLayout::from_raw(s.create("pipeline_layout")))
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        self.state.lock().destroy("pipeline_layout", layout.as_raw());
    }

    fn create_graphics_pipeline(
        &self,
        info: &vk::GraphicsPipelineCreateInfo,
    ) -> VkResult<vk::Pipeline> {
        let mut s = self.state.lock();
        s.call("create_graphics_pipeline")?;

        let record = unsafe {
            let vertex_input = &*info.p_vertex_input_state;
            let input_assembly = &*info.p_input_assembly_state;
            let viewport = &*info.p_viewport_state;
            let rasterization = &*info.p_rasterization_state;
            let multisample = &*info.p_multisample_state;
            let blend = &*info.p_color_blend_state;
            let dynamic = &*info.p_dynamic_state;
            let attachment = slice(blend.p_attachments, blend.attachment_count)
                .first()
                .copied()
                .unwrap_or_default();

            PipelineRecord {
                stage_count: info.stage_count,
                vertex_binding_count: vertex_input.vertex_binding_description_count,
                vertex_attribute_count: vertex_input.vertex_attribute_description_count,
                topology: input_assembly.topology,
                dynamic_states: slice(dynamic.p_dynamic_states, dynamic.dynamic_state_count)
                    .to_vec(),
                viewport_count: viewport.viewport_count,
                scissor_count: viewport.scissor_count,
                static_viewports_null: viewport.p_viewports.is_null()
                    && viewport.p_scissors.is_null(),
                cull_mode: rasterization.cull_mode,
                front_face: rasterization.front_face,
                samples: multisample.rasterization_samples,
                blend_enable: attachment.blend_enable == vk::TRUE,
                src_color: attachment.src_color_blend_factor,
                dst_color: attachment.dst_color_blend_factor,
                src_alpha: attachment.src_alpha_blend_factor,
                dst_alpha: attachment.dst_alpha_blend_factor,
                render_pass: info.render_pass,
            }
        };
        s.last_pipeline = Some(record);
        Ok(vk::Pipeline::from_raw(s.create("pipeline")))
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        self.state.lock().destroy("pipeline", pipeline.as_raw());
    }

    fn create_command_pool(&self, _info: &vk::CommandPoolCreateInfo) -> VkResult<vk::CommandPool> {
        let mut s = self.state.lock();
        s.call("create_command_pool")?;
        Ok(vk::CommandPool::from_raw(s.create("command_pool")))
    }

    fn allocate_command_buffer(&self, pool: vk::CommandPool) -> VkResult<vk::CommandBuffer> {
        let mut s = self.state.lock();
        s.call("allocate_command_buffer")?;
        let raw = s.handle();
        s.command_buffers.insert(
            raw,
            CmdSlot {
                pool: pool.as_raw(),
                state: CmdState::Initial,
            },
        );
        Ok(vk::CommandBuffer::from_raw(raw))
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        let mut s = self.state.lock();
        let raw = pool.as_raw();
        let pending = s
            .command_buffers
            .values()
            .any(|slot| slot.pool == raw && slot.state == CmdState::Pending);
        if pending {
            s.violation(format!("command pool {:#x} destroyed with pending work", raw));
        }
        s.command_buffers.retain(|_, slot| slot.pool != raw);
        s.destroy("command_pool", raw);
    }

    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        let mut s = self.state.lock();
        s.call("reset_command_buffer")?;
        match s.cmd_state(cmd) {
            Some(CmdState::Pending) => {
                s.violation("reset of a pending command buffer".to_string());
            }
            Some(_) => s.set_cmd_state(cmd, CmdState::Initial),
            None => s.violation(format!("reset of unknown command buffer {:?}", cmd)),
        }
        Ok(())
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        let mut s = self.state.lock();
        s.call("begin_command_buffer")?;
        match s.cmd_state(cmd) {
            Some(CmdState::Pending) => {
                s.violation("recording into a pending command buffer".to_string());
            }
            Some(_) => s.set_cmd_state(cmd, CmdState::Recording),
            None => s.violation(format!("begin on unknown command buffer {:?}", cmd)),
        }
        s.commands.clear();
        s.events.push("record");
        Ok(())
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        let mut s = self.state.lock();
        s.call("end_command_buffer")?;
        s.expect_recording(cmd, "end");
        s.set_cmd_state(cmd, CmdState::Executable);
        Ok(())
    }

    fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, info: &vk::RenderPassBeginInfo) {
        let clear = unsafe {
            slice(info.p_clear_values, info.clear_value_count)
                .first()
                .map_or([0.0; 4], |value| value.color.float32)
        };
        let area = (info.render_area.extent.width, info.render_area.extent.height);
        self.state.lock().record(
            cmd,
            "begin render pass",
            Command::BeginRenderPass {
                render_pass: info.render_pass,
                framebuffer: info.framebuffer,
                area,
                clear,
            },
        );
    }

    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline) {
        self.state
            .lock()
            .record(cmd, "bind pipeline", Command::BindPipeline(pipeline));
    }

    fn cmd_set_viewport(&self, cmd: vk::CommandBuffer, viewport: &vk::Viewport) {
        let v = viewport;
        self.state.lock().record(
            cmd,
            "set viewport",
            Command::SetViewport([v.x, v.y, v.width, v.height, v.min_depth, v.max_depth]),
        );
    }

    fn cmd_set_scissor(&self, cmd: vk::CommandBuffer, scissor: &vk::Rect2D) {
        self.state.lock().record(
            cmd,
            "set scissor",
            Command::SetScissor((
                scissor.offset.x,
                scissor.offset.y,
                scissor.extent.width,
                scissor.extent.height,
            )),
        );
    }

    fn cmd_draw(&self, cmd: vk::CommandBuffer, vertex_count: u32, instance_count: u32) {
        self.state.lock().record(
            cmd,
            "draw",
            Command::Draw {
                vertex_count,
                instance_count,
            },
        );
    }

    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        self.state
            .lock()
            .record(cmd, "end render pass", Command::EndRenderPass);
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        let mut s = self.state.lock();
        s.call("create_semaphore")?;
        Ok(vk::Semaphore::from_raw(s.create("semaphore")))
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.state.lock().destroy("semaphore", semaphore.as_raw());
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let mut s = self.state.lock();
        s.call("create_fence")?;
        let raw = s.create("fence");
        s.fences.insert(
            raw,
            FenceSlot {
                signaled,
                pending: false,
            },
        );
        Ok(vk::Fence::from_raw(raw))
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut s = self.state.lock();
        let raw = fence.as_raw();
        if let Some(slot) = s.fences.remove(&raw) {
            if slot.pending {
                s.violation(format!("fence {:#x} destroyed while pending", raw));
            }
        }
        s.destroy("fence", raw);
    }

    fn wait_for_fence(&self, fence: vk::Fence, _timeout_ns: u64) -> VkResult<()> {
        let mut s = self.state.lock();
        s.call("wait_for_fence")?;
        s.events.push("wait");

        let slot = match s.fences.get(&fence.as_raw()).copied() {
            Some(slot) => slot,
            None => {
                s.violation(format!("wait on unknown fence {:?}", fence));
                return Err(vk::Result::ERROR_DEVICE_LOST);
            }
        };

        if slot.pending {
            // Single queue: the fence's work is the oldest outstanding work
            s.retire_all();
            Ok(())
        } else if slot.signaled {
            Ok(())
        } else {
            s.violation("wait on a reset fence with no submitted work".to_string());
            Err(vk::Result::TIMEOUT)
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        let mut s = self.state.lock();
        s.call("reset_fence")?;
        s.events.push("reset");
        match s.fences.get(&fence.as_raw()).copied() {
            Some(slot) if slot.pending => {
                s.violation("reset of a pending fence".to_string());
            }
            Some(_) => s.set_fence(fence, false, false),
            None => s.violation(format!("reset of unknown fence {:?}", fence)),
        }
        Ok(())
    }

    fn acquire_next_image(
        &self,
        _swapchain: vk::SwapchainKHR,
        _timeout_ns: u64,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        let mut s = self.state.lock();
        s.call("acquire_next_image")?;
        s.events.push("acquire");
        if signal == vk::Semaphore::null() {
            s.violation("acquire without a semaphore".to_string());
        }
        let index = (s.acquired % s.swapchain_image_count.max(1)) as u32;
        s.acquired += 1;
        let index = s.acquire_overrides.get(&s.acquired).copied().unwrap_or(index);
        Ok((index, s.suboptimal("acquire_next_image")))
    }

    fn queue_submit(
        &self,
        queue: vk::Queue,
        submit: &vk::SubmitInfo,
        fence: vk::Fence,
    ) -> VkResult<()> {
        let mut s = self.state.lock();
        s.call("queue_submit")?;
        s.events.push("submit");

        let record = unsafe {
            SubmitRecord {
                queue,
                wait_semaphores: slice(submit.p_wait_semaphores, submit.wait_semaphore_count)
                    .to_vec(),
                wait_stages: slice(submit.p_wait_dst_stage_mask, submit.wait_semaphore_count)
                    .to_vec(),
                command_buffers: slice(submit.p_command_buffers, submit.command_buffer_count)
                    .to_vec(),
                signal_semaphores: slice(
                    submit.p_signal_semaphores,
                    submit.signal_semaphore_count,
                )
                .to_vec(),
                fence,
            }
        };

        for &cmd in &record.command_buffers {
            match s.cmd_state(cmd) {
                Some(CmdState::Executable) => s.set_cmd_state(cmd, CmdState::Pending),
                Some(state) => {
                    s.violation(format!("submit of command buffer in state {:?}", state));
                }
                None => s.violation(format!("submit of unknown command buffer {:?}", cmd)),
            }
        }

        if fence != vk::Fence::null() {
            match s.fences.get(&fence.as_raw()).copied() {
                Some(slot) if slot.signaled || slot.pending => {
                    s.violation("submit with a fence that was not reset".to_string());
                }
                Some(_) => s.set_fence(fence, false, true),
                None => s.violation(format!("submit with unknown fence {:?}", fence)),
            }
        }

        s.last_submit = Some(record);
        Ok(())
    }

    fn queue_present(&self, queue: vk::Queue, present: &vk::PresentInfoKHR) -> VkResult<bool> {
        let mut s = self.state.lock();
        s.call("queue_present")?;
        s.events.push("present");

        let record = unsafe {
            PresentRecord {
                queue,
                wait_semaphores: slice(present.p_wait_semaphores, present.wait_semaphore_count)
                    .to_vec(),
                swapchains: slice(present.p_swapchains, present.swapchain_count).to_vec(),
                image_indices: slice(present.p_image_indices, present.swapchain_count).to_vec(),
            }
        };
        s.last_present = Some(record);
        Ok(s.suboptimal("queue_present"))
    }

    fn wait_idle(&self) -> VkResult<()> {
        let mut s = self.state.lock();
        s.call("wait_idle")?;
        s.retire_all();
        Ok(())
    }
}

/// Scripted capability queries. Every device reports the same properties.
pub struct MockProbe {
    pub devices: Vec<vk::PhysicalDevice>,
    pub families: Vec<vk::QueueFamilyProperties>,
    /// Present support per queue family index.
    pub present: Vec<bool>,
    pub extensions: Vec<vk::ExtensionProperties>,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
    pub capabilities: vk::SurfaceCapabilitiesKHR,
}

impl MockProbe {
    /// One device whose only family does graphics and presents.
    pub fn single_queue() -> Self {
        Self {
            devices: vec![vk::PhysicalDevice::from_raw(0x100)],
            families: vec![queue_family(
                vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER,
            )],
            present: vec![true],
            extensions: vec![extension("VK_KHR_swapchain")],
            formats: vec![
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_UNORM,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
                SURFACE_FORMAT,
            ],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
            capabilities: surface_support(2, 8).capabilities,
        }
    }

    /// Two devices; graphics on family 0, presentation only on family 1.
    pub fn two_devices_split_queues() -> Self {
        Self {
            devices: vec![
                vk::PhysicalDevice::from_raw(0x100),
                vk::PhysicalDevice::from_raw(0x200),
            ],
            families: vec![
                queue_family(vk::QueueFlags::GRAPHICS),
                queue_family(vk::QueueFlags::TRANSFER),
            ],
            present: vec![false, true],
            ..Self::single_queue()
        }
    }
}

impl Probe for MockProbe {
    fn physical_devices(&self) -> VkResult<Vec<vk::PhysicalDevice>> {
        Ok(self.devices.clone())
    }

    fn queue_families(&self, _device: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties> {
        self.families.clone()
    }

    fn present_support(&self, _device: vk::PhysicalDevice, family: u32) -> VkResult<bool> {
        Ok(self.present.get(family as usize).copied().unwrap_or(false))
    }

    fn device_extensions(
        &self,
        _device: vk::PhysicalDevice,
    ) -> VkResult<Vec<vk::ExtensionProperties>> {
        Ok(self.extensions.clone())
    }

    fn surface_capabilities(
        &self,
        _device: vk::PhysicalDevice,
    ) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        Ok(self.capabilities)
    }

    fn surface_formats(&self, _device: vk::PhysicalDevice) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        Ok(self.formats.clone())
    }

    fn present_modes(&self, _device: vk::PhysicalDevice) -> VkResult<Vec<vk::PresentModeKHR>> {
        Ok(self.present_modes.clone())
    }
}

fn copy_name(dst: &mut [c_char], name: &str) {
    // Leave the trailing NUL from the zeroed default in place
    let len = name.len().min(dst.len() - 1);
    for (d, b) in dst.iter_mut().zip(name.bytes().take(len)) {
        *d = b as c_char;
    }
}

pub fn extension(name: &str) -> vk::ExtensionProperties {
    let mut props = vk::ExtensionProperties::default();
    copy_name(&mut props.extension_name, name);
    props
}

pub fn layer(name: &str) -> vk::LayerProperties {
    let mut props = vk::LayerProperties::default();
    copy_name(&mut props.layer_name, name);
    props
}

pub fn queue_family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
    vk::QueueFamilyProperties {
        queue_flags: flags,
        queue_count: 1,
        ..Default::default()
    }
}

/// FIFO, the sRGB format, an indefinite extent within 1..=4096 and the
/// given image count bounds.
pub fn surface_support(min_images: u32, max_images: u32) -> SurfaceSupport {
    SurfaceSupport {
        capabilities: vk::SurfaceCapabilitiesKHR {
            min_image_count: min_images,
            max_image_count: max_images,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            max_image_array_layers: 1,
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        },
        format: SURFACE_FORMAT,
        present_mode: vk::PresentModeKHR::FIFO,
    }
}
