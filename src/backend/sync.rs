// Synchronization primitives
//
// One frame in flight: a semaphore pair for GPU-GPU ordering and a fence
// that tells the CPU when the previous submission has retired.

use super::gpu::Gpu;
use crate::error::{BootstrapError, FrameError};
use ash::vk;
use std::sync::Arc;

/// What the in-flight fence is expected to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceState {
    /// Signaled; a wait returns immediately.
    Signaled,
    /// Submitted work will signal it.
    Pending,
    /// Unsignaled with nothing submitted. Waiting would never return.
    Reset,
}

/// Frame synchronization for the single frame in flight
pub struct FrameSync<G: Gpu> {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight: vk::Fence,
    state: FenceState,
    gpu: Arc<G>,
}

impl<G: Gpu> FrameSync<G> {
    pub fn new(gpu: Arc<G>) -> Result<Self, BootstrapError> {
        // Null handles are skipped on destroy, so a partial set cleans up
        let mut sync = Self {
            image_available: vk::Semaphore::null(),
            render_finished: vk::Semaphore::null(),
            in_flight: vk::Fence::null(),
            state: FenceState::Signaled,
            gpu,
        };

        sync.image_available = sync
            .gpu
            .create_semaphore()
            .map_err(failed_at("image available semaphore"))?;
        sync.render_finished = sync
            .gpu
            .create_semaphore()
            .map_err(failed_at("render finished semaphore"))?;
        // Start signaled so the first frame does not block
        sync.in_flight = sync
            .gpu
            .create_fence(true)
            .map_err(failed_at("in-flight fence"))?;

        Ok(sync)
    }

    #[cfg(test)]
    pub fn fence_state(&self) -> FenceState {
        self.state
    }

    /// Block until the previous submission retires, then reset the fence.
    ///
    /// A timeout leaves the fence as it was, so the next call waits again.
    pub fn wait_and_reset(&mut self, timeout_ns: u64) -> Result<(), FrameError> {
        if self.state == FenceState::Reset {
            log::trace!("In-flight fence already reset, skipping wait");
            return Ok(());
        }

        match self.gpu.wait_for_fence(self.in_flight, timeout_ns) {
            Ok(()) => self.state = FenceState::Signaled,
            Err(vk::Result::TIMEOUT) => return Err(FrameError::FenceTimeout),
            Err(e) => return Err(FrameError::FenceWait(e)),
        }

        self.gpu
            .reset_fence(self.in_flight)
            .map_err(FrameError::FenceWait)?;
        self.state = FenceState::Reset;
        Ok(())
    }

    /// Record that a submission carrying the fence was accepted.
    pub fn submitted(&mut self) {
        self.state = FenceState::Pending;
    }
}

impl<G: Gpu> Drop for FrameSync<G> {
    fn drop(&mut self) {
        self.gpu.destroy_fence(self.in_flight);
        self.gpu.destroy_semaphore(self.render_finished);
        self.gpu.destroy_semaphore(self.image_available);
    }
}

fn failed_at(stage: &'static str) -> impl Fn(vk::Result) -> BootstrapError {
    move |result| BootstrapError::FrameResources { stage, result }
}
