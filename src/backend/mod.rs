// Backend module - Vulkan abstraction layer
//
// Thin wrapper around ash. Bootstrap goes probe → device → swapchain →
// pipeline → frame; everything past the device talks to it through `Gpu`.

pub mod device;
pub mod frame;
pub mod gpu;
pub mod pipeline;
pub mod probe;
pub mod shader;
pub mod swapchain;
pub mod sync;

#[cfg(test)]
pub mod mock;

pub use device::GraphicsContext;
pub use frame::{FrameExecutor, FrameQueues};
pub use pipeline::{Pipeline, RenderPass};
pub use probe::SurfaceSupport;
pub use swapchain::{Swapchain, SwapchainDesc};
