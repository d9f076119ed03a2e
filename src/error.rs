// Error types for bootstrap and per-frame rendering
//
// Bootstrap errors are fatal: the first failing stage aborts the rest.
// Frame errors are reported to the host loop, which logs and keeps going.

use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

/// Failure while bringing up the rendering context.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Failed to load Vulkan library: {0}")]
    Loading(#[from] ash::LoadingError),

    #[error("{what} enumeration reported {count} entries (limit {limit})")]
    CapabilityOverflow {
        what: &'static str,
        count: usize,
        limit: usize,
    },

    #[error("Required layer not available: {0}")]
    MissingRequiredLayer(String),

    #[error("Required extension not available: {0}")]
    MissingRequiredExtension(String),

    #[error("Querying {what} failed: {result}")]
    Query {
        what: &'static str,
        result: vk::Result,
    },

    #[error("No Vulkan-capable GPU found")]
    NoPhysicalDevice,

    #[error("No suitable queue family (graphics: {graphics:?}, present: {present:?})")]
    NoSuitableQueueFamily {
        graphics: Option<u32>,
        present: Option<u32>,
    },

    #[error("Surface does not support B8G8R8A8_SRGB / SRGB_NONLINEAR")]
    NoSuitableSurfaceFormat,

    #[error("Surface reports no present modes")]
    NoPresentModes,

    #[error("Failed to create Vulkan instance: {0}")]
    InstanceCreation(vk::Result),

    #[error("Failed to create window surface: {0}")]
    SurfaceCreation(vk::Result),

    #[error("Failed to create logical device: {0}")]
    DeviceCreation(vk::Result),

    #[error("Surface needs at least {min} swapchain images (limit {limit})")]
    ImageCountTooHigh { min: u32, limit: usize },

    #[error("Swapchain creation failed at {stage}: {result}")]
    SwapchainCreation {
        stage: &'static str,
        result: vk::Result,
    },

    #[error("Failed to load shader {path:?}: {source}")]
    ShaderLoad {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Pipeline creation failed at {stage}: {result}")]
    PipelineCreation {
        stage: &'static str,
        result: vk::Result,
    },

    #[error("Failed to create frame resources at {stage}: {result}")]
    FrameResources {
        stage: &'static str,
        result: vk::Result,
    },
}

/// Non-fatal failure of one acquire → record → submit → present cycle.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Timed out waiting for the in-flight fence")]
    FenceTimeout,

    #[error("Waiting for the in-flight fence failed: {0}")]
    FenceWait(vk::Result),

    #[error("Failed to acquire swapchain image: {0}")]
    Acquire(vk::Result),

    #[error("Acquired image {index} but the swapchain has {count} images")]
    ImageIndexOutOfRange { index: u32, count: usize },

    #[error("Command recording failed at {step}: {result}")]
    Record {
        step: &'static str,
        result: vk::Result,
    },

    #[error("Queue submit failed: {0}")]
    Submit(vk::Result),

    #[error("Present failed: {0}")]
    Present(vk::Result),
}
