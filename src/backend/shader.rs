// Shader module loading
//
// Vulkan consumes SPIR-V bytecode. The blobs are pre-built by build.rs and
// treated as opaque here; validating them is the driver's job.

use super::gpu::Gpu;
use crate::error::BootstrapError;
use ash::prelude::VkResult;
use ash::vk;
use std::io::Cursor;
use std::path::Path;

/// Read a SPIR-V file into 4-byte words.
///
/// Fails if the file is unreadable or its length is not a multiple of 4.
pub fn load_spirv(path: &Path) -> Result<Vec<u32>, BootstrapError> {
    let load_err = |source| BootstrapError::ShaderLoad {
        path: path.to_path_buf(),
        source,
    };

    let bytes = std::fs::read(path).map_err(load_err)?;
    let words = ash::util::read_spv(&mut Cursor::new(bytes)).map_err(load_err)?;

    log::debug!("Loaded shader {:?} ({} words)", path, words.len());
    Ok(words)
}

/// A shader module that lives only as long as this guard.
pub struct ShaderModule<'a, G: Gpu> {
    gpu: &'a G,
    pub handle: vk::ShaderModule,
}

impl<'a, G: Gpu> ShaderModule<'a, G> {
    pub fn new(gpu: &'a G, code: &[u32]) -> VkResult<Self> {
        let handle = gpu.create_shader_module(code)?;
        Ok(Self { gpu, handle })
    }
}

impl<G: Gpu> Drop for ShaderModule<'_, G> {
    fn drop(&mut self) {
        self.gpu.destroy_shader_module(self.handle);
    }
}
