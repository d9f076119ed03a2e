// Capability queries and the selection policies built on them
//
// Every query here is read-only. Selection functions take plain data (or a
// `Probe`) so they behave identically against a real driver and a scripted
// one in tests.

use crate::error::BootstrapError;
use ash::prelude::VkResult;
use ash::vk;
use std::ffi::{c_char, CStr};

/// Upper bound on any single enumeration. Storage is sized to the reported
/// count; this only caps worst-case memory.
pub const MAX_ENUMERATED: usize = 256;

/// The only surface format we render to.
pub const SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Read-only queries against a physical device and the target surface.
pub trait Probe {
    fn physical_devices(&self) -> VkResult<Vec<vk::PhysicalDevice>>;
    fn queue_families(&self, device: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties>;
    fn present_support(&self, device: vk::PhysicalDevice, family: u32) -> VkResult<bool>;
    fn device_extensions(&self, device: vk::PhysicalDevice)
        -> VkResult<Vec<vk::ExtensionProperties>>;
    fn surface_capabilities(
        &self,
        device: vk::PhysicalDevice,
    ) -> VkResult<vk::SurfaceCapabilitiesKHR>;
    fn surface_formats(&self, device: vk::PhysicalDevice) -> VkResult<Vec<vk::SurfaceFormatKHR>>;
    fn present_modes(&self, device: vk::PhysicalDevice) -> VkResult<Vec<vk::PresentModeKHR>>;
}

/// `Probe` backed by a live instance and surface.
pub struct AshProbe<'a> {
    pub instance: &'a ash::Instance,
    pub surface_loader: &'a ash::extensions::khr::Surface,
    pub surface: vk::SurfaceKHR,
}

impl Probe for AshProbe<'_> {
    fn physical_devices(&self) -> VkResult<Vec<vk::PhysicalDevice>> {
        unsafe { self.instance.enumerate_physical_devices() }
    }

    fn queue_families(&self, device: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties> {
        unsafe { self.instance.get_physical_device_queue_family_properties(device) }
    }

    fn present_support(&self, device: vk::PhysicalDevice, family: u32) -> VkResult<bool> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_support(device, family, self.surface)
        }
    }

    fn device_extensions(
        &self,
        device: vk::PhysicalDevice,
    ) -> VkResult<Vec<vk::ExtensionProperties>> {
        unsafe { self.instance.enumerate_device_extension_properties(device) }
    }

    fn surface_capabilities(
        &self,
        device: vk::PhysicalDevice,
    ) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(device, self.surface)
        }
    }

    fn surface_formats(&self, device: vk::PhysicalDevice) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(device, self.surface)
        }
    }

    fn present_modes(&self, device: vk::PhysicalDevice) -> VkResult<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(device, self.surface)
        }
    }
}

/// Graphics and present queue families. Equal indices mean one shared queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilyIndices {
    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Distinct families, graphics first. One device queue is created per entry.
    pub fn unique(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// Negotiated surface properties for one physical device.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
}

impl SurfaceSupport {
    pub fn query(
        probe: &impl Probe,
        device: vk::PhysicalDevice,
        preferred_present_mode: vk::PresentModeKHR,
    ) -> Result<Self, BootstrapError> {
        let formats = bounded(
            "surface format",
            probe
                .surface_formats(device)
                .map_err(query_failed("surface formats"))?,
        )?;
        let present_modes = bounded(
            "present mode",
            probe
                .present_modes(device)
                .map_err(query_failed("present modes"))?,
        )?;
        let capabilities = probe
            .surface_capabilities(device)
            .map_err(query_failed("surface capabilities"))?;

        let format = select_surface_format(&formats)?;
        let present_mode = select_present_mode(&present_modes, preferred_present_mode)?;

        Ok(Self {
            capabilities,
            format,
            present_mode,
        })
    }
}

/// Reject enumerations larger than `MAX_ENUMERATED`.
pub fn bounded<T>(what: &'static str, items: Vec<T>) -> Result<Vec<T>, BootstrapError> {
    if items.len() > MAX_ENUMERATED {
        return Err(BootstrapError::CapabilityOverflow {
            what,
            count: items.len(),
            limit: MAX_ENUMERATED,
        });
    }
    Ok(items)
}

pub fn query_failed(what: &'static str) -> impl Fn(vk::Result) -> BootstrapError {
    move |result| BootstrapError::Query { what, result }
}

/// First enumerated device, no scoring.
pub fn select_physical_device(probe: &impl Probe) -> Result<vk::PhysicalDevice, BootstrapError> {
    let devices = bounded(
        "physical device",
        probe
            .physical_devices()
            .map_err(query_failed("physical devices"))?,
    )?;
    devices
        .first()
        .copied()
        .ok_or(BootstrapError::NoPhysicalDevice)
}

/// Two independent scans: first graphics-capable family, first family that
/// can present to the surface.
pub fn select_queue_families(
    families: &[vk::QueueFamilyProperties],
    mut present_support: impl FnMut(u32) -> VkResult<bool>,
) -> Result<QueueFamilyIndices, BootstrapError> {
    let graphics = families
        .iter()
        .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|index| index as u32);

    let mut present = None;
    for index in 0..families.len() as u32 {
        if present_support(index).map_err(query_failed("surface support"))? {
            present = Some(index);
            break;
        }
    }

    match (graphics, present) {
        (Some(graphics), Some(present)) => Ok(QueueFamilyIndices { graphics, present }),
        (graphics, present) => Err(BootstrapError::NoSuitableQueueFamily { graphics, present }),
    }
}

/// Exact match on `SURFACE_FORMAT`; there is no fallback.
pub fn select_surface_format(
    formats: &[vk::SurfaceFormatKHR],
) -> Result<vk::SurfaceFormatKHR, BootstrapError> {
    formats
        .iter()
        .copied()
        .find(|f| f.format == SURFACE_FORMAT.format && f.color_space == SURFACE_FORMAT.color_space)
        .ok_or(BootstrapError::NoSuitableSurfaceFormat)
}

/// Preferred mode if listed, FIFO otherwise (FIFO support is mandatory).
pub fn select_present_mode(
    modes: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> Result<vk::PresentModeKHR, BootstrapError> {
    if modes.is_empty() {
        return Err(BootstrapError::NoPresentModes);
    }
    if modes.contains(&preferred) {
        Ok(preferred)
    } else {
        log::warn!("Present mode {:?} unavailable, using FIFO", preferred);
        Ok(vk::PresentModeKHR::FIFO)
    }
}

/// Every requested layer must match an available layer name exactly.
pub fn ensure_layers(
    requested: &[&CStr],
    available: &[vk::LayerProperties],
) -> Result<(), BootstrapError> {
    for &layer in requested {
        if !available.iter().any(|p| name_of(&p.layer_name) == layer) {
            return Err(BootstrapError::MissingRequiredLayer(
                layer.to_string_lossy().into_owned(),
            ));
        }
    }
    Ok(())
}

/// Every required extension must be listed by the instance or device.
pub fn ensure_extensions(
    required: &[&CStr],
    available: &[vk::ExtensionProperties],
) -> Result<(), BootstrapError> {
    for &extension in required {
        if !available
            .iter()
            .any(|p| name_of(&p.extension_name) == extension)
        {
            return Err(BootstrapError::MissingRequiredExtension(
                extension.to_string_lossy().into_owned(),
            ));
        }
    }
    Ok(())
}

/// Name fields are fixed arrays, NUL-terminated by the driver.
pub fn name_of(raw: &[c_char]) -> &CStr {
    unsafe { CStr::from_ptr(raw.as_ptr()) }
}
