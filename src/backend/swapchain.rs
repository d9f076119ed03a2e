// Swapchain - Window presentation
//
// Negotiates image count and extent, creates the swapchain, and builds one
// view + framebuffer per presentable image.

use super::gpu::Gpu;
use super::probe::{QueueFamilyIndices, SurfaceSupport};
use crate::error::BootstrapError;
use ash::vk;
use std::sync::Arc;

/// Most presentable images we will hold.
pub const MAX_SWAPCHAIN_IMAGES: usize = 10;

/// `min + 1`, clamped to the surface's `[min, max]` (`max == 0` is
/// unbounded) and to `MAX_SWAPCHAIN_IMAGES`.
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> Result<u32, BootstrapError> {
    let limit = MAX_SWAPCHAIN_IMAGES as u32;
    if caps.min_image_count > limit {
        return Err(BootstrapError::ImageCountTooHigh {
            min: caps.min_image_count,
            limit: MAX_SWAPCHAIN_IMAGES,
        });
    }

    let mut image_count = caps.min_image_count + 1;
    if caps.max_image_count > 0 && image_count > caps.max_image_count {
        image_count = caps.max_image_count;
    }
    Ok(image_count.min(limit))
}

/// The surface's current extent when it is definite, otherwise the window's
/// framebuffer size clamped per axis into the supported range.
pub fn choose_extent(
    caps: &vk::SurfaceCapabilitiesKHR,
    framebuffer_size: vk::Extent2D,
) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }

    vk::Extent2D {
        width: framebuffer_size.width.clamp(
            caps.min_image_extent.width,
            caps.max_image_extent.width.max(caps.min_image_extent.width),
        ),
        height: framebuffer_size.height.clamp(
            caps.min_image_extent.height,
            caps.max_image_extent.height.max(caps.min_image_extent.height),
        ),
    }
}

/// How swapchain images are shared between the graphics and present queues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharingPlan {
    pub mode: vk::SharingMode,
    pub queue_families: Vec<u32>,
}

impl SharingPlan {
    pub fn for_families(families: QueueFamilyIndices) -> Self {
        if families.is_shared() {
            Self {
                mode: vk::SharingMode::EXCLUSIVE,
                queue_families: Vec::new(),
            }
        } else {
            Self {
                mode: vk::SharingMode::CONCURRENT,
                queue_families: families.unique(),
            }
        }
    }
}

/// Everything the swapchain is negotiated from.
pub struct SwapchainDesc<'a> {
    pub surface: vk::SurfaceKHR,
    pub support: &'a SurfaceSupport,
    pub queue_families: QueueFamilyIndices,
    pub framebuffer_size: vk::Extent2D,
    /// Previous swapchain, or null on first creation.
    pub old_swapchain: vk::SwapchainKHR,
}

/// View and framebuffer targeting one presentable image. The image itself
/// belongs to the swapchain.
#[derive(Debug, Clone, Copy)]
pub struct SwapchainImage {
    pub view: vk::ImageView,
    pub framebuffer: vk::Framebuffer,
}

pub struct Swapchain<G: Gpu> {
    pub handle: vk::SwapchainKHR,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub images: Vec<SwapchainImage>,
    gpu: Arc<G>,
}

impl<G: Gpu> Swapchain<G> {
    /// Create the swapchain and a framebuffer per image for `render_pass`.
    ///
    /// If any image fails, everything created so far is destroyed before
    /// the error is returned.
    pub fn new(
        gpu: Arc<G>,
        desc: &SwapchainDesc<'_>,
        render_pass: vk::RenderPass,
    ) -> Result<Self, BootstrapError> {
        let caps = &desc.support.capabilities;
        let format = desc.support.format;
        let image_count = choose_image_count(caps)?;
        let extent = choose_extent(caps, desc.framebuffer_size);
        let sharing = SharingPlan::for_families(desc.queue_families);

        log::info!(
            "Creating swapchain: {}x{}, {} images, {:?}, {:?}",
            extent.width,
            extent.height,
            image_count,
            desc.support.present_mode,
            sharing.mode
        );

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(desc.surface)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing.mode)
            .queue_family_indices(&sharing.queue_families)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(desc.support.present_mode)
            .clipped(true)
            .old_swapchain(desc.old_swapchain);

        let handle = gpu
            .create_swapchain(&create_info)
            .map_err(failed_at("swapchain"))?;

        // From here on, Drop cleans up whatever has been pushed.
        let mut swapchain = Self {
            handle,
            format: format.format,
            extent,
            images: Vec::new(),
            gpu,
        };

        let images = swapchain
            .gpu
            .swapchain_images(handle)
            .map_err(failed_at("swapchain images"))?;
        if images.len() > MAX_SWAPCHAIN_IMAGES {
            return Err(BootstrapError::CapabilityOverflow {
                what: "swapchain image",
                count: images.len(),
                limit: MAX_SWAPCHAIN_IMAGES,
            });
        }

        for image in images {
            let slot = swapchain.create_image_slot(image, render_pass)?;
            swapchain.images.push(slot);
        }

        log::info!("Created swapchain with {} images", swapchain.images.len());

        Ok(swapchain)
    }

    fn create_image_slot(
        &self,
        image: vk::Image,
        render_pass: vk::RenderPass,
    ) -> Result<SwapchainImage, BootstrapError> {
        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(self.format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        let view = self
            .gpu
            .create_image_view(&view_info)
            .map_err(failed_at("image view"))?;

        let attachments = [view];
        let framebuffer_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(&attachments)
            .width(self.extent.width)
            .height(self.extent.height)
            .layers(1);

        match self.gpu.create_framebuffer(&framebuffer_info) {
            Ok(framebuffer) => Ok(SwapchainImage {
                view,
                framebuffer,
            }),
            Err(e) => {
                self.gpu.destroy_image_view(view);
                Err(failed_at("framebuffer")(e))
            }
        }
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// Slot for an index returned by acquire.
    pub fn image(&self, index: u32) -> Option<&SwapchainImage> {
        self.images.get(index as usize)
    }
}

impl<G: Gpu> Drop for Swapchain<G> {
    fn drop(&mut self) {
        for slot in self.images.drain(..) {
            self.gpu.destroy_framebuffer(slot.framebuffer);
            self.gpu.destroy_image_view(slot.view);
        }
        self.gpu.destroy_swapchain(self.handle);
    }
}

fn failed_at(stage: &'static str) -> impl Fn(vk::Result) -> BootstrapError {
    move |result| BootstrapError::SwapchainCreation { stage, result }
}
