use ash::vk;
use vk_mem::Alloc;

use crate::foundation::debug_messenger::DebugType;
use crate::foundation::vmem_allocator::GfxAliasingHeap;
use crate::gfx::Gfx;

/// 创建 image 所需的信息
#[derive(Clone, Debug)]
pub struct GfxImageCreateInfo {
    pub image_type: vk::ImageType,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub samples: vk::SampleCountFlags,
    pub tiling: vk::ImageTiling,
    pub usage: vk::ImageUsageFlags,
}

impl GfxImageCreateInfo {
    pub fn new_image_2d_info(extent: vk::Extent2D, format: vk::Format, usage: vk::ImageUsageFlags) -> Self {
        Self {
            image_type: vk::ImageType::TYPE_2D,
            format,
            extent: vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
            usage,
        }
    }

    pub fn to_vk_info(&self) -> vk::ImageCreateInfo<'static> {
        vk::ImageCreateInfo::default()
            .image_type(self.image_type)
            .format(self.format)
            .extent(self.extent)
            .mip_levels(self.mip_levels)
            .array_layers(self.array_layers)
            .samples(self.samples)
            .tiling(self.tiling)
            .usage(self.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
    }
}

/// image 封装
///
/// 显存来源有两种：
/// - 独占：通过 vk-mem 分配专属显存
/// - 别名：绑定到 [`GfxAliasingHeap`] 上，与其他资源共享显存
pub struct GfxImage {
    handle: vk::Image,
    /// None 表示显存来自 aliasing heap，销毁时只销毁 image 本身
    allocation: Option<vk_mem::Allocation>,

    format: vk::Format,
    extent: vk::Extent3D,
    usage: vk::ImageUsageFlags,

    debug_name: String,
}
impl DebugType for GfxImage {
    fn debug_type_name() -> &'static str {
        "GfxImage"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
impl Drop for GfxImage {
    fn drop(&mut self) {
        unsafe {
            match &mut self.allocation {
                Some(allocation) => {
                    Gfx::get().allocator().destroy_image(self.handle, allocation);
                }
                None => {
                    Gfx::get().gfx_device().destroy_image(self.handle, None);
                }
            }
        }
    }
}
// init & destroy
impl GfxImage {
    /// 独占显存的 image，优先使用 device memory
    pub fn new(create_info: &GfxImageCreateInfo, alloc_ci: &vk_mem::AllocationCreateInfo, name: impl AsRef<str>) -> Self {
        let image_ci = create_info.to_vk_info();
        let (image, allocation) = unsafe { Gfx::get().allocator().create_image(&image_ci, alloc_ci).unwrap() };

        Gfx::get().gfx_device().set_object_debug_name(image, format!("Image::{}", name.as_ref()));
        Self {
            handle: image,
            allocation: Some(allocation),
            format: create_info.format,
            extent: create_info.extent,
            usage: create_info.usage,
            debug_name: name.as_ref().to_string(),
        }
    }

    /// 未绑定显存的 image，之后必须通过 [`Self::bind_to_heap`] 绑定到 aliasing heap
    pub fn new_for_aliasing(create_info: &GfxImageCreateInfo, name: impl AsRef<str>) -> Self {
        let image_ci = create_info.to_vk_info();
        let image = unsafe { Gfx::get().gfx_device().create_image(&image_ci, None).unwrap() };

        Gfx::get().gfx_device().set_object_debug_name(image, format!("Image::{}", name.as_ref()));
        Self {
            handle: image,
            allocation: None,
            format: create_info.format,
            extent: create_info.extent,
            usage: create_info.usage,
            debug_name: name.as_ref().to_string(),
        }
    }

    #[inline]
    pub fn destroy(self) {
        drop(self)
    }
}
// tools
impl GfxImage {
    pub fn memory_requirements(&self) -> vk::MemoryRequirements {
        unsafe { Gfx::get().gfx_device().get_image_memory_requirements(self.handle) }
    }

    pub fn bind_to_heap(&self, heap: &GfxAliasingHeap) {
        assert!(self.allocation.is_none(), "GfxImage::bind_to_heap: image '{}' owns its memory", self.debug_name);
        heap.bind_image(Gfx::get().allocator(), self.handle);
    }

    /// 覆盖整个 image 的 subresource range
    pub fn full_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: vk::REMAINING_MIP_LEVELS,
            base_array_layer: 0,
            layer_count: vk::REMAINING_ARRAY_LAYERS,
        }
    }
}
// getters
impl GfxImage {
    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.handle
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent3D {
        self.extent
    }

    #[inline]
    pub fn usage(&self) -> vk::ImageUsageFlags {
        self.usage
    }

    #[inline]
    pub fn extent_2d(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.extent.width,
            height: self.extent.height,
        }
    }

    #[inline]
    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }
}
