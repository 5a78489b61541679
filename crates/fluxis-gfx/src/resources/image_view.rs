use ash::vk;

use crate::foundation::debug_messenger::DebugType;
use crate::gfx::Gfx;
use crate::resources::image::GfxImage;

/// 创建 image view 所需的信息
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GfxImageViewDesc {
    pub format: vk::Format,
    pub view_type: vk::ImageViewType,
    pub aspect: vk::ImageAspectFlags,
    /// (base mip level, level count)
    pub mip_range: (u32, u32),
    /// (base array layer, layer count)
    pub layer_range: (u32, u32),
}

impl GfxImageViewDesc {
    pub fn new_2d(format: vk::Format, aspect: vk::ImageAspectFlags) -> Self {
        Self {
            format,
            view_type: vk::ImageViewType::TYPE_2D,
            aspect,
            mip_range: (0, 1),
            layer_range: (0, 1),
        }
    }
}

/// image view 封装
pub struct GfxImageView {
    vk_handle: vk::ImageView,
    desc: GfxImageViewDesc,
}

// new & destroy
impl GfxImageView {
    pub fn new(image: &GfxImage, desc: GfxImageViewDesc, name: impl AsRef<str>) -> Self {
        let view_ci = vk::ImageViewCreateInfo::default()
            .image(image.handle())
            .view_type(desc.view_type)
            .format(desc.format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: desc.aspect,
                base_mip_level: desc.mip_range.0,
                level_count: desc.mip_range.1,
                base_array_layer: desc.layer_range.0,
                layer_count: desc.layer_range.1,
            });

        let view = unsafe { Gfx::get().gfx_device().create_image_view(&view_ci, None).unwrap() };

        let view = Self {
            vk_handle: view,
            desc,
        };
        Gfx::get().gfx_device().set_debug_name(&view, name.as_ref());
        view
    }

    pub fn destroy(self) {
        unsafe {
            Gfx::get().gfx_device().destroy_image_view(self.vk_handle, None);
        }
    }
}

// getters
impl GfxImageView {
    #[inline]
    pub fn handle(&self) -> vk::ImageView {
        self.vk_handle
    }

    #[inline]
    pub fn desc(&self) -> &GfxImageViewDesc {
        &self.desc
    }
}

impl DebugType for GfxImageView {
    fn debug_type_name() -> &'static str {
        "GfxImageView"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.vk_handle
    }
}
