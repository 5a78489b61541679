use ash::vk;

use crate::foundation::debug_messenger::DebugType;
use crate::gfx::Gfx;

/// sampler 封装
pub struct GfxSampler {
    vk_handle: vk::Sampler,
}

// new & destroy
impl GfxSampler {
    /// 线性过滤 + clamp to edge 的常用 sampler
    pub fn new_linear(debug_name: &str) -> Self {
        let sampler_ci = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE);

        let sampler = unsafe { Gfx::get().gfx_device().create_sampler(&sampler_ci, None).unwrap() };

        let sampler = Self { vk_handle: sampler };
        Gfx::get().gfx_device().set_debug_name(&sampler, debug_name);
        sampler
    }

    pub fn destroy(self) {
        unsafe {
            Gfx::get().gfx_device().destroy_sampler(self.vk_handle, None);
        }
    }
}

// getters
impl GfxSampler {
    #[inline]
    pub fn handle(&self) -> vk::Sampler {
        self.vk_handle
    }
}

impl DebugType for GfxSampler {
    fn debug_type_name() -> &'static str {
        "GfxSampler"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.vk_handle
    }
}
