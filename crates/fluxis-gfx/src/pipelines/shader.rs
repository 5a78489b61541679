use ash::vk;

use crate::foundation::debug_messenger::DebugType;
use crate::gfx::Gfx;

/// shader module 封装
pub struct GfxShaderModule {
    vk_handle: vk::ShaderModule,
}

// new & destroy
impl GfxShaderModule {
    /// 从 SPIR-V 字节码创建 shader module
    ///
    /// # Panics
    /// 字节码长度不是 4 的倍数时 panic
    pub fn new_from_spirv(spirv: &[u8], debug_name: &str) -> Self {
        assert_eq!(spirv.len() % 4, 0, "SPIR-V byte length must be a multiple of 4");
        let words = unsafe { std::slice::from_raw_parts(spirv.as_ptr() as *const u32, spirv.len() / 4) };

        let shader_ci = vk::ShaderModuleCreateInfo::default().code(words);
        let shader_module = unsafe { Gfx::get().gfx_device().create_shader_module(&shader_ci, None).unwrap() };

        let shader_module = Self {
            vk_handle: shader_module,
        };
        Gfx::get().gfx_device().set_debug_name(&shader_module, debug_name);
        shader_module
    }

    pub fn destroy(self) {
        unsafe {
            Gfx::get().gfx_device().destroy_shader_module(self.vk_handle, None);
        }
    }
}

// getters
impl GfxShaderModule {
    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.vk_handle
    }
}

impl DebugType for GfxShaderModule {
    fn debug_type_name() -> &'static str {
        "GfxShaderModule"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.vk_handle
    }
}
