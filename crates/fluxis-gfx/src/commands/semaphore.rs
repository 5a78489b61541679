use ash::vk;

use crate::foundation::debug_messenger::DebugType;
use crate::gfx::Gfx;

/// 二元信号量封装
pub struct GfxSemaphore {
    vk_handle: vk::Semaphore,
}

// new & destroy
impl GfxSemaphore {
    pub fn new(debug_name: &str) -> Self {
        let semaphore_ci = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { Gfx::get().gfx_device().create_semaphore(&semaphore_ci, None).unwrap() };

        let semaphore = Self { vk_handle: semaphore };
        Gfx::get().gfx_device().set_debug_name(&semaphore, debug_name);
        semaphore
    }

    pub fn destroy(self) {
        unsafe {
            Gfx::get().gfx_device().destroy_semaphore(self.vk_handle, None);
        }
    }
}

// getters
impl GfxSemaphore {
    #[inline]
    pub fn vk_handle(&self) -> vk::Semaphore {
        self.vk_handle
    }
}

impl DebugType for GfxSemaphore {
    fn debug_type_name() -> &'static str {
        "GfxSemaphore"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.vk_handle
    }
}
