use ash::vk;

use crate::foundation::debug_messenger::DebugType;
use crate::gfx::Gfx;

/// fence 封装
pub struct GfxFence {
    vk_handle: vk::Fence,
}

// new & destroy
impl GfxFence {
    pub fn new(signaled: bool, debug_name: &str) -> Self {
        let flags = if signaled { vk::FenceCreateFlags::SIGNALED } else { vk::FenceCreateFlags::empty() };
        let fence_ci = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { Gfx::get().gfx_device().create_fence(&fence_ci, None).unwrap() };

        let fence = Self { vk_handle: fence };
        Gfx::get().gfx_device().set_debug_name(&fence, debug_name);
        fence
    }

    pub fn destroy(self) {
        unsafe {
            Gfx::get().gfx_device().destroy_fence(self.vk_handle, None);
        }
    }
}

// tools
impl GfxFence {
    /// 等待 fence 被 signal，永不超时
    pub fn wait(&self) {
        unsafe {
            Gfx::get().gfx_device().wait_for_fences(&[self.vk_handle], true, u64::MAX).unwrap();
        }
    }

    pub fn reset(&self) {
        unsafe {
            Gfx::get().gfx_device().reset_fences(&[self.vk_handle]).unwrap();
        }
    }
}

// getters
impl GfxFence {
    #[inline]
    pub fn vk_handle(&self) -> vk::Fence {
        self.vk_handle
    }
}

impl DebugType for GfxFence {
    fn debug_type_name() -> &'static str {
        "GfxFence"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.vk_handle
    }
}
