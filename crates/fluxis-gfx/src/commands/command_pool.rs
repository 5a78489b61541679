use ash::vk;

use crate::commands::command_queue::GfxQueueFamily;
use crate::foundation::debug_messenger::DebugType;
use crate::foundation::device::GfxDevice;
use crate::gfx::Gfx;

/// 命令池封装
pub struct GfxCommandPool {
    vk_handle: vk::CommandPool,
    queue_family: GfxQueueFamily,
}

// new & init
impl GfxCommandPool {
    pub fn new(queue_family: GfxQueueFamily, flags: vk::CommandPoolCreateFlags, debug_name: &str) -> Self {
        let pool = Self::new_internal(Gfx::get().gfx_device(), queue_family, flags, debug_name);
        Gfx::get().gfx_device().set_debug_name(&pool, debug_name);
        pool
    }

    /// 在 Gfx 单例尚未建立时使用的创建路径
    pub(crate) fn new_internal(
        device: &GfxDevice,
        queue_family: GfxQueueFamily,
        flags: vk::CommandPoolCreateFlags,
        _debug_name: &str,
    ) -> Self {
        let pool_ci =
            vk::CommandPoolCreateInfo::default().flags(flags).queue_family_index(queue_family.queue_family_index);
        let pool = unsafe { device.create_command_pool(&pool_ci, None).unwrap() };

        Self {
            vk_handle: pool,
            queue_family,
        }
    }

    pub fn destroy(self) {
        self.destroy_internal(Gfx::get().gfx_device());
    }

    pub(crate) fn destroy_internal(&self, device: &GfxDevice) {
        unsafe {
            device.destroy_command_pool(self.vk_handle, None);
        }
    }
}

// tools
impl GfxCommandPool {
    /// 回收 pool 内所有 command buffer，录制状态回到初始
    pub fn reset(&self) {
        unsafe {
            Gfx::get()
                .gfx_device()
                .reset_command_pool(self.vk_handle, vk::CommandPoolResetFlags::empty())
                .unwrap();
        }
    }
}

// getters
impl GfxCommandPool {
    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.vk_handle
    }

    #[inline]
    pub fn queue_family(&self) -> &GfxQueueFamily {
        &self.queue_family
    }
}

impl DebugType for GfxCommandPool {
    fn debug_type_name() -> &'static str {
        "GfxCommandPool"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.vk_handle
    }
}
