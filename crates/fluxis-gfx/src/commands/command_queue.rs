use ash::vk;

use crate::commands::{fence::GfxFence, submit_info::GfxSubmitInfo};
use crate::gfx::Gfx;

/// queue family 的基本信息
#[derive(Clone, Debug)]
pub struct GfxQueueFamily {
    pub name: String,
    pub queue_family_index: u32,
    pub queue_flags: vk::QueueFlags,
    pub queue_count: u32,
}

/// 命令队列封装
pub struct GfxCommandQueue {
    pub(crate) vk_queue: vk::Queue,
    pub(crate) queue_family: GfxQueueFamily,
}

impl GfxCommandQueue {
    #[inline]
    pub fn vk_handle(&self) -> vk::Queue {
        self.vk_queue
    }

    #[inline]
    pub fn queue_family(&self) -> &GfxQueueFamily {
        &self.queue_family
    }

    /// 提交若干 command buffer，fence 在全部执行完成后被 signal
    pub fn submit(&self, submit_infos: Vec<GfxSubmitInfo>, fence: Option<&GfxFence>) {
        let vk_submit_infos: Vec<vk::SubmitInfo2> = submit_infos.iter().map(|info| info.vk_submit_info()).collect();
        unsafe {
            Gfx::get()
                .gfx_device()
                .queue_submit2(
                    self.vk_queue,
                    &vk_submit_infos,
                    fence.map_or(vk::Fence::null(), |f| f.vk_handle()),
                )
                .unwrap();
        }
    }

    pub fn wait_idle(&self) {
        unsafe {
            Gfx::get().gfx_device().queue_wait_idle(self.vk_queue).unwrap();
        }
    }
}
