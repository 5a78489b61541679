use ash::vk;
use itertools::Itertools;

use crate::commands::command_buffer::GfxCommandBuffer;

/// queue submit 的参数封装
///
/// 持有提交所需的所有数组，保证 `vk::SubmitInfo2` 内的指针有效。
pub struct GfxSubmitInfo {
    command_buffer_infos: Vec<vk::CommandBufferSubmitInfo<'static>>,
    wait_infos: Vec<vk::SemaphoreSubmitInfo<'static>>,
    signal_infos: Vec<vk::SemaphoreSubmitInfo<'static>>,
}

// new & init
impl GfxSubmitInfo {
    pub fn new(command_buffers: &[GfxCommandBuffer]) -> Self {
        let command_buffer_infos = command_buffers
            .iter()
            .map(|cmd| vk::CommandBufferSubmitInfo::default().command_buffer(cmd.vk_handle()))
            .collect_vec();

        Self {
            command_buffer_infos,
            wait_infos: Vec::new(),
            signal_infos: Vec::new(),
        }
    }

    /// builder
    pub fn wait(mut self, semaphore: vk::Semaphore, stage: vk::PipelineStageFlags2) -> Self {
        self.wait_infos.push(vk::SemaphoreSubmitInfo::default().semaphore(semaphore).stage_mask(stage));
        self
    }

    /// builder
    pub fn signal(mut self, semaphore: vk::Semaphore, stage: vk::PipelineStageFlags2) -> Self {
        self.signal_infos.push(vk::SemaphoreSubmitInfo::default().semaphore(semaphore).stage_mask(stage));
        self
    }
}

// getters
impl GfxSubmitInfo {
    pub(crate) fn vk_submit_info(&self) -> vk::SubmitInfo2<'_> {
        vk::SubmitInfo2::default()
            .command_buffer_infos(&self.command_buffer_infos)
            .wait_semaphore_infos(&self.wait_infos)
            .signal_semaphore_infos(&self.signal_infos)
    }
}
