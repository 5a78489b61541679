//! 一次图运行的产物

use ash::vk;
use fluxis_gfx::commands::command_queue::GfxCommandQueue;

use crate::error::FgProcessError;

/// 图运行的结果
///
/// 节点可以在 process 中向其中追加信号量，调用方必须把它们
/// 和图的命令缓冲一起提交；submit 之后要执行所有回调。
#[derive(Default)]
pub struct FgRunInfo {
    iteration: u64,

    wait_semaphores: Vec<vk::Semaphore>,
    wait_stages: Vec<vk::PipelineStageFlags2>,
    signal_semaphores: Vec<vk::Semaphore>,
    submit_callbacks: Vec<Box<dyn FnOnce(&GfxCommandQueue)>>,

    rebuild_requested: bool,
    process_errors: Vec<FgProcessError>,
}

// update
impl FgRunInfo {
    pub(crate) fn reset(&mut self, iteration: u64) {
        self.iteration = iteration;
        self.wait_semaphores.clear();
        self.wait_stages.clear();
        self.signal_semaphores.clear();
        self.submit_callbacks.clear();
        self.rebuild_requested = false;
        self.process_errors.clear();
    }

    pub fn add_wait_semaphore(&mut self, semaphore: vk::Semaphore, stage: vk::PipelineStageFlags2) {
        self.wait_semaphores.push(semaphore);
        self.wait_stages.push(stage);
    }

    pub fn add_signal_semaphore(&mut self, semaphore: vk::Semaphore) {
        self.signal_semaphores.push(semaphore);
    }

    pub fn add_submit_callback(&mut self, callback: impl FnOnce(&GfxCommandQueue) + 'static) {
        self.submit_callbacks.push(Box::new(callback));
    }

    /// 在下一次迭代之前强制重建整张图
    pub fn request_rebuild(&mut self) {
        self.rebuild_requested = true;
    }

    pub(crate) fn record_error(&mut self, error: FgProcessError) {
        self.process_errors.push(error);
    }

    /// submit 图的命令缓冲之后调用
    pub fn execute_callbacks(&mut self, queue: &GfxCommandQueue) {
        for callback in self.submit_callbacks.drain(..) {
            callback(queue);
        }
    }
}

// getters
impl FgRunInfo {
    #[inline]
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// submit 图命令缓冲时要等待的信号量
    #[inline]
    pub fn wait_semaphores(&self) -> &[vk::Semaphore] {
        &self.wait_semaphores
    }

    #[inline]
    pub fn wait_stages(&self) -> &[vk::PipelineStageFlags2] {
        &self.wait_stages
    }

    /// submit 图命令缓冲时要 signal 的信号量
    #[inline]
    pub fn signal_semaphores(&self) -> &[vk::Semaphore] {
        &self.signal_semaphores
    }

    #[inline]
    pub(crate) fn rebuild_requested(&self) -> bool {
        self.rebuild_requested
    }

    /// 本迭代中 process 失败的节点诊断
    #[inline]
    pub fn process_errors(&self) -> &[FgProcessError] {
        &self.process_errors
    }
}
