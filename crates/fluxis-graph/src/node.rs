//! 节点接口
//!
//! 节点的生命周期：
//! `describe_inputs` → `describe_outputs`（非延迟输入已解析）→
//! `on_connected`（binding 布局已定，可建立 pipeline 等派生状态）→
//! 每个迭代 `pre_process` + `process`。
//! 图重连时从 `describe_inputs` 重新开始，此前在飞的 GPU 工作保证已完成。

use ash::vk;
use fluxis_gfx::commands::command_buffer::GfxCommandBuffer;

use crate::binding::FgNodeBindingInfo;
use crate::connector::{FgBufferInput, FgBufferOutput, FgImageInput, FgImageOutput};
use crate::error::{FgConnectError, FgProcessError};
use crate::resource::{FgBufferResource, FgImageResource};
use crate::run_info::FgRunInfo;

bitflags::bitflags! {
    /// pre_process 返回的状态标志
    ///
    /// 图会按位或聚合所有节点的标志，在迭代之间统一处理。
    /// 重连是昂贵操作，行为良好的节点不应每个迭代都请求。
    #[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
    pub struct FgNodeFlags: u32 {
        /// 下次 process 之前必须重新连接整张图
        const NEEDS_RECONNECT = 1 << 0;
        /// 请求图重新初始化本节点的跨迭代数据（延迟输出的历史版本清零）
        const RESET_IN_FLIGHT_DATA = 1 << 1;
        /// 在完成当前命令流之后把本节点从图中移除
        const REMOVE_NODE = 1 << 2;
        /// 本迭代跳过 process
        const SKIP_RUN = 1 << 3;
    }
}

/// describe_outputs 时每个输入对应的上游输出描述
///
/// 顺序与 describe_inputs 的声明顺序一致。延迟输入在这个阶段
/// 还未实例化，对应 None；可选且未连接的输入同样是 None。
#[derive(Default)]
pub struct FgConnectedInputs<'a> {
    pub image_inputs: Vec<Option<&'a FgImageOutput>>,
    pub buffer_inputs: Vec<Option<&'a FgBufferOutput>>,
}

/// 一次迭代中交给节点 process 的上下文
///
/// 所有资源视图都已按本迭代选中的资源版本解析完毕，
/// 需要的 barrier 也已经在 process 之前插入。
pub struct FgProcessContext<'a> {
    pub cmd: &'a GfxCommandBuffer,
    /// 自上次构建以来的迭代序号
    pub iteration: u64,
    /// 本迭代选中的 binding table 实例下标
    pub set_index: u32,
    /// 本迭代选中的 binding table 实例；布局为空的节点是 None
    pub descriptor_set: Option<vk::DescriptorSet>,

    /// 按声明顺序解析的输入；None 表示 optional 且未连接
    pub image_inputs: Vec<Option<&'a FgImageResource>>,
    pub buffer_inputs: Vec<Option<&'a FgBufferResource>>,
    pub image_outputs: Vec<&'a FgImageResource>,
    pub buffer_outputs: Vec<&'a FgBufferResource>,

    /// 节点可以向其中追加 submit 时的信号量与回调
    pub run: &'a mut FgRunInfo,
}

impl<'a> FgProcessContext<'a> {
    /// 取第 idx 个 image 输入
    ///
    /// # Panics
    /// 输入未连接时 panic；optional 输入先用 [`Self::is_image_input_connected`] 检查
    #[inline]
    pub fn image_input(&self, idx: usize) -> &'a FgImageResource {
        self.image_inputs[idx].expect("image input is not connected")
    }

    #[inline]
    pub fn is_image_input_connected(&self, idx: usize) -> bool {
        self.image_inputs[idx].is_some()
    }

    /// 取第 idx 个 buffer 输入
    ///
    /// # Panics
    /// 输入未连接时 panic
    #[inline]
    pub fn buffer_input(&self, idx: usize) -> &'a FgBufferResource {
        self.buffer_inputs[idx].expect("buffer input is not connected")
    }

    #[inline]
    pub fn is_buffer_input_connected(&self, idx: usize) -> bool {
        self.buffer_inputs[idx].is_some()
    }
}

/// 处理图中的一个节点
///
/// 节点实现孤立的效果（滤波、降噪、归约等），不关心资源从哪里来：
/// 声明好输入输出之后，资源分配、binding table 与同步全部由图完成。
pub trait FgNode {
    /// 节点类型名，用于日志与 debug label
    fn type_name(&self) -> &'static str;

    /// 声明需要的输入
    ///
    /// 重连时会被再次调用；实现通常缓存并复用 connector 声明。
    fn describe_inputs(&mut self) -> (Vec<FgImageInput>, Vec<FgBufferInput>) {
        (Vec::new(), Vec::new())
    }

    /// 声明输出
    ///
    /// 此时可以读取非延迟输入解析到的输出描述来确定输出尺寸。
    /// 格式不兼容等问题在这里返回错误，节点会在本次编译中被禁用。
    fn describe_outputs(
        &mut self,
        _connected: &FgConnectedInputs,
    ) -> Result<(Vec<FgImageOutput>, Vec<FgBufferOutput>), FgConnectError> {
        Ok((Vec::new(), Vec::new()))
    }

    /// 图编译完成后调用一次
    ///
    /// 节点在这里根据推导出的 binding 布局建立派生状态（pipeline 等）。
    /// 重连后会再次调用，必须容忍多次调用；调用时所有之前在飞的
    /// GPU 工作都已经完成。
    fn on_connected(&mut self, _binding: &FgNodeBindingInfo) {}

    /// 每个迭代在所有节点 process 之前调用
    fn pre_process(&mut self, _iteration: u64) -> FgNodeFlags {
        FgNodeFlags::empty()
    }

    /// 录制本迭代的 GPU 工作
    ///
    /// 输入输出的 barrier 已经插好，直接使用 ctx 中选好的
    /// binding table 实例与资源视图录制即可。
    fn process(&mut self, ctx: &mut FgProcessContext) -> Result<(), FgProcessError>;
}
