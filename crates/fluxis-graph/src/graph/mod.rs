//! 处理图：连接、编译、构建与执行
//!
//! 使用流程：
//! ```ignore
//! let mut graph = FgGraph::new();
//! let src = graph.add_node("noise", Box::new(clear_node))?;
//! let flt = graph.add_node("filter", Box::new(blur_node))?;
//! graph.connect(src, "out", flt, "src");
//! // 每个迭代：
//! let run = graph.run(&cmd);
//! ```
//!
//! `compile` 是纯规划阶段：拓扑连接、推导输出描述与资源版本数、
//! binding 布局、实例池大小、别名区间，全部不触碰 GPU。
//! `run` 在需要时自动完成编译与构建。

mod alias;
mod build;
mod compile;
mod exec;

use std::collections::HashMap;

use ash::vk;
use fluxis_gfx::commands::ring_fences::GfxRingFences;
use itertools::Itertools;
use slotmap::SlotMap;

use crate::binding::FgBindingLayout;
use crate::connector::{FgBufferInput, FgBufferOutput, FgImageInput, FgImageOutput};
use crate::error::FgConnectError;
use crate::node::{FgNode, FgNodeFlags};
use crate::run_info::FgRunInfo;

pub(crate) use build::FgGraphRuntime;

slotmap::new_key_type! {
    /// 节点的图内句柄
    pub struct FgNodeId;
}

/// 用户声明的期望连接，编译时才做校验
#[derive(Clone, Debug)]
pub(crate) struct FgConnection {
    pub dst: FgNodeId,
    pub src_output: String,
    pub dst_input: String,
}

/// 输入解析到的生产者
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct FgSource {
    pub node: FgNodeId,
    pub output_idx: usize,
}

/// 输出的一个消费者
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct FgConsumer {
    pub node: FgNodeId,
    pub input_idx: usize,
}

/// 一份资源版本的来源，build 阶段按这个列表的顺序分配资源
#[derive(Copy, Clone, Debug)]
pub(crate) struct FgResourceSpec {
    pub node: FgNodeId,
    pub output_idx: usize,
    pub version: u32,
}

/// image 输出的规划结果
#[derive(Clone, Debug, Default)]
pub(crate) struct FgImageOutputPlan {
    /// max_delay + 1
    pub versions: u32,
    /// 合并所有消费者之后的 usage
    pub usage: vk::ImageUsageFlags,
    /// 所有消费者的 stage/access 并集
    pub input_stages: vk::PipelineStageFlags2,
    pub input_access: vk::AccessFlags2,
    /// 版本 0 在资源表中的下标，版本 v 为 first_resource + v
    pub first_resource: usize,
    /// 参与显存别名复用的组；None 表示独占显存
    pub alias_group: Option<usize>,
}

/// buffer 输出的规划结果
#[derive(Clone, Debug, Default)]
pub(crate) struct FgBufferOutputPlan {
    pub versions: u32,
    pub usage: vk::BufferUsageFlags,
    pub input_stages: vk::PipelineStageFlags2,
    pub input_access: vk::AccessFlags2,
    pub first_resource: usize,
    pub alias_group: Option<usize>,
}

/// 预计算好的一组资源下标
///
/// 每个 set_idx 一组；迭代 i 使用第 `i % set_count` 组。
/// None 表示 optional 且未连接，对应槽位写入占位资源。
#[derive(Clone, Debug, Default)]
pub(crate) struct FgResourceSet {
    pub image_inputs: Vec<Option<usize>>,
    pub buffer_inputs: Vec<Option<usize>>,
    pub image_outputs: Vec<usize>,
    pub buffer_outputs: Vec<usize>,
}

/// 每个节点的连接记录与规划结果
pub(crate) struct FgNodeData {
    pub name: String,
    pub node: Box<dyn FgNode>,

    /// 以本节点为 src 的期望连接
    pub connections: Vec<FgConnection>,

    // declare 阶段缓存
    pub image_inputs: Vec<FgImageInput>,
    pub buffer_inputs: Vec<FgBufferInput>,
    pub image_outputs: Vec<FgImageOutput>,
    pub buffer_outputs: Vec<FgBufferOutput>,

    // 解析结果
    pub image_input_sources: Vec<Option<FgSource>>,
    pub buffer_input_sources: Vec<Option<FgSource>>,
    pub image_output_consumers: Vec<Vec<FgConsumer>>,
    pub buffer_output_consumers: Vec<Vec<FgConsumer>>,

    // 规划结果
    pub image_output_plans: Vec<FgImageOutputPlan>,
    pub buffer_output_plans: Vec<FgBufferOutputPlan>,
    pub set_count: u32,
    pub binding_layout: FgBindingLayout,
    pub resource_sets: Vec<FgResourceSet>,

    /// 本次编译尝试中被禁用的原因；成功编译后清空
    pub disabled: Option<FgConnectError>,
    pub status: FgNodeFlags,
    /// 最近一次 process 失败的诊断，保留到下一次成功编译
    pub last_error: Option<String>,
}

impl FgNodeData {
    fn new(name: String, node: Box<dyn FgNode>) -> Self {
        Self {
            name,
            node,
            connections: Vec::new(),
            image_inputs: Vec::new(),
            buffer_inputs: Vec::new(),
            image_outputs: Vec::new(),
            buffer_outputs: Vec::new(),
            image_input_sources: Vec::new(),
            buffer_input_sources: Vec::new(),
            image_output_consumers: Vec::new(),
            buffer_output_consumers: Vec::new(),
            image_output_plans: Vec::new(),
            buffer_output_plans: Vec::new(),
            set_count: 0,
            binding_layout: FgBindingLayout::default(),
            resource_sets: Vec::new(),
            disabled: None,
            status: FgNodeFlags::empty(),
            last_error: None,
        }
    }

    pub(crate) fn image_input_index(&self, name: &str) -> Option<usize> {
        self.image_inputs.iter().position(|i| i.name == name)
    }

    pub(crate) fn buffer_input_index(&self, name: &str) -> Option<usize> {
        self.buffer_inputs.iter().position(|i| i.name == name)
    }

    pub(crate) fn image_output_index(&self, name: &str) -> Option<usize> {
        self.image_outputs.iter().position(|o| o.name == name)
    }

    pub(crate) fn buffer_output_index(&self, name: &str) -> Option<usize> {
        self.buffer_outputs.iter().position(|o| o.name == name)
    }

    #[inline]
    pub(crate) fn is_enabled(&self) -> bool {
        self.disabled.is_none()
    }
}

/// 一次编译尝试的结果
#[derive(Debug, Default)]
pub struct FgCompileReport {
    /// 成功连接的节点数
    pub connected: usize,
    /// 被禁用的节点及原因
    pub disabled: Vec<(String, FgConnectError)>,
}

/// 处理图
///
/// 节点与资源的唯一所有者。迭代计数、实例池大小等运行状态
/// 都是图的显式字段，重新编译时显式重置。
pub struct FgGraph {
    pub(crate) nodes: SlotMap<FgNodeId, FgNodeData>,
    pub(crate) node_from_name: HashMap<String, FgNodeId>,

    /// 编译得到的拓扑顺序（只含启用的节点）
    pub(crate) topo_order: Vec<FgNodeId>,

    /// build 阶段按顺序分配的资源清单
    pub(crate) image_specs: Vec<FgResourceSpec>,
    pub(crate) buffer_specs: Vec<FgResourceSpec>,
    /// 显存别名组；每组的成员（spec 下标）共用一个 heap
    pub(crate) image_alias_groups: Vec<Vec<usize>>,
    pub(crate) buffer_alias_groups: Vec<Vec<usize>>,

    pub(crate) runtime: Option<FgGraphRuntime>,

    /// 自上次构建以来的迭代序号
    pub(crate) current_iteration: u64,
    pub(crate) rebuild_requested: bool,
    pub(crate) run_info: FgRunInfo,
}

impl Default for FgGraph {
    fn default() -> Self {
        Self::new()
    }
}

// new & 拓扑编辑
impl FgGraph {
    /// CPU 录制允许领先 GPU 的迭代数；实例池大小不小于这个值
    pub const RING_SIZE: u32 = GfxRingFences::RING_SIZE as u32;

    pub fn new() -> Self {
        Self {
            nodes: SlotMap::with_key(),
            node_from_name: HashMap::new(),
            topo_order: Vec::new(),
            image_specs: Vec::new(),
            buffer_specs: Vec::new(),
            image_alias_groups: Vec::new(),
            buffer_alias_groups: Vec::new(),
            runtime: None,
            current_iteration: 0,
            rebuild_requested: true,
            run_info: FgRunInfo::default(),
        }
    }

    /// 向图中添加一个节点
    pub fn add_node(&mut self, name: impl Into<String>, node: Box<dyn FgNode>) -> Result<FgNodeId, FgConnectError> {
        let name = name.into();
        if self.node_from_name.contains_key(&name) {
            return Err(FgConnectError::DuplicateNodeName(name));
        }

        let id = self.nodes.insert(FgNodeData::new(name.clone(), node));
        self.node_from_name.insert(name, id);
        self.rebuild_requested = true;
        Ok(id)
    }

    /// 声明一条连接；校验推迟到编译阶段
    ///
    /// # Panics
    /// 句柄无效时 panic
    pub fn connect(&mut self, src: FgNodeId, src_output: impl Into<String>, dst: FgNodeId, dst_input: impl Into<String>) {
        assert!(self.nodes.contains_key(src), "FgGraph::connect: invalid src node");
        assert!(self.nodes.contains_key(dst), "FgGraph::connect: invalid dst node");

        self.nodes[src].connections.push(FgConnection {
            dst,
            src_output: src_output.into(),
            dst_input: dst_input.into(),
        });
        self.rebuild_requested = true;
    }

    /// 把节点从图中移除，指向它的连接一并移除
    pub fn remove_node(&mut self, id: FgNodeId) {
        let Some(data) = self.nodes.remove(id) else {
            return;
        };
        self.node_from_name.remove(&data.name);
        for (_, other) in self.nodes.iter_mut() {
            other.connections.retain(|c| c.dst != id);
        }
        self.topo_order.retain(|n| *n != id);
        self.rebuild_requested = true;
        log::info!("removed node '{}'", data.name);
    }

    /// 在下一次迭代之前强制重新编译和构建
    pub fn request_rebuild(&mut self) {
        self.rebuild_requested = true;
    }

    pub fn node_id(&self, name: &str) -> Option<FgNodeId> {
        self.node_from_name.get(name).copied()
    }
}

// 诊断与检视
impl FgGraph {
    fn data(&self, name: &str) -> &FgNodeData {
        let id = self.node_from_name.get(name).unwrap_or_else(|| panic!("no node named '{}'", name));
        &self.nodes[*id]
    }

    /// 拓扑顺序中的节点名（只含启用的节点）
    pub fn topo_names(&self) -> Vec<&str> {
        self.topo_order.iter().map(|id| self.nodes[*id].name.as_str()).collect_vec()
    }

    pub fn is_disabled(&self, name: &str) -> bool {
        self.data(name).disabled.is_some()
    }

    /// 节点在本次编译尝试中被禁用的原因
    pub fn disable_reason(&self, name: &str) -> Option<&FgConnectError> {
        self.data(name).disabled.as_ref()
    }

    /// 节点最近一次 process 失败的诊断
    pub fn last_error(&self, name: &str) -> Option<&str> {
        self.data(name).last_error.as_deref()
    }

    /// 节点的 binding table 实例池大小
    pub fn set_count(&self, name: &str) -> u32 {
        self.data(name).set_count
    }

    pub fn binding_layout(&self, name: &str) -> &FgBindingLayout {
        &self.data(name).binding_layout
    }

    pub fn is_image_input_connected(&self, node: &str, input: &str) -> bool {
        let data = self.data(node);
        let idx = data.image_input_index(input).unwrap_or_else(|| panic!("no image input named '{}'", input));
        data.image_input_sources[idx].is_some()
    }

    pub fn is_buffer_input_connected(&self, node: &str, input: &str) -> bool {
        let data = self.data(node);
        let idx = data.buffer_input_index(input).unwrap_or_else(|| panic!("no buffer input named '{}'", input));
        data.buffer_input_sources[idx].is_some()
    }

    /// 某个 image 输出分配的资源版本数
    pub fn image_output_versions(&self, node: &str, output: &str) -> u32 {
        let data = self.data(node);
        let idx = data.image_output_index(output).unwrap_or_else(|| panic!("no image output named '{}'", output));
        data.image_output_plans[idx].versions
    }

    /// set_idx 下某个 image 输入解析到的资源下标；None 表示占位资源
    pub fn image_input_resource(&self, node: &str, input: &str, set_idx: u32) -> Option<usize> {
        let data = self.data(node);
        let idx = data.image_input_index(input).unwrap_or_else(|| panic!("no image input named '{}'", input));
        data.resource_sets[set_idx as usize].image_inputs[idx]
    }

    /// set_idx 下某个 image 输出写入的资源下标
    pub fn image_output_resource(&self, node: &str, output: &str, set_idx: u32) -> usize {
        let data = self.data(node);
        let idx = data.image_output_index(output).unwrap_or_else(|| panic!("no image output named '{}'", output));
        data.resource_sets[set_idx as usize].image_outputs[idx]
    }

    #[inline]
    pub fn current_iteration(&self) -> u64 {
        self.current_iteration
    }

    /// 把编译结果写入日志：拓扑顺序、连接、实例池与别名组
    pub fn log_topology(&self) {
        log::info!("graph: {} nodes, {} in topology order", self.nodes.len(), self.topo_order.len());
        for id in &self.topo_order {
            let data = &self.nodes[*id];
            log::info!(
                "  node '{}' ({}): {} sets, {} binding slots",
                data.name,
                data.node.type_name(),
                data.set_count,
                data.binding_layout.slot_count(),
            );
            for (out_idx, output) in data.image_outputs.iter().enumerate() {
                let plan = &data.image_output_plans[out_idx];
                for consumer in &data.image_output_consumers[out_idx] {
                    let dst = &self.nodes[consumer.node];
                    let in_desc = &dst.image_inputs[consumer.input_idx];
                    log::info!(
                        "    image: {} ({}) --{}-> {} ({})",
                        data.name,
                        output.name,
                        in_desc.delay,
                        dst.name,
                        in_desc.name,
                    );
                }
                log::info!(
                    "    image output '{}': {} versions{}",
                    output.name,
                    plan.versions,
                    match plan.alias_group {
                        Some(group) => format!(", alias group {}", group),
                        None => String::new(),
                    },
                );
            }
            for (out_idx, output) in data.buffer_outputs.iter().enumerate() {
                let plan = &data.buffer_output_plans[out_idx];
                for consumer in &data.buffer_output_consumers[out_idx] {
                    let dst = &self.nodes[consumer.node];
                    let in_desc = &dst.buffer_inputs[consumer.input_idx];
                    log::info!(
                        "    buffer: {} ({}) --{}-> {} ({})",
                        data.name,
                        output.name,
                        in_desc.delay,
                        dst.name,
                        in_desc.name,
                    );
                }
                log::info!("    buffer output '{}': {} versions", output.name, plan.versions);
            }
        }
        for (_, data) in self.nodes.iter().filter(|(_, d)| !d.is_enabled()) {
            log::warn!("  disabled '{}': {}", data.name, data.disabled.as_ref().unwrap());
        }
    }
}
