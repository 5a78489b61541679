//! 编译（连接）阶段
//!
//! 纯规划：按拓扑顺序解析连接、推导输出描述、计算资源版本数与
//! 实例池大小、推导 binding 布局、做显存别名的区间分析。
//! 整个阶段不触碰任何 GPU 对象。
//!
//! 出错的节点被禁用并记录原因，输出对下游不可见，依赖它的节点
//! 级联禁用；图的其余部分照常编译。

use std::collections::{HashMap, HashSet, VecDeque};

use ash::vk;
use itertools::Itertools;

use crate::binding::FgBindingLayout;
use crate::error::FgConnectError;
use crate::node::FgConnectedInputs;

use super::alias::{FgAliasInterval, pack_intervals};
use super::{
    FgCompileReport, FgConsumer, FgBufferOutputPlan, FgGraph, FgImageOutputPlan, FgNodeId, FgResourceSet,
    FgResourceSpec, FgSource,
};

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 { a } else { gcd(b, a % b) }
}

pub(crate) fn lcm(a: u32, b: u32) -> u32 {
    a / gcd(a, b) * b
}

/// 实例池大小：版本周期的最小公倍数向上取整到 ring size
///
/// 池大小是周期的整数倍，保证 `iteration % pool` 对所有 connector
/// 同时选出一致的资源版本；不小于 ring size，保证一个实例被再次
/// 选中时其上的命令流已经执行完毕。
pub(crate) fn pool_size(cycle: u32, ring_size: u32) -> u32 {
    let cycle = cycle.max(1);
    let mut size = cycle;
    while size < ring_size {
        size += cycle;
    }
    size
}

/// 解析一条连接时的只读校验结果
enum ResolvedKind {
    Image { out_idx: usize, in_idx: usize },
    Buffer { out_idx: usize, in_idx: usize },
}

impl FgGraph {
    /// 编译整张图
    ///
    /// 可以在没有 GPU 上下文的情况下调用；资源分配发生在 build 阶段。
    pub fn compile(&mut self) -> FgCompileReport {
        self.reset_compile_state();

        let node_ids = self.nodes.keys().collect_vec();

        // 期望连接的反向索引：dst -> [(dst_input, src)]
        let mut desired_incoming: HashMap<FgNodeId, Vec<(String, FgNodeId)>> = HashMap::new();
        for id in &node_ids {
            for conn in &self.nodes[*id].connections {
                desired_incoming.entry(conn.dst).or_default().push((conn.dst_input.clone(), *id));
            }
        }

        // 1. 声明输入
        for id in &node_ids {
            let data = &mut self.nodes[*id];
            let (image_inputs, buffer_inputs) = data.node.describe_inputs();
            data.image_inputs = image_inputs;
            data.buffer_inputs = buffer_inputs;
            data.image_input_sources = vec![None; data.image_inputs.len()];
            data.buffer_input_sources = vec![None; data.buffer_inputs.len()];

            if let Some(dup) = Self::find_duplicate_input_name(data) {
                let node = data.name.clone();
                self.disable(*id, FgConnectError::DuplicateConnector { node, connector: dup });
            }
        }

        // 2. 拓扑访问；禁用节点可能让新的 optional 消费者变得可运行，
        //    所以访问结束后重新播种直到不动点
        let mut visited: HashSet<FgNodeId> = HashSet::new();
        let mut order: Vec<FgNodeId> = Vec::new();
        loop {
            let mut queue: VecDeque<FgNodeId> = node_ids
                .iter()
                .copied()
                .filter(|id| {
                    !visited.contains(id)
                        && self.nodes[*id].is_enabled()
                        && self.inputs_satisfied(*id, &visited, &desired_incoming)
                })
                .collect();
            if queue.is_empty() {
                break;
            }

            while let Some(id) = queue.pop_front() {
                if visited.contains(&id) {
                    continue;
                }
                visited.insert(id);
                if !self.nodes[id].is_enabled() {
                    continue;
                }

                if self.visit_node(id) {
                    order.push(id);
                }

                // 新就绪的 delay-0 消费者入队
                let mut candidates: HashSet<FgNodeId> = HashSet::new();
                let data = &self.nodes[id];
                for consumers in &data.image_output_consumers {
                    for consumer in consumers {
                        if self.nodes[consumer.node].image_inputs[consumer.input_idx].delay == 0 {
                            candidates.insert(consumer.node);
                        }
                    }
                }
                for consumers in &data.buffer_output_consumers {
                    for consumer in consumers {
                        if self.nodes[consumer.node].buffer_inputs[consumer.input_idx].delay == 0 {
                            candidates.insert(consumer.node);
                        }
                    }
                }

                for candidate in candidates {
                    if visited.contains(&candidate) {
                        // delay-0 的回边：非延迟子图必须无环
                        let name = self.nodes[candidate].name.clone();
                        self.disable(candidate, FgConnectError::DelayZeroCycle { nodes: vec![name] });
                        continue;
                    }
                    if self.inputs_satisfied(candidate, &visited, &desired_incoming) {
                        queue.push_back(candidate);
                    }
                }
            }
        }

        // 3. 给访问不到的节点定性
        self.classify_unvisited(&node_ids, &visited, &desired_incoming);

        // 4. 级联禁用 + 把禁用节点从结果里剥掉
        self.cascade_disable(&node_ids, &visited, &desired_incoming);
        order.retain(|id| self.nodes[*id].is_enabled());
        self.topo_order = order;
        self.strip_disabled_consumers();

        // 5. 每个输出：版本数与消费者 flag 并集
        self.plan_outputs();

        // 6. binding 布局
        for id in self.topo_order.clone() {
            let data = &mut self.nodes[id];
            data.binding_layout = FgBindingLayout::derive(
                &data.image_inputs,
                &data.buffer_inputs,
                &data.image_outputs,
                &data.buffer_outputs,
            );
        }

        // 7. 资源清单 + 实例池大小 + 每个 set 的资源下标
        self.assign_resource_specs();
        self.prepare_resource_sets();

        // 8. 显存别名的区间分析
        self.plan_aliasing();

        // 成功连接的节点清掉历史诊断
        for id in &self.topo_order {
            self.nodes[*id].last_error = None;
        }

        let report = FgCompileReport {
            connected: self.topo_order.len(),
            disabled: self
                .nodes
                .iter()
                .filter_map(|(_, data)| data.disabled.clone().map(|err| (data.name.clone(), err)))
                .collect(),
        };
        log::info!("graph compiled: {} connected, {} disabled", report.connected, report.disabled.len());
        report
    }

    fn reset_compile_state(&mut self) {
        self.topo_order.clear();
        self.image_specs.clear();
        self.buffer_specs.clear();
        self.image_alias_groups.clear();
        self.buffer_alias_groups.clear();

        for (_, data) in self.nodes.iter_mut() {
            data.image_inputs.clear();
            data.buffer_inputs.clear();
            data.image_outputs.clear();
            data.buffer_outputs.clear();
            data.image_input_sources.clear();
            data.buffer_input_sources.clear();
            data.image_output_consumers.clear();
            data.buffer_output_consumers.clear();
            data.image_output_plans.clear();
            data.buffer_output_plans.clear();
            data.set_count = 0;
            data.binding_layout = FgBindingLayout::default();
            data.resource_sets.clear();
            data.disabled = None;
        }
    }

    fn disable(&mut self, id: FgNodeId, err: FgConnectError) {
        let data = &mut self.nodes[id];
        if data.disabled.is_none() {
            log::warn!("node '{}' disabled for this attempt: {}", data.name, err);
            data.last_error = Some(err.to_string());
            data.disabled = Some(err);
        }
    }

    fn find_duplicate_input_name(data: &super::FgNodeData) -> Option<String> {
        // connector 名在节点内跨 image/buffer 也必须唯一，连接解析按名字查找
        let mut seen = HashSet::new();
        for name in data.image_inputs.iter().map(|i| &i.name).chain(data.buffer_inputs.iter().map(|i| &i.name)) {
            if !seen.insert(name.clone()) {
                return Some(name.clone());
            }
        }
        None
    }

    /// 节点的所有输入是否就绪：已解析、延迟、或确定保持未绑定的 optional
    fn inputs_satisfied(
        &self,
        id: FgNodeId,
        visited: &HashSet<FgNodeId>,
        desired_incoming: &HashMap<FgNodeId, Vec<(String, FgNodeId)>>,
    ) -> bool {
        let data = &self.nodes[id];
        let pending_desired = |name: &str| {
            desired_incoming
                .get(&id)
                .is_some_and(|list| list.iter().any(|(input, src)| input == name && self.nodes[*src].is_enabled()))
        };

        let image_ok = data.image_inputs.iter().enumerate().all(|(idx, in_desc)| {
            in_desc.delay > 0
                || data.image_input_sources[idx].is_some_and(|src| visited.contains(&src.node))
                || (in_desc.optional && !pending_desired(&in_desc.name))
        });
        let buffer_ok = data.buffer_inputs.iter().enumerate().all(|(idx, in_desc)| {
            in_desc.delay > 0
                || data.buffer_input_sources[idx].is_some_and(|src| visited.contains(&src.node))
                || (in_desc.optional && !pending_desired(&in_desc.name))
        });
        image_ok && buffer_ok
    }

    /// 访问一个节点：声明输出并解析以它为 src 的连接
    ///
    /// 返回 false 表示节点在这一步被禁用
    fn visit_node(&mut self, id: FgNodeId) -> bool {
        // 非延迟输入已解析，把上游输出描述交给节点来声明输出
        let data = &self.nodes[id];
        let connected_images = data
            .image_input_sources
            .iter()
            .zip(data.image_inputs.iter())
            .map(|(src, in_desc)| {
                if in_desc.delay > 0 {
                    None
                } else {
                    src.map(|s| self.nodes[s.node].image_outputs[s.output_idx].clone())
                }
            })
            .collect_vec();
        let connected_buffers = data
            .buffer_input_sources
            .iter()
            .zip(data.buffer_inputs.iter())
            .map(|(src, in_desc)| {
                if in_desc.delay > 0 {
                    None
                } else {
                    src.map(|s| self.nodes[s.node].buffer_outputs[s.output_idx].clone())
                }
            })
            .collect_vec();

        let connected = FgConnectedInputs {
            image_inputs: connected_images.iter().map(|o| o.as_ref()).collect(),
            buffer_inputs: connected_buffers.iter().map(|o| o.as_ref()).collect(),
        };

        match self.nodes[id].node.describe_outputs(&connected) {
            Ok((image_outputs, buffer_outputs)) => {
                let mut seen = HashSet::new();
                let dup = image_outputs
                    .iter()
                    .map(|o| &o.name)
                    .chain(buffer_outputs.iter().map(|o| &o.name))
                    .find(|name| !seen.insert((*name).clone()))
                    .cloned();
                if let Some(connector) = dup {
                    let node = self.nodes[id].name.clone();
                    self.disable(id, FgConnectError::DuplicateConnector { node, connector });
                    return false;
                }

                let data = &mut self.nodes[id];
                data.image_output_consumers = vec![Vec::new(); image_outputs.len()];
                data.buffer_output_consumers = vec![Vec::new(); buffer_outputs.len()];
                data.image_outputs = image_outputs;
                data.buffer_outputs = buffer_outputs;
            }
            Err(err) => {
                self.disable(id, err);
                return false;
            }
        }

        // 解析以本节点为 src 的连接
        let connections = self.nodes[id].connections.clone();
        for conn in &connections {
            if let Err((offender, err)) = self.resolve_connection(id, conn) {
                self.disable(offender, err);
            }
        }
        true
    }

    /// 解析一条连接并写入两端的记录
    ///
    /// 失败时返回要禁用的节点和原因
    fn resolve_connection(
        &mut self,
        src: FgNodeId,
        conn: &super::FgConnection,
    ) -> Result<(), (FgNodeId, FgConnectError)> {
        let src_name = self.nodes[src].name.clone();
        let dst = conn.dst;
        if !self.nodes.contains_key(dst) {
            // 目标节点已被移除，连接静默失效
            return Ok(());
        }
        let dst_name = self.nodes[dst].name.clone();

        // 只读校验
        let resolved = {
            let src_data = &self.nodes[src];
            let dst_data = &self.nodes[dst];
            if !dst_data.is_enabled() {
                return Ok(());
            }

            let image_out = src_data.image_output_index(&conn.src_output);
            let buffer_out = src_data.buffer_output_index(&conn.src_output);
            let image_in = dst_data.image_input_index(&conn.dst_input);
            let buffer_in = dst_data.buffer_input_index(&conn.dst_input);

            match (image_out, buffer_out) {
                (Some(out_idx), _) => match (image_in, buffer_in) {
                    (Some(in_idx), _) => ResolvedKind::Image { out_idx, in_idx },
                    (None, Some(_)) => {
                        return Err((dst, FgConnectError::KindMismatch {
                            src_node: src_name,
                            output: conn.src_output.clone(),
                            dst_node: dst_name,
                            input: conn.dst_input.clone(),
                        }));
                    }
                    (None, None) => {
                        return Err((dst, FgConnectError::UnknownInput {
                            node: dst_name,
                            input: conn.dst_input.clone(),
                        }));
                    }
                },
                (None, Some(out_idx)) => match (buffer_in, image_in) {
                    (Some(in_idx), _) => ResolvedKind::Buffer { out_idx, in_idx },
                    (None, Some(_)) => {
                        return Err((dst, FgConnectError::KindMismatch {
                            src_node: src_name,
                            output: conn.src_output.clone(),
                            dst_node: dst_name,
                            input: conn.dst_input.clone(),
                        }));
                    }
                    (None, None) => {
                        return Err((dst, FgConnectError::UnknownInput {
                            node: dst_name,
                            input: conn.dst_input.clone(),
                        }));
                    }
                },
                (None, None) => {
                    return Err((dst, FgConnectError::UnknownOutput {
                        node: src_name,
                        output: conn.src_output.clone(),
                    }));
                }
            }
        };

        match resolved {
            ResolvedKind::Image { out_idx, in_idx } => {
                let in_desc = self.nodes[dst].image_inputs[in_idx].clone();
                let out_desc = self.nodes[src].image_outputs[out_idx].clone();

                if self.nodes[dst].image_input_sources[in_idx].is_some() {
                    return Err((dst, FgConnectError::AlreadyConnected {
                        node: dst_name,
                        input: conn.dst_input.clone(),
                    }));
                }
                if src == dst && in_desc.delay == 0 {
                    return Err((dst, FgConnectError::SelfLoopWithoutDelay {
                        node: dst_name,
                        output: conn.src_output.clone(),
                        input: conn.dst_input.clone(),
                    }));
                }
                if out_desc.persistent && in_desc.delay > 0 {
                    return Err((dst, FgConnectError::PersistentDelayed {
                        src_node: src_name,
                        output: conn.src_output.clone(),
                        dst_node: dst_name,
                        input: conn.dst_input.clone(),
                    }));
                }
                // 同一个底层资源不能被同一个节点以不同 layout 消费，
                // 图只能为一次 process 提供一种 layout
                let conflict = self.nodes[src].image_output_consumers[out_idx].iter().any(|consumer| {
                    consumer.node == dst && {
                        let other = &self.nodes[dst].image_inputs[consumer.input_idx];
                        other.delay == in_desc.delay && other.layout != in_desc.layout
                    }
                });
                if conflict {
                    return Err((dst, FgConnectError::LayoutConflict {
                        src_node: src_name,
                        output: conn.src_output.clone(),
                        dst_node: dst_name,
                    }));
                }

                self.nodes[dst].image_input_sources[in_idx] = Some(FgSource { node: src, output_idx: out_idx });
                self.nodes[src].image_output_consumers[out_idx].push(FgConsumer { node: dst, input_idx: in_idx });
            }
            ResolvedKind::Buffer { out_idx, in_idx } => {
                let in_desc = self.nodes[dst].buffer_inputs[in_idx].clone();
                let out_desc = self.nodes[src].buffer_outputs[out_idx].clone();

                if self.nodes[dst].buffer_input_sources[in_idx].is_some() {
                    return Err((dst, FgConnectError::AlreadyConnected {
                        node: dst_name,
                        input: conn.dst_input.clone(),
                    }));
                }
                if src == dst && in_desc.delay == 0 {
                    return Err((dst, FgConnectError::SelfLoopWithoutDelay {
                        node: dst_name,
                        output: conn.src_output.clone(),
                        input: conn.dst_input.clone(),
                    }));
                }
                if out_desc.persistent && in_desc.delay > 0 {
                    return Err((dst, FgConnectError::PersistentDelayed {
                        src_node: src_name,
                        output: conn.src_output.clone(),
                        dst_node: dst_name,
                        input: conn.dst_input.clone(),
                    }));
                }

                self.nodes[dst].buffer_input_sources[in_idx] = Some(FgSource { node: src, output_idx: out_idx });
                self.nodes[src].buffer_output_consumers[out_idx].push(FgConsumer { node: dst, input_idx: in_idx });
            }
        }
        Ok(())
    }

    /// 给拓扑访问覆盖不到的节点定性：缺输入、上游失败、或 delay-0 环
    fn classify_unvisited(
        &mut self,
        node_ids: &[FgNodeId],
        visited: &HashSet<FgNodeId>,
        desired_incoming: &HashMap<FgNodeId, Vec<(String, FgNodeId)>>,
    ) {
        // 缺输入：非 optional 且没有任何期望连接
        for id in node_ids {
            if visited.contains(id) || !self.nodes[*id].is_enabled() {
                continue;
            }
            let data = &self.nodes[*id];
            let has_desired = |name: &str| {
                desired_incoming.get(id).is_some_and(|list| list.iter().any(|(input, _)| input == name))
            };
            let missing = data
                .image_inputs
                .iter()
                .enumerate()
                .filter(|(idx, in_desc)| {
                    !in_desc.optional && data.image_input_sources[*idx].is_none() && !has_desired(&in_desc.name)
                })
                .map(|(_, in_desc)| in_desc.name.clone())
                .chain(
                    data.buffer_inputs
                        .iter()
                        .enumerate()
                        .filter(|(idx, in_desc)| {
                            !in_desc.optional && data.buffer_input_sources[*idx].is_none() && !has_desired(&in_desc.name)
                        })
                        .map(|(_, in_desc)| in_desc.name.clone()),
                )
                .next();
            if let Some(input) = missing {
                let node = data.name.clone();
                self.disable(*id, FgConnectError::MissingInput { node, input });
            }
        }
    }

    /// 级联禁用：上游被禁用的节点同样被禁用，直到不动点
    fn cascade_disable(
        &mut self,
        node_ids: &[FgNodeId],
        visited: &HashSet<FgNodeId>,
        desired_incoming: &HashMap<FgNodeId, Vec<(String, FgNodeId)>>,
    ) {
        loop {
            let mut changed = false;
            for id in node_ids {
                if !self.nodes[*id].is_enabled() {
                    continue;
                }
                let data = &self.nodes[*id];

                // 已解析的输入指向被禁用的生产者
                let resolved_upstream = data
                    .image_input_sources
                    .iter()
                    .chain(data.buffer_input_sources.iter())
                    .flatten()
                    .find(|src| !self.nodes[src.node].is_enabled())
                    .map(|src| self.nodes[src.node].name.clone());

                // 未访问的节点：非 optional 的期望连接指向被禁用的生产者
                let desired_upstream = if visited.contains(id) {
                    None
                } else {
                    desired_incoming.get(id).and_then(|list| {
                        list.iter()
                            .find(|(input, src)| {
                                !self.nodes[*src].is_enabled()
                                    && self.input_is_required(*id, input)
                            })
                            .map(|(_, src)| self.nodes[*src].name.clone())
                    })
                };

                if let Some(upstream) = resolved_upstream.or(desired_upstream) {
                    let node = data.name.clone();
                    self.disable(*id, FgConnectError::UpstreamDisabled { node, upstream });
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        // 剩下的启用且未访问的节点只能是 delay-0 环的成员
        let stuck =
            node_ids.iter().copied().filter(|id| self.nodes[*id].is_enabled() && !visited.contains(id)).collect_vec();
        if !stuck.is_empty() {
            let names = stuck.iter().map(|id| self.nodes[*id].name.clone()).collect_vec();
            for id in stuck {
                self.disable(id, FgConnectError::DelayZeroCycle { nodes: names.clone() });
            }
        }
    }

    fn input_is_required(&self, id: FgNodeId, input: &str) -> bool {
        let data = &self.nodes[id];
        data.image_input_index(input).map(|idx| !data.image_inputs[idx].optional).unwrap_or(false)
            || data.buffer_input_index(input).map(|idx| !data.buffer_inputs[idx].optional).unwrap_or(false)
    }

    /// 把被禁用的消费者从输出的消费者列表里剥掉
    fn strip_disabled_consumers(&mut self) {
        let disabled: HashSet<FgNodeId> =
            self.nodes.iter().filter(|(_, data)| !data.is_enabled()).map(|(id, _)| id).collect();
        for (_, data) in self.nodes.iter_mut() {
            for consumers in data.image_output_consumers.iter_mut().chain(data.buffer_output_consumers.iter_mut()) {
                consumers.retain(|c| !disabled.contains(&c.node));
            }
        }
    }

    /// 每个输出：最大消费延迟决定版本数，消费者的 usage/stage/access 合并进规划
    fn plan_outputs(&mut self) {
        for id in self.topo_order.clone() {
            let image_count = self.nodes[id].image_outputs.len();
            let mut image_plans = Vec::with_capacity(image_count);
            for out_idx in 0..image_count {
                let out_desc = self.nodes[id].image_outputs[out_idx].clone();
                let consumers = self.nodes[id].image_output_consumers[out_idx].clone();

                let mut max_delay = 0u32;
                let mut usage = out_desc.usage;
                let mut input_stages = vk::PipelineStageFlags2::empty();
                let mut input_access = vk::AccessFlags2::empty();
                for consumer in &consumers {
                    let in_desc = &self.nodes[consumer.node].image_inputs[consumer.input_idx];
                    max_delay = max_delay.max(in_desc.delay);
                    usage |= in_desc.usage;
                    input_stages |= in_desc.stages;
                    input_access |= in_desc.access;
                }

                let versions = max_delay + 1;
                if versions > 1 {
                    // 历史版本在构建时清零，需要 transfer 写入
                    usage |= vk::ImageUsageFlags::TRANSFER_DST;
                }
                image_plans.push(FgImageOutputPlan {
                    versions,
                    usage,
                    input_stages,
                    input_access,
                    first_resource: 0,
                    alias_group: None,
                });
            }
            self.nodes[id].image_output_plans = image_plans;

            let buffer_count = self.nodes[id].buffer_outputs.len();
            let mut buffer_plans = Vec::with_capacity(buffer_count);
            for out_idx in 0..buffer_count {
                let out_desc = self.nodes[id].buffer_outputs[out_idx].clone();
                let consumers = self.nodes[id].buffer_output_consumers[out_idx].clone();

                let mut max_delay = 0u32;
                let mut usage = out_desc.usage;
                let mut input_stages = vk::PipelineStageFlags2::empty();
                let mut input_access = vk::AccessFlags2::empty();
                for consumer in &consumers {
                    let in_desc = &self.nodes[consumer.node].buffer_inputs[consumer.input_idx];
                    max_delay = max_delay.max(in_desc.delay);
                    usage |= in_desc.usage;
                    input_stages |= in_desc.stages;
                    input_access |= in_desc.access;
                }

                let versions = max_delay + 1;
                if versions > 1 {
                    usage |= vk::BufferUsageFlags::TRANSFER_DST;
                }
                buffer_plans.push(FgBufferOutputPlan {
                    versions,
                    usage,
                    input_stages,
                    input_access,
                    first_resource: 0,
                    alias_group: None,
                });
            }
            self.nodes[id].buffer_output_plans = buffer_plans;
        }
    }

    /// 按拓扑顺序给每份资源版本编号，build 阶段按同样的顺序分配
    fn assign_resource_specs(&mut self) {
        let mut image_specs = Vec::new();
        let mut buffer_specs = Vec::new();
        for id in &self.topo_order {
            let data = &mut self.nodes[*id];
            for (out_idx, plan) in data.image_output_plans.iter_mut().enumerate() {
                plan.first_resource = image_specs.len();
                for version in 0..plan.versions {
                    image_specs.push(FgResourceSpec { node: *id, output_idx: out_idx, version });
                }
            }
            for (out_idx, plan) in data.buffer_output_plans.iter_mut().enumerate() {
                plan.first_resource = buffer_specs.len();
                for version in 0..plan.versions {
                    buffer_specs.push(FgResourceSpec { node: *id, output_idx: out_idx, version });
                }
            }
        }
        self.image_specs = image_specs;
        self.buffer_specs = buffer_specs;
    }

    /// 每个节点：实例池大小 = 所有相关版本周期的最小公倍数，
    /// 向上取整到 RING_SIZE；并为每个 set 预先算好资源下标
    fn prepare_resource_sets(&mut self) {
        let mut computed: Vec<(FgNodeId, u32, Vec<FgResourceSet>)> = Vec::new();

        for id in &self.topo_order {
            let data = &self.nodes[*id];

            let mut cycle = 1u32;
            for src in data.image_input_sources.iter().flatten() {
                cycle = lcm(cycle, self.nodes[src.node].image_output_plans[src.output_idx].versions);
            }
            for src in data.buffer_input_sources.iter().flatten() {
                cycle = lcm(cycle, self.nodes[src.node].buffer_output_plans[src.output_idx].versions);
            }
            for plan in &data.image_output_plans {
                cycle = lcm(cycle, plan.versions);
            }
            for plan in &data.buffer_output_plans {
                cycle = lcm(cycle, plan.versions);
            }

            let set_count = pool_size(cycle, Self::RING_SIZE);

            let sets = (0..set_count)
                .map(|set_idx| FgResourceSet {
                    image_inputs: data
                        .image_input_sources
                        .iter()
                        .enumerate()
                        .map(|(in_idx, src)| {
                            src.map(|s| {
                                let plan = &self.nodes[s.node].image_output_plans[s.output_idx];
                                let versions = plan.versions;
                                let delay = data.image_inputs[in_idx].delay;
                                plan.first_resource + ((set_idx + versions - delay) % versions) as usize
                            })
                        })
                        .collect(),
                    buffer_inputs: data
                        .buffer_input_sources
                        .iter()
                        .enumerate()
                        .map(|(in_idx, src)| {
                            src.map(|s| {
                                let plan = &self.nodes[s.node].buffer_output_plans[s.output_idx];
                                let versions = plan.versions;
                                let delay = data.buffer_inputs[in_idx].delay;
                                plan.first_resource + ((set_idx + versions - delay) % versions) as usize
                            })
                        })
                        .collect(),
                    image_outputs: data
                        .image_output_plans
                        .iter()
                        .map(|plan| plan.first_resource + (set_idx % plan.versions) as usize)
                        .collect(),
                    buffer_outputs: data
                        .buffer_output_plans
                        .iter()
                        .map(|plan| plan.first_resource + (set_idx % plan.versions) as usize)
                        .collect(),
                })
                .collect_vec();

            computed.push((*id, set_count, sets));
        }

        for (id, set_count, sets) in computed {
            let data = &mut self.nodes[id];
            data.set_count = set_count;
            data.resource_sets = sets;
        }
    }

    /// 非持久、无延迟的资源做生命周期区间分析，互不交叠的共用显存
    fn plan_aliasing(&mut self) {
        let topo_pos: HashMap<FgNodeId, usize> =
            self.topo_order.iter().enumerate().map(|(pos, id)| (*id, pos)).collect();

        let mut image_intervals = Vec::new();
        for (spec_idx, spec) in self.image_specs.iter().enumerate() {
            let data = &self.nodes[spec.node];
            let out_desc = &data.image_outputs[spec.output_idx];
            let plan = &data.image_output_plans[spec.output_idx];
            if out_desc.persistent || plan.versions > 1 {
                continue;
            }
            let start = topo_pos[&spec.node];
            let end = data.image_output_consumers[spec.output_idx]
                .iter()
                .map(|c| topo_pos[&c.node])
                .max()
                .unwrap_or(start);
            image_intervals.push(FgAliasInterval { resource: spec_idx, start, end });
        }
        self.image_alias_groups = pack_intervals(&image_intervals);
        for (group_idx, group) in self.image_alias_groups.clone().into_iter().enumerate() {
            for spec_idx in group {
                let spec = self.image_specs[spec_idx];
                self.nodes[spec.node].image_output_plans[spec.output_idx].alias_group = Some(group_idx);
            }
        }

        let mut buffer_intervals = Vec::new();
        for (spec_idx, spec) in self.buffer_specs.iter().enumerate() {
            let data = &self.nodes[spec.node];
            let out_desc = &data.buffer_outputs[spec.output_idx];
            let plan = &data.buffer_output_plans[spec.output_idx];
            if out_desc.persistent || plan.versions > 1 {
                continue;
            }
            let start = topo_pos[&spec.node];
            let end = data.buffer_output_consumers[spec.output_idx]
                .iter()
                .map(|c| topo_pos[&c.node])
                .max()
                .unwrap_or(start);
            buffer_intervals.push(FgAliasInterval { resource: spec_idx, start, end });
        }
        self.buffer_alias_groups = pack_intervals(&buffer_intervals);
        for (group_idx, group) in self.buffer_alias_groups.clone().into_iter().enumerate() {
            for spec_idx in group {
                let spec = self.buffer_specs[spec_idx];
                self.nodes[spec.node].buffer_output_plans[spec.output_idx].alias_group = Some(group_idx);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use ash::vk;

    use super::*;
    use crate::connector::{FgBufferInput, FgBufferOutput, FgImageInput, FgImageOutput};
    use crate::error::{FgConnectError, FgProcessError};
    use crate::node::{FgConnectedInputs, FgNode, FgProcessContext};

    /// 可配置的测试节点：声明固定的 connector 列表
    struct TestNode {
        image_inputs: Vec<FgImageInput>,
        buffer_inputs: Vec<FgBufferInput>,
        image_outputs: Vec<FgImageOutput>,
        buffer_outputs: Vec<FgBufferOutput>,
        fail_outputs: bool,
    }

    impl TestNode {
        fn new() -> Self {
            Self {
                image_inputs: Vec::new(),
                buffer_inputs: Vec::new(),
                image_outputs: Vec::new(),
                buffer_outputs: Vec::new(),
                fail_outputs: false,
            }
        }

        fn image_in(mut self, input: FgImageInput) -> Self {
            self.image_inputs.push(input);
            self
        }

        fn buffer_in(mut self, input: FgBufferInput) -> Self {
            self.buffer_inputs.push(input);
            self
        }

        fn image_out(mut self, output: FgImageOutput) -> Self {
            self.image_outputs.push(output);
            self
        }

        fn buffer_out(mut self, output: FgBufferOutput) -> Self {
            self.buffer_outputs.push(output);
            self
        }

        fn failing(mut self) -> Self {
            self.fail_outputs = true;
            self
        }
    }

    impl FgNode for TestNode {
        fn type_name(&self) -> &'static str {
            "test"
        }

        fn describe_inputs(&mut self) -> (Vec<FgImageInput>, Vec<FgBufferInput>) {
            (self.image_inputs.clone(), self.buffer_inputs.clone())
        }

        fn describe_outputs(
            &mut self,
            _connected: &FgConnectedInputs,
        ) -> Result<(Vec<FgImageOutput>, Vec<FgBufferOutput>), FgConnectError> {
            if self.fail_outputs {
                return Err(FgConnectError::DescribeOutputs {
                    node: "test".to_string(),
                    reason: "forced failure".to_string(),
                });
            }
            Ok((self.image_outputs.clone(), self.buffer_outputs.clone()))
        }

        fn process(&mut self, _ctx: &mut FgProcessContext) -> Result<(), FgProcessError> {
            Ok(())
        }
    }

    fn image_source() -> TestNode {
        TestNode::new().image_out(FgImageOutput::compute_write("out", vk::Format::R16G16B16A16_SFLOAT, 64, 64))
    }

    fn image_sink(delay: u32) -> TestNode {
        TestNode::new().image_in(FgImageInput::compute_read("src").with_delay(delay))
    }

    fn image_filter() -> TestNode {
        TestNode::new()
            .image_in(FgImageInput::compute_read("src"))
            .image_out(FgImageOutput::compute_write("out", vk::Format::R16G16B16A16_SFLOAT, 64, 64))
    }

    use crate::graph::FgGraph;

    #[test]
    fn test_lcm_and_pool_size() {
        assert_eq!(lcm(2, 3), 6);
        assert_eq!(lcm(4, 2), 4);
        assert_eq!(pool_size(1, 2), 2);
        assert_eq!(pool_size(2, 2), 2);
        assert_eq!(pool_size(3, 2), 3);
        assert_eq!(pool_size(2, 3), 4);
        // 池大小永远是周期的整数倍且不小于 ring size
        for cycle in 1..8u32 {
            for ring in 1..8u32 {
                let pool = pool_size(cycle, ring);
                assert!(pool >= ring);
                assert_eq!(pool % cycle, 0);
            }
        }
    }

    #[test]
    fn test_linear_chain_topology() {
        let mut graph = FgGraph::new();
        let a = graph.add_node("a", Box::new(image_source())).unwrap();
        let b = graph.add_node("b", Box::new(image_filter())).unwrap();
        let c = graph.add_node("c", Box::new(image_sink(0))).unwrap();
        graph.connect(a, "out", b, "src");
        graph.connect(b, "out", c, "src");

        let report = graph.compile();

        assert_eq!(report.connected, 3);
        assert!(report.disabled.is_empty());
        assert_eq!(graph.topo_names(), vec!["a", "b", "c"]);
        // 没有延迟时实例池取 ring size
        assert_eq!(graph.set_count("a"), FgGraph::RING_SIZE);
        assert_eq!(graph.image_output_versions("a", "out"), 1);
    }

    #[test]
    fn test_delayed_consumer_gets_extra_versions() {
        // a --0-> b, a --1-> c："out" 需要 2 份版本
        let mut graph = FgGraph::new();
        let a = graph.add_node("a", Box::new(image_source())).unwrap();
        let b = graph.add_node("b", Box::new(image_sink(0))).unwrap();
        let c = graph.add_node("c", Box::new(image_sink(1))).unwrap();
        graph.connect(a, "out", b, "src");
        graph.connect(a, "out", c, "src");

        let report = graph.compile();
        assert!(report.disabled.is_empty());

        assert_eq!(graph.image_output_versions("a", "out"), 2);
        // b 读当前版本，c 读上一个迭代的版本
        for set_idx in 0..graph.set_count("b") {
            assert_eq!(
                graph.image_input_resource("b", "src", set_idx).unwrap(),
                graph.image_output_resource("a", "out", set_idx),
            );
        }
        let set_count = graph.set_count("c");
        for set_idx in 0..set_count {
            let prev = (set_idx + set_count - 1) % set_count;
            assert_eq!(
                graph.image_input_resource("c", "src", set_idx).unwrap(),
                graph.image_output_resource("a", "out", prev),
            );
        }
    }

    #[test]
    fn test_delay_two_pool_is_cycle_aligned() {
        let mut graph = FgGraph::new();
        let a = graph.add_node("a", Box::new(image_source())).unwrap();
        let b = graph.add_node("b", Box::new(image_sink(2))).unwrap();
        graph.connect(a, "out", b, "src");

        graph.compile();

        assert_eq!(graph.image_output_versions("a", "out"), 3);
        let pool = graph.set_count("b");
        assert!(pool >= FgGraph::RING_SIZE);
        assert_eq!(pool % 3, 0);
    }

    #[test]
    fn test_self_feedback_with_delay() {
        // 自环 + delay 1：上一个迭代的自身输出
        let mut graph = FgGraph::new();
        let a = graph.add_node(
            "accum",
            Box::new(
                TestNode::new()
                    .image_in(FgImageInput::compute_read("prev").with_delay(1))
                    .image_out(FgImageOutput::compute_write("out", vk::Format::R16G16B16A16_SFLOAT, 64, 64)),
            ),
        )
        .unwrap();
        graph.connect(a, "out", a, "prev");

        let report = graph.compile();
        assert!(report.disabled.is_empty());

        assert_eq!(graph.image_output_versions("accum", "out"), 2);
        let pool = graph.set_count("accum");
        for set_idx in 0..pool {
            let prev = (set_idx + pool - 1) % pool;
            assert_eq!(
                graph.image_input_resource("accum", "prev", set_idx).unwrap(),
                graph.image_output_resource("accum", "out", prev),
            );
        }
    }

    #[test]
    fn test_self_loop_without_delay_is_rejected() {
        let mut graph = FgGraph::new();
        let a = graph.add_node(
            "bad",
            Box::new(
                TestNode::new()
                    .image_in(FgImageInput::compute_read("prev"))
                    .image_out(FgImageOutput::compute_write("out", vk::Format::R16G16B16A16_SFLOAT, 64, 64)),
            ),
        )
        .unwrap();
        graph.connect(a, "out", a, "prev");

        graph.compile();

        assert!(graph.is_disabled("bad"));
        assert!(matches!(graph.disable_reason("bad"), Some(FgConnectError::SelfLoopWithoutDelay { .. })));
    }

    #[test]
    fn test_optional_unbound_input() {
        let mut graph = FgGraph::new();
        graph
            .add_node(
                "solo",
                Box::new(
                    TestNode::new()
                        .image_in(FgImageInput::compute_read("extra").optional())
                        .image_out(FgImageOutput::compute_write("out", vk::Format::R8G8B8A8_UNORM, 8, 8)),
                ),
            )
            .unwrap();

        let report = graph.compile();

        // 未连接的 optional 输入不会让节点失败
        assert!(report.disabled.is_empty());
        assert!(!graph.is_image_input_connected("solo", "extra"));
        // 槽位保留，表形状在（解）绑定之间不变；资源下标为 None → 占位资源
        assert_eq!(graph.binding_layout("solo").slot_count(), 2);
        assert_eq!(graph.image_input_resource("solo", "extra", 0), None);
    }

    #[test]
    fn test_missing_required_input_cascades() {
        let mut graph = FgGraph::new();
        let orphan = graph.add_node("orphan", Box::new(image_filter())).unwrap();
        let down = graph.add_node("down", Box::new(image_sink(0))).unwrap();
        let solo = graph.add_node("solo", Box::new(image_source())).unwrap();
        let _ = solo;
        graph.connect(orphan, "out", down, "src");

        let report = graph.compile();

        assert!(matches!(graph.disable_reason("orphan"), Some(FgConnectError::MissingInput { .. })));
        assert!(matches!(graph.disable_reason("down"), Some(FgConnectError::UpstreamDisabled { .. })));
        // 其余子图照常工作
        assert!(!graph.is_disabled("solo"));
        assert_eq!(report.connected, 1);
    }

    #[test]
    fn test_describe_outputs_failure_cascades() {
        let mut graph = FgGraph::new();
        let a = graph.add_node("broken", Box::new(image_source().failing())).unwrap();
        let b = graph.add_node("down", Box::new(image_sink(0))).unwrap();
        graph.connect(a, "out", b, "src");

        graph.compile();

        assert!(matches!(graph.disable_reason("broken"), Some(FgConnectError::DescribeOutputs { .. })));
        assert!(matches!(graph.disable_reason("down"), Some(FgConnectError::UpstreamDisabled { .. })));
        // 诊断保留到下一次成功编译
        assert!(graph.last_error("broken").is_some());
    }

    #[test]
    fn test_duplicate_node_name_rejected() {
        let mut graph = FgGraph::new();
        graph.add_node("a", Box::new(image_source())).unwrap();
        let err = graph.add_node("a", Box::new(image_source())).unwrap_err();
        assert!(matches!(err, FgConnectError::DuplicateNodeName(_)));
    }

    #[test]
    fn test_kind_mismatch_disables_consumer() {
        let mut graph = FgGraph::new();
        let a = graph.add_node("a", Box::new(image_source())).unwrap();
        let b = graph
            .add_node("b", Box::new(TestNode::new().buffer_in(FgBufferInput::compute_read("src"))))
            .unwrap();
        graph.connect(a, "out", b, "src");

        graph.compile();

        assert!(matches!(graph.disable_reason("b"), Some(FgConnectError::KindMismatch { .. })));
        assert!(!graph.is_disabled("a"));
    }

    #[test]
    fn test_layout_conflict_disables_consumer() {
        // 同一个资源版本被同一个节点以 sampled + storage 两种 layout 消费
        let mut graph = FgGraph::new();
        let a = graph.add_node("a", Box::new(image_source())).unwrap();
        let b = graph
            .add_node(
                "b",
                Box::new(
                    TestNode::new()
                        .image_in(FgImageInput::compute_read("tex"))
                        .image_in(FgImageInput::storage_read("img")),
                ),
            )
            .unwrap();
        graph.connect(a, "out", b, "tex");
        graph.connect(a, "out", b, "img");

        graph.compile();

        assert!(matches!(graph.disable_reason("b"), Some(FgConnectError::LayoutConflict { .. })));
    }

    #[test]
    fn test_persistent_output_rejects_delay() {
        let mut graph = FgGraph::new();
        let a = graph
            .add_node(
                "a",
                Box::new(TestNode::new().image_out(
                    FgImageOutput::compute_write("out", vk::Format::R16G16B16A16_SFLOAT, 64, 64).persistent(),
                )),
            )
            .unwrap();
        let b = graph.add_node("b", Box::new(image_sink(1))).unwrap();
        graph.connect(a, "out", b, "src");

        graph.compile();

        assert!(matches!(graph.disable_reason("b"), Some(FgConnectError::PersistentDelayed { .. })));
        assert!(!graph.is_disabled("a"));
    }

    #[test]
    fn test_delay_zero_cycle_detected() {
        let mut graph = FgGraph::new();
        let a = graph.add_node("a", Box::new(image_filter())).unwrap();
        let b = graph.add_node("b", Box::new(image_filter())).unwrap();
        graph.connect(a, "out", b, "src");
        graph.connect(b, "out", a, "src");

        let report = graph.compile();

        assert_eq!(report.connected, 0);
        assert!(matches!(graph.disable_reason("a"), Some(FgConnectError::DelayZeroCycle { .. })));
        assert!(matches!(graph.disable_reason("b"), Some(FgConnectError::DelayZeroCycle { .. })));
    }

    #[test]
    fn test_binding_layout_stable_across_recompiles() {
        let mut graph = FgGraph::new();
        let a = graph.add_node("a", Box::new(image_source())).unwrap();
        let b = graph.add_node("b", Box::new(image_filter())).unwrap();
        graph.connect(a, "out", b, "src");

        graph.compile();
        let first = graph
            .binding_layout("b")
            .slots
            .iter()
            .map(|s| (s.binding, s.name.clone(), s.descriptor_type))
            .collect::<Vec<_>>();

        graph.compile();
        let second = graph
            .binding_layout("b")
            .slots
            .iter()
            .map(|s| (s.binding, s.name.clone(), s.descriptor_type))
            .collect::<Vec<_>>();

        assert_eq!(first, second);
    }

    #[test]
    fn test_mixed_cycles_use_lcm() {
        // b 同时读 2 版本和 3 版本的输出：池大小是 6 的倍数
        let mut graph = FgGraph::new();
        let a = graph
            .add_node(
                "a",
                Box::new(
                    image_source()
                        .image_out(FgImageOutput::compute_write("out2", vk::Format::R16G16B16A16_SFLOAT, 64, 64)),
                ),
            )
            .unwrap();
        let b = graph
            .add_node(
                "b",
                Box::new(
                    TestNode::new()
                        .image_in(FgImageInput::compute_read("near").with_delay(1))
                        .image_in(FgImageInput::compute_read("far").with_delay(2)),
                ),
            )
            .unwrap();
        graph.connect(a, "out", b, "near");
        graph.connect(a, "out2", b, "far");

        let report = graph.compile();
        assert!(report.disabled.is_empty());

        assert_eq!(graph.image_output_versions("a", "out"), 2);
        assert_eq!(graph.image_output_versions("a", "out2"), 3);
        let pool = graph.set_count("b");
        assert_eq!(pool % 6, 0);
        assert!(pool >= FgGraph::RING_SIZE);
    }

    #[test]
    fn test_transient_chain_aliases_memory() {
        // a → b → c → d 链：a.out 活跃区间 [0,1]，c.out 活跃区间 [2,3]，可以共用显存
        let mut graph = FgGraph::new();
        let a = graph.add_node("a", Box::new(image_source())).unwrap();
        let b = graph.add_node("b", Box::new(image_filter())).unwrap();
        let c = graph.add_node("c", Box::new(image_filter())).unwrap();
        let d = graph.add_node("d", Box::new(image_sink(0))).unwrap();
        graph.connect(a, "out", b, "src");
        graph.connect(b, "out", c, "src");
        graph.connect(c, "out", d, "src");

        graph.compile();

        assert_eq!(graph.image_alias_groups.len(), 1);
        let group = &graph.image_alias_groups[0];
        assert_eq!(group.len(), 2);
        // 组内资源的活跃区间互不交叠：a.out 和 c.out
        let members = group
            .iter()
            .map(|spec_idx| {
                let spec = graph.image_specs[*spec_idx];
                graph.nodes[spec.node].name.clone()
            })
            .collect::<Vec<_>>();
        assert_eq!(members, vec!["a", "c"]);
    }

    #[test]
    fn test_persistent_and_delayed_excluded_from_aliasing() {
        let mut graph = FgGraph::new();
        let a = graph
            .add_node(
                "a",
                Box::new(TestNode::new().image_out(
                    FgImageOutput::compute_write("out", vk::Format::R16G16B16A16_SFLOAT, 64, 64).persistent(),
                )),
            )
            .unwrap();
        let b = graph.add_node("b", Box::new(image_filter())).unwrap();
        let c = graph.add_node("c", Box::new(image_sink(1))).unwrap();
        graph.connect(a, "out", b, "src");
        graph.connect(b, "out", c, "src");

        graph.compile();

        // a.out 持久、b.out 有延迟消费者：都不参与别名
        assert!(graph.image_alias_groups.is_empty());
    }

    #[test]
    fn test_recompile_after_reconnect_updates_versions() {
        // 重连把延迟消费者加进来之后，版本数跟着变化
        let mut graph = FgGraph::new();
        let a = graph.add_node("a", Box::new(image_source())).unwrap();
        let b = graph.add_node("b", Box::new(image_sink(0))).unwrap();
        graph.connect(a, "out", b, "src");
        graph.compile();
        assert_eq!(graph.image_output_versions("a", "out"), 1);

        let c = graph.add_node("c", Box::new(image_sink(1))).unwrap();
        graph.connect(a, "out", c, "src");
        graph.compile();
        assert_eq!(graph.image_output_versions("a", "out"), 2);
    }
}
