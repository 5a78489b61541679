//! 执行阶段：每个迭代的调度
//!
//! 对迭代 i：聚合所有节点的 pre_process 标志（必要时先重建图），
//! 然后按拓扑顺序，对每个节点选中实例 `i % pool`，只刷新脏槽位，
//! 把本节点的所有 barrier 合并成一次同步调用，再录制 process。
//! 节点之间只在真实的生产者→消费者冒险处串行化，互相独立的工作
//! GPU 可以自由并行。

use ash::vk;
use fluxis_gfx::basic::color::LabelColor;
use fluxis_gfx::commands::barrier::{GfxBufferBarrier, GfxImageBarrier};
use fluxis_gfx::commands::command_buffer::GfxCommandBuffer;
use fluxis_gfx::descriptors::set::GfxWriteDescriptorSet;
use fluxis_gfx::gfx::Gfx;

use crate::node::{FgNodeFlags, FgProcessContext};
use crate::run_info::FgRunInfo;

use super::build::{FgGraphRuntime, writes_for_slots};
use super::{FgGraph, FgNodeId};

impl FgGraph {
    /// 运行一个迭代
    ///
    /// 首次调用或有重建请求时会先编译 + 构建。调用方负责用 ring fence
    /// 限制在飞迭代数：迭代 i 的命令未确认完成前，不得进入迭代
    /// i + RING_SIZE 的录制。
    pub fn run(&mut self, cmd: &GfxCommandBuffer) -> &FgRunInfo {
        // pre_process 可能继续请求重连，循环直到没有新请求
        loop {
            if self.rebuild_requested {
                self.rebuild(cmd);
            }

            let mut again = false;
            let mut removals: Vec<FgNodeId> = Vec::new();
            for id in self.topo_order.clone() {
                let data = &mut self.nodes[id];
                data.status = data.node.pre_process(self.current_iteration);
                if data.status.contains(FgNodeFlags::NEEDS_RECONNECT) {
                    log::info!("node '{}' requested reconnect", data.name);
                    again = true;
                }
                if data.status.contains(FgNodeFlags::REMOVE_NODE) {
                    removals.push(id);
                }
            }
            for id in removals {
                self.remove_node(id);
                again = true;
            }
            if !again {
                break;
            }
            self.rebuild_requested = true;
        }

        self.run_info.reset(self.current_iteration);
        let mut runtime = self.runtime.take().expect("graph runtime not built");

        // 请求重置历史数据的节点：延迟输出的版本重新清零
        for id in self.topo_order.clone() {
            if self.nodes[id].status.contains(FgNodeFlags::RESET_IN_FLIGHT_DATA) {
                self.clear_node_history(id, &mut runtime, cmd, false);
            }
        }

        for id in self.topo_order.clone() {
            if self.nodes[id].status.contains(FgNodeFlags::SKIP_RUN) {
                continue;
            }

            let set_idx = (self.current_iteration % self.nodes[id].set_count as u64) as usize;

            // binding table 刷新是 per-instance 的：一个实例只应用
            // 自上次被选中以来排队的更新
            {
                let data = &self.nodes[id];
                let binding = runtime.bindings.get_mut(id).unwrap();
                if !binding.instances.is_empty() {
                    let stale = binding.tracker.select(set_idx);
                    if !stale.is_empty() {
                        let writes = writes_for_slots(
                            data,
                            &data.resource_sets[set_idx],
                            binding.instances[set_idx].handle(),
                            &stale,
                            &runtime.image_resources,
                            &runtime.buffer_resources,
                            runtime.placeholder_view.handle(),
                            runtime.placeholder_buffer.vk_buffer(),
                            runtime.sampler.handle(),
                        );
                        GfxWriteDescriptorSet::flush(&writes);
                    }
                }
            }

            let label = format!("{} ({})", self.nodes[id].name, self.nodes[id].node.type_name());
            cmd.begin_label(&label, LabelColor::COLOR_NODE);

            self.record_node_barriers(id, set_idx, &mut runtime, cmd);

            let descriptor_set = runtime.bindings.get(id).and_then(|b| b.instances.get(set_idx)).map(|s| s.handle());
            let data = &mut self.nodes[id];
            let set = &data.resource_sets[set_idx];
            let mut ctx = FgProcessContext {
                cmd,
                iteration: self.current_iteration,
                set_index: set_idx as u32,
                descriptor_set,
                image_inputs: set
                    .image_inputs
                    .iter()
                    .map(|res_idx| res_idx.map(|idx| &runtime.image_resources[idx]))
                    .collect(),
                buffer_inputs: set
                    .buffer_inputs
                    .iter()
                    .map(|res_idx| res_idx.map(|idx| &runtime.buffer_resources[idx]))
                    .collect(),
                image_outputs: set.image_outputs.iter().map(|idx| &runtime.image_resources[*idx]).collect(),
                buffer_outputs: set.buffer_outputs.iter().map(|idx| &runtime.buffer_resources[*idx]).collect(),
                run: &mut self.run_info,
            };
            let result = data.node.process(&mut ctx);
            cmd.end_label();

            if let Err(err) = result {
                // best-effort：收完当前命令流，下个迭代之前强制重建
                log::error!("{}", err);
                data.last_error = Some(err.to_string());
                self.run_info.record_error(err);
                self.rebuild_requested = true;
            }
        }

        self.runtime = Some(runtime);
        self.rebuild_requested |= self.run_info.rebuild_requested();
        self.current_iteration += 1;
        &self.run_info
    }

    /// 重新编译并构建；保证此前在飞的 GPU 工作已经完成
    fn rebuild(&mut self, cmd: &GfxCommandBuffer) {
        Gfx::get().wait_idle();
        self.compile();
        self.build_runtime(cmd);
        self.rebuild_requested = false;
    }

    /// 销毁图持有的所有 GPU 资源
    ///
    /// 必须在 Gfx::destroy 之前调用
    pub fn shutdown(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            Gfx::get().wait_idle();
            runtime.destroy_all();
        }
        self.rebuild_requested = true;
    }

    /// 为一个节点插入它在 set_idx 下需要的全部 barrier，合并成一次调用
    fn record_node_barriers(&mut self, id: FgNodeId, set_idx: usize, runtime: &mut FgGraphRuntime, cmd: &GfxCommandBuffer) {
        let data = &self.nodes[id];
        let set = &data.resource_sets[set_idx];

        let mut image_barriers: Vec<GfxImageBarrier> = Vec::new();
        let mut buffer_barriers: Vec<GfxBufferBarrier> = Vec::new();

        // 输入：上一次作为输出写入的资源需要 写→读 的同步与 layout 转换；
        // 连续只读之间最多需要 layout 转换
        for (in_idx, res_idx) in set.image_inputs.iter().enumerate() {
            let Some(res_idx) = res_idx else { continue };
            let in_desc = &data.image_inputs[in_idx];
            let res = &mut runtime.image_resources[*res_idx];

            if res.last_used_as_output {
                image_barriers.push(
                    GfxImageBarrier::new()
                        .image(res.image.handle())
                        .layout_transfer(res.current_layout, in_desc.layout)
                        .src_mask(res.current_stages, res.current_access)
                        .dst_mask(res.input_stages, res.input_access),
                );
                res.current_layout = in_desc.layout;
                res.current_stages = res.input_stages;
                res.current_access = res.input_access;
                res.last_used_as_output = false;
            } else if res.current_layout != in_desc.layout {
                image_barriers.push(
                    GfxImageBarrier::new()
                        .image(res.image.handle())
                        .layout_transfer(res.current_layout, in_desc.layout)
                        .src_mask(res.current_stages, res.current_access)
                        .dst_mask(res.input_stages, res.input_access),
                );
                res.current_layout = in_desc.layout;
            }
        }
        for res_idx in set.buffer_inputs.iter().flatten() {
            let res = &mut runtime.buffer_resources[*res_idx];
            if res.last_used_as_output {
                buffer_barriers.push(
                    GfxBufferBarrier::new()
                        .buffer(res.buffer.vk_buffer(), 0, vk::WHOLE_SIZE)
                        .src_mask(res.current_stages, res.current_access)
                        .dst_mask(res.input_stages, res.input_access),
                );
                res.current_stages = res.input_stages;
                res.current_access = res.input_access;
                res.last_used_as_output = false;
            }
        }

        // 输出：非持久输出丢弃旧内容（UNDEFINED 起始）；
        // 别名显存的 src 侧必须覆盖共享这块显存的所有既往访问
        for (out_idx, res_idx) in set.image_outputs.iter().enumerate() {
            let out_desc = &data.image_outputs[out_idx];
            let plan = &data.image_output_plans[out_idx];
            let res = &mut runtime.image_resources[*res_idx];

            let (old_layout, src_stages, src_access) = if plan.alias_group.is_some() {
                (
                    vk::ImageLayout::UNDEFINED,
                    vk::PipelineStageFlags2::ALL_COMMANDS,
                    vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE,
                )
            } else if out_desc.persistent {
                (res.current_layout, res.current_stages, res.current_access)
            } else {
                (vk::ImageLayout::UNDEFINED, res.current_stages, res.current_access)
            };
            image_barriers.push(
                GfxImageBarrier::new()
                    .image(res.image.handle())
                    .layout_transfer(old_layout, out_desc.layout)
                    .src_mask(src_stages, src_access)
                    .dst_mask(out_desc.stages, out_desc.access),
            );
            res.current_layout = out_desc.layout;
            res.current_stages = out_desc.stages;
            res.current_access = out_desc.access;
            res.last_used_as_output = true;
        }
        for (out_idx, res_idx) in set.buffer_outputs.iter().enumerate() {
            let out_desc = &data.buffer_outputs[out_idx];
            let plan = &data.buffer_output_plans[out_idx];
            let res = &mut runtime.buffer_resources[*res_idx];

            let (src_stages, src_access) = if plan.alias_group.is_some() {
                (
                    vk::PipelineStageFlags2::ALL_COMMANDS,
                    vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE,
                )
            } else {
                (res.current_stages, res.current_access)
            };
            buffer_barriers.push(
                GfxBufferBarrier::new()
                    .buffer(res.buffer.vk_buffer(), 0, vk::WHOLE_SIZE)
                    .src_mask(src_stages, src_access)
                    .dst_mask(out_desc.stages, out_desc.access),
            );
            res.current_stages = out_desc.stages;
            res.current_access = out_desc.access;
            res.last_used_as_output = true;
        }

        cmd.pipeline_barrier(vk::DependencyFlags::empty(), &image_barriers, &buffer_barriers);
    }
}
