//! 构建（实现）阶段
//!
//! 把编译规划变成真实的 GPU 对象：按资源清单分配 image/buffer，
//! 别名组绑定到共享 heap，创建 descriptor set layout 与实例池，
//! 做一次全量的 binding 写入，清零延迟输出的历史版本，
//! 最后通知每个节点 on_connected。
//!
//! 调用前必须保证之前在飞的 GPU 工作已经完成。

use std::collections::HashMap;

use ash::vk;
use fluxis_gfx::commands::barrier::GfxImageBarrier;
use fluxis_gfx::commands::command_buffer::GfxCommandBuffer;
use fluxis_gfx::descriptors::layout::{GfxDescriptorBinding, GfxDescriptorSetLayout};
use fluxis_gfx::descriptors::pool::GfxDescriptorPool;
use fluxis_gfx::descriptors::set::{GfxDescriptorSet, GfxWriteDescriptorSet};
use fluxis_gfx::foundation::vmem_allocator::GfxAliasingHeap;
use fluxis_gfx::gfx::Gfx;
use fluxis_gfx::resources::buffer::GfxBuffer;
use fluxis_gfx::resources::image::{GfxImage, GfxImageCreateInfo};
use fluxis_gfx::resources::image_view::{GfxImageView, GfxImageViewDesc};
use fluxis_gfx::sampler::GfxSampler;
use itertools::Itertools;
use slotmap::SecondaryMap;

use crate::binding::{FgDirtyTracker, FgNodeBindingInfo, FgSlotSource};
use crate::resource::{FgBufferResource, FgImageResource};

use super::{FgGraph, FgNodeData, FgNodeId, FgResourceSet};

/// 节点 binding table 的运行时状态
pub(crate) struct FgNodeBinding {
    pub set_layout: Option<GfxDescriptorSetLayout>,
    /// 每个 set_idx 一个实例
    pub instances: Vec<GfxDescriptorSet>,
    pub tracker: FgDirtyTracker,
}

/// 构建阶段的产物，重连时整体换新
pub(crate) struct FgGraphRuntime {
    pub image_resources: Vec<FgImageResource>,
    pub buffer_resources: Vec<FgBufferResource>,
    /// 持久资源的身份 (节点名, 输出名)；重连时据此保留
    pub image_keys: Vec<Option<(String, String)>>,
    pub buffer_keys: Vec<Option<(String, String)>>,

    pub image_heaps: Vec<GfxAliasingHeap>,
    pub buffer_heaps: Vec<GfxAliasingHeap>,

    /// optional 未连接的槽位写入的占位资源
    pub placeholder_image: GfxImage,
    pub placeholder_view: GfxImageView,
    pub placeholder_buffer: GfxBuffer,
    /// COMBINED_IMAGE_SAMPLER 槽位使用的默认 sampler
    pub sampler: GfxSampler,

    pub descriptor_pool: Option<GfxDescriptorPool>,
    pub bindings: SecondaryMap<FgNodeId, FgNodeBinding>,
}

impl FgGraphRuntime {
    /// 拆解运行时；持久资源移交给 carried 表，其余销毁
    fn dismantle(
        self,
        carried_images: &mut HashMap<(String, String), FgImageResource>,
        carried_buffers: &mut HashMap<(String, String), FgBufferResource>,
    ) {
        for (res, key) in self.image_resources.into_iter().zip(self.image_keys) {
            match key {
                Some(key) => {
                    carried_images.insert(key, res);
                }
                None => res.destroy(),
            }
        }
        for (res, key) in self.buffer_resources.into_iter().zip(self.buffer_keys) {
            match key {
                Some(key) => {
                    carried_buffers.insert(key, res);
                }
                None => res.destroy(),
            }
        }

        let allocator = Gfx::get().allocator();
        for heap in self.image_heaps {
            heap.destroy(allocator);
        }
        for heap in self.buffer_heaps {
            heap.destroy(allocator);
        }

        self.placeholder_view.destroy();
        self.placeholder_image.destroy();
        self.placeholder_buffer.destroy();
        self.sampler.destroy();

        for (_, binding) in self.bindings {
            if let Some(layout) = binding.set_layout {
                layout.destroy();
            }
        }
        if let Some(pool) = self.descriptor_pool {
            pool.destroy();
        }
    }

    /// 彻底销毁，不保留任何持久资源
    pub(crate) fn destroy_all(self) {
        let mut images = HashMap::new();
        let mut buffers = HashMap::new();
        self.dismantle(&mut images, &mut buffers);
        for (_, res) in images {
            res.destroy();
        }
        for (_, res) in buffers {
            res.destroy();
        }
    }
}

enum PendingImage {
    /// 从上一个运行时保留下来的持久资源，状态一并保留
    Carried(FgImageResource),
    Fresh(GfxImage),
}

enum PendingBuffer {
    Carried(FgBufferResource),
    Fresh(GfxBuffer),
}

impl FgGraph {
    /// 按编译规划分配资源与 binding table，并录制初始化命令
    pub(crate) fn build_runtime(&mut self, cmd: &GfxCommandBuffer) {
        let mut carried_images: HashMap<(String, String), FgImageResource> = HashMap::new();
        let mut carried_buffers: HashMap<(String, String), FgBufferResource> = HashMap::new();
        if let Some(old) = self.runtime.take() {
            old.dismantle(&mut carried_images, &mut carried_buffers);
        }

        // 1. image：持久的尽量保留，别名的先创建后绑定
        let mut pending_images = Vec::with_capacity(self.image_specs.len());
        let mut image_keys = Vec::with_capacity(self.image_specs.len());
        for spec in &self.image_specs {
            let data = &self.nodes[spec.node];
            let out_desc = &data.image_outputs[spec.output_idx];
            let plan = &data.image_output_plans[spec.output_idx];
            let name = format!("{}-{}-{}", data.name, out_desc.name, spec.version);
            let create_info = GfxImageCreateInfo::new_image_2d_info(out_desc.extent, out_desc.format, plan.usage);

            if out_desc.persistent {
                image_keys.push(Some((data.name.clone(), out_desc.name.clone())));
                let key = (data.name.clone(), out_desc.name.clone());
                let carried = carried_images.remove(&key).filter(|res| {
                    res.image.format() == out_desc.format
                        && res.image.extent_2d() == out_desc.extent
                        && res.image.usage() == plan.usage
                });
                match carried {
                    Some(mut res) => {
                        res.input_stages = plan.input_stages;
                        res.input_access = plan.input_access;
                        pending_images.push(PendingImage::Carried(res));
                        continue;
                    }
                    None => {
                        pending_images.push(PendingImage::Fresh(GfxImage::new(
                            &create_info,
                            &vk_mem::AllocationCreateInfo {
                                usage: vk_mem::MemoryUsage::AutoPreferDevice,
                                ..Default::default()
                            },
                            &name,
                        )));
                        continue;
                    }
                }
            }

            image_keys.push(None);
            if plan.alias_group.is_some() {
                pending_images.push(PendingImage::Fresh(GfxImage::new_for_aliasing(&create_info, &name)));
            } else {
                pending_images.push(PendingImage::Fresh(GfxImage::new(
                    &create_info,
                    &vk_mem::AllocationCreateInfo {
                        usage: vk_mem::MemoryUsage::AutoPreferDevice,
                        ..Default::default()
                    },
                    &name,
                )));
            }
        }
        // 保留失败（形状变化）的持久资源在这里销毁
        for (_, res) in carried_images {
            res.destroy();
        }

        let image_heaps = self
            .image_alias_groups
            .iter()
            .enumerate()
            .map(|(group_idx, group)| {
                let requirements = group
                    .iter()
                    .map(|spec_idx| match &pending_images[*spec_idx] {
                        PendingImage::Fresh(image) => image.memory_requirements(),
                        PendingImage::Carried(_) => unreachable!("persistent resources are never aliased"),
                    })
                    .collect_vec();
                let heap =
                    GfxAliasingHeap::new(Gfx::get().allocator(), &requirements, format!("graph-image-alias-{}", group_idx));
                for spec_idx in group {
                    match &pending_images[*spec_idx] {
                        PendingImage::Fresh(image) => image.bind_to_heap(&heap),
                        PendingImage::Carried(_) => unreachable!(),
                    }
                }
                heap
            })
            .collect_vec();

        let mut image_resources = Vec::with_capacity(pending_images.len());
        for (spec, pending) in self.image_specs.iter().zip(pending_images) {
            match pending {
                PendingImage::Carried(res) => image_resources.push(res),
                PendingImage::Fresh(image) => {
                    let data = &self.nodes[spec.node];
                    let out_desc = &data.image_outputs[spec.output_idx];
                    let plan = &data.image_output_plans[spec.output_idx];
                    let view = GfxImageView::new(
                        &image,
                        GfxImageViewDesc::new_2d(out_desc.format, vk::ImageAspectFlags::COLOR),
                        format!("{}-{}-{}", data.name, out_desc.name, spec.version),
                    );
                    image_resources.push(FgImageResource::new(image, view, plan.input_stages, plan.input_access));
                }
            }
        }

        // 2. buffer
        let mut pending_buffers = Vec::with_capacity(self.buffer_specs.len());
        let mut buffer_keys = Vec::with_capacity(self.buffer_specs.len());
        for spec in &self.buffer_specs {
            let data = &self.nodes[spec.node];
            let out_desc = &data.buffer_outputs[spec.output_idx];
            let plan = &data.buffer_output_plans[spec.output_idx];
            let name = format!("{}-{}-{}", data.name, out_desc.name, spec.version);

            if out_desc.persistent {
                buffer_keys.push(Some((data.name.clone(), out_desc.name.clone())));
                let key = (data.name.clone(), out_desc.name.clone());
                let carried = carried_buffers
                    .remove(&key)
                    .filter(|res| res.buffer.size() == out_desc.size && res.buffer.usage() == plan.usage);
                match carried {
                    Some(mut res) => {
                        res.input_stages = plan.input_stages;
                        res.input_access = plan.input_access;
                        pending_buffers.push(PendingBuffer::Carried(res));
                        continue;
                    }
                    None => {
                        pending_buffers.push(PendingBuffer::Fresh(GfxBuffer::new(out_desc.size, plan.usage, false, &name)));
                        continue;
                    }
                }
            }

            buffer_keys.push(None);
            if plan.alias_group.is_some() {
                pending_buffers.push(PendingBuffer::Fresh(GfxBuffer::new_for_aliasing(out_desc.size, plan.usage, &name)));
            } else {
                pending_buffers.push(PendingBuffer::Fresh(GfxBuffer::new(out_desc.size, plan.usage, false, &name)));
            }
        }
        for (_, res) in carried_buffers {
            res.destroy();
        }

        let buffer_heaps = self
            .buffer_alias_groups
            .iter()
            .enumerate()
            .map(|(group_idx, group)| {
                let requirements = group
                    .iter()
                    .map(|spec_idx| match &pending_buffers[*spec_idx] {
                        PendingBuffer::Fresh(buffer) => buffer.memory_requirements(),
                        PendingBuffer::Carried(_) => unreachable!("persistent resources are never aliased"),
                    })
                    .collect_vec();
                let heap =
                    GfxAliasingHeap::new(Gfx::get().allocator(), &requirements, format!("graph-buffer-alias-{}", group_idx));
                for spec_idx in group {
                    match &pending_buffers[*spec_idx] {
                        PendingBuffer::Fresh(buffer) => buffer.bind_to_heap(&heap),
                        PendingBuffer::Carried(_) => unreachable!(),
                    }
                }
                heap
            })
            .collect_vec();

        let mut buffer_resources = Vec::with_capacity(pending_buffers.len());
        for (spec, pending) in self.buffer_specs.iter().zip(pending_buffers) {
            match pending {
                PendingBuffer::Carried(res) => buffer_resources.push(res),
                PendingBuffer::Fresh(buffer) => {
                    let data = &self.nodes[spec.node];
                    let plan = &data.buffer_output_plans[spec.output_idx];
                    buffer_resources.push(FgBufferResource::new(buffer, plan.input_stages, plan.input_access));
                }
            }
        }

        // 3. 占位资源：1x1 image + 16 字节 buffer，清零后常驻 GENERAL
        let placeholder_image = GfxImage::new(
            &GfxImageCreateInfo::new_image_2d_info(
                vk::Extent2D { width: 1, height: 1 },
                vk::Format::R8G8B8A8_UNORM,
                vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::TRANSFER_DST,
            ),
            &vk_mem::AllocationCreateInfo {
                usage: vk_mem::MemoryUsage::AutoPreferDevice,
                ..Default::default()
            },
            "graph-placeholder",
        );
        let placeholder_view = GfxImageView::new(
            &placeholder_image,
            GfxImageViewDesc::new_2d(vk::Format::R8G8B8A8_UNORM, vk::ImageAspectFlags::COLOR),
            "graph-placeholder",
        );
        let placeholder_buffer = GfxBuffer::new(
            16,
            vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::UNIFORM_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            false,
            "graph-placeholder",
        );
        {
            cmd.image_memory_barrier(
                vk::DependencyFlags::empty(),
                &[GfxImageBarrier::new()
                    .image(placeholder_image.handle())
                    .layout_transfer(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                    .src_mask(vk::PipelineStageFlags2::TOP_OF_PIPE, vk::AccessFlags2::empty())
                    .dst_mask(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE)],
            );
            cmd.cmd_clear_color_image(
                &placeholder_image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &vk::ClearColorValue::default(),
                &[placeholder_image.full_range()],
            );
            cmd.cmd_fill_buffer(&placeholder_buffer, 0, vk::WHOLE_SIZE, 0);
            cmd.image_memory_barrier(
                vk::DependencyFlags::empty(),
                &[GfxImageBarrier::new()
                    .image(placeholder_image.handle())
                    .layout_transfer(vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::GENERAL)
                    .src_mask(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE)
                    .dst_mask(vk::PipelineStageFlags2::ALL_COMMANDS, vk::AccessFlags2::MEMORY_READ)],
            );
        }
        let sampler = GfxSampler::new_linear("graph-default");

        // 4. descriptor pool 与各节点的实例池
        let mut total_sets = 0u32;
        let mut type_counts: HashMap<vk::DescriptorType, u32> = HashMap::new();
        for id in &self.topo_order {
            let data = &self.nodes[*id];
            if data.binding_layout.is_empty() {
                continue;
            }
            total_sets += data.set_count;
            for slot in &data.binding_layout.slots {
                *type_counts.entry(slot.descriptor_type).or_default() += data.set_count;
            }
        }
        let descriptor_pool = (total_sets > 0).then(|| {
            let pool_sizes = type_counts
                .iter()
                .map(|(ty, count)| vk::DescriptorPoolSize {
                    ty: *ty,
                    descriptor_count: *count,
                })
                .collect_vec();
            GfxDescriptorPool::new(total_sets, &pool_sizes, "graph")
        });

        let mut bindings: SecondaryMap<FgNodeId, FgNodeBinding> = SecondaryMap::new();
        for id in &self.topo_order {
            let data = &self.nodes[*id];
            if data.binding_layout.is_empty() {
                bindings.insert(*id, FgNodeBinding {
                    set_layout: None,
                    instances: Vec::new(),
                    tracker: FgDirtyTracker::new(0, 0),
                });
                continue;
            }

            let set_layout = GfxDescriptorSetLayout::new(
                data.binding_layout
                    .slots
                    .iter()
                    .map(|slot| GfxDescriptorBinding {
                        binding: slot.binding,
                        descriptor_type: slot.descriptor_type,
                        count: 1,
                        stages: slot.stages,
                    })
                    .collect_vec(),
                &format!("graph-{}", data.name),
            );
            let pool = descriptor_pool.as_ref().unwrap();
            let instances = (0..data.set_count)
                .map(|set_idx| pool.alloc_set(&set_layout, &format!("graph-{}-{}", data.name, set_idx)))
                .collect_vec();
            bindings.insert(*id, FgNodeBinding {
                set_layout: Some(set_layout),
                instances,
                tracker: FgDirtyTracker::new(data.binding_layout.slot_count(), data.set_count as usize),
            });
        }

        let mut runtime = FgGraphRuntime {
            image_resources,
            buffer_resources,
            image_keys,
            buffer_keys,
            image_heaps,
            buffer_heaps,
            placeholder_image,
            placeholder_view,
            placeholder_buffer,
            sampler,
            descriptor_pool,
            bindings,
        };

        // 5. 全量 binding 写入（首次写入不能走脏路径）
        let mut writes = Vec::new();
        for id in &self.topo_order {
            let data = &self.nodes[*id];
            let binding = runtime.bindings.get_mut(*id).unwrap();
            for set_idx in 0..binding.instances.len() {
                let stale = binding.tracker.select(set_idx);
                writes.extend(writes_for_slots(
                    data,
                    &data.resource_sets[set_idx],
                    binding.instances[set_idx].handle(),
                    &stale,
                    &runtime.image_resources,
                    &runtime.buffer_resources,
                    runtime.placeholder_view.handle(),
                    runtime.placeholder_buffer.vk_buffer(),
                    runtime.sampler.handle(),
                ));
            }
        }
        GfxWriteDescriptorSet::flush(&writes);

        // 6. 延迟输出的历史版本清零：第一个 delay 迭代读到确定的全零内容
        for id in self.topo_order.clone() {
            self.clear_node_history(id, &mut runtime, cmd, true);
        }

        // 7. 通知节点
        for id in self.topo_order.clone() {
            let binding = runtime.bindings.get(id).unwrap();
            let set_layout = binding.set_layout.as_ref().map(|layout| layout.handle());
            let data = &mut self.nodes[id];
            let info = FgNodeBindingInfo {
                layout: &data.binding_layout,
                set_layout,
            };
            data.node.on_connected(&info);
        }

        self.runtime = Some(runtime);
        self.current_iteration = 0;
        log::info!(
            "graph built: {} images, {} buffers, {} image alias heaps, {} sets",
            self.image_specs.len(),
            self.buffer_specs.len(),
            self.image_alias_groups.len(),
            total_sets,
        );
    }

    /// 清零一个节点所有版本数 > 1 的输出
    ///
    /// first_time 为 true 时资源还是 UNDEFINED，可以直接丢弃旧内容；
    /// 否则 src 侧保守覆盖所有既往访问。
    pub(crate) fn clear_node_history(
        &self,
        id: FgNodeId,
        runtime: &mut FgGraphRuntime,
        cmd: &GfxCommandBuffer,
        first_time: bool,
    ) {
        let data = &self.nodes[id];

        let mut barriers = Vec::new();
        let mut clear_targets = Vec::new();
        for plan in &data.image_output_plans {
            if plan.versions <= 1 {
                continue;
            }
            for version in 0..plan.versions {
                let res_idx = plan.first_resource + version as usize;
                let res = &mut runtime.image_resources[res_idx];
                let (old_layout, src_stages, src_access) = if first_time {
                    (vk::ImageLayout::UNDEFINED, vk::PipelineStageFlags2::TOP_OF_PIPE, vk::AccessFlags2::empty())
                } else {
                    (
                        res.current_layout,
                        vk::PipelineStageFlags2::ALL_COMMANDS,
                        vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE,
                    )
                };
                barriers.push(
                    GfxImageBarrier::new()
                        .image(res.image.handle())
                        .layout_transfer(old_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                        .src_mask(src_stages, src_access)
                        .dst_mask(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE),
                );
                res.current_layout = vk::ImageLayout::TRANSFER_DST_OPTIMAL;
                res.current_stages = vk::PipelineStageFlags2::TRANSFER;
                res.current_access = vk::AccessFlags2::TRANSFER_WRITE;
                res.last_used_as_output = true;
                clear_targets.push(res_idx);
            }
        }
        if !barriers.is_empty() {
            cmd.image_memory_barrier(vk::DependencyFlags::empty(), &barriers);
        }
        for res_idx in clear_targets {
            let res = &runtime.image_resources[res_idx];
            cmd.cmd_clear_color_image(
                &res.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &vk::ClearColorValue::default(),
                &[res.image.full_range()],
            );
        }

        for plan in &data.buffer_output_plans {
            if plan.versions <= 1 {
                continue;
            }
            for version in 0..plan.versions {
                let res_idx = plan.first_resource + version as usize;
                let res = &mut runtime.buffer_resources[res_idx];
                cmd.cmd_fill_buffer(&res.buffer, 0, vk::WHOLE_SIZE, 0);
                res.current_stages = vk::PipelineStageFlags2::TRANSFER;
                res.current_access = vk::AccessFlags2::TRANSFER_WRITE;
                res.last_used_as_output = true;
            }
        }
    }
}

/// 为一组槽位生成 descriptor 写入
///
/// optional 未连接的槽位写入占位资源，保证表形状恒定。
#[allow(clippy::too_many_arguments)]
pub(crate) fn writes_for_slots(
    data: &FgNodeData,
    set: &FgResourceSet,
    dst_set: vk::DescriptorSet,
    slots: &[usize],
    images: &[FgImageResource],
    buffers: &[FgBufferResource],
    placeholder_view: vk::ImageView,
    placeholder_buffer: vk::Buffer,
    sampler: vk::Sampler,
) -> Vec<GfxWriteDescriptorSet> {
    let mut writes = Vec::with_capacity(slots.len());
    for slot_idx in slots {
        let slot = &data.binding_layout.slots[*slot_idx];
        let mut write = GfxWriteDescriptorSet {
            dst_set,
            dst_binding: slot.binding,
            dst_array_element: 0,
            descriptor_type: slot.descriptor_type,
            buffer_infos: Vec::new(),
            image_infos: Vec::new(),
        };

        match slot.source {
            FgSlotSource::ImageInput(in_idx) => {
                let (view, layout) = match set.image_inputs[in_idx] {
                    Some(res_idx) => (images[res_idx].view.handle(), data.image_inputs[in_idx].layout),
                    None => (placeholder_view, vk::ImageLayout::GENERAL),
                };
                let info_sampler = if slot.descriptor_type == vk::DescriptorType::COMBINED_IMAGE_SAMPLER {
                    sampler
                } else {
                    vk::Sampler::null()
                };
                write.image_infos.push(vk::DescriptorImageInfo {
                    sampler: info_sampler,
                    image_view: view,
                    image_layout: layout,
                });
            }
            FgSlotSource::ImageOutput(out_idx) => {
                let res_idx = set.image_outputs[out_idx];
                write.image_infos.push(vk::DescriptorImageInfo {
                    sampler: vk::Sampler::null(),
                    image_view: images[res_idx].view.handle(),
                    image_layout: data.image_outputs[out_idx].layout,
                });
            }
            FgSlotSource::BufferInput(in_idx) => {
                let buffer = match set.buffer_inputs[in_idx] {
                    Some(res_idx) => buffers[res_idx].buffer.vk_buffer(),
                    None => placeholder_buffer,
                };
                write.buffer_infos.push(vk::DescriptorBufferInfo {
                    buffer,
                    offset: 0,
                    range: vk::WHOLE_SIZE,
                });
            }
            FgSlotSource::BufferOutput(out_idx) => {
                let res_idx = set.buffer_outputs[out_idx];
                write.buffer_infos.push(vk::DescriptorBufferInfo {
                    buffer: buffers[res_idx].buffer.vk_buffer(),
                    offset: 0,
                    range: vk::WHOLE_SIZE,
                });
            }
        }
        writes.push(write);
    }
    writes
}
