//! binding table 布局推导与脏槽位跟踪
//!
//! 布局由 connector 确定性推导：image 输入、buffer 输入、image 输出、
//! buffer 输出，各自按声明顺序，跳过不占槽位的 connector。
//! 拓扑不变时布局保持稳定；改变布局需要整图重连。

use ash::vk;

use crate::connector::{FgBufferInput, FgBufferOutput, FgImageInput, FgImageOutput};

/// binding 槽位对应的 connector
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FgSlotSource {
    ImageInput(usize),
    BufferInput(usize),
    ImageOutput(usize),
    BufferOutput(usize),
}

/// binding table 中的一个槽位
#[derive(Clone, Debug)]
pub struct FgBindingSlot {
    pub binding: u32,
    pub name: String,
    pub descriptor_type: vk::DescriptorType,
    pub stages: vk::ShaderStageFlags,
    pub source: FgSlotSource,
}

/// 一个节点的 binding table 布局
#[derive(Clone, Debug, Default)]
pub struct FgBindingLayout {
    pub slots: Vec<FgBindingSlot>,
}

impl FgBindingLayout {
    /// 从节点的 connector 列表推导布局
    pub fn derive(
        image_inputs: &[FgImageInput],
        buffer_inputs: &[FgBufferInput],
        image_outputs: &[FgImageOutput],
        buffer_outputs: &[FgBufferOutput],
    ) -> Self {
        let mut slots = Vec::new();
        let mut binding = 0u32;
        let mut push = |name: &str, ty: vk::DescriptorType, stages: vk::PipelineStageFlags2, source: FgSlotSource| {
            slots.push(FgBindingSlot {
                binding,
                name: name.to_string(),
                descriptor_type: ty,
                stages: shader_stages(stages),
                source,
            });
            binding += 1;
        };

        for (idx, input) in image_inputs.iter().enumerate() {
            if let Some(ty) = input.binding_type() {
                push(&input.name, ty, input.stages, FgSlotSource::ImageInput(idx));
            }
        }
        for (idx, input) in buffer_inputs.iter().enumerate() {
            if let Some(ty) = input.binding_type() {
                push(&input.name, ty, input.stages, FgSlotSource::BufferInput(idx));
            }
        }
        for (idx, output) in image_outputs.iter().enumerate() {
            if let Some(ty) = output.binding_type() {
                push(&output.name, ty, output.stages, FgSlotSource::ImageOutput(idx));
            }
        }
        for (idx, output) in buffer_outputs.iter().enumerate() {
            if let Some(ty) = output.binding_type() {
                push(&output.name, ty, output.stages, FgSlotSource::BufferOutput(idx));
            }
        }

        Self { slots }
    }

    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// 查找某个 connector 对应的 binding 下标
    pub fn slot_of(&self, source: FgSlotSource) -> Option<u32> {
        self.slots.iter().find(|s| s.source == source).map(|s| s.binding)
    }
}

/// 从 pipeline stages 推导 descriptor 可见的 shader stages
fn shader_stages(stages: vk::PipelineStageFlags2) -> vk::ShaderStageFlags {
    let mut out = vk::ShaderStageFlags::empty();
    if stages.contains(vk::PipelineStageFlags2::COMPUTE_SHADER) {
        out |= vk::ShaderStageFlags::COMPUTE;
    }
    if stages.contains(vk::PipelineStageFlags2::VERTEX_SHADER) {
        out |= vk::ShaderStageFlags::VERTEX;
    }
    if stages.contains(vk::PipelineStageFlags2::FRAGMENT_SHADER) {
        out |= vk::ShaderStageFlags::FRAGMENT;
    }
    if out.is_empty() {
        out = vk::ShaderStageFlags::ALL;
    }
    out
}

/// on_connected 时交给节点的 binding 信息
pub struct FgNodeBindingInfo<'a> {
    pub layout: &'a FgBindingLayout,
    /// 布局为空的节点是 None
    pub set_layout: Option<vk::DescriptorSetLayout>,
}

/// 槽位脏跟踪（代际方案）
///
/// 每个槽位有一个单调递增的代际，每个 binding table 实例记录各槽位
/// 已应用到的代际。选中一个实例时取出落后的槽位并推平，
/// 因此实例恰好应用"自上次被选中以来排队的更新"，不多不少。
/// 实例初始代际为 0、槽位初始代际为 1，首次选中自然得到全量更新。
pub struct FgDirtyTracker {
    slot_generations: Vec<u64>,
    /// [instance][slot] -> 已应用的代际
    applied: Vec<Vec<u64>>,
}

impl FgDirtyTracker {
    pub fn new(slot_count: usize, instance_count: usize) -> Self {
        Self {
            slot_generations: vec![1; slot_count],
            applied: vec![vec![0; slot_count]; instance_count],
        }
    }

    /// 标记一个槽位的底层资源引用发生了变化
    pub fn mark_dirty(&mut self, slot: usize) {
        self.slot_generations[slot] += 1;
    }

    pub fn mark_all_dirty(&mut self) {
        for slot in 0..self.slot_generations.len() {
            self.mark_dirty(slot);
        }
    }

    /// 选中一个实例，返回需要刷新的槽位下标并将其推平
    pub fn select(&mut self, instance: usize) -> Vec<usize> {
        let applied = &mut self.applied[instance];
        let mut stale = Vec::new();
        for (slot, generation) in self.slot_generations.iter().enumerate() {
            if applied[slot] < *generation {
                applied[slot] = *generation;
                stale.push(slot);
            }
        }
        stale
    }

    #[inline]
    pub fn instance_count(&self) -> usize {
        self.applied.len()
    }

    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slot_generations.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{FgImageInput, FgImageOutput};

    #[test]
    fn test_layout_order_inputs_then_outputs() {
        let image_inputs = vec![FgImageInput::compute_read("a"), FgImageInput::storage_read("b")];
        let image_outputs = vec![FgImageOutput::compute_write("out", vk::Format::R8G8B8A8_UNORM, 8, 8)];

        let layout = FgBindingLayout::derive(&image_inputs, &[], &image_outputs, &[]);

        assert_eq!(layout.slot_count(), 3);
        assert_eq!(layout.slots[0].source, FgSlotSource::ImageInput(0));
        assert_eq!(layout.slots[1].source, FgSlotSource::ImageInput(1));
        assert_eq!(layout.slots[2].source, FgSlotSource::ImageOutput(0));
        assert_eq!(layout.slots[0].descriptor_type, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(layout.slots[1].descriptor_type, vk::DescriptorType::STORAGE_IMAGE);
        assert_eq!(layout.slots[2].descriptor_type, vk::DescriptorType::STORAGE_IMAGE);
    }

    #[test]
    fn test_layout_skips_transfer_connectors() {
        let image_inputs = vec![FgImageInput::transfer_src("src"), FgImageInput::compute_read("tex")];
        let image_outputs = vec![FgImageOutput::transfer_write("out", vk::Format::R8G8B8A8_UNORM, 8, 8)];

        let layout = FgBindingLayout::derive(&image_inputs, &[], &image_outputs, &[]);

        // transfer connector 不占槽位，槽位下标保持连续
        assert_eq!(layout.slot_count(), 1);
        assert_eq!(layout.slots[0].binding, 0);
        assert_eq!(layout.slots[0].source, FgSlotSource::ImageInput(1));
        assert_eq!(layout.slot_of(FgSlotSource::ImageInput(0)), None);
    }

    #[test]
    fn test_dirty_tracker_initial_full_update() {
        let mut tracker = FgDirtyTracker::new(3, 2);

        // 首次选中每个实例都是全量更新
        assert_eq!(tracker.select(0), vec![0, 1, 2]);
        assert_eq!(tracker.select(1), vec![0, 1, 2]);

        // 没有新的脏标记时零写入
        assert_eq!(tracker.select(0), Vec::<usize>::new());
        assert_eq!(tracker.select(1), Vec::<usize>::new());
    }

    #[test]
    fn test_dirty_tracker_single_slot() {
        let mut tracker = FgDirtyTracker::new(3, 2);
        tracker.select(0);
        tracker.select(1);

        tracker.mark_dirty(1);

        // 每个实例恰好刷新一次这个槽位
        assert_eq!(tracker.select(0), vec![1]);
        assert_eq!(tracker.select(0), Vec::<usize>::new());
        assert_eq!(tracker.select(1), vec![1]);
        assert_eq!(tracker.select(1), Vec::<usize>::new());
    }

    #[test]
    fn test_dirty_tracker_coalesces_updates() {
        let mut tracker = FgDirtyTracker::new(2, 2);
        tracker.select(0);
        tracker.select(1);

        // 同一槽位连续变脏多次，实例被选中时只刷新一次
        tracker.mark_dirty(0);
        tracker.mark_dirty(0);
        assert_eq!(tracker.select(0), vec![0]);
        assert_eq!(tracker.select(0), Vec::<usize>::new());
    }
}
