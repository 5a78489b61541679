use ash::vk;
use itertools::Itertools;

use crate::foundation::debug_messenger::DebugType;
use crate::gfx::Gfx;

/// descriptor set 封装
#[derive(Copy, Clone)]
pub struct GfxDescriptorSet {
    vk_handle: vk::DescriptorSet,
}

impl GfxDescriptorSet {
    pub(crate) fn from_handle(handle: vk::DescriptorSet) -> Self {
        Self { vk_handle: handle }
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSet {
        self.vk_handle
    }
}

impl DebugType for GfxDescriptorSet {
    fn debug_type_name() -> &'static str {
        "GfxDescriptorSet"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.vk_handle
    }
}

/// 一次 descriptor 写入
///
/// 持有 info 数组，保证转换出的 `vk::WriteDescriptorSet` 指针有效。
pub struct GfxWriteDescriptorSet {
    pub dst_set: vk::DescriptorSet,
    pub dst_binding: u32,
    pub dst_array_element: u32,
    pub descriptor_type: vk::DescriptorType,

    pub buffer_infos: Vec<vk::DescriptorBufferInfo>,
    pub image_infos: Vec<vk::DescriptorImageInfo>,
}
impl GfxWriteDescriptorSet {
    pub fn to_vk_type(&self) -> vk::WriteDescriptorSet<'_> {
        let mut descriptor_count = 0;
        let mut valid_count = 0;
        if !self.buffer_infos.is_empty() {
            descriptor_count = self.buffer_infos.len();
            valid_count += 1;
        }
        if !self.image_infos.is_empty() {
            descriptor_count = self.image_infos.len();
            valid_count += 1;
        }

        assert_eq!(
            valid_count, 1,
            "Only one of buffer_infos or image_infos should be set in GfxWriteDescriptorSet"
        );

        vk::WriteDescriptorSet {
            dst_set: self.dst_set,
            dst_binding: self.dst_binding,
            dst_array_element: self.dst_array_element,
            descriptor_count: descriptor_count as u32,
            descriptor_type: self.descriptor_type,
            // 选择 buffer ptr 还是 image ptr，是由 descriptor type 控制的
            p_buffer_info: self.buffer_infos.as_ptr(),
            p_image_info: self.image_infos.as_ptr(),
            ..Default::default()
        }
    }

    /// 将一批写入一次性提交给 device
    pub fn flush(writes: &[Self]) {
        if writes.is_empty() {
            return;
        }
        let vk_writes = writes.iter().map(|w| w.to_vk_type()).collect_vec();
        unsafe {
            Gfx::get().gfx_device().update_descriptor_sets(&vk_writes, &[]);
        }
    }
}
