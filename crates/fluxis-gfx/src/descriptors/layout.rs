use ash::vk;
use itertools::Itertools;

use crate::foundation::debug_messenger::DebugType;
use crate::gfx::Gfx;

/// descriptor set layout 中的一个 binding
#[derive(Clone, Debug)]
pub struct GfxDescriptorBinding {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub count: u32,
    pub stages: vk::ShaderStageFlags,
}

/// descriptor set layout 封装
pub struct GfxDescriptorSetLayout {
    vk_handle: vk::DescriptorSetLayout,
    bindings: Vec<GfxDescriptorBinding>,
}

// new & destroy
impl GfxDescriptorSetLayout {
    pub fn new(bindings: Vec<GfxDescriptorBinding>, debug_name: &str) -> Self {
        let vk_bindings = bindings
            .iter()
            .map(|b| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(b.binding)
                    .descriptor_type(b.descriptor_type)
                    .descriptor_count(b.count)
                    .stage_flags(b.stages)
            })
            .collect_vec();

        let layout_ci = vk::DescriptorSetLayoutCreateInfo::default().bindings(&vk_bindings);
        let layout = unsafe { Gfx::get().gfx_device().create_descriptor_set_layout(&layout_ci, None).unwrap() };

        let layout = Self {
            vk_handle: layout,
            bindings,
        };
        Gfx::get().gfx_device().set_debug_name(&layout, debug_name);
        layout
    }

    pub fn destroy(self) {
        unsafe {
            Gfx::get().gfx_device().destroy_descriptor_set_layout(self.vk_handle, None);
        }
    }
}

// getters
impl GfxDescriptorSetLayout {
    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.vk_handle
    }

    #[inline]
    pub fn bindings(&self) -> &[GfxDescriptorBinding] {
        &self.bindings
    }
}

impl DebugType for GfxDescriptorSetLayout {
    fn debug_type_name() -> &'static str {
        "GfxDescriptorSetLayout"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.vk_handle
    }
}
