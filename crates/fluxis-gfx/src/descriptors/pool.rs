use ash::vk;

use crate::descriptors::{layout::GfxDescriptorSetLayout, set::GfxDescriptorSet};
use crate::foundation::debug_messenger::DebugType;
use crate::gfx::Gfx;

/// descriptor pool 封装
pub struct GfxDescriptorPool {
    vk_handle: vk::DescriptorPool,
}

// new & destroy
impl GfxDescriptorPool {
    pub fn new(max_sets: u32, pool_sizes: &[vk::DescriptorPoolSize], debug_name: &str) -> Self {
        let pool_ci = vk::DescriptorPoolCreateInfo::default().max_sets(max_sets).pool_sizes(pool_sizes);
        let pool = unsafe { Gfx::get().gfx_device().create_descriptor_pool(&pool_ci, None).unwrap() };

        let pool = Self { vk_handle: pool };
        Gfx::get().gfx_device().set_debug_name(&pool, debug_name);
        pool
    }

    /// 销毁 pool，从中分配的所有 descriptor set 一并失效
    pub fn destroy(self) {
        unsafe {
            Gfx::get().gfx_device().destroy_descriptor_pool(self.vk_handle, None);
        }
    }
}

// tools
impl GfxDescriptorPool {
    pub fn alloc_set(&self, layout: &GfxDescriptorSetLayout, debug_name: &str) -> GfxDescriptorSet {
        let layouts = [layout.handle()];
        let alloc_info =
            vk::DescriptorSetAllocateInfo::default().descriptor_pool(self.vk_handle).set_layouts(&layouts);
        let set = unsafe { Gfx::get().gfx_device().allocate_descriptor_sets(&alloc_info).unwrap()[0] };

        let set = GfxDescriptorSet::from_handle(set);
        Gfx::get().gfx_device().set_debug_name(&set, debug_name);
        set
    }
}

// getters
impl GfxDescriptorPool {
    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.vk_handle
    }
}

impl DebugType for GfxDescriptorPool {
    fn debug_type_name() -> &'static str {
        "GfxDescriptorPool"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.vk_handle
    }
}
