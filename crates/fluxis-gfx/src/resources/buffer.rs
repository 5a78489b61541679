use ash::vk;
use vk_mem::Alloc;

use crate::foundation::debug_messenger::DebugType;
use crate::foundation::vmem_allocator::GfxAliasingHeap;
use crate::gfx::Gfx;

/// buffer 封装
///
/// 显存来源和 [`crate::resources::image::GfxImage`] 相同：独占或 aliasing heap。
pub struct GfxBuffer {
    handle: vk::Buffer,
    /// None 表示显存来自 aliasing heap
    allocation: Option<vk_mem::Allocation>,

    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,

    /// 在初始化阶段写死
    map_ptr: Option<*mut u8>,

    debug_name: String,
}
impl DebugType for GfxBuffer {
    fn debug_type_name() -> &'static str {
        "GfxBuffer"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
impl Drop for GfxBuffer {
    fn drop(&mut self) {
        unsafe {
            match &mut self.allocation {
                Some(allocation) => {
                    let allocator = Gfx::get().allocator();
                    if self.map_ptr.is_some() {
                        allocator.unmap_memory(allocation);
                    }
                    allocator.destroy_buffer(self.handle, allocation);
                }
                None => {
                    Gfx::get().gfx_device().destroy_buffer(self.handle, None);
                }
            }
        }
    }
}
// init & destroy
impl GfxBuffer {
    /// 独占显存的 buffer，优先使用 device memory
    ///
    /// - mem_map: 是否映射到 host 地址空间，用于 CPU 直接写入
    pub fn new(
        buffer_size: vk::DeviceSize,
        buffer_usage: vk::BufferUsageFlags,
        mem_map: bool,
        name: impl AsRef<str>,
    ) -> Self {
        let buffer_ci = vk::BufferCreateInfo::default().size(buffer_size).usage(buffer_usage);
        let alloc_ci = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            flags: if mem_map {
                vk_mem::AllocationCreateFlags::HOST_ACCESS_RANDOM
            } else {
                vk_mem::AllocationCreateFlags::empty()
            },
            ..Default::default()
        };

        let (buffer, mut alloc) = unsafe { Gfx::get().allocator().create_buffer(&buffer_ci, &alloc_ci).unwrap() };

        let mut mapped_ptr = None;
        if mem_map {
            unsafe {
                mapped_ptr = Some(Gfx::get().allocator().map_memory(&mut alloc).unwrap());
            }
        }

        Gfx::get().gfx_device().set_object_debug_name(buffer, format!("Buffer::{}", name.as_ref()));
        Self {
            handle: buffer,
            allocation: Some(alloc),
            size: buffer_size,
            usage: buffer_usage,
            map_ptr: mapped_ptr,
            debug_name: name.as_ref().to_string(),
        }
    }

    /// 未绑定显存的 buffer，之后必须通过 [`Self::bind_to_heap`] 绑定到 aliasing heap
    pub fn new_for_aliasing(buffer_size: vk::DeviceSize, buffer_usage: vk::BufferUsageFlags, name: impl AsRef<str>) -> Self {
        let buffer_ci = vk::BufferCreateInfo::default().size(buffer_size).usage(buffer_usage);
        let buffer = unsafe { Gfx::get().gfx_device().create_buffer(&buffer_ci, None).unwrap() };

        Gfx::get().gfx_device().set_object_debug_name(buffer, format!("Buffer::{}", name.as_ref()));
        Self {
            handle: buffer,
            allocation: None,
            size: buffer_size,
            usage: buffer_usage,
            map_ptr: None,
            debug_name: name.as_ref().to_string(),
        }
    }

    #[inline]
    pub fn destroy(self) {
        drop(self)
    }
}
// tools
impl GfxBuffer {
    pub fn memory_requirements(&self) -> vk::MemoryRequirements {
        unsafe { Gfx::get().gfx_device().get_buffer_memory_requirements(self.handle) }
    }

    pub fn bind_to_heap(&self, heap: &GfxAliasingHeap) {
        assert!(self.allocation.is_none(), "GfxBuffer::bind_to_heap: buffer '{}' owns its memory", self.debug_name);
        heap.bind_buffer(Gfx::get().allocator(), self.handle);
    }

    /// 将 data 写入已映射的 buffer
    ///
    /// # Panics
    /// buffer 创建时未开启 mem_map 时 panic
    pub fn write_data(&self, data: &[u8]) {
        let map_ptr = self.map_ptr.expect("GfxBuffer::write_data: buffer is not mapped");
        assert!(data.len() as vk::DeviceSize <= self.size);
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), map_ptr, data.len());
        }
    }
}
// getters
impl GfxBuffer {
    #[inline]
    pub fn vk_buffer(&self) -> vk::Buffer {
        self.handle
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    #[inline]
    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }
}
