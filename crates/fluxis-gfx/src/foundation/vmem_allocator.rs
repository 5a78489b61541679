use ash::vk;
use vk_mem::Alloc;

use crate::foundation::device::GfxDevice;

/// vk-mem 分配器封装
///
/// 所有通过 vk-mem 进行的显存分配都经过这里。
pub struct VMemAllocator {
    pub(crate) vma: vk_mem::Allocator,
}

// new & destroy
impl VMemAllocator {
    /// vma 引用了 Instance 与 Device，必须在两者销毁之前销毁
    pub fn new(instance: &ash::Instance, pdevice: vk::PhysicalDevice, device: &GfxDevice) -> Self {
        let mut create_info = vk_mem::AllocatorCreateInfo::new(instance, device, pdevice);
        create_info.vulkan_api_version = vk::API_VERSION_1_3;

        let vma = unsafe { vk_mem::Allocator::new(create_info).unwrap() };
        Self { vma }
    }

    pub fn destroy(self) {
        // vk_mem::Allocator 在 drop 时销毁
    }
}

impl std::ops::Deref for VMemAllocator {
    type Target = vk_mem::Allocator;
    fn deref(&self) -> &Self::Target {
        &self.vma
    }
}

/// 别名堆：多个生命周期互斥的资源共用一块显存
///
/// 堆内所有资源绑定在同一块 allocation 的 0 偏移处，完全重叠。
/// 资源内容只在自己的使用区间内有效，调用方必须保证堆内资源的
/// 使用区间在一次迭代内互不交叠。
pub struct GfxAliasingHeap {
    allocation: vk_mem::Allocation,
    size: vk::DeviceSize,
}

// new & destroy
impl GfxAliasingHeap {
    /// 根据堆内所有资源的 memory requirements 分配一块可以容纳任意一个资源的显存
    ///
    /// # Panics
    /// 堆内资源没有共同支持的 memory type 时 panic
    pub fn new(allocator: &VMemAllocator, requirements: &[vk::MemoryRequirements], name: impl AsRef<str>) -> Self {
        assert!(!requirements.is_empty(), "GfxAliasingHeap::new: empty requirements");

        let merged = vk::MemoryRequirements {
            size: requirements.iter().map(|r| r.size).max().unwrap(),
            alignment: requirements.iter().map(|r| r.alignment).max().unwrap(),
            memory_type_bits: requirements.iter().fold(!0u32, |bits, r| bits & r.memory_type_bits),
        };
        assert_ne!(merged.memory_type_bits, 0, "GfxAliasingHeap::new: no common memory type for '{}'", name.as_ref());

        let alloc_ci = vk_mem::AllocationCreateInfo {
            required_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            ..Default::default()
        };
        let allocation = unsafe { allocator.vma.allocate_memory(&merged, &alloc_ci).unwrap() };

        log::debug!("aliasing heap '{}': {} resources, {} bytes", name.as_ref(), requirements.len(), merged.size);

        Self {
            allocation,
            size: merged.size,
        }
    }

    pub fn destroy(mut self, allocator: &VMemAllocator) {
        unsafe {
            allocator.vma.free_memory(&mut self.allocation);
        }
    }
}

// tools
impl GfxAliasingHeap {
    /// 将一个 image 绑定到堆上，与堆内其他资源共享显存
    pub fn bind_image(&self, allocator: &VMemAllocator, image: vk::Image) {
        unsafe {
            allocator.vma.bind_image_memory(&self.allocation, image).unwrap();
        }
    }

    /// 将一个 buffer 绑定到堆上，与堆内其他资源共享显存
    pub fn bind_buffer(&self, allocator: &VMemAllocator, buffer: vk::Buffer) {
        unsafe {
            allocator.vma.bind_buffer_memory(&self.allocation, buffer).unwrap();
        }
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}
