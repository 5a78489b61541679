use std::ffi::CStr;

use ash::vk;
use itertools::Itertools;

use crate::commands::command_queue::GfxQueueFamily;

/// 表示一张物理显卡
pub struct GfxPhysicalDevice {
    pub(crate) vk_handle: vk::PhysicalDevice,

    /// 当前 gpu 的基础属性
    pub(crate) basic_props: vk::PhysicalDeviceProperties,

    pub(crate) mem_props: vk::PhysicalDeviceMemoryProperties,

    /// 全能的 queue family：graphics, compute, transfer
    pub(crate) gfx_queue_family: GfxQueueFamily,
}

impl GfxPhysicalDevice {
    /// 创建一个新的物理显卡实例
    ///
    /// 优先选择独立显卡，如果没有则选择第一个可用的显卡
    pub fn new_descrete_physical_device(instance: &ash::Instance) -> Self {
        unsafe {
            instance
                .enumerate_physical_devices()
                .unwrap()
                .iter()
                .map(|pdevice| GfxPhysicalDevice::new(*pdevice, instance))
                // 优先使用独立显卡
                .find_or_first(GfxPhysicalDevice::is_descrete_gpu)
                .unwrap()
        }
    }

    fn new(pdevice: vk::PhysicalDevice, instance: &ash::Instance) -> Self {
        unsafe {
            let basic_props = instance.get_physical_device_properties(pdevice);
            let physical_device_name = CStr::from_ptr(basic_props.device_name.as_ptr());
            log::info!("found gpu: {:?}", physical_device_name);

            let mem_props = instance.get_physical_device_memory_properties(pdevice);

            let queue_familiy_props = instance.get_physical_device_queue_family_properties(pdevice);
            log::debug!("physical device: queue family props:\n{:#?}", queue_familiy_props);

            // 全能的 Queue：graphics, compute, transfer
            let gfx_queue_family = queue_familiy_props
                .iter()
                .enumerate()
                .find(|(_, props)| {
                    props
                        .queue_flags
                        .contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER)
                })
                .map(|(family_idx, props)| GfxQueueFamily {
                    name: "gfx".to_string(),
                    queue_family_index: family_idx as u32,
                    queue_flags: props.queue_flags,
                    queue_count: props.queue_count,
                })
                .unwrap();

            Self {
                vk_handle: pdevice,
                basic_props,
                mem_props,
                gfx_queue_family,
            }
        }
    }

    fn is_descrete_gpu(&self) -> bool {
        self.basic_props.device_type == vk::PhysicalDeviceType::DISCRETE_GPU
    }

    pub fn destroy(self) {
        // physical device 无需显式销毁
    }
}

// getters
impl GfxPhysicalDevice {
    #[inline]
    pub fn vk_handle(&self) -> vk::PhysicalDevice {
        self.vk_handle
    }

    #[inline]
    pub fn mem_props(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.mem_props
    }

    #[inline]
    pub fn gfx_queue_family(&self) -> &GfxQueueFamily {
        &self.gfx_queue_family
    }
}
