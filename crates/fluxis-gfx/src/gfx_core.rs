use ash::vk;
use std::ffi::CStr;

use crate::{
    commands::command_queue::GfxCommandQueue,
    foundation::{
        debug_messenger::GfxDebugMsger, device::GfxDevice, instance::GfxInstance, physical_device::GfxPhysicalDevice,
    },
};

pub struct GfxCore {
    /// vk 基础函数的接口
    ///
    /// 在 drop 之后，会卸载 dll，因此需要确保该字段最后 drop
    pub(crate) vk_entry: ash::Entry,

    pub(crate) instance: GfxInstance,
    pub(crate) physical_device: GfxPhysicalDevice,

    pub(crate) gfx_device: GfxDevice,

    pub(crate) debug_utils: GfxDebugMsger,

    pub(crate) gfx_queue: GfxCommandQueue,
}

// 创建与销毁
impl GfxCore {
    pub fn new(app_name: String, engine_name: String, instance_extra_exts: Vec<&'static CStr>) -> Self {
        let vk_pf = unsafe { ash::Entry::load() }.expect("Failed to load vulkan entry");
        let instance = GfxInstance::new(&vk_pf, app_name, engine_name, instance_extra_exts);
        let physical_device = GfxPhysicalDevice::new_descrete_physical_device(instance.ash_instance());

        // 处理图的全部工作都走同一个全能 queue family，
        // 跨 queue 的所有权转移不在引擎的职责范围内
        let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(physical_device.gfx_queue_family.queue_family_index)
            .queue_priorities(&[1.0])];

        let gfx_device = GfxDevice::new(&instance.ash_instance, physical_device.vk_handle, &queue_create_infos);
        let gfx_queue = GfxCommandQueue {
            vk_queue: unsafe {
                gfx_device.get_device_queue(physical_device.gfx_queue_family.queue_family_index, 0)
            },
            queue_family: physical_device.gfx_queue_family.clone(),
        };

        let debug_utils = GfxDebugMsger::new(&vk_pf, &instance.ash_instance);

        log::info!("gfx queue's queue family:\n{:#?}", gfx_queue.queue_family);

        // 在 device 以及 debug_utils 之后补上早期创建的 vk::Handle 的名字
        {
            gfx_device.set_object_debug_name(instance.vk_instance(), "GfxInstance");
            gfx_device.set_object_debug_name(physical_device.vk_handle, "GfxPhysicalDevice");

            gfx_device.set_object_debug_name(gfx_device.vk_handle(), "GfxDevice");
            gfx_device.set_object_debug_name(gfx_queue.vk_queue, "GfxCommandQueue-gfx");
        }

        Self {
            vk_entry: vk_pf,
            instance,
            physical_device,
            gfx_device,
            debug_utils,
            gfx_queue,
        }
    }

    pub fn destroy(self) {
        self.debug_utils.destroy();
        self.gfx_device.destroy();
        self.physical_device.destroy();
        self.instance.destroy();
    }
}
