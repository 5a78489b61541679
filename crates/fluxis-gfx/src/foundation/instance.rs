use std::ffi::{CStr, CString};

use ash::vk;
use itertools::Itertools;

use crate::foundation::debug_messenger::GfxDebugMsger;

/// Vulkan Instance 封装
///
/// 负责 instance 的创建，以及 validation layer 的开启。
pub struct GfxInstance {
    pub(crate) ash_instance: ash::Instance,
}

// new & init
impl GfxInstance {
    pub fn new(vk_pf: &ash::Entry, app_name: String, engine_name: String, extra_exts: Vec<&'static CStr>) -> Self {
        let app_name = CString::new(app_name.as_str()).unwrap();
        let engine_name = CString::new(engine_name.as_str()).unwrap();

        let app_info = vk::ApplicationInfo::default()
            .application_name(app_name.as_c_str())
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(engine_name.as_c_str())
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_3);

        let mut exts = extra_exts;
        exts.push(ash::ext::debug_utils::NAME);
        let ext_ptrs = exts.iter().map(|e| e.as_ptr()).collect_vec();
        log::info!("instance exts: {:?}", exts);

        let layers = Self::validation_layers();
        let layer_ptrs = layers.iter().map(|l| l.as_ptr()).collect_vec();

        // 让 instance 的创建过程也能被 debug messenger 捕获
        let mut debug_ci = GfxDebugMsger::debug_utils_messenger_ci();
        let instance_ci = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&ext_ptrs)
            .enabled_layer_names(&layer_ptrs)
            .push_next(&mut debug_ci);

        let ash_instance = unsafe { vk_pf.create_instance(&instance_ci, None).unwrap() };

        Self { ash_instance }
    }

    fn validation_layers() -> Vec<&'static CStr> {
        if cfg!(debug_assertions) {
            vec![c"VK_LAYER_KHRONOS_validation"]
        } else {
            vec![]
        }
    }

    pub fn destroy(self) {
        unsafe {
            self.ash_instance.destroy_instance(None);
        }
    }
}

// getters
impl GfxInstance {
    #[inline]
    pub fn ash_instance(&self) -> &ash::Instance {
        &self.ash_instance
    }

    #[inline]
    pub fn vk_instance(&self) -> vk::Instance {
        self.ash_instance.handle()
    }
}
