use ash::vk;
use itertools::Itertools;

use crate::{
    basic::color::LabelColor,
    commands::{
        barrier::{GfxBufferBarrier, GfxImageBarrier},
        command_pool::GfxCommandPool,
    },
    foundation::debug_messenger::DebugType,
    gfx::Gfx,
    resources::{buffer::GfxBuffer, image::GfxImage},
};

/// 命令缓冲封装
///
/// 封装 Vulkan CommandBuffer，提供类型安全的命令录制接口。
/// 支持计算、传输、屏障、调试标签等功能。
///
/// # 使用示例
/// ```ignore
/// let cmd = GfxCommandBuffer::new(&pool, "my-node");
/// cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT, "my-node");
/// cmd.cmd_bind_pipeline(vk::PipelineBindPoint::COMPUTE, pipeline);
/// // dispatch...
/// cmd.end();
/// ```
#[derive(Clone)]
pub struct GfxCommandBuffer {
    vk_handle: vk::CommandBuffer,
    _command_pool_handle: vk::CommandPool,
}
// new & init
impl GfxCommandBuffer {
    pub fn new(command_pool: &GfxCommandPool, debug_name: &str) -> Self {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool.handle())
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let command_buffer = unsafe { Gfx::get().gfx_device().allocate_command_buffers(&info).unwrap()[0] };
        let cmd_buffer = GfxCommandBuffer {
            vk_handle: command_buffer,
            _command_pool_handle: command_pool.handle(),
        };
        Gfx::get().gfx_device().set_debug_name(&cmd_buffer, debug_name);
        cmd_buffer
    }
}
// Basic 命令
impl GfxCommandBuffer {
    /// 开始录制 command
    ///
    /// 自动设置 debug label
    #[inline]
    pub fn begin(&self, usage_flag: vk::CommandBufferUsageFlags, debug_label_name: &str) {
        unsafe {
            Gfx::get()
                .gfx_device()
                .begin_command_buffer(self.vk_handle, &vk::CommandBufferBeginInfo::default().flags(usage_flag))
                .unwrap();
        }
        self.begin_label(debug_label_name, LabelColor::COLOR_CMD);
    }

    /// 结束录制 command
    ///
    /// 结束 debug label
    #[inline]
    pub fn end(&self) {
        self.end_label();
        unsafe { Gfx::get().gfx_device().end_command_buffer(self.vk_handle).unwrap() }
    }
}
// getters
impl GfxCommandBuffer {
    #[inline]
    pub fn vk_handle(&self) -> vk::CommandBuffer {
        self.vk_handle
    }
}
// 数据传输命令
impl GfxCommandBuffer {
    /// - command type: action
    /// - 支持的 queue：transfer，graphics，compute
    #[inline]
    pub fn cmd_copy_buffer(&self, src: &GfxBuffer, dst: &GfxBuffer, regions: &[vk::BufferCopy]) {
        unsafe {
            Gfx::get().gfx_device().cmd_copy_buffer(self.vk_handle, src.vk_buffer(), dst.vk_buffer(), regions);
        }
    }

    /// - command type: action
    /// - 支持的 queue：transfer，graphics，compute
    #[inline]
    pub fn cmd_copy_image(
        &self,
        src: &GfxImage,
        src_layout: vk::ImageLayout,
        dst: &GfxImage,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageCopy],
    ) {
        unsafe {
            Gfx::get().gfx_device().cmd_copy_image(
                self.vk_handle,
                src.handle(),
                src_layout,
                dst.handle(),
                dst_layout,
                regions,
            );
        }
    }

    /// 带缩放与格式转换的 image 拷贝
    /// - command type: action
    /// - 支持的 queue：graphics
    #[inline]
    pub fn cmd_blit_image(
        &self,
        src: &GfxImage,
        src_layout: vk::ImageLayout,
        dst: &GfxImage,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageBlit],
        filter: vk::Filter,
    ) {
        unsafe {
            Gfx::get().gfx_device().cmd_blit_image(
                self.vk_handle,
                src.handle(),
                src_layout,
                dst.handle(),
                dst_layout,
                regions,
                filter,
            );
        }
    }

    /// - command type: action
    /// - 支持的 queue：graphics，compute
    #[inline]
    pub fn cmd_clear_color_image(
        &self,
        image: &GfxImage,
        layout: vk::ImageLayout,
        clear_color: &vk::ClearColorValue,
        ranges: &[vk::ImageSubresourceRange],
    ) {
        unsafe {
            Gfx::get().gfx_device().cmd_clear_color_image(self.vk_handle, image.handle(), layout, clear_color, ranges);
        }
    }

    /// - command type: action
    /// - 支持的 queue：transfer，graphics，compute
    #[inline]
    pub fn cmd_fill_buffer(&self, buffer: &GfxBuffer, offset: vk::DeviceSize, size: vk::DeviceSize, data: u32) {
        unsafe {
            Gfx::get().gfx_device().cmd_fill_buffer(self.vk_handle, buffer.vk_buffer(), offset, size, data);
        }
    }

    /// 将 data 传输到 buffer 中，大小限制：65536Bytes=64KB
    ///
    /// 需要在 render pass 之外进行，注意同步
    ///
    /// - command type: action
    /// - 支持的 queue：transfer，graphics，compute
    #[inline]
    pub fn cmd_update_buffer(&self, buffer: vk::Buffer, offset: vk::DeviceSize, data: &[u8]) {
        unsafe { Gfx::get().gfx_device().cmd_update_buffer(self.vk_handle, buffer, offset, data) }
    }

    /// - command type: state
    /// - 支持的 queue: graphics, compute
    #[inline]
    pub fn cmd_push_constants(
        &self,
        pipeline_layout: vk::PipelineLayout,
        stage: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        unsafe {
            Gfx::get().gfx_device().cmd_push_constants(self.vk_handle, pipeline_layout, stage, offset, data);
        }
    }
}
// 绑定类型的命令
impl GfxCommandBuffer {
    /// - command type: state
    /// - 支持的 queue：graphics, compute
    #[inline]
    pub fn bind_descriptor_sets(
        &self,
        bind_point: vk::PipelineBindPoint,
        pipeline_layout: vk::PipelineLayout,
        first_set: u32,
        descriptor_sets: &[vk::DescriptorSet],
        dynamic_offsets: Option<&[u32]>,
    ) {
        unsafe {
            Gfx::get().gfx_device().cmd_bind_descriptor_sets(
                self.vk_handle,
                bind_point,
                pipeline_layout,
                first_set,
                descriptor_sets,
                dynamic_offsets.unwrap_or(&[]),
            );
        }
    }

    /// - command type: state
    /// - 支持的 queue：graphics, compute
    #[inline]
    pub fn cmd_bind_pipeline(&self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        unsafe {
            Gfx::get().gfx_device().cmd_bind_pipeline(self.vk_handle, bind_point, pipeline);
        }
    }
}
// 计算着色器相关命令
impl GfxCommandBuffer {
    #[inline]
    pub fn cmd_dispatch(&self, group_cnt: glam::UVec3) {
        unsafe {
            Gfx::get().gfx_device().cmd_dispatch(self.vk_handle, group_cnt.x, group_cnt.y, group_cnt.z);
        }
    }
}
// 同步相关命令
impl GfxCommandBuffer {
    /// - command type: synchronize
    /// - 支持的 queue：graphics, compute, transfer
    #[inline]
    pub fn memory_barrier(&self, barriers: &[vk::MemoryBarrier2]) {
        let dependency_info = vk::DependencyInfo::default().memory_barriers(barriers);
        unsafe {
            Gfx::get().gfx_device().cmd_pipeline_barrier2(self.vk_handle, &dependency_info);
        }
    }

    /// - command type: synchronize
    /// - 支持的 queue：graphics, compute, transfer
    #[inline]
    pub fn image_memory_barrier(&self, dependency_flags: vk::DependencyFlags, barriers: &[GfxImageBarrier]) {
        let barriers = barriers.iter().map(|b| *b.inner()).collect_vec();
        let dependency_info =
            vk::DependencyInfo::default().image_memory_barriers(&barriers).dependency_flags(dependency_flags);
        unsafe {
            Gfx::get().gfx_device().cmd_pipeline_barrier2(self.vk_handle, &dependency_info);
        }
    }

    /// - command type: synchronize
    /// - 支持的 queue：graphics, compute, transfer
    #[inline]
    pub fn buffer_memory_barrier(&self, dependency_flags: vk::DependencyFlags, barriers: &[GfxBufferBarrier]) {
        let barriers = barriers.iter().map(|b| *b.inner()).collect_vec();
        let dependency_info =
            vk::DependencyInfo::default().buffer_memory_barriers(&barriers).dependency_flags(dependency_flags);
        unsafe {
            Gfx::get().gfx_device().cmd_pipeline_barrier2(self.vk_handle, &dependency_info);
        }
    }

    /// image 和 buffer barrier 合并成一次同步调用
    /// - command type: synchronize
    /// - 支持的 queue：graphics, compute, transfer
    pub fn pipeline_barrier(
        &self,
        dependency_flags: vk::DependencyFlags,
        image_barriers: &[GfxImageBarrier],
        buffer_barriers: &[GfxBufferBarrier],
    ) {
        if image_barriers.is_empty() && buffer_barriers.is_empty() {
            return;
        }
        let image_barriers = image_barriers.iter().map(|b| *b.inner()).collect_vec();
        let buffer_barriers = buffer_barriers.iter().map(|b| *b.inner()).collect_vec();
        let dependency_info = vk::DependencyInfo::default()
            .image_memory_barriers(&image_barriers)
            .buffer_memory_barriers(&buffer_barriers)
            .dependency_flags(dependency_flags);
        unsafe {
            Gfx::get().gfx_device().cmd_pipeline_barrier2(self.vk_handle, &dependency_info);
        }
    }
}
// debug 相关命令
impl GfxCommandBuffer {
    /// - command type: state, action
    /// - 支持的 queue：graphics, compute
    #[inline]
    pub fn begin_label(&self, label_name: &str, label_color: glam::Vec4) {
        let name = std::ffi::CString::new(label_name).unwrap();
        unsafe {
            Gfx::get().gfx_device().debug_utils.cmd_begin_debug_utils_label(
                self.vk_handle,
                &vk::DebugUtilsLabelEXT::default().label_name(name.as_c_str()).color(label_color.into()),
            );
        }
    }

    /// - command type: state, action
    /// - 支持的 queue：graphics, compute
    #[inline]
    pub fn end_label(&self) {
        unsafe {
            Gfx::get().gfx_device().debug_utils.cmd_end_debug_utils_label(self.vk_handle);
        }
    }
}
impl DebugType for GfxCommandBuffer {
    fn debug_type_name() -> &'static str {
        "GfxCommandBuffer"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.vk_handle
    }
}
