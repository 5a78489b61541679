//! 图持有的资源及其同步簿记
//!
//! 资源由图独占所有；节点只通过 process 上下文拿到视图。

use ash::vk;
use fluxis_gfx::resources::{buffer::GfxBuffer, image::GfxImage, image_view::GfxImageView};

/// 图分配的一份 image 资源版本
pub struct FgImageResource {
    pub(crate) image: GfxImage,
    /// binding table 写入用的默认视图
    pub(crate) view: GfxImageView,

    // barrier 插入用的当前状态
    pub(crate) current_layout: vk::ImageLayout,
    pub(crate) current_stages: vk::PipelineStageFlags2,
    pub(crate) current_access: vk::AccessFlags2,

    /// 上一次使用是否为输出写入；决定下一个 barrier 的 src 侧
    pub(crate) last_used_as_output: bool,

    /// 所有消费者的 stage/access 并集
    pub(crate) input_stages: vk::PipelineStageFlags2,
    pub(crate) input_access: vk::AccessFlags2,
}

impl FgImageResource {
    pub(crate) fn new(
        image: GfxImage,
        view: GfxImageView,
        input_stages: vk::PipelineStageFlags2,
        input_access: vk::AccessFlags2,
    ) -> Self {
        Self {
            image,
            view,
            current_layout: vk::ImageLayout::UNDEFINED,
            current_stages: vk::PipelineStageFlags2::TOP_OF_PIPE,
            current_access: vk::AccessFlags2::empty(),
            last_used_as_output: false,
            input_stages,
            input_access,
        }
    }

    pub(crate) fn destroy(self) {
        self.view.destroy();
        self.image.destroy();
    }

    #[inline]
    pub fn image(&self) -> &GfxImage {
        &self.image
    }

    #[inline]
    pub fn view(&self) -> &GfxImageView {
        &self.view
    }

    #[inline]
    pub fn current_layout(&self) -> vk::ImageLayout {
        self.current_layout
    }
}

/// 图分配的一份 buffer 资源版本
pub struct FgBufferResource {
    pub(crate) buffer: GfxBuffer,

    pub(crate) current_stages: vk::PipelineStageFlags2,
    pub(crate) current_access: vk::AccessFlags2,

    pub(crate) last_used_as_output: bool,

    pub(crate) input_stages: vk::PipelineStageFlags2,
    pub(crate) input_access: vk::AccessFlags2,
}

impl FgBufferResource {
    pub(crate) fn new(
        buffer: GfxBuffer,
        input_stages: vk::PipelineStageFlags2,
        input_access: vk::AccessFlags2,
    ) -> Self {
        Self {
            buffer,
            current_stages: vk::PipelineStageFlags2::TOP_OF_PIPE,
            current_access: vk::AccessFlags2::empty(),
            last_used_as_output: false,
            input_stages,
            input_access,
        }
    }

    pub(crate) fn destroy(self) {
        self.buffer.destroy();
    }

    #[inline]
    pub fn buffer(&self) -> &GfxBuffer {
        &self.buffer
    }
}
