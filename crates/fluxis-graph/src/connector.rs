//! connector：节点上的命名接入点
//!
//! 输入 connector 声明访问方式、延迟与可选性；输出 connector 声明
//! 资源的创建参数与写入方式。binding table 布局由 connector 推导。

use ash::vk;

/// image 输入 connector
///
/// - `delay`: 读取生产者几个迭代之前的输出。0 表示当前迭代。
///   设为 n 会让生产者至少分配 n+1 份资源。
/// - `optional`: 允许不连接；此时 binding 槽位写入占位资源，
///   表形状在（解）绑定之间保持不变。
#[derive(Clone, Debug)]
pub struct FgImageInput {
    pub name: String,
    /// 对这个输入的访问方式，只允许读
    pub access: vk::AccessFlags2,
    /// 访问这个输入的 pipeline stages
    pub stages: vk::PipelineStageFlags2,
    /// 读取时要求的 image layout
    pub layout: vk::ImageLayout,
    /// 会合并进资源创建参数的 usage
    pub usage: vk::ImageUsageFlags,
    pub delay: u32,
    pub optional: bool,
}

impl FgImageInput {
    pub fn new(
        name: impl Into<String>,
        access: vk::AccessFlags2,
        stages: vk::PipelineStageFlags2,
        layout: vk::ImageLayout,
        usage: vk::ImageUsageFlags,
    ) -> Self {
        Self {
            name: name.into(),
            access,
            stages,
            layout,
            usage,
            delay: 0,
            optional: false,
        }
    }

    /// builder
    #[inline]
    pub fn with_delay(mut self, delay: u32) -> Self {
        self.delay = delay;
        self
    }

    /// builder
    #[inline]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// 计算着色器中采样读取
    pub fn compute_read(name: impl Into<String>) -> Self {
        Self::new(
            name,
            vk::AccessFlags2::SHADER_SAMPLED_READ,
            vk::PipelineStageFlags2::COMPUTE_SHADER,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageUsageFlags::SAMPLED,
        )
    }

    /// 计算着色器中 storage image 读取
    pub fn storage_read(name: impl Into<String>) -> Self {
        Self::new(
            name,
            vk::AccessFlags2::SHADER_STORAGE_READ,
            vk::PipelineStageFlags2::COMPUTE_SHADER,
            vk::ImageLayout::GENERAL,
            vk::ImageUsageFlags::STORAGE,
        )
    }

    /// 作为 transfer 源读取，不出现在 binding table 中
    pub fn transfer_src(name: impl Into<String>) -> Self {
        Self::new(
            name,
            vk::AccessFlags2::TRANSFER_READ,
            vk::PipelineStageFlags2::TRANSFER,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::ImageUsageFlags::TRANSFER_SRC,
        )
    }

    /// 这个 connector 在 binding table 中的槽位类型；None 表示不占槽位
    pub fn binding_type(&self) -> Option<vk::DescriptorType> {
        if self.usage.contains(vk::ImageUsageFlags::SAMPLED) {
            Some(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
        } else if self.usage.contains(vk::ImageUsageFlags::STORAGE) {
            Some(vk::DescriptorType::STORAGE_IMAGE)
        } else {
            None
        }
    }
}

/// buffer 输入 connector
#[derive(Clone, Debug)]
pub struct FgBufferInput {
    pub name: String,
    pub access: vk::AccessFlags2,
    pub stages: vk::PipelineStageFlags2,
    pub usage: vk::BufferUsageFlags,
    pub delay: u32,
    pub optional: bool,
}

impl FgBufferInput {
    pub fn new(
        name: impl Into<String>,
        access: vk::AccessFlags2,
        stages: vk::PipelineStageFlags2,
        usage: vk::BufferUsageFlags,
    ) -> Self {
        Self {
            name: name.into(),
            access,
            stages,
            usage,
            delay: 0,
            optional: false,
        }
    }

    /// builder
    #[inline]
    pub fn with_delay(mut self, delay: u32) -> Self {
        self.delay = delay;
        self
    }

    /// builder
    #[inline]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// 计算着色器中 storage buffer 读取
    pub fn compute_read(name: impl Into<String>) -> Self {
        Self::new(
            name,
            vk::AccessFlags2::SHADER_STORAGE_READ,
            vk::PipelineStageFlags2::COMPUTE_SHADER,
            vk::BufferUsageFlags::STORAGE_BUFFER,
        )
    }

    /// uniform buffer 读取
    pub fn uniform_read(name: impl Into<String>, stages: vk::PipelineStageFlags2) -> Self {
        Self::new(name, vk::AccessFlags2::UNIFORM_READ, stages, vk::BufferUsageFlags::UNIFORM_BUFFER)
    }

    /// 作为 transfer 源读取，不出现在 binding table 中
    pub fn transfer_src(name: impl Into<String>) -> Self {
        Self::new(
            name,
            vk::AccessFlags2::TRANSFER_READ,
            vk::PipelineStageFlags2::TRANSFER,
            vk::BufferUsageFlags::TRANSFER_SRC,
        )
    }

    pub fn binding_type(&self) -> Option<vk::DescriptorType> {
        if self.usage.contains(vk::BufferUsageFlags::STORAGE_BUFFER) {
            Some(vk::DescriptorType::STORAGE_BUFFER)
        } else if self.usage.contains(vk::BufferUsageFlags::UNIFORM_BUFFER) {
            Some(vk::DescriptorType::UNIFORM_BUFFER)
        } else {
            None
        }
    }
}

/// image 输出 connector
///
/// 拥有资源的创建契约。消费者声明的 usage 会在编译时合并进来；
/// 最大延迟决定分配几份资源版本。
#[derive(Clone, Debug)]
pub struct FgImageOutput {
    pub name: String,
    /// 对这个输出的访问方式
    pub access: vk::AccessFlags2,
    /// 访问这个输出的 pipeline stages
    pub stages: vk::PipelineStageFlags2,
    /// 写入时的 image layout
    pub layout: vk::ImageLayout,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub usage: vk::ImageUsageFlags,
    /// 资源内容跨迭代、跨重连保留；持久输出不参与显存别名复用，
    /// 且不允许被延迟消费
    pub persistent: bool,
}

impl FgImageOutput {
    /// 计算着色器写入的 storage image
    pub fn compute_write(name: impl Into<String>, format: vk::Format, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            access: vk::AccessFlags2::SHADER_STORAGE_WRITE,
            stages: vk::PipelineStageFlags2::COMPUTE_SHADER,
            layout: vk::ImageLayout::GENERAL,
            format,
            extent: vk::Extent2D { width, height },
            usage: vk::ImageUsageFlags::STORAGE,
            persistent: false,
        }
    }

    /// transfer 写入的 image
    pub fn transfer_write(name: impl Into<String>, format: vk::Format, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            access: vk::AccessFlags2::TRANSFER_WRITE,
            stages: vk::PipelineStageFlags2::TRANSFER,
            layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            format,
            extent: vk::Extent2D { width, height },
            usage: vk::ImageUsageFlags::TRANSFER_DST,
            persistent: false,
        }
    }

    /// builder
    #[inline]
    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }

    pub fn binding_type(&self) -> Option<vk::DescriptorType> {
        if self.usage.contains(vk::ImageUsageFlags::STORAGE) {
            Some(vk::DescriptorType::STORAGE_IMAGE)
        } else {
            None
        }
    }
}

/// buffer 输出 connector
#[derive(Clone, Debug)]
pub struct FgBufferOutput {
    pub name: String,
    pub access: vk::AccessFlags2,
    pub stages: vk::PipelineStageFlags2,
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
    pub persistent: bool,
}

impl FgBufferOutput {
    /// 计算着色器写入的 storage buffer
    pub fn compute_write(name: impl Into<String>, size: vk::DeviceSize) -> Self {
        Self {
            name: name.into(),
            access: vk::AccessFlags2::SHADER_STORAGE_WRITE,
            stages: vk::PipelineStageFlags2::COMPUTE_SHADER,
            size,
            usage: vk::BufferUsageFlags::STORAGE_BUFFER,
            persistent: false,
        }
    }

    /// transfer 写入的 buffer
    pub fn transfer_write(name: impl Into<String>, size: vk::DeviceSize) -> Self {
        Self {
            name: name.into(),
            access: vk::AccessFlags2::TRANSFER_WRITE,
            stages: vk::PipelineStageFlags2::TRANSFER,
            size,
            usage: vk::BufferUsageFlags::TRANSFER_DST,
            persistent: false,
        }
    }

    /// builder
    #[inline]
    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }

    pub fn binding_type(&self) -> Option<vk::DescriptorType> {
        if self.usage.contains(vk::BufferUsageFlags::STORAGE_BUFFER) {
            Some(vk::DescriptorType::STORAGE_BUFFER)
        } else if self.usage.contains(vk::BufferUsageFlags::UNIFORM_BUFFER) {
            Some(vk::DescriptorType::UNIFORM_BUFFER)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampled_input_binding_type() {
        let input = FgImageInput::compute_read("src");
        assert_eq!(input.binding_type(), Some(vk::DescriptorType::COMBINED_IMAGE_SAMPLER));
    }

    #[test]
    fn test_transfer_connectors_have_no_binding() {
        assert_eq!(FgImageInput::transfer_src("src").binding_type(), None);
        assert_eq!(FgBufferInput::transfer_src("src").binding_type(), None);
        assert_eq!(FgImageOutput::transfer_write("out", vk::Format::R8G8B8A8_UNORM, 4, 4).binding_type(), None);
    }

    #[test]
    fn test_storage_output_binding_type() {
        let output = FgImageOutput::compute_write("out", vk::Format::R16G16B16A16_SFLOAT, 64, 64);
        assert_eq!(output.binding_type(), Some(vk::DescriptorType::STORAGE_IMAGE));
        assert!(!output.persistent);
        assert!(output.clone().persistent().persistent);
    }

    #[test]
    fn test_input_builder() {
        let input = FgImageInput::compute_read("history").with_delay(2).optional();
        assert_eq!(input.delay, 2);
        assert!(input.optional);
    }
}
