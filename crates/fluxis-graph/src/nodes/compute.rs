use std::ffi::CString;

use ash::vk;
use fluxis_gfx::gfx::Gfx;
use fluxis_gfx::pipelines::shader::GfxShaderModule;

use crate::binding::FgNodeBindingInfo;
use crate::connector::{FgBufferInput, FgBufferOutput, FgImageInput, FgImageOutput};
use crate::error::{FgConnectError, FgProcessError};
use crate::node::{FgConnectedInputs, FgNode, FgProcessContext};

/// 通用计算节点
///
/// 调用方声明 connector 列表并提供 SPIR-V 字节码；pipeline layout
/// 在 on_connected 时从图推导出的 binding 布局建立。
/// 泛型参数 P 表示 compute shader 的参数，以 push constant 的形式传入 shader。
///
/// shader 的 descriptor 绑定顺序必须和 connector 的声明顺序一致：
/// image 输入、buffer 输入、image 输出、buffer 输出，
/// 跳过 transfer-only 的 connector。
pub struct FgComputeNode<P: bytemuck::Pod> {
    spirv: Vec<u8>,
    entry_point: CString,
    /// workgroup 的线程尺寸，dispatch 数按第一个 image 输出的 extent 推算
    group_size: (u32, u32),
    params: P,

    image_inputs: Vec<FgImageInput>,
    buffer_inputs: Vec<FgBufferInput>,
    image_outputs: Vec<FgImageOutput>,
    buffer_outputs: Vec<FgBufferOutput>,

    pipeline: vk::Pipeline,
    pipeline_layout: vk::PipelineLayout,
}

// new & builder
impl<P: bytemuck::Pod> FgComputeNode<P> {
    pub fn new(spirv: Vec<u8>, entry_point: &str, group_size: (u32, u32), params: P) -> Self {
        Self {
            spirv,
            entry_point: CString::new(entry_point).unwrap(),
            group_size,
            params,
            image_inputs: Vec::new(),
            buffer_inputs: Vec::new(),
            image_outputs: Vec::new(),
            buffer_outputs: Vec::new(),
            pipeline: vk::Pipeline::null(),
            pipeline_layout: vk::PipelineLayout::null(),
        }
    }

    /// builder
    pub fn image_in(mut self, input: FgImageInput) -> Self {
        self.image_inputs.push(input);
        self
    }

    /// builder
    pub fn buffer_in(mut self, input: FgBufferInput) -> Self {
        self.buffer_inputs.push(input);
        self
    }

    /// builder
    pub fn image_out(mut self, output: FgImageOutput) -> Self {
        self.image_outputs.push(output);
        self
    }

    /// builder
    pub fn buffer_out(mut self, output: FgBufferOutput) -> Self {
        self.buffer_outputs.push(output);
        self
    }

    pub fn set_params(&mut self, params: P) {
        self.params = params;
    }

    fn destroy_pipeline(&mut self) {
        if self.pipeline != vk::Pipeline::null() {
            unsafe {
                Gfx::get().gfx_device().destroy_pipeline(self.pipeline, None);
                Gfx::get().gfx_device().destroy_pipeline_layout(self.pipeline_layout, None);
            }
            self.pipeline = vk::Pipeline::null();
            self.pipeline_layout = vk::PipelineLayout::null();
        }
    }
}

impl<P: bytemuck::Pod> FgNode for FgComputeNode<P> {
    fn type_name(&self) -> &'static str {
        "compute"
    }

    fn describe_inputs(&mut self) -> (Vec<FgImageInput>, Vec<FgBufferInput>) {
        (self.image_inputs.clone(), self.buffer_inputs.clone())
    }

    fn describe_outputs(
        &mut self,
        _connected: &FgConnectedInputs,
    ) -> Result<(Vec<FgImageOutput>, Vec<FgBufferOutput>), FgConnectError> {
        Ok((self.image_outputs.clone(), self.buffer_outputs.clone()))
    }

    fn on_connected(&mut self, binding: &FgNodeBindingInfo) {
        // 重连后布局可能变化，pipeline 重新建立
        self.destroy_pipeline();

        let shader_module = GfxShaderModule::new_from_spirv(&self.spirv, "compute-node");
        let stage_info = vk::PipelineShaderStageCreateInfo::default()
            .module(shader_module.handle())
            .stage(vk::ShaderStageFlags::COMPUTE)
            .name(self.entry_point.as_c_str());

        let pipeline_layout = {
            let push_constant_range = vk::PushConstantRange::default()
                .stage_flags(vk::ShaderStageFlags::COMPUTE)
                .offset(0)
                .size(size_of::<P>() as u32);

            let set_layouts =
                binding.set_layout.map(|layout| vec![layout]).unwrap_or_default();
            let mut pipeline_layout_ci = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
            if size_of::<P>() > 0 {
                pipeline_layout_ci = pipeline_layout_ci.push_constant_ranges(std::slice::from_ref(&push_constant_range));
            }

            unsafe { Gfx::get().gfx_device().create_pipeline_layout(&pipeline_layout_ci, None).unwrap() }
        };

        let pipeline_ci = vk::ComputePipelineCreateInfo::default().stage(stage_info).layout(pipeline_layout);
        let pipeline = unsafe {
            Gfx::get()
                .gfx_device()
                .create_compute_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&pipeline_ci), None)
                .unwrap()[0]
        };

        shader_module.destroy();

        self.pipeline = pipeline;
        self.pipeline_layout = pipeline_layout;
    }

    fn process(&mut self, ctx: &mut FgProcessContext) -> Result<(), FgProcessError> {
        assert!(self.pipeline != vk::Pipeline::null(), "FgComputeNode::process: pipeline not built");

        ctx.cmd.cmd_bind_pipeline(vk::PipelineBindPoint::COMPUTE, self.pipeline);
        if size_of::<P>() > 0 {
            ctx.cmd.cmd_push_constants(
                self.pipeline_layout,
                vk::ShaderStageFlags::COMPUTE,
                0,
                bytemuck::bytes_of(&self.params),
            );
        }
        if let Some(descriptor_set) = ctx.descriptor_set {
            ctx.cmd.bind_descriptor_sets(
                vk::PipelineBindPoint::COMPUTE,
                self.pipeline_layout,
                0,
                &[descriptor_set],
                None,
            );
        }

        // dispatch 数按第一个 image 输出的尺寸推算
        let group_count = match ctx.image_outputs.first() {
            Some(out) => {
                let extent = out.image().extent_2d();
                glam::UVec3::new(
                    extent.width.div_ceil(self.group_size.0),
                    extent.height.div_ceil(self.group_size.1),
                    1,
                )
            }
            None => glam::UVec3::new(1, 1, 1),
        };
        ctx.cmd.cmd_dispatch(group_count);
        Ok(())
    }
}

impl<P: bytemuck::Pod> Drop for FgComputeNode<P> {
    fn drop(&mut self) {
        self.destroy_pipeline();
    }
}
