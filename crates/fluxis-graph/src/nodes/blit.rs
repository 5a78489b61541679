use ash::vk;

use crate::connector::{FgBufferInput, FgBufferOutput, FgImageInput, FgImageOutput};
use crate::error::{FgConnectError, FgProcessError};
use crate::node::{FgConnectedInputs, FgNode, FgProcessContext};

/// 缩放拷贝节点：输出尺寸按上游输入推导
///
/// downscale 为 1 时是等尺寸 blit；大于 1 时每个维度缩小到 1/downscale。
pub struct FgBlitNode {
    downscale: u32,
}

impl FgBlitNode {
    pub fn new(downscale: u32) -> Self {
        assert!(downscale >= 1, "FgBlitNode::new: downscale must be >= 1");
        Self { downscale }
    }
}

impl FgNode for FgBlitNode {
    fn type_name(&self) -> &'static str {
        "blit"
    }

    fn describe_inputs(&mut self) -> (Vec<FgImageInput>, Vec<FgBufferInput>) {
        (vec![FgImageInput::transfer_src("src")], Vec::new())
    }

    fn describe_outputs(
        &mut self,
        connected: &FgConnectedInputs,
    ) -> Result<(Vec<FgImageOutput>, Vec<FgBufferOutput>), FgConnectError> {
        // 输出形状跟随上游：格式不变，尺寸按比例缩小
        let src = connected.image_inputs[0].ok_or_else(|| FgConnectError::DescribeOutputs {
            node: "blit".to_string(),
            reason: "input 'src' must be connected without delay".to_string(),
        })?;

        let width = (src.extent.width / self.downscale).max(1);
        let height = (src.extent.height / self.downscale).max(1);
        Ok((vec![FgImageOutput::transfer_write("out", src.format, width, height)], vec![]))
    }

    fn process(&mut self, ctx: &mut FgProcessContext) -> Result<(), FgProcessError> {
        let src = ctx.image_input(0);
        let dst = ctx.image_outputs[0];

        let src_extent = src.image().extent();
        let dst_extent = dst.image().extent();
        let layers = vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        };
        let region = vk::ImageBlit {
            src_subresource: layers,
            src_offsets: [
                vk::Offset3D { x: 0, y: 0, z: 0 },
                vk::Offset3D {
                    x: src_extent.width as i32,
                    y: src_extent.height as i32,
                    z: 1,
                },
            ],
            dst_subresource: layers,
            dst_offsets: [
                vk::Offset3D { x: 0, y: 0, z: 0 },
                vk::Offset3D {
                    x: dst_extent.width as i32,
                    y: dst_extent.height as i32,
                    z: 1,
                },
            ],
        };

        ctx.cmd.cmd_blit_image(
            src.image(),
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            dst.image(),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region],
            vk::Filter::LINEAR,
        );
        Ok(())
    }
}
