use ash::vk;

use crate::connector::{FgBufferInput, FgBufferOutput, FgImageInput, FgImageOutput};
use crate::error::{FgConnectError, FgProcessError};
use crate::node::{FgConnectedInputs, FgNode, FgNodeFlags, FgProcessContext};

/// 历史缓冲节点：把输入逐迭代拷贝到自己的输出
///
/// 下游以 delay = d 连接 "out" 就能读到 d 个迭代之前的画面，
/// 需要的资源版本由图自动分配。[`Self::request_reset`] 会让图在
/// 下一个迭代把所有历史版本清零。
pub struct FgHistoryNode {
    reset_pending: bool,
}

impl FgHistoryNode {
    pub fn new() -> Self {
        Self { reset_pending: false }
    }

    /// 丢弃积累的历史，下一个迭代从全零开始
    pub fn request_reset(&mut self) {
        self.reset_pending = true;
    }
}

impl Default for FgHistoryNode {
    fn default() -> Self {
        Self::new()
    }
}

impl FgNode for FgHistoryNode {
    fn type_name(&self) -> &'static str {
        "history"
    }

    fn describe_inputs(&mut self) -> (Vec<FgImageInput>, Vec<FgBufferInput>) {
        (vec![FgImageInput::transfer_src("src")], Vec::new())
    }

    fn describe_outputs(
        &mut self,
        connected: &FgConnectedInputs,
    ) -> Result<(Vec<FgImageOutput>, Vec<FgBufferOutput>), FgConnectError> {
        let src = connected.image_inputs[0].ok_or_else(|| FgConnectError::DescribeOutputs {
            node: "history".to_string(),
            reason: "input 'src' must be connected without delay".to_string(),
        })?;

        Ok((
            vec![FgImageOutput::transfer_write("out", src.format, src.extent.width, src.extent.height)],
            vec![],
        ))
    }

    fn pre_process(&mut self, _iteration: u64) -> FgNodeFlags {
        if self.reset_pending {
            self.reset_pending = false;
            FgNodeFlags::RESET_IN_FLIGHT_DATA
        } else {
            FgNodeFlags::empty()
        }
    }

    fn process(&mut self, ctx: &mut FgProcessContext) -> Result<(), FgProcessError> {
        let src = ctx.image_input(0);
        let dst = ctx.image_outputs[0];

        let extent = src.image().extent();
        let layers = vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        };
        let region = vk::ImageCopy {
            src_subresource: layers,
            src_offset: vk::Offset3D::default(),
            dst_subresource: layers,
            dst_offset: vk::Offset3D::default(),
            extent,
        };

        ctx.cmd.cmd_copy_image(
            src.image(),
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            dst.image(),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region],
        );
        Ok(())
    }
}
