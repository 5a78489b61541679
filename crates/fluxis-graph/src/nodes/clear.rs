use ash::vk;

use crate::connector::{FgBufferInput, FgBufferOutput, FgImageInput, FgImageOutput};
use crate::error::{FgConnectError, FgProcessError};
use crate::node::{FgConnectedInputs, FgNode, FgProcessContext};

/// 源节点：每个迭代把输出清成一种颜色
///
/// animate 开启时颜色随迭代缓慢脉动，方便肉眼确认图在跑。
pub struct FgClearNode {
    format: vk::Format,
    extent: vk::Extent2D,
    color: [f32; 4],
    animate: bool,
}

impl FgClearNode {
    pub fn new(format: vk::Format, width: u32, height: u32, color: [f32; 4]) -> Self {
        Self {
            format,
            extent: vk::Extent2D { width, height },
            color,
            animate: false,
        }
    }

    /// builder
    pub fn animated(mut self) -> Self {
        self.animate = true;
        self
    }

    pub fn set_color(&mut self, color: [f32; 4]) {
        self.color = color;
    }
}

impl FgNode for FgClearNode {
    fn type_name(&self) -> &'static str {
        "clear"
    }

    fn describe_outputs(
        &mut self,
        _connected: &FgConnectedInputs,
    ) -> Result<(Vec<FgImageOutput>, Vec<FgBufferOutput>), FgConnectError> {
        Ok((
            vec![FgImageOutput::transfer_write("out", self.format, self.extent.width, self.extent.height)],
            vec![],
        ))
    }

    fn describe_inputs(&mut self) -> (Vec<FgImageInput>, Vec<FgBufferInput>) {
        (Vec::new(), Vec::new())
    }

    fn process(&mut self, ctx: &mut FgProcessContext) -> Result<(), FgProcessError> {
        let mut color = self.color;
        if self.animate {
            let phase = (ctx.iteration % 120) as f32 / 120.0;
            let pulse = 0.5 + 0.5 * (phase * std::f32::consts::TAU).sin();
            color[0] *= pulse;
            color[1] *= pulse;
            color[2] *= pulse;
        }

        let out = ctx.image_outputs[0];
        ctx.cmd.cmd_clear_color_image(
            out.image(),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &vk::ClearColorValue { float32: color },
            &[out.image().full_range()],
        );
        Ok(())
    }
}
