//! 离线检视工具：搭一张示例图，编译后把拓扑与规划打到日志
//!
//! 编译阶段不需要 GPU，可以在任何机器上检查连接、资源版本、
//! 实例池与别名分组是否符合预期。

use ash::vk;
use fluxis_graph::connector::{FgBufferInput, FgBufferOutput, FgImageInput, FgImageOutput};
use fluxis_graph::error::{FgConnectError, FgProcessError};
use fluxis_graph::graph::FgGraph;
use fluxis_graph::node::{FgConnectedInputs, FgNode, FgProcessContext};
use fluxis_graph::nodes::{blit::FgBlitNode, clear::FgClearNode, history::FgHistoryNode};

/// 读取当前画面和上一迭代画面的示例消费者
struct TapNode;

impl FgNode for TapNode {
    fn type_name(&self) -> &'static str {
        "tap"
    }

    fn describe_inputs(&mut self) -> (Vec<FgImageInput>, Vec<FgBufferInput>) {
        (
            vec![
                FgImageInput::compute_read("current"),
                FgImageInput::compute_read("previous").with_delay(1).optional(),
            ],
            Vec::new(),
        )
    }

    fn describe_outputs(
        &mut self,
        _connected: &FgConnectedInputs,
    ) -> Result<(Vec<FgImageOutput>, Vec<FgBufferOutput>), FgConnectError> {
        Ok((Vec::new(), Vec::new()))
    }

    fn process(&mut self, _ctx: &mut FgProcessContext) -> Result<(), FgProcessError> {
        Ok(())
    }
}

fn main() {
    fluxis_crate_tools::init_log::init_log();

    let mut graph = FgGraph::new();
    let noise = graph
        .add_node("noise", Box::new(FgClearNode::new(vk::Format::R16G16B16A16_SFLOAT, 1920, 1080, [0.2, 0.4, 0.8, 1.0]).animated()))
        .unwrap();
    let half = graph.add_node("half", Box::new(FgBlitNode::new(2))).unwrap();
    let trail = graph.add_node("trail", Box::new(FgHistoryNode::new())).unwrap();
    let tap = graph.add_node("tap", Box::new(TapNode)).unwrap();

    graph.connect(noise, "out", half, "src");
    graph.connect(half, "out", trail, "src");
    graph.connect(trail, "out", tap, "current");
    graph.connect(trail, "out", tap, "previous");

    let report = graph.compile();
    log::info!("compile report: {} connected, {} disabled", report.connected, report.disabled.len());
    for (name, err) in &report.disabled {
        log::warn!("  {}: {}", name, err);
    }
    graph.log_topology();
}
