use thiserror::Error;

/// 连接/编译阶段的错误
///
/// 这些错误不会让整张图失败：出错的节点在本次编译尝试中被禁用，
/// 其输出对下游不可见，依赖它的节点级联禁用，图的其余部分照常工作。
/// 错误信息保留在节点上，直到下一次成功的编译。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FgConnectError {
    #[error("graph already contains a node named '{0}'")]
    DuplicateNodeName(String),

    #[error("node '{node}' declares connector '{connector}' more than once")]
    DuplicateConnector { node: String, connector: String },

    #[error("node '{node}' has no output named '{output}'")]
    UnknownOutput { node: String, output: String },

    #[error("node '{node}' has no input named '{input}'")]
    UnknownInput { node: String, input: String },

    #[error("kind mismatch on connection {src_node}:{output} -> {dst_node}:{input} (image vs buffer)")]
    KindMismatch {
        src_node: String,
        output: String,
        dst_node: String,
        input: String,
    },

    #[error("the input '{input}' on node '{node}' is already connected")]
    AlreadyConnected { node: String, input: String },

    #[error("input '{input}' of node '{node}' was not connected")]
    MissingInput { node: String, input: String },

    #[error("node '{node}' is connected to itself {output} -> {input} with delay 0, maybe you want a persistent output?")]
    SelfLoopWithoutDelay { node: String, output: String, input: String },

    #[error("persistent outputs cannot be consumed with delay > 0: {src_node}:{output} -> {dst_node}:{input}")]
    PersistentDelayed {
        src_node: String,
        output: String,
        dst_node: String,
        input: String,
    },

    #[error("node '{dst_node}' consumes the same image '{output}' of node '{src_node}' twice with different layouts")]
    LayoutConflict {
        src_node: String,
        output: String,
        dst_node: String,
    },

    #[error("undelayed (delay = 0) graph is not acyclic, nodes stuck: {nodes:?}")]
    DelayZeroCycle { nodes: Vec<String> },

    #[error("node '{node}' is disabled because upstream node '{upstream}' failed to connect")]
    UpstreamDisabled { node: String, upstream: String },

    #[error("node '{node}' failed to declare outputs: {reason}")]
    DescribeOutputs { node: String, reason: String },
}

/// 节点在 process 录制阶段的错误
///
/// 图会尽量把当前迭代收尾，记录诊断信息并在下一次迭代前强制重建。
/// 这条路径是 best-effort：本迭代的部分 GPU 工作可能处于不一致状态。
#[derive(Debug, Clone, Error)]
#[error("node '{node}' failed while recording: {reason}")]
pub struct FgProcessError {
    pub node: String,
    pub reason: String,
}

impl FgProcessError {
    pub fn new(node: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            reason: reason.into(),
        }
    }
}
