//! GPU 处理图引擎
//!
//! 节点通过命名的输入/输出 connector 连成有向图，引擎负责：
//! - 按拓扑顺序连接节点，推导每个输出需要的资源版本数（延迟消费者越多版本越多）
//! - 自动推导每个节点的 binding table 布局，并按迭代循环使用一池实例
//! - 在生产者与消费者之间插入最小化的 barrier
//! - 非持久资源的显存按生命周期互斥关系做别名复用
//!
//! 编译（[`graph::FgGraph::compile`]）是纯规划阶段，不触碰任何 GPU 对象；
//! 构建与执行才会通过 [`fluxis_gfx::gfx::Gfx`] 分配资源并录制命令。

pub mod binding;
pub mod connector;
pub mod error;
pub mod graph;
pub mod node;
pub mod nodes;
pub mod resource;
pub mod run_info;
