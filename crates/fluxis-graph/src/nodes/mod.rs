//! 内置节点
//!
//! 覆盖最常见的几类图元：清屏源、缩放拷贝、历史缓冲、
//! 以及从 binding 布局自动建立 pipeline 的通用计算节点。

pub mod blit;
pub mod clear;
pub mod compute;
pub mod history;
