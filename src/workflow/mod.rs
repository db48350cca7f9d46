//! 流程层（Workflow）
//!
//! 定义"一个号码"的完整处理流程：节奏控制 → 导航 → 打开并核验面板 → 分层提取，
//! 各阶段的重试与退避策略只在这里定义一次。

pub mod extraction_ctx;
pub mod extraction_flow;

pub use extraction_ctx::ExtractionCtx;
pub use extraction_flow::{ExtractionFlow, FlowInterrupt, RetryPolicy};
