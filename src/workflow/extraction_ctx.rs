//! 号码处理上下文
//!
//! 封装"我正在处理批次里的第几个号码"这一信息

use std::fmt::Display;

use crate::models::Identifier;

/// 号码处理上下文
#[derive(Debug, Clone)]
pub struct ExtractionCtx {
    /// 在批次中的位置（从1开始）
    pub index: usize,

    /// 批次总数
    pub total: usize,

    pub identifier: Identifier,

    /// 调用方提供的关联标签（例如案件编号）
    pub correlation_tag: Option<String>,
}

impl ExtractionCtx {
    pub fn new(index: usize, total: usize, identifier: Identifier, correlation_tag: Option<String>) -> Self {
        Self {
            index,
            total,
            identifier,
            correlation_tag,
        }
    }
}

impl Display for ExtractionCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[号码 {}/{} {}]", self.index, self.total, self.identifier)?;
        if let Some(tag) = &self.correlation_tag {
            write!(f, "[{}]", tag)?;
        }
        Ok(())
    }
}
