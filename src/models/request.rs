//! 提取请求

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::models::identifier::{Identifier, IdentifierValidator};

/// 单个号码的提取请求，创建后不可修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRequest {
    identifier: Identifier,
    correlation_tag: Option<String>,
}

impl ExtractionRequest {
    pub fn new(identifier: Identifier, correlation_tag: Option<String>) -> Self {
        Self {
            identifier,
            correlation_tag,
        }
    }

    /// 校验原始输入并创建请求
    pub fn parse(
        raw: &str,
        correlation_tag: Option<String>,
        validator: &dyn IdentifierValidator,
    ) -> Result<Self, ValidationError> {
        Ok(Self::new(validator.normalize(raw)?, correlation_tag))
    }

    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    /// 关联标签（例如案件编号）
    pub fn correlation_tag(&self) -> Option<&str> {
        self.correlation_tag.as_deref()
    }
}
