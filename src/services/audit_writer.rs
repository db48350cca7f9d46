//! 审计记录 - 业务能力层
//!
//! 每个号码得到最终结果后通知审计端；写入失败不影响提取本身

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::models::{ExtractionOutcome, ExtractionResult, FieldProvenance, Identifier};

/// 一条审计记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub identifier: Identifier,
    pub correlation_tag: Option<String>,
    pub outcome: ExtractionOutcome,
    pub provenance: FieldProvenance,
    pub diagnostic: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl From<&ExtractionResult> for AuditRecord {
    fn from(result: &ExtractionResult) -> Self {
        Self {
            identifier: result.identifier.clone(),
            correlation_tag: result.correlation_tag.clone(),
            outcome: result.outcome,
            provenance: result.provenance,
            diagnostic: result.diagnostic.clone(),
            timestamp: result.extracted_at,
        }
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: &AuditRecord) -> AppResult<()>;
}

/// 通知审计端，失败只记录警告
pub async fn notify(sink: &dyn AuditSink, result: &ExtractionResult) {
    if let Err(e) = sink.record(&AuditRecord::from(result)).await {
        warn!("审计记录写入失败 ({}): {}", result.identifier, e);
    }
}

/// 追加写 JSON Lines 文件
///
/// 职责：
/// - 每个最终结果写一行
/// - 不关心流程顺序
pub struct JsonlAuditSink {
    path: PathBuf,
}

impl JsonlAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn record(&self, record: &AuditRecord) -> AppResult<()> {
        debug!("写入审计: {} | {}", record.identifier, record.outcome);

        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| AppError::file_write_failed(self.path.display().to_string(), e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| AppError::file_write_failed(self.path.display().to_string(), e))?;
        Ok(())
    }
}

/// 只写日志的审计端
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, record: &AuditRecord) -> AppResult<()> {
        info!(
            "审计: {} | {} | 层级 {:?}",
            record.identifier,
            record.outcome,
            record.provenance.contributing_tiers()
        );
        Ok(())
    }
}
