//! 第四层：人工引导采集
//!
//! 自动层级都失败后，请操作员确认当前显示的就是目标联系人的面板，
//! 重新核验号码后再用第一层和第三层的读取逻辑取一次。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info};

use crate::error::AppResult;
use crate::models::{Identifier, Tier};
use crate::services::panel_locator::{read_panel_identifier, verify};
use crate::services::tiers::runtime_state::read_runtime;
use crate::services::tiers::structured::read_panel;
use crate::services::tiers::{ExtractionTier, ProfileFields, TierContext, TierStatus};

/// 与操作员交互
#[async_trait]
pub trait OperatorPrompt: Send + Sync {
    /// 等待操作员把目标联系人的面板调出来；返回 false 表示放弃
    async fn confirm_ready(&self, identifier: &Identifier) -> bool;
}

pub struct OperatorTier {
    prompt: Arc<dyn OperatorPrompt>,
    timeout: Duration,
}

impl OperatorTier {
    pub fn new(prompt: Arc<dyn OperatorPrompt>, timeout: Duration) -> Self {
        Self { prompt, timeout }
    }
}

/// 读取当前可见的面板：先核验号码，再依次用结构化读取和内存模型补齐
pub(crate) async fn capture_visible(ctx: &TierContext<'_>) -> AppResult<TierStatus> {
    let identifier = ctx.panel.identifier();
    let candidates = read_panel_identifier(ctx.driver, &ctx.resources.selectors).await?;
    if let Err(observed) = verify(identifier, &candidates) {
        error!("❌ 人工采集时面板号码不符: 请求 {}，面板显示 {:?}", identifier, observed);
        return Ok(TierStatus::Mismatch { observed });
    }

    let mut fields = ProfileFields::default();
    let mut restricted = absorb(&mut fields, read_panel(ctx).await?);
    if !fields.is_complete() {
        let runtime_ctx = ctx.wanting_avatar(ctx.want_avatar && fields.avatar.is_none());
        restricted |= absorb(&mut fields, read_runtime(&runtime_ctx).await?);
    }
    Ok(TierStatus::from_fields(fields, restricted))
}

/// 合并一次读取结果，返回是否观察到可见性限制
fn absorb(fields: &mut ProfileFields, status: TierStatus) -> bool {
    match status {
        TierStatus::Extracted(found) => {
            fields.fill_from(found);
            false
        }
        TierStatus::Empty { restricted } => restricted,
        TierStatus::Failed(_) | TierStatus::TimedOut | TierStatus::Mismatch { .. } => false,
    }
}

#[async_trait]
impl ExtractionTier for OperatorTier {
    fn tier(&self) -> Tier {
        Tier::OperatorGuided
    }

    fn timeout(&self, _default: Duration) -> Duration {
        self.timeout
    }

    async fn extract(&self, ctx: &TierContext<'_>) -> AppResult<TierStatus> {
        info!("🙋 请求人工协助: {}", ctx.panel.identifier());
        if !self.prompt.confirm_ready(ctx.panel.identifier()).await {
            return Ok(TierStatus::Failed("操作员放弃".to_string()));
        }
        capture_visible(ctx).await
    }
}
