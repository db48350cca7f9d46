//! 第三层：客户端内存模型读取
//!
//! 绕过 DOM，按号码在客户端的联系人 / 会话模型中查找。

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::AppResult;
use crate::infrastructure::{eval_as, scripts};
use crate::models::Tier;
use crate::services::tiers::{refine, ExtractionTier, RawProfile, TierContext, TierStatus};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RuntimeContact {
    #[serde(default)]
    store_found: bool,
    #[serde(default)]
    found: bool,
    #[serde(flatten)]
    raw: RawProfile,
}

pub struct RuntimeStateTier;

pub(crate) async fn read_runtime(ctx: &TierContext<'_>) -> AppResult<TierStatus> {
    let identifier = ctx.panel.identifier();
    let contact = eval_as::<Option<RuntimeContact>>(ctx.driver, &scripts::runtime_contact(identifier))
        .await?
        .unwrap_or_default();
    if !contact.store_found {
        return Ok(TierStatus::Failed("客户端内存模型不可访问".to_string()));
    }
    if !contact.found {
        debug!("内存模型中没有 {}", identifier.chat_id());
        return Ok(TierStatus::Empty { restricted: false });
    }

    // 内存模型没有可见性标记，字段缺失不能说明对方设了限制
    let fields = refine(ctx, contact.raw).await?;
    Ok(TierStatus::from_fields(fields, false))
}

#[async_trait]
impl ExtractionTier for RuntimeStateTier {
    fn tier(&self) -> Tier {
        Tier::RuntimeState
    }

    async fn extract(&self, ctx: &TierContext<'_>) -> AppResult<TierStatus> {
        read_runtime(ctx).await
    }
}
