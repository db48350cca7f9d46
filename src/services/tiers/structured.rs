//! 第一层：结构化元素读取

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::AppResult;
use crate::infrastructure::{eval_as, scripts};
use crate::models::Tier;
use crate::services::tiers::{refine, ExtractionTier, RawProfile, TierContext, TierStatus};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PanelFields {
    #[serde(default)]
    root_found: bool,
    #[serde(flatten)]
    raw: RawProfile,
    #[serde(default)]
    default_avatar: bool,
}

pub struct StructuredTier;

/// 在已核验面板里按选择器读取字段
pub(crate) async fn read_panel(ctx: &TierContext<'_>) -> AppResult<TierStatus> {
    let panel = eval_as::<Option<PanelFields>>(ctx.driver, &scripts::panel_fields(&ctx.resources.selectors))
        .await?
        .unwrap_or_default();
    if !panel.root_found {
        return Ok(TierStatus::Failed("面板未渲染".to_string()));
    }
    debug!("结构化读取: {:?}", panel.raw);

    let about_missing = panel.raw.about.is_none();
    let restricted = panel.default_avatar && about_missing;
    let fields = refine(ctx, panel.raw).await?;
    Ok(TierStatus::from_fields(fields, restricted))
}

#[async_trait]
impl ExtractionTier for StructuredTier {
    fn tier(&self) -> Tier {
        Tier::StructuredElement
    }

    async fn extract(&self, ctx: &TierContext<'_>) -> AppResult<TierStatus> {
        read_panel(ctx).await
    }
}
