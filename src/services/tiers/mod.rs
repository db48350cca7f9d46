//! 提取层级
//!
//! 每个层级独立地尝试读取 {名称, 签名, 头像} 中的任意几项，
//! 以 `TierStatus` 返回结果而不是抛错；只有浏览器故障以 `Err` 返回。

pub mod ocr;
pub mod operator;
pub mod runtime_state;
pub mod structured;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::AppResult;
use crate::infrastructure::PageDriver;
use crate::models::{OcrRegions, SelectorSet, Tier};
use crate::services::avatar_store::AvatarStore;
use crate::services::panel_locator::PanelHandle;
use crate::services::text_filter::TextFilter;

pub use ocr::{OcrEngine, RenderedTextTier, TesseractCli};
pub use operator::{OperatorPrompt, OperatorTier};
pub use runtime_state::RuntimeStateTier;
pub use structured::StructuredTier;

/// 一次提取得到的资料字段
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileFields {
    pub name: Option<String>,
    pub about: Option<String>,
    pub avatar: Option<PathBuf>,
}

impl ProfileFields {
    pub fn count(&self) -> usize {
        [self.name.is_some(), self.about.is_some(), self.avatar.is_some()]
            .into_iter()
            .filter(|x| *x)
            .count()
    }

    pub fn is_complete(&self) -> bool {
        self.count() == 3
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// 只补齐自己缺的字段，已有字段不覆盖
    pub fn fill_from(&mut self, other: ProfileFields) {
        if self.name.is_none() {
            self.name = other.name;
        }
        if self.about.is_none() {
            self.about = other.about;
        }
        if self.avatar.is_none() {
            self.avatar = other.avatar;
        }
    }
}

/// 单个层级的结果
#[derive(Debug, Clone, PartialEq)]
pub enum TierStatus {
    /// 至少读到一个字段
    Extracted(ProfileFields),
    /// 正常运行但没有可用内容；`restricted` 表示观察到了对方的可见性限制
    Empty { restricted: bool },
    /// 本层级无法运行
    Failed(String),
    /// 超过层级时限
    TimedOut,
    /// 重新核验时发现面板属于别的号码；`observed` 为面板上读到的号码
    Mismatch { observed: Option<String> },
}

impl TierStatus {
    pub(crate) fn from_fields(fields: ProfileFields, restricted: bool) -> Self {
        if fields.is_empty() {
            TierStatus::Empty { restricted }
        } else {
            TierStatus::Extracted(fields)
        }
    }
}

/// 各层级共用的依赖
pub struct TierResources {
    pub selectors: SelectorSet,
    pub ocr_regions: OcrRegions,
    pub filter: TextFilter,
    pub avatars: AvatarStore,
}

#[derive(Clone, Copy)]
pub struct TierContext<'a> {
    pub driver: &'a dyn PageDriver,
    pub panel: &'a PanelHandle,
    pub resources: &'a TierResources,
    /// 头像已由更高优先级的层级取得时为 false，本层级不再取回或写盘
    pub want_avatar: bool,
}

impl<'a> TierContext<'a> {
    pub fn new(driver: &'a dyn PageDriver, panel: &'a PanelHandle, resources: &'a TierResources) -> Self {
        Self {
            driver,
            panel,
            resources,
            want_avatar: true,
        }
    }

    pub fn wanting_avatar(self, want_avatar: bool) -> Self {
        Self { want_avatar, ..self }
    }
}

#[async_trait]
pub trait ExtractionTier: Send + Sync {
    fn tier(&self) -> Tier;

    /// 本层级的时限，默认使用流水线统一的时限
    fn timeout(&self, default: Duration) -> Duration {
        default
    }

    async fn extract(&self, ctx: &TierContext<'_>) -> AppResult<TierStatus>;
}

/// 页面或内存模型里读到的原始字段
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawProfile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub about: Option<String>,
    #[serde(default)]
    pub avatar_src: Option<String>,
}

/// 清洗文本并保存头像
pub(crate) async fn refine(ctx: &TierContext<'_>, raw: RawProfile) -> AppResult<ProfileFields> {
    let identifier = ctx.panel.identifier();
    let filter = &ctx.resources.filter;

    let name = raw.name.as_deref().and_then(|n| filter.clean_name(n, identifier));
    let about = raw.about.as_deref().and_then(|a| filter.clean_about(a, identifier));
    let avatar = match raw.avatar_src.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(src) if ctx.want_avatar && !filter.is_placeholder_avatar(src) => {
            ctx.resources
                .avatars
                .save_from_src_quietly(ctx.driver, identifier, src)
                .await?
        }
        _ => None,
    };
    Ok(ProfileFields { name, about, avatar })
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_never_overwrites() {
        let mut fields = ProfileFields {
            name: Some("Priya".to_string()),
            ..ProfileFields::default()
        };
        fields.fill_from(ProfileFields {
            name: Some("OCR Priya".to_string()),
            about: Some("Busy".to_string()),
            avatar: None,
        });
        assert_eq!(fields.name.as_deref(), Some("Priya"));
        assert_eq!(fields.about.as_deref(), Some("Busy"));
        assert_eq!(fields.count(), 2);
    }

    #[test]
    fn empty_fields_become_empty_status() {
        assert_eq!(
            TierStatus::from_fields(ProfileFields::default(), true),
            TierStatus::Empty { restricted: true }
        );
    }
}
