//! 提取流水线 - 业务能力层
//!
//! 按优先级依次运行各层级，合并结果：后面的层级只能补齐前面留空的字段。
//! 三个字段齐全或层级用完时停止。

use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::infrastructure::PageDriver;
use crate::models::{FieldProvenance, Tier};
use crate::services::panel_locator::PanelHandle;
use crate::services::tiers::{ExtractionTier, ProfileFields, TierContext, TierResources, TierStatus};

/// 一个层级的运行记录
#[derive(Debug, Clone, PartialEq)]
pub struct TierAttempt {
    pub tier: Tier,
    pub status: TierStatus,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineReport {
    pub fields: ProfileFields,
    pub provenance: FieldProvenance,
    pub attempts: Vec<TierAttempt>,
    /// 有层级明确观察到对方的可见性限制
    pub visibility_restricted: bool,
    /// 浏览器在流水线运行中失去响应
    pub fault: Option<String>,
    /// 层级重新核验时发现面板属于别的号码；内层为面板上读到的号码
    pub mismatch: Option<Option<String>>,
}

impl PipelineReport {
    /// 记录一个层级的结果并合并字段
    pub(crate) fn absorb(&mut self, tier: Tier, status: TierStatus, panel: &PanelHandle) {
        match &status {
            TierStatus::Extracted(found) => {
                info!("✓ {} 读到 {} 个字段: {}", tier, found.count(), panel.identifier());
                self.merge(tier, found.clone());
            }
            TierStatus::Empty { restricted } => {
                debug!("{} 没有可用内容 (可见性限制: {})", tier, restricted);
                self.visibility_restricted |= *restricted;
            }
            TierStatus::Failed(reason) => warn!("{} 失败: {}", tier, reason),
            TierStatus::TimedOut => warn!("{} 超时", tier),
            TierStatus::Mismatch { observed } => {
                error!(
                    "❌ {} 重新核验不符: 请求 {}，面板显示 {:?}",
                    tier,
                    panel.identifier(),
                    observed
                );
                self.mismatch = Some(observed.clone());
            }
        }
        self.attempts.push(TierAttempt { tier, status });
    }

    /// 只填补空字段，并记录提供者
    fn merge(&mut self, tier: Tier, found: ProfileFields) {
        if self.fields.name.is_none() && found.name.is_some() {
            self.fields.name = found.name;
            self.provenance.name = Some(tier);
        }
        if self.fields.about.is_none() && found.about.is_some() {
            self.fields.about = found.about;
            self.provenance.about = Some(tier);
        }
        if self.fields.avatar.is_none() && found.avatar.is_some() {
            self.fields.avatar = found.avatar;
            self.provenance.avatar = Some(tier);
        }
    }
}

pub struct ExtractionPipeline {
    tiers: Vec<Box<dyn ExtractionTier>>,
    tier_timeout: Duration,
    resources: TierResources,
}

impl ExtractionPipeline {
    pub fn new(resources: TierResources, tier_timeout: Duration) -> Self {
        Self {
            tiers: Vec::new(),
            tier_timeout,
            resources,
        }
    }

    /// 添加层级，始终按优先级排序
    pub fn with_tier(mut self, tier: Box<dyn ExtractionTier>) -> Self {
        self.tiers.push(tier);
        self.tiers.sort_by_key(|t| t.tier());
        self
    }

    pub fn resources(&self) -> &TierResources {
        &self.resources
    }

    pub fn tiers(&self) -> Vec<Tier> {
        self.tiers.iter().map(|t| t.tier()).collect()
    }

    /// 在已核验的面板上运行全部层级
    pub async fn run(&self, driver: &dyn PageDriver, panel: &PanelHandle) -> PipelineReport {
        let mut report = PipelineReport::default();

        for tier in &self.tiers {
            if report.fields.is_complete() {
                break;
            }
            let label = tier.tier();
            // 人工层级只在自动层级一无所获时介入
            if label == Tier::OperatorGuided && !report.fields.is_empty() {
                debug!("已有部分字段，跳过 {}", label);
                continue;
            }

            let ctx = TierContext::new(driver, panel, &self.resources).wanting_avatar(report.fields.avatar.is_none());
            let status = match timeout(tier.timeout(self.tier_timeout), tier.extract(&ctx)).await {
                Ok(Ok(status)) => status,
                Ok(Err(e)) if e.is_browser_fault() => {
                    warn!("{} 运行中浏览器失去响应: {}", label, e);
                    report.fault = Some(e.to_string());
                    report.attempts.push(TierAttempt {
                        tier: label,
                        status: TierStatus::Failed(e.to_string()),
                    });
                    break;
                }
                Ok(Err(e)) => TierStatus::Failed(e.to_string()),
                Err(_) => TierStatus::TimedOut,
            };

            report.absorb(label, status, panel);
            if report.mismatch.is_some() {
                break;
            }
        }

        report
    }
}
