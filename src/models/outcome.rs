//! 提取结果与分类

use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::identifier::Identifier;
use crate::models::request::ExtractionRequest;

/// 提取层级，按优先级 / 可信度从高到低排列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// 结构化元素读取
    StructuredElement,
    /// 截图文字识别
    RenderedText,
    /// 运行时状态读取
    RuntimeState,
    /// 人工引导采集
    OperatorGuided,
}

impl Tier {
    pub fn label(self) -> &'static str {
        match self {
            Tier::StructuredElement => "tier1-结构化",
            Tier::RenderedText => "tier2-OCR",
            Tier::RuntimeState => "tier3-运行时",
            Tier::OperatorGuided => "tier4-人工",
        }
    }
}

impl Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 最终结果分类（封闭集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionOutcome {
    Success,
    PartialSuccess,
    NotRegistered,
    Blocked,
    VerificationMismatch,
    NavigationTimeout,
    ExtractionExhausted,
    TransientError,
}

impl ExtractionOutcome {
    /// 永久性结果，重试没有意义
    pub fn is_permanent(self) -> bool {
        matches!(self, Self::NotRegistered | Self::VerificationMismatch)
    }

    /// 调用方稍后可以重新尝试
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::NavigationTimeout | Self::TransientError)
    }

    /// 是否带有经过核验的资料字段
    pub fn carries_fields(self) -> bool {
        matches!(self, Self::Success | Self::PartialSuccess)
    }
}

impl Display for ExtractionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::PartialSuccess => "partial_success",
            Self::NotRegistered => "not_registered",
            Self::Blocked => "blocked",
            Self::VerificationMismatch => "verification_mismatch",
            Self::NavigationTimeout => "navigation_timeout",
            Self::ExtractionExhausted => "extraction_exhausted",
            Self::TransientError => "transient_error",
        };
        f.write_str(s)
    }
}

/// 每个字段由哪个层级提供
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldProvenance {
    pub name: Option<Tier>,
    pub about: Option<Tier>,
    pub avatar: Option<Tier>,
}

impl FieldProvenance {
    /// 参与提供字段的层级（去重，按优先级排序）
    pub fn contributing_tiers(&self) -> Vec<Tier> {
        let mut tiers: Vec<Tier> = [self.name, self.about, self.avatar].into_iter().flatten().collect();
        tiers.sort();
        tiers.dedup();
        tiers
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.about.is_none() && self.avatar.is_none()
    }
}

/// 单个号码的最终结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub identifier: Identifier,
    pub correlation_tag: Option<String>,
    pub display_name: Option<String>,
    pub about: Option<String>,
    pub avatar_path: Option<PathBuf>,
    /// 号码是否在服务上注册（面板已核验打开）
    pub available: bool,
    pub outcome: ExtractionOutcome,
    pub provenance: FieldProvenance,
    pub diagnostic: Option<String>,
    pub extracted_at: DateTime<Utc>,
}

/// 分类器的纯输出，不含时间戳等运行时信息
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub outcome: ExtractionOutcome,
    pub display_name: Option<String>,
    pub about: Option<String>,
    pub avatar_path: Option<PathBuf>,
    pub available: bool,
    pub provenance: FieldProvenance,
    pub diagnostic: Option<String>,
}

impl ExtractionResult {
    pub fn from_classification(
        request: &ExtractionRequest,
        classification: Classification,
        extracted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            identifier: request.identifier().clone(),
            correlation_tag: request.correlation_tag().map(str::to_string),
            display_name: classification.display_name,
            about: classification.about,
            avatar_path: classification.avatar_path,
            available: classification.available,
            outcome: classification.outcome,
            provenance: classification.provenance,
            diagnostic: classification.diagnostic,
            extracted_at,
        }
    }
}

/// 批量提取报告
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// 与输入顺序一致
    pub results: Vec<ExtractionResult>,
    /// 每个层级参与提供字段的号码数
    pub tier_stats: BTreeMap<Tier, usize>,
    /// 每种结果的数量
    pub outcome_counts: BTreeMap<ExtractionOutcome, usize>,
}

impl BatchReport {
    pub fn push(&mut self, result: ExtractionResult) {
        for tier in result.provenance.contributing_tiers() {
            *self.tier_stats.entry(tier).or_default() += 1;
        }
        *self.outcome_counts.entry(result.outcome).or_default() += 1;
        self.results.push(result);
    }

    pub fn count(&self, outcome: ExtractionOutcome) -> usize {
        self.outcome_counts.get(&outcome).copied().unwrap_or(0)
    }
}
