//! 调优参数：选择器、OCR 区域、文本过滤规则

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::models::selectors::SelectorSet;

/// 面板高度上的一个比例区间
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub top: f64,
    pub bottom: f64,
}

/// 面板上的一个比例矩形
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Band {
    /// 横向铺满的矩形
    pub fn full_width(self) -> Region {
        Region {
            left: 0.0,
            top: self.top,
            right: 1.0,
            bottom: self.bottom,
        }
    }
}

impl Region {
    fn check(&self, field: &str) -> Result<(), ConfigError> {
        let in_unit = |v: f64| (0.0..=1.0).contains(&v);
        if !(in_unit(self.left) && in_unit(self.top) && in_unit(self.right) && in_unit(self.bottom)) {
            return Err(invalid(field, "比例必须在 0..=1 之间"));
        }
        if self.left >= self.right || self.top >= self.bottom {
            return Err(invalid(field, "区域上下或左右颠倒"));
        }
        Ok(())
    }
}

/// OCR 截图区域（相对面板尺寸的比例）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrRegions {
    pub name_band: Band,
    pub about_band: Band,
    pub avatar: Region,
    /// 头像区域灰度标准差低于此值时视为空白占位图
    pub avatar_min_stddev: f64,
}

impl Default for OcrRegions {
    fn default() -> Self {
        Self {
            name_band: Band { top: 0.15, bottom: 0.30 },
            about_band: Band { top: 0.35, bottom: 0.55 },
            avatar: Region {
                left: 0.30,
                top: 0.02,
                right: 0.70,
                bottom: 0.15,
            },
            avatar_min_stddev: 12.0,
        }
    }
}

/// 文本清洗规则
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextFilterConfig {
    /// 不是真实名称的占位文本（小写）
    pub placeholder_names: Vec<String>,
    /// 不是真实签名的标签文本（小写）
    pub placeholder_abouts: Vec<String>,
    /// 名称的最少字符数
    pub min_name_chars: usize,
    /// OCR 结果上要剔除的渲染残留（正则）
    pub ocr_strip_patterns: Vec<String>,
    /// 头像地址中出现即视为默认占位图的片段
    pub avatar_placeholder_markers: Vec<String>,
}

impl Default for TextFilterConfig {
    fn default() -> Self {
        Self {
            placeholder_names: ["click here for contact info", "click here", "tap here", "loading", "contact info"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            placeholder_abouts: ["about", "bio", "about and phone number"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            min_name_chars: 2,
            ocr_strip_patterns: vec![
                r"[|_~=«»]{2,}".to_string(),
                r"^[^\p{L}\p{N}]+".to_string(),
                r"[^\p{L}\p{N}.!?)]+$".to_string(),
            ],
            avatar_placeholder_markers: ["default-user", "blank", "placeholder"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// 调优文件的完整内容
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    pub selectors: SelectorSet,
    pub ocr: OcrRegions,
    pub text_filter: TextFilterConfig,
}

impl Tuning {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ocr.name_band.full_width().check("ocr.name_band")?;
        self.ocr.about_band.full_width().check("ocr.about_band")?;
        self.ocr.avatar.check("ocr.avatar")?;
        for pattern in &self.text_filter.ocr_strip_patterns {
            regex::Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
