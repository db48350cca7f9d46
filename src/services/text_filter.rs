//! 文本清洗 - 业务能力层
//!
//! 剔除占位文本、号码回显和 OCR 渲染残留

use regex::Regex;

use crate::error::ConfigError;
use crate::models::{Identifier, TextFilterConfig};

pub struct TextFilter {
    placeholder_names: Vec<String>,
    placeholder_abouts: Vec<String>,
    min_name_chars: usize,
    ocr_strip: Vec<Regex>,
    avatar_markers: Vec<String>,
}

impl TextFilter {
    pub fn new(config: &TextFilterConfig) -> Result<Self, ConfigError> {
        let ocr_strip = config
            .ocr_strip_patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|source| ConfigError::InvalidPattern {
                    pattern: p.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            placeholder_names: lowercase_all(&config.placeholder_names),
            placeholder_abouts: lowercase_all(&config.placeholder_abouts),
            min_name_chars: config.min_name_chars,
            ocr_strip,
            avatar_markers: lowercase_all(&config.avatar_placeholder_markers),
        })
    }

    pub fn clean_name(&self, raw: &str, identifier: &Identifier) -> Option<String> {
        let name = collapse_whitespace(raw);
        if name.chars().count() < self.min_name_chars.max(1) {
            return None;
        }
        if self.placeholder_names.contains(&name.to_lowercase()) || identifier.is_echo_of(&name) {
            return None;
        }
        Some(name)
    }

    pub fn clean_about(&self, raw: &str, identifier: &Identifier) -> Option<String> {
        let about = raw.trim().to_string();
        if about.is_empty() {
            return None;
        }
        if self.placeholder_abouts.contains(&about.to_lowercase()) || identifier.is_echo_of(&about) {
            return None;
        }
        Some(about)
    }

    /// OCR 文本的后处理：逐行套用剔除规则，丢掉空行
    pub fn strip_ocr_artifacts(&self, raw: &str) -> String {
        raw.lines()
            .map(|line| {
                self.ocr_strip
                    .iter()
                    .fold(line.to_string(), |acc, re| re.replace_all(&acc, "").into_owned())
            })
            .map(|line| collapse_whitespace(&line))
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// 头像地址是否指向默认占位图
    pub fn is_placeholder_avatar(&self, src: &str) -> bool {
        let src = src.to_lowercase();
        self.avatar_markers.iter().any(|m| src.contains(m.as_str()))
    }
}

fn lowercase_all(items: &[String]) -> Vec<String> {
    items.iter().map(|s| s.trim().to_lowercase()).collect()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
