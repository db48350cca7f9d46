//! 联系人号码
//!
//! 号码在进入导航层之前必须经过校验和规范化，之后只以纯数字形式流转。

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// 规范化后的联系人号码（国家代码 + 号码，只含数字）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    /// 纯数字形式
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 运行时模型中使用的联系人 ID
    pub fn chat_id(&self) -> String {
        format!("{}@c.us", self.0)
    }

    /// 判断页面上显示的号码文本（可能带空格、括号、加号）是否指向本号码
    pub fn matches_displayed(&self, displayed: &str) -> bool {
        digits_of(displayed) == self.0
    }

    /// 文本去掉格式后是否就是号码本身
    pub fn is_echo_of(&self, text: &str) -> bool {
        let digits = digits_of(text);
        !digits.is_empty() && digits == self.0 && text.chars().all(is_phone_char)
    }

    /// 调用方保证已经是纯数字
    #[cfg(test)]
    pub(crate) fn from_digits(digits: impl Into<String>) -> Self {
        Self(digits.into())
    }
}

impl Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "+{}", self.0)
    }
}

/// 提取文本中的全部数字
pub fn digits_of(text: &str) -> String {
    text.chars().filter(|c| c.is_ascii_digit()).collect()
}

fn is_phone_char(c: char) -> bool {
    c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '(' | ')' | '.' | '\u{a0}')
}

/// 号码校验器（外部协作者）
pub trait IdentifierValidator: Send + Sync {
    fn normalize(&self, raw: &str) -> Result<Identifier, ValidationError>;
}

/// 按 E.164 规则校验号码
#[derive(Debug, Clone)]
pub struct E164Validator {
    pub min_digits: usize,
    pub max_digits: usize,
}

impl Default for E164Validator {
    fn default() -> Self {
        Self {
            min_digits: 8,
            max_digits: 15,
        }
    }
}

impl IdentifierValidator for E164Validator {
    fn normalize(&self, raw: &str) -> Result<Identifier, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::Empty);
        }

        let body = trimmed.strip_prefix('+').unwrap_or(trimmed);
        if !body.chars().all(|c| is_phone_char(c) && c != '+') {
            return Err(ValidationError::InvalidCharacters(raw.to_string()));
        }

        let digits = digits_of(body);
        if digits.len() < self.min_digits || digits.len() > self.max_digits {
            return Err(ValidationError::BadLength {
                raw: raw.to_string(),
                digits: digits.len(),
                min: self.min_digits,
                max: self.max_digits,
            });
        }
        if digits.starts_with('0') {
            return Err(ValidationError::MissingCountryCode(raw.to_string()));
        }

        Ok(Identifier(digits))
    }
}
