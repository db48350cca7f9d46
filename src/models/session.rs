//! 会话快照

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// 持久化的 Cookie（与浏览器实现无关）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    /// 过期时间（Unix 秒），会话 Cookie 为 None
    #[serde(default)]
    pub expires: Option<f64>,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
}

fn default_path() -> String {
    "/".to_string()
}

/// 登录态快照：Cookie + localStorage + 时间戳
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub cookies: Vec<StoredCookie>,
    #[serde(default)]
    pub local_storage: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    /// 最近一次确认登录有效的时间
    pub last_used_at: DateTime<Utc>,
    /// 根据 Cookie 推算的过期时间
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// 根据浏览器当前状态创建快照
    pub fn capture(cookies: Vec<StoredCookie>, local_storage: BTreeMap<String, String>) -> Self {
        let now = Utc::now();
        let expires_at = estimate_expiry(&cookies);
        Self {
            cookies,
            local_storage,
            created_at: now,
            last_used_at: now,
            expires_at,
        }
    }

    /// 在已有会话基础上刷新内容，保留创建时间
    pub fn refreshed(&self, cookies: Vec<StoredCookie>, local_storage: BTreeMap<String, String>) -> Self {
        let mut next = Self::capture(cookies, local_storage);
        next.created_at = self.created_at;
        next
    }

    pub fn age_since_use(&self, now: DateTime<Utc>) -> Duration {
        now - self.last_used_at
    }
}

/// 取持久 Cookie 中最早的过期时间作为会话过期估计
fn estimate_expiry(cookies: &[StoredCookie]) -> Option<DateTime<Utc>> {
    cookies
        .iter()
        .filter_map(|c| c.expires)
        .filter(|secs| *secs > 0.0)
        .map(|secs| secs as i64)
        .min()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
}

/// 登录挑战（二维码图片），由调用方展示给操作员扫描
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginChallenge {
    pub png: Vec<u8>,
}

/// `init_session` 的返回值
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInit {
    pub already_authenticated: bool,
    pub login_challenge: Option<LoginChallenge>,
}
