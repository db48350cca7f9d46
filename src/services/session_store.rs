//! 会话持久化 - 业务能力层
//!
//! 只负责读写会话文件，不接触浏览器

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{AppResult, SessionError};
use crate::models::Session;

pub struct SessionStore {
    path: PathBuf,
    max_idle: Duration,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>, max_idle: Duration) -> Self {
        Self {
            path: path.into(),
            max_idle,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取会话；文件不存在或内容损坏时返回 None
    pub async fn restore(&self) -> Option<Session> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("会话文件不存在: {}", self.path.display());
                return None;
            }
            Err(e) => {
                warn!("读取会话文件失败 {}: {}", self.path.display(), e);
                return None;
            }
        };
        match serde_json::from_str::<Session>(&content) {
            Ok(session) => {
                debug!("已读取会话 ({} 个 Cookie)", session.cookies.len());
                Some(session)
            }
            Err(e) => {
                warn!("会话文件内容无法解析，忽略: {}", e);
                None
            }
        }
    }

    /// 先写临时文件再重命名，写到一半崩溃也不会损坏已有会话
    pub async fn save(&self, session: &Session) -> AppResult<()> {
        let json = serde_json::to_vec_pretty(session).map_err(SessionError::Serialize)?;
        let write_failed = |source: std::io::Error| SessionError::WriteFailed {
            path: self.path.display().to_string(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let mut file = tokio::fs::File::create(&tmp).await.map_err(write_failed)?;
        file.write_all(&json).await.map_err(write_failed)?;
        file.sync_all().await.map_err(write_failed)?;
        drop(file);
        tokio::fs::rename(&tmp, &self.path).await.map_err(write_failed)?;

        info!("💾 会话已保存: {}", self.path.display());
        Ok(())
    }

    /// 距离上次确认可用已超过空闲上限，或 Cookie 推算的过期时间已到
    pub fn is_likely_expired(&self, session: &Session, now: DateTime<Utc>) -> bool {
        if session.age_since_use(now) > self.max_idle {
            return true;
        }
        session.expires_at.is_some_and(|at| at <= now)
    }

    /// 登录态失效或主动登出时删除会话文件
    pub async fn invalidate(&self) -> AppResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!("🗑️ 已删除失效会话: {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SessionError::WriteFailed {
                path: self.path.display().to_string(),
                source: e,
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StoredCookie;
    use std::collections::BTreeMap;

    fn store(dir: &tempfile::TempDir) -> SessionStore {
        SessionStore::new(dir.path().join("nested/session.json"), Duration::hours(72))
    }

    fn session() -> Session {
        let mut storage = BTreeMap::new();
        storage.insert("WABrowserId".to_string(), "\"abc\"".to_string());
        Session::capture(
            vec![StoredCookie {
                name: "wa_ul".to_string(),
                value: "token".to_string(),
                domain: ".web.whatsapp.com".to_string(),
                path: "/".to_string(),
                expires: None,
                http_only: true,
                secure: true,
            }],
            storage,
        )
    }

    #[tokio::test]
    async fn missing_file_restores_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(store(&dir).restore().await.is_none());
    }

    #[tokio::test]
    async fn save_then_restore_and_no_temp_file_left() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let saved = session();
        store.save(&saved).await.unwrap();

        assert_eq!(store.restore().await, Some(saved));
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn corrupted_file_is_treated_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        tokio::fs::create_dir_all(store.path().parent().unwrap()).await.unwrap();
        tokio::fs::write(store.path(), b"{ not json").await.unwrap();
        assert!(store.restore().await.is_none());
    }

    #[tokio::test]
    async fn invalidate_removes_file_and_tolerates_absence() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store.save(&session()).await.unwrap();
        store.invalidate().await.unwrap();
        assert!(!store.path().exists());
        store.invalidate().await.unwrap();
    }

    #[test]
    fn expiry_heuristic_uses_idle_age_and_cookie_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let now = Utc::now();

        let fresh = session();
        assert!(!store.is_likely_expired(&fresh, now));

        let mut idle = session();
        idle.last_used_at = now - Duration::hours(100);
        assert!(store.is_likely_expired(&idle, now));

        let mut expired = session();
        expired.expires_at = Some(now - Duration::minutes(1));
        assert!(store.is_likely_expired(&expired, now));
    }
}
