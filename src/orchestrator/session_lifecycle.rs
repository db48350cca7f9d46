//! 会话生命周期 - 编排层
//!
//! ## 职责
//!
//! 1. **确认登录态**：浏览器用户目录里的登录态仍有效时直接复用
//! 2. **恢复快照**：写回 Cookie 和 localStorage 后重新检查
//! 3. **登录挑战**：都失效时取出二维码交给调用方展示
//! 4. **保存快照**：登录成功、会话结束时写入 `SessionStore`

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::error::AppResult;
use crate::infrastructure::{eval_as, scripts, ElementBox, PageDriver};
use crate::models::{LoginChallenge, SelectorSet, Session, SessionInit};
use crate::services::avatar_store::decode_data_uri;
use crate::services::SessionStore;

/// 登录轮询间隔
const LOGIN_POLL: Duration = Duration::from_secs(2);
/// 二维码过期前刷新页面的间隔
const CHALLENGE_REFRESH: Duration = Duration::from_secs(60);
/// 存活探测的时限
const LIVENESS_TIMEOUT: Duration = Duration::from_secs(5);

/// 页面当前的登录状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageState {
    Authenticated,
    LoginRequired,
    Unknown,
}

#[derive(Debug, Default, Deserialize)]
struct SessionState {
    #[serde(default)]
    authenticated: bool,
    #[serde(default)]
    login: bool,
}

pub struct SessionLifecycle {
    store: SessionStore,
    selectors: SelectorSet,
    web_url: String,
    settle_timeout: Duration,
    poll_interval: Duration,
    current: Option<Session>,
}

impl SessionLifecycle {
    pub fn new(
        store: SessionStore,
        selectors: SelectorSet,
        web_url: impl Into<String>,
        settle_timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            selectors,
            web_url: web_url.into(),
            settle_timeout,
            poll_interval,
            current: None,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// 打开客户端首页，依次尝试用户目录登录态和会话快照，都不行时返回二维码
    pub async fn establish(&mut self, driver: &dyn PageDriver) -> AppResult<SessionInit> {
        driver.goto(&self.web_url).await?;
        if self.settle(driver).await? == PageState::Authenticated {
            info!("✓ 浏览器用户目录中的登录态有效");
            self.persist(driver).await?;
            return Ok(authenticated());
        }

        if let Some(session) = self.store.restore().await {
            if self.store.is_likely_expired(&session, Utc::now()) {
                info!("会话快照可能已过期，跳过恢复，直接重新登录");
                self.discard().await;
            } else {
                info!("🔄 正在恢复会话快照 ({} 个 Cookie)", session.cookies.len());
                self.apply(driver, &session).await?;
                if self.settle(driver).await? == PageState::Authenticated {
                    info!("✓ 会话快照恢复成功");
                    self.current = Some(session);
                    self.persist(driver).await?;
                    return Ok(authenticated());
                }
                warn!("⚠️ 会话快照已失效");
                self.discard().await;
            }
        }

        let challenge = self.capture_challenge(driver).await?;
        match &challenge {
            Some(c) => info!("📱 需要扫码登录 (二维码 {} 字节)", c.png.len()),
            None => warn!("⚠️ 需要登录，但未能获取二维码"),
        }
        Ok(SessionInit {
            already_authenticated: false,
            login_challenge: challenge,
        })
    }

    /// 等待操作员扫码；定期刷新页面避免二维码过期，成功后立即保存会话
    pub async fn wait_for_login(&mut self, driver: &dyn PageDriver, limit: Duration) -> AppResult<bool> {
        let deadline = Instant::now() + limit;
        let mut last_refresh = Instant::now();
        loop {
            if self.read_state(driver).await? == PageState::Authenticated {
                info!("✅ 登录成功");
                self.persist(driver).await?;
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                warn!("⏰ 等待登录超时 ({:?})", limit);
                return Ok(false);
            }
            if now.duration_since(last_refresh) >= CHALLENGE_REFRESH {
                info!("🔄 刷新页面以更新二维码");
                driver.reload().await?;
                last_refresh = now;
            }
            sleep(LOGIN_POLL.min(deadline - now)).await;
        }
    }

    /// 读取浏览器当前的 Cookie 和 localStorage 写入会话文件
    pub async fn persist(&mut self, driver: &dyn PageDriver) -> AppResult<()> {
        let cookies = driver.cookies().await?;
        let storage = eval_as::<Option<BTreeMap<String, String>>>(driver, &scripts::storage_export())
            .await?
            .unwrap_or_default();
        let session = match &self.current {
            Some(previous) => previous.refreshed(cookies, storage),
            None => Session::capture(cookies, storage),
        };
        self.store.save(&session).await?;
        self.current = Some(session);
        Ok(())
    }

    async fn apply(&self, driver: &dyn PageDriver, session: &Session) -> AppResult<()> {
        driver.set_cookies(&session.cookies).await?;
        driver.goto(&self.web_url).await?;
        if !session.local_storage.is_empty() {
            let written = eval_as::<Option<usize>>(driver, &scripts::storage_import(&session.local_storage)).await?;
            debug!("已写回 {:?} 项 localStorage", written);
        }
        driver.reload().await
    }

    async fn discard(&mut self) {
        self.current = None;
        if let Err(e) = self.store.invalidate().await {
            warn!("删除会话文件失败: {}", e);
        }
    }

    async fn read_state(&self, driver: &dyn PageDriver) -> AppResult<PageState> {
        let state = eval_as::<Option<SessionState>>(driver, &scripts::session_state(&self.selectors))
            .await?
            .unwrap_or_default();
        Ok(if state.authenticated {
            PageState::Authenticated
        } else if state.login {
            PageState::LoginRequired
        } else {
            PageState::Unknown
        })
    }

    /// 页面加载后等到出现明确的登录状态
    async fn settle(&self, driver: &dyn PageDriver) -> AppResult<PageState> {
        let deadline = Instant::now() + self.settle_timeout;
        loop {
            let state = self.read_state(driver).await?;
            if state != PageState::Unknown || Instant::now() >= deadline {
                return Ok(state);
            }
            sleep(self.poll_interval).await;
        }
    }

    /// 优先读取 canvas 图像，失败时截取二维码元素
    async fn capture_challenge(&self, driver: &dyn PageDriver) -> AppResult<Option<LoginChallenge>> {
        let data_url = eval_as::<Option<String>>(driver, &scripts::login_challenge(&self.selectors)).await?;
        if let Some(url) = data_url {
            match decode_data_uri(&url) {
                Ok(png) if !png.is_empty() => return Ok(Some(LoginChallenge { png })),
                Ok(_) => debug!("二维码 canvas 为空"),
                Err(e) => debug!("二维码 canvas 解码失败: {}", e),
            }
        }

        for selector in &self.selectors.login_challenge {
            let boxes = eval_as::<Option<Vec<ElementBox>>>(driver, &scripts::element_boxes(selector))
                .await?
                .unwrap_or_default();
            if let Some(target) = boxes.into_iter().find(ElementBox::is_visible) {
                let png = driver.screenshot(Some(target)).await?;
                return Ok(Some(LoginChallenge { png }));
            }
        }
        Ok(None)
    }
}

fn authenticated() -> SessionInit {
    SessionInit {
        already_authenticated: true,
        login_challenge: None,
    }
}

/// 浏览器是否还能在时限内执行脚本
pub async fn is_alive(driver: &dyn PageDriver) -> bool {
    matches!(
        timeout(LIVENESS_TIMEOUT, driver.eval(&scripts::liveness())).await,
        Ok(Ok(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::fake_page::FakePage;
    use crate::infrastructure::scripts::markers;
    use crate::models::StoredCookie;
    use crate::services::avatar_store::png_bytes;
    use base64::Engine as _;
    use serde_json::json;

    fn lifecycle(dir: &std::path::Path) -> SessionLifecycle {
        SessionLifecycle::new(
            SessionStore::new(dir.join("session.json"), chrono::Duration::hours(72)),
            SelectorSet::default(),
            "https://web.whatsapp.com",
            Duration::from_secs(15),
            Duration::from_millis(500),
        )
    }

    fn cookie() -> StoredCookie {
        StoredCookie {
            name: "wa_ul".to_string(),
            value: "token".to_string(),
            domain: ".web.whatsapp.com".to_string(),
            path: "/".to_string(),
            expires: None,
            http_only: true,
            secure: true,
        }
    }

    async fn stored_session(dir: &std::path::Path, last_used_hours_ago: i64) -> Session {
        let mut session = Session::capture(
            vec![cookie()],
            BTreeMap::from([("WASecretBundle".to_string(), "abc".to_string())]),
        );
        session.last_used_at = Utc::now() - chrono::Duration::hours(last_used_hours_ago);
        lifecycle(dir).store().save(&session).await.unwrap();
        session
    }

    #[tokio::test(start_paused = true)]
    async fn profile_login_is_reused_and_saved() {
        let dir = tempfile::tempdir().unwrap();
        let mut lifecycle = lifecycle(dir.path());
        let page = FakePage::new();
        page.on(markers::SESSION_STATE, json!({ "authenticated": true }))
            .on(markers::STORAGE_EXPORT, json!({ "last-wid": "1@c.us" }));

        let init = lifecycle.establish(&page).await.unwrap();

        assert!(init.already_authenticated);
        assert!(init.login_challenge.is_none());
        let saved = lifecycle.store().restore().await.unwrap();
        assert_eq!(saved.local_storage.get("last-wid").map(String::as_str), Some("1@c.us"));
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_is_applied_when_profile_is_logged_out() {
        let dir = tempfile::tempdir().unwrap();
        let session = stored_session(dir.path(), 1).await;
        let mut lifecycle = lifecycle(dir.path());
        let page = FakePage::new();
        page.on_seq(
            markers::SESSION_STATE,
            None,
            vec![json!({ "login": true }), json!({ "authenticated": true })],
        );

        let init = lifecycle.establish(&page).await.unwrap();

        assert!(init.already_authenticated);
        assert_eq!(page.stored_cookies(), session.cookies);
        assert_eq!(page.eval_count(markers::STORAGE_IMPORT), 1);
        assert_eq!(page.reloads(), 1);
        let saved = lifecycle.store().restore().await.unwrap();
        assert_eq!(saved.created_at, session.created_at);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_snapshot_is_deleted_and_qr_returned() {
        let dir = tempfile::tempdir().unwrap();
        stored_session(dir.path(), 1).await;
        let mut lifecycle = lifecycle(dir.path());
        let png = png_bytes(4, 4, |_, _| [0, 0, 0]);
        let page = FakePage::new();
        page.on(markers::SESSION_STATE, json!({ "login": true })).on(
            markers::LOGIN_CHALLENGE,
            json!(format!(
                "data:image/png;base64,{}",
                base64::engine::general_purpose::STANDARD.encode(&png)
            )),
        );

        let init = lifecycle.establish(&page).await.unwrap();

        assert!(!init.already_authenticated);
        assert_eq!(init.login_challenge.map(|c| c.png), Some(png));
        assert!(!lifecycle.store().path().exists());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_snapshot_is_not_applied() {
        let dir = tempfile::tempdir().unwrap();
        stored_session(dir.path(), 100).await;
        let mut lifecycle = lifecycle(dir.path());
        let page = FakePage::new();
        page.on(markers::SESSION_STATE, json!({ "login": true }));

        let init = lifecycle.establish(&page).await.unwrap();

        assert!(!init.already_authenticated);
        assert!(page.stored_cookies().is_empty());
        assert!(!lifecycle.store().path().exists());
    }

    #[tokio::test(start_paused = true)]
    async fn qr_falls_back_to_element_screenshot() {
        let dir = tempfile::tempdir().unwrap();
        let mut lifecycle = lifecycle(dir.path());
        let selectors = SelectorSet::default();
        let page = FakePage::new();
        page.on(markers::SESSION_STATE, json!({ "login": true }))
            .with_boxes(
                &selectors.login_challenge[0],
                vec![ElementBox { x: 500.0, y: 200.0, width: 264.0, height: 264.0 }],
            )
            .with_screenshot(vec![1, 2, 3]);

        let init = lifecycle.establish(&page).await.unwrap();
        assert_eq!(init.login_challenge.map(|c| c.png), Some(vec![1, 2, 3]));
    }

    #[tokio::test(start_paused = true)]
    async fn login_wait_refreshes_the_challenge_every_minute() {
        let dir = tempfile::tempdir().unwrap();
        let mut lifecycle = lifecycle(dir.path());
        let page = FakePage::new();
        let mut responses = vec![json!({ "login": true }); 35];
        responses.push(json!({ "authenticated": true }));
        page.on_seq(markers::SESSION_STATE, None, responses);

        let logged_in = lifecycle.wait_for_login(&page, Duration::from_secs(300)).await.unwrap();

        assert!(logged_in);
        assert_eq!(page.reloads(), 1);
        assert!(lifecycle.store().path().exists());
    }

    #[tokio::test(start_paused = true)]
    async fn login_wait_gives_up_at_the_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let mut lifecycle = lifecycle(dir.path());
        let page = FakePage::new();
        page.on(markers::SESSION_STATE, json!({ "login": true }));

        let start = Instant::now();
        let logged_in = lifecycle.wait_for_login(&page, Duration::from_secs(10)).await.unwrap();

        assert!(!logged_in);
        assert!(start.elapsed() >= Duration::from_secs(10));
        assert!(!lifecycle.store().path().exists());
    }

    #[tokio::test]
    async fn unresponsive_page_is_not_alive() {
        let page = FakePage::new();
        assert!(is_alive(&page).await);
        page.set_unresponsive(true);
        assert!(!is_alive(&page).await);
    }
}
