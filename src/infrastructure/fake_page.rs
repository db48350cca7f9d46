//! 测试用的假页面
//!
//! 按脚本标记（以及可选的当前地址片段）返回预设的 JSON，
//! 记录导航和点击，方便在没有浏览器的情况下测试各层逻辑。

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::error::CdpError;
use serde_json::{json, Value as JsonValue};

use crate::error::{AppError, AppResult, BrowserError};
use crate::infrastructure::page_driver::{ElementBox, PageDriver};
use crate::infrastructure::scripts::markers;
use crate::models::StoredCookie;

struct Rule {
    marker: String,
    url_contains: Option<String>,
    responses: Vec<JsonValue>,
    next: usize,
}

#[derive(Default)]
struct FakeState {
    url: String,
    rules: Vec<Rule>,
    clickable: HashSet<String>,
    boxes: HashMap<String, Vec<ElementBox>>,
    clicked_since_goto: bool,
    gotos: Vec<String>,
    clicks: Vec<String>,
    evals: Vec<String>,
    mouse_moves: usize,
    reloads: usize,
    cookies: Vec<StoredCookie>,
    screenshot: Vec<u8>,
    hang_on_goto: Option<String>,
    unresponsive: bool,
    disconnected: bool,
    closed: bool,
}

#[derive(Default)]
pub(crate) struct FakePage {
    state: Mutex<FakeState>,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        let mut guard = self.state.lock().unwrap();
        f(&mut guard)
    }

    /// 任何地址下，含有该标记的脚本都返回 `response`
    pub fn on(&self, marker: &str, response: JsonValue) -> &Self {
        self.on_seq(marker, None, vec![response])
    }

    /// 仅当当前地址包含 `url_fragment` 时生效
    pub fn on_url(&self, marker: &str, url_fragment: &str, response: JsonValue) -> &Self {
        self.on_seq(marker, Some(url_fragment), vec![response])
    }

    /// 依次返回 `responses`，用完后重复最后一个
    pub fn on_seq(&self, marker: &str, url_fragment: Option<&str>, responses: Vec<JsonValue>) -> &Self {
        self.with_state(|s| {
            s.rules.push(Rule {
                marker: marker.to_string(),
                url_contains: url_fragment.map(str::to_string),
                responses,
                next: 0,
            })
        });
        self
    }

    pub fn clickable(&self, selector: &str) -> &Self {
        self.with_state(|s| s.clickable.insert(selector.to_string()));
        self
    }

    pub fn with_boxes(&self, selector: &str, boxes: Vec<ElementBox>) -> &Self {
        self.with_state(|s| s.boxes.insert(selector.to_string(), boxes));
        self
    }

    pub fn with_screenshot(&self, png: Vec<u8>) -> &Self {
        self.with_state(|s| s.screenshot = png);
        self
    }

    /// 导航到包含该片段的地址时永不返回
    pub fn hang_on_goto(&self, url_fragment: &str) -> &Self {
        self.with_state(|s| s.hang_on_goto = Some(url_fragment.to_string()));
        self
    }

    pub fn set_unresponsive(&self, unresponsive: bool) {
        self.with_state(|s| s.unresponsive = unresponsive);
    }

    /// 之后每次调用都返回 CDP 请求超时，和调试连接断开时一样
    pub fn set_disconnected(&self, disconnected: bool) {
        self.with_state(|s| s.disconnected = disconnected);
    }

    pub fn gotos(&self) -> Vec<String> {
        self.with_state(|s| s.gotos.clone())
    }

    pub fn clicks(&self) -> Vec<String> {
        self.with_state(|s| s.clicks.clone())
    }

    pub fn eval_count(&self, marker: &str) -> usize {
        self.with_state(|s| s.evals.iter().filter(|e| e.starts_with(marker)).count())
    }

    pub fn mouse_moves(&self) -> usize {
        self.with_state(|s| s.mouse_moves)
    }

    pub fn reloads(&self) -> usize {
        self.with_state(|s| s.reloads)
    }

    pub fn stored_cookies(&self) -> Vec<StoredCookie> {
        self.with_state(|s| s.cookies.clone())
    }

    pub fn is_closed(&self) -> bool {
        self.with_state(|s| s.closed)
    }

    fn check_alive(&self) -> AppResult<()> {
        if self.with_state(|s| s.unresponsive) {
            return Err(AppError::Browser(BrowserError::Unresponsive));
        }
        if self.with_state(|s| s.disconnected) {
            return Err(AppError::from(CdpError::Timeout));
        }
        Ok(())
    }
}

fn answer(state: &mut FakeState, script: &str) -> JsonValue {
    let url = state.url.clone();
    let rule = state.rules.iter_mut().rev().find(|r| {
        script.starts_with(&r.marker)
            && r.url_contains.as_deref().map_or(true, |u| url.contains(u))
    });
    if let Some(rule) = rule {
        let idx = rule.next.min(rule.responses.len().saturating_sub(1));
        rule.next += 1;
        return rule.responses.get(idx).cloned().unwrap_or(JsonValue::Null);
    }
    if script.starts_with(markers::PANEL_OPEN) {
        return json!(state.clicked_since_goto);
    }
    if script.starts_with(markers::DISPATCH_CLICK) {
        return json!("not_found");
    }
    if script.starts_with(markers::ELEMENT_BOXES) {
        let hit = state
            .boxes
            .iter()
            .find(|(sel, _)| script.contains(&json!(sel).to_string()));
        return hit.map(|(_, b)| json!(b)).unwrap_or_else(|| json!([]));
    }
    if script.starts_with(markers::LIVENESS) {
        return json!(1);
    }
    JsonValue::Null
}

#[async_trait]
impl PageDriver for FakePage {
    async fn goto(&self, url: &str) -> AppResult<()> {
        self.check_alive()?;
        let hang = self.with_state(|s| {
            s.gotos.push(url.to_string());
            s.url = url.to_string();
            s.clicked_since_goto = false;
            s.hang_on_goto.as_deref().map_or(false, |f| url.contains(f))
        });
        if hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Ok(())
    }

    async fn reload(&self) -> AppResult<()> {
        self.check_alive()?;
        self.with_state(|s| s.reloads += 1);
        Ok(())
    }

    async fn eval(&self, script: &str) -> AppResult<JsonValue> {
        self.check_alive()?;
        Ok(self.with_state(|s| {
            s.evals.push(script.trim_start().to_string());
            let value = answer(s, script.trim_start());
            if script.trim_start().starts_with(markers::DISPATCH_CLICK) && value == json!("clicked") {
                s.clicked_since_goto = true;
            }
            value
        }))
    }

    async fn click(&self, selector: &str) -> AppResult<bool> {
        self.check_alive()?;
        Ok(self.with_state(|s| {
            if s.clickable.contains(selector) {
                s.clicks.push(selector.to_string());
                s.clicked_since_goto = true;
                true
            } else {
                false
            }
        }))
    }

    async fn click_at(&self, x: f64, y: f64) -> AppResult<()> {
        self.check_alive()?;
        self.with_state(|s| {
            s.clicks.push(format!("@{x},{y}"));
            s.clicked_since_goto = true;
        });
        Ok(())
    }

    async fn move_mouse(&self, _x: f64, _y: f64) -> AppResult<()> {
        self.check_alive()?;
        self.with_state(|s| s.mouse_moves += 1);
        Ok(())
    }

    async fn screenshot(&self, _clip: Option<ElementBox>) -> AppResult<Vec<u8>> {
        self.check_alive()?;
        Ok(self.with_state(|s| s.screenshot.clone()))
    }

    async fn cookies(&self) -> AppResult<Vec<StoredCookie>> {
        self.check_alive()?;
        Ok(self.with_state(|s| s.cookies.clone()))
    }

    async fn set_cookies(&self, cookies: &[StoredCookie]) -> AppResult<()> {
        self.check_alive()?;
        self.with_state(|s| s.cookies = cookies.to_vec());
        Ok(())
    }

    async fn close(&self) -> AppResult<()> {
        self.with_state(|s| s.closed = true);
        Ok(())
    }
}
