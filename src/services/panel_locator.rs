//! 面板定位服务 - 业务能力层
//!
//! 按策略顺序打开联系人详情面板，并强制核验面板上的号码就是请求的号码。
//! 详情面板只能通过界面交互打开，界面残留或竞争会让别人的面板出现在眼前，
//! 核验是防止张冠李戴的唯一关口。

use std::fmt::{self, Display};
use std::time::Duration;

use thiserror::Error;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, error, info, warn};

use crate::error::AppResult;
use crate::infrastructure::{eval_as, scripts, ElementBox, PageDriver};
use crate::models::{Identifier, SelectorSet};
use crate::services::debug_capture::DebugCapture;

/// 打开面板的交互策略，按尝试顺序排列
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenStrategy {
    /// 点击具名的顶部区域
    NamedHeader,
    /// 点击 role=button 的顶部控件
    RoleHeader,
    /// 点击顶部头像缩略图
    AvatarThumbnail,
    /// 脚本直接派发 click，绕过命中测试
    ScriptDispatch,
    /// 点击布局右侧任意 header
    LayoutHeader,
    /// 操作员手动打开（不在自动顺序里）
    OperatorNavigated,
}

impl OpenStrategy {
    pub const ORDER: [OpenStrategy; 5] = [
        OpenStrategy::NamedHeader,
        OpenStrategy::RoleHeader,
        OpenStrategy::AvatarThumbnail,
        OpenStrategy::ScriptDispatch,
        OpenStrategy::LayoutHeader,
    ];
}

impl Display for OpenStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OpenStrategy::NamedHeader => "具名顶部区域",
            OpenStrategy::RoleHeader => "顶部按钮",
            OpenStrategy::AvatarThumbnail => "头像缩略图",
            OpenStrategy::ScriptDispatch => "脚本点击",
            OpenStrategy::LayoutHeader => "布局右侧 header",
            OpenStrategy::OperatorNavigated => "人工打开",
        };
        f.write_str(s)
    }
}

/// 已打开并核验通过的面板
///
/// 只能由本模块构造，持有它就意味着面板号码与请求一致。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelHandle {
    identifier: Identifier,
    strategy: OpenStrategy,
}

impl PanelHandle {
    pub(crate) fn verified(identifier: Identifier, strategy: OpenStrategy) -> Self {
        Self { identifier, strategy }
    }

    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    pub fn strategy(&self) -> OpenStrategy {
        self.strategy
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocatorError {
    #[error("所有打开面板的策略都失败")]
    OpenFailed,
    #[error("面板号码与请求不符: 请求 {requested}, 面板显示 {observed:?}")]
    VerificationMismatch {
        requested: Identifier,
        observed: Option<String>,
    },
}

/// 面板定位参数
#[derive(Debug, Clone, Copy)]
pub struct LocatorTiming {
    pub strategy_timeout: Duration,
    pub panel_wait: Duration,
    pub poll_interval: Duration,
    pub layout_split_x: f64,
}

pub struct PanelLocator {
    timing: LocatorTiming,
    debug_capture: Option<DebugCapture>,
}

impl PanelLocator {
    pub fn new(timing: LocatorTiming, debug_capture: Option<DebugCapture>) -> Self {
        Self {
            timing,
            debug_capture,
        }
    }

    /// 打开面板并核验号码
    ///
    /// 外层 `Err` 只表示浏览器故障；打不开或号码不符以 `LocatorError` 返回。
    pub async fn open_and_verify(
        &self,
        driver: &dyn PageDriver,
        selectors: &SelectorSet,
        identifier: &Identifier,
    ) -> AppResult<Result<PanelHandle, LocatorError>> {
        let Some(strategy) = self.open(driver, selectors).await? else {
            warn!("面板打开失败，已尝试全部 {} 种策略", OpenStrategy::ORDER.len());
            if let Some(capture) = &self.debug_capture {
                capture
                    .capture_quietly(driver, &format!("panel_open_failed_{}", identifier.as_str()))
                    .await;
            }
            return Ok(Err(LocatorError::OpenFailed));
        };

        let candidates = self.wait_for_identifier(driver, selectors).await?;
        match verify(identifier, &candidates) {
            Ok(()) => {
                info!("✓ 面板已核验 ({}): {}", strategy, identifier);
                Ok(Ok(PanelHandle::verified(identifier.clone(), strategy)))
            }
            Err(observed) => {
                error!(
                    "❌ 面板号码核验失败: 请求 {}，面板显示 {:?} (策略: {})",
                    identifier, observed, strategy
                );
                close_panel(driver, selectors).await?;
                Ok(Err(LocatorError::VerificationMismatch {
                    requested: identifier.clone(),
                    observed,
                }))
            }
        }
    }

    /// 依次尝试各策略，返回第一个让面板出现的策略
    async fn open(&self, driver: &dyn PageDriver, selectors: &SelectorSet) -> AppResult<Option<OpenStrategy>> {
        for strategy in OpenStrategy::ORDER {
            let clicked = match timeout(
                self.timing.strategy_timeout,
                self.try_strategy(driver, selectors, strategy),
            )
            .await
            {
                Ok(Ok(clicked)) => clicked,
                Ok(Err(e)) if e.is_browser_fault() => return Err(e),
                Ok(Err(e)) => {
                    debug!("策略 {} 出错: {}", strategy, e);
                    false
                }
                Err(_) => {
                    debug!("策略 {} 超时", strategy);
                    false
                }
            };
            if !clicked {
                debug!("策略 {} 未找到可点击目标", strategy);
                continue;
            }
            if self.wait_for_panel(driver, selectors).await? {
                return Ok(Some(strategy));
            }
            debug!("策略 {} 点击后面板未出现", strategy);
        }
        Ok(None)
    }

    async fn try_strategy(
        &self,
        driver: &dyn PageDriver,
        selectors: &SelectorSet,
        strategy: OpenStrategy,
    ) -> AppResult<bool> {
        match strategy {
            OpenStrategy::NamedHeader => click_first(driver, &selectors.header_named).await,
            OpenStrategy::RoleHeader => click_first(driver, &selectors.header_role).await,
            OpenStrategy::AvatarThumbnail => click_first(driver, &selectors.header_avatar).await,
            OpenStrategy::ScriptDispatch => {
                let result = eval_as::<Option<String>>(driver, &scripts::dispatch_click(&selectors.header_dispatch)).await?;
                Ok(result.as_deref() == Some("clicked"))
            }
            OpenStrategy::LayoutHeader => {
                let boxes = eval_as::<Vec<ElementBox>>(driver, &scripts::element_boxes(&selectors.header_any)).await?;
                let target = boxes
                    .into_iter()
                    .find(|b| b.is_visible() && b.x > self.timing.layout_split_x);
                match target {
                    Some(b) => {
                        let (x, y) = b.center();
                        driver.click_at(x, y).await?;
                        Ok(true)
                    }
                    None => Ok(false),
                }
            }
            OpenStrategy::OperatorNavigated => Ok(false),
        }
    }

    async fn wait_for_panel(&self, driver: &dyn PageDriver, selectors: &SelectorSet) -> AppResult<bool> {
        let open_js = scripts::panel_open(selectors);
        let deadline = Instant::now() + self.timing.panel_wait;
        loop {
            if eval_as::<Option<bool>>(driver, &open_js).await?.unwrap_or(false) {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            sleep(self.timing.poll_interval).await;
        }
    }

    /// 号码文本可能比面板本身晚渲染
    async fn wait_for_identifier(&self, driver: &dyn PageDriver, selectors: &SelectorSet) -> AppResult<Vec<String>> {
        let deadline = Instant::now() + self.timing.panel_wait;
        loop {
            let candidates = read_panel_identifier(driver, selectors).await?;
            if !candidates.is_empty() || Instant::now() >= deadline {
                return Ok(candidates);
            }
            sleep(self.timing.poll_interval).await;
        }
    }
}

async fn click_first(driver: &dyn PageDriver, candidates: &[String]) -> AppResult<bool> {
    for selector in candidates {
        if driver.click(selector).await? {
            debug!("已点击: {}", selector);
            return Ok(true);
        }
    }
    Ok(false)
}

/// 读取当前面板上所有形如号码的文本
pub(crate) async fn read_panel_identifier(
    driver: &dyn PageDriver,
    selectors: &SelectorSet,
) -> AppResult<Vec<String>> {
    Ok(eval_as::<Option<Vec<String>>>(driver, &scripts::panel_identifier(selectors))
        .await?
        .unwrap_or_default())
}

/// 任一候选文本规范化后与请求号码完全相等才算通过；读不到号码也算不符
pub(crate) fn verify(identifier: &Identifier, candidates: &[String]) -> Result<(), Option<String>> {
    if candidates.iter().any(|c| identifier.matches_displayed(c)) {
        Ok(())
    } else {
        Err(candidates.first().cloned())
    }
}

pub async fn close_panel(driver: &dyn PageDriver, selectors: &SelectorSet) -> AppResult<()> {
    eval_as::<Option<bool>>(driver, &scripts::panel_close(selectors)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::fake_page::FakePage;
    use crate::infrastructure::scripts::markers;
    use serde_json::json;

    fn locator(debug_dir: Option<&std::path::Path>) -> PanelLocator {
        PanelLocator::new(
            LocatorTiming {
                strategy_timeout: Duration::from_secs(5),
                panel_wait: Duration::from_secs(4),
                poll_interval: Duration::from_millis(500),
                layout_split_x: 300.0,
            },
            debug_dir.map(DebugCapture::new),
        )
    }

    fn id() -> Identifier {
        Identifier::from_digits("917415337302")
    }

    #[tokio::test(start_paused = true)]
    async fn first_working_strategy_opens_and_verifies() {
        let selectors = SelectorSet::default();
        let page = FakePage::new();
        page.clickable(&selectors.header_role[0])
            .on(markers::PANEL_IDENTIFIER, json!(["+91 74153 37302"]));

        let handle = locator(None)
            .open_and_verify(&page, &selectors, &id())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(handle.strategy(), OpenStrategy::RoleHeader);
        assert_eq!(handle.identifier(), &id());
        assert_eq!(page.clicks(), vec![selectors.header_role[0].clone()]);
    }

    #[tokio::test(start_paused = true)]
    async fn falls_through_to_layout_header_on_the_right_side() {
        let selectors = SelectorSet::default();
        let page = FakePage::new();
        page.with_boxes(
            &selectors.header_any,
            vec![
                ElementBox { x: 0.0, y: 0.0, width: 300.0, height: 60.0 },
                ElementBox { x: 420.0, y: 0.0, width: 800.0, height: 60.0 },
            ],
        )
        .on(markers::PANEL_IDENTIFIER, json!(["+917415337302"]));

        let handle = locator(None)
            .open_and_verify(&page, &selectors, &id())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(handle.strategy(), OpenStrategy::LayoutHeader);
        assert_eq!(page.clicks(), vec!["@820,30".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn script_dispatch_is_tried_before_layout_header() {
        let selectors = SelectorSet::default();
        let page = FakePage::new();
        page.on(markers::DISPATCH_CLICK, json!("clicked"))
            .on(markers::PANEL_IDENTIFIER, json!(["+91 74153 37302"]));

        let handle = locator(None)
            .open_and_verify(&page, &selectors, &id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(handle.strategy(), OpenStrategy::ScriptDispatch);
    }

    #[tokio::test(start_paused = true)]
    async fn other_contacts_panel_is_a_mismatch() {
        let selectors = SelectorSet::default();
        let page = FakePage::new();
        page.clickable(&selectors.header_named[0])
            .on(markers::PANEL_IDENTIFIER, json!(["+91 99999 88888"]));

        let err = locator(None)
            .open_and_verify(&page, &selectors, &id())
            .await
            .unwrap()
            .unwrap_err();

        assert_eq!(
            err,
            LocatorError::VerificationMismatch {
                requested: id(),
                observed: Some("+91 99999 88888".to_string()),
            }
        );
        assert_eq!(page.eval_count(markers::PANEL_CLOSE), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unreadable_identifier_is_a_mismatch() {
        let selectors = SelectorSet::default();
        let page = FakePage::new();
        page.clickable(&selectors.header_named[0]);

        let err = locator(None)
            .open_and_verify(&page, &selectors, &id())
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, LocatorError::VerificationMismatch { observed: None, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_strategies_fail_and_save_debug_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let page = FakePage::new();
        page.with_screenshot(vec![9]);

        let err = locator(Some(dir.path()))
            .open_and_verify(&page, &SelectorSet::default(), &id())
            .await
            .unwrap()
            .unwrap_err();

        assert_eq!(err, LocatorError::OpenFailed);
        let saved: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(saved.len(), 2);
    }

    #[test]
    fn verification_requires_exact_digits() {
        let id = id();
        assert!(verify(&id, &["+91 74153 37302".to_string()]).is_ok());
        assert_eq!(
            verify(&id, &["+1 74153 37302".to_string()]),
            Err(Some("+1 74153 37302".to_string()))
        );
        assert_eq!(verify(&id, &[]), Err(None));
    }
}
