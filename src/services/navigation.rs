//! 导航服务 - 业务能力层
//!
//! 打开号码的深链接，判断页面落在哪种状态

use std::time::Duration;

use serde::Deserialize;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::error::AppResult;
use crate::infrastructure::{eval_as, scripts, PageDriver};
use crate::models::{Identifier, SelectorSet};

/// 导航结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavOutcome {
    /// 会话顶部栏已出现
    Loaded,
    /// 页面提示号码无效
    InvalidIdentifier,
    /// 仍显示登录二维码
    StillAuthenticating,
    /// 超时前没有观察到任何信号
    Timeout,
}

impl NavOutcome {
    /// 可以由编排层重试
    pub fn is_retryable(self) -> bool {
        matches!(self, NavOutcome::Timeout | NavOutcome::StillAuthenticating)
    }
}

#[derive(Debug, Default, Deserialize)]
struct LandingState {
    #[serde(default)]
    invalid: bool,
    #[serde(default)]
    header: bool,
    #[serde(default)]
    login: bool,
}

pub struct NavigationController {
    web_url: String,
    timeout: Duration,
    poll_interval: Duration,
}

impl NavigationController {
    pub fn new(web_url: impl Into<String>, timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            web_url: web_url.into().trim_end_matches('/').to_string(),
            timeout,
            poll_interval,
        }
    }

    pub fn deep_link(&self, identifier: &Identifier) -> String {
        format!("{}/send?phone={}", self.web_url, identifier.as_str())
    }

    /// 导航并等待三种信号之一
    ///
    /// 顶部栏可能在首屏之后才异步渲染，所以在超时前持续轮询。
    /// 浏览器本身的错误以 `Err` 返回。
    pub async fn go_to(
        &self,
        driver: &dyn PageDriver,
        selectors: &SelectorSet,
        identifier: &Identifier,
    ) -> AppResult<NavOutcome> {
        let url = self.deep_link(identifier);
        let state_js = scripts::navigation_state(selectors);
        debug!("导航到: {}", url);

        let waited = timeout(self.timeout, async {
            driver.goto(&url).await?;
            loop {
                let state = eval_as::<Option<LandingState>>(driver, &state_js)
                    .await?
                    .unwrap_or_default();
                if state.invalid {
                    return Ok(NavOutcome::InvalidIdentifier);
                }
                if state.header {
                    return Ok(NavOutcome::Loaded);
                }
                if state.login {
                    return Ok(NavOutcome::StillAuthenticating);
                }
                sleep(self.poll_interval).await;
            }
        })
        .await;

        match waited {
            Ok(result) => result,
            Err(_) => {
                warn!("导航超时 ({:?}): {}", self.timeout, url);
                Ok(NavOutcome::Timeout)
            }
        }
    }
}
