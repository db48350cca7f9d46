//! 浏览器获取与重启
//!
//! 编排层只依赖 `BrowserLauncher`，浏览器失去响应时通过它换一个新页面。

use std::sync::Arc;

use async_trait::async_trait;

use crate::browser::{self, LaunchOptions};
use crate::config::{BrowserMode, Config};
use crate::error::AppResult;
use crate::infrastructure::{JsExecutor, PageDriver};

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> AppResult<Arc<dyn PageDriver>>;
}

/// 按配置启动或连接 Chromium
pub struct ChromeLauncher {
    config: Config,
}

impl ChromeLauncher {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    fn host(&self) -> &str {
        self.config
            .web_url
            .split("://")
            .nth(1)
            .unwrap_or(&self.config.web_url)
            .trim_end_matches('/')
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self) -> AppResult<Arc<dyn PageDriver>> {
        let executor = match self.config.browser_mode {
            BrowserMode::Launch => {
                let (browser, page, handler) = browser::launch_browser(LaunchOptions {
                    url: &self.config.web_url,
                    profile_dir: &self.config.profile_dir,
                    chrome_executable: self.config.chrome_executable.as_deref(),
                    headless: self.config.headless,
                })
                .await?;
                JsExecutor::new(page, browser, handler, true, self.config.browser_call_timeout())
            }
            BrowserMode::Connect => {
                let (browser, page, handler) = browser::connect_to_browser_and_page(
                    self.config.browser_debug_port,
                    &self.config.web_url,
                    self.host(),
                )
                .await?;
                JsExecutor::new(page, browser, handler, false, self.config.browser_call_timeout())
            }
        };
        Ok(Arc::new(executor))
    }
}
