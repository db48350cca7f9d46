//! JS 执行器 - 基础设施层
//!
//! 持有唯一的 page 资源，通过 `PageDriver` 暴露页面能力

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, TimeSinceEpoch};
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, Viewport};
use chromiumoxide::layout::Point;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, Page};
use serde_json::Value as JsonValue;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult, BrowserError};
use crate::infrastructure::page_driver::{ElementBox, PageDriver};
use crate::models::StoredCookie;

/// JS 执行器
///
/// 职责：
/// - 持有唯一的 Page 资源（以及自行启动时的 Browser）
/// - 实现 `PageDriver`
/// - 不认识号码和资料字段
/// - 每次页面调用都有时限，超时视为浏览器无响应
pub struct JsExecutor {
    page: Page,
    call_timeout: Duration,
    browser: Mutex<Option<Browser>>,
    handler: Option<JoinHandle<()>>,
    /// connect 模式下浏览器不归本进程所有，关闭时只断开连接
    owns_browser: bool,
}

impl JsExecutor {
    /// 接管页面、浏览器句柄和事件循环任务
    pub fn new(
        page: Page,
        browser: Browser,
        handler: JoinHandle<()>,
        owns_browser: bool,
        call_timeout: Duration,
    ) -> Self {
        Self {
            page,
            call_timeout,
            browser: Mutex::new(Some(browser)),
            handler: Some(handler),
            owns_browser,
        }
    }

    async fn bounded<T>(&self, call: &str, fut: impl Future<Output = AppResult<T>>) -> AppResult<T> {
        match timeout(self.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!("⏱️ 页面调用 {} 超过 {:?} 没有返回", call, self.call_timeout);
                Err(AppError::Browser(BrowserError::Unresponsive))
            }
        }
    }
}

#[async_trait]
impl PageDriver for JsExecutor {
    async fn goto(&self, url: &str) -> AppResult<()> {
        self.bounded("goto", async {
            self.page
                .goto(url)
                .await
                .map_err(|e| AppError::navigation_cdp_failed(url, e))?;
            Ok(())
        })
        .await
    }

    async fn reload(&self) -> AppResult<()> {
        self.bounded("reload", async {
            self.page.reload().await?;
            Ok(())
        })
        .await
    }

    async fn eval(&self, script: &str) -> AppResult<JsonValue> {
        self.bounded("eval", async {
            let result = self.page.evaluate(script).await?;
            Ok(result.value().cloned().unwrap_or(JsonValue::Null))
        })
        .await
    }

    async fn click(&self, selector: &str) -> AppResult<bool> {
        self.bounded("click", async {
            let element = match self.page.find_element(selector).await {
                Ok(element) => element,
                Err(e) => {
                    let e = AppError::from(e);
                    if e.is_browser_fault() {
                        return Err(e);
                    }
                    debug!("未找到元素 {}: {}", selector, e);
                    return Ok(false);
                }
            };
            element.scroll_into_view().await?;
            element.click().await?;
            Ok(true)
        })
        .await
    }

    async fn click_at(&self, x: f64, y: f64) -> AppResult<()> {
        self.bounded("click_at", async {
            self.page.click(Point { x, y }).await?;
            Ok(())
        })
        .await
    }

    async fn move_mouse(&self, x: f64, y: f64) -> AppResult<()> {
        self.bounded("move_mouse", async {
            self.page.move_mouse(Point { x, y }).await?;
            Ok(())
        })
        .await
    }

    async fn screenshot(&self, clip: Option<ElementBox>) -> AppResult<Vec<u8>> {
        let mut builder = ScreenshotParams::builder().format(CaptureScreenshotFormat::Png);
        if let Some(area) = clip {
            builder = builder.clip(Viewport {
                x: area.x,
                y: area.y,
                width: area.width,
                height: area.height,
                scale: 1.0,
            });
        }
        self.bounded("screenshot", async { Ok(self.page.screenshot(builder.build()).await?) })
            .await
    }

    async fn cookies(&self) -> AppResult<Vec<StoredCookie>> {
        let cookies = self.bounded("cookies", async { Ok(self.page.get_cookies().await?) }).await?;
        Ok(cookies
            .into_iter()
            .map(|c| StoredCookie {
                name: c.name,
                value: c.value,
                domain: c.domain,
                path: c.path,
                expires: if c.session { None } else { Some(c.expires) },
                http_only: c.http_only,
                secure: c.secure,
            })
            .collect())
    }

    async fn set_cookies(&self, cookies: &[StoredCookie]) -> AppResult<()> {
        let mut params = Vec::with_capacity(cookies.len());
        for cookie in cookies {
            let mut builder = CookieParam::builder()
                .name(cookie.name.clone())
                .value(cookie.value.clone())
                .domain(cookie.domain.clone())
                .path(cookie.path.clone())
                .http_only(cookie.http_only)
                .secure(cookie.secure);
            if let Some(expires) = cookie.expires {
                builder = builder.expires(TimeSinceEpoch::new(expires));
            }
            params.push(builder.build().map_err(AppError::Other)?);
        }
        if !params.is_empty() {
            self.bounded("set_cookies", async {
                self.page.set_cookies(params).await?;
                Ok(())
            })
            .await?;
        }
        Ok(())
    }

    async fn close(&self) -> AppResult<()> {
        let mut guard = self.browser.lock().await;
        let Some(mut browser) = guard.take() else {
            return Ok(());
        };
        if self.owns_browser {
            if let Err(e) = browser.close().await {
                warn!("关闭浏览器失败: {}", e);
            }
            let _ = browser.wait().await;
        }
        if let Some(handler) = &self.handler {
            handler.abort();
        }
        Ok(())
    }
}
