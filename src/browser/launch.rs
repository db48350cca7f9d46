use std::path::Path;

use chromiumoxide::cdp::browser_protocol::emulation::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::error::{AppError, AppResult, BrowserError};

/// 桌面 Chrome 的 UA，避免暴露 HeadlessChrome
pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";

/// 每个新文档加载前注入，隐藏自动化痕迹
const STEALTH_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
window.chrome = window.chrome || { runtime: {} };
"#;

/// 浏览器启动参数
#[derive(Debug, Clone)]
pub struct LaunchOptions<'a> {
    pub url: &'a str,
    pub profile_dir: &'a str,
    pub chrome_executable: Option<&'a str>,
    pub headless: bool,
}

/// 以持久化用户目录启动浏览器并导航到指定 URL
///
/// 用户目录里保存着登录状态，重启后无需重新扫码。
pub async fn launch_browser(options: LaunchOptions<'_>) -> AppResult<(Browser, Page, JoinHandle<()>)> {
    info!("🚀 启动浏览器 (用户目录: {})", options.profile_dir);

    tokio::fs::create_dir_all(options.profile_dir)
        .await
        .map_err(|e| AppError::file_write_failed(options.profile_dir, e))?;

    let mut builder = BrowserConfig::builder()
        .user_data_dir(Path::new(options.profile_dir))
        .window_size(1366, 900)
        .viewport(None)
        .args(vec![
            "--disable-blink-features=AutomationControlled",
            "--no-first-run",
            "--no-default-browser-check",
            "--disable-dev-shm-usage",
            "--disable-infobars",
            "--lang=en-US",
        ]);
    builder = if options.headless {
        builder.new_headless_mode()
    } else {
        builder.with_head()
    };
    if let Some(exe) = options.chrome_executable {
        debug!("使用指定的浏览器: {}", exe);
        builder = builder.chrome_executable(Path::new(exe));
    }
    let config = builder.build().map_err(|e| {
        error!("配置浏览器失败: {}", e);
        AppError::Browser(BrowserError::LaunchFailed { source: e.into() })
    })?;

    let (browser, mut handler) = Browser::launch(config).await.map_err(|e| {
        error!("启动浏览器失败: {}", e);
        AppError::Browser(BrowserError::LaunchFailed { source: Box::new(e) })
    })?;
    debug!("浏览器启动成功");

    // 在后台处理浏览器事件
    let handle = tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    sleep(tokio::time::Duration::from_millis(300)).await;

    let page = browser.new_page("about:blank").await.map_err(|e| {
        error!("创建页面失败: {}", e);
        AppError::Browser(BrowserError::PageCreationFailed { source: Box::new(e) })
    })?;
    page.execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_SCRIPT))
        .await?;
    page.execute(SetUserAgentOverrideParams::new(DESKTOP_USER_AGENT))
        .await?;
    page.goto(options.url)
        .await
        .map_err(|e| AppError::navigation_failed(options.url, e))?;

    info!("✅ 浏览器已导航到: {}", options.url);
    Ok((browser, page, handle))
}
