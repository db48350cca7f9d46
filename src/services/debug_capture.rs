//! 调试现场保存 - 业务能力层
//!
//! 面板打不开时保存整页截图和 HTML，方便更新选择器

use std::path::PathBuf;

use chrono::Local;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::infrastructure::{eval_as, scripts, PageDriver};

#[derive(Debug, Clone)]
pub struct DebugCapture {
    dir: PathBuf,
}

impl DebugCapture {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// 保存 `<label>_<时间>.png` 和 `.html`，返回两个文件路径
    pub async fn capture(&self, driver: &dyn PageDriver, label: &str) -> AppResult<(PathBuf, PathBuf)> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| AppError::file_write_failed(self.dir.display().to_string(), e))?;

        let stem = format!("{}_{}", label, Local::now().format("%Y%m%d_%H%M%S"));
        let png_path = self.dir.join(format!("{stem}.png"));
        let html_path = self.dir.join(format!("{stem}.html"));

        let png = driver.screenshot(None).await?;
        tokio::fs::write(&png_path, png)
            .await
            .map_err(|e| AppError::file_write_failed(png_path.display().to_string(), e))?;

        let html = eval_as::<Option<String>>(driver, &scripts::page_html())
            .await?
            .unwrap_or_default();
        tokio::fs::write(&html_path, html)
            .await
            .map_err(|e| AppError::file_write_failed(html_path.display().to_string(), e))?;

        info!("📸 调试现场已保存: {}", png_path.display());
        Ok((png_path, html_path))
    }

    /// 保存失败只记日志
    pub async fn capture_quietly(&self, driver: &dyn PageDriver, label: &str) {
        if let Err(e) = self.capture(driver, label).await {
            warn!("保存调试现场失败: {}", e);
        }
    }
}
