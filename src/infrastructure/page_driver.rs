//! 页面驱动接口
//!
//! 所有业务能力都只通过这个接口操作页面，浏览器实现（`JsExecutor`）和测试用的
//! 假页面都实现它。

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::AppResult;
use crate::models::StoredCookie;

/// 元素在视口中的位置（CSS 像素）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElementBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ElementBox {
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn is_visible(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

#[async_trait]
pub trait PageDriver: Send + Sync {
    /// 导航到指定地址并等待加载
    async fn goto(&self, url: &str) -> AppResult<()>;

    async fn reload(&self) -> AppResult<()>;

    /// 执行 JS 表达式，返回 JSON 值（undefined 视为 null）
    async fn eval(&self, script: &str) -> AppResult<JsonValue>;

    /// 用真实鼠标事件点击第一个匹配元素；元素不存在时返回 `Ok(false)`
    async fn click(&self, selector: &str) -> AppResult<bool>;

    async fn click_at(&self, x: f64, y: f64) -> AppResult<()>;

    async fn move_mouse(&self, x: f64, y: f64) -> AppResult<()>;

    /// PNG 截图；`clip` 为空时截取整个视口
    async fn screenshot(&self, clip: Option<ElementBox>) -> AppResult<Vec<u8>>;

    async fn cookies(&self) -> AppResult<Vec<StoredCookie>>;

    async fn set_cookies(&self, cookies: &[StoredCookie]) -> AppResult<()>;

    /// 释放浏览器资源
    async fn close(&self) -> AppResult<()>;
}

/// 执行 JS 并反序列化为指定类型
pub async fn eval_as<T: DeserializeOwned>(driver: &dyn PageDriver, script: &str) -> AppResult<T> {
    let value = driver.eval(script).await?;
    Ok(serde_json::from_value(value)?)
}
