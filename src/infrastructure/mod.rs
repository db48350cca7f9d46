//! 基础设施层（Infrastructure Layer）
//!
//! 持有稀缺资源（浏览器页面），只暴露能力，不认识业务。
//!
//! - `page_driver` - 页面能力接口 `PageDriver`
//! - `js_executor` - 基于 chromiumoxide 的实现，唯一的 page owner
//! - `scripts` - 所有注入页面的 JS
//! - `launcher` - 浏览器启动 / 重启

pub mod js_executor;
pub mod launcher;
pub mod page_driver;
pub mod scripts;

#[cfg(test)]
pub(crate) mod fake_page;

pub use js_executor::JsExecutor;
pub use launcher::{BrowserLauncher, ChromeLauncher};
pub use page_driver::{eval_as, ElementBox, PageDriver};
