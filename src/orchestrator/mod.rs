//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责会话生命周期和批量调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `extraction_orchestrator` - 号码提取编排器
//! - 持有浏览器页面（`Arc<dyn PageDriver>`）和节奏控制器
//! - 单个号码：`extract_one` / `extract_manual`
//! - 批量号码：`extract_batch`，严格顺序
//! - 浏览器失去响应时通过 `BrowserLauncher` 重启
//! - 通知审计端
//!
//! ### `session_lifecycle` - 会话生命周期
//! - 确认 / 恢复登录态
//! - 获取登录二维码、等待扫码
//! - 保存会话快照
//!
//! ## 层次关系
//!
//! ```text
//! extraction_orchestrator (处理 Vec<ExtractionRequest>)
//!     ↓
//! workflow::ExtractionFlow (处理单个号码)
//!     ↓
//! services (能力层：navigation / panel_locator / pipeline / classifier)
//!     ↓
//! infrastructure (基础设施：PageDriver)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一所有者**：只有编排层持有浏览器页面
//! 2. **向下依赖**：编排层 → workflow → services → infrastructure
//! 3. **结果而非异常**：对外接口永远返回结果对象

pub mod extraction_orchestrator;
pub mod session_lifecycle;

// 重新导出主要类型
pub use extraction_orchestrator::{Collaborators, ExtractionOrchestrator};
pub use session_lifecycle::SessionLifecycle;
