//! # Contact Profiler
//!
//! 通过网页版即时通讯客户端，按号码提取联系人公开资料（名称、签名、头像）
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（Page），只暴露能力
//! - `PageDriver` - 页面能力接口；`JsExecutor` 是唯一的 page owner
//! - `BrowserLauncher` - 启动 / 重启浏览器
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能对一个号码做什么"
//! - `NavigationController` - 深链接导航与结果识别
//! - `PanelLocator` - 打开详情面板并核验号码
//! - `ExtractionPipeline` - 四个提取层级（结构化 / OCR / 运行时 / 人工）
//! - `classify` - 结果分类
//! - `RateLimiter` / `SessionStore` / `AuditSink`
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个号码"的完整处理流程
//! - `ExtractionCtx` - 上下文封装（批次位置 + 号码）
//! - `ExtractionFlow` - 流程编排（节奏 → 导航 → 面板 → 提取），重试策略只在这里定义
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/extraction_orchestrator` - 对外入口，持有浏览器，顺序处理批量号码
//! - `orchestrator/session_lifecycle` - 登录态确认、恢复、二维码、保存
//!
//! ## 模块结构

pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod logger;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::{BrowserLauncher, ChromeLauncher, JsExecutor, PageDriver};
pub use models::{
    BatchReport, E164Validator, ExtractionOutcome, ExtractionRequest, ExtractionResult, Identifier,
    IdentifierValidator, SessionInit, Tier, Tuning,
};
pub use orchestrator::{Collaborators, ExtractionOrchestrator};
pub use workflow::{ExtractionCtx, ExtractionFlow};
