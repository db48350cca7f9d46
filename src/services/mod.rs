//! 业务能力层（Services）
//!
//! 描述"我能对一个号码做什么"，每个能力只处理单个号码，
//! 不出现批量，也不决定重试。

pub mod audit_writer;
pub mod avatar_store;
pub mod classifier;
pub mod debug_capture;
pub mod humanizer;
pub mod navigation;
pub mod panel_locator;
pub mod pipeline;
pub mod rate_limiter;
pub mod session_store;
pub mod text_filter;
pub mod tiers;

pub use audit_writer::{AuditRecord, AuditSink, JsonlAuditSink, TracingAuditSink};
pub use avatar_store::AvatarStore;
pub use classifier::{classify, PhaseReport};
pub use debug_capture::DebugCapture;
pub use humanizer::Humanizer;
pub use navigation::{NavOutcome, NavigationController};
pub use panel_locator::{LocatorError, LocatorTiming, OpenStrategy, PanelHandle, PanelLocator};
pub use pipeline::{ExtractionPipeline, PipelineReport, TierAttempt};
pub use rate_limiter::{RateLimiter, RatePolicy};
pub use session_store::SessionStore;
pub use text_filter::TextFilter;
pub use tiers::{OcrEngine, OperatorPrompt, ProfileFields, TesseractCli, TierStatus};
