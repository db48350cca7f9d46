//! 号码处理流程 - 流程层
//!
//! 核心职责：定义"一个号码"的一次完整尝试
//!
//! 流程顺序：
//! 1. 节奏控制 → 拟人化 → 导航（超时按导航预算退避重试）
//! 2. 打开并核验面板（打不开按面板预算退避、重新导航后重试；号码不符不重试）
//! 3. 在已核验面板上运行提取流水线，最后关闭面板

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::infrastructure::PageDriver;
use crate::models::{SelectorSet, Tier, Tuning};
use crate::services::panel_locator::{close_panel, read_panel_identifier, verify};
use crate::services::tiers::operator::capture_visible;
use crate::services::tiers::{
    OcrEngine, OperatorPrompt, OperatorTier, RenderedTextTier, RuntimeStateTier, StructuredTier, TierContext,
    TierResources, TierStatus,
};
use crate::services::{
    AvatarStore, DebugCapture, ExtractionPipeline, Humanizer, LocatorError, LocatorTiming, NavOutcome,
    NavigationController, OpenStrategy, PanelHandle, PanelLocator, PhaseReport, PipelineReport, RateLimiter,
    TextFilter,
};
use crate::workflow::extraction_ctx::ExtractionCtx;

/// 各阶段的重试预算
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub navigation_retries: u32,
    pub panel_retries: u32,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            navigation_retries: config.navigation_retries,
            panel_retries: config.panel_retries,
        }
    }
}

/// 流程无法在本层处理、需要编排层介入的情况
#[derive(Debug)]
pub enum FlowInterrupt {
    /// 浏览器失去响应，需要重启
    BrowserFault { report: PhaseReport, error: String },
    /// 导航时又看到了登录二维码
    SessionLost { report: PhaseReport },
}

/// 号码处理流程
///
/// - 编排单个号码的完整处理流程
/// - 决定何时重试、何时放弃
/// - 不持有浏览器资源
pub struct ExtractionFlow {
    navigator: NavigationController,
    locator: PanelLocator,
    pipeline: ExtractionPipeline,
    humanizer: Humanizer,
    policy: RetryPolicy,
}

impl ExtractionFlow {
    pub fn new(
        navigator: NavigationController,
        locator: PanelLocator,
        pipeline: ExtractionPipeline,
        humanizer: Humanizer,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            navigator,
            locator,
            pipeline,
            humanizer,
            policy,
        }
    }

    /// 按配置组装导航、面板定位和全部提取层级
    pub fn from_config(
        config: &Config,
        tuning: &Tuning,
        ocr: Box<dyn OcrEngine>,
        operator: Option<Arc<dyn OperatorPrompt>>,
    ) -> AppResult<Self> {
        let resources = TierResources {
            selectors: tuning.selectors.clone(),
            ocr_regions: tuning.ocr.clone(),
            filter: TextFilter::new(&tuning.text_filter).map_err(AppError::from)?,
            avatars: AvatarStore::new(&config.avatar_dir, &config.web_url)?,
        };
        let mut pipeline = ExtractionPipeline::new(resources, config.tier_timeout())
            .with_tier(Box::new(StructuredTier))
            .with_tier(Box::new(RenderedTextTier::new(ocr)))
            .with_tier(Box::new(RuntimeStateTier));
        if config.operator_assist {
            match operator {
                Some(prompt) => {
                    pipeline = pipeline.with_tier(Box::new(OperatorTier::new(prompt, config.login_timeout())));
                }
                None => warn!("已开启人工协助，但没有提供操作员交互，跳过第四层"),
            }
        }

        debug!("已启用的提取层级: {:?}", pipeline.tiers());

        let locator = PanelLocator::new(
            LocatorTiming {
                strategy_timeout: config.strategy_timeout(),
                panel_wait: config.panel_wait(),
                poll_interval: config.poll_interval(),
                layout_split_x: config.layout_split_x,
            },
            config
                .capture_debug_artifacts
                .then(|| DebugCapture::new(&config.debug_dir)),
        );

        Ok(Self::new(
            NavigationController::new(&config.web_url, config.navigation_timeout(), config.poll_interval()),
            locator,
            pipeline,
            Humanizer::new(),
            RetryPolicy::from_config(config),
        ))
    }

    pub fn pipeline(&self) -> &ExtractionPipeline {
        &self.pipeline
    }

    pub fn selectors(&self) -> &SelectorSet {
        &self.pipeline.resources().selectors
    }

    /// 对一个号码做一次完整尝试
    pub async fn run(
        &mut self,
        driver: &dyn PageDriver,
        ctx: &ExtractionCtx,
        limiter: &mut RateLimiter,
    ) -> Result<PhaseReport, FlowInterrupt> {
        let mut report = PhaseReport::default();

        // ========== 阶段 1: 导航 ==========
        let nav = self.navigate(driver, ctx, limiter, &report).await?;
        report.navigation = Some(nav);
        if nav != NavOutcome::Loaded {
            return Ok(report);
        }

        // ========== 阶段 2: 打开并核验面板 ==========
        let mut attempt = 0;
        let handle = loop {
            let located = self
                .locator
                .open_and_verify(driver, self.selectors(), &ctx.identifier)
                .await
                .map_err(|e| fault(&report, e))?;
            match located {
                Ok(handle) => break handle,
                Err(LocatorError::OpenFailed) if attempt < self.policy.panel_retries => {
                    warn!(
                        "{} ⚠️ 面板未打开，退避后重新导航 ({}/{})",
                        ctx,
                        attempt + 1,
                        self.policy.panel_retries
                    );
                    limiter.backoff(attempt).await;
                    attempt += 1;
                    let nav = self.navigate(driver, ctx, limiter, &report).await?;
                    report.navigation = Some(nav);
                    if nav != NavOutcome::Loaded {
                        return Ok(report);
                    }
                }
                Err(e) => {
                    report.panel = Some(Err(e));
                    return Ok(report);
                }
            }
        };
        report.panel = Some(Ok(handle.clone()));

        // ========== 阶段 3: 分层提取 ==========
        info!("{} 🔍 开始分层提取 (面板策略: {})", ctx, handle.strategy());
        let pipeline = self.pipeline.run(driver, &handle).await;
        let fault_message = pipeline.fault.clone();
        report.pipeline = Some(pipeline);
        if let Some(error) = fault_message {
            return Err(FlowInterrupt::BrowserFault { report, error });
        }

        if let Err(e) = close_panel(driver, self.selectors()).await {
            debug!("{} 关闭面板失败: {}", ctx, e);
        }
        Ok(report)
    }

    /// 人工引导采集：操作员已经把目标联系人的面板调出来，核验后读取当前可见内容
    pub async fn capture_current(
        &self,
        driver: &dyn PageDriver,
        ctx: &ExtractionCtx,
    ) -> Result<PhaseReport, FlowInterrupt> {
        let mut report = PhaseReport {
            navigation: Some(NavOutcome::Loaded),
            ..PhaseReport::default()
        };

        let candidates = match read_panel_identifier(driver, self.selectors()).await {
            Ok(candidates) => candidates,
            Err(e) if e.is_browser_fault() => return Err(fault(&report, e)),
            Err(e) => {
                report.note = Some(e.to_string());
                return Ok(report);
            }
        };
        if let Err(observed) = verify(&ctx.identifier, &candidates) {
            report.panel = Some(Err(LocatorError::VerificationMismatch {
                requested: ctx.identifier.clone(),
                observed,
            }));
            return Ok(report);
        }

        let handle = PanelHandle::verified(ctx.identifier.clone(), OpenStrategy::OperatorNavigated);
        report.panel = Some(Ok(handle.clone()));
        info!("{} 🙋 读取操作员调出的面板", ctx);

        let tier_ctx = TierContext::new(driver, &handle, self.pipeline.resources());
        let mut pipeline = PipelineReport::default();
        let status = match capture_visible(&tier_ctx).await {
            Ok(status) => status,
            Err(e) if e.is_browser_fault() => {
                pipeline.fault = Some(e.to_string());
                report.pipeline = Some(pipeline);
                return Err(FlowInterrupt::BrowserFault {
                    report,
                    error: e.to_string(),
                });
            }
            Err(e) => TierStatus::Failed(e.to_string()),
        };
        pipeline.absorb(Tier::OperatorGuided, status, &handle);
        report.pipeline = Some(pipeline);
        Ok(report)
    }

    /// 导航阶段：超时或导航错误按预算退避重试
    async fn navigate(
        &mut self,
        driver: &dyn PageDriver,
        ctx: &ExtractionCtx,
        limiter: &mut RateLimiter,
        report: &PhaseReport,
    ) -> Result<NavOutcome, FlowInterrupt> {
        let mut attempt = 0;
        loop {
            limiter.gate().await;
            if let Err(e) = self.humanizer.before_navigation(driver).await {
                if e.is_browser_fault() {
                    return Err(fault(report, e));
                }
                debug!("{} 拟人化操作失败: {}", ctx, e);
            }

            let outcome = match self
                .navigator
                .go_to(driver, &self.pipeline.resources().selectors, &ctx.identifier)
                .await
            {
                Ok(outcome) => outcome,
                Err(e) if e.is_browser_fault() => return Err(fault(report, e)),
                Err(e) => {
                    warn!("{} 导航出错: {}", ctx, e);
                    NavOutcome::Timeout
                }
            };

            match outcome {
                NavOutcome::Loaded => {
                    debug!("{} ✓ 会话页已加载", ctx);
                    limiter.reset_backoff();
                    return Ok(outcome);
                }
                NavOutcome::InvalidIdentifier => {
                    info!("{} 号码未注册", ctx);
                    return Ok(outcome);
                }
                NavOutcome::StillAuthenticating => {
                    warn!("{} ⚠️ 页面显示登录二维码，登录态已失效", ctx);
                    let mut report = report.clone();
                    report.navigation = Some(outcome);
                    return Err(FlowInterrupt::SessionLost { report });
                }
                NavOutcome::Timeout if attempt < self.policy.navigation_retries => {
                    warn!(
                        "{} ⚠️ 导航超时，退避后重试 ({}/{})",
                        ctx,
                        attempt + 1,
                        self.policy.navigation_retries
                    );
                    limiter.backoff(attempt).await;
                    attempt += 1;
                }
                NavOutcome::Timeout => {
                    warn!("{} ❌ 导航重试次数用尽", ctx);
                    return Ok(outcome);
                }
            }
        }
    }
}

fn fault(report: &PhaseReport, error: AppError) -> FlowInterrupt {
    FlowInterrupt::BrowserFault {
        report: report.clone(),
        error: error.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::infrastructure::fake_page::FakePage;
    use crate::infrastructure::scripts::markers;
    use crate::models::{ExtractionOutcome, Identifier};
    use crate::services::classify;
    use crate::services::rate_limiter::RatePolicy;
    use crate::services::tiers::test_support::resources;
    use serde_json::json;
    use std::time::Duration;

    pub fn test_limiter() -> RateLimiter {
        RateLimiter::with_seed(
            RatePolicy {
                min_delay: Duration::from_secs(3),
                max_delay: Duration::from_secs(6),
                jitter: Duration::from_millis(500),
                backoff_base: Duration::from_secs(2),
                backoff_ceiling: Duration::from_secs(30),
            },
            42,
        )
    }

    fn flow(dir: &std::path::Path) -> ExtractionFlow {
        ExtractionFlow::new(
            NavigationController::new("https://web.whatsapp.com", Duration::from_secs(15), Duration::from_millis(500)),
            PanelLocator::new(
                LocatorTiming {
                    strategy_timeout: Duration::from_secs(5),
                    panel_wait: Duration::from_secs(4),
                    poll_interval: Duration::from_millis(500),
                    layout_split_x: 300.0,
                },
                None,
            ),
            ExtractionPipeline::new(resources(dir), Duration::from_secs(20))
                .with_tier(Box::new(StructuredTier))
                .with_tier(Box::new(RuntimeStateTier)),
            Humanizer::with_seed(1),
            RetryPolicy {
                navigation_retries: 2,
                panel_retries: 1,
            },
        )
    }

    fn ctx() -> ExtractionCtx {
        ExtractionCtx::new(1, 1, Identifier::from_digits("917415337302"), None)
    }

    #[tokio::test(start_paused = true)]
    async fn happy_path_reaches_the_pipeline_and_closes_the_panel() {
        let dir = tempfile::tempdir().unwrap();
        let mut flow = flow(dir.path());
        let selectors = SelectorSet::default();
        let page = FakePage::new();
        page.on(markers::NAV_STATE, json!({ "header": true }))
            .clickable(&selectors.header_named[0])
            .on(markers::PANEL_IDENTIFIER, json!(["+91 74153 37302"]))
            .on(markers::PANEL_FIELDS, json!({ "rootFound": true, "name": "Priya" }))
            .on(
                markers::RUNTIME_CONTACT,
                json!({ "storeFound": true, "found": true, "about": "Busy" }),
            );

        let report = flow.run(&page, &ctx(), &mut test_limiter()).await.unwrap();
        let classification = classify(&ctx().identifier, &report);

        assert_eq!(classification.outcome, ExtractionOutcome::PartialSuccess);
        assert_eq!(classification.provenance.name, Some(Tier::StructuredElement));
        assert_eq!(classification.provenance.about, Some(Tier::RuntimeState));
        assert_eq!(page.eval_count(markers::PANEL_CLOSE), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn navigation_timeouts_are_retried_within_budget() {
        let dir = tempfile::tempdir().unwrap();
        let mut flow = flow(dir.path());
        let page = FakePage::new();

        let report = flow.run(&page, &ctx(), &mut test_limiter()).await.unwrap();

        assert_eq!(report.navigation, Some(NavOutcome::Timeout));
        assert_eq!(page.gotos().len(), 3);
        assert_eq!(
            classify(&ctx().identifier, &report).outcome,
            ExtractionOutcome::TransientError
        );
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_identifier_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let mut flow = flow(dir.path());
        let page = FakePage::new();
        page.on(markers::NAV_STATE, json!({ "invalid": true }));

        let report = flow.run(&page, &ctx(), &mut test_limiter()).await.unwrap();
        assert_eq!(page.gotos().len(), 1);
        assert_eq!(classify(&ctx().identifier, &report).outcome, ExtractionOutcome::NotRegistered);
    }

    #[tokio::test(start_paused = true)]
    async fn unopenable_panel_renavigates_once_then_gives_up() {
        let dir = tempfile::tempdir().unwrap();
        let mut flow = flow(dir.path());
        let page = FakePage::new();
        page.on(markers::NAV_STATE, json!({ "header": true }));

        let report = flow.run(&page, &ctx(), &mut test_limiter()).await.unwrap();
        assert_eq!(page.gotos().len(), 2);
        assert_eq!(report.panel, Some(Err(LocatorError::OpenFailed)));
        assert!(report.pipeline.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn mismatch_skips_pipeline_and_retries() {
        let dir = tempfile::tempdir().unwrap();
        let mut flow = flow(dir.path());
        let selectors = SelectorSet::default();
        let page = FakePage::new();
        page.on(markers::NAV_STATE, json!({ "header": true }))
            .clickable(&selectors.header_named[0])
            .on(markers::PANEL_IDENTIFIER, json!(["+44 7700 900123"]))
            .on(markers::PANEL_FIELDS, json!({ "rootFound": true, "name": "Someone Else" }));

        let report = flow.run(&page, &ctx(), &mut test_limiter()).await.unwrap();
        assert_eq!(page.gotos().len(), 1);
        assert_eq!(page.eval_count(markers::PANEL_FIELDS), 0);
        assert_eq!(
            classify(&ctx().identifier, &report).outcome,
            ExtractionOutcome::VerificationMismatch
        );
    }

    #[tokio::test(start_paused = true)]
    async fn login_challenge_interrupts_with_session_lost() {
        let dir = tempfile::tempdir().unwrap();
        let mut flow = flow(dir.path());
        let page = FakePage::new();
        page.on(markers::NAV_STATE, json!({ "login": true }));

        let interrupt = flow.run(&page, &ctx(), &mut test_limiter()).await.unwrap_err();
        assert!(matches!(
            interrupt,
            FlowInterrupt::SessionLost { ref report } if report.navigation == Some(NavOutcome::StillAuthenticating)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn manual_capture_attributes_fields_to_operator() {
        let dir = tempfile::tempdir().unwrap();
        let flow = flow(dir.path());
        let page = FakePage::new();
        page.on(markers::PANEL_IDENTIFIER, json!(["+91 74153 37302"]))
            .on(markers::PANEL_FIELDS, json!({ "rootFound": true, "name": "Priya", "about": "Busy" }));

        let report = flow.capture_current(&page, &ctx()).await.unwrap();
        let classification = classify(&ctx().identifier, &report);

        assert_eq!(classification.outcome, ExtractionOutcome::PartialSuccess);
        assert_eq!(classification.provenance.name, Some(Tier::OperatorGuided));
        assert_eq!(classification.provenance.about, Some(Tier::OperatorGuided));
        assert!(page.gotos().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn manual_capture_refuses_the_wrong_contact() {
        let dir = tempfile::tempdir().unwrap();
        let flow = flow(dir.path());
        let page = FakePage::new();
        page.on(markers::PANEL_IDENTIFIER, json!(["+44 7700 900123"]));

        let report = flow.capture_current(&page, &ctx()).await.unwrap();
        assert_eq!(
            classify(&ctx().identifier, &report).outcome,
            ExtractionOutcome::VerificationMismatch
        );
        assert_eq!(page.eval_count(markers::PANEL_FIELDS), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unresponsive_browser_interrupts_with_fault() {
        let dir = tempfile::tempdir().unwrap();
        let mut flow = flow(dir.path());
        let page = FakePage::new();
        page.set_unresponsive(true);

        let interrupt = flow.run(&page, &ctx(), &mut test_limiter()).await.unwrap_err();
        assert!(matches!(interrupt, FlowInterrupt::BrowserFault { .. }));
    }
}
