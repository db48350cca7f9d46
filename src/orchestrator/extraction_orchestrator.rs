//! 号码提取编排器 - 编排层
//!
//! ## 职责
//!
//! 本模块是对外的唯一入口，负责浏览器资源和会话的生命周期，
//! 并按顺序处理批量号码。
//!
//! ## 核心功能
//!
//! 1. **会话管理**：`init_session` / `await_login` / `close_session`
//! 2. **单个号码**：`extract_one`，永远返回结果对象
//! 3. **批量处理**：`extract_batch`，严格顺序、保持输入顺序
//! 4. **故障恢复**：浏览器失去响应时重启并恢复会话；登录态失效时重新建立会话，各重试一次
//! 5. **审计通知**：每个最终结果通知审计端，失败不影响结果
//!
//! ## 设计特点
//!
//! - **资源所有者**：唯一持有浏览器页面的模块
//! - **不做并发**：同一身份的并行会话本身就是自动化特征
//! - **向下委托**：单个号码的一次尝试交给 `workflow::ExtractionFlow`

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{AppResult, BrowserError};
use crate::infrastructure::{BrowserLauncher, PageDriver};
use crate::models::{BatchReport, ExtractionRequest, ExtractionResult, SessionInit, Tuning};
use crate::orchestrator::session_lifecycle::{is_alive, SessionLifecycle};
use crate::services::audit_writer::notify;
use crate::services::{
    classify, AuditSink, JsonlAuditSink, NavOutcome, OcrEngine, OperatorPrompt, PhaseReport, RateLimiter,
    RatePolicy, SessionStore, TesseractCli, TracingAuditSink,
};
use crate::utils::logging;
use crate::workflow::{ExtractionCtx, ExtractionFlow, FlowInterrupt};

/// 编排器依赖的外部协作者
pub struct Collaborators {
    pub ocr: Box<dyn OcrEngine>,
    pub audit: Arc<dyn AuditSink>,
    pub operator: Option<Arc<dyn OperatorPrompt>>,
}

impl Collaborators {
    /// 默认使用本地 tesseract；审计写入 JSON Lines 文件，未配置文件时只写日志
    pub fn from_config(config: &Config, operator: Option<Arc<dyn OperatorPrompt>>) -> Self {
        let audit: Arc<dyn AuditSink> = if config.audit_log_file.trim().is_empty() {
            Arc::new(TracingAuditSink)
        } else {
            Arc::new(JsonlAuditSink::new(&config.audit_log_file))
        };
        Self {
            ocr: Box::new(TesseractCli::new(&config.ocr_binary, &config.ocr_lang)),
            audit,
            operator,
        }
    }
}

/// 一次尝试的方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Automatic,
    OperatorGuided,
}

pub struct ExtractionOrchestrator {
    config: Config,
    launcher: Arc<dyn BrowserLauncher>,
    driver: Option<Arc<dyn PageDriver>>,
    session: SessionLifecycle,
    authenticated: bool,
    flow: ExtractionFlow,
    limiter: RateLimiter,
    audit: Arc<dyn AuditSink>,
    operator: Option<Arc<dyn OperatorPrompt>>,
}

impl ExtractionOrchestrator {
    pub fn new(
        config: Config,
        tuning: Tuning,
        launcher: Arc<dyn BrowserLauncher>,
        collaborators: Collaborators,
    ) -> AppResult<Self> {
        config.validate()?;
        tuning.validate()?;

        let Collaborators { ocr, audit, operator } = collaborators;
        let flow = ExtractionFlow::from_config(&config, &tuning, ocr, operator.clone())?;
        let session = SessionLifecycle::new(
            SessionStore::new(
                &config.session_file,
                chrono::Duration::hours(config.session_max_idle_hours),
            ),
            tuning.selectors,
            &config.web_url,
            config.navigation_timeout(),
            config.poll_interval(),
        );
        let limiter = RateLimiter::new(RatePolicy::from_config(&config));

        Ok(Self {
            config,
            launcher,
            driver: None,
            session,
            authenticated: false,
            flow,
            limiter,
            audit,
            operator,
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// 启动浏览器（若尚未启动）并确认或恢复登录态
    pub async fn init_session(&mut self) -> AppResult<SessionInit> {
        let driver = self.ensure_browser().await?;
        let init = self.session.establish(driver.as_ref()).await?;
        self.authenticated = init.already_authenticated;
        Ok(init)
    }

    /// 等待操作员完成扫码
    pub async fn await_login(&mut self, timeout_secs: u64) -> AppResult<bool> {
        let driver = self.driver.clone().ok_or(BrowserError::NotStarted)?;
        let ok = self
            .session
            .wait_for_login(driver.as_ref(), std::time::Duration::from_secs(timeout_secs))
            .await?;
        self.authenticated = ok;
        Ok(ok)
    }

    /// 提取单个号码，永远返回结果对象
    pub async fn extract_one(&mut self, request: &ExtractionRequest) -> ExtractionResult {
        self.extract_at(request, 1, 1, Mode::Automatic).await
    }

    /// 人工引导采集：等操作员把目标联系人的面板调出来后读取
    pub async fn extract_manual(&mut self, request: &ExtractionRequest) -> ExtractionResult {
        self.extract_at(request, 1, 1, Mode::OperatorGuided).await
    }

    /// 顺序处理批量号码，结果与输入顺序一致
    pub async fn extract_batch(&mut self, requests: &[ExtractionRequest]) -> BatchReport {
        self.extract_batch_with_progress(requests, |_, _, _| {}).await
    }

    /// 同 `extract_batch`，每处理完一个号码调用一次 `on_progress(序号, 总数, 结果)`
    pub async fn extract_batch_with_progress<F>(
        &mut self,
        requests: &[ExtractionRequest],
        mut on_progress: F,
    ) -> BatchReport
    where
        F: FnMut(usize, usize, &ExtractionResult),
    {
        let total = requests.len();
        logging::log_batch_start(total);

        let mut report = BatchReport::default();
        for (i, request) in requests.iter().enumerate() {
            let result = self.extract_at(request, i + 1, total, Mode::Automatic).await;
            on_progress(i + 1, total, &result);
            report.push(result);
        }

        logging::log_batch_stats(&report);
        report
    }

    /// 保存最终会话并释放浏览器
    pub async fn close_session(&mut self) -> AppResult<()> {
        let Some(driver) = self.driver.take() else {
            return Ok(());
        };
        if self.authenticated {
            if let Err(e) = self.session.persist(driver.as_ref()).await {
                warn!("关闭前保存会话失败: {}", e);
            }
        }
        self.authenticated = false;
        driver.close().await?;
        info!("✓ 浏览器已关闭");
        Ok(())
    }

    async fn extract_at(
        &mut self,
        request: &ExtractionRequest,
        index: usize,
        total: usize,
        mode: Mode,
    ) -> ExtractionResult {
        let ctx = ExtractionCtx::new(
            index,
            total,
            request.identifier().clone(),
            request.correlation_tag().map(str::to_string),
        );
        let report = self.attempt(&ctx, mode).await;
        let result = ExtractionResult::from_classification(request, classify(&ctx.identifier, &report), Utc::now());

        logging::log_item_result(&ctx, &result);
        notify(self.audit.as_ref(), &result).await;
        result
    }

    /// 运行一次尝试；浏览器故障或登录态失效时恢复后再试一次
    async fn attempt(&mut self, ctx: &ExtractionCtx, mode: Mode) -> PhaseReport {
        if mode == Mode::OperatorGuided {
            if let Some(prompt) = &self.operator {
                if !prompt.confirm_ready(&ctx.identifier).await {
                    return note("操作员放弃");
                }
            }
        }

        let mut recovered = false;
        loop {
            let driver = match self.ready_driver(ctx).await {
                Ok(driver) => driver,
                Err(report) => return report,
            };
            let outcome = match mode {
                Mode::Automatic => self.flow.run(driver.as_ref(), ctx, &mut self.limiter).await,
                Mode::OperatorGuided => self.flow.capture_current(driver.as_ref(), ctx).await,
            };

            let interrupt = match outcome {
                Ok(report) => return report,
                Err(interrupt) => interrupt,
            };
            if recovered {
                return settle_interrupt(interrupt);
            }
            recovered = true;

            match interrupt {
                FlowInterrupt::BrowserFault { report, error } => {
                    warn!("{} ⚠️ 浏览器失去响应 ({})，重启后重试", ctx, error);
                    if let Err(e) = self.restart_browser().await {
                        warn!("{} ❌ 浏览器重启失败: {}", ctx, e);
                        return with_note(report, format!("{}; 重启失败: {}", error, e));
                    }
                }
                FlowInterrupt::SessionLost { report } => {
                    warn!("{} ⚠️ 登录态失效，重新建立会话后重试", ctx);
                    self.authenticated = false;
                    if let Err(e) = self.init_session().await {
                        warn!("{} ❌ 重新建立会话失败: {}", ctx, e);
                        return with_note(report, e.to_string());
                    }
                }
            }
        }
    }

    /// 确保有可用且已登录的页面；不满足时直接给出本次尝试的阶段报告
    async fn ready_driver(&mut self, ctx: &ExtractionCtx) -> Result<Arc<dyn PageDriver>, PhaseReport> {
        match self.driver.clone() {
            None => {
                if let Err(e) = self.init_session().await {
                    warn!("{} ❌ 浏览器启动失败: {}", ctx, e);
                    return Err(note(format!("浏览器启动失败: {}", e)));
                }
            }
            Some(driver) => {
                if !is_alive(driver.as_ref()).await {
                    warn!("{} ⚠️ 浏览器存活探测失败，重启浏览器", ctx);
                    if let Err(e) = self.restart_browser().await {
                        return Err(note(format!("浏览器重启失败: {}", e)));
                    }
                }
            }
        }

        if !self.authenticated {
            return Err(PhaseReport {
                navigation: Some(NavOutcome::StillAuthenticating),
                note: Some("会话未登录".to_string()),
                ..PhaseReport::default()
            });
        }
        self.driver
            .clone()
            .ok_or_else(|| note(BrowserError::NotStarted.to_string()))
    }

    async fn ensure_browser(&mut self) -> AppResult<Arc<dyn PageDriver>> {
        if let Some(driver) = &self.driver {
            return Ok(driver.clone());
        }
        info!("🌐 正在启动浏览器 ({:?} 模式)...", self.config.browser_mode);
        let driver = self.launcher.launch().await?;
        self.driver = Some(driver.clone());
        Ok(driver)
    }

    /// 关闭旧页面，启动新浏览器并通过会话快照恢复登录态
    async fn restart_browser(&mut self) -> AppResult<()> {
        if let Some(old) = self.driver.take() {
            if let Err(e) = old.close().await {
                warn!("关闭旧浏览器失败: {}", e);
            }
        }
        self.authenticated = false;
        let init = self.init_session().await?;
        if init.already_authenticated {
            info!("✓ 浏览器已重启，会话已恢复");
        } else {
            warn!("⚠️ 浏览器已重启，但会话未能恢复，需要重新扫码");
        }
        Ok(())
    }
}

fn note(text: impl Into<String>) -> PhaseReport {
    PhaseReport {
        note: Some(text.into()),
        ..PhaseReport::default()
    }
}

fn with_note(mut report: PhaseReport, text: String) -> PhaseReport {
    report.note = Some(text);
    report
}

/// 恢复后仍被打断，把当时的阶段报告作为最终结果
fn settle_interrupt(interrupt: FlowInterrupt) -> PhaseReport {
    match interrupt {
        FlowInterrupt::BrowserFault { report, error } => with_note(report, error),
        FlowInterrupt::SessionLost { report } => report,
    }
}
