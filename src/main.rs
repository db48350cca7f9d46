use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use contact_profiler::logger;
use contact_profiler::models::{load_batch_inputs, load_tuning, BatchReport, ExtractionRequest, Identifier};
use contact_profiler::services::OperatorPrompt;
use contact_profiler::utils::logging;
use contact_profiler::{ChromeLauncher, Collaborators, Config, E164Validator, ExtractionOrchestrator};

/// 登录二维码的保存位置
const LOGIN_QR_FILE: &str = "login_qr.png";

/// 在终端等待操作员确认
struct StdinPrompt;

#[async_trait]
impl OperatorPrompt for StdinPrompt {
    async fn confirm_ready(&self, identifier: &Identifier) -> bool {
        println!(
            "\n🙋 请在浏览器中打开 {} 的联系人详情面板，完成后按回车（输入 q 跳过）:",
            identifier
        );
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        match lines.next_line().await {
            Ok(Some(line)) => !line.trim().eq_ignore_ascii_case("q"),
            _ => false,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::from_env();
    config.validate()?;

    // 初始化日志
    logging::init_log_file(&config.output_log_file)?;
    logger::init(config.verbose_logging, Some(&config.output_log_file));
    logging::log_startup(&config);

    let tuning = load_tuning(config.tuning_file.as_deref()).await?;
    let operator: Option<Arc<dyn OperatorPrompt>> = if config.operator_assist || config.manual_mode {
        Some(Arc::new(StdinPrompt))
    } else {
        None
    };

    let mut orchestrator = ExtractionOrchestrator::new(
        config.clone(),
        tuning,
        Arc::new(ChromeLauncher::new(config.clone())),
        Collaborators::from_config(&config, operator),
    )?;

    // 登录
    let init = orchestrator.init_session().await?;
    if !init.already_authenticated {
        if let Some(challenge) = &init.login_challenge {
            tokio::fs::write(LOGIN_QR_FILE, &challenge.png)
                .await
                .with_context(|| format!("无法写入二维码文件 {}", LOGIN_QR_FILE))?;
            info!("📱 登录二维码已保存至 {}，请用手机扫码", LOGIN_QR_FILE);
        } else {
            info!("📱 请在浏览器窗口中扫码登录");
        }
        if !orchestrator.await_login(config.login_timeout_secs).await? {
            orchestrator.close_session().await?;
            anyhow::bail!("{} 秒内未完成登录", config.login_timeout_secs);
        }
    }

    // 加载号码
    let requests = load_requests(&config.batch_file).await?;
    if requests.is_empty() {
        warn!("⚠️ 没有找到待处理的号码，程序结束");
        orchestrator.close_session().await?;
        return Ok(());
    }

    // 处理
    let report = if config.manual_mode {
        let mut report = BatchReport::default();
        for request in &requests {
            report.push(orchestrator.extract_manual(request).await);
        }
        report
    } else {
        orchestrator
            .extract_batch_with_progress(&requests, |index, total, result| {
                info!("⏳ 进度 {}/{}: {} → {}", index, total, result.identifier, result.outcome);
            })
            .await
    };

    let json = serde_json::to_string_pretty(&report)?;
    tokio::fs::write(&config.output_file, json)
        .await
        .with_context(|| format!("无法写入结果文件 {}", config.output_file))?;

    logging::print_final_stats(&report, &config.output_file, &config.output_log_file);
    orchestrator.close_session().await?;
    Ok(())
}

/// 读取批量文件，校验号码；不合法的号码只记录警告
async fn load_requests(batch_file: &str) -> Result<Vec<ExtractionRequest>> {
    let validator = E164Validator::default();
    let mut requests = Vec::new();
    for batch in load_batch_inputs(batch_file).await? {
        let (accepted, rejected) = batch.into_requests(&validator);
        for r in rejected {
            warn!("⚠️ 跳过号码 '{}': {}", r.raw, r.reason);
        }
        requests.extend(accepted);
    }
    info!("✓ 共 {} 个待处理号码", requests.len());
    Ok(requests)
}
