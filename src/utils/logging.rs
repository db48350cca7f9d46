//! 日志工具模块
//!
//! 提供运行日志头、批次进度和统计输出的辅助函数

use anyhow::{Context, Result};
use std::fs;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::models::{BatchReport, ExtractionOutcome, ExtractionResult, Tier};
use crate::workflow::ExtractionCtx;

/// 初始化日志文件
///
/// # 参数
/// - `log_file_path`: 日志文件路径
pub fn init_log_file(log_file_path: &str) -> Result<()> {
    let log_header = format!(
        "{}\n号码资料提取日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header).with_context(|| format!("无法写入日志文件 {}", log_file_path))?;
    Ok(())
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 号码资料提取");
    info!("🌐 客户端: {} ({:?} 模式)", config.web_url, config.browser_mode);
    info!(
        "⏱️ 请求间隔: {}-{} ms，导航重试 {} 次",
        config.min_delay_ms, config.max_delay_ms, config.navigation_retries
    );
    if config.manual_mode {
        info!("🙋 手动采集模式");
    }
    info!("{}", "=".repeat(60));
}

/// 记录批次开始信息
///
/// # 参数
/// - `total`: 号码总数
pub fn log_batch_start(total: usize) {
    info!("\n{}", "=".repeat(60));
    info!("📦 开始处理 {} 个号码（严格顺序）", total);
    info!("{}", "=".repeat(60));
}

/// 记录单个号码的最终结果
pub fn log_item_result(ctx: &ExtractionCtx, result: &ExtractionResult) {
    let tiers: Vec<&str> = result
        .provenance
        .contributing_tiers()
        .into_iter()
        .map(Tier::label)
        .collect();
    match result.outcome {
        outcome if outcome.carries_fields() => info!(
            "{} ✅ {} 名称: {} | 签名: {} | 头像: {} | 来源: {}",
            ctx,
            result.outcome,
            result.display_name.as_deref().unwrap_or("-"),
            truncate_text(result.about.as_deref().unwrap_or("-"), 40),
            if result.avatar_path.is_some() { "有" } else { "无" },
            tiers.join("+")
        ),
        ExtractionOutcome::VerificationMismatch => error!(
            "{} ❌ {}: {}",
            ctx,
            result.outcome,
            result.diagnostic.as_deref().unwrap_or_default()
        ),
        _ => warn!(
            "{} ⚠️ {}: {}",
            ctx,
            result.outcome,
            result.diagnostic.as_deref().unwrap_or_default()
        ),
    }
}

/// 记录批次统计：每种结果和每个层级的数量
pub fn log_batch_stats(report: &BatchReport) {
    info!("\n{}", "─".repeat(60));
    info!("📊 批次完成: 共 {} 个号码", report.results.len());
    for (outcome, count) in &report.outcome_counts {
        info!("  {}: {}", outcome, count);
    }
    for (tier, count) in &report.tier_stats {
        info!("  [{}] 提供字段: {}", tier.label(), count);
    }
    info!("{}", "─".repeat(60));
}

/// 打印最终统计信息
///
/// # 参数
/// - `report`: 批次报告
/// - `output_file`: 结果文件路径
/// - `log_file_path`: 日志文件路径
pub fn print_final_stats(report: &BatchReport, output_file: &str, log_file_path: &str) {
    let total = report.results.len();
    let with_fields = report.results.iter().filter(|r| r.outcome.carries_fields()).count();
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 取得资料: {}/{}", with_fields, total);
    info!("🚫 未注册: {}", report.count(ExtractionOutcome::NotRegistered));
    info!("🔒 受限: {}", report.count(ExtractionOutcome::Blocked));
    info!(
        "❌ 失败: {}",
        total - with_fields - report.count(ExtractionOutcome::NotRegistered) - report.count(ExtractionOutcome::Blocked)
    );
    info!("{}", "=".repeat(60));
    info!("\n结果已保存至: {}", output_file);
    info!("日志已保存至: {}", log_file_path);
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
