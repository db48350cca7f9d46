use crate::models::identifier::IdentifierValidator;
use crate::models::request::ExtractionRequest;
use crate::models::tuning::Tuning;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::fs;

/// 批量输入文件
///
/// ```toml
/// case_ref = "CASE-2024-017"
/// identifiers = ["+91 74153 37302", "4915112345678"]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct BatchFile {
    #[serde(default)]
    pub case_ref: Option<String>,
    pub identifiers: Vec<String>,
    #[serde(skip)]
    pub file_path: Option<String>,
}

/// 被校验器拒绝的输入
#[derive(Debug, Clone)]
pub struct RejectedInput {
    pub raw: String,
    pub reason: String,
}

impl BatchFile {
    /// 校验所有号码，按输入顺序返回请求；重复号码只保留第一次
    pub fn into_requests(
        self,
        validator: &dyn IdentifierValidator,
    ) -> (Vec<ExtractionRequest>, Vec<RejectedInput>) {
        let mut requests: Vec<ExtractionRequest> = Vec::new();
        let mut rejected = Vec::new();

        for raw in self.identifiers {
            match ExtractionRequest::parse(&raw, self.case_ref.clone(), validator) {
                Ok(request) => {
                    if requests.iter().any(|r| r.identifier() == request.identifier()) {
                        tracing::debug!("跳过重复号码: {}", raw);
                        continue;
                    }
                    requests.push(request);
                }
                Err(e) => rejected.push(RejectedInput {
                    raw,
                    reason: e.to_string(),
                }),
            }
        }

        (requests, rejected)
    }
}

/// 从 TOML 文件加载批量输入
pub async fn load_batch_file(path: &Path) -> Result<BatchFile> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("无法读取TOML文件: {}", path.display()))?;

    let mut batch: BatchFile = toml::from_str(&content)
        .with_context(|| format!("无法解析TOML文件: {}", path.display()))?;

    batch.file_path = Some(path.to_string_lossy().to_string());

    Ok(batch)
}

/// 加载批量输入：可以是单个文件，也可以是包含多个 TOML 文件的文件夹
pub async fn load_batch_inputs(path: &str) -> Result<Vec<BatchFile>> {
    let target = PathBuf::from(path);

    if !target.exists() {
        anyhow::bail!("批量输入不存在: {}", path);
    }

    if target.is_file() {
        return Ok(vec![load_batch_file(&target).await?]);
    }

    let mut files = Vec::new();
    let mut entries = fs::read_dir(&target)
        .await
        .with_context(|| format!("无法读取文件夹: {}", path))?;

    while let Some(entry) = entries.next_entry().await? {
        let entry_path = entry.path();
        if entry_path.extension().and_then(|s| s.to_str()) == Some("toml") {
            files.push(entry_path);
        }
    }
    // 文件夹遍历顺序不稳定，按文件名排序保证批次顺序可复现
    files.sort();

    let mut batches = Vec::new();
    for file in files {
        tracing::info!(
            "正在加载: {}",
            file.file_name().unwrap_or_default().to_string_lossy()
        );
        match load_batch_file(&file).await {
            Ok(batch) => {
                tracing::info!("成功加载 {} 个号码", batch.identifiers.len());
                batches.push(batch);
            }
            Err(e) => {
                tracing::warn!("加载文件失败 {}: {}", file.display(), e);
            }
        }
    }

    Ok(batches)
}

/// 加载调优文件；未配置时使用默认值
pub async fn load_tuning(path: Option<&str>) -> Result<Tuning> {
    let Some(path) = path else {
        return Ok(Tuning::default());
    };

    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("无法读取调优文件: {}", path))?;
    let tuning: Tuning =
        toml::from_str(&content).with_context(|| format!("无法解析调优文件: {}", path))?;
    tuning
        .validate()
        .with_context(|| format!("调优文件不合法: {}", path))?;

    Ok(tuning)
}
