//! 头像保存 - 业务能力层
//!
//! 头像来源可能是 data URI、CDN 地址或页面内的 blob，统一转成 JPEG，
//! 按号码保存到固定路径

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine as _;
use image::{DynamicImage, ImageFormat};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, REFERER, USER_AGENT};
use tracing::{debug, info, warn};

use crate::browser::DESKTOP_USER_AGENT;
use crate::error::{AppError, AppResult, FileError};
use crate::infrastructure::{eval_as, scripts, PageDriver};
use crate::models::Identifier;

/// 小于等于这个字节数的下载结果视为错误页而不是图片
const MIN_DOWNLOAD_BYTES: usize = 100;

pub struct AvatarStore {
    dir: PathBuf,
    http: reqwest::Client,
}

impl AvatarStore {
    pub fn new(dir: impl Into<PathBuf>, referer: &str) -> AppResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(DESKTOP_USER_AGENT));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("image/avif,image/webp,image/apng,image/*,*/*;q=0.8"),
        );
        if let Ok(value) = HeaderValue::from_str(referer) {
            headers.insert(REFERER, value);
        }
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            dir: dir.into(),
            http,
        })
    }

    /// 号码对应的固定保存路径
    pub fn path_for(&self, identifier: &Identifier) -> PathBuf {
        self.dir.join(format!("{}.jpg", identifier.as_str()))
    }

    /// 按地址类型取回图片并保存；不支持的地址返回 `Ok(None)`
    pub async fn save_from_src(
        &self,
        driver: &dyn PageDriver,
        identifier: &Identifier,
        src: &str,
    ) -> AppResult<Option<PathBuf>> {
        let bytes = if src.starts_with("data:") {
            decode_data_uri(src)?
        } else if src.starts_with("http://") || src.starts_with("https://") {
            self.download(src).await?
        } else if src.starts_with("blob:") {
            let data_uri = eval_as::<Option<String>>(driver, &scripts::blob_to_data_url(src))
                .await?
                .ok_or_else(|| AppError::File(FileError::DownloadFailed {
                    url: src.to_string(),
                    reason: "页面内读取 blob 失败".to_string(),
                }))?;
            decode_data_uri(&data_uri)?
        } else {
            debug!("不支持的头像地址: {}", src);
            return Ok(None);
        };

        let image = image::load_from_memory(&bytes)?;
        self.save_image(identifier, &image).await.map(Some)
    }

    async fn download(&self, url: &str) -> AppResult<Vec<u8>> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::File(FileError::DownloadFailed {
                url: url.to_string(),
                reason: format!("HTTP {}", status),
            }));
        }
        let bytes = response.bytes().await?;
        if bytes.len() <= MIN_DOWNLOAD_BYTES {
            return Err(AppError::File(FileError::DownloadFailed {
                url: url.to_string(),
                reason: format!("响应只有 {} 字节", bytes.len()),
            }));
        }
        Ok(bytes.to_vec())
    }

    /// 转成 RGB JPEG，先写临时文件再重命名
    pub async fn save_image(&self, identifier: &Identifier, image: &DynamicImage) -> AppResult<PathBuf> {
        let mut jpeg = Vec::new();
        DynamicImage::ImageRgb8(image.to_rgb8()).write_to(&mut Cursor::new(&mut jpeg), ImageFormat::Jpeg)?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| AppError::file_write_failed(self.dir.display().to_string(), e))?;
        let path = self.path_for(identifier);
        write_atomically(&path, &jpeg).await?;

        info!("🖼️ 头像已保存: {}", path.display());
        Ok(path)
    }

    /// 保存失败只记日志，返回 None
    pub async fn save_from_src_quietly(
        &self,
        driver: &dyn PageDriver,
        identifier: &Identifier,
        src: &str,
    ) -> AppResult<Option<PathBuf>> {
        match self.save_from_src(driver, identifier, src).await {
            Ok(path) => Ok(path),
            Err(e) if e.is_browser_fault() => Err(e),
            Err(e) => {
                warn!("头像保存失败 {}: {}", identifier, e);
                Ok(None)
            }
        }
    }
}

pub(crate) fn decode_data_uri(uri: &str) -> AppResult<Vec<u8>> {
    let (header, payload) = uri
        .split_once(',')
        .ok_or_else(|| AppError::Other("data URI 缺少逗号分隔".to_string()))?;
    if !header.ends_with(";base64") {
        return Err(AppError::Other(format!("不支持的 data URI 编码: {}", header)));
    }
    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| AppError::Other(format!("data URI 解码失败: {}", e)))
}

async fn write_atomically(path: &Path, bytes: &[u8]) -> AppResult<()> {
    let tmp = path.with_extension("jpg.tmp");
    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|e| AppError::file_write_failed(tmp.display().to_string(), e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| AppError::file_write_failed(path.display().to_string(), e))?;
    Ok(())
}

#[cfg(test)]
pub(crate) fn png_bytes(width: u32, height: u32, paint: impl Fn(u32, u32) -> [u8; 3]) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| image::Rgb(paint(x, y)));
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

#[cfg(test)]
pub(crate) fn png_data_uri(width: u32, height: u32) -> String {
    let png = png_bytes(width, height, |x, y| [(x * 30) as u8, (y * 30) as u8, 90]);
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(png)
    )
}
