//! 第二层：截图文字识别
//!
//! 只截取面板区域，按比例切出名称带、签名带和头像区域。
//! 区域按比例而不是像素定义，对布局漂移更宽容。

use std::io::Cursor;
use std::process::Stdio;

use async_trait::async_trait;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult, OcrError};
use crate::infrastructure::{eval_as, scripts, ElementBox};
use crate::models::{Region, Tier};
use crate::services::tiers::{ExtractionTier, ProfileFields, TierContext, TierStatus};

/// 文字识别引擎
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, png: &[u8]) -> Result<String, OcrError>;
}

/// 调用本机 tesseract 命令行
pub struct TesseractCli {
    binary: String,
    lang: String,
}

impl TesseractCli {
    pub fn new(binary: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            lang: lang.into(),
        }
    }
}

#[async_trait]
impl OcrEngine for TesseractCli {
    async fn recognize(&self, png: &[u8]) -> Result<String, OcrError> {
        let spawn_failed = |source| OcrError::SpawnFailed {
            binary: self.binary.clone(),
            source,
        };
        let mut child = Command::new(&self.binary)
            .args(["stdin", "stdout", "-l", &self.lang, "--psm", "6"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_failed)?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(png).await.map_err(spawn_failed)?;
        }
        let output = child.wait_with_output().await.map_err(spawn_failed)?;
        if !output.status.success() {
            return Err(OcrError::ProcessFailed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

pub struct RenderedTextTier {
    engine: Box<dyn OcrEngine>,
}

impl RenderedTextTier {
    pub fn new(engine: Box<dyn OcrEngine>) -> Self {
        Self { engine }
    }

    /// 放大两倍灰度图后识别，小字号识别率更高
    async fn read_region(&self, panel: &DynamicImage, region: Region) -> Result<Option<String>, OcrError> {
        let Some(band) = crop(panel, region) else {
            return Err(OcrError::InvalidRegion(format!("{:?}", region)));
        };
        let enlarged = band
            .grayscale()
            .resize(band.width() * 2, band.height() * 2, FilterType::Triangle);
        let png = encode_png(&enlarged).map_err(|e| OcrError::InvalidRegion(e.to_string()))?;
        let text = self.engine.recognize(&png).await?;
        Ok(Some(text).filter(|t| !t.trim().is_empty()))
    }
}

#[async_trait]
impl ExtractionTier for RenderedTextTier {
    fn tier(&self) -> Tier {
        Tier::RenderedText
    }

    async fn extract(&self, ctx: &TierContext<'_>) -> AppResult<TierStatus> {
        let rect = eval_as::<Option<ElementBox>>(ctx.driver, &scripts::panel_rect(&ctx.resources.selectors)).await?;
        let Some(rect) = rect.filter(ElementBox::is_visible) else {
            return Ok(TierStatus::Failed("面板区域不可见".to_string()));
        };
        let png = ctx.driver.screenshot(Some(rect)).await?;
        let panel = match image::load_from_memory(&png) {
            Ok(img) => img,
            Err(e) => return Ok(TierStatus::Failed(format!("面板截图无法解码: {}", e))),
        };

        let regions = &ctx.resources.ocr_regions;
        let filter = &ctx.resources.filter;
        let identifier = ctx.panel.identifier();
        let mut errors = Vec::new();

        let name_text = self.read_region(&panel, regions.name_band.full_width()).await;
        let about_text = self.read_region(&panel, regions.about_band.full_width()).await;
        let name = match name_text {
            Ok(text) => text
                .map(|t| filter.strip_ocr_artifacts(&t))
                .and_then(|t| t.lines().next().map(str::to_string))
                .and_then(|t| filter.clean_name(&t, identifier)),
            Err(e) => {
                errors.push(e.to_string());
                None
            }
        };
        let about = match about_text {
            Ok(text) => text
                .map(|t| filter.strip_ocr_artifacts(&t).replace('\n', " "))
                .and_then(|t| filter.clean_about(&t, identifier)),
            Err(e) => {
                errors.push(e.to_string());
                None
            }
        };
        debug!("OCR 结果: 名称 {:?} / 签名 {:?}", name, about);

        let avatar_region = if ctx.want_avatar { crop(&panel, regions.avatar) } else { None };
        let avatar = match avatar_region {
            Some(region) if luminance_stddev(&region) >= regions.avatar_min_stddev => {
                match ctx.resources.avatars.save_image(identifier, &region).await {
                    Ok(path) => Some(path),
                    Err(e) => {
                        warn!("OCR 头像保存失败: {}", e);
                        None
                    }
                }
            }
            Some(_) => {
                debug!("头像区域接近纯色，视为占位图");
                None
            }
            None => None,
        };

        let fields = ProfileFields { name, about, avatar };
        if fields.is_empty() && errors.len() == 2 {
            return Ok(TierStatus::Failed(errors.join("; ")));
        }
        Ok(TierStatus::from_fields(fields, false))
    }
}

/// 按比例裁剪；区域退化为空时返回 None
pub(crate) fn crop(img: &DynamicImage, region: Region) -> Option<DynamicImage> {
    let (w, h) = img.dimensions();
    let x0 = (region.left * w as f64).floor() as u32;
    let y0 = (region.top * h as f64).floor() as u32;
    let x1 = ((region.right * w as f64).ceil() as u32).min(w);
    let y1 = ((region.bottom * h as f64).ceil() as u32).min(h);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(img.crop_imm(x0, y0, x1 - x0, y1 - y0))
}

/// 灰度标准差，用来区分真实头像和纯色占位
pub(crate) fn luminance_stddev(img: &DynamicImage) -> f64 {
    let luma = img.to_luma8();
    let n = (luma.width() as f64) * (luma.height() as f64);
    if n == 0.0 {
        return 0.0;
    }
    let mean = luma.pixels().map(|p| p.0[0] as f64).sum::<f64>() / n;
    let var = luma
        .pixels()
        .map(|p| {
            let d = p.0[0] as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    var.sqrt()
}

fn encode_png(img: &DynamicImage) -> AppResult<Vec<u8>> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(AppError::from)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::fake_page::FakePage;
    use crate::infrastructure::scripts::markers;
    use crate::services::avatar_store::png_bytes;
    use crate::services::tiers::test_support::{panel, resources};
    use serde_json::json;
    use std::sync::Mutex;

    /// 按调用顺序返回预设文本
    struct ScriptedOcr {
        replies: Mutex<Vec<Result<String, OcrError>>>,
    }

    impl ScriptedOcr {
        fn new(replies: Vec<Result<String, OcrError>>) -> Self {
            Self { replies: Mutex::new(replies) }
        }
    }

    #[async_trait]
    impl OcrEngine for ScriptedOcr {
        async fn recognize(&self, _png: &[u8]) -> Result<String, OcrError> {
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                Ok(String::new())
            } else {
                replies.remove(0)
            }
        }
    }

    /// 头像区域画成棋盘格，其它区域纯白
    fn panel_png() -> Vec<u8> {
        png_bytes(200, 400, |x, y| {
            let in_avatar = (60..140).contains(&x) && (8..60).contains(&y);
            if in_avatar && (x / 8 + y / 8) % 2 == 0 {
                [20, 20, 20]
            } else {
                [250, 250, 250]
            }
        })
    }

    fn page_with_panel(png: Vec<u8>) -> FakePage {
        let page = FakePage::new();
        page.with_screenshot(png)
            .on(markers::PANEL_RECT, json!({ "x": 800.0, "y": 0.0, "width": 200.0, "height": 400.0 }));
        page
    }

    #[tokio::test]
    async fn bands_are_read_filtered_and_avatar_saved() {
        let dir = tempfile::tempdir().unwrap();
        let resources = resources(dir.path());
        let panel = panel();
        let page = page_with_panel(panel_png());
        let tier = RenderedTextTier::new(Box::new(ScriptedOcr::new(vec![
            Ok("|| Priya Sharma\n".to_string()),
            Ok("Hey there!\nI am busy ~~".to_string()),
        ])));
        let ctx = TierContext::new(&page, &panel, &resources);

        let TierStatus::Extracted(fields) = tier.extract(&ctx).await.unwrap() else {
            panic!("expected fields");
        };
        assert_eq!(fields.name.as_deref(), Some("Priya Sharma"));
        assert_eq!(fields.about.as_deref(), Some("Hey there! I am busy"));
        assert_eq!(fields.avatar, Some(dir.path().join("917415337302.jpg")));
    }

    #[tokio::test]
    async fn blank_avatar_region_is_not_saved() {
        let dir = tempfile::tempdir().unwrap();
        let resources = resources(dir.path());
        let panel = panel();
        let page = page_with_panel(png_bytes(200, 400, |_, _| [240, 240, 240]));
        let tier = RenderedTextTier::new(Box::new(ScriptedOcr::new(vec![
            Ok("Priya".to_string()),
            Ok(String::new()),
        ])));
        let ctx = TierContext::new(&page, &panel, &resources);

        let TierStatus::Extracted(fields) = tier.extract(&ctx).await.unwrap() else {
            panic!("expected fields");
        };
        assert_eq!(fields.name.as_deref(), Some("Priya"));
        assert_eq!(fields.avatar, None);
    }

    #[tokio::test]
    async fn engine_failure_on_every_band_fails_the_tier() {
        let dir = tempfile::tempdir().unwrap();
        let resources = resources(dir.path());
        let panel = panel();
        let page = page_with_panel(png_bytes(200, 400, |_, _| [240, 240, 240]));
        let failed = || Err(OcrError::ProcessFailed { code: Some(1), stderr: "no lang".to_string() });
        let tier = RenderedTextTier::new(Box::new(ScriptedOcr::new(vec![failed(), failed()])));
        let ctx = TierContext::new(&page, &panel, &resources);

        assert!(matches!(tier.extract(&ctx).await.unwrap(), TierStatus::Failed(_)));
    }

    #[test]
    fn crop_uses_proportions() {
        let img = image::load_from_memory(&png_bytes(200, 400, |_, _| [0, 0, 0])).unwrap();
        let band = crop(&img, Region { left: 0.0, top: 0.15, right: 1.0, bottom: 0.30 }).unwrap();
        assert_eq!(band.dimensions(), (200, 60));
        assert!(crop(&img, Region { left: 0.5, top: 0.5, right: 0.5, bottom: 0.6 }).is_none());
    }

    #[test]
    fn flat_image_has_zero_stddev() {
        let img = image::load_from_memory(&png_bytes(10, 10, |_, _| [128, 128, 128])).unwrap();
        assert_eq!(luminance_stddev(&img), 0.0);
    }
}
