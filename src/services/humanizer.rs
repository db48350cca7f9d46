//! 拟人化操作 - 业务能力层
//!
//! 导航前随机移动鼠标并短暂停顿

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use tokio::time::sleep;
use tracing::debug;

use crate::error::AppResult;
use crate::infrastructure::{eval_as, scripts, PageDriver};

#[derive(Debug, Deserialize)]
struct ViewportSize {
    w: f64,
    h: f64,
}

pub struct Humanizer {
    rng: StdRng,
    pause_ms: (u64, u64),
}

impl Humanizer {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            pause_ms: (300, 1_200),
        }
    }

    #[cfg(test)]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            pause_ms: (300, 1_200),
        }
    }

    /// 在视口顶部区域随机移动一次鼠标，然后停顿
    pub async fn before_navigation(&mut self, driver: &dyn PageDriver) -> AppResult<()> {
        let size = eval_as::<Option<ViewportSize>>(driver, &scripts::viewport())
            .await?
            .unwrap_or(ViewportSize { w: 1366.0, h: 900.0 });
        let x = self.rng.gen_range(100.0..(size.w - 100.0).max(101.0));
        let y = self.rng.gen_range(20.0..(size.h * 0.15).max(21.0));

        if let Err(e) = driver.move_mouse(x, y).await {
            if e.is_browser_fault() {
                return Err(e);
            }
            debug!("鼠标移动失败: {}", e);
        }

        let pause = Duration::from_millis(self.rng.gen_range(self.pause_ms.0..=self.pause_ms.1));
        sleep(pause).await;
        Ok(())
    }
}

impl Default for Humanizer {
    fn default() -> Self {
        Self::new()
    }
}
