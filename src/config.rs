use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// 浏览器获取方式
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BrowserMode {
    /// 自行启动 Chromium（持久化用户目录）
    Launch,
    /// 连接已经打开的浏览器调试端口
    Connect,
}

impl FromStr for BrowserMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "launch" => Ok(BrowserMode::Launch),
            "connect" => Ok(BrowserMode::Connect),
            other => Err(format!("未知的浏览器模式: {}", other)),
        }
    }
}

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 网页客户端地址
    pub web_url: String,
    /// 浏览器获取方式
    pub browser_mode: BrowserMode,
    /// 浏览器调试端口（connect 模式）
    pub browser_debug_port: u16,
    /// Chromium 可执行文件路径（为空时自动探测）
    pub chrome_executable: Option<String>,
    /// 是否无头运行
    pub headless: bool,
    /// 持久化浏览器用户目录
    pub profile_dir: String,
    /// 会话快照文件
    pub session_file: String,
    /// 会话空闲多久后视为可能过期（小时）
    pub session_max_idle_hours: i64,
    /// 头像保存目录
    pub avatar_dir: String,
    /// 调试截图目录
    pub debug_dir: String,
    /// 面板打不开时是否保存截图和 HTML
    pub capture_debug_artifacts: bool,
    // --- 节奏控制 ---
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_ms: u64,
    pub backoff_base_ms: u64,
    pub backoff_ceiling_ms: u64,
    /// 导航阶段最多重试次数
    pub navigation_retries: u32,
    /// 面板阶段最多重试次数
    pub panel_retries: u32,
    // --- 超时 ---
    pub navigation_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub strategy_timeout_ms: u64,
    pub panel_wait_ms: u64,
    pub tier_timeout_secs: u64,
    pub login_timeout_secs: u64,
    /// 单次页面调用的时限，超过即视为浏览器无响应
    pub browser_call_timeout_secs: u64,
    /// 面板左边界阈值，超过此横坐标的 header 视为会话区域
    pub layout_split_x: f64,
    // --- OCR ---
    pub ocr_binary: String,
    pub ocr_lang: String,
    /// 是否在自动层级全部失败后请求人工协助
    pub operator_assist: bool,
    /// 可选的 TOML 调优文件（选择器 / OCR 区域 / 过滤规则）
    pub tuning_file: Option<String>,
    // --- 输入输出 ---
    pub batch_file: String,
    pub output_file: String,
    pub audit_log_file: String,
    pub output_log_file: String,
    /// 是否逐号码手动采集
    pub manual_mode: bool,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            web_url: "https://web.whatsapp.com".to_string(),
            browser_mode: BrowserMode::Launch,
            browser_debug_port: 9222,
            chrome_executable: None,
            headless: false,
            profile_dir: "data/whatsapp_profile".to_string(),
            session_file: "data/whatsapp_session.json".to_string(),
            session_max_idle_hours: 72,
            avatar_dir: "uploads/whatsapp/profiles".to_string(),
            debug_dir: "reports".to_string(),
            capture_debug_artifacts: true,
            min_delay_ms: 3_000,
            max_delay_ms: 6_000,
            jitter_ms: 750,
            backoff_base_ms: 2_000,
            backoff_ceiling_ms: 30_000,
            navigation_retries: 2,
            panel_retries: 1,
            navigation_timeout_secs: 15,
            poll_interval_ms: 500,
            strategy_timeout_ms: 5_000,
            panel_wait_ms: 4_000,
            tier_timeout_secs: 20,
            login_timeout_secs: 300,
            browser_call_timeout_secs: 30,
            layout_split_x: 300.0,
            ocr_binary: "tesseract".to_string(),
            ocr_lang: "eng".to_string(),
            operator_assist: false,
            tuning_file: None,
            batch_file: "batch.toml".to_string(),
            output_file: "results.json".to_string(),
            audit_log_file: "audit.jsonl".to_string(),
            output_log_file: "output.txt".to_string(),
            manual_mode: false,
            verbose_logging: false,
        }
    }
}

/// 读取并解析环境变量，缺失或解析失败时使用默认值
fn env_or<T: FromStr>(var_name: &str, default: T) -> T {
    std::env::var(var_name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            web_url: env_or("WEB_URL", default.web_url),
            browser_mode: env_or("BROWSER_MODE", default.browser_mode),
            browser_debug_port: env_or("BROWSER_DEBUG_PORT", default.browser_debug_port),
            chrome_executable: std::env::var("CHROME_EXECUTABLE").ok().or(default.chrome_executable),
            headless: env_or("HEADLESS", default.headless),
            profile_dir: env_or("PROFILE_DIR", default.profile_dir),
            session_file: env_or("SESSION_FILE", default.session_file),
            session_max_idle_hours: env_or("SESSION_MAX_IDLE_HOURS", default.session_max_idle_hours),
            avatar_dir: env_or("AVATAR_DIR", default.avatar_dir),
            debug_dir: env_or("DEBUG_DIR", default.debug_dir),
            capture_debug_artifacts: env_or("CAPTURE_DEBUG_ARTIFACTS", default.capture_debug_artifacts),
            min_delay_ms: env_or("MIN_DELAY_MS", default.min_delay_ms),
            max_delay_ms: env_or("MAX_DELAY_MS", default.max_delay_ms),
            jitter_ms: env_or("JITTER_MS", default.jitter_ms),
            backoff_base_ms: env_or("BACKOFF_BASE_MS", default.backoff_base_ms),
            backoff_ceiling_ms: env_or("BACKOFF_CEILING_MS", default.backoff_ceiling_ms),
            navigation_retries: env_or("NAVIGATION_RETRIES", default.navigation_retries),
            panel_retries: env_or("PANEL_RETRIES", default.panel_retries),
            navigation_timeout_secs: env_or("NAVIGATION_TIMEOUT_SECS", default.navigation_timeout_secs),
            poll_interval_ms: env_or("POLL_INTERVAL_MS", default.poll_interval_ms),
            strategy_timeout_ms: env_or("STRATEGY_TIMEOUT_MS", default.strategy_timeout_ms),
            panel_wait_ms: env_or("PANEL_WAIT_MS", default.panel_wait_ms),
            tier_timeout_secs: env_or("TIER_TIMEOUT_SECS", default.tier_timeout_secs),
            login_timeout_secs: env_or("LOGIN_TIMEOUT_SECS", default.login_timeout_secs),
            browser_call_timeout_secs: env_or("BROWSER_CALL_TIMEOUT_SECS", default.browser_call_timeout_secs),
            layout_split_x: env_or("LAYOUT_SPLIT_X", default.layout_split_x),
            ocr_binary: env_or("OCR_BINARY", default.ocr_binary),
            ocr_lang: env_or("OCR_LANG", default.ocr_lang),
            operator_assist: env_or("OPERATOR_ASSIST", default.operator_assist),
            tuning_file: std::env::var("TUNING_FILE").ok().or(default.tuning_file),
            batch_file: env_or("BATCH_FILE", default.batch_file),
            output_file: env_or("OUTPUT_FILE", default.output_file),
            audit_log_file: env_or("AUDIT_LOG_FILE", default.audit_log_file),
            output_log_file: env_or("OUTPUT_LOG_FILE", default.output_log_file),
            manual_mode: env_or("MANUAL_MODE", default.manual_mode),
            verbose_logging: env_or("VERBOSE_LOGGING", default.verbose_logging),
        }
    }

    /// 检查配置项之间的约束
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_delay_ms > self.max_delay_ms {
            return Err(invalid(
                "min_delay_ms",
                format!("{} 大于 max_delay_ms {}", self.min_delay_ms, self.max_delay_ms),
            ));
        }
        if self.backoff_base_ms > self.backoff_ceiling_ms {
            return Err(invalid("backoff_base_ms", "大于 backoff_ceiling_ms"));
        }
        for (field, value) in [
            ("navigation_timeout_secs", self.navigation_timeout_secs),
            ("poll_interval_ms", self.poll_interval_ms),
            ("strategy_timeout_ms", self.strategy_timeout_ms),
            ("panel_wait_ms", self.panel_wait_ms),
            ("tier_timeout_secs", self.tier_timeout_secs),
            ("browser_call_timeout_secs", self.browser_call_timeout_secs),
        ] {
            if value == 0 {
                return Err(invalid(field, "不能为 0"));
            }
        }
        if self.session_max_idle_hours <= 0 {
            return Err(invalid("session_max_idle_hours", "必须为正数"));
        }
        if !self.web_url.starts_with("http") {
            return Err(invalid("web_url", "必须是 http(s) 地址"));
        }
        Ok(())
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn strategy_timeout(&self) -> Duration {
        Duration::from_millis(self.strategy_timeout_ms)
    }

    pub fn panel_wait(&self) -> Duration {
        Duration::from_millis(self.panel_wait_ms)
    }

    pub fn tier_timeout(&self) -> Duration {
        Duration::from_secs(self.tier_timeout_secs)
    }

    pub fn browser_call_timeout(&self) -> Duration {
        Duration::from_secs(self.browser_call_timeout_secs)
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_secs)
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn inverted_delay_window_is_rejected() {
        let config = Config {
            min_delay_ms: 7_000,
            max_delay_ms: 3_000,
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "min_delay_ms"));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = Config {
            tier_timeout_secs: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn browser_mode_parses_case_insensitively() {
        assert_eq!("Connect".parse::<BrowserMode>(), Ok(BrowserMode::Connect));
        assert!("remote".parse::<BrowserMode>().is_err());
    }
}
