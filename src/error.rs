use chromiumoxide::error::CdpError;
use thiserror::Error;

/// 应用程序错误类型
///
/// 只用于基础设施与文件层面的故障；单个号码的提取结果永远以
/// `ExtractionResult` 返回，不会以错误的形式穿过对外接口。
#[derive(Debug, Error)]
pub enum AppError {
    /// 浏览器相关错误
    #[error("浏览器错误: {0}")]
    Browser(#[from] BrowserError),
    /// 会话持久化错误
    #[error("会话错误: {0}")]
    Session(#[from] SessionError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// OCR 错误
    #[error("OCR错误: {0}")]
    Ocr(#[from] OcrError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 号码校验错误
    #[error("号码校验错误: {0}")]
    Validation(#[from] ValidationError),
    /// 其他错误（用于包装第三方库错误）
    #[error("错误: {0}")]
    Other(String),
}

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// 浏览器相关错误
#[derive(Debug, Error)]
pub enum BrowserError {
    /// 连接浏览器失败
    #[error("无法连接到浏览器 (端口: {port}): {source}")]
    ConnectionFailed { port: u16, source: BoxedSource },
    /// 启动浏览器失败
    #[error("启动浏览器失败: {source}")]
    LaunchFailed { source: BoxedSource },
    /// 创建页面失败
    #[error("创建页面失败: {source}")]
    PageCreationFailed { source: BoxedSource },
    /// 导航失败
    #[error("导航到 {url} 失败: {source}")]
    NavigationFailed { url: String, source: BoxedSource },
    /// 执行脚本失败
    #[error("执行脚本失败: {source}")]
    ScriptExecutionFailed { source: BoxedSource },
    /// 浏览器无响应
    #[error("浏览器无响应")]
    Unresponsive,
    /// 与浏览器的调试连接已断开
    #[error("与浏览器的连接已断开: {source}")]
    ConnectionLost { source: BoxedSource },
    /// 浏览器尚未启动
    #[error("浏览器尚未启动")]
    NotStarted,
}

/// 会话持久化错误
#[derive(Debug, Error)]
pub enum SessionError {
    /// 会话快照序列化失败
    #[error("会话快照序列化失败: {0}")]
    Serialize(#[source] serde_json::Error),
    /// 写入会话文件失败
    #[error("写入会话文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    /// 文件不存在
    #[error("文件不存在: {path}")]
    NotFound { path: String },
    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed { path: String, source: BoxedSource },
    /// 写入文件失败
    #[error("写入文件失败 ({path}): {source}")]
    WriteFailed { path: String, source: BoxedSource },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed { path: String, source: BoxedSource },
    /// 图片解码或编码失败
    #[error("图片处理失败: {source}")]
    ImageFailed { source: BoxedSource },
    /// 下载失败
    #[error("下载失败 ({url}): {reason}")]
    DownloadFailed { url: String, reason: String },
}

/// OCR 错误
#[derive(Debug, Error)]
pub enum OcrError {
    /// 无法启动 OCR 程序
    #[error("无法启动 OCR 程序 {binary}: {source}")]
    SpawnFailed {
        binary: String,
        #[source]
        source: std::io::Error,
    },
    /// OCR 程序返回失败
    #[error("OCR 程序退出码 {code:?}: {stderr}")]
    ProcessFailed { code: Option<i32>, stderr: String },
    /// 区域超出截图范围
    #[error("OCR 区域无效: {0}")]
    InvalidRegion(String),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 配置值不合法
    #[error("配置项 {field} 不合法: {reason}")]
    InvalidValue { field: String, reason: String },
    /// 正则表达式无效
    #[error("无效的过滤规则 '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// 号码校验错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// 号码为空
    #[error("号码为空")]
    Empty,
    /// 含有非法字符
    #[error("号码 '{0}' 含有非法字符")]
    InvalidCharacters(String),
    /// 长度不符合
    #[error("号码 '{raw}' 位数 {digits} 不在 {min}..={max} 范围内")]
    BadLength {
        raw: String,
        digits: usize,
        min: usize,
        max: usize,
    },
    /// 以 0 开头
    #[error("号码 '{0}' 缺少国家代码")]
    MissingCountryCode(String),
}

// ========== 从常见错误类型转换 ==========

impl From<CdpError> for AppError {
    fn from(err: CdpError) -> Self {
        if is_transport_error(&err) {
            return AppError::Browser(BrowserError::ConnectionLost {
                source: Box::new(err),
            });
        }
        AppError::Browser(BrowserError::ScriptExecutionFailed {
            source: Box::new(err),
        })
    }
}

/// 连接层面的故障：页面本身已经不可用，而不是某个脚本或元素出错
fn is_transport_error(err: &CdpError) -> bool {
    matches!(
        err,
        CdpError::Ws(..) | CdpError::ChannelSendError(..) | CdpError::NoResponse | CdpError::Timeout
    )
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Browser(BrowserError::ScriptExecutionFailed {
            source: Box::new(err),
        })
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        AppError::File(FileError::TomlParseFailed {
            path: String::new(), // TOML错误通常不包含路径信息
            source: Box::new(err),
        })
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::File(FileError::ReadFailed {
            path: String::new(),
            source: Box::new(err),
        })
    }
}

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        AppError::File(FileError::ImageFailed {
            source: Box::new(err),
        })
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        let url = err.url().map(|u| u.to_string()).unwrap_or_default();
        AppError::File(FileError::DownloadFailed {
            url,
            reason: err.to_string(),
        })
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建浏览器连接错误
    pub fn browser_connection_failed(
        port: u16,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Browser(BrowserError::ConnectionFailed {
            port,
            source: Box::new(source),
        })
    }

    /// 导航时的 CDP 错误；连接故障保持为浏览器故障
    pub fn navigation_cdp_failed(url: impl Into<String>, err: CdpError) -> Self {
        if is_transport_error(&err) {
            return AppError::from(err);
        }
        AppError::navigation_failed(url, err)
    }

    /// 创建导航失败错误
    pub fn navigation_failed(
        url: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Browser(BrowserError::NavigationFailed {
            url: url.into(),
            source: Box::new(source),
        })
    }

    /// 创建文件写入错误
    pub fn file_write_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::File(FileError::WriteFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }

    /// 是否属于浏览器本身失去响应（需要重启浏览器）
    pub fn is_browser_fault(&self) -> bool {
        matches!(
            self,
            AppError::Browser(
                BrowserError::Unresponsive | BrowserError::ConnectionLost { .. } | BrowserError::NotStarted
            )
        )
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
