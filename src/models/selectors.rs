//! 页面选择器表
//!
//! 网页客户端的 DOM 经常调整，选择器全部集中在这里，并且可以被调优文件覆盖。

use serde::{Deserialize, Serialize};

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorSet {
    /// "号码无效" 提示
    pub invalid_identifier: Vec<String>,
    /// "号码无效" 提示文本（小写匹配）
    pub invalid_identifier_texts: Vec<String>,
    /// 已登录后的会话顶部栏
    pub conversation_header: Vec<String>,
    /// 已登录状态（聊天列表）
    pub session_active: Vec<String>,
    /// 登录二维码
    pub login_challenge: Vec<String>,
    /// 打开面板策略 a：具名顶部区域
    pub header_named: Vec<String>,
    /// 打开面板策略 b：role=button 的顶部控件
    pub header_role: Vec<String>,
    /// 打开面板策略 c：顶部头像缩略图
    pub header_avatar: Vec<String>,
    /// 打开面板策略 d：脚本派发点击的候选
    pub header_dispatch: Vec<String>,
    /// 打开面板策略 e：任意 header
    pub header_any: String,
    /// 联系人详情面板根节点
    pub panel_root: Vec<String>,
    /// 面板内可能含号码的文本节点
    pub panel_identifier: Vec<String>,
    /// 面板内名称
    pub panel_name: Vec<String>,
    /// 面板内签名
    pub panel_about: Vec<String>,
    /// 面板内头像
    pub panel_avatar: Vec<String>,
    /// 面板关闭按钮
    pub close_buttons: Vec<String>,
}

impl Default for SelectorSet {
    fn default() -> Self {
        Self {
            invalid_identifier: strings(&[r#"div[data-testid="invalid-number"]"#]),
            invalid_identifier_texts: strings(&[
                "phone number shared via url is invalid",
                "is not on whatsapp",
            ]),
            conversation_header: strings(&[
                "#main header",
                r#"header span[data-testid="conversation-info-header-chat-title"]"#,
                "header span[title]",
                r#"header img[src*="whatsapp.net"]"#,
            ]),
            session_active: strings(&[
                r#"div[data-testid="chat-list"]"#,
                "#pane-side",
                "#side",
                r#"div[aria-label="Chat list"]"#,
            ]),
            login_challenge: strings(&[
                r#"canvas[aria-label="Scan this QR code to link a device!"]"#,
                r#"canvas[aria-label*="Scan"]"#,
                "div[data-ref] canvas",
            ]),
            header_named: strings(&[
                r#"header[data-testid="conversation-header"]"#,
                r#"#main header [data-testid="conversation-info-header"]"#,
            ]),
            header_role: strings(&[
                r#"header[role="button"] span[dir="auto"]"#,
                r#"#main header div[role="button"]"#,
            ]),
            header_avatar: strings(&[
                r#"header picture img[src*="whatsapp.net"]"#,
                "#main header img",
            ]),
            header_dispatch: strings(&[
                r#"header[data-testid="conversation-header"]"#,
                r#"header[role="button"]"#,
                "#main header",
            ]),
            header_any: "header".to_string(),
            panel_root: strings(&[
                r#"div[aria-label="Contact info"]"#,
                r#"div[data-testid="drawer-right"]"#,
                r#"div[data-testid="contact-info-drawer"]"#,
                "section[aria-label]",
            ]),
            panel_identifier: strings(&["span[dir=\"auto\"]", "span", "div[title]"]),
            panel_name: strings(&["h2", "span[dir=\"auto\"][title]", "h2 span"]),
            panel_about: strings(&[
                r#"div[data-testid="about-drawer"] span[dir="auto"]"#,
                r#"span[data-testid="status-v3-text"]"#,
                r#"div.about-section span[dir="auto"]"#,
                "div[title]",
            ]),
            panel_avatar: strings(&[
                r#"img[src*="whatsapp.net"]"#,
                r#"img[alt="Profile picture"]"#,
                r#"img[data-testid="profile-picture"]"#,
                r#"div[data-testid="image-view"] img"#,
                r#"img[src*="cdn.whatsapp"]"#,
            ]),
            close_buttons: strings(&[
                r#"button[aria-label="Close"]"#,
                r#"div[role="button"][aria-label="Close"]"#,
                r#"span[data-testid="x-viewer"]"#,
            ]),
        }
    }
}
