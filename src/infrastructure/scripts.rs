//! 页面脚本
//!
//! 每段脚本第一行带一个标记注释，方便日志定位，也让测试假页面按标记应答。

use serde_json::json;

use crate::models::{Identifier, SelectorSet};

pub mod markers {
    pub const NAV_STATE: &str = "/*nav-state*/";
    pub const SESSION_STATE: &str = "/*session-state*/";
    pub const LOGIN_CHALLENGE: &str = "/*login-challenge*/";
    pub const PANEL_OPEN: &str = "/*panel-open*/";
    pub const PANEL_RECT: &str = "/*panel-rect*/";
    pub const PANEL_IDENTIFIER: &str = "/*panel-identifier*/";
    pub const PANEL_FIELDS: &str = "/*panel-fields*/";
    pub const PANEL_CLOSE: &str = "/*panel-close*/";
    pub const DISPATCH_CLICK: &str = "/*dispatch-click*/";
    pub const ELEMENT_BOXES: &str = "/*element-boxes*/";
    pub const RUNTIME_CONTACT: &str = "/*runtime-contact*/";
    pub const STORAGE_EXPORT: &str = "/*storage-export*/";
    pub const STORAGE_IMPORT: &str = "/*storage-import*/";
    pub const BLOB_TO_DATA_URL: &str = "/*blob-data-url*/";
    pub const PAGE_HTML: &str = "/*page-html*/";
    pub const LIVENESS: &str = "/*liveness*/";
    pub const VIEWPORT: &str = "/*viewport*/";
}

fn list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

/// 查找第一个可见的面板根节点（各面板脚本共用）
fn panel_root_fn(selectors: &SelectorSet) -> String {
    format!(
        r#"const findPanel = () => {{
            for (const sel of {roots}) {{
                for (const el of document.querySelectorAll(sel)) {{
                    const r = el.getBoundingClientRect();
                    if (r.width > 0 && r.height > 0) return el;
                }}
            }}
            return null;
        }};"#,
        roots = list(&selectors.panel_root)
    )
}

/// 导航后的三种信号：号码无效 / 会话顶部栏 / 登录二维码
pub fn navigation_state(selectors: &SelectorSet) -> String {
    format!(
        r#"{marker}
        (() => {{
            const any = (sels) => sels.some(s => document.querySelector(s) !== null);
            let invalid = any({invalid});
            if (!invalid) {{
                const texts = {texts};
                const dialogs = document.querySelectorAll('[role="dialog"], [data-animate-modal-popup], [data-animate-modal-body]');
                for (const d of dialogs) {{
                    const t = (d.innerText || '').toLowerCase();
                    if (texts.some(x => t.includes(x))) {{ invalid = true; break; }}
                }}
            }}
            return {{ invalid, header: any({header}), login: any({login}) }};
        }})()"#,
        marker = markers::NAV_STATE,
        invalid = list(&selectors.invalid_identifier),
        texts = list(&selectors.invalid_identifier_texts),
        header = list(&selectors.conversation_header),
        login = list(&selectors.login_challenge),
    )
}

/// 登录状态检测
pub fn session_state(selectors: &SelectorSet) -> String {
    format!(
        r#"{marker}
        (() => {{
            const any = (sels) => sels.some(s => document.querySelector(s) !== null);
            return {{ authenticated: any({active}), login: any({login}) }};
        }})()"#,
        marker = markers::SESSION_STATE,
        active = list(&selectors.session_active),
        login = list(&selectors.login_challenge),
    )
}

/// 读取二维码 canvas 的 PNG data URL
pub fn login_challenge(selectors: &SelectorSet) -> String {
    format!(
        r#"{marker}
        (() => {{
            for (const sel of {login}) {{
                const el = document.querySelector(sel);
                if (el && (el.tagName || '').toLowerCase() === 'canvas') {{
                    try {{ return el.toDataURL('image/png'); }} catch (e) {{ return null; }}
                }}
            }}
            return null;
        }})()"#,
        marker = markers::LOGIN_CHALLENGE,
        login = list(&selectors.login_challenge),
    )
}

pub fn panel_open(selectors: &SelectorSet) -> String {
    format!(
        r#"{marker}
        (() => {{ {find} return findPanel() !== null; }})()"#,
        marker = markers::PANEL_OPEN,
        find = panel_root_fn(selectors),
    )
}

pub fn panel_rect(selectors: &SelectorSet) -> String {
    format!(
        r#"{marker}
        (() => {{
            {find}
            const p = findPanel();
            if (!p) return null;
            const r = p.getBoundingClientRect();
            return {{ x: r.x, y: r.y, width: r.width, height: r.height }};
        }})()"#,
        marker = markers::PANEL_RECT,
        find = panel_root_fn(selectors),
    )
}

/// 面板中所有形如电话号码的文本
pub fn panel_identifier(selectors: &SelectorSet) -> String {
    format!(
        r#"{marker}
        (() => {{
            {find}
            const p = findPanel();
            if (!p) return [];
            const out = [];
            for (const sel of {fields}) {{
                for (const el of p.querySelectorAll(sel)) {{
                    const t = (el.textContent || el.getAttribute('title') || '').trim();
                    const digits = t.replace(/\D/g, '');
                    if (/^[+\d\s()\-. ]+$/.test(t) && digits.length >= 8 && !out.includes(t)) out.push(t);
                }}
            }}
            return out;
        }})()"#,
        marker = markers::PANEL_IDENTIFIER,
        find = panel_root_fn(selectors),
        fields = list(&selectors.panel_identifier),
    )
}

/// 在已核验的面板内读取名称 / 签名 / 头像地址
pub fn panel_fields(selectors: &SelectorSet) -> String {
    format!(
        r#"{marker}
        (() => {{
            {find}
            const p = findPanel();
            if (!p) return {{ rootFound: false }};
            const firstText = (sels, preferTitle) => {{
                for (const sel of sels) {{
                    for (const el of p.querySelectorAll(sel)) {{
                        const title = el.getAttribute('title');
                        const text = el.textContent;
                        const v = ((preferTitle ? (title || text) : (text || title)) || '').trim();
                        if (v) return v;
                    }}
                }}
                return null;
            }};
            let avatarSrc = null;
            for (const sel of {avatar}) {{
                const img = p.querySelector(sel);
                if (img && img.getAttribute('src')) {{ avatarSrc = img.getAttribute('src'); break; }}
            }}
            const defaultIcon = p.querySelector('span[data-icon="default-user"], span[data-icon="default-contact-refreshed"]') !== null;
            return {{
                rootFound: true,
                name: firstText({name}, true),
                about: firstText({about}, false),
                avatarSrc,
                defaultAvatar: avatarSrc === null && defaultIcon,
            }};
        }})()"#,
        marker = markers::PANEL_FIELDS,
        find = panel_root_fn(selectors),
        name = list(&selectors.panel_name),
        about = list(&selectors.panel_about),
        avatar = list(&selectors.panel_avatar),
    )
}

/// 关闭面板：先发 Escape，再尝试关闭按钮
pub fn panel_close(selectors: &SelectorSet) -> String {
    format!(
        r#"{marker}
        (() => {{
            const target = document.activeElement || document.body;
            target.dispatchEvent(new KeyboardEvent('keydown', {{ key: 'Escape', code: 'Escape', keyCode: 27, bubbles: true }}));
            for (const sel of {close}) {{
                const el = document.querySelector(sel);
                if (el) {{ el.click(); return true; }}
            }}
            return true;
        }})()"#,
        marker = markers::PANEL_CLOSE,
        close = list(&selectors.close_buttons),
    )
}

/// 绕过命中测试，直接在元素上派发 click
pub fn dispatch_click(candidates: &[String]) -> String {
    format!(
        r#"{marker}
        (() => {{
            for (const sel of {candidates}) {{
                const el = document.querySelector(sel);
                if (el) {{ el.click(); return 'clicked'; }}
            }}
            return 'not_found';
        }})()"#,
        marker = markers::DISPATCH_CLICK,
        candidates = list(candidates),
    )
}

pub fn element_boxes(selector: &str) -> String {
    format!(
        r#"{marker}
        Array.from(document.querySelectorAll({selector})).map(el => {{
            const r = el.getBoundingClientRect();
            return {{ x: r.x, y: r.y, width: r.width, height: r.height }};
        }})"#,
        marker = markers::ELEMENT_BOXES,
        selector = json!(selector),
    )
}

/// 按号码在客户端内存模型中查找联系人
pub fn runtime_contact(identifier: &Identifier) -> String {
    format!(
        r#"{marker}
        (() => {{
            const chatId = {chat_id};
            const user = {user};
            const stores = [window.Store, window.WAWeb, window.WA, window.__WAWEB].filter(Boolean);
            if (stores.length === 0) return {{ storeFound: false }};
            const matches = (c) => c && c.id && (c.id._serialized === chatId || c.id.user === user);
            const all = (col) => (col && col.getModelsArray) ? col.getModelsArray() : [];
            for (const store of stores) {{
                let contact = null;
                if (store.Contact) {{
                    contact = (store.Contact.get && store.Contact.get(chatId)) || all(store.Contact).find(matches) || null;
                }}
                if (!contact && store.Chat) {{
                    const chat = (store.Chat.get && store.Chat.get(chatId)) || all(store.Chat).find(matches);
                    contact = chat ? chat.contact : null;
                }}
                if (contact && matches(contact)) {{
                    const status = contact.status;
                    const thumb = contact.profilePicThumb || contact.profilePicThumbObj;
                    return {{
                        storeFound: true,
                        found: true,
                        name: contact.pushname || contact.verifiedName || contact.name || contact.displayName || null,
                        about: (status && typeof status === 'object' ? status.status : status) || contact.statusText || null,
                        avatarSrc: thumb ? (thumb.imgFull || thumb.img || thumb.eurl || null) : null,
                    }};
                }}
            }}
            return {{ storeFound: true, found: false }};
        }})()"#,
        marker = markers::RUNTIME_CONTACT,
        chat_id = json!(identifier.chat_id()),
        user = json!(identifier.as_str()),
    )
}

pub fn storage_export() -> String {
    format!(
        r#"{marker}
        (() => {{
            const out = {{}};
            for (let i = 0; i < localStorage.length; i++) {{
                const k = localStorage.key(i);
                out[k] = localStorage.getItem(k);
            }}
            return out;
        }})()"#,
        marker = markers::STORAGE_EXPORT,
    )
}

pub fn storage_import(entries: &std::collections::BTreeMap<String, String>) -> String {
    format!(
        r#"{marker}
        (() => {{
            const entries = {entries};
            let n = 0;
            for (const [k, v] of Object.entries(entries)) {{ localStorage.setItem(k, v); n++; }}
            return n;
        }})()"#,
        marker = markers::STORAGE_IMPORT,
        entries = json!(entries),
    )
}

/// blob: 地址只能在页面内读取
pub fn blob_to_data_url(url: &str) -> String {
    format!(
        r#"{marker}
        (async () => {{
            try {{
                const blob = await (await fetch({url})).blob();
                return await new Promise((resolve) => {{
                    const reader = new FileReader();
                    reader.onloadend = () => resolve(reader.result);
                    reader.onerror = () => resolve(null);
                    reader.readAsDataURL(blob);
                }});
            }} catch (e) {{
                return null;
            }}
        }})()"#,
        marker = markers::BLOB_TO_DATA_URL,
        url = json!(url),
    )
}

pub fn page_html() -> String {
    format!("{}\ndocument.documentElement.outerHTML", markers::PAGE_HTML)
}

pub fn liveness() -> String {
    format!("{}\n1", markers::LIVENESS)
}

pub fn viewport() -> String {
    format!(
        "{}\n({{ w: window.innerWidth, h: window.innerHeight }})",
        markers::VIEWPORT
    )
}
