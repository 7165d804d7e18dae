use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    En,
    ZhCn,
}

impl Language {
    /// Any `zh*` locale tag (`zh-CN`, `zh_TW.UTF-8`) selects Chinese.
    pub fn from_tag(tag: &str) -> Self {
        if tag.trim().to_ascii_lowercase().starts_with("zh") {
            Language::ZhCn
        } else {
            Language::En
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::ZhCn => "zh-cn",
        }
    }

    fn table(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Language::En => EN,
            Language::ZhCn => ZH_CN,
        }
    }
}

const WEBVIEW_PREFIX: &str = "webview.";

const EN: &[(&str, &str)] = &[
    ("error.noWorkspace", "Please open a workspace first"),
    ("error.noProjectFile", "Cannot find project file"),
    ("error.cannotOpenFile", "Cannot open file"),
    ("error.notAnEndpoint", "No API endpoint at {0}:{1}"),
    ("debug.starting", "Starting {0}..."),
    ("debug.running", "{0} is running"),
    ("debug.failed", "Failed to start debugging: {0}"),
    ("webview.send", "Send"),
    ("webview.add", "Add"),
    ("webview.cancel", "Cancel"),
    ("webview.save", "Save"),
    ("webview.delete", "Delete"),
    ("webview.remove", "Remove"),
    ("webview.tab.headers", "Headers"),
    ("webview.tab.auth", "Auth"),
    ("webview.tab.query", "Query"),
    ("webview.tab.body", "Body"),
    ("webview.tab.response", "Response"),
    ("webview.placeholder.baseUrl", "Select Base URL"),
    ("webview.placeholder.route", "/api/route"),
    ("webview.placeholder.token", "token (Bearer prefix optional)"),
    ("webview.placeholder.body", "Enter JSON body here..."),
    ("webview.placeholder.key", "Key"),
    ("webview.placeholder.value", "Value"),
    ("webview.placeholder.parameter", "parameter"),
    ("webview.placeholder.baseUrlInput", "https://api.example.com"),
    ("webview.status.label", "Status:"),
    ("webview.size.label", "Size:"),
    ("webview.time.label", "Time:"),
    ("webview.status.sending", "Sending..."),
    ("webview.baseUrl.manage", "Manage Base URLs"),
    ("webview.baseUrl.add", "+ Add Base URL"),
    ("webview.baseUrl.empty", "No Base URLs yet. Click \"+ Add Base URL\" to add one."),
    ("webview.baseUrl.saved", "Base URLs saved"),
    ("webview.auth.bearer", "Bearer"),
    ("webview.auth.basic", "Basic"),
    ("webview.auth.oauth2", "OAuth 2"),
    ("webview.history.title", "History"),
    ("webview.history.clear", "Clear history"),
    ("webview.history.empty", "No requests yet"),
    ("webview.bodyMode.formDataEmpty", "FormData has no valid fields"),
    ("webview.error.requestFailed", "Request failed"),
    ("webview.error.invalidJson", "Invalid JSON format"),
    ("webview.error.networkError", "Network error"),
];

const ZH_CN: &[(&str, &str)] = &[
    ("error.noWorkspace", "请先打开一个工作区"),
    ("error.noProjectFile", "无法找到项目文件"),
    ("error.cannotOpenFile", "无法打开文件"),
    ("error.notAnEndpoint", "{0}:{1} 处没有 API 端点"),
    ("debug.starting", "正在启动 {0}..."),
    ("debug.running", "{0} 正在运行"),
    ("debug.failed", "启动调试失败: {0}"),
    ("webview.send", "发送"),
    ("webview.add", "添加"),
    ("webview.cancel", "取消"),
    ("webview.save", "保存"),
    ("webview.delete", "删除"),
    ("webview.remove", "移除"),
    ("webview.tab.headers", "Headers"),
    ("webview.tab.auth", "Auth"),
    ("webview.tab.query", "Query"),
    ("webview.tab.body", "Body"),
    ("webview.tab.response", "Response"),
    ("webview.placeholder.baseUrl", "选择 Base URL"),
    ("webview.placeholder.route", "/api/route"),
    ("webview.placeholder.token", "token（Bearer 前缀可选）"),
    ("webview.placeholder.body", "在此输入 JSON body..."),
    ("webview.placeholder.key", "Key"),
    ("webview.placeholder.value", "Value"),
    ("webview.placeholder.parameter", "parameter"),
    ("webview.placeholder.baseUrlInput", "https://api.example.com"),
    ("webview.status.label", "状态:"),
    ("webview.size.label", "大小:"),
    ("webview.time.label", "耗时:"),
    ("webview.status.sending", "正在发送..."),
    ("webview.baseUrl.manage", "管理 Base URLs"),
    ("webview.baseUrl.add", "+ 添加 Base URL"),
    ("webview.baseUrl.empty", "暂无 Base URL，点击\"+ 添加 Base URL\"添加一个"),
    ("webview.baseUrl.saved", "Base URLs 已保存"),
    ("webview.auth.bearer", "Bearer"),
    ("webview.auth.basic", "Basic"),
    ("webview.auth.oauth2", "OAuth 2"),
    ("webview.history.title", "历史记录"),
    ("webview.history.clear", "清空历史"),
    ("webview.history.empty", "暂无请求记录"),
    ("webview.bodyMode.formDataEmpty", "FormData 没有有效字段"),
    ("webview.error.requestFailed", "请求失败"),
    ("webview.error.invalidJson", "JSON 格式错误"),
    ("webview.error.networkError", "网络错误"),
];

/// Looks up `key`, substituting `{0}`, `{1}`, ... with `args`. Unknown keys
/// come back verbatim.
pub fn text(lang: Language, key: &str, args: &[&str]) -> String {
    let mut out = lang
        .table()
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| (*v).to_string())
        .unwrap_or_else(|| key.to_string());
    for (idx, arg) in args.iter().enumerate() {
        out = out.replace(&format!("{{{idx}}}"), arg);
    }
    out
}

/// Texts sent to the panel with the `webview.` prefix removed.
pub fn webview_texts(lang: Language) -> BTreeMap<String, String> {
    lang.table()
        .iter()
        .filter_map(|(k, v)| {
            k.strip_prefix(WEBVIEW_PREFIX)
                .map(|short| (short.to_string(), (*v).to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locale_tags_select_language() {
        assert_eq!(Language::from_tag("zh_CN.UTF-8"), Language::ZhCn);
        assert_eq!(Language::from_tag("en_US.UTF-8"), Language::En);
        assert_eq!(Language::from_tag(""), Language::En);
    }

    #[test]
    fn webview_keys_are_stripped() {
        let texts = webview_texts(Language::En);
        assert_eq!(texts.get("send").map(String::as_str), Some("Send"));
        assert!(texts.contains_key("error.requestFailed"));
        assert!(!texts.contains_key("error.noProjectFile"));
        assert!(texts.keys().all(|k| !k.starts_with("debug.")));
    }

    #[test]
    fn tables_carry_the_same_keys() {
        let en: Vec<_> = EN.iter().map(|(k, _)| *k).collect();
        let zh: Vec<_> = ZH_CN.iter().map(|(k, _)| *k).collect();
        assert_eq!(en, zh);
    }

    #[test]
    fn text_formats_positional_args() {
        assert_eq!(
            text(Language::En, "error.notAnEndpoint", &["Users.cs", "12"]),
            "No API endpoint at Users.cs:12"
        );
        assert_eq!(text(Language::En, "missing.key", &[]), "missing.key");
    }
}
