//! User-facing text for synthesized `error` chunks.
//!
//! Simplified Chinese is the default because the backend this client talks to
//! serves Chinese-language users.

/// Language used for synthesized error messages.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Locale {
    #[default]
    ZhCn,
    En,
}

impl Locale {
    /// Parses `zh-CN`, `zh`, `zh_cn` or `en` (case-insensitive).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "zh-cn" | "zh_cn" | "zh" => Some(Self::ZhCn),
            "en" | "en-us" | "en_us" => Some(Self::En),
            _ => None,
        }
    }

    pub fn timeout_message(self) -> &'static str {
        match self {
            Self::ZhCn => "请求超时，请检查网络连接和服务器响应时间",
            Self::En => "Request timed out, check the network connection and server response time",
        }
    }

    pub fn network_message(self) -> &'static str {
        match self {
            Self::ZhCn => "网络连接错误，请检查您的网络",
            Self::En => "Network connection error, check your network",
        }
    }

    pub fn no_valid_data_message(self) -> &'static str {
        match self {
            Self::ZhCn => "未接收到有效响应数据",
            Self::En => "No valid response data was received",
        }
    }

    /// Wraps a failure detail in the multi-line troubleshooting template.
    pub fn failure_report(self, detail: &str, endpoint: &str) -> String {
        match self {
            Self::ZhCn => format!(
                "流式请求失败:\n{detail}\n\n请检查:\n1. 服务器 {endpoint} 是否正在运行\n2. 网络连接是否正常\n3. 后端API配置是否正确"
            ),
            Self::En => format!(
                "Streaming request failed:\n{detail}\n\nPlease check:\n1. The server at {endpoint} is running\n2. The network connection is working\n3. The backend API configuration is correct"
            ),
        }
    }
}
