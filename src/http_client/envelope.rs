//! HTTP client - response envelope and application status codes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Status code of a successful response.
pub const SUCCESS_CODE: &str = "TX0000";

/// Status code signalling that the user is not logged in, or that the session has expired.
pub const SESSION_EXPIRED_CODE: &str = "TX2014";

/// Wrapper that every server response body is expected to carry.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[non_exhaustive]
pub struct Envelope {
    /// Application-level status code.
    pub status: String,
    /// Response payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Any other top-level fields sent by the server.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Envelope {
    /// Create envelope with a status code and no payload.
    #[must_use]
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            data: None,
            extra: Map::new(),
        }
    }

    /// Set payload.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Whether the envelope carries [`SUCCESS_CODE`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == SUCCESS_CODE
    }

    /// Whether the envelope carries [`SESSION_EXPIRED_CODE`].
    #[must_use]
    pub fn is_session_expired(&self) -> bool {
        self.status == SESSION_EXPIRED_CODE
    }

    /// Consume envelope, returning its payload.
    ///
    /// Missing payload is returned as JSON `null`.
    #[must_use]
    pub fn into_data(self) -> Value {
        self.data.unwrap_or(Value::Null)
    }
}

/// Language of user-facing messages.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum Locale {
    /// English.
    #[default]
    #[serde(alias = "en_us", alias = "english")]
    En,
    /// Simplified Chinese.
    #[serde(alias = "zh", alias = "zh-CN", alias = "zh_CN")]
    ZhCn,
}

impl Locale {
    /// Message key shown when the network is unavailable.
    ///
    /// This is not a table code, so it is rendered through the fallback format.
    #[must_use]
    pub fn offline_key(self) -> &'static str {
        match self {
            Self::En => "No network!",
            Self::ZhCn => "没有网络!",
        }
    }

    /// Render the message for a status code.
    ///
    /// Unknown codes produce a generic "request failed" message carrying the code.
    #[must_use]
    pub fn message(self, code: &str) -> String {
        match lookup(code) {
            Some(entry) => entry.text(self).to_owned(),
            None => match self {
                Self::En => format!("request failed: {code}"),
                Self::ZhCn => format!("请求出错了：{code}"),
            },
        }
    }
}

/// Single row of the error code table.
#[derive(Clone, Copy, Debug)]
pub struct CodeEntry {
    /// Status code.
    pub code: &'static str,
    /// Message in Simplified Chinese.
    pub zh_cn: &'static str,
    /// Message in English.
    pub en: &'static str,
}

impl CodeEntry {
    /// Message text for a locale.
    #[must_use]
    pub fn text(&self, locale: Locale) -> &'static str {
        match locale {
            Locale::En => self.en,
            Locale::ZhCn => self.zh_cn,
        }
    }
}

/// Known failure codes.
pub static ERROR_CODES: &[CodeEntry] = &[
    CodeEntry {
        code: "TX0010",
        zh_cn: "操作失败",
        en: "Operation failed",
    },
    CodeEntry {
        code: "TX2003",
        zh_cn: "参数为空",
        en: "Required parameter is empty",
    },
    CodeEntry {
        code: "TX2004",
        zh_cn: "邮箱重复",
        en: "Email is already registered",
    },
    CodeEntry {
        code: "TX2005",
        zh_cn: "验证码错误",
        en: "Verification code is incorrect",
    },
    CodeEntry {
        code: "TX2006",
        zh_cn: "未发送验证码",
        en: "Verification code has not been sent",
    },
    CodeEntry {
        code: "TX2007",
        zh_cn: "电话号重复",
        en: "Phone number is already registered",
    },
    CodeEntry {
        code: "TX2008",
        zh_cn: "用户不存在",
        en: "User does not exist",
    },
    CodeEntry {
        code: "TX2009",
        zh_cn: "已订阅3人",
        en: "Already subscribed to 3 users",
    },
    CodeEntry {
        code: "TX2010",
        zh_cn: "订阅重复",
        en: "Duplicate subscription",
    },
    CodeEntry {
        code: "TX2011",
        zh_cn: "邮箱或密码错误",
        en: "Incorrect email or password",
    },
    CodeEntry {
        code: "TX2012",
        zh_cn: "电话号长度错误",
        en: "Phone number has invalid length",
    },
    CodeEntry {
        code: "TX2013",
        zh_cn: "两次密码不一致",
        en: "Passwords do not match",
    },
    CodeEntry {
        code: SESSION_EXPIRED_CODE,
        zh_cn: "未登录或登录已过期",
        en: "Not logged in or session has expired",
    },
];

/// Find table entry for a status code.
#[must_use]
pub fn lookup(code: &str) -> Option<&'static CodeEntry> {
    ERROR_CODES.iter().find(|entry| entry.code == code)
}
