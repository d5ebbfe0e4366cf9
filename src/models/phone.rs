//! SIM 卡号码

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

fn non_digit() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\D+").expect("静态正则"))
}

/// 从设备读取到的号码，只保存数字，读取后不再修改
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// 从界面文本解析号码，去掉空格、括号、横线和 `+`
    ///
    /// 少于 8 位数字时认为不是号码
    pub fn parse(raw: &str) -> Option<Self> {
        let digits = non_digit().replace_all(raw, "");
        if digits.len() < 8 {
            return None;
        }
        Some(Self(digits.into_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 去掉国家代码后的号码，用于在注册界面输入
    pub fn national(&self, country_prefix: Option<&str>) -> &str {
        match country_prefix {
            Some(prefix) if !prefix.is_empty() => self.0.strip_prefix(prefix).unwrap_or(&self.0),
            _ => &self.0,
        }
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
