//! 界面元素定位
//!
//! 所有定位都来自外部 TOML 文件，代码里不写死任何应用的元素 ID。

use std::fmt;

use serde::Deserialize;

/// 元素查找方式，对应自动化服务的 `using` 字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorStrategy {
    Id,
    Xpath,
    AccessibilityId,
    ClassName,
    Uiautomator,
}

impl LocatorStrategy {
    pub fn as_webdriver(self) -> &'static str {
        match self {
            LocatorStrategy::Id => "id",
            LocatorStrategy::Xpath => "xpath",
            LocatorStrategy::AccessibilityId => "accessibility id",
            LocatorStrategy::ClassName => "class name",
            LocatorStrategy::Uiautomator => "-android uiautomator",
        }
    }
}

/// 一个元素定位
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Locator {
    pub using: LocatorStrategy,
    pub value: String,
}

impl Locator {
    pub fn new(using: LocatorStrategy, value: impl Into<String>) -> Self {
        Self {
            using,
            value: value.into(),
        }
    }

    pub fn id(value: impl Into<String>) -> Self {
        Self::new(LocatorStrategy::Id, value)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.using.as_webdriver(), self.value)
    }
}

/// 读取 SIM 号码所用的界面
#[derive(Debug, Clone, Deserialize)]
pub struct SimScreen {
    /// 显示本机号码的应用（拨号器或设置）
    pub app_package: String,
    /// 打开后依次点击的元素
    #[serde(default)]
    pub open_steps: Vec<Locator>,
    pub number_text: Locator,
}

/// 注册引导界面
#[derive(Debug, Clone, Deserialize)]
pub struct OnboardingScreen {
    pub language_option: Locator,
    pub proceed_button: Locator,
    pub phone_input: Locator,
    /// 输入号码后的“下一步”，有些版本没有
    pub next_button: Option<Locator>,
    pub confirm_button: Locator,
    /// 输入号码前去掉的国家代码
    pub country_prefix: Option<String>,
}

/// 验证阶段各探测要找的标记
#[derive(Debug, Clone, Deserialize)]
pub struct VerificationScreen {
    pub banned_marker: Locator,
    pub review_marker: Locator,
    pub request_review_button: Locator,
    pub chip_ok_marker: Locator,
}

/// 短信应用
#[derive(Debug, Clone, Deserialize)]
pub struct SmsScreen {
    pub app_package: String,
    /// 最新一条验证码短信
    pub latest_message: Locator,
}

/// 资料填写界面
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileScreen {
    pub code_input: Locator,
    pub continue_button: Locator,
    pub permission_allow: Locator,
    pub name_input: Locator,
    pub finish_button: Locator,
}

/// 完整的界面定位表
#[derive(Debug, Clone, Deserialize)]
pub struct UiMap {
    pub sim: SimScreen,
    pub onboarding: OnboardingScreen,
    pub verification: VerificationScreen,
    pub sms: SmsScreen,
    pub profile: ProfileScreen,
}
