//! 渲染策略
//! 两种实现：宿主强制 Trusted Types 时注册为唯一签发者的 `EnforcedPolicy`，
//! 以及仅做清洗、靠约定保证唯一入口的 `SanitizeOnlyPolicy`。启动时探测一次并选定。

use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use super::document::Document;
use crate::error::{ShieldError, ShieldResult};
use crate::sanitizer::Sanitizer;

/// 注册到宿主的策略名
pub const POLICY_NAME: &str = "soulshield-dom-policy";

/// 经过策略清洗的可信标记
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedHtml {
    html: String,
    policy: Option<String>,
}

impl TrustedHtml {
    /// 仅供策略签发
    pub(crate) fn new(html: String, policy: Option<&str>) -> Self {
        Self {
            html,
            policy: policy.map(str::to_string),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.html
    }

    /// 签发策略名（仅清洗模式下为 None）
    pub fn policy_name(&self) -> Option<&str> {
        self.policy.as_deref()
    }

    pub fn into_html(self) -> String {
        self.html
    }
}

impl fmt::Display for TrustedHtml {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.html)
    }
}

/// 通过同源校验的脚本URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedScriptUrl(String);

impl TrustedScriptUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// 写入文档的标记：可信标记或原始字符串
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Markup {
    Trusted(TrustedHtml),
    Raw(String),
}

impl Markup {
    pub fn into_html(self) -> String {
        match self {
            Markup::Trusted(trusted) => trusted.into_html(),
            Markup::Raw(raw) => raw,
        }
    }
}

impl From<TrustedHtml> for Markup {
    fn from(trusted: TrustedHtml) -> Self {
        Markup::Trusted(trusted)
    }
}

impl From<&str> for Markup {
    fn from(raw: &str) -> Self {
        Markup::Raw(raw.to_string())
    }
}

impl From<String> for Markup {
    fn from(raw: String) -> Self {
        Markup::Raw(raw)
    }
}

/// 渲染策略接口
pub trait RenderPolicy: fmt::Debug + Send + Sync {
    /// 策略名
    fn name(&self) -> &str;

    /// 是否由宿主平台强制
    fn is_enforced(&self) -> bool;

    /// 生成可信标记：内部必定经过清洗
    fn create_html(&self, input: &str) -> TrustedHtml;

    /// 生成可信脚本URL：仅接受与文档同源的地址
    fn create_script_url(&self, input: &str) -> ShieldResult<TrustedScriptUrl>;
}

/// 同源校验：以文档源解析后，源必须完全一致
fn same_origin_script_url(origin: &Url, input: &str) -> ShieldResult<TrustedScriptUrl> {
    match origin.join(input) {
        Ok(resolved) if resolved.origin() == origin.origin() => {
            Ok(TrustedScriptUrl(input.to_string()))
        }
        _ => {
            warn!("拦截跨源脚本URL：{}", input);
            Err(ShieldError::BlockedScriptUrl(input.to_string()))
        }
    }
}

/// 宿主强制模式策略
#[derive(Debug, Clone)]
pub struct EnforcedPolicy {
    sanitizer: Sanitizer,
    origin: Url,
}

impl EnforcedPolicy {
    /// 向文档注册为唯一的可信标记签发者
    pub fn register(document: &mut Document, sanitizer: Sanitizer) -> ShieldResult<Self> {
        document.register_trusted_policy(POLICY_NAME)?;
        debug!("Trusted Types 策略已注册：{}", POLICY_NAME);
        Ok(Self {
            sanitizer,
            origin: document.origin().clone(),
        })
    }
}

impl RenderPolicy for EnforcedPolicy {
    fn name(&self) -> &str {
        POLICY_NAME
    }

    fn is_enforced(&self) -> bool {
        true
    }

    fn create_html(&self, input: &str) -> TrustedHtml {
        TrustedHtml::new(self.sanitizer.sanitize(input), Some(POLICY_NAME))
    }

    fn create_script_url(&self, input: &str) -> ShieldResult<TrustedScriptUrl> {
        same_origin_script_url(&self.origin, input)
    }
}

/// 仅清洗模式策略（宿主无强制能力）
///
/// 网关依然是唯一入口，但只靠约定保证；脚本URL同样做同源校验，不会放行
#[derive(Debug, Clone)]
pub struct SanitizeOnlyPolicy {
    sanitizer: Sanitizer,
    origin: Url,
}

impl SanitizeOnlyPolicy {
    pub fn new(sanitizer: Sanitizer, origin: Url) -> Self {
        Self { sanitizer, origin }
    }
}

impl RenderPolicy for SanitizeOnlyPolicy {
    fn name(&self) -> &str {
        "sanitize-only"
    }

    fn is_enforced(&self) -> bool {
        false
    }

    fn create_html(&self, input: &str) -> TrustedHtml {
        TrustedHtml::new(self.sanitizer.sanitize(input), None)
    }

    fn create_script_url(&self, input: &str) -> ShieldResult<TrustedScriptUrl> {
        same_origin_script_url(&self.origin, input)
    }
}

/// 启动时探测宿主能力并选定策略（只应调用一次）
pub fn select_policy(document: &mut Document, sanitizer: Sanitizer) -> Arc<dyn RenderPolicy> {
    if document.supports_trusted_types() {
        match EnforcedPolicy::register(document, sanitizer.clone()) {
            Ok(policy) => return Arc::new(policy),
            Err(e) => warn!("创建 Trusted Types 策略失败，回退到仅清洗模式：{}", e),
        }
    } else {
        debug!("宿主不支持 Trusted Types，使用仅清洗模式");
    }
    Arc::new(SanitizeOnlyPolicy::new(sanitizer, document.origin().clone()))
}
