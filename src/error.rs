//! 全局错误类型定义

use thiserror::Error;
use regex::Error as RegexError;
use serde_json::Error as SerdeJsonError;
use url::ParseError as UrlParseError;
use base64::DecodeError as Base64DecodeError;

#[derive(Error, Debug)]
pub enum ShieldError {
    // 渲染网关相关错误
    #[error("节点不存在：{0}")]
    NodeNotFound(usize),
    #[error("节点没有父节点，无法插入到其外侧：{0}")]
    NoParentNode(usize),
    #[error("Trusted Types 拒绝写入：{0}")]
    TrustedTypesViolation(String),
    #[error("Trusted Types 策略注册失败：{0}")]
    PolicyRegistrationError(String),
    #[error("脚本URL已拦截：{0}")]
    BlockedScriptUrl(String),

    // 加密相关错误
    #[error("加密失败：{0}")]
    Encryption(String),
    #[error("解密失败（口令错误或数据损坏）")]
    Decryption,
    #[error("随机数生成失败：{0}")]
    RandomFailure(String),
    #[error("Base64解码失败：{0}")]
    Base64Error(#[from] Base64DecodeError),

    // 远程服务相关错误
    #[error("登录已失效，请重新登录")]
    Unauthorized,
    #[error("服务端返回状态码 {status}：{message}")]
    Api { status: u16, message: String },
    #[error("网络请求失败：{0}")]
    HttpError(#[from] reqwest::Error),

    // 编译相关错误
    #[error("正则编译失败：{0}")]
    RegexCompileError(#[from] RegexError),

    // 序列化/反序列化错误
    #[error("JSON解析失败：{0}")]
    JsonError(#[from] SerdeJsonError),

    // 基础错误
    #[error("URL解析失败：{0}")]
    UrlError(#[from] UrlParseError),
    #[error("无效输入：{0}")]
    InvalidInput(String),
}

impl ShieldError {
    /// 是否需要重新登录（401）
    pub fn requires_reauth(&self) -> bool {
        matches!(self, ShieldError::Unauthorized)
    }
}

// 全局Result类型
pub type ShieldResult<T> = Result<T, ShieldError>;
