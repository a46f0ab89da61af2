//! 全局配置管理,存储所有可配置项

use std::env;
use url::Url;

use crate::error::ShieldResult;

/// 默认聊天服务地址
pub const DEFAULT_API_URL: &str = "https://pypwr35xf3.execute-api.us-east-1.amazonaws.com/prod";
/// 默认文档源（相对链接与脚本URL都以此为基准解析）
pub const DEFAULT_DOCUMENT_ORIGIN: &str = "http://localhost";

/// 全局配置
#[derive(Debug, Clone)]
pub struct GlobalConfig {
    // 当前文档的源
    pub document_origin: Url,
    // 聊天/认证服务根地址
    pub api_url: String,
    // 网关 x-api-key
    pub api_key: String,
    // 超时配置（单位：秒）
    pub http_timeout: u64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            document_origin: default_origin(),
            api_url: DEFAULT_API_URL.to_string(),
            api_key: String::new(),
            http_timeout: 30,
        }
    }
}

fn default_origin() -> Url {
    Url::parse(DEFAULT_DOCUMENT_ORIGIN).expect("默认文档源必须是合法URL")
}

/// 配置管理器
pub struct ConfigManager;

impl ConfigManager {
    /// 获取默认配置
    pub fn get_default() -> GlobalConfig {
        GlobalConfig::default()
    }

    /// 从环境变量读取配置，未设置的项使用默认值
    ///
    /// - `SOULSHIELD_API_URL`
    /// - `SOULSHIELD_API_KEY`
    /// - `SOULSHIELD_ORIGIN`
    pub fn from_env() -> ShieldResult<GlobalConfig> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 通过自定义查找函数构建配置（便于测试）
    pub fn from_lookup<F>(lookup: F) -> ShieldResult<GlobalConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = CustomConfigBuilder::new();
        if let Some(api_url) = lookup("SOULSHIELD_API_URL").filter(|v| !v.trim().is_empty()) {
            builder = builder.api_url(api_url);
        }
        if let Some(api_key) = lookup("SOULSHIELD_API_KEY") {
            builder = builder.api_key(api_key);
        }
        if let Some(origin) = lookup("SOULSHIELD_ORIGIN").filter(|v| !v.trim().is_empty()) {
            builder = builder.document_origin(Url::parse(origin.trim())?);
        }
        Ok(builder.build())
    }

    /// 自定义配置
    pub fn custom() -> CustomConfigBuilder {
        CustomConfigBuilder::new()
    }
}

/// 配置构建器（便于自定义配置）
#[derive(Debug, Clone)]
pub struct CustomConfigBuilder {
    config: GlobalConfig,
}

impl Default for CustomConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CustomConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: GlobalConfig::default(),
        }
    }

    pub fn document_origin(mut self, origin: Url) -> Self {
        self.config.document_origin = origin;
        self
    }

    pub fn api_url(mut self, url: String) -> Self {
        self.config.api_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn api_key(mut self, key: String) -> Self {
        self.config.api_key = key;
        self
    }

    pub fn http_timeout(mut self, timeout: u64) -> Self {
        self.config.http_timeout = timeout;
        self
    }

    pub fn build(self) -> GlobalConfig {
        self.config
    }
}
