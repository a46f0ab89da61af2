//! 聊天/认证服务的 HTTP 客户端

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

use super::model::{
    ChatReply, ChatRequest, ConversationSummary, Credentials, ErrorBody, LoginResponse, SummariesResponse,
};
use crate::config::GlobalConfig;
use crate::error::{ShieldError, ShieldResult};

const API_KEY_HEADER: &str = "x-api-key";

/// 状态码映射时是否区分 401
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    /// 注册/登录：401 只是凭据错误
    Auth,
    /// 依赖 token 的接口：401 表示登录失效
    Session,
}

/// 远程服务客户端
#[derive(Debug, Clone)]
pub struct ChatApiClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl ChatApiClient {
    pub fn new(config: &GlobalConfig) -> ShieldResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout))
            .build()?;
        Ok(Self {
            http,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn check_credentials(credentials: &Credentials) -> ShieldResult<()> {
        if credentials.username.trim().is_empty() || credentials.password.is_empty() {
            return Err(ShieldError::InvalidInput("请输入用户名和密码".to_string()));
        }
        Ok(())
    }

    /// 注册账号
    pub async fn register(&self, credentials: &Credentials) -> ShieldResult<()> {
        Self::check_credentials(credentials)?;
        debug!("注册账号：{}", credentials.username);
        let response = self
            .http
            .post(self.endpoint("/auth/register"))
            .header(API_KEY_HEADER, &self.api_key)
            .json(credentials)
            .send()
            .await?;
        Self::check_status(response, Scope::Auth).await?;
        Ok(())
    }

    /// 登录，返回 token
    pub async fn login(&self, credentials: &Credentials) -> ShieldResult<String> {
        Self::check_credentials(credentials)?;
        debug!("登录账号：{}", credentials.username);
        let response = self
            .http
            .post(self.endpoint("/auth/login"))
            .header(API_KEY_HEADER, &self.api_key)
            .json(credentials)
            .send()
            .await?;
        let login: LoginResponse = Self::decode(response, Scope::Auth).await?;
        Ok(login.token)
    }

    /// 发送一轮对话
    pub async fn send_chat(&self, message: &str, session_id: &str, token: &str) -> ShieldResult<ChatReply> {
        let request = ChatRequest {
            message,
            session_id,
            token,
        };
        let response = self
            .http
            .post(self.endpoint("/chat"))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request)
            .send()
            .await?;
        Self::decode(response, Scope::Session).await
    }

    /// 拉取历史会话摘要
    pub async fn fetch_summaries(&self, token: &str) -> ShieldResult<Vec<ConversationSummary>> {
        let response = self
            .http
            .get(self.endpoint("/summaries"))
            .query(&[("token", token)])
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;
        let body: SummariesResponse = Self::decode(response, Scope::Session).await?;
        Ok(body.summaries)
    }

    async fn decode<T: DeserializeOwned>(response: Response, scope: Scope) -> ShieldResult<T> {
        let response = Self::check_status(response, scope).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// 非 2xx 状态映射为错误，错误信息优先取响应体的 `error` 字段
    async fn check_status(response: Response, scope: Scope) -> ShieldResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED && scope == Scope::Session {
            warn!("服务端返回 401，登录已失效");
            return Err(ShieldError::Unauthorized);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .ok()
            .and_then(|body| body.error)
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("未知错误").to_string());
        warn!("服务端请求失败，状态码：{}，信息：{}", status.as_u16(), message);
        Err(ShieldError::Api {
            status: status.as_u16(),
            message,
        })
    }
}
