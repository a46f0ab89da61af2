//! 聊天应用流程
//! 把配置、会话、API客户端、文档、渲染网关和消息线程串成登录/发送/新会话/登出/摘要流程

use chrono::Local;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::client::{ChatApiClient, ChatMessage, ChatReply, ChatSession, Credentials, RequestTicket, Role};
use crate::client::session::AuthMode;
use crate::config::GlobalConfig;
use crate::crypto::{ChatEncryption, EncryptedPayload};
use crate::error::{ShieldError, ShieldResult};
use crate::render::{Document, HostCapabilities, MessageThread, NodeId, SafeRenderer};
use crate::sanitizer::Sanitizer;

pub const MESSAGES_CONTAINER_ID: &str = "messagesContainer";
pub const SUMMARIES_LIST_ID: &str = "summariesList";

pub const SESSION_EXPIRED_NOTICE: &str = "Your session has expired. Please log in again.";
pub const APOLOGY_NOTICE: &str = "I apologize, but I encountered an issue. Please try again.";
pub const CONNECTION_NOTICE: &str = "Connection error. Please check your internet and try again.";

/// 登录失效提示展示多久后登出
const DEFAULT_LOGOUT_DELAY: Duration = Duration::from_secs(2);

/// 认证结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// 注册成功，已切回登录模式
    Registered,
    LoggedIn,
}

/// 一轮对话的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// 回复已渲染
    Rendered,
    /// 回复过期（会话已切换）被丢弃
    Discarded,
    /// 401，已提示重新登录
    SessionExpired,
    /// 其他失败，已渲染致歉信息
    Failed,
}

/// 已发出、等待回复的一轮对话
#[derive(Debug, Clone)]
pub struct PendingTurn {
    pub ticket: RequestTicket,
    pub typing_id: String,
    pub message: String,
}

/// 聊天应用
#[derive(Debug)]
pub struct ChatApp {
    config: GlobalConfig,
    client: ChatApiClient,
    session: ChatSession,
    document: Document,
    thread: MessageThread,
    summaries_list: NodeId,
    encryption: ChatEncryption,
    logout_delay: Duration,
}

impl ChatApp {
    /// 构建文档骨架、选定渲染策略并显示欢迎区
    pub fn new(config: GlobalConfig, capabilities: HostCapabilities) -> ShieldResult<Self> {
        let client = ChatApiClient::new(&config)?;
        let mut document = Document::new(config.document_origin.clone(), capabilities);
        let renderer = SafeRenderer::install(&mut document, Sanitizer::with_config(&config));
        info!(
            "渲染策略：{}（强制：{}）",
            renderer.policy().name(),
            renderer.policy().is_enforced()
        );

        let body = document.body();
        let container = document.create_element("div");
        document.set_attribute(container, "id", MESSAGES_CONTAINER_ID)?;
        document.append_child(body, container)?;
        let summaries_list = document.create_element("div");
        document.set_attribute(summaries_list, "id", SUMMARIES_LIST_ID)?;
        document.append_child(body, summaries_list)?;

        let thread = MessageThread::new(renderer, container);
        thread.show_welcome(&mut document)?;

        Ok(Self {
            config,
            client,
            session: ChatSession::new()?,
            document,
            thread,
            summaries_list,
            encryption: ChatEncryption::new(),
            logout_delay: DEFAULT_LOGOUT_DELAY,
        })
    }

    pub fn with_encryption(mut self, encryption: ChatEncryption) -> Self {
        self.encryption = encryption;
        self
    }

    pub fn with_logout_delay(mut self, delay: Duration) -> Self {
        self.logout_delay = delay;
        self
    }

    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    pub fn thread(&self) -> &MessageThread {
        &self.thread
    }

    pub fn messages_html(&self) -> String {
        self.document.inner_html(self.thread.container())
    }

    pub fn summaries_html(&self) -> String {
        self.document.inner_html(self.summaries_list)
    }

    pub fn toggle_auth_mode(&mut self) -> AuthMode {
        self.session.toggle_auth_mode()
    }

    /// 按当前模式注册或登录；注册成功后切回登录模式
    pub async fn authenticate(&mut self, username: &str, password: &str) -> ShieldResult<AuthOutcome> {
        let credentials = Credentials {
            username: username.trim().to_string(),
            password: password.to_string(),
        };
        match self.session.auth_mode() {
            AuthMode::Register => {
                self.client.register(&credentials).await?;
                self.session.set_auth_mode(AuthMode::Login);
                info!("账号已创建：{}", credentials.username);
                Ok(AuthOutcome::Registered)
            }
            AuthMode::Login => {
                let token = self.client.login(&credentials).await?;
                self.session.login(&credentials.username, token, password);
                if let Err(e) = self.load_summaries().await {
                    warn!("加载会话摘要失败：{}", e);
                }
                Ok(AuthOutcome::LoggedIn)
            }
        }
    }

    fn time_label() -> String {
        Local::now().format("%H:%M").to_string()
    }

    fn add_message(&mut self, role: Role, content: &str, options: &[String]) -> ShieldResult<()> {
        let time = Self::time_label();
        self.session.push_message(role, content, &time);
        self.thread
            .add_message(&mut self.document, role, content, options, &time)?;
        Ok(())
    }

    /// 回显用户消息、显示输入指示并登记请求；空消息返回 None
    pub fn begin_turn(&mut self, message: &str) -> ShieldResult<Option<PendingTurn>> {
        let message = message.trim();
        if message.is_empty() {
            return Ok(None);
        }
        if !self.session.is_logged_in() {
            return Err(ShieldError::Unauthorized);
        }

        self.thread.hide_welcome(&mut self.document)?;
        self.add_message(Role::User, message, &[])?;
        let typing_id = self.thread.show_typing_indicator(&mut self.document)?;
        let ticket = self.session.begin_request();
        Ok(Some(PendingTurn {
            ticket,
            typing_id,
            message: message.to_string(),
        }))
    }

    /// 处理回复：先结清请求，再移除输入指示，丢弃过期回复，渲染回复或失败提示
    pub fn complete_turn(&mut self, turn: PendingTurn, result: ShieldResult<ChatReply>) -> ShieldResult<TurnOutcome> {
        // 无论指示移除是否成功，请求都不再在途
        let current = self.session.accept_reply(&turn.ticket);
        self.thread
            .remove_typing_indicator(&mut self.document, &turn.typing_id)?;
        if !current {
            return Ok(TurnOutcome::Discarded);
        }

        match result {
            Ok(reply) => {
                if let Some(risk) = reply.risk_level.as_deref() {
                    debug!("回复风险等级：{}", risk);
                }
                self.add_message(Role::Assistant, &reply.response, &reply.options)?;
                Ok(TurnOutcome::Rendered)
            }
            Err(e) if e.requires_reauth() => {
                self.add_message(Role::Assistant, SESSION_EXPIRED_NOTICE, &[])?;
                Ok(TurnOutcome::SessionExpired)
            }
            Err(ShieldError::HttpError(e)) => {
                warn!("对话请求网络错误：{}", e);
                self.add_message(Role::Assistant, CONNECTION_NOTICE, &[])?;
                Ok(TurnOutcome::Failed)
            }
            Err(e) => {
                warn!("对话请求失败：{}", e);
                self.add_message(Role::Assistant, APOLOGY_NOTICE, &[])?;
                Ok(TurnOutcome::Failed)
            }
        }
    }

    /// 完整的一轮对话；登录失效时提示后延迟登出
    pub async fn send_message(&mut self, message: &str) -> ShieldResult<Option<TurnOutcome>> {
        let Some(turn) = self.begin_turn(message)? else {
            return Ok(None);
        };
        let token = self.session.token().unwrap_or_default().to_string();
        let result = self
            .client
            .send_chat(&turn.message, &turn.ticket.session_id, &token)
            .await;

        let outcome = self.complete_turn(turn, result)?;
        if outcome == TurnOutcome::SessionExpired {
            tokio::time::sleep(self.logout_delay).await;
            self.logout()?;
        }
        Ok(Some(outcome))
    }

    /// 新会话：轮换会话ID并显示新会话欢迎区
    pub fn new_session(&mut self) -> ShieldResult<()> {
        self.session.new_session()?;
        self.thread.show_new_session(&mut self.document)
    }

    pub fn logout(&mut self) -> ShieldResult<()> {
        self.session.logout()?;
        self.document.clear_children(self.summaries_list)?;
        self.thread.show_welcome(&mut self.document)?;
        info!("已登出");
        Ok(())
    }

    /// 拉取并渲染会话摘要，返回渲染条数
    pub async fn load_summaries(&mut self) -> ShieldResult<usize> {
        let token = self.session.token().ok_or(ShieldError::Unauthorized)?.to_string();
        let summaries = self.client.fetch_summaries(&token).await?;
        self.thread
            .render_summaries(&mut self.document, self.summaries_list, &summaries)
    }

    /// 用内存中的登录口令加密当前会话历史
    pub fn encrypted_history(&self) -> ShieldResult<EncryptedPayload> {
        let passphrase = self
            .session
            .passphrase()
            .ok_or_else(|| ShieldError::InvalidInput("未登录，无法加密会话历史".to_string()))?;
        self.encryption.encrypt_history(self.session.messages(), passphrase)
    }

    pub fn decrypt_history(&self, payload: &EncryptedPayload) -> ShieldResult<Vec<ChatMessage>> {
        let passphrase = self
            .session
            .passphrase()
            .ok_or_else(|| ShieldError::InvalidInput("未登录，无法解密会话历史".to_string()))?;
        self.encryption.decrypt_history(payload, passphrase)
    }

    #[cfg(test)]
    pub(crate) fn session_mut(&mut self) -> &mut ChatSession {
        &mut self.session
    }

    #[cfg(test)]
    pub(crate) fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }
}
