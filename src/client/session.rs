//! 会话状态
//! 内存中的登录信息、消息列表与在途请求；切换会话后迟到的回复一律丢弃

use chrono::Utc;
use std::collections::HashSet;
use std::fmt;
use tracing::debug;
use zeroize::Zeroizing;

use super::model::{ChatMessage, Role};
use crate::error::{ShieldError, ShieldResult};

const SESSION_SUFFIX_LEN: usize = 9;
const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
/// 36 的最大整倍数（252 = 36 * 7），不小于它的随机字节丢弃重取，避免取模偏差
const BASE36_REJECT_FROM: u8 = 252;

/// 生成会话ID：`session-<unix毫秒>-<9位小写字母数字>`
pub fn generate_session_id() -> ShieldResult<String> {
    let suffix = base36_suffix(|buf| {
        getrandom::fill(buf).map_err(|e| ShieldError::RandomFailure(e.to_string()))
    })?;
    Ok(format!("session-{}-{}", Utc::now().timestamp_millis(), suffix))
}

/// 用随机字节源拼出均匀分布的 base36 后缀
fn base36_suffix<F>(mut fill: F) -> ShieldResult<String>
where
    F: FnMut(&mut [u8]) -> ShieldResult<()>,
{
    let mut suffix = String::with_capacity(SESSION_SUFFIX_LEN);
    let mut bytes = [0u8; SESSION_SUFFIX_LEN * 2];
    while suffix.len() < SESSION_SUFFIX_LEN {
        fill(&mut bytes)?;
        for b in bytes.iter().filter(|&&b| b < BASE36_REJECT_FROM) {
            if suffix.len() == SESSION_SUFFIX_LEN {
                break;
            }
            suffix.push(BASE36[(*b % 36) as usize] as char);
        }
    }
    Ok(suffix)
}

/// 认证表单模式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthMode {
    #[default]
    Login,
    Register,
}

impl AuthMode {
    pub fn toggled(self) -> Self {
        match self {
            AuthMode::Login => AuthMode::Register,
            AuthMode::Register => AuthMode::Login,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            AuthMode::Login => "Welcome Back",
            AuthMode::Register => "Create Account",
        }
    }

    pub fn submit_label(&self) -> &'static str {
        match self {
            AuthMode::Login => "Sign In",
            AuthMode::Register => "Create Account",
        }
    }
}

/// 在途请求凭证
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestTicket {
    pub session_id: String,
    pub request_id: u64,
}

/// 客户端会话
pub struct ChatSession {
    session_id: String,
    username: Option<String>,
    token: Option<String>,
    passphrase: Option<Zeroizing<String>>,
    auth_mode: AuthMode,
    messages: Vec<ChatMessage>,
    next_request: u64,
    pending: HashSet<RequestTicket>,
}

impl fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatSession")
            .field("session_id", &self.session_id)
            .field("username", &self.username)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .field("auth_mode", &self.auth_mode)
            .field("messages", &self.messages.len())
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl ChatSession {
    pub fn new() -> ShieldResult<Self> {
        Ok(Self {
            session_id: generate_session_id()?,
            username: None,
            token: None,
            passphrase: None,
            auth_mode: AuthMode::default(),
            messages: Vec::new(),
            next_request: 0,
            pending: HashSet::new(),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// 侧边栏展示用：前 8 个字符 + "..."
    pub fn short_session_id(&self) -> String {
        let head: String = self.session_id.chars().take(8).collect();
        format!("{}...", head)
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn passphrase(&self) -> Option<&str> {
        self.passphrase.as_ref().map(|p| p.as_str())
    }

    pub fn is_logged_in(&self) -> bool {
        self.token.is_some()
    }

    pub fn auth_mode(&self) -> AuthMode {
        self.auth_mode
    }

    pub fn toggle_auth_mode(&mut self) -> AuthMode {
        self.auth_mode = self.auth_mode.toggled();
        self.auth_mode
    }

    pub fn set_auth_mode(&mut self, mode: AuthMode) {
        self.auth_mode = mode;
    }

    /// 记录登录结果；口令只保存在内存中
    pub fn login(&mut self, username: &str, token: String, passphrase: &str) {
        self.username = Some(username.to_string());
        self.token = Some(token);
        self.passphrase = Some(Zeroizing::new(passphrase.to_string()));
        self.auth_mode = AuthMode::Login;
        debug!("用户已登录：{}", username);
    }

    /// 清空登录信息并轮换会话
    pub fn logout(&mut self) -> ShieldResult<()> {
        self.username = None;
        self.token = None;
        self.passphrase = None;
        self.auth_mode = AuthMode::Login;
        self.new_session()
    }

    /// 开启新会话：清空消息并作废全部在途请求
    pub fn new_session(&mut self) -> ShieldResult<()> {
        self.session_id = generate_session_id()?;
        self.messages.clear();
        self.pending.clear();
        debug!("开启新会话：{}", self.session_id);
        Ok(())
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn push_message(&mut self, role: Role, content: &str, time: &str) {
        self.messages.push(ChatMessage {
            role,
            content: content.to_string(),
            time: time.to_string(),
        });
    }

    /// 发起请求，登记在途凭证
    pub fn begin_request(&mut self) -> RequestTicket {
        self.next_request += 1;
        let ticket = RequestTicket {
            session_id: self.session_id.clone(),
            request_id: self.next_request,
        };
        self.pending.insert(ticket.clone());
        ticket
    }

    /// 回复是否仍然有效：属于当前会话且尚未被接受（每个凭证最多接受一次）
    pub fn accept_reply(&mut self, ticket: &RequestTicket) -> bool {
        if ticket.session_id != self.session_id {
            debug!("丢弃过期回复：会话 {} 已结束", ticket.session_id);
            return false;
        }
        if !self.pending.remove(ticket) {
            debug!("丢弃重复或未知回复：请求 {}", ticket.request_id);
            return false;
        }
        true
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}
