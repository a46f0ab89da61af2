//! soulshield - 支持类聊天客户端核心：白名单HTML清洗、可信标记渲染网关、消息线程渲染、口令加密与聊天服务客户端

// 导出全局错误类型
pub use self::error::{ShieldError, ShieldResult};

// 导出配置模块
pub use self::config::{GlobalConfig, ConfigManager, CustomConfigBuilder};

// 导出清洗模块核心接口
pub use self::sanitizer::{
    Allowlist, ProtocolAllowlist, Sanitizer, FragmentParser, Fragment,
    sanitize_html, escape_html, format_message,
    DEFAULT_ALLOWLIST, DEFAULT_PROTOCOLS_ALLOWLIST,
};

// 导出渲染模块核心接口
pub use self::render::{
    Document, HostCapabilities, InsertPosition, NodeId,
    RenderPolicy, EnforcedPolicy, SanitizeOnlyPolicy, select_policy,
    Markup, TrustedHtml, TrustedScriptUrl, SafeRenderer, MessageThread,
    POLICY_NAME,
};

// 导出加密模块核心接口
pub use self::crypto::{ChatEncryption, EncryptedPayload};

// 导出客户端模块核心接口
pub use self::client::{
    ChatApiClient, ChatSession, ChatMessage, ChatReply, ConversationSummary,
    Credentials, Role, AuthMode, RequestTicket, generate_session_id,
};

// 导出应用流程
pub use self::app::{ChatApp, AuthOutcome, TurnOutcome, PendingTurn};

// 声明所有子模块
pub mod config;
pub mod error;
pub mod sanitizer;
pub mod render;
pub mod crypto;
pub mod client;
pub mod app;
