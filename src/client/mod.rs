//! 远程聊天服务：数据模型、HTTP 客户端与会话状态
pub mod model;
pub mod api;
pub mod session;

pub use self::model::{ChatMessage, ChatReply, ConversationSummary, Credentials, Role};
pub use self::api::ChatApiClient;
pub use self::session::{generate_session_id, AuthMode, ChatSession, RequestTicket};
