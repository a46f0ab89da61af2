//! 渲染模块：活文档、渲染策略、安全渲染网关与消息线程
pub mod document;
pub mod policy;
pub mod gateway;
pub mod thread;

// 导出核心接口
pub use self::document::{Document, HostCapabilities, InsertPosition, NodeId};
pub use self::policy::{
    select_policy, EnforcedPolicy, Markup, RenderPolicy, SanitizeOnlyPolicy, TrustedHtml, TrustedScriptUrl,
    POLICY_NAME,
};
pub use self::gateway::SafeRenderer;
pub use self::thread::MessageThread;
