//! Client core for chatting with a remote medical report analysis service.
//!
//! A [`ConversationSession`] creates a conversation, sends chat messages and
//! report images, and turns every reply into either text or a
//! [`StructuredReport`] via [`normalize`].

pub mod attachment;
pub mod config;
pub mod error;
pub mod message;
pub mod normalize;
pub mod render;
pub mod report;
pub mod service;
pub mod session;

pub use attachment::Attachment;
pub use config::ClientConfig;
pub use error::{ChatError, Result};
pub use message::{Message, MessageContent, Role};
pub use normalize::{extract_conversation_id, normalize};
pub use render::{render_content, render_message, render_report};
pub use report::{ListField, StructuredReport, Urgency, is_structured_report, to_list};
pub use service::{HttpReportService, ReportService};
pub use session::{
    ConversationSession, DEFAULT_ANALYSIS_PROMPT, ExchangeOutcome, ExchangeRequest, FALLBACK_REPLY,
    PendingExchange, SessionState,
};
