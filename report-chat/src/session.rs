//! Conversation session.
//!
//! A [`ConversationSession`] owns one conversation with the analysis service:
//! its id, its transcript and an optional pending attachment. State moves
//! `Uninitialized -> Creating -> Ready -> (Sending <-> Ready)`, and
//! [`ConversationSession::reset`] starts over from `Creating` at any point.
//!
//! Sending is split in two so that a request can be in flight while the owner
//! keeps control of the session: [`ConversationSession::begin_send`] records the
//! user message and hands back a [`PendingExchange`], the exchange is
//! dispatched, and [`ConversationSession::complete`] applies the result.
//! Results belonging to an earlier conversation (after a reset) are discarded.

use serde_json::Value;
use std::{fmt, sync::Arc};
use tracing::{error, info, warn};

use crate::{
    attachment::Attachment,
    error::{ChatError, Result},
    message::Message,
    normalize::{extract_conversation_id, normalize},
    service::ReportService,
};

/// Assistant reply recorded when the service cannot be reached
pub const FALLBACK_REPLY: &str =
    "Sorry, I could not reach the service. Please try again in a moment.";

/// Prompt used when a report is uploaded without any text
pub const DEFAULT_ANALYSIS_PROMPT: &str = "Please analyze this medical report.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Creating,
    Ready,
    Sending,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Creating => "creating",
            SessionState::Ready => "ready",
            SessionState::Sending => "sending",
        };
        f.write_str(label)
    }
}

/// What a pending exchange asks the service for
#[derive(Debug, Clone)]
pub enum ExchangeRequest {
    Chat { message: String },
    Analyze { attachment: Attachment, prompt: String },
}

/// An outbound request detached from the session that issued it.
///
/// Each exchange can be completed once; the session only accepts the one it
/// is currently waiting for.
#[derive(Debug)]
pub struct PendingExchange {
    epoch: u64,
    sequence: u64,
    conversation_id: String,
    request: ExchangeRequest,
}

impl PendingExchange {
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn request(&self) -> &ExchangeRequest {
        &self.request
    }

    pub async fn dispatch(&self, service: &dyn ReportService) -> Result<Value> {
        match &self.request {
            ExchangeRequest::Chat { message } => {
                service.chat(&self.conversation_id, message).await
            }
            ExchangeRequest::Analyze { attachment, prompt } => {
                service
                    .analyze_report(&self.conversation_id, attachment, prompt)
                    .await
            }
        }
    }
}

/// How a completed exchange affected the transcript
#[derive(Debug, Clone, PartialEq)]
pub enum ExchangeOutcome {
    /// The normalized service reply was appended
    Replied(Message),
    /// The request failed and the fallback reply was appended
    Fallback(Message),
    /// The exchange belonged to a previous conversation and was dropped
    Discarded,
}

impl ExchangeOutcome {
    pub fn message(&self) -> Option<&Message> {
        match self {
            ExchangeOutcome::Replied(message) | ExchangeOutcome::Fallback(message) => {
                Some(message)
            }
            ExchangeOutcome::Discarded => None,
        }
    }
}

pub struct ConversationSession {
    service: Arc<dyn ReportService>,
    title: String,
    conversation_id: Option<String>,
    state: SessionState,
    messages: Vec<Message>,
    pending_attachment: Option<Attachment>,
    epoch: u64,
    next_sequence: u64,
    in_flight: Option<u64>,
    creation_failed: bool,
}

impl ConversationSession {
    pub fn new(service: Arc<dyn ReportService>, title: impl Into<String>) -> Self {
        Self {
            service,
            title: title.into(),
            conversation_id: None,
            state: SessionState::Uninitialized,
            messages: Vec::new(),
            pending_attachment: None,
            epoch: 0,
            next_sequence: 0,
            in_flight: None,
            creation_failed: false,
        }
    }

    /// Create the conversation on the service.
    ///
    /// The id is assigned once; calling this again on a ready session is a no-op.
    /// On failure the session stays `Uninitialized` and later calls return
    /// `NotReady` without contacting the service until [`reset`](Self::reset).
    pub async fn initialize(&mut self) -> Result<&str> {
        if self.conversation_id.is_none() && !self.creation_failed {
            self.state = SessionState::Creating;
            info!("Creating conversation '{}'", self.title);

            let created = self
                .service
                .create_conversation(&self.title)
                .await
                .and_then(|raw| extract_conversation_id(&raw));

            match created {
                Ok(id) => {
                    info!("Conversation {} ready", id);
                    self.conversation_id = Some(id);
                    self.state = SessionState::Ready;
                }
                Err(e) => {
                    error!("Failed to create conversation: {}", e);
                    self.state = SessionState::Uninitialized;
                    self.creation_failed = true;
                    return Err(e);
                }
            }
        }

        self.conversation_id.as_deref().ok_or(ChatError::NotReady)
    }

    /// Drop the transcript, the pending attachment and the conversation id, then
    /// create a fresh conversation. Exchanges still in flight become stale.
    pub async fn reset(&mut self) -> Result<&str> {
        info!(
            "Resetting session (conversation {:?}, state {})",
            self.conversation_id, self.state
        );
        self.epoch += 1;
        self.conversation_id = None;
        self.messages.clear();
        self.pending_attachment = None;
        self.in_flight = None;
        self.creation_failed = false;
        self.state = SessionState::Uninitialized;

        self.initialize().await
    }

    /// Record a user message and prepare the request for it.
    ///
    /// A pending attachment turns this into a report analysis with `text` as
    /// the prompt.
    pub fn begin_send(&mut self, text: &str) -> Result<PendingExchange> {
        let conversation_id = self.ready_conversation_id()?;

        if let Some(attachment) = self.pending_attachment.take() {
            return Ok(self.start_analysis(conversation_id, attachment, text));
        }

        if text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        self.messages.push(Message::user(text));

        Ok(PendingExchange {
            epoch: self.epoch,
            sequence: self.mark_sending(),
            conversation_id,
            request: ExchangeRequest::Chat {
                message: text.to_string(),
            },
        })
    }

    /// Record a report upload and prepare the analysis request for it
    pub fn begin_analysis(
        &mut self,
        attachment: Attachment,
        prompt: &str,
    ) -> Result<PendingExchange> {
        let conversation_id = self.ready_conversation_id()?;
        Ok(self.start_analysis(conversation_id, attachment, prompt))
    }

    fn start_analysis(
        &mut self,
        conversation_id: String,
        attachment: Attachment,
        prompt: &str,
    ) -> PendingExchange {
        let prompt = if prompt.trim().is_empty() {
            DEFAULT_ANALYSIS_PROMPT
        } else {
            prompt
        };

        self.messages.push(Message::user_with_attachment(
            prompt,
            attachment.file_name(),
        ));

        PendingExchange {
            epoch: self.epoch,
            sequence: self.mark_sending(),
            conversation_id,
            request: ExchangeRequest::Analyze {
                attachment,
                prompt: prompt.to_string(),
            },
        }
    }

    fn mark_sending(&mut self) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.in_flight = Some(sequence);
        self.state = SessionState::Sending;
        sequence
    }

    fn ready_conversation_id(&self) -> Result<String> {
        match (self.state, &self.conversation_id) {
            (SessionState::Sending, _) => Err(ChatError::SendInProgress),
            (SessionState::Ready, Some(id)) => Ok(id.clone()),
            _ => Err(ChatError::NotReady),
        }
    }

    /// Apply the result of a dispatched exchange.
    ///
    /// Failures become the fallback reply; the session is ready again either way.
    /// Only the exchange currently in flight is applied, so a send gets at most
    /// one reply and results from before a reset are dropped.
    pub fn complete(&mut self, exchange: PendingExchange, result: Result<Value>) -> ExchangeOutcome {
        let current = self.state == SessionState::Sending
            && self.in_flight == Some(exchange.sequence)
            && self.epoch == exchange.epoch
            && self.conversation_id.as_deref() == Some(exchange.conversation_id.as_str());
        if !current {
            warn!(
                "Discarding stale response for conversation {} (exchange {})",
                exchange.conversation_id, exchange.sequence
            );
            return ExchangeOutcome::Discarded;
        }

        self.in_flight = None;
        self.state = SessionState::Ready;

        let outcome = match result {
            Ok(raw) => ExchangeOutcome::Replied(Message::assistant(normalize(&raw))),
            Err(e) => {
                error!(
                    "Request failed for conversation {}: {}",
                    exchange.conversation_id, e
                );
                ExchangeOutcome::Fallback(Message::assistant(FALLBACK_REPLY))
            }
        };

        if let Some(message) = outcome.message() {
            self.messages.push(message.clone());
        }
        outcome
    }

    /// Send a text message, or analyze the pending attachment with `text` as prompt
    pub async fn send_message(&mut self, text: &str) -> Result<ExchangeOutcome> {
        let exchange = self.begin_send(text)?;
        Ok(self.run_exchange(exchange).await)
    }

    /// Upload a report image for analysis
    pub async fn analyze_report(
        &mut self,
        attachment: Attachment,
        prompt: &str,
    ) -> Result<ExchangeOutcome> {
        let exchange = self.begin_analysis(attachment, prompt)?;
        Ok(self.run_exchange(exchange).await)
    }

    async fn run_exchange(&mut self, exchange: PendingExchange) -> ExchangeOutcome {
        let service = Arc::clone(&self.service);
        let result = exchange.dispatch(service.as_ref()).await;
        self.complete(exchange, result)
    }

    /// Keep an attachment to be analyzed with the next message
    pub fn attach(&mut self, attachment: Attachment) {
        info!("Attachment {} pending", attachment.file_name());
        self.pending_attachment = Some(attachment);
    }

    pub fn clear_attachment(&mut self) -> Option<Attachment> {
        self.pending_attachment.take()
    }

    pub fn pending_attachment(&self) -> Option<&Attachment> {
        self.pending_attachment.as_ref()
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn service(&self) -> Arc<dyn ReportService> {
        Arc::clone(&self.service)
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    /// True while a reply is being awaited ("typing" / "analyzing")
    pub fn is_busy(&self) -> bool {
        self.state == SessionState::Sending
    }

    pub fn connection_status(&self) -> &'static str {
        if self.conversation_id.is_some() {
            "Connected"
        } else {
            "Connecting…"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{attachment::tests::png, message::Role, message::MessageContent};
    use async_trait::async_trait;
    use serde_json::json;
    use std::{collections::VecDeque, sync::Mutex};

    /// Replays queued responses; an exhausted or `None` entry is a 503
    #[derive(Default)]
    struct ScriptedService {
        conversations: Mutex<VecDeque<Option<Value>>>,
        replies: Mutex<VecDeque<Option<Value>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedService {
        fn new(conversations: Vec<Option<Value>>, replies: Vec<Option<Value>>) -> Arc<Self> {
            Arc::new(Self {
                conversations: Mutex::new(conversations.into()),
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn next(queue: &Mutex<VecDeque<Option<Value>>>) -> Result<Value> {
            queue
                .lock()
                .unwrap()
                .pop_front()
                .flatten()
                .ok_or(ChatError::Status {
                    status: 503,
                    body: "unavailable".to_string(),
                })
        }
    }

    #[async_trait]
    impl ReportService for ScriptedService {
        async fn create_conversation(&self, title: &str) -> Result<Value> {
            self.calls.lock().unwrap().push(format!("create:{}", title));
            Self::next(&self.conversations)
        }

        async fn chat(&self, conversation_id: &str, message: &str) -> Result<Value> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("chat:{}:{}", conversation_id, message));
            Self::next(&self.replies)
        }

        async fn analyze_report(
            &self,
            conversation_id: &str,
            attachment: &Attachment,
            prompt: &str,
        ) -> Result<Value> {
            self.calls.lock().unwrap().push(format!(
                "analyze:{}:{}:{}",
                conversation_id,
                attachment.file_name(),
                prompt
            ));
            Self::next(&self.replies)
        }
    }

    async fn ready_session(service: Arc<ScriptedService>) -> ConversationSession {
        let mut session = ConversationSession::new(service, "Report");
        session.initialize().await.unwrap();
        session
    }

    #[tokio::test]
    async fn test_initialize_assigns_id_once() {
        let service = ScriptedService::new(vec![Some(json!({ "conversation_id": "c1" }))], vec![]);
        let mut session = ConversationSession::new(service.clone(), "Report");
        assert_eq!(session.state(), SessionState::Uninitialized);
        assert_eq!(session.connection_status(), "Connecting…");

        assert_eq!(session.initialize().await.unwrap(), "c1");
        assert_eq!(session.initialize().await.unwrap(), "c1");

        assert!(session.is_ready());
        assert_eq!(session.connection_status(), "Connected");
        assert_eq!(service.calls(), vec!["create:Report"]);
    }

    #[tokio::test]
    async fn test_failed_creation_disables_sending() {
        let service = ScriptedService::new(vec![None], vec![]);
        let mut session = ConversationSession::new(service.clone(), "Report");

        assert!(session.initialize().await.is_err());
        assert_eq!(session.state(), SessionState::Uninitialized);
        assert_eq!(session.connection_status(), "Connecting…");

        let err = session.send_message("hello").await.unwrap_err();
        assert!(matches!(err, ChatError::NotReady));
        assert!(session.messages().is_empty());
    }

    #[tokio::test]
    async fn test_failed_creation_is_not_retried_without_reset() {
        let service = ScriptedService::new(vec![None, Some(json!({ "id": "c1" }))], vec![]);
        let mut session = ConversationSession::new(service.clone(), "Report");

        assert!(session.initialize().await.is_err());
        assert!(matches!(session.initialize().await, Err(ChatError::NotReady)));
        assert_eq!(service.calls(), vec!["create:Report"]);

        assert_eq!(session.reset().await.unwrap(), "c1");
        assert_eq!(service.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_unusable_creation_response_is_a_failure() {
        let service = ScriptedService::new(vec![Some(json!({}))], vec![]);
        let mut session = ConversationSession::new(service, "Report");

        assert!(matches!(
            session.initialize().await,
            Err(ChatError::InvalidResponse(_))
        ));
        assert_eq!(session.state(), SessionState::Uninitialized);
    }

    #[tokio::test]
    async fn test_transport_failure_appends_fallback() {
        let service = ScriptedService::new(
            vec![Some(json!({ "id": "c1" }))],
            vec![None, Some(json!({ "response": "Hi there" }))],
        );
        let mut session = ready_session(service.clone()).await;

        let outcome = session.send_message("hello").await.unwrap();
        assert!(matches!(outcome, ExchangeOutcome::Fallback(_)));

        let messages = session.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content.as_text(), Some("hello"));
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].content.as_text(), Some(FALLBACK_REPLY));
        assert!(session.is_ready());

        let outcome = session.send_message("again").await.unwrap();
        assert_eq!(
            outcome.message().unwrap().content.as_text(),
            Some("Hi there")
        );
        assert_eq!(session.messages().len(), 4);
        assert_eq!(service.calls()[1..].to_vec(), vec!["chat:c1:hello", "chat:c1:again"]);
    }

    #[tokio::test]
    async fn test_structured_reply_is_normalized() {
        let service = ScriptedService::new(
            vec![Some(json!({ "_id": "c1" }))],
            vec![Some(json!({
                "result": { "summary": "Normal CBC", "urgency": "low" }
            }))],
        );
        let mut session = ready_session(service).await;

        let outcome = session.send_message("how is my blood count?").await.unwrap();
        let Some(MessageContent::Report(report)) = outcome.message().map(|m| &m.content) else {
            panic!("expected structured report, got {:?}", outcome);
        };
        assert_eq!(report.summary.as_deref(), Some("Normal CBC"));
    }

    #[tokio::test]
    async fn test_empty_message_is_rejected() {
        let service = ScriptedService::new(vec![Some(json!({ "id": "c1" }))], vec![]);
        let mut session = ready_session(service.clone()).await;

        assert!(matches!(
            session.send_message("   ").await,
            Err(ChatError::EmptyMessage)
        ));
        assert!(session.messages().is_empty());
        assert!(session.is_ready());
        assert_eq!(service.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_sends_do_not_overlap() {
        let service = ScriptedService::new(
            vec![Some(json!({ "id": "c1" }))],
            vec![Some(json!("first reply"))],
        );
        let mut session = ready_session(service.clone()).await;

        let exchange = session.begin_send("first").unwrap();
        assert!(session.is_busy());
        assert!(matches!(
            session.begin_send("second"),
            Err(ChatError::SendInProgress)
        ));

        let result = exchange.dispatch(service.as_ref()).await;
        session.complete(exchange, result);

        assert!(session.is_ready());
        assert_eq!(session.messages().len(), 2);
    }

    fn duplicate(exchange: &PendingExchange) -> PendingExchange {
        PendingExchange {
            epoch: exchange.epoch,
            sequence: exchange.sequence,
            conversation_id: exchange.conversation_id.clone(),
            request: exchange.request.clone(),
        }
    }

    #[tokio::test]
    async fn test_exchange_is_applied_once() {
        let service = ScriptedService::new(vec![Some(json!({ "id": "c1" }))], vec![]);
        let mut session = ready_session(service).await;

        let exchange = session.begin_send("hi").unwrap();
        let copy = duplicate(&exchange);

        let first = session.complete(exchange, Ok(json!({ "response": "one" })));
        assert!(matches!(first, ExchangeOutcome::Replied(_)));

        let second = session.complete(copy, Ok(json!({ "response": "two" })));
        assert_eq!(second, ExchangeOutcome::Discarded);
        assert_eq!(session.messages().len(), 2);
        assert!(session.is_ready());
    }

    #[tokio::test]
    async fn test_earlier_exchange_cannot_answer_current_send() {
        let service = ScriptedService::new(vec![Some(json!({ "id": "c1" }))], vec![]);
        let mut session = ready_session(service).await;

        let first = session.begin_send("first").unwrap();
        let earlier = duplicate(&first);
        session.complete(first, Ok(json!("reply one")));

        let second = session.begin_send("second").unwrap();
        assert_eq!(
            session.complete(earlier, Ok(json!("late duplicate"))),
            ExchangeOutcome::Discarded
        );
        assert!(session.is_busy());

        let outcome = session.complete(second, Ok(json!("reply two")));
        assert_eq!(
            outcome.message().unwrap().content.as_text(),
            Some("reply two")
        );
        assert_eq!(session.messages().len(), 4);
    }

    #[tokio::test]
    async fn test_pending_attachment_uses_text_as_prompt() {
        let service = ScriptedService::new(
            vec![Some(json!({ "id": "c1" }))],
            vec![Some(json!({ "urgency": "routine" }))],
        );
        let mut session = ready_session(service.clone()).await;

        session.attach(png("glucose.png"));
        let outcome = session.send_message("Is my fasting glucose high?").await.unwrap();
        assert!(matches!(outcome, ExchangeOutcome::Replied(_)));

        let user = &session.messages()[0];
        assert_eq!(user.attached_file_name.as_deref(), Some("glucose.png"));
        assert_eq!(user.content.as_text(), Some("Is my fasting glucose high?"));
        assert_eq!(
            service.calls()[1],
            "analyze:c1:glucose.png:Is my fasting glucose high?"
        );
        assert!(session.pending_attachment().is_none());
    }

    #[tokio::test]
    async fn test_pending_attachment_routes_to_analysis() {
        let service = ScriptedService::new(
            vec![Some(json!({ "conversation_id": "c1" }))],
            vec![Some(json!({ "summary": "Looks fine" }))],
        );
        let mut session = ready_session(service.clone()).await;

        session.attach(png("lipids.png"));
        assert!(session.pending_attachment().is_some());

        let outcome = session.send_message("").await.unwrap();
        assert!(matches!(outcome, ExchangeOutcome::Replied(_)));
        assert!(session.pending_attachment().is_none());

        let user = &session.messages()[0];
        assert_eq!(user.attached_file_name.as_deref(), Some("lipids.png"));
        assert_eq!(user.content.as_text(), Some(DEFAULT_ANALYSIS_PROMPT));
        assert_eq!(
            service.calls()[1],
            format!("analyze:c1:lipids.png:{}", DEFAULT_ANALYSIS_PROMPT)
        );
    }

    #[tokio::test]
    async fn test_analyze_report_keeps_prompt() {
        let service = ScriptedService::new(vec![Some(json!({ "id": "c1" }))], vec![None]);
        let mut session = ready_session(service.clone()).await;

        let outcome = session
            .analyze_report(png("thyroid.png"), "Is my TSH ok?")
            .await
            .unwrap();

        assert!(matches!(outcome, ExchangeOutcome::Fallback(_)));
        assert_eq!(session.messages()[0].content.as_text(), Some("Is my TSH ok?"));
        assert_eq!(service.calls()[1], "analyze:c1:thyroid.png:Is my TSH ok?");
    }

    #[tokio::test]
    async fn test_reset_during_send_discards_stale_reply() {
        let service = ScriptedService::new(
            vec![Some(json!({ "id": "old" })), Some(json!({ "id": "new" }))],
            vec![Some(json!({ "response": "late answer" }))],
        );
        let mut session = ready_session(service.clone()).await;

        let exchange = session.begin_send("hello").unwrap();
        assert_eq!(session.messages().len(), 1);

        assert_eq!(session.reset().await.unwrap(), "new");
        assert!(session.messages().is_empty());

        let result = exchange.dispatch(service.as_ref()).await;
        assert_eq!(session.complete(exchange, result), ExchangeOutcome::Discarded);

        assert!(session.messages().is_empty());
        assert!(session.is_ready());
        assert_eq!(session.conversation_id(), Some("new"));
        assert_eq!(
            service.calls(),
            vec!["create:Report", "chat:old:hello", "create:Report"]
        );
    }

    #[tokio::test]
    async fn test_reset_clears_attachment_and_retries_creation() {
        let service = ScriptedService::new(vec![None, Some(json!({ "id": "c2" }))], vec![]);
        let mut session = ConversationSession::new(service.clone(), "Report");
        assert!(session.initialize().await.is_err());

        session.attach(png("scan.png"));
        assert_eq!(session.reset().await.unwrap(), "c2");
        assert!(session.pending_attachment().is_none());
        assert!(session.is_ready());
    }
}
