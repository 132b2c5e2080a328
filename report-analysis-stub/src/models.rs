use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub exchanges: u32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CreateConversationRequest {
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateConversationResponse {
    pub conversation_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub conversation_id: String,
}

/// Analysis body in the camelCase shape the chat client expects
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportAnalysis {
    pub summary: String,
    pub abnormal_findings: Vec<String>,
    pub recommended_tests: String,
    pub lifestyle_suggestions: Vec<String>,
    pub urgency: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeReportResponse {
    pub conversation_id: String,
    pub file_name: String,
    pub prompt: String,
    pub analysis: ReportAnalysis,
}
