use axum::{
    Router,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use chrono::Utc;
use dashmap::DashMap;
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    analysis,
    models::{
        AnalyzeReportResponse, ChatRequest, ChatResponse, Conversation,
        CreateConversationRequest, CreateConversationResponse,
    },
};

const ACCEPTED_CONTENT_TYPES: &[&str] = &["image/png", "image/jpeg", "image/webp"];
const DEFAULT_TITLE: &str = "New conversation";

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;
type ApiError = (StatusCode, Json<Value>);

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn not_found_error(message: &str, id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": message,
            "conversation_id": id
        })),
    )
}

fn unsupported_media_error(content_type: &str) -> ApiError {
    (
        StatusCode::UNSUPPORTED_MEDIA_TYPE,
        Json(json!({
            "error": "Only PNG, JPEG and WebP images are accepted",
            "content_type": content_type
        })),
    )
}

#[derive(Clone, Default)]
pub struct AppState {
    pub conversations: Arc<DashMap<String, Conversation>>,
}

pub fn create_app() -> Router {
    build_router(AppState::default())
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/conversation/", post(create_conversation))
        .route("/chat/{conversation_id}", post(chat))
        .route("/analyze-report/{conversation_id}", post(analyze_report))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Medical Report Analysis Stub",
        "version": "0.1.0",
        "endpoints": {
            "POST /conversation/": "Create a conversation",
            "POST /chat/{conversation_id}": "Send a chat message",
            "POST /analyze-report/{conversation_id}": "Upload a report image (multipart: file, message)",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "conversations": state.conversations.len(),
        "timestamp": Utc::now().to_rfc3339()
    }))
}

async fn create_conversation(
    State(state): State<AppState>,
    Json(request): Json<CreateConversationRequest>,
) -> ApiResult<CreateConversationResponse> {
    let title = request
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_TITLE.to_string());

    let conversation = Conversation {
        id: Uuid::new_v4().to_string(),
        title,
        created_at: Utc::now(),
        exchanges: 0,
    };
    info!(
        "Created conversation {} ('{}')",
        conversation.id, conversation.title
    );

    let response = CreateConversationResponse {
        conversation_id: conversation.id.clone(),
        title: conversation.title.clone(),
        created_at: conversation.created_at,
    };
    state
        .conversations
        .insert(conversation.id.clone(), conversation);

    Ok(Json(response))
}

/// Count an exchange on a known conversation, returning the count before it
fn record_exchange(state: &AppState, conversation_id: &str) -> Result<u32, ApiError> {
    let mut conversation = state
        .conversations
        .get_mut(conversation_id)
        .ok_or_else(|| not_found_error("Conversation not found", conversation_id))?;

    let previous = conversation.exchanges;
    conversation.exchanges += 1;
    Ok(previous)
}

async fn chat(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<ChatResponse> {
    if request.message.trim().is_empty() {
        return Err(bad_request_error("Message cannot be empty"));
    }

    let exchanges = record_exchange(&state, &conversation_id)?;
    info!("Chat message for conversation {}", conversation_id);

    Ok(Json(ChatResponse {
        response: analysis::chat_reply(&request.message, exchanges),
        conversation_id,
    }))
}

struct Upload {
    file_name: String,
    content_type: String,
    size: usize,
}

async fn analyze_report(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    mut multipart: Multipart,
) -> ApiResult<AnalyzeReportResponse> {
    if !state.conversations.contains_key(&conversation_id) {
        return Err(not_found_error("Conversation not found", &conversation_id));
    }

    let mut upload = None;
    let mut prompt = String::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request_error(&format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or("report").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request_error(&format!("Failed to read file: {}", e)))?;
                upload = Some(Upload {
                    file_name,
                    content_type,
                    size: bytes.len(),
                });
            }
            Some("message") => {
                prompt = field
                    .text()
                    .await
                    .map_err(|e| bad_request_error(&format!("Failed to read message: {}", e)))?;
            }
            other => warn!("Ignoring unexpected multipart field {:?}", other),
        }
    }

    let upload = upload.ok_or_else(|| bad_request_error("A report file is required"))?;
    if !ACCEPTED_CONTENT_TYPES.contains(&upload.content_type.as_str()) {
        return Err(unsupported_media_error(&upload.content_type));
    }
    if upload.size == 0 {
        return Err(bad_request_error("Uploaded file is empty"));
    }

    record_exchange(&state, &conversation_id)?;
    info!(
        "Analyzing {} ({}, {} bytes) for conversation {}",
        upload.file_name, upload.content_type, upload.size, conversation_id
    );

    Ok(Json(AnalyzeReportResponse {
        analysis: analysis::analyze(&upload.file_name, &prompt),
        conversation_id,
        file_name: upload.file_name,
        prompt,
    }))
}
