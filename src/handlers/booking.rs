use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::{BookingAction, ConversationState, Turn};
use crate::state::AppState;

#[derive(Serialize)]
pub struct TurnResponse {
    pub session_id: String,
    pub message: String,
    pub state: ConversationState,
    pub action: BookingAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appointment_id: Option<String>,
}

impl TurnResponse {
    fn from_turn(session_id: String, turn: Turn) -> Self {
        Self {
            session_id,
            state: turn.state(),
            appointment_id: turn.context.appointment_id.clone(),
            message: turn.message,
            action: turn.action,
        }
    }
}

// POST /api/booking/start
#[derive(Deserialize)]
pub struct StartRequest {
    pub student_id: String,
}

pub async fn start(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<StartRequest>,
) -> Result<Json<TurnResponse>, AppError> {
    let student_id = payload.student_id.trim();
    if student_id.is_empty() {
        return Err(AppError::BadRequest("student_id is required".into()));
    }

    let (context, greeting) = state.conversation.initialize_booking(student_id)?;
    let session_id = state.sessions.create(context.clone());

    Ok(Json(TurnResponse::from_turn(
        session_id,
        Turn::new(context, greeting, BookingAction::Prompt),
    )))
}

// POST /api/booking/message
#[derive(Deserialize)]
pub struct MessageRequest {
    pub session_id: String,
    pub message: String,
}

pub async fn message(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<MessageRequest>,
) -> Result<Json<TurnResponse>, AppError> {
    let context = state
        .sessions
        .get(&payload.session_id)
        .ok_or_else(|| AppError::NotFound(format!("session {}", payload.session_id)))?;

    let turn = state.conversation.process(&payload.message, &context).await?;

    if turn.state().is_terminal() {
        state.sessions.remove(&payload.session_id);
    } else {
        state.sessions.put(&payload.session_id, turn.context.clone());
    }

    tracing::debug!(
        session_id = %payload.session_id,
        state = turn.state().as_str(),
        "booking turn processed"
    );
    Ok(Json(TurnResponse::from_turn(payload.session_id, turn)))
}
