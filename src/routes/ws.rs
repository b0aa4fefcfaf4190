//! WebSocket upgrades.
//!
//! `/ws` is the quiz channel: each client message is parsed as JSON and
//! forwarded to core logic, with a single JSON reply per request.
//! `/ws/voice` hands the socket to the live voice bridge.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    Query, State, WebSocketUpgrade,
  },
  response::{IntoResponse, Response},
};
use tracing::{debug, error, info, instrument};

use crate::domain::Language;
use crate::error::{Operation, QuizError};
use crate::logic::*;
use crate::protocol::{ClientWsMessage, ProfileQuery, ServerWsMessage, SettingsIn};
use crate::routes::http::ApiError;
use crate::state::{AppState, SessionHandle};
use crate::voice;

#[instrument(level = "info", skip(ws, state))]
pub async fn ws_upgrade(
  ws: WebSocketUpgrade,
  State(state): State<Arc<AppState>>,
  Query(q): Query<ProfileQuery>,
) -> Response {
  let handle = match state.session(&q.profile).await {
    Ok(h) => h,
    Err(e) => return ApiError::new(e, Language::default(), Operation::Results).into_response(),
  };
  info!(target: "worldview_quiz", profile = %q.profile, "Quiz WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state, handle))
}

#[instrument(level = "info", skip(ws, state))]
pub async fn voice_upgrade(
  ws: WebSocketUpgrade,
  State(state): State<Arc<AppState>>,
  Query(q): Query<ProfileQuery>,
) -> Response {
  let handle = match state.session(&q.profile).await {
    Ok(h) => h,
    Err(e) => return ApiError::new(e, Language::default(), Operation::Voice).into_response(),
  };
  info!(target: "voice", profile = %q.profile, "Voice WebSocket upgrade requested");
  ws.on_upgrade(move |socket| voice::run(socket, state, handle))
}

#[instrument(level = "info", skip_all, fields(profile = %handle.profile))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>, handle: Arc<SessionHandle>) {
  info!(target: "worldview_quiz", "WebSocket connected");
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "worldview_quiz", "WS received: {:?}", &incoming);
            handle_client_ws(incoming, &state, &handle).await
          }
          Err(e) => error_reply(&handle, Operation::Answer, QuizError::InvalidMessage(e.to_string())).await,
        };

        let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
        });

        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "worldview_quiz", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "worldview_quiz", "WebSocket disconnected");
}

async fn handle_client_ws(msg: ClientWsMessage, state: &Arc<AppState>, handle: &Arc<SessionHandle>) -> ServerWsMessage {
  let (result, op) = match msg {
    ClientWsMessage::Ping => return ServerWsMessage::Pong,
    ClientWsMessage::Sync => return ServerWsMessage::Quiz { quiz: quiz_view(state, handle).await },
    ClientWsMessage::Start | ClientWsMessage::Restart => {
      (start_quiz(state, handle).await.map(|quiz| ServerWsMessage::Quiz { quiz }), Operation::Answer)
    }
    ClientWsMessage::Exit => (exit_quiz(state, handle).await.map(|quiz| ServerWsMessage::Quiz { quiz }), Operation::Answer),
    ClientWsMessage::Previous => {
      (previous_question(state, handle).await.map(|quiz| ServerWsMessage::Quiz { quiz }), Operation::Answer)
    }
    ClientWsMessage::LoadOptions => {
      (load_options(state, handle).await.map(|options| ServerWsMessage::Options { options }), Operation::Options)
    }
    ClientWsMessage::SubmitAnswer { answer } => (
      submit_answer(state, handle, answer).await.map(|result| ServerWsMessage::AnswerResult { result }),
      Operation::Answer,
    ),
    ClientWsMessage::SetLanguage { language } => {
      let input = SettingsIn { language: Some(language), tts_enabled: None };
      (update_settings(state, handle, input).await.map(|settings| ServerWsMessage::Settings { settings }), Operation::Options)
    }
    ClientWsMessage::Results => {
      return ServerWsMessage::Results { results: results_view(state, handle).await };
    }
    ClientWsMessage::Report => (report_for(state, handle).await.map(|report| ServerWsMessage::Report { report }), Operation::Report),
    ClientWsMessage::Save => (save_current(state, handle).await.map(|status| ServerWsMessage::Saved { status }), Operation::Results),
    ClientWsMessage::Share => (share_current(state, handle).await.map(|share| ServerWsMessage::Share { share }), Operation::Share),
  };
  match result {
    Ok(reply) => reply,
    Err(e) => error_reply(handle, op, e).await,
  }
}

async fn error_reply(handle: &SessionHandle, op: Operation, err: QuizError) -> ServerWsMessage {
  let lang = handle.quiz.lock().await.language();
  debug!(target: "quiz", ?op, error = %err, "WS request failed");
  ServerWsMessage::Error { message: err.user_message(lang, op) }
}
