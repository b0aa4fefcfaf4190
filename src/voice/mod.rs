//! Live voice answering: bridges a client WebSocket (microphone PCM in,
//! scheduled speech out) to a Gemini Live session.
//!
//! The session owns both sockets, the chunker and the playback scheduler for
//! its whole life. Any error ends it, and every exit path goes through
//! [`VoiceSession::teardown`].

pub mod bridge;
pub mod chunker;
pub mod live;
pub mod playback;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message as RemoteMessage, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, instrument, warn};

use crate::domain::Language;
use crate::error::{GenAiError, Operation, QuizError};
use crate::logic::{self, describe_options};
use crate::protocol::{AnswerIn, VoiceClientMessage, VoiceServerMessage};
use crate::state::{AppState, SessionHandle};
use crate::util::fill_template;

use self::bridge::{AnsweredTurn, BridgeAction, VoiceBridge};
use self::live::{FunctionCall, LiveEndpoint, SubmitAnswerArgs};

type RemoteStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const SETUP_TIMEOUT: Duration = Duration::from_secs(15);

fn voice_err(e: impl std::fmt::Display) -> QuizError {
  QuizError::Voice(e.to_string())
}

/// Serve one voice connection until either side closes or something fails.
#[instrument(level = "info", skip_all, fields(profile = %handle.profile))]
pub async fn run(mut client: WebSocket, state: Arc<AppState>, handle: Arc<SessionHandle>) {
  let lang = handle.quiz.lock().await.language();
  let Some(endpoint) = state.live.clone() else {
    let message = QuizError::Remote(GenAiError::NotConfigured).user_message(lang, Operation::Voice);
    let _ = send_client(&mut client, &VoiceServerMessage::Error { message }).await;
    let _ = client.send(Message::Close(None)).await;
    return;
  };

  let mut session = match VoiceSession::open(&state, &handle, &endpoint, &mut client).await {
    Ok(s) => s,
    Err(e) => {
      warn!(target: "voice", error = %e, "Voice session could not start");
      let message = e.user_message(lang, Operation::Voice);
      let _ = send_client(&mut client, &VoiceServerMessage::Error { message }).await;
      let _ = client.send(Message::Close(None)).await;
      return;
    }
  };

  let reason = match session.pump(&mut client, &state, &handle).await {
    Ok(reason) => reason,
    Err(e) => {
      warn!(target: "voice", error = %e, "Voice session failed");
      let message = e.user_message(lang, Operation::Voice);
      let _ = send_client(&mut client, &VoiceServerMessage::Error { message }).await;
      "error".to_string()
    }
  };
  session.teardown(client, reason).await;
}

async fn send_client(client: &mut WebSocket, msg: &VoiceServerMessage) -> Result<(), QuizError> {
  let text = serde_json::to_string(msg).map_err(voice_err)?;
  client.send(Message::Text(text)).await.map_err(voice_err)
}

struct VoiceSession {
  remote: RemoteStream,
  bridge: VoiceBridge,
  clock: Instant,
  lang: Language,
}

impl VoiceSession {
  async fn open(
    state: &Arc<AppState>,
    handle: &Arc<SessionHandle>,
    endpoint: &LiveEndpoint,
    client: &mut WebSocket,
  ) -> Result<Self, QuizError> {
    let (context, lang) = logic::voice_context(state, handle).await?;
    let instruction = fill_template(
      &state.config.prompts.voice_system_template,
      &[
        ("language", lang.prompt_name()),
        ("question", &context.question.text),
        ("options", &describe_options(&context.options)),
      ],
    );

    let (mut remote, _) = connect_async(endpoint.url.as_str()).await.map_err(voice_err)?;
    let setup = serde_json::to_string(&live::setup_message(&endpoint.model, instruction, lang)).map_err(voice_err)?;
    remote.send(RemoteMessage::Text(setup)).await.map_err(voice_err)?;
    tokio::time::timeout(SETUP_TIMEOUT, wait_for_setup(&mut remote))
      .await
      .map_err(|_| voice_err("live setup timed out"))??;
    info!(target: "voice", model = %endpoint.model, question = %context.question.id, "Live session ready");

    send_client(
      client,
      &VoiceServerMessage::Ready { language: lang, question: context.question, options: context.options },
    )
    .await?;

    let mut session = Self { remote, bridge: VoiceBridge::new(lang), clock: Instant::now(), lang };
    session.send_remote(live::client_text("Please begin: read the question and its options aloud.")).await?;
    Ok(session)
  }

  /// Relay until a side closes. Returns the close reason.
  async fn pump(
    &mut self,
    client: &mut WebSocket,
    state: &Arc<AppState>,
    handle: &Arc<SessionHandle>,
  ) -> Result<String, QuizError> {
    loop {
      tokio::select! {
        incoming = client.recv() => match incoming {
          Some(Ok(Message::Binary(pcm))) => {
            for frame in self.bridge.on_client_audio(&pcm) {
              self.send_remote(frame).await?;
            }
          }
          Some(Ok(Message::Text(txt))) => match serde_json::from_str::<VoiceClientMessage>(&txt) {
            Ok(VoiceClientMessage::AudioEnd) => {
              for frame in self.bridge.on_client_audio_end() {
                self.send_remote(frame).await?;
              }
            }
            Ok(VoiceClientMessage::Text { text }) => self.send_remote(live::client_text(&text)).await?,
            Ok(VoiceClientMessage::Stop) => return Ok("stopped by client".into()),
            Err(e) => {
              debug!(target: "voice", error = %e, "Unparsable client message");
              send_client(client, &self.bridge.invalid_client_message(&e)).await?
            }
          },
          Some(Ok(Message::Close(_))) | None => return Ok("client closed".into()),
          Some(Ok(_)) => {}
          Some(Err(e)) => return Err(voice_err(e)),
        },
        frame = self.remote.next() => {
          let bytes = match frame {
            Some(Ok(RemoteMessage::Text(t))) => t.into_bytes(),
            Some(Ok(RemoteMessage::Binary(b))) => b,
            Some(Ok(RemoteMessage::Close(_))) | None => return Ok("remote closed".into()),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(voice_err(e)),
          };
          let events = live::parse_server_frame(&bytes)?;
          for event in events {
            let now = self.clock.elapsed().as_secs_f64();
            let actions = self.bridge.on_remote_event(event, now);
            if let Some(reason) = self.execute(actions, client, state, handle).await? {
              return Ok(reason);
            }
          }
        }
      }
    }
  }

  async fn execute(
    &mut self,
    actions: Vec<BridgeAction>,
    client: &mut WebSocket,
    state: &Arc<AppState>,
    handle: &Arc<SessionHandle>,
  ) -> Result<Option<String>, QuizError> {
    let mut queue = VecDeque::from(actions);
    while let Some(action) = queue.pop_front() {
      match action {
        BridgeAction::ToClient(msg) => send_client(client, &msg).await?,
        BridgeAction::ToRemote(v) => self.send_remote(v).await?,
        BridgeAction::SubmitAnswer { call, args } => {
          let outcome = record_spoken_answer(&call, args, state, handle).await?;
          queue.extend(self.bridge.answer_actions(&call, outcome));
        }
        BridgeAction::Close(reason) => return Ok(Some(reason)),
      }
    }
    Ok(None)
  }

  async fn send_remote(&mut self, msg: Value) -> Result<(), QuizError> {
    self.remote.send(RemoteMessage::Text(msg.to_string())).await.map_err(voice_err)
  }

  /// Release everything the session holds. Safe to reach from any exit path.
  async fn teardown(mut self, mut client: WebSocket, reason: String) {
    let dropped = self.bridge.teardown();
    if !dropped.is_empty() {
      let _ = send_client(&mut client, &VoiceServerMessage::Flush { seqs: dropped }).await;
    }
    let _ = send_client(&mut client, &VoiceServerMessage::Closed { reason: reason.clone() }).await;
    if let Err(e) = self.remote.close(None).await {
      debug!(target: "voice", error = %e, "Remote close failed");
    }
    let _ = client.send(Message::Close(None)).await;
    info!(target: "voice", %reason, lang = self.lang.code(), elapsed = ?self.clock.elapsed(), "Voice session closed");
  }
}

/// Record a spoken answer. Rejections are returned for the model to handle;
/// failing to load the next question ends the session.
async fn record_spoken_answer(
  call: &FunctionCall,
  args: SubmitAnswerArgs,
  state: &Arc<AppState>,
  handle: &Arc<SessionHandle>,
) -> Result<Result<AnsweredTurn, QuizError>, QuizError> {
  let input = AnswerIn { question_id: None, score: args.score(), option_text: args.option_text, remark: args.remark };
  let result = match logic::submit_answer(state, handle, input).await {
    Ok(r) => r,
    Err(e) if e.is_client_error() => {
      debug!(target: "voice", call_id = ?call.id, error = %e, "Spoken answer rejected");
      return Ok(Err(e));
    }
    Err(e) => return Err(e),
  };
  info!(target: "voice", call_id = ?call.id, completed = result.completed, "Spoken answer recorded");
  let next = if result.completed { None } else { Some(logic::voice_context(state, handle).await?.0) };
  Ok(Ok(AnsweredTurn { result, next }))
}

async fn wait_for_setup(remote: &mut RemoteStream) -> Result<(), QuizError> {
  while let Some(frame) = remote.next().await {
    let bytes = match frame.map_err(voice_err)? {
      RemoteMessage::Text(t) => t.into_bytes(),
      RemoteMessage::Binary(b) => b,
      RemoteMessage::Close(f) => return Err(voice_err(format!("remote closed during setup: {f:?}"))),
      _ => continue,
    };
    if live::parse_server_frame(&bytes)?.contains(&live::LiveEvent::SetupComplete) {
      return Ok(());
    }
  }
  Err(voice_err("remote closed during setup"))
}
