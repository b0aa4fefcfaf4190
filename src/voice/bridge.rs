//! Event handling for one voice session, free of I/O.
//!
//! The session loop feeds client audio and remote events in and executes the
//! returned actions; everything stateful (chunker, playback cursor) lives here.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};

use crate::domain::Language;
use crate::error::{Operation, QuizError};
use crate::logic::describe_options;
use crate::protocol::{AnswerOut, OptionsOut, Speaker, VoiceServerMessage};
use crate::voice::chunker::PcmChunker;
use crate::voice::live::{self, FunctionCall, LiveEvent, SubmitAnswerArgs, SUBMIT_ANSWER};
use crate::voice::playback::{PlaybackScheduler, OUTPUT_SAMPLE_RATE};

#[derive(Debug)]
pub enum BridgeAction {
  ToClient(VoiceServerMessage),
  ToRemote(Value),
  /// Route into the quiz answer path, then reply with [`VoiceBridge::answer_actions`].
  SubmitAnswer { call: FunctionCall, args: SubmitAnswerArgs },
  Close(String),
}

/// Outcome of a voice answer as seen by the model.
pub struct AnsweredTurn {
  pub result: AnswerOut,
  /// Options for the question that comes next; None once the quiz is complete.
  pub next: Option<OptionsOut>,
}

pub struct VoiceBridge {
  lang: Language,
  chunker: PcmChunker,
  scheduler: PlaybackScheduler,
}

impl VoiceBridge {
  pub fn new(lang: Language) -> Self {
    Self { lang, chunker: PcmChunker::new(), scheduler: PlaybackScheduler::new(OUTPUT_SAMPLE_RATE) }
  }

  /// Microphone bytes in, `realtimeInput` messages out.
  pub fn on_client_audio(&mut self, bytes: &[u8]) -> Vec<Value> {
    self.chunker.push(bytes).iter().map(|c| live::realtime_audio(c)).collect()
  }

  pub fn on_client_audio_end(&mut self) -> Vec<Value> {
    let mut out: Vec<Value> = self.chunker.flush().iter().map(|c| live::realtime_audio(c)).collect();
    out.push(live::audio_stream_end());
    out
  }

  pub fn on_remote_event(&mut self, event: LiveEvent, now: f64) -> Vec<BridgeAction> {
    match event {
      LiveEvent::SetupComplete => vec![],
      LiveEvent::Audio(pcm) => {
        let chunk = self.scheduler.schedule(now, pcm.len());
        vec![BridgeAction::ToClient(VoiceServerMessage::Audio {
          seq: chunk.seq,
          start_at: chunk.start_at,
          duration: chunk.duration,
          data: STANDARD.encode(&pcm),
        })]
      }
      LiveEvent::Interrupted => {
        let seqs = self.scheduler.interrupt();
        vec![BridgeAction::ToClient(VoiceServerMessage::Flush { seqs })]
      }
      LiveEvent::TurnComplete => vec![BridgeAction::ToClient(VoiceServerMessage::TurnComplete)],
      LiveEvent::InputTranscript(text) => {
        vec![BridgeAction::ToClient(VoiceServerMessage::Transcript { speaker: Speaker::User, text })]
      }
      LiveEvent::OutputTranscript(text) => {
        vec![BridgeAction::ToClient(VoiceServerMessage::Transcript { speaker: Speaker::Host, text })]
      }
      LiveEvent::FunctionCall(call) if call.name == SUBMIT_ANSWER => match call.submit_answer_args() {
        Ok(args) => vec![BridgeAction::SubmitAnswer { call, args }],
        Err(e) => vec![BridgeAction::ToRemote(live::tool_response(&call, json!({ "ok": false, "error": e.to_string() })))],
      },
      LiveEvent::FunctionCall(call) => {
        let error = format!("unknown function {}", call.name);
        vec![BridgeAction::ToRemote(live::tool_response(&call, json!({ "ok": false, "error": error })))]
      }
      LiveEvent::GoAway => vec![BridgeAction::Close("remote session ending".into())],
    }
  }

  /// Reply to the model's `submitAnswer` call and tell the client what happened.
  /// A rejected answer goes back to the model so it can ask again.
  pub fn answer_actions(&self, call: &FunctionCall, outcome: Result<AnsweredTurn, QuizError>) -> Vec<BridgeAction> {
    match outcome {
      Ok(turn) => {
        let response = match &turn.next {
          Some(next) => json!({
            "ok": true,
            "completed": false,
            "nextQuestion": next.question.text,
            "options": describe_options(&next.options),
          }),
          None => json!({ "ok": true, "completed": turn.result.completed }),
        };
        vec![
          BridgeAction::ToRemote(live::tool_response(call, response)),
          BridgeAction::ToClient(VoiceServerMessage::AnswerRecorded { result: turn.result }),
        ]
      }
      Err(e) => {
        let message = e.user_message(self.lang, Operation::Answer);
        vec![
          BridgeAction::ToRemote(live::tool_response(call, json!({ "ok": false, "error": message }))),
          BridgeAction::ToClient(VoiceServerMessage::Error { message }),
        ]
      }
    }
  }

  /// Localized reply to a client frame that did not parse.
  pub fn invalid_client_message(&self, err: impl std::fmt::Display) -> VoiceServerMessage {
    let message = QuizError::InvalidMessage(err.to_string()).user_message(self.lang, Operation::Voice);
    VoiceServerMessage::Error { message }
  }

  /// Release buffered audio. Returns the playback seqs the client must drop.
  pub fn teardown(&mut self) -> Vec<u64> {
    self.chunker.clear();
    self.scheduler.interrupt()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::bank::QuestionView;
  use crate::domain::{GeneratedOption, Screen};
  use crate::protocol::QuizView;
  use crate::voice::chunker::CHUNK_BYTES;

  fn call(args: Value) -> FunctionCall {
    FunctionCall { id: Some("c1".into()), name: SUBMIT_ANSWER.into(), args }
  }

  fn answer_out(completed: bool) -> AnswerOut {
    AnswerOut {
      advanced: true,
      completed,
      quiz: QuizView {
        screen: if completed { Screen::Results } else { Screen::Quiz },
        language: Language::En,
        index: 1,
        total: 2,
        answered: 1,
        question: None,
        current_answer: None,
        images: vec![],
      },
    }
  }

  #[test]
  fn audio_is_scheduled_and_interrupt_flushes() {
    let mut b = VoiceBridge::new(Language::En);
    let pcm = vec![0u8; 48_000]; // 1s at 24 kHz
    let first = b.on_remote_event(LiveEvent::Audio(pcm.clone()), 0.5);
    let second = b.on_remote_event(LiveEvent::Audio(pcm), 0.6);
    let BridgeAction::ToClient(VoiceServerMessage::Audio { seq, start_at, .. }) = &first[0] else { panic!() };
    assert_eq!((*seq, *start_at), (0, 0.5));
    let BridgeAction::ToClient(VoiceServerMessage::Audio { seq, start_at, duration, .. }) = &second[0] else { panic!() };
    assert_eq!((*seq, *start_at, *duration), (1, 1.5, 1.0));

    let flushed = b.on_remote_event(LiveEvent::Interrupted, 0.7);
    let BridgeAction::ToClient(VoiceServerMessage::Flush { seqs }) = &flushed[0] else { panic!() };
    assert_eq!(seqs, &vec![0, 1]);
    assert!(b.teardown().is_empty());
  }

  #[test]
  fn microphone_audio_is_rechunked() {
    let mut b = VoiceBridge::new(Language::En);
    assert!(b.on_client_audio(&[0u8; 100]).is_empty());
    let sent = b.on_client_audio(&vec![0u8; CHUNK_BYTES]);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["realtimeInput"]["audio"]["mimeType"], "audio/pcm;rate=16000");
    let tail = b.on_client_audio_end();
    assert_eq!(tail.len(), 2);
    assert_eq!(tail[1]["realtimeInput"]["audioStreamEnd"], true);
  }

  #[test]
  fn submit_answer_call_is_routed_and_unknown_calls_are_refused() {
    let mut b = VoiceBridge::new(Language::En);
    let actions = b.on_remote_event(LiveEvent::FunctionCall(call(json!({ "score": 2, "optionText": "Rarely" }))), 0.0);
    assert!(matches!(&actions[0], BridgeAction::SubmitAnswer { args, .. } if args.score() == 2));

    let other = FunctionCall { id: None, name: "launchRocket".into(), args: json!({}) };
    let actions = b.on_remote_event(LiveEvent::FunctionCall(other), 0.0);
    let BridgeAction::ToRemote(v) = &actions[0] else { panic!() };
    assert_eq!(v["toolResponse"]["functionResponses"][0]["response"]["ok"], false);

    let bad = b.on_remote_event(LiveEvent::FunctionCall(call(json!({ "optionText": "no score" }))), 0.0);
    assert!(matches!(&bad[0], BridgeAction::ToRemote(_)));
  }

  #[test]
  fn answer_reply_carries_next_question_or_error() {
    let b = VoiceBridge::new(Language::Zh);
    let c = call(json!({}));
    let next = OptionsOut {
      question: QuestionView { id: "q2".into(), text: "Next?".into(), category_key: "k".into(), category_title: "K".into() },
      options: vec![GeneratedOption { text: "Yes".into(), score: 5 }],
      local: false,
    };
    let ok = b.answer_actions(&c, Ok(AnsweredTurn { result: answer_out(false), next: Some(next) }));
    let BridgeAction::ToRemote(v) = &ok[0] else { panic!() };
    let response = &v["toolResponse"]["functionResponses"][0];
    assert_eq!(response["id"], "c1");
    assert_eq!(response["response"]["nextQuestion"], "Next?");
    assert!(matches!(&ok[1], BridgeAction::ToClient(VoiceServerMessage::AnswerRecorded { .. })));

    let done = b.answer_actions(&c, Ok(AnsweredTurn { result: answer_out(true), next: None }));
    let BridgeAction::ToRemote(v) = &done[0] else { panic!() };
    assert_eq!(v["toolResponse"]["functionResponses"][0]["response"]["completed"], true);

    let err = b.answer_actions(&c, Err(QuizError::InvalidScore(9)));
    let BridgeAction::ToClient(VoiceServerMessage::Error { message }) = &err[1] else { panic!() };
    assert_eq!(message, "该答案无效。");
  }

  #[test]
  fn unparsable_client_frames_get_a_localized_error() {
    let err = serde_json::from_str::<crate::protocol::VoiceClientMessage>("{oops").unwrap_err();
    let VoiceServerMessage::Error { message } = VoiceBridge::new(Language::Zh).invalid_client_message(&err) else { panic!() };
    assert_eq!(message, "无法识别该消息。");
    let VoiceServerMessage::Error { message } = VoiceBridge::new(Language::En).invalid_client_message(&err) else { panic!() };
    assert_eq!(message, "That message could not be understood.");
  }
}
