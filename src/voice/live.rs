//! Wire types for the Gemini Live (BidiGenerateContent) WebSocket session.
//!
//! Outgoing: `setup`, `realtimeInput`, `clientContent`, `toolResponse`.
//! Incoming frames (text or binary JSON) are flattened into [`LiveEvent`]s.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::Language;
use crate::error::GenAiError;
use crate::genai::Gemini;
use crate::voice::chunker::INPUT_SAMPLE_RATE;

pub const SUBMIT_ANSWER: &str = "submitAnswer";

/// Where to open live sessions. `url` embeds the API key and is never logged.
#[derive(Clone)]
pub struct LiveEndpoint {
  pub url: String,
  pub model: String,
}

impl LiveEndpoint {
  pub fn from_gemini(g: &Gemini) -> Self {
    Self { url: g.live_endpoint(), model: g.live_model.clone() }
  }
}

#[derive(Serialize)]
pub struct SetupMessage {
  pub setup: Setup,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
  pub model: String,
  pub generation_config: LiveGenerationConfig,
  pub system_instruction: Instruction,
  pub tools: Vec<Tool>,
  pub input_audio_transcription: Value,
  pub output_audio_transcription: Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveGenerationConfig {
  pub response_modalities: Vec<String>,
  pub speech_config: SpeechConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
  pub language_code: String,
}

#[derive(Serialize)]
pub struct Instruction {
  pub parts: Vec<TextPart>,
}

#[derive(Serialize)]
pub struct TextPart {
  pub text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
  pub function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Serialize)]
pub struct FunctionDeclaration {
  pub name: String,
  pub description: String,
  pub parameters: Value,
}

pub fn submit_answer_declaration() -> FunctionDeclaration {
  FunctionDeclaration {
    name: SUBMIT_ANSWER.into(),
    description: "Record the user's answer to the current question once it clearly matches one option.".into(),
    parameters: json!({
      "type": "OBJECT",
      "properties": {
        "score": { "type": "INTEGER", "description": "Score of the chosen option, 0 to 5." },
        "optionText": { "type": "STRING", "description": "Text of the chosen option." },
        "remark": { "type": "STRING", "description": "Any nuance the user added, or empty." }
      },
      "required": ["score", "optionText"]
    }),
  }
}

pub fn setup_message(model: &str, system_instruction: String, lang: Language) -> SetupMessage {
  let model = if model.starts_with("models/") { model.to_string() } else { format!("models/{model}") };
  SetupMessage {
    setup: Setup {
      model,
      generation_config: LiveGenerationConfig {
        response_modalities: vec!["AUDIO".into()],
        speech_config: SpeechConfig { language_code: lang.speech_tag().into() },
      },
      system_instruction: Instruction { parts: vec![TextPart { text: system_instruction }] },
      tools: vec![Tool { function_declarations: vec![submit_answer_declaration()] }],
      input_audio_transcription: json!({}),
      output_audio_transcription: json!({}),
    },
  }
}

pub fn realtime_audio(pcm: &[u8]) -> Value {
  json!({
    "realtimeInput": {
      "audio": { "data": STANDARD.encode(pcm), "mimeType": format!("audio/pcm;rate={INPUT_SAMPLE_RATE}") }
    }
  })
}

pub fn audio_stream_end() -> Value {
  json!({ "realtimeInput": { "audioStreamEnd": true } })
}

pub fn client_text(text: &str) -> Value {
  json!({
    "clientContent": {
      "turns": [{ "role": "user", "parts": [{ "text": text }] }],
      "turnComplete": true
    }
  })
}

pub fn tool_response(call: &FunctionCall, response: Value) -> Value {
  json!({
    "toolResponse": {
      "functionResponses": [{ "id": call.id, "name": call.name, "response": response }]
    }
  })
}

//
// Incoming
//

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerMessage {
  setup_complete: Option<Value>,
  server_content: Option<ServerContent>,
  tool_call: Option<ToolCall>,
  go_away: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerContent {
  model_turn: Option<ModelTurn>,
  #[serde(default)]
  interrupted: bool,
  #[serde(default)]
  turn_complete: bool,
  input_transcription: Option<Transcription>,
  output_transcription: Option<Transcription>,
}

#[derive(Debug, Default, Deserialize)]
struct ModelTurn {
  #[serde(default)]
  parts: Vec<LivePart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LivePart {
  inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
  #[serde(default)]
  mime_type: String,
  data: String,
}

#[derive(Debug, Default, Deserialize)]
struct Transcription {
  #[serde(default)]
  text: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolCall {
  #[serde(default)]
  function_calls: Vec<FunctionCall>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct FunctionCall {
  #[serde(default)]
  pub id: Option<String>,
  pub name: String,
  #[serde(default)]
  pub args: Value,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnswerArgs {
  pub score: f64,
  #[serde(default)]
  pub option_text: String,
  #[serde(default)]
  pub remark: String,
}

impl SubmitAnswerArgs {
  /// Rounded score; values that cannot be a score map to `u8::MAX` so validation rejects them.
  pub fn score(&self) -> u8 {
    let s = self.score.round();
    if (0.0..=f64::from(u8::MAX)).contains(&s) {
      s as u8
    } else {
      u8::MAX
    }
  }
}

impl FunctionCall {
  pub fn submit_answer_args(&self) -> Result<SubmitAnswerArgs, GenAiError> {
    serde_json::from_value(self.args.clone()).map_err(|e| GenAiError::Malformed(format!("{SUBMIT_ANSWER} args: {e}")))
  }
}

#[derive(Clone, Debug, PartialEq)]
pub enum LiveEvent {
  SetupComplete,
  Audio(Vec<u8>),
  Interrupted,
  TurnComplete,
  InputTranscript(String),
  OutputTranscript(String),
  FunctionCall(FunctionCall),
  GoAway,
}

/// Decode one server frame into events, in the order they should be handled.
pub fn parse_server_frame(frame: &[u8]) -> Result<Vec<LiveEvent>, GenAiError> {
  let msg: ServerMessage = serde_json::from_slice(frame).map_err(|e| GenAiError::Malformed(e.to_string()))?;
  let mut events = Vec::new();
  if msg.setup_complete.is_some() {
    events.push(LiveEvent::SetupComplete);
  }
  if let Some(content) = msg.server_content {
    if content.interrupted {
      events.push(LiveEvent::Interrupted);
    }
    if let Some(t) = content.input_transcription.filter(|t| !t.text.is_empty()) {
      events.push(LiveEvent::InputTranscript(t.text));
    }
    if let Some(t) = content.output_transcription.filter(|t| !t.text.is_empty()) {
      events.push(LiveEvent::OutputTranscript(t.text));
    }
    for part in content.model_turn.map(|m| m.parts).unwrap_or_default() {
      if let Some(inline) = part.inline_data.filter(|d| d.mime_type.is_empty() || d.mime_type.starts_with("audio/")) {
        let pcm = STANDARD.decode(inline.data.as_bytes()).map_err(|e| GenAiError::Malformed(e.to_string()))?;
        events.push(LiveEvent::Audio(pcm));
      }
    }
    if content.turn_complete {
      events.push(LiveEvent::TurnComplete);
    }
  }
  if let Some(tc) = msg.tool_call {
    events.extend(tc.function_calls.into_iter().map(LiveEvent::FunctionCall));
  }
  if msg.go_away.is_some() {
    events.push(LiveEvent::GoAway);
  }
  Ok(events)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn setup_declares_submit_answer_and_audio_modality() {
    let v = serde_json::to_value(setup_message("gemini-live", "host".into(), Language::Zh)).unwrap();
    assert_eq!(v["setup"]["model"], "models/gemini-live");
    assert_eq!(v["setup"]["generationConfig"]["responseModalities"][0], "AUDIO");
    assert_eq!(v["setup"]["generationConfig"]["speechConfig"]["languageCode"], "cmn-CN");
    let decl = &v["setup"]["tools"][0]["functionDeclarations"][0];
    assert_eq!(decl["name"], SUBMIT_ANSWER);
    assert_eq!(decl["parameters"]["properties"]["score"]["type"], "INTEGER");
  }

  #[test]
  fn server_content_becomes_ordered_events() {
    let audio = STANDARD.encode([1u8, 0, 2, 0]);
    let frame = json!({
      "serverContent": {
        "modelTurn": { "parts": [{ "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": audio } }] },
        "outputTranscription": { "text": "Hello" },
        "turnComplete": true
      }
    })
    .to_string();
    let events = parse_server_frame(frame.as_bytes()).unwrap();
    assert_eq!(
      events,
      vec![LiveEvent::OutputTranscript("Hello".into()), LiveEvent::Audio(vec![1, 0, 2, 0]), LiveEvent::TurnComplete]
    );
  }

  #[test]
  fn tool_call_args_round_scores() {
    let frame = br#"{"toolCall":{"functionCalls":[{"id":"c1","name":"submitAnswer","args":{"score":3.6,"optionText":"Often"}}]}}"#;
    let events = parse_server_frame(frame).unwrap();
    let LiveEvent::FunctionCall(call) = &events[0] else { panic!("expected function call") };
    let args = call.submit_answer_args().unwrap();
    assert_eq!(args.score(), 4);
    assert_eq!(args.option_text, "Often");
    assert_eq!(args.remark, "");

    let bad = SubmitAnswerArgs { score: -2.0, option_text: String::new(), remark: String::new() };
    assert_eq!(bad.score(), u8::MAX);
  }

  #[test]
  fn garbage_frame_is_malformed() {
    assert!(matches!(parse_server_frame(b"not json"), Err(GenAiError::Malformed(_))));
    assert!(parse_server_frame(b"{}").unwrap().is_empty());
  }
}
