//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::bank::QuestionView;
use crate::domain::{Answer, GeneratedOption, Language, SavedResult, Screen, StageImage};
use crate::report::Report;
use crate::results::SaveOutcome;
use crate::scoring::ResultsSummary;

/// Messages the client can send over the quiz WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    Sync,
    Start,
    Restart,
    Exit,
    Previous,
    LoadOptions,
    SubmitAnswer {
        #[serde(flatten)]
        answer: AnswerIn,
    },
    SetLanguage {
        language: Language,
    },
    Results,
    Report,
    Save,
    Share,
}

/// Messages the server sends back over the quiz WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Quiz {
        quiz: QuizView,
    },
    Options {
        options: OptionsOut,
    },
    AnswerResult {
        result: AnswerOut,
    },
    Results {
        results: ResultsView,
    },
    Report {
        report: Report,
    },
    Saved {
        status: SaveOutcome,
    },
    Share {
        share: ShareOut,
    },
    Settings {
        settings: SettingsOut,
    },
    Error {
        message: String,
    },
}

/// Client messages on the voice socket. Microphone audio travels as binary
/// frames (16 kHz mono PCM16 LE); these are the text frames.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VoiceClientMessage {
    /// Microphone paused; pad and send what is buffered.
    AudioEnd,
    /// Typed input instead of speech.
    Text { text: String },
    Stop,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Host,
}

/// Server messages on the voice socket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VoiceServerMessage {
    Ready {
        language: Language,
        question: QuestionView,
        options: Vec<GeneratedOption>,
    },
    /// 24 kHz PCM16 chunk. `startAt`/`duration` are seconds on the session clock.
    Audio {
        seq: u64,
        #[serde(rename = "startAt")]
        start_at: f64,
        duration: f64,
        data: String,
    },
    /// Drop these queued chunks; playback was interrupted.
    Flush {
        seqs: Vec<u64>,
    },
    Transcript {
        speaker: Speaker,
        text: String,
    },
    TurnComplete,
    AnswerRecorded {
        result: AnswerOut,
    },
    Error {
        message: String,
    },
    Closed {
        reason: String,
    },
}

//
// HTTP request/response DTOs (also embedded in WS messages)
//

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizView {
    pub screen: Screen,
    pub language: Language,
    pub index: usize,
    pub total: usize,
    pub answered: usize,
    pub question: Option<QuestionView>,
    /// Previously recorded answer for the current question, if any.
    pub current_answer: Option<Answer>,
    pub images: Vec<StageImage>,
}

#[derive(Debug, Serialize)]
pub struct OptionsOut {
    pub question: QuestionView,
    pub options: Vec<GeneratedOption>,
    /// True when served from the local agreement scale.
    pub local: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerIn {
    /// Defaults to the current question.
    #[serde(default)]
    pub question_id: Option<String>,
    pub score: u8,
    #[serde(default)]
    pub option_text: String,
    #[serde(default)]
    pub remark: String,
}

#[derive(Debug, Serialize)]
pub struct AnswerOut {
    pub advanced: bool,
    pub completed: bool,
    pub quiz: QuizView,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsView {
    pub summary: ResultsSummary,
    pub worldview_image_url: Option<String>,
    pub images: Vec<StageImage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsIn {
    #[serde(default)]
    pub language: Option<Language>,
    #[serde(default)]
    pub tts_enabled: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsOut {
    pub language: Language,
    pub tts_enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct ShareOut {
    pub url: String,
    pub param: String,
}

#[derive(Serialize)]
pub struct SaveOut {
    pub status: SaveOutcome,
    pub saved: Vec<SavedResult>,
}

#[derive(Serialize)]
pub struct SavedOut {
    pub saved: Vec<SavedResult>,
}

#[derive(Debug, Deserialize)]
pub struct SharedQuery {
    pub results: String,
    #[serde(default)]
    pub lang: Option<Language>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub report: bool,
}

#[derive(Debug, Deserialize)]
pub struct ProfileQuery {
    pub profile: String,
}

#[derive(Serialize)]
pub struct ExportOut {
    pub text: String,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub generative: bool,
    pub voice: bool,
}

#[derive(Serialize)]
pub struct ErrorOut {
    pub error: String,
}
