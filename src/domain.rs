//! Domain models: questions, categories, generated options, answers, saved results.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Display language for questions, generated content and user-facing errors.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Language {
  #[default]
  En,
  Zh,
}

impl Language {
  pub fn code(self) -> &'static str {
    match self {
      Language::En => "en",
      Language::Zh => "zh",
    }
  }

  /// Human-readable name used inside prompts.
  pub fn prompt_name(self) -> &'static str {
    match self {
      Language::En => "English",
      Language::Zh => "Simplified Chinese",
    }
  }

  /// BCP-47 tag for the live voice session.
  pub fn speech_tag(self) -> &'static str {
    match self {
      Language::En => "en-US",
      Language::Zh => "cmn-CN",
    }
  }
}

/// Text carried in every supported display language.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocalizedText {
  pub en: String,
  #[serde(default)] pub zh: String,
}

impl LocalizedText {
  pub fn new(en: &str, zh: &str) -> Self {
    Self { en: en.into(), zh: zh.into() }
  }

  /// Resolve for a language, falling back to English when a translation is missing.
  pub fn get(&self, lang: Language) -> &str {
    match lang {
      Language::Zh if !self.zh.is_empty() => &self.zh,
      _ => &self.en,
    }
  }
}

/// MBTI-style dichotomy a category can lean on. A high category score leans
/// to the first letter of the pair.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Axis {
  Ei,
  Ns,
  Ft,
  Pj,
}

impl Axis {
  pub const ORDER: [Axis; 4] = [Axis::Ei, Axis::Ns, Axis::Ft, Axis::Pj];

  pub fn letters(self) -> (char, char) {
    match self {
      Axis::Ei => ('E', 'I'),
      Axis::Ns => ('N', 'S'),
      Axis::Ft => ('F', 'T'),
      Axis::Pj => ('P', 'J'),
    }
  }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Category {
  pub key: String,
  pub title: LocalizedText,
  #[serde(default)] pub axis: Option<Axis>,
}

/// Immutable question as loaded from the bank.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Question {
  pub id: String,
  pub text: LocalizedText,
  pub category_key: String,
}

/// Answer option produced by the generative API for one question.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeneratedOption {
  pub text: String,
  pub score: u8,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
  pub question_id: String,
  pub score: u8,
  pub option_text: String,
  #[serde(default)] pub remark: String,
}

/// Answers keyed by question id; the map ordering keeps snapshots deterministic.
pub type AnswerMap = BTreeMap<String, Answer>;

/// Highest score an option (and thus an answer) can carry.
pub const MAX_SCORE: u8 = 5;

/// Which of the three screens the quiz is on.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Screen {
  #[default]
  Welcome,
  Quiz,
  Results,
}

/// Illustrative image generated when a stage of answers completes.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StageImage {
  pub stage: usize,
  pub image_url: String,
}

/// Persisted snapshot of a finished (or partial) quiz. Immutable once created.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedResult {
  pub timestamp: DateTime<Utc>,
  pub answers: Vec<(String, Answer)>,
  #[serde(default)] pub worldview_image_url: Option<String>,
}
