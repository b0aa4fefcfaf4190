//! Generated answer options: the per-question cache, batch request building and
//! response validation.
//!
//! One remote call covers a whole window of questions. Responses are checked
//! entry by entry: good entries are merged, bad ones dropped, absent ones only
//! logged, so a partial answer from the model still fills most of the window.

use std::collections::{HashMap, HashSet};
use std::ops::Range;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use crate::bank::QuestionBank;
use crate::config::Prompts;
use crate::domain::{GeneratedOption, Language, MAX_SCORE};
use crate::error::GenAiError;
use crate::genai::GenerativeModel;
use crate::retry::{with_backoff, RetryPolicy};
use crate::util::fill_template;

const MIN_OPTIONS: usize = 2;

/// Options fetched so far, all in one language. Keyed by question id.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct OptionsCache {
  pub language: Language,
  #[serde(default)]
  pub entries: HashMap<String, Vec<GeneratedOption>>,
}

impl OptionsCache {
  pub fn new(language: Language) -> Self {
    Self { language, entries: HashMap::new() }
  }

  pub fn get(&self, question_id: &str) -> Option<&[GeneratedOption]> {
    self.entries.get(question_id).map(Vec::as_slice)
  }

  pub fn contains(&self, question_id: &str) -> bool {
    self.entries.contains_key(question_id)
  }

  #[cfg(test)]
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  /// Merge freshly fetched options. Entries fetched for another language are
  /// ignored; existing entries are never replaced.
  pub fn merge(&mut self, language: Language, fetched: HashMap<String, Vec<GeneratedOption>>) -> usize {
    if language != self.language {
      return 0;
    }
    let mut added = 0;
    for (id, opts) in fetched {
      if let std::collections::hash_map::Entry::Vacant(slot) = self.entries.entry(id) {
        slot.insert(opts);
        added += 1;
      }
    }
    added
  }

  /// Drop everything and start over in `language`.
  pub fn reset(&mut self, language: Language) {
    self.language = language;
    self.entries.clear();
  }
}

/// Index of the window holding question `index`.
pub fn window_of(index: usize, batch_size: usize) -> usize {
  index / batch_size.max(1)
}

/// Question positions covered by `window`, clamped to the quiz length.
pub fn window_range(window: usize, batch_size: usize, total: usize) -> Range<usize> {
  let size = batch_size.max(1);
  let start = (window * size).min(total);
  start..(start + size).min(total)
}

/// Result of validating one batch response.
#[derive(Debug, Default)]
pub struct BatchOutcome {
  pub accepted: HashMap<String, Vec<GeneratedOption>>,
  pub missing: Vec<String>,
  pub dropped: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEntry {
  #[serde(alias = "id")]
  question_id: String,
  options: Vec<RawOption>,
}

#[derive(Deserialize)]
struct RawOption {
  text: String,
  score: f64,
}

/// Check a batch response against the ids that were requested.
pub fn validate_batch(requested: &[String], raw: &Value) -> Result<BatchOutcome, GenAiError> {
  let items = match raw {
    Value::Array(items) => items,
    Value::Object(map) => match map.get("items") {
      Some(Value::Array(items)) => items,
      _ => return Err(GenAiError::Malformed("missing `items` array".into())),
    },
    _ => return Err(GenAiError::Malformed("expected an object with `items`".into())),
  };

  let wanted: HashSet<&str> = requested.iter().map(String::as_str).collect();
  let mut out = BatchOutcome::default();

  for item in items {
    let entry: RawEntry = match serde_json::from_value(item.clone()) {
      Ok(e) => e,
      Err(e) => {
        let id = item.get("questionId").or_else(|| item.get("id")).and_then(Value::as_str).unwrap_or("?");
        warn!(target: "quiz", %id, error = %e, "Dropping unparseable options entry");
        out.dropped.push(id.to_string());
        continue;
      }
    };
    if !wanted.contains(entry.question_id.as_str()) {
      warn!(target: "quiz", id = %entry.question_id, "Dropping options for a question that was not requested");
      out.dropped.push(entry.question_id);
      continue;
    }
    if out.accepted.contains_key(&entry.question_id) {
      continue;
    }
    match clean_options(entry.options) {
      Some(opts) => {
        out.accepted.insert(entry.question_id, opts);
      }
      None => {
        warn!(target: "quiz", id = %entry.question_id, "Dropping options entry that failed validation");
        out.dropped.push(entry.question_id);
      }
    }
  }

  for id in requested {
    if !out.accepted.contains_key(id) && !out.dropped.contains(id) {
      out.missing.push(id.clone());
    }
  }
  if !out.missing.is_empty() {
    warn!(target: "quiz", missing = ?out.missing, "Partial options response");
  }
  Ok(out)
}

fn clean_options(raw: Vec<RawOption>) -> Option<Vec<GeneratedOption>> {
  let mut out = Vec::with_capacity(raw.len());
  for o in raw {
    let text = o.text.trim();
    if text.is_empty() || !o.score.is_finite() || o.score < 0.0 || o.score > f64::from(MAX_SCORE) {
      return None;
    }
    out.push(GeneratedOption { text: text.to_string(), score: o.score.round() as u8 });
  }
  (out.len() >= MIN_OPTIONS).then_some(out)
}

/// Response schema declared to the model for batch option generation.
pub fn options_schema() -> Value {
  json!({
    "type": "OBJECT",
    "properties": {
      "items": {
        "type": "ARRAY",
        "items": {
          "type": "OBJECT",
          "properties": {
            "questionId": { "type": "STRING" },
            "options": {
              "type": "ARRAY",
              "items": {
                "type": "OBJECT",
                "properties": {
                  "text": { "type": "STRING" },
                  "score": { "type": "INTEGER" }
                },
                "required": ["text", "score"]
              }
            }
          },
          "required": ["questionId", "options"]
        }
      }
    },
    "required": ["items"]
  })
}

fn build_user_prompt(prompts: &Prompts, bank: &QuestionBank, ids: &[String], lang: Language) -> String {
  let listing = ids
    .iter()
    .filter_map(|id| bank.view(id, lang))
    .map(|q| format!("- id: {} | category: {} | statement: {}", q.id, q.category_title, q.text))
    .collect::<Vec<_>>()
    .join("\n");
  fill_template(
    &prompts.options_user_template,
    &[("language", lang.prompt_name()), ("questions", &listing)],
  )
}

/// One remote call for the given question ids, retried on rate limits, then validated.
#[instrument(level = "info", skip(model, prompts, retry, bank, ids), fields(batch = ids.len(), lang = lang.code()))]
pub async fn request_batch(
  model: &dyn GenerativeModel,
  prompts: &Prompts,
  retry: &RetryPolicy,
  bank: &QuestionBank,
  ids: &[String],
  lang: Language,
) -> Result<BatchOutcome, GenAiError> {
  let user = build_user_prompt(prompts, bank, ids, lang);
  let schema = options_schema();
  let raw = with_backoff(retry, "options_batch", || {
    model.generate_json(&prompts.options_system, &user, &schema, 0.8)
  })
  .await?;
  let outcome = validate_batch(ids, &raw)?;
  info!(target: "quiz", accepted = outcome.accepted.len(), dropped = outcome.dropped.len(), missing = outcome.missing.len(), "Options batch validated");
  Ok(outcome)
}

/// Local agreement scale used when no generative API is configured.
pub fn fallback_options(lang: Language) -> Vec<GeneratedOption> {
  let labels: [&str; 6] = match lang {
    Language::En => [
      "Strongly disagree",
      "Disagree",
      "Somewhat disagree",
      "Somewhat agree",
      "Agree",
      "Strongly agree",
    ],
    Language::Zh => ["非常不同意", "不同意", "有点不同意", "有点同意", "同意", "非常同意"],
  };
  labels
    .iter()
    .enumerate()
    .map(|(i, t)| GeneratedOption { text: (*t).to_string(), score: i as u8 })
    .collect()
}
