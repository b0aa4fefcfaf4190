//! Loading quiz configuration (prompts, tuning, retry policy, optional question bank) from TOML.
//!
//! See `QuizConfig` and `Prompts` for expected schema.

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::{Category, Question};
use crate::retry::RetryPolicy;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct QuizConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub tuning: Tuning,
  #[serde(default)]
  pub retry: RetryPolicy,
  /// Replaces the built-in bank when both lists are non-empty.
  #[serde(default)]
  pub categories: Vec<Category>,
  #[serde(default)]
  pub questions: Vec<Question>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Tuning {
  /// Questions requested per option-generation call.
  pub batch_size: usize,
  /// Fire-and-forget fetch of the window after the visible one.
  pub prefetch: bool,
  /// Answers per illustrative image stage.
  pub image_stage_size: usize,
}

impl Default for Tuning {
  fn default() -> Self {
    Self { batch_size: 5, prefetch: true, image_stage_size: 10 }
  }
}

/// Prompts sent to the generative API. Placeholders use `{name}` syntax.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub options_system: String,
  pub options_user_template: String,
  pub report_system: String,
  pub report_user_template: String,
  pub image_template: String,
  pub voice_system_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      options_system: "You write answer options for a personality and worldview questionnaire. Options must be distinct, natural first-person stances that span the full range from strong disagreement to strong agreement. Respond ONLY with JSON matching the schema.".into(),
      options_user_template: "Write 4 answer options in {language} for each question below. Give each option a score from 0 (least aligned with the statement) to 5 (most aligned). Use every question id exactly once.\n\n{questions}".into(),
      report_system: "You are a thoughtful psychologist writing a warm, insightful worldview profile. Never diagnose. Respond ONLY with JSON matching the schema.".into(),
      report_user_template: "Write the profile in {language}.\nPersonality type: {typology}\nTotal score: {total}/{max}\nCategory breakdown:\n{categories}\n\nAnswers:\n{answers}".into(),
      image_template: "An evocative, symbolic painting of a personal worldview landscape. No text, no letters. Mood shaped by these leanings: {categories}. Stage {stage} of the journey.".into(),
      voice_system_template: "You are a friendly quiz host speaking {language}. Read the question aloud, then briefly list the options. Listen to the user's spoken answer, map it to the closest option and call submitAnswer with that option's score and text; put any nuance the user added into remark. Ask for clarification if the answer is ambiguous.\n\nQuestion: {question}\nOptions:\n{options}".into(),
    }
  }
}

/// Attempt to load `QuizConfig` from QUIZ_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_quiz_config_from_env() -> Option<QuizConfig> {
  let path = std::env::var("QUIZ_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<QuizConfig>(&s) {
      Ok(cfg) => {
        info!(target: "worldview_quiz", %path, "Loaded quiz config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "worldview_quiz", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "worldview_quiz", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn partial_toml_keeps_defaults() {
    let cfg: QuizConfig = toml::from_str(
      r#"
        [tuning]
        batch_size = 8

        [retry]
        max_attempts = 5

        [prompts]
        report_system = "Be brief."
      "#,
    )
    .unwrap();
    assert_eq!(cfg.tuning.batch_size, 8);
    assert!(cfg.tuning.prefetch);
    assert_eq!(cfg.tuning.image_stage_size, 10);
    assert_eq!(cfg.retry.max_attempts, 5);
    assert_eq!(cfg.retry.base_delay_ms, 1000);
    assert_eq!(cfg.prompts.report_system, "Be brief.");
    assert!(cfg.prompts.options_user_template.contains("{questions}"));
  }

  #[test]
  fn bank_can_be_supplied() {
    let cfg: QuizConfig = toml::from_str(
      r#"
        [[categories]]
        key = "self"
        title = { en = "Self", zh = "自我" }
        axis = "EI"

        [[questions]]
        id = "q1"
        category_key = "self"
        text = { en = "I enjoy crowds." }
      "#,
    )
    .unwrap();
    assert_eq!(cfg.categories.len(), 1);
    assert_eq!(cfg.questions[0].text.zh, "");
  }
}
