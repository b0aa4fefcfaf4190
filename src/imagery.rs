//! Illustrative worldview images, one per completed stage of answers.

use tracing::{info, instrument};

use crate::config::Prompts;
use crate::domain::StageImage;
use crate::error::GenAiError;
use crate::genai::GenerativeModel;
use crate::retry::{with_backoff, RetryPolicy};
use crate::scoring::ResultsSummary;
use crate::util::fill_template;

/// Image prompt describing the current leanings. Always English; image models
/// follow it more reliably and the image carries no text.
pub fn stage_prompt(prompts: &Prompts, summary: &ResultsSummary, stage: usize) -> String {
  let leanings = summary
    .categories
    .iter()
    .filter(|c| c.answered > 0)
    .map(|c| {
      let tone = match c.percent {
        0..=33 => "subdued",
        34..=66 => "balanced",
        _ => "vivid",
      };
      format!("{} {} ({}%)", tone, c.key, c.percent)
    })
    .collect::<Vec<_>>()
    .join(", ");
  fill_template(
    &prompts.image_template,
    &[("categories", &leanings), ("stage", &stage.to_string()), ("typology", &summary.typology.code)],
  )
}

#[instrument(level = "info", skip(model, prompts, retry, summary))]
pub async fn generate_stage_image(
  model: &dyn GenerativeModel,
  prompts: &Prompts,
  retry: &RetryPolicy,
  summary: &ResultsSummary,
  stage: usize,
) -> Result<StageImage, GenAiError> {
  let prompt = stage_prompt(prompts, summary, stage);
  let image = with_backoff(retry, "stage_image", || model.generate_image(&prompt)).await?;
  info!(target: "quiz", stage, bytes_b64 = image.base64.len(), "Stage image ready");
  Ok(StageImage { stage, image_url: image.data_url() })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::bank::QuestionBank;
  use crate::domain::{Answer, AnswerMap, Language};
  use crate::options::tests::EchoModel;
  use crate::scoring::summarize;

  #[test]
  fn prompt_describes_answered_categories_only() {
    let bank = QuestionBank::builtin();
    let mut answers = AnswerMap::new();
    answers.insert("en1".into(), Answer { question_id: "en1".into(), score: 5, option_text: "yes".into(), remark: String::new() });
    let summary = summarize(&bank, &answers, Language::En);
    let p = stage_prompt(&Prompts::default(), &summary, 2);
    assert!(p.contains("vivid energy (100%)"));
    assert!(!p.contains("perception"));
    assert!(p.contains("Stage 2"));
  }

  #[tokio::test]
  async fn image_becomes_data_url_for_stage() {
    let bank = QuestionBank::builtin();
    let summary = summarize(&bank, &AnswerMap::new(), Language::En);
    let img = generate_stage_image(&EchoModel::new(), &Prompts::default(), &RetryPolicy::default(), &summary, 1)
      .await
      .unwrap();
    assert_eq!(img.stage, 1);
    assert!(img.image_url.starts_with("data:image/png;base64,"));
  }
}
