//! Narrative report generated from the results summary.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, instrument};

use crate::bank::QuestionBank;
use crate::config::Prompts;
use crate::domain::{AnswerMap, Language, MAX_SCORE};
use crate::error::GenAiError;
use crate::genai::GenerativeModel;
use crate::retry::{with_backoff, RetryPolicy};
use crate::scoring::ResultsSummary;
use crate::util::fill_template;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Report {
  pub headline: String,
  pub narrative: String,
  #[serde(default)] pub typology_insight: String,
  #[serde(default)] pub suggestions: Vec<String>,
}

pub fn report_schema() -> Value {
  json!({
    "type": "OBJECT",
    "properties": {
      "headline": { "type": "STRING" },
      "narrative": { "type": "STRING" },
      "typologyInsight": { "type": "STRING" },
      "suggestions": { "type": "ARRAY", "items": { "type": "STRING" } }
    },
    "required": ["headline", "narrative"]
  })
}

fn build_user_prompt(
  prompts: &Prompts,
  bank: &QuestionBank,
  answers: &AnswerMap,
  summary: &ResultsSummary,
  lang: Language,
) -> String {
  let categories = summary
    .categories
    .iter()
    .filter(|c| c.answered > 0)
    .map(|c| format!("- {}: {}% ({} answers)", c.title, c.percent, c.answered))
    .collect::<Vec<_>>()
    .join("\n");
  let answer_lines = answers
    .iter()
    .filter_map(|(id, a)| {
      let q = bank.get(id)?;
      let mut line = format!("- \"{}\" → \"{}\" ({}/{})", q.text.get(lang), a.option_text, a.score, MAX_SCORE);
      if !a.remark.trim().is_empty() {
        line.push_str(&format!(" — note: {}", a.remark.trim()));
      }
      Some(line)
    })
    .collect::<Vec<_>>()
    .join("\n");
  fill_template(
    &prompts.report_user_template,
    &[
      ("language", lang.prompt_name()),
      ("typology", &summary.typology.code),
      ("total", &summary.total_score.to_string()),
      ("max", &summary.max_score.to_string()),
      ("categories", &categories),
      ("answers", &answer_lines),
    ],
  )
}

#[instrument(level = "info", skip_all, fields(answered = summary.answered, lang = lang.code()))]
pub async fn generate_report(
  model: &dyn GenerativeModel,
  prompts: &Prompts,
  retry: &RetryPolicy,
  bank: &QuestionBank,
  answers: &AnswerMap,
  summary: &ResultsSummary,
  lang: Language,
) -> Result<Report, GenAiError> {
  let user = build_user_prompt(prompts, bank, answers, summary, lang);
  let schema = report_schema();
  let raw = with_backoff(retry, "report", || model.generate_json(&prompts.report_system, &user, &schema, 0.7)).await?;
  let report: Report = serde_json::from_value(raw).map_err(|e| GenAiError::Malformed(e.to_string()))?;
  if report.narrative.trim().is_empty() {
    return Err(GenAiError::Malformed("empty narrative".into()));
  }
  info!(target: "quiz", narrative_len = report.narrative.len(), suggestions = report.suggestions.len(), "Report generated");
  Ok(report)
}

/// Templated report used when no generative API is configured.
pub fn local_report(summary: &ResultsSummary, lang: Language) -> Report {
  let strongest = summary.categories.iter().filter(|c| c.answered > 0).max_by_key(|c| c.percent);
  let weakest = summary.categories.iter().filter(|c| c.answered > 0).min_by_key(|c| c.percent);
  let code = &summary.typology.code;
  match lang {
    Language::En => Report {
      headline: format!("Your worldview type: {code}"),
      narrative: match (strongest, weakest) {
        (Some(s), Some(w)) => format!(
          "You scored {}% overall. Your strongest leaning is {} ({}%), while {} ({}%) is where you hold back the most.",
          summary.percent, s.title, s.percent, w.title, w.percent
        ),
        _ => "Answer a few questions to see your worldview take shape.".into(),
      },
      typology_insight: format!("Each letter of {code} reflects which side of a dichotomy your answers lean toward."),
      suggestions: vec![],
    },
    Language::Zh => Report {
      headline: format!("你的世界观类型：{code}"),
      narrative: match (strongest, weakest) {
        (Some(s), Some(w)) => format!(
          "你的总得分为 {}%。你最强的倾向是「{}」（{}%），而「{}」（{}%）是你最保留的方面。",
          summary.percent, s.title, s.percent, w.title, w.percent
        ),
        _ => "多回答几个问题，看看你的世界观如何成形。".into(),
      },
      typology_insight: format!("{code} 的每个字母都代表你的答案在某一维度上的倾向。"),
      suggestions: vec![],
    },
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::Answer;
  use crate::genai::GeneratedImage;
  use crate::scoring::summarize;
  use async_trait::async_trait;

  struct CannedModel(Value);

  #[async_trait]
  impl GenerativeModel for CannedModel {
    async fn generate_json(&self, _s: &str, user: &str, _schema: &Value, _t: f32) -> Result<Value, GenAiError> {
      assert!(user.contains("Personality type:"));
      Ok(self.0.clone())
    }
    async fn generate_image(&self, _p: &str) -> Result<GeneratedImage, GenAiError> {
      Err(GenAiError::NotConfigured)
    }
  }

  fn answers() -> AnswerMap {
    let mut m = AnswerMap::new();
    m.insert("en1".into(), Answer { question_id: "en1".into(), score: 4, option_text: "Mostly".into(), remark: "weekends only".into() });
    m
  }

  #[tokio::test]
  async fn parses_report_and_rejects_empty_narrative() {
    let bank = QuestionBank::builtin();
    let a = answers();
    let summary = summarize(&bank, &a, Language::En);
    let ok = CannedModel(json!({ "headline": "H", "narrative": "N", "suggestions": ["s1"] }));
    let r = generate_report(&ok, &Prompts::default(), &RetryPolicy::default(), &bank, &a, &summary, Language::En)
      .await
      .unwrap();
    assert_eq!(r.suggestions, vec!["s1".to_string()]);

    let empty = CannedModel(json!({ "headline": "H", "narrative": "  " }));
    let err = generate_report(&empty, &Prompts::default(), &RetryPolicy::default(), &bank, &a, &summary, Language::En)
      .await
      .unwrap_err();
    assert!(matches!(err, GenAiError::Malformed(_)));
  }

  #[test]
  fn prompt_carries_remarks_and_typology() {
    let bank = QuestionBank::builtin();
    let a = answers();
    let summary = summarize(&bank, &a, Language::En);
    let p = build_user_prompt(&Prompts::default(), &bank, &a, &summary, Language::En);
    assert!(p.contains("weekends only"));
    assert!(p.contains(&summary.typology.code));
    assert!(p.contains("Social Energy: 80%"));
  }

  #[test]
  fn local_report_is_localized() {
    let bank = QuestionBank::builtin();
    let summary = summarize(&bank, &answers(), Language::Zh);
    let r = local_report(&summary, Language::Zh);
    assert!(r.headline.starts_with("你的世界观类型"));
    assert!(r.narrative.contains("社交能量"));
  }
}
