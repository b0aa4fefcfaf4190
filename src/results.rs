//! Saved results (de-duplicated snapshots) and the plain-text export.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument};

use crate::bank::QuestionBank;
use crate::domain::{AnswerMap, Language, SavedResult};
use crate::error::{QuizError, StoreError};
use crate::report::Report;
use crate::scoring::ResultsSummary;
use crate::store::{ProfileStore, StoreKey};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveOutcome {
  Saved,
  Duplicate,
}

pub async fn load_saved(store: &ProfileStore, profile: &str) -> Result<Vec<SavedResult>, StoreError> {
  Ok(store.read(profile, StoreKey::SavedResults).await?.unwrap_or_default())
}

/// Append a snapshot unless an entry with the same answer set already exists.
#[instrument(level = "info", skip(store, answers, image_url), fields(answers = answers.len()))]
pub async fn save_result(
  store: &ProfileStore,
  profile: &str,
  answers: &AnswerMap,
  image_url: Option<&str>,
  now: DateTime<Utc>,
) -> Result<SaveOutcome, QuizError> {
  if answers.is_empty() {
    return Err(QuizError::NoAnswers);
  }
  let snapshot: Vec<_> = answers.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
  let _edit = store.lock_profile(profile).await;
  let mut saved = load_saved(store, profile).await?;
  if saved.iter().any(|r| r.answers == snapshot) {
    info!(target: "quiz", %profile, "Result already saved; skipping duplicate");
    return Ok(SaveOutcome::Duplicate);
  }
  saved.push(SavedResult { timestamp: now, answers: snapshot, worldview_image_url: image_url.map(str::to_string) });
  store.write(profile, StoreKey::SavedResults, &saved).await?;
  info!(target: "quiz", %profile, total = saved.len(), "Result saved");
  Ok(SaveOutcome::Saved)
}

pub async fn delete_saved(store: &ProfileStore, profile: &str, timestamp_ms: i64) -> Result<(), QuizError> {
  let _edit = store.lock_profile(profile).await;
  let mut saved = load_saved(store, profile).await?;
  let before = saved.len();
  saved.retain(|r| r.timestamp.timestamp_millis() != timestamp_ms);
  if saved.len() == before {
    return Err(QuizError::SavedResultNotFound);
  }
  store.write(profile, StoreKey::SavedResults, &saved).await?;
  Ok(())
}

/// Human-readable text export of a result, optionally with the narrative report.
pub fn export_text(
  bank: &QuestionBank,
  answers: &AnswerMap,
  summary: &ResultsSummary,
  report: Option<&Report>,
  lang: Language,
) -> String {
  let zh = lang == Language::Zh;
  let mut out = String::new();
  out.push_str(if zh { "世界观测验结果\n" } else { "Worldview Quiz Results\n" });
  out.push_str("======================\n\n");
  out.push_str(&format!(
    "{}: {}\n{}: {}/{} ({}%)\n\n",
    if zh { "类型" } else { "Type" },
    summary.typology.code,
    if zh { "总分" } else { "Total score" },
    summary.total_score,
    summary.max_score,
    summary.percent
  ));

  out.push_str(if zh { "分类得分\n" } else { "Category breakdown\n" });
  for c in summary.categories.iter().filter(|c| c.answered > 0) {
    out.push_str(&format!("- {}: {}/{} ({}%)\n", c.title, c.total, c.max, c.percent));
  }

  if let Some(r) = report {
    out.push_str(&format!("\n{}\n\n{}\n", r.headline, r.narrative));
    if !r.typology_insight.is_empty() {
      out.push_str(&format!("\n{}\n", r.typology_insight));
    }
    for s in &r.suggestions {
      out.push_str(&format!("* {}\n", s));
    }
  }

  out.push_str(if zh { "\n答案\n" } else { "\nAnswers\n" });
  for (id, a) in answers {
    let text = bank.get(id).map(|q| q.text.get(lang)).unwrap_or(id.as_str());
    out.push_str(&format!("- {}\n  → {} [{}]\n", text, a.option_text, a.score));
    if !a.remark.trim().is_empty() {
      out.push_str(&format!("  ({})\n", a.remark.trim()));
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::Answer;
  use crate::scoring::summarize;
  use chrono::TimeZone;

  fn answers(scores: &[(&str, u8)]) -> AnswerMap {
    scores
      .iter()
      .map(|(id, s)| {
        (id.to_string(), Answer { question_id: id.to_string(), score: *s, option_text: format!("opt{s}"), remark: String::new() })
      })
      .collect()
  }

  #[tokio::test]
  async fn saving_same_answers_twice_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let store = ProfileStore::new(dir.path());
    let a = answers(&[("en1", 3), ("pe2", 4)]);
    let t1 = Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap();
    let t2 = Utc.with_ymd_and_hms(2026, 1, 2, 10, 0, 0).unwrap();

    assert_eq!(save_result(&store, "p", &a, None, t1).await.unwrap(), SaveOutcome::Saved);
    assert_eq!(save_result(&store, "p", &a, Some("https://x/y.png"), t2).await.unwrap(), SaveOutcome::Duplicate);
    assert_eq!(load_saved(&store, "p").await.unwrap().len(), 1);

    let b = answers(&[("en1", 2), ("pe2", 4)]);
    assert_eq!(save_result(&store, "p", &b, None, t2).await.unwrap(), SaveOutcome::Saved);
    assert_eq!(load_saved(&store, "p").await.unwrap().len(), 2);

    delete_saved(&store, "p", t1.timestamp_millis()).await.unwrap();
    let left = load_saved(&store, "p").await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].timestamp, t2);
    assert!(matches!(delete_saved(&store, "p", 42).await, Err(QuizError::SavedResultNotFound)));
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn overlapping_saves_keep_every_result() {
    let dir = tempfile::tempdir().unwrap();
    let store = ProfileStore::new(dir.path());
    let a = answers(&[("en1", 1), ("pe2", 2)]);
    let b = answers(&[("en1", 5), ("pe2", 4)]);
    for round in 0..20 {
      let profile = format!("p{round}");
      let (ra, rb) = tokio::join!(
        save_result(&store, &profile, &a, None, Utc::now()),
        save_result(&store, &profile, &b, None, Utc::now()),
      );
      assert_eq!(ra.unwrap(), SaveOutcome::Saved);
      assert_eq!(rb.unwrap(), SaveOutcome::Saved);
      assert_eq!(load_saved(&store, &profile).await.unwrap().len(), 2, "round {round}");
    }
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn delete_and_save_do_not_overwrite_each_other() {
    let dir = tempfile::tempdir().unwrap();
    let store = ProfileStore::new(dir.path());
    let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
    let a = answers(&[("en1", 3)]);
    let b = answers(&[("en1", 4)]);
    for round in 0..20 {
      let profile = format!("d{round}");
      save_result(&store, &profile, &a, None, t0).await.unwrap();
      let (deleted, saved) = tokio::join!(
        delete_saved(&store, &profile, t0.timestamp_millis()),
        save_result(&store, &profile, &b, None, Utc::now()),
      );
      deleted.unwrap();
      assert_eq!(saved.unwrap(), SaveOutcome::Saved);
      let left = load_saved(&store, &profile).await.unwrap();
      assert_eq!(left.len(), 1, "round {round}");
      assert_eq!(left[0].answers[0].1.score, 4);
    }
  }

  #[tokio::test]
  async fn empty_answer_sets_are_not_saved() {
    let dir = tempfile::tempdir().unwrap();
    let store = ProfileStore::new(dir.path());
    assert!(matches!(
      save_result(&store, "p", &AnswerMap::new(), None, Utc::now()).await,
      Err(QuizError::NoAnswers)
    ));
  }

  #[test]
  fn export_lists_scores_and_answers() {
    let bank = QuestionBank::builtin();
    let a = answers(&[("en1", 5), ("me2", 1)]);
    let summary = summarize(&bank, &a, Language::En);
    let text = export_text(&bank, &a, &summary, None, Language::En);
    assert!(text.contains(&format!("Type: {}", summary.typology.code)));
    assert!(text.contains("Total score: 6/10 (60%)"));
    assert!(text.contains("Social Energy: 5/5 (100%)"));
    assert!(text.contains("→ opt1 [1]"));
    assert!(!text.contains("Perception"));
  }
}
