//! Stateless result sharing: answers (and an image URL) packed into one query parameter.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::domain::{Answer, AnswerMap};
use crate::error::QuizError;

/// Query parameter carrying the encoded payload.
pub const SHARE_PARAM: &str = "results";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SharePayload {
  pub answers: Vec<(String, Answer)>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub image_url: Option<String>,
}

impl SharePayload {
  /// Inline `data:` images would blow past URL length limits, so only remote URLs travel.
  pub fn new(answers: &AnswerMap, image_url: Option<&str>) -> Self {
    Self {
      answers: answers.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
      image_url: image_url.filter(|u| !u.starts_with("data:")).map(str::to_string),
    }
  }

  pub fn answer_map(&self) -> AnswerMap {
    self.answers.iter().cloned().collect()
  }
}

pub fn encode(payload: &SharePayload) -> Result<String, QuizError> {
  let json = serde_json::to_vec(payload).map_err(|e| QuizError::InvalidShare(e.to_string()))?;
  Ok(URL_SAFE_NO_PAD.encode(json))
}

pub fn decode(param: &str) -> Result<SharePayload, QuizError> {
  let param = param.trim();
  let bytes = [&URL_SAFE_NO_PAD, &URL_SAFE, &STANDARD, &STANDARD_NO_PAD]
    .iter()
    .find_map(|engine| engine.decode(param).ok())
    .ok_or_else(|| QuizError::InvalidShare("not base64".into()))?;
  let payload: SharePayload =
    serde_json::from_slice(&bytes).map_err(|e| QuizError::InvalidShare(e.to_string()))?;
  if payload.answers.iter().any(|(id, a)| *id != a.question_id) {
    return Err(QuizError::InvalidShare("answer keyed under the wrong question".into()));
  }
  Ok(payload)
}

/// Full share URL for `base_url`.
pub fn share_url(base_url: &str, encoded: &str) -> String {
  format!("{}/?{}={}", base_url.trim_end_matches('/'), SHARE_PARAM, encoded)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::bank::QuestionBank;
  use crate::domain::Language;
  use crate::scoring::summarize;

  fn sample() -> AnswerMap {
    let mut m = AnswerMap::new();
    for (id, score) in [("en1", 4u8), ("pe3", 1), ("va2", 5), ("me5", 0), ("st4", 3)] {
      m.insert(
        id.into(),
        Answer { question_id: id.into(), score, option_text: format!("选项 {score}"), remark: "ok".into() },
      );
    }
    m
  }

  #[test]
  fn shared_link_reproduces_scores() {
    let bank = QuestionBank::builtin();
    let answers = sample();
    let encoded = encode(&SharePayload::new(&answers, Some("https://img.example/1.png"))).unwrap();
    assert!(!encoded.contains('+') && !encoded.contains('/') && !encoded.contains('='));

    let loaded = decode(&encoded).unwrap();
    assert_eq!(loaded.image_url.as_deref(), Some("https://img.example/1.png"));
    let original = summarize(&bank, &answers, Language::En);
    let restored = summarize(&bank, &loaded.answer_map(), Language::En);
    assert_eq!(original.total_score, restored.total_score);
    assert_eq!(original.categories, restored.categories);
    assert_eq!(original.typology, restored.typology);
  }

  #[test]
  fn data_urls_are_not_shared() {
    let p = SharePayload::new(&sample(), Some("data:image/png;base64,AAAA"));
    assert!(p.image_url.is_none());
  }

  #[test]
  fn standard_alphabet_is_accepted() {
    let p = SharePayload::new(&sample(), None);
    let std_encoded = STANDARD.encode(serde_json::to_vec(&p).unwrap());
    assert_eq!(decode(&std_encoded).unwrap(), p);
  }

  #[test]
  fn garbage_is_rejected() {
    assert!(matches!(decode("%%%"), Err(QuizError::InvalidShare(_))));
    let not_json = URL_SAFE_NO_PAD.encode(b"hello");
    assert!(matches!(decode(&not_json), Err(QuizError::InvalidShare(_))));
  }

  #[test]
  fn url_is_built_from_base() {
    assert_eq!(share_url("http://h:1/", "abc"), "http://h:1/?results=abc");
  }
}
