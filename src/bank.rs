//! Question bank: immutable questions and categories plus per-language views.

use std::collections::HashMap;

use serde::Serialize;
use tracing::warn;

use crate::domain::{Category, Language, Question};
use crate::seeds::{seed_categories, seed_questions};

/// Question text resolved for one display language.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
  pub id: String,
  pub text: String,
  pub category_key: String,
  pub category_title: String,
}

#[derive(Clone, Debug)]
pub struct QuestionBank {
  questions: Vec<Question>,
  categories: Vec<Category>,
  by_id: HashMap<String, usize>,
}

impl QuestionBank {
  /// Build a bank, dropping questions whose category is unknown and duplicate ids.
  pub fn new(categories: Vec<Category>, questions: Vec<Question>) -> Self {
    let mut by_id = HashMap::new();
    let mut kept = Vec::with_capacity(questions.len());
    for q in questions {
      if !categories.iter().any(|c| c.key == q.category_key) {
        warn!(target: "quiz", id = %q.id, category = %q.category_key, "Skipping question with unknown category");
        continue;
      }
      if by_id.contains_key(&q.id) {
        warn!(target: "quiz", id = %q.id, "Skipping duplicate question id");
        continue;
      }
      by_id.insert(q.id.clone(), kept.len());
      kept.push(q);
    }
    Self { questions: kept, categories, by_id }
  }

  pub fn builtin() -> Self {
    Self::new(seed_categories(), seed_questions())
  }

  pub fn len(&self) -> usize {
    self.questions.len()
  }

  pub fn is_empty(&self) -> bool {
    self.questions.is_empty()
  }

  pub fn ids(&self) -> Vec<String> {
    self.questions.iter().map(|q| q.id.clone()).collect()
  }

  pub fn get(&self, id: &str) -> Option<&Question> {
    self.by_id.get(id).map(|&i| &self.questions[i])
  }

  pub fn categories(&self) -> &[Category] {
    &self.categories
  }

  pub fn category(&self, key: &str) -> Option<&Category> {
    self.categories.iter().find(|c| c.key == key)
  }

  pub fn view(&self, id: &str, lang: Language) -> Option<QuestionView> {
    let q = self.get(id)?;
    let title = self
      .category(&q.category_key)
      .map(|c| c.title.get(lang).to_string())
      .unwrap_or_default();
    Some(QuestionView {
      id: q.id.clone(),
      text: q.text.get(lang).to_string(),
      category_key: q.category_key.clone(),
      category_title: title,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::LocalizedText;

  #[test]
  fn builtin_bank_is_consistent() {
    let bank = QuestionBank::builtin();
    assert_eq!(bank.len(), 25);
    for id in bank.ids() {
      let q = bank.get(&id).unwrap();
      assert!(bank.category(&q.category_key).is_some());
      assert!(!q.text.zh.is_empty());
    }
  }

  #[test]
  fn views_resolve_language_with_fallback() {
    let bank = QuestionBank::new(
      vec![Category { key: "c".into(), title: LocalizedText::new("Cat", "类"), axis: None }],
      vec![
        Question { id: "a".into(), text: LocalizedText::new("Hello", ""), category_key: "c".into() },
        Question { id: "a".into(), text: LocalizedText::new("Dup", ""), category_key: "c".into() },
        Question { id: "b".into(), text: LocalizedText::new("Orphan", ""), category_key: "x".into() },
      ],
    );
    assert_eq!(bank.len(), 1);
    let v = bank.view("a", Language::Zh).unwrap();
    assert_eq!(v.text, "Hello");
    assert_eq!(v.category_title, "类");
  }
}
