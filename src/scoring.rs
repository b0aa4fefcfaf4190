//! Result statistics: total score, per-category breakdown and the four-letter typology.

use serde::Serialize;

use crate::bank::QuestionBank;
use crate::domain::{AnswerMap, Axis, Language, MAX_SCORE};

/// Average category score at or above which an axis reads as its first letter.
const AXIS_MIDPOINT: f64 = MAX_SCORE as f64 / 2.0;

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CategoryScore {
  pub key: String,
  pub title: String,
  pub answered: usize,
  pub total: u32,
  pub max: u32,
  pub percent: u32,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AxisReading {
  pub axis: Axis,
  pub letter: char,
  /// Average 0..=5 score of the categories bound to this axis; None when unanswered.
  pub average: Option<f64>,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Typology {
  pub code: String,
  pub axes: Vec<AxisReading>,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResultsSummary {
  pub answered: usize,
  pub total_score: u32,
  pub max_score: u32,
  pub percent: u32,
  pub categories: Vec<CategoryScore>,
  pub typology: Typology,
}

fn percent(total: u32, max: u32) -> u32 {
  if max == 0 {
    0
  } else {
    ((f64::from(total) / f64::from(max)) * 100.0).round() as u32
  }
}

/// Score `answers` against the bank. Answers for ids the bank does not know are ignored.
pub fn summarize(bank: &QuestionBank, answers: &AnswerMap, lang: Language) -> ResultsSummary {
  let mut categories: Vec<CategoryScore> = bank
    .categories()
    .iter()
    .map(|c| CategoryScore {
      key: c.key.clone(),
      title: c.title.get(lang).to_string(),
      answered: 0,
      total: 0,
      max: 0,
      percent: 0,
    })
    .collect();

  let mut answered = 0;
  for (id, answer) in answers {
    let Some(question) = bank.get(id) else { continue };
    let Some(slot) = categories.iter_mut().find(|c| c.key == question.category_key) else { continue };
    let score = u32::from(answer.score.min(MAX_SCORE));
    slot.answered += 1;
    slot.total += score;
    slot.max += u32::from(MAX_SCORE);
    answered += 1;
  }
  for c in &mut categories {
    c.percent = percent(c.total, c.max);
  }

  let total_score = categories.iter().map(|c| c.total).sum();
  let max_score = categories.iter().map(|c| c.max).sum();
  let typology = typology(bank, &categories);

  ResultsSummary { answered, total_score, max_score, percent: percent(total_score, max_score), categories, typology }
}

fn typology(bank: &QuestionBank, scores: &[CategoryScore]) -> Typology {
  let axes: Vec<AxisReading> = Axis::ORDER
    .iter()
    .map(|&axis| {
      let (total, answered) = bank
        .categories()
        .iter()
        .filter(|c| c.axis == Some(axis))
        .filter_map(|c| scores.iter().find(|s| s.key == c.key))
        .fold((0u32, 0usize), |(t, n), s| (t + s.total, n + s.answered));
      let average = (answered > 0).then(|| f64::from(total) / answered as f64);
      let (high, low) = axis.letters();
      let letter = match average {
        Some(avg) if avg >= AXIS_MIDPOINT => high,
        Some(_) => low,
        None => 'X',
      };
      AxisReading { axis, letter, average }
    })
    .collect();
  let code = axes.iter().map(|a| a.letter).collect();
  Typology { code, axes }
}
