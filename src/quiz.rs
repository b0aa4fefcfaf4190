//! Quiz session state: screen, order, answers, options cache and stage images.
//!
//! Everything here is synchronous and side-effect free; persistence and remote
//! calls are driven from `logic`.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::{Answer, AnswerMap, Language, Screen, StageImage, MAX_SCORE};
use crate::error::QuizError;
use crate::options::OptionsCache;

/// Durable snapshot of one profile's quiz, written on every state change.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuizProgress {
  pub app_state: Screen,
  pub current_question_index: usize,
  #[serde(default)] pub answers: AnswerMap,
  #[serde(default)] pub options_cache: OptionsCache,
  #[serde(default)] pub shuffled_questions: Vec<String>,
  #[serde(default)] pub worldview_image_history: Vec<StageImage>,
}

/// What recording an answer did to the session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnswerOutcome {
  pub advanced: bool,
  pub completed: bool,
  /// Set when this answer completed a new image stage.
  pub stage_reached: Option<usize>,
}

#[derive(Clone, Debug)]
pub struct QuizSession {
  progress: QuizProgress,
  /// Bumped on restart and language change so in-flight fetches can tell
  /// their results are stale.
  epoch: u64,
  stage_size: usize,
}

impl QuizSession {
  pub fn new(language: Language, stage_size: usize) -> Self {
    let progress = QuizProgress { options_cache: OptionsCache::new(language), ..Default::default() };
    Self { progress, epoch: 0, stage_size: stage_size.max(1) }
  }

  /// Rebuild from a stored snapshot, dropping ids no longer in the bank.
  pub fn resume(mut progress: QuizProgress, known: impl Fn(&str) -> bool, stage_size: usize) -> Self {
    progress.shuffled_questions.retain(|id| known(id.as_str()));
    progress.answers.retain(|id, _| known(id.as_str()));
    let total = progress.shuffled_questions.len();
    if total == 0 && progress.app_state != Screen::Welcome {
      progress.app_state = Screen::Welcome;
      progress.current_question_index = 0;
    } else if progress.current_question_index >= total && total > 0 {
      progress.current_question_index = total - 1;
    }
    Self { progress, epoch: 0, stage_size: stage_size.max(1) }
  }

  pub fn progress(&self) -> &QuizProgress {
    &self.progress
  }

  pub fn epoch(&self) -> u64 {
    self.epoch
  }

  pub fn language(&self) -> Language {
    self.progress.options_cache.language
  }

  pub fn screen(&self) -> Screen {
    self.progress.app_state
  }

  pub fn total(&self) -> usize {
    self.progress.shuffled_questions.len()
  }

  pub fn current_index(&self) -> usize {
    self.progress.current_question_index
  }

  pub fn order(&self) -> &[String] {
    &self.progress.shuffled_questions
  }

  pub fn answers(&self) -> &AnswerMap {
    &self.progress.answers
  }

  pub fn options(&self) -> &OptionsCache {
    &self.progress.options_cache
  }

  pub fn options_mut(&mut self) -> &mut OptionsCache {
    &mut self.progress.options_cache
  }

  pub fn images(&self) -> &[StageImage] {
    &self.progress.worldview_image_history
  }

  pub fn latest_image(&self) -> Option<&StageImage> {
    self.progress.worldview_image_history.iter().max_by_key(|i| i.stage)
  }

  pub fn current_question_id(&self) -> Option<&str> {
    match self.progress.app_state {
      Screen::Quiz => self.progress.shuffled_questions.get(self.progress.current_question_index).map(String::as_str),
      _ => None,
    }
  }

  /// Fresh shuffle, everything cleared, first question. Start and restart are the same operation.
  pub fn restart<R: Rng + ?Sized>(&mut self, question_ids: &[String], rng: &mut R) {
    let mut order = question_ids.to_vec();
    order.shuffle(rng);
    let language = self.language();
    self.progress = QuizProgress {
      app_state: Screen::Quiz,
      current_question_index: 0,
      answers: AnswerMap::new(),
      options_cache: OptionsCache::new(language),
      shuffled_questions: order,
      worldview_image_history: Vec::new(),
    };
    self.epoch += 1;
  }

  /// Leave to the welcome screen; all progress is discarded.
  pub fn exit(&mut self) {
    let language = self.language();
    self.progress = QuizProgress { options_cache: OptionsCache::new(language), ..Default::default() };
    self.epoch += 1;
  }

  /// Switch display language. Cached options belong to the old language and are dropped.
  pub fn set_language(&mut self, language: Language) -> bool {
    if language == self.language() {
      return false;
    }
    self.progress.options_cache.reset(language);
    self.epoch += 1;
    true
  }

  pub fn previous(&mut self) -> Result<usize, QuizError> {
    match self.progress.app_state {
      Screen::Quiz => {
        self.progress.current_question_index = self.progress.current_question_index.saturating_sub(1);
      }
      // Back from results lands on the last question.
      Screen::Results if self.total() > 0 => {
        self.progress.app_state = Screen::Quiz;
        self.progress.current_question_index = self.total() - 1;
      }
      _ => return Err(QuizError::NotInProgress),
    }
    Ok(self.progress.current_question_index)
  }

  /// Record (or overwrite) the answer for `answer.question_id`.
  pub fn submit_answer(&mut self, answer: Answer) -> Result<AnswerOutcome, QuizError> {
    if self.progress.app_state == Screen::Welcome {
      return Err(QuizError::NotInProgress);
    }
    if answer.score > MAX_SCORE {
      return Err(QuizError::InvalidScore(answer.score));
    }
    let position = self
      .progress
      .shuffled_questions
      .iter()
      .position(|id| *id == answer.question_id)
      .ok_or_else(|| QuizError::UnknownQuestion(answer.question_id.clone()))?;

    let before = self.progress.answers.len();
    self.progress.answers.insert(answer.question_id.clone(), answer);
    let after = self.progress.answers.len();

    let stage_reached = (after > before && after % self.stage_size == 0)
      .then(|| after / self.stage_size)
      .filter(|stage| !self.has_stage(*stage));

    let mut advanced = false;
    let mut completed = false;
    if self.progress.app_state == Screen::Quiz && position == self.progress.current_question_index {
      if position + 1 < self.total() {
        self.progress.current_question_index += 1;
        advanced = true;
      } else {
        self.progress.app_state = Screen::Results;
        completed = true;
      }
    }
    Ok(AnswerOutcome { advanced, completed, stage_reached })
  }

  pub fn has_stage(&self, stage: usize) -> bool {
    self.progress.worldview_image_history.iter().any(|i| i.stage == stage)
  }

  /// Store a stage image unless that stage already has one.
  pub fn add_stage_image(&mut self, image: StageImage) -> bool {
    if self.has_stage(image.stage) {
      return false;
    }
    self.progress.worldview_image_history.push(image);
    self.progress.worldview_image_history.sort_by_key(|i| i.stage);
    true
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::GeneratedOption;
  use rand::rngs::StdRng;
  use rand::SeedableRng;
  use std::collections::HashMap;

  fn ids(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("q{i:02}")).collect()
  }

  fn answer(id: &str, score: u8) -> Answer {
    Answer { question_id: id.into(), score, option_text: format!("opt {score}"), remark: String::new() }
  }

  fn started(n: usize, seed: u64) -> QuizSession {
    let mut s = QuizSession::new(Language::En, 10);
    s.restart(&ids(n), &mut StdRng::seed_from_u64(seed));
    s
  }

  #[test]
  fn restart_clears_everything_and_reshuffles() {
    let mut s = started(25, 1);
    let first_order = s.order().to_vec();
    for _ in 0..12 {
      let id = s.current_question_id().unwrap().to_string();
      s.submit_answer(answer(&id, 3)).unwrap();
    }
    let mut batch = HashMap::new();
    batch.insert(first_order[0].clone(), vec![GeneratedOption { text: "x".into(), score: 1 }]);
    s.options_mut().merge(Language::En, batch);
    s.add_stage_image(StageImage { stage: 1, image_url: "data:image/png;base64,AA".into() });
    let epoch = s.epoch();

    s.restart(&ids(25), &mut StdRng::seed_from_u64(2));

    assert!(s.answers().is_empty());
    assert_eq!(s.options().len(), 0);
    assert!(s.images().is_empty());
    assert_eq!(s.current_index(), 0);
    assert_eq!(s.screen(), Screen::Quiz);
    assert!(s.epoch() > epoch);
    let mut sorted = s.order().to_vec();
    sorted.sort();
    assert_eq!(sorted, ids(25));
    assert_ne!(s.order(), first_order.as_slice());
  }

  #[test]
  fn answering_advances_and_completes() {
    let mut s = started(3, 7);
    for i in 0..3 {
      let id = s.current_question_id().unwrap().to_string();
      let out = s.submit_answer(answer(&id, 4)).unwrap();
      assert_eq!(out.completed, i == 2);
      assert_eq!(out.advanced, i < 2);
    }
    assert_eq!(s.screen(), Screen::Results);
    assert!(s.current_question_id().is_none());
  }

  #[test]
  fn re_answer_overwrites_without_advancing() {
    let mut s = started(5, 3);
    let first = s.current_question_id().unwrap().to_string();
    s.submit_answer(answer(&first, 1)).unwrap();
    let out = s.submit_answer(answer(&first, 5)).unwrap();
    assert!(!out.advanced);
    assert_eq!(s.answers().len(), 1);
    assert_eq!(s.answers()[&first].score, 5);
    assert_eq!(s.current_index(), 1);
  }

  #[test]
  fn rejects_bad_answers() {
    let mut s = QuizSession::new(Language::En, 10);
    assert!(matches!(s.submit_answer(answer("q00", 1)), Err(QuizError::NotInProgress)));
    s.restart(&ids(2), &mut StdRng::seed_from_u64(0));
    assert!(matches!(s.submit_answer(answer("nope", 1)), Err(QuizError::UnknownQuestion(_))));
    assert!(matches!(s.submit_answer(answer("q00", 6)), Err(QuizError::InvalidScore(6))));
  }

  #[test]
  fn stage_reached_every_ten_new_answers() {
    let mut s = started(25, 9);
    let mut stages = vec![];
    for _ in 0..25 {
      let id = s.current_question_id().unwrap().to_string();
      if let Some(stage) = s.submit_answer(answer(&id, 2)).unwrap().stage_reached {
        stages.push(stage);
        s.add_stage_image(StageImage { stage, image_url: format!("img{stage}") });
      }
    }
    assert_eq!(stages, vec![1, 2]);
    assert_eq!(s.latest_image().unwrap().stage, 2);
    assert!(!s.add_stage_image(StageImage { stage: 2, image_url: "again".into() }));
  }

  #[test]
  fn language_change_drops_cache() {
    let mut s = started(5, 4);
    let mut batch = HashMap::new();
    batch.insert("q00".to_string(), vec![GeneratedOption { text: "x".into(), score: 1 }]);
    s.options_mut().merge(Language::En, batch);
    assert!(!s.set_language(Language::En));
    assert!(s.set_language(Language::Zh));
    assert_eq!(s.options().len(), 0);
    assert_eq!(s.language(), Language::Zh);
  }

  #[test]
  fn previous_from_results_returns_to_last_question() {
    let mut s = started(2, 5);
    for _ in 0..2 {
      let id = s.current_question_id().unwrap().to_string();
      s.submit_answer(answer(&id, 0)).unwrap();
    }
    assert_eq!(s.previous().unwrap(), 1);
    assert_eq!(s.screen(), Screen::Quiz);
    assert_eq!(s.previous().unwrap(), 0);
    assert_eq!(s.previous().unwrap(), 0);
  }

  #[test]
  fn resume_drops_unknown_ids() {
    let mut s = started(4, 6);
    let id = s.current_question_id().unwrap().to_string();
    s.submit_answer(answer(&id, 2)).unwrap();
    let snap = s.progress().clone();
    let resumed = QuizSession::resume(snap, |q| q != id, 10);
    assert_eq!(resumed.total(), 3);
    assert!(resumed.answers().is_empty());
  }
}
