//! Core behaviors shared by the HTTP handlers, the quiz WebSocket and the voice bridge.
//!
//! This includes:
//!   - Quiz lifecycle (start/restart, exit, previous, language)
//!   - Option loading: visible window fetch + fire-and-forget prefetch of the next one
//!   - Answer submission and background stage-image generation
//!   - Results, narrative report, saved results, sharing and text export

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::domain::{Answer, GeneratedOption, Language, StageImage};
use crate::error::QuizError;
use crate::genai::GenerativeModel;
use crate::imagery::generate_stage_image;
use crate::options::{fallback_options, request_batch, window_of, window_range};
use crate::protocol::{
  AnswerIn, AnswerOut, OptionsOut, QuizView, ResultsView, SettingsIn, SettingsOut, ShareOut,
};
use crate::report::{generate_report, local_report, Report};
use crate::results::{self, export_text, SaveOutcome};
use crate::scoring::summarize;
use crate::share::{self, SharePayload};
use crate::state::{AppState, SessionHandle};
use crate::store::StoreKey;

pub async fn quiz_view(state: &AppState, handle: &SessionHandle) -> QuizView {
  let quiz = handle.quiz.lock().await;
  let lang = quiz.language();
  let question = quiz.current_question_id().and_then(|id| state.bank.view(id, lang));
  let current_answer = quiz.current_question_id().and_then(|id| quiz.answers().get(id).cloned());
  QuizView {
    screen: quiz.screen(),
    language: lang,
    index: quiz.current_index(),
    total: quiz.total(),
    answered: quiz.answers().len(),
    question,
    current_answer,
    images: quiz.images().to_vec(),
  }
}

/// Start a quiz from scratch. Also used for restart: both clear everything and reshuffle.
#[instrument(level = "info", skip(state, handle), fields(profile = %handle.profile))]
pub async fn start_quiz(state: &Arc<AppState>, handle: &Arc<SessionHandle>) -> Result<QuizView, QuizError> {
  {
    let mut quiz = handle.quiz.lock().await;
    {
      let mut rng = rand::thread_rng();
      quiz.restart(&state.bank.ids(), &mut rng);
    }
    state.persist(&handle.profile, &quiz).await?;
    info!(target: "quiz", profile = %handle.profile, total = quiz.total(), "Quiz started");
  }
  spawn_prefetch(state.clone(), handle.clone(), 0);
  Ok(quiz_view(state, handle).await)
}

#[instrument(level = "info", skip(state, handle), fields(profile = %handle.profile))]
pub async fn exit_quiz(state: &AppState, handle: &SessionHandle) -> Result<QuizView, QuizError> {
  {
    let mut quiz = handle.quiz.lock().await;
    quiz.exit();
    state.persist(&handle.profile, &quiz).await?;
  }
  Ok(quiz_view(state, handle).await)
}

pub async fn previous_question(state: &AppState, handle: &SessionHandle) -> Result<QuizView, QuizError> {
  {
    let mut quiz = handle.quiz.lock().await;
    quiz.previous()?;
    state.persist(&handle.profile, &quiz).await?;
  }
  Ok(quiz_view(state, handle).await)
}

/// Options for the current question. Served from the cache when present (gaps
/// in the window are refilled in the background); otherwise the visible window
/// is fetched first. Either way the following window is prefetched.
#[instrument(level = "info", skip(state, handle), fields(profile = %handle.profile))]
pub async fn load_options(state: &Arc<AppState>, handle: &Arc<SessionHandle>) -> Result<OptionsOut, QuizError> {
  let (question_id, index, lang) = {
    let quiz = handle.quiz.lock().await;
    let id = quiz.current_question_id().ok_or(QuizError::NotInProgress)?.to_string();
    (id, quiz.current_index(), quiz.language())
  };
  let question = state
    .bank
    .view(&question_id, lang)
    .ok_or_else(|| QuizError::UnknownQuestion(question_id.clone()))?;

  let Some(model) = state.model.clone() else {
    return Ok(OptionsOut { question, options: fallback_options(lang), local: true });
  };

  let window = window_of(index, state.config.tuning.batch_size);
  let options = match cached_options(handle, &question_id, lang).await {
    Some(options) => {
      spawn_prefetch(state.clone(), handle.clone(), window);
      options
    }
    None => {
      let fetched = fetch_window(state, handle, model.as_ref(), window).await;
      match (cached_options(handle, &question_id, lang).await, fetched) {
        (Some(options), Ok(_)) => options,
        (Some(options), Err(e)) => {
          debug!(target: "quiz", profile = %handle.profile, window, error = %e, "Window fetch failed after the question was cached");
          options
        }
        (None, Err(e)) => return Err(e),
        (None, Ok(_)) => return Err(QuizError::OptionsUnavailable(question_id)),
      }
    }
  };
  if state.config.tuning.prefetch {
    spawn_prefetch(state.clone(), handle.clone(), window + 1);
  }
  Ok(OptionsOut { question, options, local: false })
}

async fn cached_options(handle: &SessionHandle, question_id: &str, lang: Language) -> Option<Vec<GeneratedOption>> {
  let quiz = handle.quiz.lock().await;
  if quiz.language() != lang {
    return None;
  }
  quiz.options().get(question_id).map(<[GeneratedOption]>::to_vec)
}

/// Fetch every uncached question of `window` in one call and merge the result.
/// Returns how many questions gained options.
async fn fetch_window(
  state: &AppState,
  handle: &SessionHandle,
  model: &dyn GenerativeModel,
  window: usize,
) -> Result<usize, QuizError> {
  let lang = handle.quiz.lock().await.language();
  let lock = handle.window_lock(lang, window).await;
  let _window_guard = lock.lock().await;

  let (ids, epoch) = {
    let quiz = handle.quiz.lock().await;
    if quiz.language() != lang {
      return Ok(0);
    }
    let range = window_range(window, state.config.tuning.batch_size, quiz.total());
    let ids: Vec<String> = quiz.order()[range]
      .iter()
      .filter(|id| !quiz.options().contains(id.as_str()))
      .cloned()
      .collect();
    (ids, quiz.epoch())
  };
  if ids.is_empty() {
    return Ok(0);
  }

  let outcome = request_batch(model, &state.config.prompts, &state.config.retry, &state.bank, &ids, lang).await?;

  let mut quiz = handle.quiz.lock().await;
  if quiz.epoch() != epoch {
    debug!(target: "quiz", profile = %handle.profile, window, "Discarding options fetched for a superseded session");
    return Ok(0);
  }
  let added = quiz.options_mut().merge(lang, outcome.accepted);
  state.persist(&handle.profile, &quiz).await?;
  Ok(added)
}

/// Fire-and-forget fetch of `window`; failures are only logged.
pub fn spawn_prefetch(state: Arc<AppState>, handle: Arc<SessionHandle>, window: usize) {
  let Some(model) = state.model.clone() else { return };
  tokio::spawn(async move {
    match fetch_window(&state, &handle, model.as_ref(), window).await {
      Ok(0) => {}
      Ok(added) => debug!(target: "quiz", profile = %handle.profile, window, added, "Prefetched options"),
      Err(e) => warn!(target: "quiz", profile = %handle.profile, window, error = %e, "Prefetch failed"),
    }
  });
}

#[instrument(level = "info", skip(state, handle, input), fields(profile = %handle.profile, score = input.score))]
pub async fn submit_answer(
  state: &Arc<AppState>,
  handle: &Arc<SessionHandle>,
  input: AnswerIn,
) -> Result<AnswerOut, QuizError> {
  let (outcome, stage_job) = {
    let mut quiz = handle.quiz.lock().await;
    let question_id = match input.question_id {
      Some(id) => id,
      None => quiz.current_question_id().ok_or(QuizError::NotInProgress)?.to_string(),
    };
    let outcome = quiz.submit_answer(Answer {
      question_id: question_id.clone(),
      score: input.score,
      option_text: input.option_text.trim().to_string(),
      remark: input.remark.trim().to_string(),
    })?;
    state.persist(&handle.profile, &quiz).await?;
    info!(target: "quiz", profile = %handle.profile, %question_id, answered = quiz.answers().len(), completed = outcome.completed, "Answer recorded");

    let stage_job = outcome
      .stage_reached
      .map(|stage| (stage, summarize(&state.bank, quiz.answers(), quiz.language()), quiz.epoch()));
    (outcome, stage_job)
  };

  if let Some((stage, summary, epoch)) = stage_job {
    if let Some(model) = state.model.clone() {
      let state = state.clone();
      let handle = handle.clone();
      tokio::spawn(async move {
        let result =
          generate_stage_image(model.as_ref(), &state.config.prompts, &state.config.retry, &summary, stage).await;
        match result {
          Ok(image) => store_stage_image(&state, &handle, image, epoch).await,
          Err(e) => warn!(target: "quiz", profile = %handle.profile, stage, error = %e, "Stage image generation failed"),
        }
      });
    }
  }

  let view = quiz_view(state, handle).await;
  Ok(AnswerOut { advanced: outcome.advanced, completed: outcome.completed, quiz: view })
}

async fn store_stage_image(state: &AppState, handle: &SessionHandle, image: StageImage, epoch: u64) {
  let mut quiz = handle.quiz.lock().await;
  if quiz.epoch() != epoch {
    return;
  }
  let stage = image.stage;
  if quiz.add_stage_image(image) {
    if let Err(e) = state.persist(&handle.profile, &quiz).await {
      warn!(target: "quiz", profile = %handle.profile, stage, error = %e, "Could not persist stage image");
    }
  }
}

pub async fn results_view(state: &AppState, handle: &SessionHandle) -> ResultsView {
  let quiz = handle.quiz.lock().await;
  let summary = summarize(&state.bank, quiz.answers(), quiz.language());
  ResultsView {
    summary,
    worldview_image_url: quiz.latest_image().map(|i| i.image_url.clone()),
    images: quiz.images().to_vec(),
  }
}

#[instrument(level = "info", skip(state, handle), fields(profile = %handle.profile))]
pub async fn report_for(state: &AppState, handle: &SessionHandle) -> Result<Report, QuizError> {
  let (answers, lang) = {
    let quiz = handle.quiz.lock().await;
    (quiz.answers().clone(), quiz.language())
  };
  if answers.is_empty() {
    return Err(QuizError::NoAnswers);
  }
  let summary = summarize(&state.bank, &answers, lang);
  match &state.model {
    Some(model) => Ok(
      generate_report(model.as_ref(), &state.config.prompts, &state.config.retry, &state.bank, &answers, &summary, lang)
        .await?,
    ),
    None => Ok(local_report(&summary, lang)),
  }
}

pub async fn save_current(state: &AppState, handle: &SessionHandle) -> Result<SaveOutcome, QuizError> {
  let (answers, image) = {
    let quiz = handle.quiz.lock().await;
    (quiz.answers().clone(), quiz.latest_image().map(|i| i.image_url.clone()))
  };
  results::save_result(&state.store, &handle.profile, &answers, image.as_deref(), Utc::now()).await
}

pub async fn share_current(state: &AppState, handle: &SessionHandle) -> Result<ShareOut, QuizError> {
  let quiz = handle.quiz.lock().await;
  if quiz.answers().is_empty() {
    return Err(QuizError::NoAnswers);
  }
  let payload = SharePayload::new(quiz.answers(), quiz.latest_image().map(|i| i.image_url.as_str()));
  let param = share::encode(&payload)?;
  Ok(ShareOut { url: share::share_url(&state.public_base_url, &param), param })
}

/// Results for a shared link, recomputed from the carried answers.
pub fn load_shared(state: &AppState, param: &str, lang: Language) -> Result<ResultsView, QuizError> {
  let payload = share::decode(param)?;
  let summary = summarize(&state.bank, &payload.answer_map(), lang);
  Ok(ResultsView { summary, worldview_image_url: payload.image_url, images: vec![] })
}

pub async fn export_current(state: &AppState, handle: &SessionHandle, include_report: bool) -> Result<String, QuizError> {
  let report = if include_report { Some(report_for(state, handle).await?) } else { None };
  let quiz = handle.quiz.lock().await;
  let lang = quiz.language();
  let summary = summarize(&state.bank, quiz.answers(), lang);
  Ok(export_text(&state.bank, quiz.answers(), &summary, report.as_ref(), lang))
}

pub async fn settings_for(state: &AppState, handle: &SessionHandle) -> Result<SettingsOut, QuizError> {
  let language = handle.quiz.lock().await.language();
  let tts_enabled = state.store.read(&handle.profile, StoreKey::TtsEnabled).await?.unwrap_or(false);
  Ok(SettingsOut { language, tts_enabled })
}

/// Update preferences. A language change resets cached options and re-fetches
/// the visible window in the new language.
#[instrument(level = "info", skip(state, handle), fields(profile = %handle.profile))]
pub async fn update_settings(
  state: &Arc<AppState>,
  handle: &Arc<SessionHandle>,
  input: SettingsIn,
) -> Result<SettingsOut, QuizError> {
  if let Some(tts) = input.tts_enabled {
    state.store.write(&handle.profile, StoreKey::TtsEnabled, &tts).await?;
  }
  if let Some(lang) = input.language {
    state.store.write(&handle.profile, StoreKey::Language, &lang).await?;
    let refetch_window = {
      let mut quiz = handle.quiz.lock().await;
      let changed = quiz.set_language(lang);
      state.persist(&handle.profile, &quiz).await?;
      (changed && quiz.current_question_id().is_some())
        .then(|| window_of(quiz.current_index(), state.config.tuning.batch_size))
    };
    if let Some(window) = refetch_window {
      info!(target: "quiz", profile = %handle.profile, lang = lang.code(), "Language changed; refetching options");
      spawn_prefetch(state.clone(), handle.clone(), window);
    }
  }
  settings_for(state, handle).await
}

/// Everything the voice host needs to talk about the current question.
pub async fn voice_context(
  state: &Arc<AppState>,
  handle: &Arc<SessionHandle>,
) -> Result<(OptionsOut, Language), QuizError> {
  let options = load_options(state, handle).await?;
  let lang = handle.quiz.lock().await.language();
  Ok((options, lang))
}

/// Render options for prompts, one per line.
pub fn describe_options(options: &[GeneratedOption]) -> String {
  options
    .iter()
    .map(|o| format!("- score {}: {}", o.score, o.text))
    .collect::<Vec<_>>()
    .join("\n")
}
