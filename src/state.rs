//! Application state: question bank, prompts/tuning, generative client, storage and
//! the live per-profile quiz sessions.
//!
//! A profile's session is loaded lazily from storage on first access and kept in
//! memory afterwards. Each session sits behind an async mutex; the mutex is
//! never held across a remote call.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, RwLock};
use tracing::{info, instrument, warn};

use crate::bank::QuestionBank;
use crate::config::{load_quiz_config_from_env, QuizConfig};
use crate::domain::{Language, Screen};
use crate::error::QuizError;
use crate::genai::{Gemini, GenerativeModel};
use crate::quiz::{QuizProgress, QuizSession};
use crate::store::{validate_profile, ProfileStore, StoreKey};
use crate::voice::live::LiveEndpoint;

pub struct SessionHandle {
  pub profile: String,
  pub quiz: Mutex<QuizSession>,
  /// One async lock per (language, window) so a window is fetched at most once at a time.
  windows: Mutex<HashMap<(Language, usize), Arc<Mutex<()>>>>,
}

impl SessionHandle {
  pub fn new(profile: &str, quiz: QuizSession) -> Self {
    Self { profile: profile.to_string(), quiz: Mutex::new(quiz), windows: Mutex::new(HashMap::new()) }
  }

  pub async fn window_lock(&self, language: Language, window: usize) -> Arc<Mutex<()>> {
    let mut windows = self.windows.lock().await;
    windows.entry((language, window)).or_default().clone()
  }
}

pub struct AppState {
  pub config: QuizConfig,
  pub bank: QuestionBank,
  pub model: Option<Arc<dyn GenerativeModel>>,
  pub live: Option<LiveEndpoint>,
  pub store: ProfileStore,
  pub public_base_url: String,
  sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
}

impl AppState {
  /// Build state from env: load config, pick the question bank, init the Gemini client.
  #[instrument(level = "info", skip_all)]
  pub fn new() -> Self {
    let config = load_quiz_config_from_env().unwrap_or_default();
    let gemini = Gemini::from_env();
    if let Some(g) = &gemini {
      info!(target: "worldview_quiz", base_url = %g.base_url, text_model = %g.text_model, image_model = %g.image_model, live_model = %g.live_model, "Gemini enabled.");
    } else {
      info!(target: "worldview_quiz", "Gemini disabled (no GEMINI_API_KEY). Using local options and reports; voice mode unavailable.");
    }
    let live = gemini.as_ref().map(LiveEndpoint::from_gemini);
    let model = gemini.map(|g| Arc::new(g) as Arc<dyn GenerativeModel>);
    let public_base_url =
      std::env::var("PUBLIC_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".into());

    let mut state = Self::with_parts(config, model, ProfileStore::from_env());
    state.live = live;
    state.public_base_url = public_base_url;
    state
  }

  pub fn with_parts(config: QuizConfig, model: Option<Arc<dyn GenerativeModel>>, store: ProfileStore) -> Self {
    let bank = if !config.categories.is_empty() && !config.questions.is_empty() {
      QuestionBank::new(config.categories.clone(), config.questions.clone())
    } else {
      QuestionBank::builtin()
    };
    if bank.is_empty() {
      warn!(target: "quiz", "Configured question bank is empty; falling back to built-in questions");
    }
    let bank = if bank.is_empty() { QuestionBank::builtin() } else { bank };
    info!(target: "quiz", questions = bank.len(), categories = bank.categories().len(), "Question bank ready");

    Self {
      config,
      bank,
      model,
      live: None,
      store,
      public_base_url: "http://localhost:3000".into(),
      sessions: RwLock::new(HashMap::new()),
    }
  }

  /// Session for `profile`, resuming stored progress on first access.
  #[instrument(level = "debug", skip(self))]
  pub async fn session(&self, profile: &str) -> Result<Arc<SessionHandle>, QuizError> {
    validate_profile(profile)?;
    if let Some(h) = self.sessions.read().await.get(profile) {
      return Ok(h.clone());
    }

    let language: Language = self.store.read(profile, StoreKey::Language).await?.unwrap_or_default();
    let stage_size = self.config.tuning.image_stage_size;
    let quiz = match self.store.read::<QuizProgress>(profile, StoreKey::QuizProgress).await {
      Ok(Some(progress)) => {
        let mut q = QuizSession::resume(progress, |id| self.bank.get(id).is_some(), stage_size);
        q.set_language(language);
        info!(target: "quiz", %profile, screen = ?q.screen(), index = q.current_index(), answers = q.answers().len(), "Resumed stored progress");
        q
      }
      Ok(None) => QuizSession::new(language, stage_size),
      Err(e) => {
        warn!(target: "quiz", %profile, error = %e, "Stored progress unreadable; starting fresh");
        QuizSession::new(language, stage_size)
      }
    };

    let mut sessions = self.sessions.write().await;
    let handle = sessions.entry(profile.to_string()).or_insert_with(|| Arc::new(SessionHandle::new(profile, quiz)));
    Ok(handle.clone())
  }

  /// Write the snapshot, or clear it when the quiz is back on the welcome screen.
  pub async fn persist(&self, profile: &str, quiz: &QuizSession) -> Result<(), QuizError> {
    if quiz.screen() == Screen::Welcome {
      self.store.remove(profile, StoreKey::QuizProgress).await?;
    } else {
      self.store.write(profile, StoreKey::QuizProgress, quiz.progress()).await?;
    }
    Ok(())
  }
}
