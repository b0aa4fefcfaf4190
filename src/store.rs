//! Durable per-profile key/value storage as JSON files.
//!
//! Layout: `<root>/profiles/<profile>/<key>.json`. Writes go through a temp file
//! and a rename so a crash never leaves a half-written value behind.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, instrument};

use crate::error::StoreError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreKey {
  QuizProgress,
  SavedResults,
  Language,
  TtsEnabled,
}

impl StoreKey {
  fn file_name(self) -> &'static str {
    match self {
      StoreKey::QuizProgress => "quiz_progress.json",
      StoreKey::SavedResults => "saved_results.json",
      StoreKey::Language => "language.json",
      StoreKey::TtsEnabled => "tts_enabled.json",
    }
  }
}

/// Profile ids become directory names, so only a conservative alphabet is accepted.
pub fn validate_profile(profile: &str) -> Result<(), StoreError> {
  let ok = !profile.is_empty()
    && profile.len() <= 64
    && profile.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
  if ok { Ok(()) } else { Err(StoreError::InvalidProfile(profile.to_string())) }
}

#[derive(Clone, Debug)]
pub struct ProfileStore {
  root: PathBuf,
  /// One lock per profile for read-modify-write sequences.
  edits: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl ProfileStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into(), edits: Arc::default() }
  }

  pub fn from_env() -> Self {
    Self::new(std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".into()))
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Hold the returned guard across a read, change and write of a profile's
  /// values so overlapping edits cannot drop each other's changes.
  pub async fn lock_profile(&self, profile: &str) -> OwnedMutexGuard<()> {
    let lock = self.edits.lock().await.entry(profile.to_string()).or_default().clone();
    lock.lock_owned().await
  }

  fn path(&self, profile: &str, key: StoreKey) -> Result<PathBuf, StoreError> {
    validate_profile(profile)?;
    Ok(self.root.join("profiles").join(profile).join(key.file_name()))
  }

  #[instrument(level = "debug", skip(self))]
  pub async fn read<T: DeserializeOwned>(&self, profile: &str, key: StoreKey) -> Result<Option<T>, StoreError> {
    let path = self.path(profile, key)?;
    match fs::read(&path).await {
      Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
      Err(e) => Err(e.into()),
    }
  }

  #[instrument(level = "debug", skip(self, value))]
  pub async fn write<T: Serialize + ?Sized>(&self, profile: &str, key: StoreKey, value: &T) -> Result<(), StoreError> {
    let path = self.path(profile, key)?;
    if let Some(dir) = path.parent() {
      fs::create_dir_all(dir).await?;
    }
    let bytes = serde_json::to_vec(value)?;
    let tmp = path.with_extension(format!("json.{}.tmp", uuid::Uuid::new_v4().simple()));
    fs::write(&tmp, &bytes).await?;
    if let Err(e) = fs::rename(&tmp, &path).await {
      let _ = fs::remove_file(&tmp).await;
      return Err(e.into());
    }
    debug!(target: "worldview_quiz", %profile, bytes = bytes.len(), "Stored value");
    Ok(())
  }

  #[instrument(level = "debug", skip(self))]
  pub async fn remove(&self, profile: &str, key: StoreKey) -> Result<(), StoreError> {
    let path = self.path(profile, key)?;
    match fs::remove_file(&path).await {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(e.into()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::Language;

  #[tokio::test]
  async fn write_read_remove() {
    let dir = tempfile::tempdir().unwrap();
    let store = ProfileStore::new(dir.path());

    assert_eq!(store.read::<Language>("alice", StoreKey::Language).await.unwrap(), None);
    store.write("alice", StoreKey::Language, &Language::Zh).await.unwrap();
    store.write("alice", StoreKey::TtsEnabled, &true).await.unwrap();
    assert_eq!(store.read::<Language>("alice", StoreKey::Language).await.unwrap(), Some(Language::Zh));
    assert_eq!(store.read::<bool>("alice", StoreKey::TtsEnabled).await.unwrap(), Some(true));
    assert_eq!(store.read::<bool>("bob", StoreKey::TtsEnabled).await.unwrap(), None);

    store.remove("alice", StoreKey::Language).await.unwrap();
    store.remove("alice", StoreKey::Language).await.unwrap();
    assert_eq!(store.read::<Language>("alice", StoreKey::Language).await.unwrap(), None);

    let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("profiles/alice"))
      .unwrap()
      .filter_map(Result::ok)
      .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
      .collect();
    assert!(leftovers.is_empty());
  }

  #[tokio::test]
  async fn rejects_path_like_profiles() {
    let dir = tempfile::tempdir().unwrap();
    let store = ProfileStore::new(dir.path());
    for bad in ["", "../etc", "a/b", "x".repeat(65).as_str()] {
      assert!(matches!(
        store.write(bad, StoreKey::Language, &Language::En).await,
        Err(StoreError::InvalidProfile(_))
      ));
    }
  }

  #[tokio::test]
  async fn profile_locks_are_exclusive_per_profile() {
    let dir = tempfile::tempdir().unwrap();
    let store = ProfileStore::new(dir.path());
    let held = store.lock_profile("alice").await;
    // Another profile is not blocked.
    drop(store.lock_profile("bob").await);

    let waiting = tokio::spawn({
      let store = store.clone();
      async move { drop(store.lock_profile("alice").await) }
    });
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert!(!waiting.is_finished());
    drop(held);
    waiting.await.unwrap();
  }

  #[tokio::test]
  async fn corrupt_values_surface_as_errors() {
    let dir = tempfile::tempdir().unwrap();
    let store = ProfileStore::new(dir.path());
    std::fs::create_dir_all(dir.path().join("profiles/p1")).unwrap();
    std::fs::write(dir.path().join("profiles/p1/language.json"), b"{not json").unwrap();
    assert!(matches!(store.read::<Language>("p1", StoreKey::Language).await, Err(StoreError::Corrupt(_))));
  }
}
