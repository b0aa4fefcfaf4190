//! Error types shared across the backend and their localized user-facing strings.

use thiserror::Error;

use crate::domain::Language;

/// Failures talking to the remote generative API.
#[derive(Debug, Error)]
pub enum GenAiError {
  #[error("rate limited: {0}")]
  RateLimited(String),
  #[error("HTTP {status}: {message}")]
  Http { status: u16, message: String },
  #[error("transport error: {0}")]
  Transport(String),
  #[error("malformed response: {0}")]
  Malformed(String),
  #[error("retries exhausted after {attempts} attempts")]
  RetriesExhausted { attempts: u32 },
  #[error("generative API is not configured")]
  NotConfigured,
}

impl GenAiError {
  pub fn is_rate_limited(&self) -> bool {
    matches!(self, GenAiError::RateLimited(_))
  }
}

impl From<reqwest::Error> for GenAiError {
  fn from(e: reqwest::Error) -> Self {
    if e.is_decode() {
      GenAiError::Malformed(e.to_string())
    } else {
      GenAiError::Transport(e.to_string())
    }
  }
}

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("invalid profile id: {0:?}")]
  InvalidProfile(String),
  #[error("storage I/O error: {0}")]
  Io(#[from] std::io::Error),
  #[error("corrupt stored value: {0}")]
  Corrupt(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum QuizError {
  #[error(transparent)]
  Remote(#[from] GenAiError),
  #[error(transparent)]
  Storage(#[from] StoreError),
  #[error("no quiz in progress")]
  NotInProgress,
  #[error("unknown question: {0}")]
  UnknownQuestion(String),
  #[error("score {0} out of range")]
  InvalidScore(u8),
  #[error("no options available for question {0}")]
  OptionsUnavailable(String),
  #[error("no answers to report on")]
  NoAnswers,
  #[error("invalid share link: {0}")]
  InvalidShare(String),
  #[error("saved result not found")]
  SavedResultNotFound,
  #[error("voice session failed: {0}")]
  Voice(String),
  #[error("invalid client message: {0}")]
  InvalidMessage(String),
}

/// The user-visible operation a failure interrupted; picks the localized message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
  Options,
  Report,
  Voice,
  Answer,
  Results,
  Share,
}

impl QuizError {
  /// Localized message shown to the user. Remote and malformed-response failures
  /// collapse into one message per operation.
  pub fn user_message(&self, lang: Language, op: Operation) -> String {
    use Language::*;
    let msg = match (self, lang) {
      (QuizError::NotInProgress, En) => "No quiz is in progress. Start a new quiz first.",
      (QuizError::NotInProgress, Zh) => "当前没有进行中的测验，请先开始新的测验。",
      (QuizError::UnknownQuestion(_), En) => "That question is not part of this quiz.",
      (QuizError::UnknownQuestion(_), Zh) => "该问题不属于本次测验。",
      (QuizError::InvalidScore(_), En) => "That answer is not valid.",
      (QuizError::InvalidScore(_), Zh) => "该答案无效。",
      (QuizError::NoAnswers, En) => "Answer at least one question first.",
      (QuizError::NoAnswers, Zh) => "请至少先回答一个问题。",
      (QuizError::InvalidShare(_), En) => "This share link is invalid or damaged.",
      (QuizError::InvalidShare(_), Zh) => "分享链接无效或已损坏。",
      (QuizError::SavedResultNotFound, En) => "That saved result no longer exists.",
      (QuizError::SavedResultNotFound, Zh) => "该保存的结果已不存在。",
      (QuizError::InvalidMessage(_), En) => "That message could not be understood.",
      (QuizError::InvalidMessage(_), Zh) => "无法识别该消息。",
      (QuizError::Storage(StoreError::InvalidProfile(_)), En) => "Invalid profile id.",
      (QuizError::Storage(StoreError::InvalidProfile(_)), Zh) => "无效的用户标识。",
      (QuizError::Storage(_), En) => "Your progress could not be saved.",
      (QuizError::Storage(_), Zh) => "无法保存你的进度。",
      (_, _) => return op_message(lang, op).to_string(),
    };
    msg.to_string()
  }

  /// Caller-side mistakes (as opposed to remote/storage failures).
  pub fn is_client_error(&self) -> bool {
    matches!(
      self,
      QuizError::NotInProgress
        | QuizError::UnknownQuestion(_)
        | QuizError::InvalidScore(_)
        | QuizError::NoAnswers
        | QuizError::InvalidShare(_)
        | QuizError::SavedResultNotFound
        | QuizError::InvalidMessage(_)
        | QuizError::Storage(StoreError::InvalidProfile(_))
    )
  }
}

fn op_message(lang: Language, op: Operation) -> &'static str {
  match (op, lang) {
    (Operation::Options, Language::En) => "Could not load answer options. Please try again.",
    (Operation::Options, Language::Zh) => "无法加载答案选项，请重试。",
    (Operation::Report, Language::En) => "Could not generate your report. Please try again.",
    (Operation::Report, Language::Zh) => "无法生成你的报告，请重试。",
    (Operation::Voice, Language::En) => "The voice session ended because of an error.",
    (Operation::Voice, Language::Zh) => "语音会话因错误而结束。",
    (Operation::Answer, Language::En) => "Your answer could not be recorded.",
    (Operation::Answer, Language::Zh) => "无法记录你的答案。",
    (Operation::Results, Language::En) => "Could not load your results.",
    (Operation::Results, Language::Zh) => "无法加载你的结果。",
    (Operation::Share, Language::En) => "Could not create a share link.",
    (Operation::Share, Language::Zh) => "无法创建分享链接。",
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn remote_and_malformed_failures_share_one_message() {
    let a = QuizError::Remote(GenAiError::Http { status: 500, message: "boom".into() });
    let b = QuizError::Remote(GenAiError::Malformed("bad json".into()));
    assert_eq!(
      a.user_message(Language::En, Operation::Options),
      b.user_message(Language::En, Operation::Options)
    );
    assert_eq!(b.user_message(Language::Zh, Operation::Report), "无法生成你的报告，请重试。");
  }

  #[test]
  fn rejected_profile_ids_are_not_reported_as_save_failures() {
    let e = QuizError::Storage(StoreError::InvalidProfile("not ok".into()));
    assert!(e.is_client_error());
    assert_eq!(e.user_message(Language::En, Operation::Results), "Invalid profile id.");
    assert_eq!(e.user_message(Language::Zh, Operation::Voice), "无效的用户标识。");

    let io = QuizError::Storage(StoreError::Io(std::io::Error::other("disk full")));
    assert!(!io.is_client_error());
    assert_eq!(io.user_message(Language::En, Operation::Results), "Your progress could not be saved.");
  }

  #[test]
  fn malformed_client_messages_are_localized() {
    let e = QuizError::InvalidMessage("expected value at line 1 column 1".into());
    assert!(e.is_client_error());
    assert_eq!(e.user_message(Language::En, Operation::Voice), "That message could not be understood.");
    assert_eq!(e.user_message(Language::Zh, Operation::Answer), "无法识别该消息。");
  }
}
