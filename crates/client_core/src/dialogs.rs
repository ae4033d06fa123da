use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Info,
    Warning,
    Error,
    Loading,
}

/// One message for the user: a toast, an alert or a blocking spinner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub title: String,
    pub text: String,
}

impl Notice {
    pub fn new(kind: NoticeKind, title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            text: text.into(),
        }
    }

    pub fn success(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(NoticeKind::Success, title, text)
    }

    pub fn warning(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(NoticeKind::Warning, title, text)
    }

    pub fn error(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(NoticeKind::Error, title, text)
    }

    pub fn loading(title: impl Into<String>) -> Self {
        Self::new(NoticeKind::Loading, title, String::new())
    }
}

/// Whatever presents messages and yes/no questions to the user.
#[async_trait]
pub trait Dialogs: Send + Sync {
    async fn confirm(&self, title: &str, text: &str) -> bool;
    async fn show(&self, notice: Notice);
}

/// Writes notices to the log and answers every confirmation the same way.
pub struct LoggingDialogs {
    pub confirm_answer: bool,
}

#[async_trait]
impl Dialogs for LoggingDialogs {
    async fn confirm(&self, title: &str, text: &str) -> bool {
        info!(title, text, answer = self.confirm_answer, "confirmation requested");
        self.confirm_answer
    }

    async fn show(&self, notice: Notice) {
        match notice.kind {
            NoticeKind::Error => error!(title = %notice.title, text = %notice.text, "dialog"),
            NoticeKind::Warning => warn!(title = %notice.title, text = %notice.text, "dialog"),
            _ => info!(title = %notice.title, text = %notice.text, "dialog"),
        }
    }
}

/// Keeps every notice and confirmation prompt for later inspection.
pub struct RecordingDialogs {
    confirm_answer: bool,
    notices: Mutex<Vec<Notice>>,
    prompts: Mutex<Vec<String>>,
}

impl RecordingDialogs {
    pub fn new(confirm_answer: bool) -> Self {
        Self {
            confirm_answer,
            notices: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub async fn notices(&self) -> Vec<Notice> {
        self.notices.lock().await.clone()
    }

    pub async fn prompts(&self) -> Vec<String> {
        self.prompts.lock().await.clone()
    }

    pub async fn last(&self) -> Option<Notice> {
        self.notices.lock().await.last().cloned()
    }

    /// Notices other than loading spinners.
    pub async fn messages(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .await
            .iter()
            .filter(|notice| notice.kind != NoticeKind::Loading)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Dialogs for RecordingDialogs {
    async fn confirm(&self, title: &str, _text: &str) -> bool {
        self.prompts.lock().await.push(title.to_string());
        self.confirm_answer
    }

    async fn show(&self, notice: Notice) {
        self.notices.lock().await.push(notice);
    }
}
