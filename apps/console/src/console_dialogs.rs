use async_trait::async_trait;
use client_core::{Dialogs, Notice, NoticeKind};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

/// Prints notices to the terminal and asks yes/no questions on stdin.
pub struct ConsoleDialogs {
    pub assume_yes: bool,
}

#[async_trait]
impl Dialogs for ConsoleDialogs {
    async fn confirm(&self, title: &str, text: &str) -> bool {
        if self.assume_yes {
            debug!(title, "confirmed by --yes");
            return true;
        }
        println!("{title}: {text} [y/N]");
        let mut line = String::new();
        let mut stdin = BufReader::new(tokio::io::stdin());
        match stdin.read_line(&mut line).await {
            Ok(_) => matches!(line.trim().to_lowercase().as_str(), "y" | "yes" | "نعم"),
            Err(err) => {
                warn!(error = %err, "failed to read confirmation");
                false
            }
        }
    }

    async fn show(&self, notice: Notice) {
        match notice.kind {
            NoticeKind::Loading => debug!(title = %notice.title, "working"),
            NoticeKind::Error => eprintln!("error: {}: {}", notice.title, notice.text),
            NoticeKind::Warning => eprintln!("warning: {}: {}", notice.title, notice.text),
            NoticeKind::Success | NoticeKind::Info => {
                println!("{}: {}", notice.title, notice.text)
            }
        }
    }
}
