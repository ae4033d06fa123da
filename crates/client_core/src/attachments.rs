use std::path::Path;

use anyhow::Context;
use percent_encoding::percent_decode_str;
use thiserror::Error;
use tracing::{debug, info};

use crate::dialogs::Dialogs;

pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "gif", "bmp", "pdf"];
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "gif", "bmp", "svg"];

/// A new file picked by the user, held in memory until submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl StagedFile {
    /// Guesses the MIME type from the file name.
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        let filename = filename.into();
        let mime_type = mime_guess::from_path(&filename)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Self {
            filename,
            mime_type,
            bytes,
        }
    }

    pub async fn from_path(path: &Path) -> anyhow::Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read attachment '{}'", path.display()))?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .with_context(|| format!("'{}' has no file name", path.display()))?;
        Ok(Self::new(filename, bytes))
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn extension(&self) -> Option<String> {
        extension_of(&self.filename)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentPolicy {
    pub max_files: usize,
    pub max_file_size_mb: u64,
}

impl Default for AttachmentPolicy {
    fn default() -> Self {
        Self {
            max_files: 2,
            max_file_size_mb: 8,
        }
    }
}

impl AttachmentPolicy {
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }

    pub fn check(&self, file: &StagedFile) -> Result<(), AttachmentError> {
        let allowed = file
            .extension()
            .is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()));
        if !allowed {
            return Err(AttachmentError::UnsupportedType {
                filename: file.filename.clone(),
            });
        }
        if file.size() > self.max_file_size_bytes() {
            return Err(AttachmentError::TooLarge {
                filename: file.filename.clone(),
                max_mb: self.max_file_size_mb,
            });
        }
        Ok(())
    }
}

/// Messages are shown to the user as-is.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AttachmentError {
    #[error("الحد الأقصى {max} ملفات فقط.")]
    TooManyFiles { max: usize },
    #[error("{filename}: نوع ملف غير مدعوم. يُسمح فقط بالصور أو PDF.")]
    UnsupportedType { filename: String },
    #[error("{filename}: حجم الملف أكبر من {max_mb}MB.")]
    TooLarge { filename: String, max_mb: u64 },
    #[error("لا يوجد مرفق في الموضع {0}")]
    NoSuchAttachment(usize),
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct AddFilesOutcome {
    pub staged: usize,
    pub rejected: Vec<AttachmentError>,
}

/// Attachments of one draft: references already on the server, new files
/// staged for upload and references the user asked to delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attachments {
    policy: AttachmentPolicy,
    existing: Vec<String>,
    staged: Vec<StagedFile>,
    deleted: Vec<String>,
}

impl Attachments {
    pub fn new(policy: AttachmentPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn with_existing(policy: AttachmentPolicy, existing: Vec<String>) -> Self {
        Self {
            policy,
            existing: existing
                .into_iter()
                .filter(|reference| !reference.trim().is_empty())
                .collect(),
            ..Self::default()
        }
    }

    pub fn policy(&self) -> AttachmentPolicy {
        self.policy
    }

    pub fn existing(&self) -> &[String] {
        &self.existing
    }

    pub fn staged(&self) -> &[StagedFile] {
        &self.staged
    }

    pub fn deleted(&self) -> &[String] {
        &self.deleted
    }

    pub fn total(&self) -> usize {
        self.existing.len() + self.staged.len()
    }

    /// Stages every acceptable file. A batch that would push the total past
    /// the limit is refused as a whole; otherwise each file is checked on
    /// its own and failures are reported without blocking the rest.
    pub fn add_files(&mut self, files: Vec<StagedFile>) -> Result<AddFilesOutcome, AttachmentError> {
        if self.total() + files.len() > self.policy.max_files {
            info!(
                existing = self.existing.len(),
                staged = self.staged.len(),
                incoming = files.len(),
                max = self.policy.max_files,
                "attachment batch refused"
            );
            return Err(AttachmentError::TooManyFiles {
                max: self.policy.max_files,
            });
        }

        let mut outcome = AddFilesOutcome::default();
        for file in files {
            match self.policy.check(&file) {
                Ok(()) => {
                    debug!(filename = %file.filename, size = file.size(), "attachment staged");
                    self.staged.push(file);
                    outcome.staged += 1;
                }
                Err(err) => outcome.rejected.push(err),
            }
        }
        Ok(outcome)
    }

    pub fn remove(&mut self, index: usize) -> Result<StagedFile, AttachmentError> {
        if index >= self.staged.len() {
            return Err(AttachmentError::NoSuchAttachment(index));
        }
        Ok(self.staged.remove(index))
    }

    /// Asks first; a confirmed removal is sent with the next submission.
    pub async fn remove_existing(
        &mut self,
        index: usize,
        dialogs: &dyn Dialogs,
    ) -> Result<bool, AttachmentError> {
        let Some(reference) = self.existing.get(index) else {
            return Err(AttachmentError::NoSuchAttachment(index));
        };
        let prompt = format!("هل تريد حذف المرفق {}؟", display_name(reference));
        if !dialogs.confirm("تأكيد الحذف", &prompt).await {
            return Ok(false);
        }
        let reference = self.existing.remove(index);
        self.deleted.push(reference);
        Ok(true)
    }

    pub fn clear(&mut self) {
        self.existing.clear();
        self.staged.clear();
        self.deleted.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Image,
    Pdf,
    Other,
}

pub fn file_kind(name: &str) -> FileKind {
    match extension_of(name).as_deref() {
        Some("pdf") => FileKind::Pdf,
        Some(ext) if IMAGE_EXTENSIONS.contains(&ext) => FileKind::Image,
        _ => FileKind::Other,
    }
}

/// Last path segment, without query or fragment, percent-decoded.
pub fn display_name(reference: &str) -> String {
    let without_query = reference
        .split(['?', '#'])
        .next()
        .unwrap_or(reference)
        .trim_end_matches('/');
    let segment = without_query
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(without_query);
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}

/// Absolute URL for a stored attachment reference.
pub fn resolve_attachment_url(api_base: &str, reference: &str) -> String {
    let base = api_base.trim_end_matches('/');
    let reference = reference.trim();
    if reference.starts_with("http://") || reference.starts_with("https://") {
        reference.to_string()
    } else if reference.starts_with("/uploads/") {
        format!("{base}{reference}")
    } else if reference.starts_with("uploads/") {
        format!("{base}/{reference}")
    } else {
        format!("{base}/uploads/{}", reference.trim_start_matches('/'))
    }
}

fn extension_of(name: &str) -> Option<String> {
    let name = display_name(name);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
#[path = "tests/attachments_tests.rs"]
mod tests;
