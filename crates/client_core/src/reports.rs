use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use percent_encoding::percent_decode_str;
use shared::{
    domain::ReportFileId,
    protocol::{
        MessageResponse, ReportFile, ReportFilters, ReportGenerationResponse, ReportStats,
        ReportType,
    },
};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    dialogs::{Dialogs, Notice},
    session::Session,
    transport::TransportError,
};

const DEFAULT_REPORT_NAME: &str = "report.pdf";

/// Characters `decodeURI`-style repair leaves escaped.
const RESERVED: &[u8] = b";/?:@&=+$,#";

#[async_trait]
pub trait ReportApi: Send + Sync {
    async fn generate_report(
        &self,
        filters: &ReportFilters,
    ) -> Result<ReportGenerationResponse, TransportError>;
    async fn view_pdf(&self, filename: &str) -> Result<Vec<u8>, TransportError>;
    async fn list_report_files(&self) -> Result<Vec<ReportFile>, TransportError>;
    async fn delete_report_file(&self, id: &ReportFileId)
        -> Result<MessageResponse, TransportError>;
    async fn report_stats(&self) -> Result<ReportStats, TransportError>;
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("{0}")]
    Failed(String),
    #[error("لا يوجد ملف PDF متاح للعرض. يرجى إنشاء PDF أولاً")]
    NoPdf,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A report the service finished generating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedReport {
    pub report_type: ReportType,
    pub file_url: String,
    pub filename: String,
    pub count: Option<u64>,
    pub message: String,
}

pub struct Reports {
    api: Arc<dyn ReportApi>,
    session: Arc<Session>,
    dialogs: Arc<dyn Dialogs>,
}

impl Reports {
    pub fn new(api: Arc<dyn ReportApi>, session: Arc<Session>, dialogs: Arc<dyn Dialogs>) -> Self {
        Self {
            api,
            session,
            dialogs,
        }
    }

    pub async fn generate(&self, filters: &ReportFilters) -> Result<GeneratedReport, ReportError> {
        self.dialogs
            .show(Notice::loading("جاري إنشاء التقرير..."))
            .await;
        let response = match self.api.generate_report(filters).await {
            Ok(response) => response,
            Err(err) => {
                self.dialogs
                    .show(Notice::error(
                        "خطأ",
                        err.user_message("حدث خطأ في إنشاء التقرير"),
                    ))
                    .await;
                return Err(err.into());
            }
        };

        if !response.success || response.file.trim().is_empty() {
            let message = Some(response.message.trim())
                .filter(|message| !message.is_empty())
                .unwrap_or("حدث خطأ في إنشاء التقرير")
                .to_string();
            warn!(report_type = ?filters.report_type, %message, "report generation refused");
            self.dialogs.show(Notice::error("خطأ", message.clone())).await;
            return Err(ReportError::Failed(message));
        }

        let file_url = fix_arabic_url(response.file.trim());
        let filename = response
            .filename
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .or_else(|| filename_from_url(&file_url))
            .unwrap_or_else(|| DEFAULT_REPORT_NAME.to_string());

        if filters.report_type == ReportType::Pdf {
            self.session
                .set_last_pdf_filename(&filename)
                .await
                .map_err(TransportError::from)?;
        }

        info!(report_type = ?filters.report_type, %filename, count = ?response.count, "report generated");
        let message = if response.message.trim().is_empty() {
            "تم إنشاء التقرير بنجاح".to_string()
        } else {
            response.message
        };
        self.dialogs.show(Notice::success("تم", message.clone())).await;

        Ok(GeneratedReport {
            report_type: filters.report_type,
            file_url,
            filename,
            count: response.count,
            message,
        })
    }

    /// Bytes of the PDF generated last in this session.
    pub async fn view_last_pdf(&self) -> Result<(String, Vec<u8>), ReportError> {
        let filename = self
            .session
            .last_pdf_filename()
            .await
            .map_err(TransportError::from)?;
        let Some(filename) = filename else {
            self.dialogs
                .show(Notice::warning("تحذير", ReportError::NoPdf.to_string()))
                .await;
            return Err(ReportError::NoPdf);
        };
        let bytes = self.fetch(&filename).await?;
        Ok((filename, bytes))
    }

    /// Fetches `filename` and writes it into `dir` as `name`.
    pub async fn download(
        &self,
        filename: &str,
        dir: &Path,
        name: &str,
    ) -> Result<PathBuf, ReportError> {
        let bytes = self.fetch(filename).await?;
        let path = dir.join(name);
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|source| ReportError::Io {
                path: path.clone(),
                source,
            })?;
        info!(path = %path.display(), bytes = bytes.len(), "report downloaded");
        Ok(path)
    }

    async fn fetch(&self, filename: &str) -> Result<Vec<u8>, ReportError> {
        match self.api.view_pdf(filename).await {
            Ok(bytes) => Ok(bytes),
            Err(err) => {
                self.dialogs
                    .show(Notice::warning(
                        "لا يمكن عرض الملف حالياً",
                        err.user_message("يرجى المحاولة مرة أخرى"),
                    ))
                    .await;
                Err(err.into())
            }
        }
    }

    pub async fn files(&self) -> Result<Vec<ReportFile>, ReportError> {
        Ok(self.api.list_report_files().await?)
    }

    pub async fn stats(&self) -> Result<ReportStats, ReportError> {
        Ok(self.api.report_stats().await?)
    }

    /// Deletes an archived report after confirmation. Returns whether it
    /// was deleted.
    pub async fn delete_file(&self, id: &ReportFileId) -> Result<bool, ReportError> {
        if !self
            .dialogs
            .confirm("تأكيد الحذف", "هل أنت متأكد من حذف هذا التقرير؟")
            .await
        {
            return Ok(false);
        }
        let fallback = "حدث خطأ أثناء الحذف";
        match self.api.delete_report_file(id).await {
            Ok(response) if response.success => {}
            Ok(response) => {
                let message = response
                    .message
                    .filter(|message| !message.trim().is_empty())
                    .unwrap_or_else(|| fallback.to_string());
                warn!(report_id = %id, %message, "report delete refused");
                self.dialogs.show(Notice::error("خطأ", message.clone())).await;
                return Err(ReportError::Failed(message));
            }
            Err(err) => {
                self.dialogs
                    .show(Notice::error("خطأ", err.user_message(fallback)))
                    .await;
                return Err(err.into());
            }
        }
        info!(report_id = %id, "report deleted");
        self.dialogs
            .show(Notice::success("تم الحذف", "تم حذف التقرير بنجاح"))
            .await;
        Ok(true)
    }
}

/// Local file name for a downloaded activity PDF.
pub fn download_name(title: &str, date: NaiveDate) -> String {
    let title = title.trim();
    let title = if title.is_empty() {
        "انجاز".to_string()
    } else {
        title
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || ('\u{0600}'..='\u{06FF}').contains(&c) {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    };
    format!("انجاز_{title}_{}.pdf", date.format("%Y-%m-%d"))
}

/// Undoes the double encoding the service applies to Arabic file names.
pub fn fix_arabic_url(url: &str) -> String {
    if url.contains("%25") {
        return percent_decode_str(url)
            .decode_utf8()
            .map(|decoded| decoded.into_owned())
            .unwrap_or_else(|_| url.to_string());
    }
    if url.contains('%') {
        return decode_unreserved(url).unwrap_or_else(|| url.to_string());
    }
    url.to_string()
}

fn decode_unreserved(url: &str) -> Option<String> {
    let bytes = url.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let decoded = bytes
                .get(i + 1..i + 3)
                .filter(|hex| hex.iter().all(u8::is_ascii_hexdigit))
                .and_then(|hex| std::str::from_utf8(hex).ok())
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            match decoded {
                Some(byte) if !RESERVED.contains(&byte) => {
                    out.push(byte);
                    i += 3;
                    continue;
                }
                Some(_) => {}
                None => return None,
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out).ok()
}

/// Last non-empty path segment of a URL or path, percent-decoded.
pub fn filename_from_url(url: &str) -> Option<String> {
    let path = match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or_default().to_string(),
    };
    let segment = path.rsplit('/').find(|segment| !segment.is_empty())?;
    let decoded = percent_decode_str(segment).decode_utf8_lossy().into_owned();
    Some(decoded)
}

#[cfg(test)]
#[path = "tests/reports_tests.rs"]
mod tests;
