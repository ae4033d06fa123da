use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::domain::{
    ActivityId, ActivityStatus, CriterionRef, MainCriterionId, NotificationId, ReportFileId,
    SaveStatus, SubCriterion, SubCriterionId, Table, UserRef, MAX_TABLE_COLS, MAX_TABLE_ROWS,
};

/// Sub criterion exactly as `all-sub-criteria` returns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubCriterionRecord {
    #[serde(rename = "_id")]
    pub id: SubCriterionId,
    pub name: String,
    #[serde(rename = "mainCriteria")]
    pub main_criteria: CriterionRef,
}

impl SubCriterionRecord {
    /// Resolves the parent reference. Records without a usable parent id are
    /// dropped since they can never match a main criterion.
    pub fn normalize(self) -> Option<SubCriterion> {
        let main_criterion_id = MainCriterionId::new(self.main_criteria.id()?);
        Some(SubCriterion {
            id: self.id,
            name: self.name,
            main_criterion_id,
        })
    }
}

/// Loosely typed table as stored by the service: counts may be missing or
/// larger than any grid the client accepts, and cells may be any JSON value.
#[derive(Debug, Clone, Default, Deserialize)]
struct TableRecord {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    rows: Option<usize>,
    #[serde(default)]
    cols: Option<usize>,
    #[serde(default)]
    data: Option<Vec<Vec<Value>>>,
    #[serde(default)]
    html: Option<String>,
}

impl TableRecord {
    fn into_table(self) -> Table {
        let data: Vec<Vec<String>> = self
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect();
        let widest = data.iter().map(Vec::len).max().unwrap_or(0);
        let rows = self
            .rows
            .filter(|rows| *rows > 0)
            .unwrap_or_else(|| data.len().max(1))
            .min(MAX_TABLE_ROWS);
        let cols = self
            .cols
            .filter(|cols| *cols > 0)
            .unwrap_or_else(|| if widest > 0 { widest } else { 2 })
            .min(MAX_TABLE_COLS);

        let mut table = Table::blank(rows, cols);
        for (r, row) in data.into_iter().take(rows).enumerate() {
            for (c, value) in row.into_iter().take(cols).enumerate() {
                table.cells[r][c] = value;
            }
        }
        table.title = self.title.filter(|title| !title.trim().is_empty());
        table.html = self.html.unwrap_or_default();
        table
    }
}

fn cell_text(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text,
        other => other.to_string(),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TablesField {
    Encoded(String),
    Records(Vec<TableRecord>),
}

/// Accepts the `tables` field as an array, a JSON-encoded array string, an
/// empty string or null, and always yields canonical tables. Unparseable
/// strings yield no tables.
pub fn deserialize_tables<'de, D>(deserializer: D) -> Result<Vec<Table>, D::Error>
where
    D: Deserializer<'de>,
{
    let field = Option::<TablesField>::deserialize(deserializer)?;
    Ok(match field {
        None => Vec::new(),
        Some(TablesField::Records(records)) => {
            records.into_iter().map(TableRecord::into_table).collect()
        }
        Some(TablesField::Encoded(raw)) => decode_tables(&raw),
    })
}

pub fn decode_tables(raw: &str) -> Vec<Table> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }
    serde_json::from_str::<Vec<TableRecord>>(raw)
        .map(|records| records.into_iter().map(TableRecord::into_table).collect())
        .unwrap_or_default()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedFiles {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docx: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ActivityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserRef>,
    #[serde(rename = "activityTitle", default)]
    pub title: String,
    #[serde(rename = "activityDescription", default)]
    pub description: String,
    #[serde(rename = "MainCriteria", default, skip_serializing_if = "Option::is_none")]
    pub main_criterion: Option<CriterionRef>,
    #[serde(rename = "SubCriteria", default, skip_serializing_if = "Option::is_none")]
    pub sub_criterion: Option<CriterionRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<CriterionRef>,
    #[serde(default)]
    pub status: ActivityStatus,
    #[serde(
        rename = "reasonForRejection",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub reason_for_rejection: Option<String>,
    #[serde(rename = "SaveStatus", default, skip_serializing_if = "Option::is_none")]
    pub save_status: Option<SaveStatus>,
    #[serde(rename = "Attachments", default)]
    pub attachments: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_tables")]
    pub tables: Vec<Table>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(rename = "updatedAt", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(
        rename = "generatedFiles",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub generated_files: Option<GeneratedFiles>,
}

/// The blob a "start edit" action leaves in the session for the form to pick
/// up. Criteria are stored as plain ids.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EditingDraft {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ActivityId>,
    #[serde(rename = "activityTitle", default)]
    pub title: String,
    #[serde(rename = "activityDescription", default)]
    pub description: String,
    #[serde(rename = "MainCriteria", default, skip_serializing_if = "Option::is_none")]
    pub main_criterion: Option<CriterionRef>,
    #[serde(rename = "SubCriteria", default, skip_serializing_if = "Option::is_none")]
    pub sub_criterion: Option<CriterionRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ActivityStatus>,
    #[serde(rename = "SaveStatus", default, skip_serializing_if = "Option::is_none")]
    pub save_status: Option<SaveStatus>,
    #[serde(rename = "Attachments", default)]
    pub attachments: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(
        rename = "reasonForRejection",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub reason_for_rejection: Option<String>,
    #[serde(default, deserialize_with = "deserialize_tables")]
    pub tables: Vec<Table>,
}

impl From<&Activity> for EditingDraft {
    fn from(activity: &Activity) -> Self {
        let plain_ref = |r: &Option<CriterionRef>| {
            r.as_ref()
                .and_then(CriterionRef::id)
                .map(|id| CriterionRef::Ref(id.to_string()))
        };
        Self {
            id: activity.id.clone(),
            title: activity.title.clone(),
            description: activity.description.clone(),
            main_criterion: plain_ref(&activity.main_criterion),
            sub_criterion: plain_ref(&activity.sub_criterion),
            name: activity.name.clone(),
            status: Some(activity.status),
            save_status: Some(activity.save_status.unwrap_or(SaveStatus::Draft)),
            attachments: activity.attachments.clone(),
            user: activity
                .user
                .as_ref()
                .and_then(CriterionRef::id)
                .map(str::to_string),
            reason_for_rejection: activity.reason_for_rejection.clone(),
            tables: activity.tables.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActivitiesResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub activities: Vec<Activity>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActivityDataResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Vec<Activity>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActivityResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    pub activity: Activity,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: ActivityStatus,
    #[serde(
        rename = "reasonForRejection",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub reason_for_rejection: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total_activities: u64,
    pub pending_activities: u64,
    pub approved_activities: u64,
    pub rejected_activities: u64,
    pub draft_activities: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserStatsResponse {
    #[serde(default)]
    pub success: bool,
    pub data: UserStats,
}

/// One line of the "recent achievements" feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentAchievement {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub time: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecentAchievementsResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub activities: Vec<RecentAchievement>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportStats {
    pub total_reports: u64,
    pub pdf_count: u64,
    pub docx_count: u64,
    pub last_generated: Option<String>,
    pub most_active_user: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportStatsResponse {
    #[serde(default)]
    pub success: bool,
    pub data: ReportStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    #[default]
    Pdf,
    Docx,
}

impl ReportType {
    pub fn endpoint(self) -> &'static str {
        match self {
            ReportType::Pdf => "generate-pdf",
            ReportType::Docx => "generate-docx",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ReportType::Pdf => "pdf",
            ReportType::Docx => "docx",
        }
    }

    pub fn from_filename(filename: &str) -> Self {
        if filename.to_lowercase().ends_with(".docx") {
            ReportType::Docx
        } else {
            ReportType::Pdf
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportFilters {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub main_criterion: Option<MainCriterionId>,
    pub sub_criterion: Option<SubCriterionId>,
    pub user: Option<String>,
    pub status: Option<ActivityStatus>,
    pub report_type: ReportType,
}

impl ReportFilters {
    /// Query pairs for the generate endpoints; unset or blank filters are
    /// left out entirely.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        let mut push = |key: &'static str, value: Option<&str>| {
            if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
                pairs.push((key, value.to_string()));
            }
        };
        push("startDate", self.start_date.as_deref());
        push("endDate", self.end_date.as_deref());
        push(
            "MainCriteria",
            self.main_criterion.as_ref().map(|id| id.as_str()),
        );
        push(
            "SubCriteria",
            self.sub_criterion.as_ref().map(|id| id.as_str()),
        );
        push("user", self.user.as_deref());
        push("status", self.status.map(ActivityStatus::label));
        pairs
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportGenerationResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportFile {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ReportFileId>,
    #[serde(rename = "pdfurl")]
    pub url: String,
    #[serde(rename = "createdAt", default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(rename = "fileType", default)]
    pub file_type: Option<ReportType>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportFilesResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(rename = "pdfFiles", default)]
    pub files: Vec<ReportFile>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Warning,
    Error,
    #[default]
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(alias = "_id")]
    pub id: NotificationId,
    pub title: String,
    pub message: String,
    #[serde(rename = "type", default)]
    pub kind: NotificationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub read: bool,
    #[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(rename = "actionUrl", default, skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
}

/// One frame from the realtime channel: an event name and its payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketEvent {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
