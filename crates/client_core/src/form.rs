//! Form state for creating or editing one activity.
//!
//! [`FormController`] owns a single [`Draft`], keeps field validation in
//! sync with every edit, and turns the draft into one multipart submission.

use std::{collections::HashSet, fmt, sync::Arc};

use shared::{
    domain::{
        ActivityId, ActivityStatus, MainCriterion, MainCriterionId, SaveStatus, SubCriterion,
        SubCriterionId, Table,
    },
    protocol::EditingDraft,
};
use tracing::{error, info, warn};

use crate::{
    attachments::{AddFilesOutcome, AttachmentError, AttachmentPolicy, Attachments, StagedFile},
    config::ClientSettings,
    criteria::CriteriaCache,
    dialogs::{Dialogs, Notice},
    session::Session,
    tables::{TableBuilder, TableError, TableLimits},
    text::{char_len, extract_plain_text},
    transport::{ActivityPayload, ActivityTransport},
};

pub const TITLE_MAX_LEN: usize = 150;
pub const DESCRIPTION_MIN_LEN: usize = 10;
pub const DESCRIPTION_MAX_LEN: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Title,
    Description,
    MainCriterion,
    SubCriterion,
}

impl Field {
    pub const ALL: [Field; 4] = [
        Field::Title,
        Field::Description,
        Field::MainCriterion,
        Field::SubCriterion,
    ];

    /// Line used in the consolidated "missing data" warning.
    fn summary_line(self) -> &'static str {
        match self {
            Field::Title => "• العنوان مطلوب (حتى 150 حرف)",
            Field::Description => "• الوصف مطلوب (10 أحرف على الأقل)",
            Field::MainCriterion => "• المعيار الرئيسي مطلوب",
            Field::SubCriterion => "• المعيار الفرعي مطلوب",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldError {
    Required,
    MinLength { min: usize, actual: usize },
    MaxLength { max: usize, actual: usize },
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldError::Required => f.write_str("هذا الحقل مطلوب"),
            FieldError::MinLength { min, actual } => {
                write!(f, "يجب ألا يقل عن {min} أحرف (الحالي {actual})")
            }
            FieldError::MaxLength { max, actual } => {
                write!(f, "يجب ألا يزيد عن {max} حرف (الحالي {actual})")
            }
        }
    }
}

/// The activity being written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub title: String,
    /// Plain text derived from `description_html`; this is what is sent.
    pub description: String,
    pub description_html: String,
    pub main_criterion: Option<MainCriterionId>,
    pub sub_criterion: Option<SubCriterionId>,
    pub author_display_name: String,
    pub attachments: Attachments,
    pub tables: Vec<Table>,
}

impl Draft {
    pub fn empty(policy: AttachmentPolicy) -> Self {
        Self {
            attachments: Attachments::new(policy),
            ..Self::default()
        }
    }

    pub fn field_error(&self, field: Field) -> Option<FieldError> {
        match field {
            Field::Title => {
                let len = char_len(self.title.trim());
                if len == 0 {
                    Some(FieldError::Required)
                } else if len > TITLE_MAX_LEN {
                    Some(FieldError::MaxLength {
                        max: TITLE_MAX_LEN,
                        actual: len,
                    })
                } else {
                    None
                }
            }
            Field::Description => description_error(&self.description),
            Field::MainCriterion => self
                .main_criterion
                .as_ref()
                .filter(|id| !id.as_str().trim().is_empty())
                .is_none()
                .then_some(FieldError::Required),
            Field::SubCriterion => self
                .sub_criterion
                .as_ref()
                .filter(|id| !id.as_str().trim().is_empty())
                .is_none()
                .then_some(FieldError::Required),
        }
    }

    /// Failing fields for `mode`. Saving a draft only needs a usable title.
    pub fn validate(&self, mode: SubmitMode) -> Vec<(Field, FieldError)> {
        let fields: &[Field] = match mode {
            SubmitMode::ReviewSubmit => &Field::ALL,
            SubmitMode::DraftSave => &[Field::Title],
        };
        fields
            .iter()
            .filter_map(|field| self.field_error(*field).map(|err| (*field, err)))
            .collect()
    }

    fn hydrate(policy: AttachmentPolicy, cached: EditingDraft) -> Self {
        Self {
            title: cached.title,
            description: extract_plain_text(&cached.description),
            description_html: cached.description,
            main_criterion: cached
                .main_criterion
                .as_ref()
                .and_then(|r| r.id())
                .map(MainCriterionId::new),
            sub_criterion: cached
                .sub_criterion
                .as_ref()
                .and_then(|r| r.id())
                .map(SubCriterionId::new),
            author_display_name: cached.name.unwrap_or_default(),
            attachments: Attachments::with_existing(policy, cached.attachments),
            tables: cached.tables,
        }
    }
}

fn description_error(description: &str) -> Option<FieldError> {
    let len = char_len(description);
    if len == 0 {
        Some(FieldError::Required)
    } else if len < DESCRIPTION_MIN_LEN {
        Some(FieldError::MinLength {
            min: DESCRIPTION_MIN_LEN,
            actual: len,
        })
    } else if len > DESCRIPTION_MAX_LEN {
        Some(FieldError::MaxLength {
            max: DESCRIPTION_MAX_LEN,
            actual: len,
        })
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitMode {
    /// Hand the activity in for review.
    ReviewSubmit,
    /// Keep it as an unfinished draft.
    DraftSave,
}

impl SubmitMode {
    pub fn save_status(self) -> SaveStatus {
        match self {
            SubmitMode::ReviewSubmit => SaveStatus::Complete,
            SubmitMode::DraftSave => SaveStatus::Draft,
        }
    }

    /// Both modes queue the record for review; `SaveStatus` tells them apart.
    pub fn status(self) -> ActivityStatus {
        ActivityStatus::Pending
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLoad {
    /// The controller is not editing an existing record.
    NotEditing,
    Loaded,
    Missing,
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Submitted { message: String },
    Invalid(Vec<(Field, FieldError)>),
    Failed { message: String },
}

/// Drives one create or edit form.
pub struct FormController {
    policy: AttachmentPolicy,
    limits: TableLimits,
    session: Arc<Session>,
    criteria: Arc<CriteriaCache>,
    transport: Arc<dyn ActivityTransport>,
    dialogs: Arc<dyn Dialogs>,
    draft: Draft,
    edit_mode: bool,
    editing_id: Option<ActivityId>,
    touched: HashSet<Field>,
    main_options: Vec<MainCriterion>,
    sub_options: Vec<SubCriterion>,
    table_builder: TableBuilder,
}

impl FormController {
    pub fn new(
        settings: &ClientSettings,
        session: Arc<Session>,
        criteria: Arc<CriteriaCache>,
        transport: Arc<dyn ActivityTransport>,
        dialogs: Arc<dyn Dialogs>,
    ) -> Self {
        let policy = settings.attachment_policy();
        let limits = settings.table_limits();
        Self {
            policy,
            limits,
            session,
            criteria,
            transport,
            dialogs,
            draft: Draft::empty(policy),
            edit_mode: false,
            editing_id: None,
            touched: HashSet::new(),
            main_options: Vec::new(),
            sub_options: Vec::new(),
            table_builder: TableBuilder::new(limits),
        }
    }

    /// Marks the form as editing the draft cached in the session.
    pub fn with_edit_mode(mut self, edit_mode: bool) -> Self {
        self.edit_mode = edit_mode;
        self
    }

    pub fn draft(&self) -> &Draft {
        &self.draft
    }

    pub fn is_edit_mode(&self) -> bool {
        self.edit_mode
    }

    pub fn editing_id(&self) -> Option<&ActivityId> {
        self.editing_id.as_ref()
    }

    pub fn main_options(&self) -> &[MainCriterion] {
        &self.main_options
    }

    pub fn sub_options(&self) -> &[SubCriterion] {
        &self.sub_options
    }

    pub fn table_builder(&mut self) -> &mut TableBuilder {
        &mut self.table_builder
    }

    /// Starts from an empty draft and loads the main criteria list.
    pub async fn initialize(&mut self) {
        self.reset();
        if let Ok(Some(name)) = self.session.display_name().await {
            self.draft.author_display_name = name;
        }
        match self.criteria.main_criteria().await {
            Ok(main) => self.main_options = main.as_ref().clone(),
            Err(err) => {
                error!(error = %err, "failed to load main criteria");
                self.dialogs
                    .show(Notice::error(
                        "خطأ",
                        err.user_message("حدث خطأ في تحميل المعايير الرئيسية"),
                    ))
                    .await;
            }
        }
    }

    /// Hydrates the draft from the session's editing blob. Problems are
    /// reported through the dialogs, never returned.
    pub async fn load_from_cache(&mut self) -> CacheLoad {
        if !self.edit_mode {
            return CacheLoad::NotEditing;
        }

        let raw = match self.session.editing_draft_raw().await {
            Ok(raw) => raw,
            Err(err) => {
                error!(error = %err, "failed to read editing draft");
                None
            }
        };
        let Some(raw) = raw else {
            self.dialogs
                .show(Notice::warning("تنبيه", "لم يتم العثور على بيانات المسودة"))
                .await;
            return CacheLoad::Missing;
        };

        let cached: EditingDraft = match serde_json::from_str(&raw) {
            Ok(cached) => cached,
            Err(err) => {
                warn!(error = %err, "cached editing draft is not valid JSON");
                self.dialogs
                    .show(Notice::error("خطأ", "حدث خطأ في تحميل بيانات المسودة"))
                    .await;
                return CacheLoad::Invalid;
            }
        };

        let cached_id = cached.id.clone();
        let author = self.draft.author_display_name.clone();
        self.draft = Draft::hydrate(self.policy, cached);
        if self.draft.author_display_name.trim().is_empty() {
            self.draft.author_display_name = author;
        }
        self.editing_id = match cached_id {
            Some(id) => Some(id),
            None => self.session.editing_draft_id().await.ok().flatten(),
        };

        if let Some(main_id) = self.draft.main_criterion.clone() {
            self.refresh_sub_options(main_id.as_str()).await;
        }
        info!(draft_id = ?self.editing_id, "editing draft loaded");
        CacheLoad::Loaded
    }

    pub fn set_title(&mut self, title: &str) {
        self.draft.title = title.to_string();
        self.touched.insert(Field::Title);
    }

    pub fn set_author_display_name(&mut self, name: &str) {
        self.draft.author_display_name = name.trim().to_string();
    }

    pub fn set_description_html(&mut self, html: &str) {
        self.draft.description_html = html.to_string();
        self.sync_description();
    }

    /// Re-derives the plain description from the rich source. The rich
    /// source itself is left as the user wrote it.
    pub fn sync_description(&mut self) -> Option<FieldError> {
        self.draft.description = extract_plain_text(&self.draft.description_html);
        self.touched.insert(Field::Description);
        description_error(&self.draft.description)
    }

    /// Selects a main criterion, clears the sub criterion and reloads the
    /// sub list for it. A blank id just clears the list.
    pub async fn on_main_criterion_changed(&mut self, main_id: &str) {
        let main_id = main_id.trim();
        self.draft.main_criterion = (!main_id.is_empty()).then(|| MainCriterionId::new(main_id));
        self.draft.sub_criterion = None;
        self.touched.insert(Field::MainCriterion);
        self.refresh_sub_options(main_id).await;
    }

    async fn refresh_sub_options(&mut self, main_id: &str) {
        if main_id.trim().is_empty() {
            self.sub_options.clear();
            return;
        }
        match self.criteria.sub_criteria_for(main_id).await {
            Ok(subs) => self.sub_options = subs,
            Err(err) => {
                error!(error = %err, main_id, "failed to load sub criteria");
                self.sub_options.clear();
                self.dialogs
                    .show(Notice::error(
                        "خطأ",
                        err.user_message("حدث خطأ في تحميل المعايير الفرعية"),
                    ))
                    .await;
            }
        }
    }

    pub fn set_sub_criterion(&mut self, sub_id: &str) {
        let sub_id = sub_id.trim();
        self.draft.sub_criterion = (!sub_id.is_empty()).then(|| SubCriterionId::new(sub_id));
        self.touched.insert(Field::SubCriterion);
    }

    /// Stages files and reports rejected ones as warnings.
    pub async fn add_files(&mut self, files: Vec<StagedFile>) -> Result<AddFilesOutcome, AttachmentError> {
        match self.draft.attachments.add_files(files) {
            Ok(outcome) => {
                for rejected in &outcome.rejected {
                    self.dialogs
                        .show(Notice::warning("تنبيه", rejected.to_string()))
                        .await;
                }
                Ok(outcome)
            }
            Err(err) => {
                self.dialogs
                    .show(Notice::warning("تنبيه", err.to_string()))
                    .await;
                Err(err)
            }
        }
    }

    pub fn remove_staged_file(&mut self, index: usize) -> Result<StagedFile, AttachmentError> {
        self.draft.attachments.remove(index)
    }

    pub async fn remove_existing_attachment(&mut self, index: usize) -> Result<bool, AttachmentError> {
        self.draft
            .attachments
            .remove_existing(index, self.dialogs.as_ref())
            .await
    }

    pub fn open_table(&mut self, existing: Option<usize>) -> Result<(), TableError> {
        self.table_builder.open(&self.draft.tables, existing)
    }

    pub async fn save_table(&mut self) -> Result<usize, TableError> {
        let saved = self.table_builder.save(&mut self.draft.tables);
        if let Err(err) = &saved {
            self.dialogs
                .show(Notice::warning("تنبيه", err.to_string()))
                .await;
        }
        saved
    }

    pub async fn remove_table(&mut self, index: usize) -> Result<bool, TableError> {
        self.table_builder
            .remove(&mut self.draft.tables, index, self.dialogs.as_ref())
            .await
    }

    /// Inline error for `field`, shown only once the user touched it.
    pub fn visible_error(&self, field: Field) -> Option<FieldError> {
        if !self.touched.contains(&field) {
            return None;
        }
        self.draft.field_error(field)
    }

    /// The consolidated "missing data" text, or `None` when `mode` can
    /// proceed.
    pub fn validation_report(&self, mode: SubmitMode) -> Option<String> {
        let errors = self.draft.validate(mode);
        if errors.is_empty() {
            return None;
        }
        if mode == SubmitMode::DraftSave {
            return Some("العنوان مطلوب لحفظ المسودة.".to_string());
        }
        let lines: Vec<&str> = errors.iter().map(|(field, _)| field.summary_line()).collect();
        Some(format!("يرجى ملء جميع الحقول المطلوبة:\n{}", lines.join("\n")))
    }

    /// Validates and sends the draft. Validation problems never reach the
    /// network; transport failures leave the draft untouched for a retry.
    pub async fn submit(&mut self, mode: SubmitMode) -> SubmitOutcome {
        self.sync_description();
        self.touched.extend(Field::ALL);

        let errors = self.draft.validate(mode);
        if let Some(report) = self.validation_report(mode) {
            self.dialogs.show(Notice::warning("بيانات ناقصة", report)).await;
            return SubmitOutcome::Invalid(errors);
        }

        let payload = self.build_payload(mode).await;
        let target = self.editing_id.clone().filter(|_| self.edit_mode);

        self.dialogs.show(Notice::loading("جاري الحفظ...")).await;
        let result = match &target {
            Some(id) => self.transport.update_draft(id, payload).await,
            None => self.transport.add_activity(payload).await,
        };

        let fallback = if target.is_some() {
            "حدث خطأ أثناء التحديث."
        } else {
            "حدث خطأ أثناء الحفظ."
        };
        match result {
            Ok(response) if !response.success => {
                let message = response
                    .message
                    .filter(|message| !message.trim().is_empty())
                    .unwrap_or_else(|| fallback.to_string());
                warn!(?mode, draft_id = ?target, "activity refused by the server");
                self.dialogs.show(Notice::error("خطأ", message.clone())).await;
                SubmitOutcome::Failed { message }
            }
            Ok(_) => {
                let message = match (mode, target.is_some()) {
                    (SubmitMode::ReviewSubmit, _) => "تم إرسال النشاط بنجاح للمراجعة",
                    (SubmitMode::DraftSave, true) => "تم تحديث المسودة بنجاح",
                    (SubmitMode::DraftSave, false) => "تم حفظ المسودة بنجاح",
                };
                info!(?mode, draft_id = ?target, "activity submitted");
                self.dialogs.show(Notice::success("تم بنجاح", message)).await;
                if let Err(err) = self.session.clear_editing().await {
                    warn!(error = %err, "failed to clear editing state");
                }
                self.finish();
                SubmitOutcome::Submitted {
                    message: message.to_string(),
                }
            }
            Err(err) => {
                let message = err.user_message(fallback);
                error!(error = %err, ?mode, "activity submission failed");
                self.dialogs.show(Notice::error("خطأ", message.clone())).await;
                SubmitOutcome::Failed { message }
            }
        }
    }

    /// Asks for confirmation, then drops the draft and the session's editing
    /// state.
    pub async fn cancel(&mut self) -> bool {
        if !self
            .dialogs
            .confirm("تأكيد الإلغاء", "هل تريد إلغاء العملية؟")
            .await
        {
            return false;
        }
        if let Err(err) = self.session.clear_editing().await {
            warn!(error = %err, "failed to clear editing state");
        }
        self.finish();
        true
    }

    /// The multipart body for `mode`, fields in the order the service
    /// expects them.
    pub async fn build_payload(&self, mode: SubmitMode) -> ActivityPayload {
        let user_id = match self.session.current_user_id().await {
            Ok(id) => id.unwrap_or_default(),
            Err(err) => {
                warn!(error = %err, "failed to resolve current user");
                String::new()
            }
        };
        let attachments = &self.draft.attachments;

        let mut payload = ActivityPayload::default();
        payload.push("activityTitle", self.draft.title.trim());
        payload.push("activityDescription", self.draft.description.as_str());
        payload.push(
            "MainCriteria",
            self.draft
                .main_criterion
                .as_ref()
                .map(|id| id.as_str())
                .unwrap_or_default(),
        );
        payload.push(
            "SubCriteria",
            self.draft
                .sub_criterion
                .as_ref()
                .map(|id| id.as_str())
                .unwrap_or_default(),
        );
        payload.push("status", mode.status().label());
        payload.push("SaveStatus", mode.save_status().label());
        payload.push("user", user_id);
        payload.push("name", self.draft.author_display_name.as_str());
        payload.push("tables", encode_json_list(&self.draft.tables));
        payload.push("existingAttachments", encode_json_list(attachments.existing()));
        payload.push("deletedAttachments", encode_json_list(attachments.deleted()));
        payload.files = attachments.staged().to_vec();
        payload
    }

    /// Ends the current edit after a submission or cancel.
    fn finish(&mut self) {
        self.edit_mode = false;
        self.reset();
    }

    fn reset(&mut self) {
        let author = std::mem::take(&mut self.draft.author_display_name);
        self.draft = Draft::empty(self.policy);
        self.draft.author_display_name = author;
        self.editing_id = None;
        self.touched.clear();
        self.sub_options.clear();
        self.table_builder = TableBuilder::new(self.limits);
    }
}

fn encode_json_list<T: serde::Serialize>(items: &[T]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
#[path = "tests/form_tests.rs"]
mod tests;
