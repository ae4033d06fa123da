use super::*;
use async_trait::async_trait;
use shared::{
    domain::CriterionRef,
    error::ApiError,
    protocol::MessageResponse,
};
use tokio::sync::Mutex;

use crate::{
    criteria::CriteriaLookup,
    dialogs::{NoticeKind, RecordingDialogs},
    session::{MemorySessionStore, SessionStore, EDITING_DRAFT_KEY},
    transport::TransportError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Add(ActivityPayload),
    UpdateDraft(ActivityId, ActivityPayload),
}

#[derive(Default)]
struct RecordingTransport {
    calls: Mutex<Vec<Call>>,
    fail_with: Option<(u16, Option<String>)>,
    refuse: bool,
}

impl RecordingTransport {
    fn failing(status: u16, message: Option<&str>) -> Self {
        Self {
            fail_with: Some((status, message.map(str::to_string))),
            ..Self::default()
        }
    }

    fn result(&self) -> Result<MessageResponse, TransportError> {
        match &self.fail_with {
            Some((status, message)) => Err(ApiError::new(*status, message.clone()).into()),
            None => Ok(MessageResponse {
                success: !self.refuse,
                message: Some(if self.refuse { "العنوان مكرر" } else { "ok" }.into()),
            }),
        }
    }
}

#[async_trait]
impl ActivityTransport for RecordingTransport {
    async fn add_activity(
        &self,
        payload: ActivityPayload,
    ) -> Result<MessageResponse, TransportError> {
        self.calls.lock().await.push(Call::Add(payload));
        self.result()
    }

    async fn update_draft(
        &self,
        id: &ActivityId,
        payload: ActivityPayload,
    ) -> Result<MessageResponse, TransportError> {
        self.calls
            .lock()
            .await
            .push(Call::UpdateDraft(id.clone(), payload));
        self.result()
    }

    async fn update_activity(
        &self,
        _id: &ActivityId,
        _payload: ActivityPayload,
    ) -> Result<MessageResponse, TransportError> {
        unreachable!("the form never updates finished activities")
    }
}

struct StaticCriteria {
    fail_sub: bool,
}

#[async_trait]
impl CriteriaLookup for StaticCriteria {
    async fn main_criteria(&self) -> Result<Vec<MainCriterion>, TransportError> {
        Ok(vec![MainCriterion {
            id: MainCriterionId::new("m1"),
            name: "المعيار الأول".into(),
            level: None,
        }])
    }

    async fn sub_criteria(&self) -> Result<Vec<SubCriterion>, TransportError> {
        if self.fail_sub {
            return Err(ApiError::new(500, None).into());
        }
        Ok(vec![
            SubCriterion {
                id: SubCriterionId::new("s1"),
                name: "فرعي 1".into(),
                main_criterion_id: MainCriterionId::new("m1"),
            },
            SubCriterion {
                id: SubCriterionId::new("s2"),
                name: "فرعي 2".into(),
                main_criterion_id: MainCriterionId::new("m2"),
            },
        ])
    }
}

struct Harness {
    form: FormController,
    session: Arc<Session>,
    transport: Arc<RecordingTransport>,
    dialogs: Arc<RecordingDialogs>,
}

fn harness_with(transport: RecordingTransport, fail_sub: bool, confirm: bool) -> Harness {
    let session = Session::in_memory();
    let transport = Arc::new(transport);
    let dialogs = Arc::new(RecordingDialogs::new(confirm));
    let criteria = CriteriaCache::new(Arc::new(StaticCriteria { fail_sub }));
    let form = FormController::new(
        &ClientSettings::default(),
        session.clone(),
        criteria,
        transport.clone(),
        dialogs.clone(),
    );
    Harness {
        form,
        session,
        transport,
        dialogs,
    }
}

fn harness() -> Harness {
    harness_with(RecordingTransport::default(), false, true)
}

async fn fill_valid(form: &mut FormController) {
    form.set_title("t");
    form.set_description_html("<p>0123456789</p>");
    form.on_main_criterion_changed("m1").await;
    form.set_sub_criterion("s1");
}

#[test]
fn title_limits() {
    let mut draft = Draft::empty(AttachmentPolicy::default());
    assert_eq!(draft.field_error(Field::Title), Some(FieldError::Required));

    draft.title = "x".repeat(150);
    assert_eq!(draft.field_error(Field::Title), None);

    draft.title = "x".repeat(151);
    assert_eq!(
        draft.field_error(Field::Title),
        Some(FieldError::MaxLength {
            max: 150,
            actual: 151
        })
    );
}

#[test]
fn description_limits() {
    let mut draft = Draft::empty(AttachmentPolicy::default());
    draft.description = "x".repeat(9);
    assert_eq!(
        draft.field_error(Field::Description),
        Some(FieldError::MinLength { min: 10, actual: 9 })
    );
    draft.description = "x".repeat(10);
    assert_eq!(draft.field_error(Field::Description), None);
    draft.description = "x".repeat(1000);
    assert_eq!(draft.field_error(Field::Description), None);
    draft.description = "x".repeat(1001);
    assert_eq!(
        draft.field_error(Field::Description),
        Some(FieldError::MaxLength {
            max: 1000,
            actual: 1001
        })
    );
}

#[test]
fn draft_save_only_checks_title() {
    let mut draft = Draft::empty(AttachmentPolicy::default());
    draft.title = "عنوان".into();
    assert!(draft.validate(SubmitMode::DraftSave).is_empty());
    assert_eq!(draft.validate(SubmitMode::ReviewSubmit).len(), 3);
}

#[tokio::test]
async fn sync_description_keeps_rich_source() {
    let mut h = harness();
    h.form.set_description_html("<p>مرحبا <b>بالعالم</b></p>");
    assert_eq!(h.form.draft().description, "مرحبا بالعالم");
    assert_eq!(h.form.draft().description_html, "<p>مرحبا <b>بالعالم</b></p>");
    assert_eq!(h.form.sync_description(), None);

    h.form.set_description_html("<p>short</p>");
    assert_eq!(
        h.form.visible_error(Field::Description),
        Some(FieldError::MinLength { min: 10, actual: 5 })
    );
}

#[tokio::test]
async fn errors_stay_hidden_until_touched() {
    let mut h = harness();
    assert_eq!(h.form.visible_error(Field::Title), None);
    h.form.set_title("");
    assert_eq!(h.form.visible_error(Field::Title), Some(FieldError::Required));
}

#[tokio::test]
async fn changing_main_criterion_clears_sub_and_filters_options() {
    let mut h = harness();
    h.form.on_main_criterion_changed("m1").await;
    h.form.set_sub_criterion("s1");

    h.form.on_main_criterion_changed("m1").await;
    assert_eq!(h.form.draft().sub_criterion, None);
    let ids: Vec<_> = h.form.sub_options().iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, ["s1"]);

    h.form.on_main_criterion_changed("").await;
    assert_eq!(h.form.draft().main_criterion, None);
    assert!(h.form.sub_options().is_empty());
}

#[tokio::test]
async fn sub_lookup_failure_shows_error_and_empties_list() {
    let mut h = harness_with(RecordingTransport::default(), true, true);
    h.form.on_main_criterion_changed("m1").await;

    assert!(h.form.sub_options().is_empty());
    let last = h.dialogs.last().await.expect("dialog");
    assert_eq!(last.kind, NoticeKind::Error);
}

#[tokio::test]
async fn initialize_loads_main_options_and_author() {
    let mut h = harness();
    h.session
        .set_user_json(r#"{"_id":"u1","fullname":"أحمد علي"}"#)
        .await
        .expect("user");

    h.form.initialize().await;

    assert_eq!(h.form.main_options().len(), 1);
    assert_eq!(h.form.draft().author_display_name, "أحمد علي");
}

#[tokio::test]
async fn valid_review_submission_sends_one_payload() {
    let mut h = harness();
    fill_valid(&mut h.form).await;

    let outcome = h.form.submit(SubmitMode::ReviewSubmit).await;

    assert_eq!(
        outcome,
        SubmitOutcome::Submitted {
            message: "تم إرسال النشاط بنجاح للمراجعة".into()
        }
    );
    let calls = h.transport.calls.lock().await;
    assert_eq!(calls.len(), 1);
    let Call::Add(payload) = &calls[0] else {
        panic!("expected add, got {:?}", calls[0]);
    };
    assert_eq!(payload.field("SaveStatus"), Some("مكتمل"));
    assert_eq!(payload.field("status"), Some("قيد المراجعة"));
    assert_eq!(payload.field("tables"), Some("[]"));
    assert_eq!(payload.field("activityTitle"), Some("t"));
    assert_eq!(payload.field("activityDescription"), Some("0123456789"));
    assert_eq!(payload.field("MainCriteria"), Some("m1"));
    assert_eq!(payload.field("SubCriteria"), Some("s1"));
    assert!(payload.files.is_empty());
    assert_eq!(h.form.draft().title, "", "form resets after success");
}

#[tokio::test]
async fn invalid_submission_never_reaches_transport() {
    let mut h = harness();
    h.form.set_title("t");

    let outcome = h.form.submit(SubmitMode::ReviewSubmit).await;

    let SubmitOutcome::Invalid(errors) = outcome else {
        panic!("expected validation failure");
    };
    let fields: Vec<_> = errors.iter().map(|(field, _)| *field).collect();
    assert_eq!(
        fields,
        [Field::Description, Field::MainCriterion, Field::SubCriterion]
    );
    assert!(h.transport.calls.lock().await.is_empty());

    let warning = h.dialogs.last().await.expect("dialog");
    assert_eq!(warning.kind, NoticeKind::Warning);
    assert!(warning.text.contains("• الوصف مطلوب (10 أحرف على الأقل)"));
    assert!(!warning.text.contains("العنوان"));
    assert_eq!(h.form.visible_error(Field::SubCriterion), Some(FieldError::Required));
}

#[tokio::test]
async fn draft_save_without_title_warns() {
    let mut h = harness();
    h.form.set_description_html("<p>long enough text</p>");

    let outcome = h.form.submit(SubmitMode::DraftSave).await;

    assert!(matches!(outcome, SubmitOutcome::Invalid(_)));
    assert_eq!(
        h.dialogs.last().await.expect("dialog").text,
        "العنوان مطلوب لحفظ المسودة."
    );
}

#[tokio::test]
async fn draft_save_sends_draft_save_status() {
    let mut h = harness();
    h.form.set_title("مسودة");

    let outcome = h.form.submit(SubmitMode::DraftSave).await;

    assert_eq!(
        outcome,
        SubmitOutcome::Submitted {
            message: "تم حفظ المسودة بنجاح".into()
        }
    );
    let calls = h.transport.calls.lock().await;
    let Call::Add(payload) = &calls[0] else {
        panic!("expected add");
    };
    assert_eq!(payload.field("SaveStatus"), Some("مسودة"));
    assert_eq!(payload.field("status"), Some("قيد المراجعة"));
}

#[tokio::test]
async fn failure_keeps_draft_and_shows_server_message() {
    let mut h = harness_with(
        RecordingTransport::failing(400, Some("العنوان مكرر")),
        false,
        true,
    );
    fill_valid(&mut h.form).await;

    let outcome = h.form.submit(SubmitMode::ReviewSubmit).await;

    assert_eq!(
        outcome,
        SubmitOutcome::Failed {
            message: "العنوان مكرر".into()
        }
    );
    assert_eq!(h.form.draft().title, "t");
    let messages = h.dialogs.messages().await;
    assert_eq!(messages.last().map(|n| n.kind), Some(NoticeKind::Error));
}

#[tokio::test]
async fn failure_without_message_uses_status_text() {
    let mut h = harness_with(RecordingTransport::failing(500, None), false, true);
    fill_valid(&mut h.form).await;

    let SubmitOutcome::Failed { message } = h.form.submit(SubmitMode::ReviewSubmit).await else {
        panic!("expected failure");
    };
    assert_eq!(message, "حدث خطأ في الخادم. يرجى المحاولة لاحقاً");
}

#[tokio::test]
async fn failure_with_unknown_status_uses_generic_fallback() {
    let mut h = harness_with(RecordingTransport::failing(418, None), false, true);
    fill_valid(&mut h.form).await;

    let SubmitOutcome::Failed { message } = h.form.submit(SubmitMode::ReviewSubmit).await else {
        panic!("expected failure");
    };
    assert_eq!(message, "حدث خطأ أثناء الحفظ.");
}

fn cached_draft() -> EditingDraft {
    EditingDraft {
        id: Some(ActivityId::new("a7")),
        title: "نشاط قديم".into(),
        description: "وصف النشاط القديم".into(),
        main_criterion: Some(CriterionRef::Ref("m1".into())),
        sub_criterion: Some(CriterionRef::Ref("s1".into())),
        name: Some("منى".into()),
        attachments: vec!["uploads/old.pdf".into()],
        ..EditingDraft::default()
    }
}

#[tokio::test]
async fn edit_mode_hydrates_from_session_and_updates_draft() {
    let mut h = harness();
    h.session
        .set_editing_draft(&cached_draft())
        .await
        .expect("cache");
    h.form = FormController::new(
        &ClientSettings::default(),
        h.session.clone(),
        CriteriaCache::new(Arc::new(StaticCriteria { fail_sub: false })),
        h.transport.clone(),
        h.dialogs.clone(),
    )
    .with_edit_mode(true);

    h.form.initialize().await;
    assert_eq!(h.form.load_from_cache().await, CacheLoad::Loaded);
    assert_eq!(h.form.draft().title, "نشاط قديم");
    assert_eq!(h.form.draft().description_html, "وصف النشاط القديم");
    assert_eq!(h.form.draft().attachments.existing().len(), 1);
    assert_eq!(h.form.sub_options().len(), 1);
    assert_eq!(h.form.editing_id(), Some(&ActivityId::new("a7")));

    let outcome = h.form.submit(SubmitMode::DraftSave).await;
    assert_eq!(
        outcome,
        SubmitOutcome::Submitted {
            message: "تم تحديث المسودة بنجاح".into()
        }
    );

    let calls = h.transport.calls.lock().await;
    let Call::UpdateDraft(id, payload) = &calls[0] else {
        panic!("expected update-draft");
    };
    assert_eq!(id.as_str(), "a7");
    assert_eq!(payload.field("existingAttachments"), Some(r#"["uploads/old.pdf"]"#));
    assert_eq!(payload.field("deletedAttachments"), Some("[]"));
    assert_eq!(payload.field("name"), Some("منى"));
    drop(calls);

    assert_eq!(h.session.editing_draft_raw().await.expect("raw"), None);
    assert!(!h.form.is_edit_mode());
}

#[tokio::test]
async fn cached_markup_is_stripped_before_measuring_and_sending() {
    let mut h = harness();
    let cached = EditingDraft {
        description: "<p>وصف   <b>النشاط</b> &amp; القديم</p>".into(),
        ..cached_draft()
    };
    h.session.set_editing_draft(&cached).await.expect("cache");
    h.form = FormController::new(
        &ClientSettings::default(),
        h.session.clone(),
        CriteriaCache::new(Arc::new(StaticCriteria { fail_sub: false })),
        h.transport.clone(),
        h.dialogs.clone(),
    )
    .with_edit_mode(true);

    assert_eq!(h.form.load_from_cache().await, CacheLoad::Loaded);
    assert_eq!(h.form.draft().description, "وصف النشاط & القديم");
    assert_eq!(
        h.form.draft().description_html,
        "<p>وصف   <b>النشاط</b> &amp; القديم</p>"
    );

    assert!(matches!(
        h.form.submit(SubmitMode::ReviewSubmit).await,
        SubmitOutcome::Submitted { .. }
    ));
    let calls = h.transport.calls.lock().await;
    let Call::UpdateDraft(_, payload) = &calls[0] else {
        panic!("expected update-draft");
    };
    assert_eq!(payload.field("activityDescription"), Some("وصف النشاط & القديم"));
}

#[tokio::test]
async fn refused_submission_keeps_draft_and_shows_server_message() {
    let mut h = harness_with(
        RecordingTransport {
            refuse: true,
            ..RecordingTransport::default()
        },
        false,
        true,
    );
    fill_valid(&mut h.form).await;

    let outcome = h.form.submit(SubmitMode::ReviewSubmit).await;
    assert_eq!(
        outcome,
        SubmitOutcome::Failed {
            message: "العنوان مكرر".into()
        }
    );
    assert_eq!(h.form.draft().title, "t");
    let notice = h.dialogs.last().await.expect("dialog");
    assert_eq!(notice.kind, NoticeKind::Error);
    assert_eq!(notice.text, "العنوان مكرر");
}

#[tokio::test]
async fn embedded_criteria_refs_resolve_to_ids() {
    let mut h = harness();
    let raw = r#"{"activityTitle":"x","activityDescription":"","MainCriteria":{"_id":"m1","name":"n"},"SubCriteria":{"_id":"s1"},"tables":"[{\"rows\":1,\"cols\":1,\"data\":[[\"v\"]]}]"}"#;
    h.session
        .set_editing_draft(&serde_json::from_str(raw).expect("blob"))
        .await
        .expect("cache");
    h.form = FormController::new(
        &ClientSettings::default(),
        h.session.clone(),
        CriteriaCache::new(Arc::new(StaticCriteria { fail_sub: false })),
        h.transport.clone(),
        h.dialogs.clone(),
    )
    .with_edit_mode(true);

    assert_eq!(h.form.load_from_cache().await, CacheLoad::Loaded);
    assert_eq!(
        h.form.draft().main_criterion,
        Some(MainCriterionId::new("m1"))
    );
    assert_eq!(h.form.draft().sub_criterion, Some(SubCriterionId::new("s1")));
    assert_eq!(h.form.draft().tables.len(), 1);
    assert_eq!(h.form.draft().tables[0].cell(0, 0), Some("v"));
}

#[tokio::test]
async fn missing_cache_blob_warns() {
    let mut h = harness();
    h.form = FormController::new(
        &ClientSettings::default(),
        h.session.clone(),
        CriteriaCache::new(Arc::new(StaticCriteria { fail_sub: false })),
        h.transport.clone(),
        h.dialogs.clone(),
    )
    .with_edit_mode(true);

    assert_eq!(h.form.load_from_cache().await, CacheLoad::Missing);
    let last = h.dialogs.last().await.expect("dialog");
    assert_eq!(last.kind, NoticeKind::Warning);
    assert_eq!(last.text, "لم يتم العثور على بيانات المسودة");
}

#[tokio::test]
async fn malformed_cache_blob_reports_error_and_keeps_draft_empty() {
    let store = MemorySessionStore::default();
    store
        .save(EDITING_DRAFT_KEY, "{not json")
        .await
        .expect("save");
    let session = Session::new(Arc::new(store));
    let dialogs = Arc::new(RecordingDialogs::new(true));
    let mut form = FormController::new(
        &ClientSettings::default(),
        session,
        CriteriaCache::new(Arc::new(StaticCriteria { fail_sub: false })),
        Arc::new(RecordingTransport::default()),
        dialogs.clone(),
    )
    .with_edit_mode(true);

    assert_eq!(form.load_from_cache().await, CacheLoad::Invalid);
    assert_eq!(form.draft().title, "");
    let last = dialogs.last().await.expect("dialog");
    assert_eq!(last.kind, NoticeKind::Error);
    assert_eq!(last.text, "حدث خطأ في تحميل بيانات المسودة");
}

#[tokio::test]
async fn load_from_cache_outside_edit_mode_does_nothing() {
    let mut h = harness();
    assert_eq!(h.form.load_from_cache().await, CacheLoad::NotEditing);
    assert!(h.dialogs.notices().await.is_empty());
}

#[tokio::test]
async fn cancel_requires_confirmation() {
    let mut h = harness_with(RecordingTransport::default(), false, false);
    h.form.set_title("keep me");
    assert!(!h.form.cancel().await);
    assert_eq!(h.form.draft().title, "keep me");

    let mut h = harness();
    h.session
        .set_editing_draft(&cached_draft())
        .await
        .expect("cache");
    h.session.set_last_pdf_filename("r.pdf").await.expect("pdf");
    h.form.set_title("drop me");
    assert!(h.form.cancel().await);
    assert_eq!(h.form.draft().title, "");
    assert_eq!(h.session.editing_draft_raw().await.expect("raw"), None);
    assert_eq!(h.session.last_pdf_filename().await.expect("pdf"), None);
}

#[tokio::test]
async fn staged_files_and_tables_are_part_of_the_payload() {
    let mut h = harness();
    fill_valid(&mut h.form).await;
    h.form
        .add_files(vec![StagedFile::new("scan.pdf", b"%PDF-1.4".to_vec())])
        .await
        .expect("stage");
    h.form.open_table(None).expect("open");
    h.form.table_builder().set_cell(0, 0, "قيمة").expect("cell");
    h.form.save_table().await.expect("save table");

    let payload = h.form.build_payload(SubmitMode::ReviewSubmit).await;

    assert_eq!(payload.files.len(), 1);
    assert_eq!(payload.files[0].mime_type, "application/pdf");
    let tables: Vec<Table> =
        serde_json::from_str(payload.field("tables").expect("tables")).expect("tables json");
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].cell(0, 0), Some("قيمة"));
    assert!(tables[0].html.contains("<td>قيمة</td>"));
}

#[tokio::test]
async fn rejected_files_are_reported_as_warnings() {
    let mut h = harness();
    let outcome = h
        .form
        .add_files(vec![StagedFile::new("virus.exe", vec![1])])
        .await
        .expect("batch");
    assert_eq!(outcome.staged, 0);
    assert_eq!(
        h.dialogs.last().await.expect("dialog").kind,
        NoticeKind::Warning
    );
}
