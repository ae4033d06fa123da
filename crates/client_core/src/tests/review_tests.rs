use super::*;
use serde_json::json;
use shared::error::ApiError;
use tokio::sync::Mutex;

use crate::dialogs::{NoticeKind, RecordingDialogs};

#[derive(Default)]
struct FakeReviewApi {
    activities: Vec<Activity>,
    status_updates: Mutex<Vec<(ActivityId, StatusUpdateRequest)>>,
    deleted: Mutex<Vec<(ActivityId, bool)>>,
    fetched: Mutex<Vec<String>>,
    fail_updates: bool,
    refuse: bool,
}

fn ok() -> MessageResponse {
    MessageResponse {
        success: true,
        message: None,
    }
}

impl FakeReviewApi {
    fn reply(&self) -> MessageResponse {
        if self.refuse {
            MessageResponse {
                success: false,
                message: Some("refused".into()),
            }
        } else {
            ok()
        }
    }
}

#[async_trait]
impl ReviewApi for FakeReviewApi {
    async fn list_activities(&self) -> Result<Vec<Activity>, TransportError> {
        Ok(self.activities.clone())
    }

    async fn list_drafts(&self) -> Result<Vec<Activity>, TransportError> {
        Ok(self
            .activities
            .iter()
            .filter(|a| a.status == ActivityStatus::Draft)
            .cloned()
            .collect())
    }

    async fn list_archived(&self) -> Result<Vec<Activity>, TransportError> {
        Err(ApiError::new(404, None).into())
    }

    async fn get_activity(&self, id: &ActivityId) -> Result<Activity, TransportError> {
        self.fetched.lock().await.push(format!("activity {id}"));
        self.find(id)
    }

    async fn get_draft(&self, id: &ActivityId) -> Result<Activity, TransportError> {
        self.fetched.lock().await.push(format!("draft {id}"));
        self.find(id)
    }

    async fn search(&self, query: &str) -> Result<Vec<Activity>, TransportError> {
        Ok(self
            .activities
            .iter()
            .filter(|a| a.title.contains(query))
            .cloned()
            .collect())
    }


    async fn filter_by_status(
        &self,
        status: ActivityStatus,
    ) -> Result<Vec<Activity>, TransportError> {
        Ok(self
            .activities
            .iter()
            .filter(|a| a.status == status)
            .cloned()
            .collect())
    }

    async fn update_status(
        &self,
        id: &ActivityId,
        request: &StatusUpdateRequest,
    ) -> Result<MessageResponse, TransportError> {
        if self.fail_updates {
            return Err(ApiError::new(500, None).into());
        }
        self.status_updates
            .lock()
            .await
            .push((id.clone(), request.clone()));
        Ok(self.reply())
    }

    async fn delete_activity(&self, id: &ActivityId) -> Result<MessageResponse, TransportError> {
        self.deleted.lock().await.push((id.clone(), false));
        Ok(self.reply())
    }

    async fn delete_draft(&self, id: &ActivityId) -> Result<MessageResponse, TransportError> {
        self.deleted.lock().await.push((id.clone(), true));
        Ok(self.reply())
    }

    async fn user_stats(&self) -> Result<UserStats, TransportError> {
        Ok(UserStats {
            total_activities: self.activities.len() as u64,
            ..UserStats::default()
        })
    }

    async fn recent_achievements(&self) -> Result<Vec<RecentAchievement>, TransportError> {
        Ok(vec![RecentAchievement {
            id: "a2".into(),
            message: "تم اعتماد Conference talk".into(),
            time: "منذ ساعة".into(),
        }])
    }
}

impl FakeReviewApi {
    fn find(&self, id: &ActivityId) -> Result<Activity, TransportError> {
        self.activities
            .iter()
            .find(|a| a.id.as_ref() == Some(id))
            .cloned()
            .ok_or_else(|| ApiError::new(404, None).into())
    }
}

fn activity(id: &str, title: &str, status: ActivityStatus) -> Activity {
    serde_json::from_value(json!({
        "_id": id,
        "activityTitle": title,
        "activityDescription": "<p>وصف <b>مفصل</b> للنشاط</p>",
        "MainCriteria": { "_id": "m1", "name": "رئيسي" },
        "SubCriteria": "s1",
        "user": { "_id": "u1", "fullname": "Khalid Omar" },
        "status": status.label(),
        "Attachments": ["uploads/a.png"],
        "tables": "[]"
    }))
    .expect("activity")
}

fn sample_api() -> FakeReviewApi {
    FakeReviewApi {
        activities: vec![
            activity("a1", "ورشة عمل", ActivityStatus::Pending),
            activity("a2", "Conference talk", ActivityStatus::Approved),
            activity("a3", "مسودة بحث", ActivityStatus::Draft),
        ],
        ..FakeReviewApi::default()
    }
}

async fn admin_session() -> Arc<Session> {
    let session = Session::in_memory();
    session
        .set_user_json(r#"{"_id":"admin","role":"admin"}"#)
        .await
        .expect("user");
    session
}

async fn desk_with(
    api: Arc<FakeReviewApi>,
    session: Arc<Session>,
    confirm: bool,
) -> (ReviewDesk, Arc<RecordingDialogs>) {
    let dialogs = Arc::new(RecordingDialogs::new(confirm));
    let mut desk = ReviewDesk::new(api, session, dialogs.clone());
    desk.load(Listing::All).await.expect("load");
    (desk, dialogs)
}

#[test]
fn status_machine_transitions() {
    use ActivityStatus::*;
    assert_eq!(next_status(Pending, ReviewAction::Approve).expect("approve"), Approved);
    assert_eq!(next_status(Pending, ReviewAction::Reject).expect("reject"), Rejected);
    assert_eq!(next_status(Approved, ReviewAction::Reassign).expect("reassign"), Pending);
    assert_eq!(next_status(Rejected, ReviewAction::Reassign).expect("reassign"), Pending);
    assert!(matches!(
        next_status(Draft, ReviewAction::Approve),
        Err(ReviewError::InvalidTransition { .. })
    ));
    assert!(next_status(Approved, ReviewAction::Reject).is_err());
    assert!(next_status(Pending, ReviewAction::Reassign).is_err());
    assert!(next_status(Draft, ReviewAction::Reassign).is_err());
}

#[test]
fn rejection_reason_rules() {
    assert_eq!(
        validate_rejection_reason("   ").expect("blank accepted"),
        DEFAULT_REJECTION_REASON
    );
    assert!(matches!(
        validate_rejection_reason("abc"),
        Err(ReviewError::ReasonTooShort)
    ));
    assert!(matches!(
        validate_rejection_reason("نقص"),
        Err(ReviewError::ReasonTooShort)
    ));
    assert_eq!(validate_rejection_reason(" abcde ").expect("five"), "abcde");
}

#[tokio::test]
async fn approve_updates_server_and_local_list() {
    let api = Arc::new(sample_api());
    let (mut desk, dialogs) = desk_with(api.clone(), admin_session().await, true).await;
    let id = ActivityId::new("a1");

    desk.approve(&id).await.expect("approve");

    let updates = api.status_updates.lock().await;
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].1.status, ActivityStatus::Approved);
    assert_eq!(updates[0].1.reason_for_rejection, None);
    assert_eq!(desk.activities()[0].status, ActivityStatus::Approved);
    assert_eq!(
        dialogs.last().await.expect("dialog").kind,
        NoticeKind::Success
    );
}

#[tokio::test]
async fn reject_sends_default_reason_when_blank() {
    let api = Arc::new(sample_api());
    let (mut desk, _) = desk_with(api.clone(), admin_session().await, true).await;

    desk.reject(&ActivityId::new("a1"), "").await.expect("reject");

    let updates = api.status_updates.lock().await;
    assert_eq!(updates[0].1.status, ActivityStatus::Rejected);
    assert_eq!(
        updates[0].1.reason_for_rejection.as_deref(),
        Some(DEFAULT_REJECTION_REASON)
    );
    assert_eq!(
        desk.activities()[0].reason_for_rejection.as_deref(),
        Some(DEFAULT_REJECTION_REASON)
    );
}

#[tokio::test]
async fn short_rejection_reason_is_refused_before_any_call() {
    let api = Arc::new(sample_api());
    let (mut desk, dialogs) = desk_with(api.clone(), admin_session().await, true).await;

    let err = desk
        .reject(&ActivityId::new("a1"), "no")
        .await
        .expect_err("too short");

    assert!(matches!(err, ReviewError::ReasonTooShort));
    assert!(api.status_updates.lock().await.is_empty());
    assert_eq!(
        dialogs.last().await.expect("dialog").kind,
        NoticeKind::Warning
    );
    assert_eq!(desk.activities()[0].status, ActivityStatus::Pending);
}

#[tokio::test]
async fn non_admin_cannot_change_status() {
    let api = Arc::new(sample_api());
    let session = Session::in_memory();
    session
        .set_user_json(r#"{"_id":"u1","role":"user"}"#)
        .await
        .expect("user");
    let (mut desk, dialogs) = desk_with(api.clone(), session, true).await;

    let err = desk
        .approve(&ActivityId::new("a1"))
        .await
        .expect_err("not admin");

    assert!(matches!(err, ReviewError::NotAdmin));
    assert!(api.status_updates.lock().await.is_empty());
    assert_eq!(
        dialogs.last().await.expect("dialog").text,
        "ليس لديك صلاحية لهذا الإجراء"
    );
}

#[tokio::test]
async fn reassign_requeues_approved_activity() {
    let api = Arc::new(sample_api());
    let (mut desk, _) = desk_with(api.clone(), admin_session().await, true).await;

    desk.reassign(&ActivityId::new("a2")).await.expect("reassign");
    assert_eq!(desk.activities()[1].status, ActivityStatus::Pending);

    let err = desk
        .reassign(&ActivityId::new("a2"))
        .await
        .expect_err("already pending");
    assert!(matches!(err, ReviewError::InvalidTransition { .. }));
}

#[tokio::test]
async fn failed_update_leaves_local_status_alone() {
    let api = Arc::new(FakeReviewApi {
        fail_updates: true,
        ..sample_api()
    });
    let (mut desk, dialogs) = desk_with(api, admin_session().await, true).await;

    let err = desk
        .approve(&ActivityId::new("a1"))
        .await
        .expect_err("server error");

    assert!(matches!(err, ReviewError::Transport(_)));
    assert_eq!(desk.activities()[0].status, ActivityStatus::Pending);
    assert_eq!(
        dialogs.last().await.expect("dialog").text,
        "حدث خطأ في الخادم. يرجى المحاولة لاحقاً"
    );
}

#[tokio::test]
async fn refused_update_and_delete_change_nothing_locally() {
    let api = Arc::new(FakeReviewApi {
        refuse: true,
        ..sample_api()
    });
    let (mut desk, dialogs) = desk_with(api.clone(), admin_session().await, true).await;

    let err = desk
        .approve(&ActivityId::new("a1"))
        .await
        .expect_err("refused update");
    assert!(matches!(&err, ReviewError::Refused(message) if message == "refused"));
    assert_eq!(desk.activities()[0].status, ActivityStatus::Pending);
    let notice = dialogs.last().await.expect("dialog");
    assert_eq!(notice.kind, NoticeKind::Error);
    assert_eq!(notice.text, "refused");

    let err = desk
        .delete(&ActivityId::new("a2"))
        .await
        .expect_err("refused delete");
    assert!(matches!(err, ReviewError::Refused(_)));
    assert_eq!(desk.activities().len(), 3);
    assert_eq!(api.deleted.lock().await.len(), 1);
    assert_eq!(dialogs.last().await.expect("dialog").kind, NoticeKind::Error);
    assert!(dialogs
        .notices()
        .await
        .iter()
        .all(|notice| notice.kind != NoticeKind::Success));
}

#[tokio::test]
async fn delete_requires_confirmation_and_removes_locally() {
    let api = Arc::new(sample_api());
    let (mut declined, _) = desk_with(api.clone(), admin_session().await, false).await;
    assert!(!declined.delete(&ActivityId::new("a2")).await.expect("delete"));
    assert!(api.deleted.lock().await.is_empty());

    let (mut desk, _) = desk_with(api.clone(), admin_session().await, true).await;
    assert!(desk.delete(&ActivityId::new("a2")).await.expect("delete"));
    assert_eq!(desk.activities().len(), 2);
    assert_eq!(
        api.deleted.lock().await.as_slice(),
        [(ActivityId::new("a2"), false)]
    );
}

#[tokio::test]
async fn users_delete_their_own_drafts() {
    let api = Arc::new(sample_api());
    let (mut desk, _) = desk_with(api.clone(), Session::in_memory(), true).await;
    desk.load(Listing::Drafts).await.expect("drafts");
    assert_eq!(desk.activities().len(), 1);

    assert!(desk
        .delete_draft(&ActivityId::new("a3"))
        .await
        .expect("delete draft"));
    assert!(desk.activities().is_empty());
    assert_eq!(
        api.deleted.lock().await.as_slice(),
        [(ActivityId::new("a3"), true)]
    );
}

#[tokio::test]
async fn filters_by_term_and_status() {
    let api = Arc::new(sample_api());
    let (mut desk, _) = desk_with(api, admin_session().await, true).await;

    desk.set_search("conference");
    let titles: Vec<_> = desk.filtered().iter().map(|a| a.title.as_str()).collect();
    assert_eq!(titles, ["Conference talk"]);

    desk.set_search("مفصل");
    assert_eq!(desk.filtered().len(), 3, "matches plain description text");

    desk.set_search("khalid");
    assert_eq!(desk.filtered().len(), 3, "matches the user's name");

    desk.set_status_filter(Some(ActivityStatus::Draft));
    let ids: Vec<_> = desk
        .filtered()
        .iter()
        .filter_map(|a| a.id.as_ref().map(|id| id.as_str().to_string()))
        .collect();
    assert_eq!(ids, ["a3"]);

    desk.set_search("<b>");
    assert!(desk.filtered().is_empty(), "markup is not searchable");
}

#[tokio::test]
async fn remote_search_and_status_listing_replace_the_list() {
    let api = Arc::new(sample_api());
    let (mut desk, _) = desk_with(api, admin_session().await, true).await;

    assert_eq!(desk.search_remote("ورشة").await.expect("search"), 1);
    assert_eq!(
        desk.load_status(ActivityStatus::Approved)
            .await
            .expect("status"),
        1
    );
    assert_eq!(desk.activities()[0].title, "Conference talk");
}

#[tokio::test]
async fn listing_failure_shows_error() {
    let api = Arc::new(sample_api());
    let (mut desk, dialogs) = desk_with(api, admin_session().await, true).await;

    assert!(desk.load(Listing::Archived).await.is_err());
    assert_eq!(
        dialogs.last().await.expect("dialog").text,
        "العنصر المطلوب غير موجود"
    );
}

#[tokio::test]
async fn begin_edit_caches_plain_criterion_ids() {
    let api = Arc::new(sample_api());
    let session = admin_session().await;
    let (desk, _) = desk_with(api, session.clone(), true).await;

    let draft = desk
        .begin_edit(&ActivityId::new("a3"))
        .await
        .expect("edit");

    assert_eq!(draft.main_criterion.as_ref().and_then(|r| r.id()), Some("m1"));
    assert_eq!(
        session.editing_draft_id().await.expect("id"),
        Some(ActivityId::new("a3"))
    );
    let raw = session.editing_draft_raw().await.expect("raw").expect("blob");
    assert!(raw.contains(r#""MainCriteria":"m1""#));
    assert!(raw.contains(r#""user":"u1""#));
}

#[tokio::test]
async fn stats_pass_through() {
    let api = Arc::new(sample_api());
    let (desk, _) = desk_with(api, admin_session().await, true).await;
    assert_eq!(desk.stats().await.expect("stats").total_activities, 3);
}

#[tokio::test]
async fn begin_edit_outside_the_list_uses_the_matching_endpoint() {
    let api = Arc::new(sample_api());
    let (mut desk, _) = desk_with(api.clone(), Session::in_memory(), true).await;
    desk.begin_edit(&ActivityId::new("a1")).await.expect("in list");
    assert!(api.fetched.lock().await.is_empty());

    desk.load(Listing::Drafts).await.expect("drafts");
    let draft = desk
        .begin_edit(&ActivityId::new("a1"))
        .await
        .expect("draft fetch");
    assert_eq!(draft.title, "ورشة عمل");

    desk.load(Listing::Archived).await.expect_err("archived fails");
    desk.begin_edit(&ActivityId::new("a2")).await.expect("activity fetch");
    assert_eq!(
        api.fetched.lock().await.as_slice(),
        ["draft a1", "activity a2"]
    );
}

#[tokio::test]
async fn recent_feed_pass_through() {
    let api = Arc::new(sample_api());
    let (desk, _) = desk_with(api, Session::in_memory(), true).await;
    let recent = desk.recent().await.expect("recent");
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].id, "a2");
}
