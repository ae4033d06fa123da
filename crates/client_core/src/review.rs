use std::sync::Arc;

use async_trait::async_trait;
use shared::{
    domain::{ActivityId, ActivityStatus},
    protocol::{
        Activity, EditingDraft, MessageResponse, RecentAchievement, StatusUpdateRequest,
        UserStats,
    },
};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    dialogs::{Dialogs, Notice},
    session::Session,
    text::{char_len, extract_plain_text},
    transport::TransportError,
};

pub const MIN_REJECTION_REASON_LEN: usize = 5;
pub const DEFAULT_REJECTION_REASON: &str = "لم يتم تحديد سبب الرفض";

/// Listing and status calls used by the review screens.
#[async_trait]
pub trait ReviewApi: Send + Sync {
    async fn list_activities(&self) -> Result<Vec<Activity>, TransportError>;
    async fn list_drafts(&self) -> Result<Vec<Activity>, TransportError>;
    async fn list_archived(&self) -> Result<Vec<Activity>, TransportError>;
    async fn get_activity(&self, id: &ActivityId) -> Result<Activity, TransportError>;
    async fn get_draft(&self, id: &ActivityId) -> Result<Activity, TransportError>;
    async fn search(&self, query: &str) -> Result<Vec<Activity>, TransportError>;
    async fn filter_by_status(&self, status: ActivityStatus)
        -> Result<Vec<Activity>, TransportError>;
    async fn update_status(
        &self,
        id: &ActivityId,
        request: &StatusUpdateRequest,
    ) -> Result<MessageResponse, TransportError>;
    async fn delete_activity(&self, id: &ActivityId) -> Result<MessageResponse, TransportError>;
    async fn delete_draft(&self, id: &ActivityId) -> Result<MessageResponse, TransportError>;
    async fn user_stats(&self) -> Result<UserStats, TransportError>;
    async fn recent_achievements(&self) -> Result<Vec<RecentAchievement>, TransportError>;
}

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("ليس لديك صلاحية لهذا الإجراء")]
    NotAdmin,
    #[error("إذا قمت بكتابة سبب الرفض، فيجب أن يكون على الأقل 5 أحرف")]
    ReasonTooShort,
    #[error("cannot {action:?} an activity that is {from}")]
    InvalidTransition {
        from: ActivityStatus,
        action: ReviewAction,
    },
    #[error("activity {0} is not in the current list")]
    NotFound(ActivityId),
    /// The server answered but reported `success: false`.
    #[error("{0}")]
    Refused(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewAction {
    Approve,
    Reject,
    /// Puts an approved or rejected activity back in the review queue.
    Reassign,
}

impl ReviewAction {
    fn success_message(self) -> &'static str {
        match self {
            ReviewAction::Approve => "تم اعتماد النشاط بنجاح",
            ReviewAction::Reject => "تم رفض النشاط",
            ReviewAction::Reassign => "تمت إعادة النشاط إلى قيد المراجعة",
        }
    }
}

/// Status reached by applying `action` to an activity in `from`. Drafts
/// reach the queue through form submission, not through the desk.
pub fn next_status(from: ActivityStatus, action: ReviewAction) -> Result<ActivityStatus, ReviewError> {
    use ActivityStatus::*;
    match (from, action) {
        (Pending, ReviewAction::Approve) => Ok(Approved),
        (Pending, ReviewAction::Reject) => Ok(Rejected),
        (Approved | Rejected, ReviewAction::Reassign) => Ok(Pending),
        _ => Err(ReviewError::InvalidTransition { from, action }),
    }
}

/// Normalizes a typed rejection reason. Blank means "no reason given";
/// anything else must have at least five characters.
pub fn validate_rejection_reason(raw: &str) -> Result<String, ReviewError> {
    let reason = raw.trim();
    if reason.is_empty() {
        return Ok(DEFAULT_REJECTION_REASON.to_string());
    }
    if char_len(reason) < MIN_REJECTION_REASON_LEN {
        return Err(ReviewError::ReasonTooShort);
    }
    Ok(reason.to_string())
}

/// Which listing the desk shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Listing {
    #[default]
    All,
    Drafts,
    Archived,
}

/// A loaded list of activities plus the admin actions on it.
pub struct ReviewDesk {
    api: Arc<dyn ReviewApi>,
    session: Arc<Session>,
    dialogs: Arc<dyn Dialogs>,
    listing: Listing,
    activities: Vec<Activity>,
    search: String,
    status_filter: Option<ActivityStatus>,
}

impl ReviewDesk {
    pub fn new(api: Arc<dyn ReviewApi>, session: Arc<Session>, dialogs: Arc<dyn Dialogs>) -> Self {
        Self {
            api,
            session,
            dialogs,
            listing: Listing::All,
            activities: Vec::new(),
            search: String::new(),
            status_filter: None,
        }
    }

    pub fn listing(&self) -> Listing {
        self.listing
    }

    pub fn activities(&self) -> &[Activity] {
        &self.activities
    }

    pub async fn load(&mut self, listing: Listing) -> Result<usize, ReviewError> {
        let result = match listing {
            Listing::All => self.api.list_activities().await,
            Listing::Drafts => self.api.list_drafts().await,
            Listing::Archived => self.api.list_archived().await,
        };
        self.listing = listing;
        self.replace_list(result).await
    }

    /// Replaces the list with the server's search results for `query`.
    pub async fn search_remote(&mut self, query: &str) -> Result<usize, ReviewError> {
        let result = self.api.search(query.trim()).await;
        self.replace_list(result).await
    }

    /// Replaces the list with the server's activities in `status`.
    pub async fn load_status(&mut self, status: ActivityStatus) -> Result<usize, ReviewError> {
        let result = self.api.filter_by_status(status).await;
        self.replace_list(result).await
    }

    async fn replace_list(
        &mut self,
        result: Result<Vec<Activity>, TransportError>,
    ) -> Result<usize, ReviewError> {
        match result {
            Ok(activities) => {
                info!(listing = ?self.listing, count = activities.len(), "activities loaded");
                self.activities = activities;
                Ok(self.activities.len())
            }
            Err(err) => {
                self.dialogs
                    .show(Notice::error(
                        "خطأ",
                        err.user_message("حدث خطأ في تحميل الأنشطة"),
                    ))
                    .await;
                Err(err.into())
            }
        }
    }

    pub fn set_search(&mut self, term: &str) {
        self.search = term.trim().to_string();
    }

    pub fn set_status_filter(&mut self, status: Option<ActivityStatus>) {
        self.status_filter = status;
    }

    /// Activities matching the search term and status filter, in list order.
    pub fn filtered(&self) -> Vec<&Activity> {
        let term = self.search.to_lowercase();
        self.activities
            .iter()
            .filter(|activity| self.status_filter.map_or(true, |status| activity.status == status))
            .filter(|activity| term.is_empty() || matches_search(activity, &term))
            .collect()
    }

    pub async fn approve(&mut self, id: &ActivityId) -> Result<(), ReviewError> {
        self.transition(id, ReviewAction::Approve, None).await
    }

    pub async fn reject(&mut self, id: &ActivityId, reason: &str) -> Result<(), ReviewError> {
        let reason = match validate_rejection_reason(reason) {
            Ok(reason) => reason,
            Err(err) => {
                self.dialogs
                    .show(Notice::warning("تنبيه", err.to_string()))
                    .await;
                return Err(err);
            }
        };
        self.transition(id, ReviewAction::Reject, Some(reason)).await
    }

    pub async fn reassign(&mut self, id: &ActivityId) -> Result<(), ReviewError> {
        self.transition(id, ReviewAction::Reassign, None).await
    }

    async fn ensure_admin(&self) -> Result<(), ReviewError> {
        if self.session.is_admin().await {
            return Ok(());
        }
        self.dialogs
            .show(Notice::error("غير مصرح", ReviewError::NotAdmin.to_string()))
            .await;
        Err(ReviewError::NotAdmin)
    }

    fn position(&self, id: &ActivityId) -> Result<usize, ReviewError> {
        self.activities
            .iter()
            .position(|activity| activity.id.as_ref() == Some(id))
            .ok_or_else(|| ReviewError::NotFound(id.clone()))
    }

    async fn transition(
        &mut self,
        id: &ActivityId,
        action: ReviewAction,
        reason: Option<String>,
    ) -> Result<(), ReviewError> {
        self.ensure_admin().await?;
        let index = self.position(id)?;
        let status = next_status(self.activities[index].status, action)?;

        let request = StatusUpdateRequest {
            status,
            reason_for_rejection: reason.clone(),
        };
        let result = self.api.update_status(id, &request).await;
        if let Err(err) = self.check_response(result, "حدث خطأ أثناء التحديث.").await {
            warn!(activity_id = %id, ?action, error = %err, "status update failed");
            return Err(err);
        }

        let activity = &mut self.activities[index];
        activity.status = status;
        activity.reason_for_rejection = reason;
        info!(activity_id = %id, ?action, %status, "activity status changed");
        self.dialogs
            .show(Notice::success("تم بنجاح", action.success_message()))
            .await;
        Ok(())
    }

    /// Turns a transport error or a `success: false` reply into an error
    /// dialog and a [`ReviewError`].
    async fn check_response(
        &self,
        result: Result<MessageResponse, TransportError>,
        fallback: &str,
    ) -> Result<(), ReviewError> {
        let err = match result {
            Ok(response) if response.success => return Ok(()),
            Ok(response) => ReviewError::Refused(
                response
                    .message
                    .filter(|message| !message.trim().is_empty())
                    .unwrap_or_else(|| fallback.to_string()),
            ),
            Err(err) => {
                let message = err.user_message(fallback);
                self.dialogs.show(Notice::error("خطأ", message)).await;
                return Err(err.into());
            }
        };
        self.dialogs.show(Notice::error("خطأ", err.to_string())).await;
        Err(err)
    }

    /// Admin-only removal of any activity, after confirmation.
    pub async fn delete(&mut self, id: &ActivityId) -> Result<bool, ReviewError> {
        self.ensure_admin().await?;
        self.remove_after_confirm(id, false).await
    }

    /// Removes one of the user's own drafts, after confirmation.
    pub async fn delete_draft(&mut self, id: &ActivityId) -> Result<bool, ReviewError> {
        self.remove_after_confirm(id, true).await
    }

    async fn remove_after_confirm(&mut self, id: &ActivityId, draft: bool) -> Result<bool, ReviewError> {
        let index = self.position(id)?;
        let title = self.activities[index].title.clone();
        if !self
            .dialogs
            .confirm("تأكيد الحذف", &format!("هل أنت متأكد من حذف \"{title}\"؟"))
            .await
        {
            return Ok(false);
        }

        let result = if draft {
            self.api.delete_draft(id).await
        } else {
            self.api.delete_activity(id).await
        };
        if let Err(err) = self.check_response(result, "حدث خطأ أثناء الحذف").await {
            warn!(activity_id = %id, draft, error = %err, "delete failed");
            return Err(err);
        }

        if let Ok(index) = self.position(id) {
            self.activities.remove(index);
        }
        info!(activity_id = %id, draft, "activity deleted");
        self.dialogs
            .show(Notice::success("تم الحذف", "تم حذف النشاط بنجاح"))
            .await;
        Ok(true)
    }

    /// Caches `id` in the session as the draft the form should open.
    /// Activities outside the current list are fetched first, from the
    /// drafts endpoint when the desk shows drafts.
    pub async fn begin_edit(&self, id: &ActivityId) -> Result<EditingDraft, ReviewError> {
        let draft = match self.position(id) {
            Ok(index) => EditingDraft::from(&self.activities[index]),
            Err(_) if self.listing == Listing::Drafts => {
                EditingDraft::from(&self.api.get_draft(id).await?)
            }
            Err(_) => EditingDraft::from(&self.api.get_activity(id).await?),
        };
        self.session
            .set_editing_draft(&draft)
            .await
            .map_err(TransportError::from)?;
        Ok(draft)
    }

    pub async fn stats(&self) -> Result<UserStats, ReviewError> {
        Ok(self.api.user_stats().await?)
    }

    /// Latest activity events for the dashboard feed.
    pub async fn recent(&self) -> Result<Vec<RecentAchievement>, ReviewError> {
        Ok(self.api.recent_achievements().await?)
    }
}

fn matches_search(activity: &Activity, term: &str) -> bool {
    let user_name = activity
        .user
        .as_ref()
        .map(|user| user.full_name().to_string())
        .unwrap_or_default();
    [
        activity.title.clone(),
        extract_plain_text(&activity.description),
        activity.name.clone().unwrap_or_default(),
        user_name,
    ]
    .iter()
    .any(|candidate| candidate.to_lowercase().contains(term))
}

#[cfg(test)]
#[path = "tests/review_tests.rs"]
mod tests;
