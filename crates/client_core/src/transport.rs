use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{
    header::AUTHORIZATION,
    multipart::{Form, Part},
    Client, RequestBuilder, Response,
};
use serde::de::DeserializeOwned;
use shared::{
    domain::{
        ActivityId, ActivityStatus, MainCriterion, NotificationId, ReportFileId, SubCriterion,
    },
    error::{ApiError, ErrorCode},
    protocol::{
        ActivitiesResponse, Activity, ActivityDataResponse, ActivityResponse, MessageResponse,
        Notification, RecentAchievement, RecentAchievementsResponse, ReportFile,
        ReportFilesResponse, ReportFilters, ReportGenerationResponse, ReportStats,
        ReportStatsResponse, StatusUpdateRequest, SubCriterionRecord, UserStats,
        UserStatsResponse,
    },
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    attachments::StagedFile, config::ClientSettings, criteria::CriteriaLookup,
    notifications::NotificationApi, reports::ReportApi, review::ReviewApi, session::Session,
};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no access token in session")]
    MissingToken,
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error(transparent)]
    Session(#[from] anyhow::Error),
}

impl TransportError {
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Api(err) => Some(err.status),
            TransportError::Network(err) => err.status().map(|status| status.as_u16()),
            _ => None,
        }
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self, TransportError::MissingToken)
            || matches!(self, TransportError::Api(err) if err.code == ErrorCode::Unauthorized)
    }

    /// Text for an error dialog: the server's message when there is one,
    /// then a status-specific message, then `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            TransportError::MissingToken => "يرجى تسجيل الدخول أولاً".to_string(),
            TransportError::Api(err) => err.user_message(fallback),
            _ => fallback.to_string(),
        }
    }
}

/// Text fields and files of one activity submission, in send order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityPayload {
    pub fields: Vec<(String, String)>,
    pub files: Vec<StagedFile>,
}

impl ActivityPayload {
    pub const FILES_FIELD: &'static str = "Attachments";

    pub fn push(&mut self, name: &str, value: impl Into<String>) {
        self.fields.push((name.to_string(), value.into()));
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn into_form(self) -> Result<Form, TransportError> {
        let mut form = Form::new();
        for (name, value) in self.fields {
            form = form.text(name, value);
        }
        for file in self.files {
            let part = Part::bytes(file.bytes)
                .file_name(file.filename)
                .mime_str(&file.mime_type)?;
            form = form.part(Self::FILES_FIELD, part);
        }
        Ok(form)
    }
}

/// Create and update calls for activity submissions.
#[async_trait]
pub trait ActivityTransport: Send + Sync {
    async fn add_activity(&self, payload: ActivityPayload)
        -> Result<MessageResponse, TransportError>;
    async fn update_draft(
        &self,
        id: &ActivityId,
        payload: ActivityPayload,
    ) -> Result<MessageResponse, TransportError>;
    async fn update_activity(
        &self,
        id: &ActivityId,
        payload: ActivityPayload,
    ) -> Result<MessageResponse, TransportError>;
}

/// REST client for the achievements service. Every call carries the
/// session token in a raw `Authorization` header.
pub struct HttpApiClient {
    http: Client,
    base_url: String,
    session: Arc<Session>,
}

impl HttpApiClient {
    pub fn new(settings: &ClientSettings, session: Arc<Session>) -> Result<Self, TransportError> {
        let http = Client::builder()
            .timeout(settings.request_timeout())
            .build()?;
        Ok(Self {
            http,
            base_url: settings.api_base().to_string(),
            session,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    fn activity_url(&self, path: &str) -> String {
        format!("{}/activity/{path}", self.base_url)
    }

    fn criteria_url(&self, path: &str) -> String {
        format!("{}/api/criteria/{path}", self.base_url)
    }

    fn notifications_url(&self, path: &str) -> String {
        if path.is_empty() {
            format!("{}/api/notifications", self.base_url)
        } else {
            format!("{}/api/notifications/{path}", self.base_url)
        }
    }

    async fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder, TransportError> {
        let token = self
            .session
            .token()
            .await?
            .ok_or(TransportError::MissingToken)?;
        Ok(builder.header(AUTHORIZATION, token))
    }

    /// Sends the request and turns non-2xx answers into [`ApiError`]s.
    /// A 401 also ends the local session.
    async fn execute(&self, builder: RequestBuilder) -> Result<Response, TransportError> {
        let response = self.authorized(builder).await?.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let err = ApiError::from_body(status.as_u16(), &body);
        warn!(status = status.as_u16(), message = ?err.message, "api request failed");
        if err.code == ErrorCode::Unauthorized {
            if let Err(logout_err) = self.session.logout().await {
                warn!(error = %logout_err, "failed to clear session after 401");
            }
        }
        Err(err.into())
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, TransportError> {
        let body = self.execute(builder).await?.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl ActivityTransport for HttpApiClient {
    async fn add_activity(
        &self,
        payload: ActivityPayload,
    ) -> Result<MessageResponse, TransportError> {
        let files = payload.files.len();
        let form = payload.into_form()?;
        let response: MessageResponse = self
            .send_json(self.http.post(self.activity_url("add")).multipart(form))
            .await?;
        info!(files, "activity created");
        Ok(response)
    }

    async fn update_draft(
        &self,
        id: &ActivityId,
        payload: ActivityPayload,
    ) -> Result<MessageResponse, TransportError> {
        let form = payload.into_form()?;
        let response: MessageResponse = self
            .send_json(
                self.http
                    .put(self.activity_url(&format!("update-draft/{id}")))
                    .multipart(form),
            )
            .await?;
        info!(activity_id = %id, "draft updated");
        Ok(response)
    }

    async fn update_activity(
        &self,
        id: &ActivityId,
        payload: ActivityPayload,
    ) -> Result<MessageResponse, TransportError> {
        let form = payload.into_form()?;
        let response: MessageResponse = self
            .send_json(
                self.http
                    .put(self.activity_url(&format!("update/{id}")))
                    .multipart(form),
            )
            .await?;
        info!(activity_id = %id, "activity updated");
        Ok(response)
    }
}

#[async_trait]
impl CriteriaLookup for HttpApiClient {
    async fn main_criteria(&self) -> Result<Vec<MainCriterion>, TransportError> {
        self.send_json(self.http.get(self.criteria_url("all-main-criteria")))
            .await
    }

    async fn sub_criteria(&self) -> Result<Vec<SubCriterion>, TransportError> {
        let records: Vec<SubCriterionRecord> = self
            .send_json(self.http.get(self.criteria_url("all-sub-criteria")))
            .await?;
        let total = records.len();
        let normalized: Vec<SubCriterion> = records
            .into_iter()
            .filter_map(SubCriterionRecord::normalize)
            .collect();
        if normalized.len() < total {
            debug!(
                dropped = total - normalized.len(),
                "sub criteria without a parent id ignored"
            );
        }
        Ok(normalized)
    }
}

#[async_trait]
impl ReviewApi for HttpApiClient {
    async fn list_activities(&self) -> Result<Vec<Activity>, TransportError> {
        let response: ActivitiesResponse =
            self.send_json(self.http.get(self.activity_url("all"))).await?;
        Ok(response.activities)
    }

    async fn list_drafts(&self) -> Result<Vec<Activity>, TransportError> {
        let response: ActivityDataResponse = self
            .send_json(self.http.get(self.activity_url("draft")))
            .await?;
        Ok(response.data)
    }

    async fn list_archived(&self) -> Result<Vec<Activity>, TransportError> {
        let response: ActivityDataResponse = self
            .send_json(self.http.get(self.activity_url("archived")))
            .await?;
        Ok(response.data)
    }

    async fn get_activity(&self, id: &ActivityId) -> Result<Activity, TransportError> {
        let response: ActivityResponse = self
            .send_json(self.http.get(self.activity_url(id.as_str())))
            .await?;
        Ok(response.activity)
    }

    async fn get_draft(&self, id: &ActivityId) -> Result<Activity, TransportError> {
        let response: ActivityResponse = self
            .send_json(self.http.get(self.activity_url(&format!("draft/{id}"))))
            .await?;
        Ok(response.activity)
    }

    async fn search(&self, query: &str) -> Result<Vec<Activity>, TransportError> {
        let response: ActivityDataResponse = self
            .send_json(
                self.http
                    .get(self.activity_url("search"))
                    .query(&[("query", query)]),
            )
            .await?;
        Ok(response.data)
    }

    async fn filter_by_status(
        &self,
        status: ActivityStatus,
    ) -> Result<Vec<Activity>, TransportError> {
        let response: ActivityDataResponse = self
            .send_json(
                self.http
                    .get(self.activity_url("filter"))
                    .query(&[("status", status.label())]),
            )
            .await?;
        Ok(response.data)
    }

    async fn update_status(
        &self,
        id: &ActivityId,
        request: &StatusUpdateRequest,
    ) -> Result<MessageResponse, TransportError> {
        let response: MessageResponse = self
            .send_json(
                self.http
                    .put(self.activity_url(&format!("update-status/{id}")))
                    .json(request),
            )
            .await?;
        info!(activity_id = %id, status = %request.status, "activity status updated");
        Ok(response)
    }

    async fn delete_activity(&self, id: &ActivityId) -> Result<MessageResponse, TransportError> {
        self.send_json(self.http.delete(self.activity_url(&format!("delete/{id}"))))
            .await
    }

    async fn delete_draft(&self, id: &ActivityId) -> Result<MessageResponse, TransportError> {
        self.send_json(
            self.http
                .delete(self.activity_url(&format!("delete-draft/{id}"))),
        )
        .await
    }

    async fn user_stats(&self) -> Result<UserStats, TransportError> {
        let response: UserStatsResponse = self
            .send_json(self.http.get(self.activity_url("user-stats")))
            .await?;
        Ok(response.data)
    }

    async fn recent_achievements(&self) -> Result<Vec<RecentAchievement>, TransportError> {
        let response: RecentAchievementsResponse = self
            .send_json(self.http.get(self.activity_url("recent-achievements")))
            .await?;
        Ok(response.activities)
    }
}

#[async_trait]
impl ReportApi for HttpApiClient {
    async fn generate_report(
        &self,
        filters: &ReportFilters,
    ) -> Result<ReportGenerationResponse, TransportError> {
        self.send_json(
            self.http
                .get(self.activity_url(filters.report_type.endpoint()))
                .query(&filters.query_pairs()),
        )
        .await
    }

    async fn view_pdf(&self, filename: &str) -> Result<Vec<u8>, TransportError> {
        let encoded = percent_encoding::utf8_percent_encode(
            filename,
            percent_encoding::NON_ALPHANUMERIC,
        )
        .to_string();
        let response = self
            .execute(self.http.get(self.activity_url(&format!("view-pdf/{encoded}"))))
            .await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn list_report_files(&self) -> Result<Vec<ReportFile>, TransportError> {
        let response: ReportFilesResponse = self
            .send_json(self.http.get(self.activity_url("all-pdfs")))
            .await?;
        Ok(response.files)
    }

    async fn delete_report_file(&self, id: &ReportFileId) -> Result<MessageResponse, TransportError> {
        self.send_json(self.http.delete(self.activity_url(&format!("pdfs/{id}"))))
            .await
    }

    async fn report_stats(&self) -> Result<ReportStats, TransportError> {
        let response: ReportStatsResponse = self
            .send_json(self.http.get(self.activity_url("report-stats")))
            .await?;
        Ok(response.data)
    }
}

#[async_trait]
impl NotificationApi for HttpApiClient {
    async fn fetch_notifications(&self) -> Result<Vec<Notification>, TransportError> {
        self.send_json(self.http.get(self.notifications_url(""))).await
    }

    async fn mark_notification_read(&self, id: &NotificationId) -> Result<(), TransportError> {
        self.execute(
            self.http
                .post(self.notifications_url(id.as_str()))
                .json(&serde_json::json!({ "seen": true })),
        )
        .await?;
        Ok(())
    }

    async fn mark_all_notifications_read(&self) -> Result<(), TransportError> {
        self.execute(
            self.http
                .put(self.notifications_url("markAllRead"))
                .json(&serde_json::json!({})),
        )
        .await?;
        Ok(())
    }

    async fn delete_notification(&self, id: &NotificationId) -> Result<(), TransportError> {
        self.execute(self.http.delete(self.notifications_url(id.as_str())))
            .await?;
        Ok(())
    }

    async fn clear_all_notifications(&self) -> Result<(), TransportError> {
        self.execute(self.http.delete(self.notifications_url("clearAll")))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
