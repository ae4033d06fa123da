use std::{collections::HashMap, sync::Arc};

use anyhow::{Context, Result};
use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use shared::{domain::ActivityId, protocol::EditingDraft};
use storage::Storage;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

pub const TOKEN_KEY: &str = "token";
pub const USER_KEY: &str = "user";
pub const EDITING_DRAFT_KEY: &str = "editingDraft";
pub const EDITING_DRAFT_ID_KEY: &str = "editingDraftId";
pub const LAST_PDF_KEY: &str = "lastPdfFilename";

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<String>>;
    async fn save(&self, key: &str, value: &str) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

#[derive(Default)]
pub struct MemorySessionStore {
    values: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn save(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.values.lock().await.remove(key);
        Ok(())
    }
}

#[async_trait]
impl SessionStore for Storage {
    async fn load(&self, key: &str) -> Result<Option<String>> {
        self.get_value(key).await
    }

    async fn save(&self, key: &str, value: &str) -> Result<()> {
        self.put_value(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.delete_value(key).await.map(|_| ())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedOut,
}

/// Claims this client reads from the access token. The token is never
/// verified here; the server does that on every request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenClaims {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(rename = "isAdmin", default)]
    pub is_admin: Option<bool>,
    #[serde(alias = "_id", default)]
    pub id: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
}

impl TokenClaims {
    fn grants_admin(&self) -> bool {
        self.role.as_deref() == Some("admin") || self.is_admin == Some(true)
    }
}

/// The user object cached next to the token at login.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CachedUser {
    #[serde(alias = "_id", default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub fullname: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(rename = "isAdmin", default)]
    pub is_admin: Option<bool>,
}

impl CachedUser {
    pub fn display_name(&self) -> Option<&str> {
        self.fullname
            .as_deref()
            .or(self.name.as_deref())
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    fn grants_admin(&self) -> bool {
        self.role.as_deref() == Some("admin") || self.is_admin == Some(true)
    }
}

pub fn decode_claims(token: &str) -> Option<TokenClaims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    match decode::<TokenClaims>(token, &DecodingKey::from_secret(&[]), &validation) {
        Ok(data) => Some(data.claims),
        Err(err) => {
            debug!(error = %err, "access token is not a readable JWT");
            None
        }
    }
}

/// Client-side session: access token, cached user, the draft handed to the
/// form for editing and the last generated report.
pub struct Session {
    store: Arc<dyn SessionStore>,
    events: broadcast::Sender<SessionEvent>,
}

impl Session {
    pub fn new(store: Arc<dyn SessionStore>) -> Arc<Self> {
        let (events, _) = broadcast::channel(16);
        Arc::new(Self { store, events })
    }

    pub fn in_memory() -> Arc<Self> {
        Self::new(Arc::new(MemorySessionStore::default()))
    }

    pub async fn open(database_url: &str) -> Result<Arc<Self>> {
        let storage = Storage::new(database_url)
            .await
            .with_context(|| format!("failed to open session store '{database_url}'"))?;
        Ok(Self::new(Arc::new(storage)))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn token(&self) -> Result<Option<String>> {
        Ok(self
            .store
            .load(TOKEN_KEY)
            .await?
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty()))
    }

    pub async fn set_token(&self, token: &str) -> Result<()> {
        self.store.save(TOKEN_KEY, token.trim()).await
    }

    pub async fn set_user_json(&self, user_json: &str) -> Result<()> {
        serde_json::from_str::<serde_json::Value>(user_json).context("user is not valid JSON")?;
        self.store.save(USER_KEY, user_json).await
    }

    /// Unreadable cached users are treated as absent.
    pub async fn user(&self) -> Result<Option<CachedUser>> {
        let Some(raw) = self.store.load(USER_KEY).await? else {
            return Ok(None);
        };
        match serde_json::from_str::<CachedUser>(&raw) {
            Ok(user) => Ok(Some(user)),
            Err(err) => {
                warn!(error = %err, "cached user is not valid JSON");
                Ok(None)
            }
        }
    }

    pub async fn claims(&self) -> Result<Option<TokenClaims>> {
        Ok(self.token().await?.as_deref().and_then(decode_claims))
    }

    /// Admin when the token says so; without a readable token, the cached
    /// user decides.
    pub async fn is_admin(&self) -> bool {
        match self.claims().await {
            Ok(Some(claims)) => return claims.grants_admin(),
            Ok(None) => {}
            Err(err) => warn!(error = %err, "failed to read access token"),
        }
        match self.user().await {
            Ok(Some(user)) => user.grants_admin(),
            Ok(None) => false,
            Err(err) => {
                warn!(error = %err, "failed to read cached user");
                false
            }
        }
    }

    pub async fn current_user_id(&self) -> Result<Option<String>> {
        if let Some(id) = self.claims().await?.and_then(|claims| claims.id) {
            return Ok(Some(id));
        }
        Ok(self.user().await?.and_then(|user| user.id))
    }

    pub async fn display_name(&self) -> Result<Option<String>> {
        Ok(self
            .user()
            .await?
            .and_then(|user| user.display_name().map(str::to_string)))
    }

    pub async fn editing_draft_raw(&self) -> Result<Option<String>> {
        self.store.load(EDITING_DRAFT_KEY).await
    }

    pub async fn set_editing_draft(&self, draft: &EditingDraft) -> Result<()> {
        let raw = serde_json::to_string(draft).context("failed to encode editing draft")?;
        self.store.save(EDITING_DRAFT_KEY, &raw).await?;
        match &draft.id {
            Some(id) => self.store.save(EDITING_DRAFT_ID_KEY, id.as_str()).await?,
            None => self.store.remove(EDITING_DRAFT_ID_KEY).await?,
        }
        debug!(draft_id = ?draft.id, "editing draft cached");
        Ok(())
    }

    pub async fn editing_draft_id(&self) -> Result<Option<ActivityId>> {
        Ok(self
            .store
            .load(EDITING_DRAFT_ID_KEY)
            .await?
            .filter(|id| !id.trim().is_empty())
            .map(ActivityId::new))
    }

    pub async fn last_pdf_filename(&self) -> Result<Option<String>> {
        self.store.load(LAST_PDF_KEY).await
    }

    pub async fn set_last_pdf_filename(&self, filename: &str) -> Result<()> {
        self.store.save(LAST_PDF_KEY, filename).await
    }

    /// Drops everything tied to the current edit: the cached draft, its id
    /// and the last generated report.
    pub async fn clear_editing(&self) -> Result<()> {
        self.store.remove(EDITING_DRAFT_KEY).await?;
        self.store.remove(EDITING_DRAFT_ID_KEY).await?;
        self.store.remove(LAST_PDF_KEY).await?;
        Ok(())
    }

    pub async fn logout(&self) -> Result<()> {
        self.store.remove(TOKEN_KEY).await?;
        self.store.remove(USER_KEY).await?;
        self.clear_editing().await?;
        info!("session cleared");
        let _ = self.events.send(SessionEvent::LoggedOut);
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
