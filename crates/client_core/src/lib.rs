//! Client library for the achievements service: form state, attachment
//! staging, embedded tables, the admin review workflow and the REST
//! transport that ties them to the server.

pub mod attachments;
pub mod config;
pub mod criteria;
pub mod dialogs;
pub mod form;
pub mod notifications;
pub mod reports;
pub mod review;
pub mod session;
pub mod tables;
pub mod text;
pub mod transport;

pub use attachments::{AttachmentPolicy, Attachments, StagedFile};
pub use config::{load_settings, ClientSettings};
pub use criteria::{CriteriaCache, CriteriaLookup};
pub use dialogs::{Dialogs, Notice, NoticeKind};
pub use form::{CacheLoad, Draft, FormController, SubmitMode, SubmitOutcome};
pub use notifications::{NotificationApi, NotificationCenter};
pub use reports::{ReportApi, ReportError, Reports};
pub use review::{Listing, ReviewApi, ReviewDesk, ReviewError};
pub use session::{MemorySessionStore, Session, SessionStore};
pub use tables::{TableBuilder, TableLimits};
pub use transport::{ActivityPayload, ActivityTransport, HttpApiClient, TransportError};
