use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(ActivityId);
id_newtype!(MainCriterionId);
id_newtype!(SubCriterionId);
id_newtype!(NotificationId);
id_newtype!(ReportFileId);

/// Approval state of an activity. Serialized with the Arabic labels the
/// service stores; the English aliases come from older records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ActivityStatus {
    #[default]
    #[serde(rename = "مسودة", alias = "draft")]
    Draft,
    #[serde(rename = "قيد المراجعة", alias = "pending")]
    Pending,
    #[serde(rename = "معتمد", alias = "approved")]
    Approved,
    #[serde(rename = "مرفوض", alias = "rejected")]
    Rejected,
}

impl ActivityStatus {
    pub const ALL: [ActivityStatus; 4] = [
        ActivityStatus::Draft,
        ActivityStatus::Pending,
        ActivityStatus::Approved,
        ActivityStatus::Rejected,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ActivityStatus::Draft => "مسودة",
            ActivityStatus::Pending => "قيد المراجعة",
            ActivityStatus::Approved => "معتمد",
            ActivityStatus::Rejected => "مرفوض",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL.into_iter().find(|status| {
            status.label() == label || status.english_name().eq_ignore_ascii_case(label)
        })
    }

    fn english_name(self) -> &'static str {
        match self {
            ActivityStatus::Draft => "draft",
            ActivityStatus::Pending => "pending",
            ActivityStatus::Approved => "approved",
            ActivityStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Whether a record is still being written or has been handed in. Orthogonal
/// to [`ActivityStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SaveStatus {
    #[serde(rename = "مسودة")]
    Draft,
    #[serde(rename = "مكتمل")]
    Complete,
}

impl SaveStatus {
    pub fn label(self) -> &'static str {
        match self {
            SaveStatus::Draft => "مسودة",
            SaveStatus::Complete => "مكتمل",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CriterionLevel {
    All,
    Sector,
    Department,
}

/// Embedded `{ _id, name }` object some endpoints return in place of an id.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EmbeddedRef {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fullname: Option<String>,
}

/// A reference field that arrives either as a bare id or as an embedded
/// object. Resolve it with [`CriterionRef::id`] once, at load time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CriterionRef {
    Ref(String),
    Inline(EmbeddedRef),
}

impl CriterionRef {
    pub fn id(&self) -> Option<&str> {
        let id = match self {
            CriterionRef::Ref(id) => id.as_str(),
            CriterionRef::Inline(inline) => inline.id.as_deref()?,
        };
        let id = id.trim();
        (!id.is_empty()).then_some(id)
    }

    pub fn display_name(&self) -> &str {
        match self {
            CriterionRef::Ref(value) if !value.trim().is_empty() => value.as_str(),
            CriterionRef::Inline(EmbeddedRef {
                name: Some(name), ..
            }) if !name.trim().is_empty() => name.as_str(),
            _ => "غير محدد",
        }
    }
}

/// Same id-or-object shape as [`CriterionRef`], used for the `user` field.
pub type UserRef = CriterionRef;

impl CriterionRef {
    /// Full name for a user reference, falling back to the short name.
    pub fn full_name(&self) -> &str {
        match self {
            CriterionRef::Ref(value) if !value.trim().is_empty() => value.as_str(),
            CriterionRef::Inline(inline) => inline
                .fullname
                .as_deref()
                .or(inline.name.as_deref())
                .filter(|name| !name.trim().is_empty())
                .unwrap_or("غير محدد"),
            _ => "غير محدد",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MainCriterion {
    #[serde(rename = "_id")]
    pub id: MainCriterionId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<CriterionLevel>,
}

/// Sub criterion with its parent already resolved to an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubCriterion {
    pub id: SubCriterionId,
    pub name: String,
    pub main_criterion_id: MainCriterionId,
}

/// Largest grid the client builds or accepts from the service.
pub const MAX_TABLE_ROWS: usize = 50;
pub const MAX_TABLE_COLS: usize = 20;

/// A grid of cell text embedded in an activity description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub rows: usize,
    pub cols: usize,
    #[serde(rename = "data")]
    pub cells: Vec<Vec<String>>,
    #[serde(default)]
    pub html: String,
}

impl Table {
    pub fn blank(rows: usize, cols: usize) -> Self {
        Self {
            title: None,
            rows,
            cols,
            cells: vec![vec![String::new(); cols]; rows],
            html: String::new(),
        }
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.cells.get(row)?.get(col).map(String::as_str)
    }

    pub fn is_blank(&self) -> bool {
        self.cells
            .iter()
            .flatten()
            .all(|cell| cell.trim().is_empty())
    }

    pub fn display_title(&self, index: usize) -> String {
        match self.title.as_deref().map(str::trim) {
            Some(title) if !title.is_empty() => title.to_string(),
            _ => format!("جدول {}", index + 1),
        }
    }
}

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;
