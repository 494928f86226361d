use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Pipeline state of a lead. Every lead starts as `New`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeadStatus {
    #[default]
    New,
    Converted,
    Dropped,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "New",
            LeadStatus::Converted => "Converted",
            LeadStatus::Dropped => "Dropped",
        }
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid status '{}'. Must be one of: New, Converted, Dropped",
            self.0
        )
    }
}

impl FromStr for LeadStatus {
    type Err = UnknownStatus;

    /// Exact, case-sensitive match on the three status names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "New" => Ok(LeadStatus::New),
            "Converted" => Ok(LeadStatus::Converted),
            "Dropped" => Ok(LeadStatus::Dropped),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Lead fields extracted from a snippet, before persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadDraft {
    pub name: String,
    pub category: String,
    pub date: NaiveDate,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub budget: Option<String>,
    pub source: Option<String>,
    pub status: LeadStatus,
}

impl LeadDraft {
    /// Identity tuple used for deduplication. Case-sensitive.
    pub fn identity(&self) -> (&str, &str, NaiveDate) {
        (&self.name, &self.category, self.date)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub date: NaiveDate,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub budget: Option<String>,
    pub source: Option<String>,
    pub status: LeadStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    pub fn from_draft(draft: &LeadDraft, now: DateTime<Utc>) -> Self {
        Lead {
            id: Uuid::new_v4(),
            name: draft.name.clone(),
            category: draft.category.clone(),
            date: draft.date,
            phone: draft.phone.clone(),
            email: draft.email.clone(),
            budget: draft.budget.clone(),
            source: draft.source.clone(),
            status: draft.status,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn identity(&self) -> (&str, &str, NaiveDate) {
        (&self.name, &self.category, self.date)
    }
}

/// Raw `leads` table row. `status` is stored as text.
#[derive(Debug, Clone, FromRow)]
pub struct LeadRow {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub date: NaiveDate,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub budget: Option<String>,
    pub source: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<LeadRow> for Lead {
    type Error = UnknownStatus;

    fn try_from(row: LeadRow) -> Result<Self, Self::Error> {
        Ok(Lead {
            status: row.status.parse()?,
            id: row.id,
            name: row.name,
            category: row.category,
            date: row.date,
            phone: row.phone,
            email: row.email,
            budget: row.budget,
            source: row.source,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
