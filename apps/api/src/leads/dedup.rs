use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::leads::parser::parse_snippet;
use crate::models::lead::{Lead, LeadDraft};
use crate::store::{InsertOutcome, LeadStore, StoreResult};

/// One fetched email as submitted by the mail client.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IncomingEmail {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
}

/// What happened to one draft offered to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupDecision {
    Persisted(Lead),
    SkippedDuplicate,
}

/// Per-batch tally. Only `created` is reported to callers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub created: usize,
    /// Missing subject/snippet, missing required fields, or bad date.
    pub rejected: usize,
    pub duplicates: usize,
}

/// Persists the draft unless a lead with the same identity already exists.
pub async fn dedup_and_persist(
    store: &dyn LeadStore,
    draft: &LeadDraft,
) -> StoreResult<DedupDecision> {
    match store.insert_if_absent(draft).await? {
        InsertOutcome::Inserted(lead) => Ok(DedupDecision::Persisted(lead)),
        InsertOutcome::Duplicate => {
            let (name, category, date) = draft.identity();
            debug!(name, category, %date, "Duplicate lead skipped");
            Ok(DedupDecision::SkippedDuplicate)
        }
    }
}

/// Parses and deduplicates each email in order. A snippet that does not
/// parse is skipped without affecting the rest of the batch; a store error
/// aborts the batch.
pub async fn ingest_batch(
    store: &dyn LeadStore,
    emails: &[IncomingEmail],
) -> StoreResult<BatchOutcome> {
    let mut outcome = BatchOutcome::default();

    for email in emails {
        let snippet = match (email.subject.as_deref(), email.snippet.as_deref()) {
            (Some(subject), Some(snippet)) if !subject.is_empty() && !snippet.is_empty() => {
                snippet
            }
            _ => {
                outcome.rejected += 1;
                continue;
            }
        };

        let draft = match parse_snippet(snippet) {
            Ok(draft) => draft,
            Err(reason) => {
                warn!(%reason, "Skipping snippet");
                outcome.rejected += 1;
                continue;
            }
        };

        match dedup_and_persist(store, &draft).await? {
            DedupDecision::Persisted(_) => outcome.created += 1,
            DedupDecision::SkippedDuplicate => outcome.duplicates += 1,
        }
    }

    info!(
        created = outcome.created,
        rejected = outcome.rejected,
        duplicates = outcome.duplicates,
        "Processed lead batch"
    );
    Ok(outcome)
}
