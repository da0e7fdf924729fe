//! Relationship transfer: moves join rows from duplicates onto the primary.
//!
//! Each relationship table has a natural uniqueness key per person. A
//! duplicate's row is reassigned when the primary does not already hold that
//! key, and discarded (reconciled) when it does.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;

use crate::models::RelationshipCounts;
use crate::store::PeopleStore;

/// The six join relations that reference `people.id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkTable {
    InterviewPeople,
    EvidencePeople,
    PersonFacet,
    PeoplePersonas,
    PeopleOrganizations,
    AssetPeople,
}

impl LinkTable {
    /// Processing order.
    pub const ALL: [LinkTable; 6] = [
        LinkTable::InterviewPeople,
        LinkTable::EvidencePeople,
        LinkTable::PersonFacet,
        LinkTable::PeoplePersonas,
        LinkTable::PeopleOrganizations,
        LinkTable::AssetPeople,
    ];

    pub fn table_name(self) -> &'static str {
        match self {
            LinkTable::InterviewPeople => "interview_people",
            LinkTable::EvidencePeople => "evidence_people",
            LinkTable::PersonFacet => "person_facet",
            LinkTable::PeoplePersonas => "people_personas",
            LinkTable::PeopleOrganizations => "people_organizations",
            LinkTable::AssetPeople => "asset_people",
        }
    }

    /// Column that is unique per person in this table.
    pub fn key_column(self) -> &'static str {
        match self {
            LinkTable::InterviewPeople => "interview_id",
            LinkTable::EvidencePeople => "evidence_id",
            LinkTable::PersonFacet => "facet_account_id",
            LinkTable::PeoplePersonas => "persona_id",
            LinkTable::PeopleOrganizations => "organization_id",
            LinkTable::AssetPeople => "asset_id",
        }
    }
}

impl fmt::Display for LinkTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

/// What to do with one duplicate's rows in one table.
///
/// Keys are the natural-key values rendered as text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferPlan {
    /// Rows to rebind to the primary.
    pub reassign: Vec<String>,
    /// Rows the primary already has an equivalent of; deleted.
    pub discard: Vec<String>,
}

impl TransferPlan {
    pub fn is_empty(&self) -> bool {
        self.reassign.is_empty() && self.discard.is_empty()
    }

    /// Rows this plan counts as transferred.
    pub fn transferred(&self) -> u32 {
        self.reassign.len() as u32
    }
}

/// Partitions a duplicate's keys against the primary's.
///
/// Reassigned keys are added to `primary_keys`, so a later duplicate holding
/// the same key is reconciled rather than linked twice.
pub fn plan_transfer(primary_keys: &mut HashSet<String>, duplicate_keys: Vec<String>) -> TransferPlan {
    let mut plan = TransferPlan::default();
    for key in duplicate_keys {
        if primary_keys.contains(&key) {
            plan.discard.push(key);
        } else {
            primary_keys.insert(key.clone());
            plan.reassign.push(key);
        }
    }
    plan
}

/// Counters and row-level errors from one transfer pass.
#[derive(Debug, Clone, Default)]
pub struct TransferOutcome {
    pub counts: RelationshipCounts,
    pub errors: Vec<String>,
    /// Duplicates with at least one table not fully read or applied. They
    /// still own rows and must not be deleted.
    pub failed: HashSet<Uuid>,
}

impl TransferOutcome {
    /// True when every table was moved off `duplicate_id`.
    pub fn completed(&self, duplicate_id: Uuid) -> bool {
        !self.failed.contains(&duplicate_id)
    }
}

/// Moves every relationship row from `duplicate_ids` onto `primary_id`.
///
/// Tables run one at a time, duplicates in the given order. Each
/// (table, duplicate) plan is applied in a single store call; a failure is
/// recorded and the pass moves on. With `dry_run` the plans are computed from
/// reads and counted but never applied.
pub async fn transfer_relationships<S>(
    store: &S,
    primary_id: Uuid,
    duplicate_ids: &[Uuid],
    dry_run: bool,
) -> TransferOutcome
where
    S: PeopleStore + ?Sized,
{
    let mut outcome = TransferOutcome::default();

    for table in LinkTable::ALL {
        let mut primary_keys: HashSet<String> = match store.list_link_keys(table, primary_id).await
        {
            Ok(keys) => keys.into_iter().collect(),
            Err(e) => {
                tracing::error!("Failed to read {} for primary {}: {}", table, primary_id, e);
                outcome
                    .errors
                    .push(format!("Failed to read {} for primary {}: {}", table, primary_id, e));
                outcome.failed.extend(duplicate_ids);
                continue;
            }
        };

        for &duplicate_id in duplicate_ids {
            let duplicate_keys = match store.list_link_keys(table, duplicate_id).await {
                Ok(keys) => keys,
                Err(e) => {
                    tracing::error!("Failed to read {} for {}: {}", table, duplicate_id, e);
                    outcome
                        .errors
                        .push(format!("Failed to read {} for {}: {}", table, duplicate_id, e));
                    outcome.failed.insert(duplicate_id);
                    continue;
                }
            };

            let plan = plan_transfer(&mut primary_keys, duplicate_keys);
            if plan.is_empty() {
                continue;
            }

            tracing::debug!(
                "{}{} {} -> {}: reassign={}, discard={}",
                if dry_run { "[DRY RUN] " } else { "" },
                table,
                duplicate_id,
                primary_id,
                plan.reassign.len(),
                plan.discard.len()
            );

            if dry_run {
                outcome.counts.add(table, plan.transferred());
                continue;
            }

            match store
                .apply_transfer(table, duplicate_id, primary_id, &plan)
                .await
            {
                Ok(()) => outcome.counts.add(table, plan.transferred()),
                Err(e) => {
                    // The apply rolled back, so those keys never reached the primary.
                    for key in &plan.reassign {
                        primary_keys.remove(key);
                    }
                    tracing::error!(
                        "Failed to transfer {} from {} to {}: {}",
                        table,
                        duplicate_id,
                        primary_id,
                        e
                    );
                    outcome.errors.push(format!(
                        "Failed to transfer {} from {}: {}",
                        table, duplicate_id, e
                    ));
                    outcome.failed.insert(duplicate_id);
                }
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn disjoint_keys_are_all_reassigned() {
        let mut primary: HashSet<String> = keys(&["i1"]).into_iter().collect();
        let plan = plan_transfer(&mut primary, keys(&["i2", "i3"]));
        assert_eq!(plan.reassign, keys(&["i2", "i3"]));
        assert!(plan.discard.is_empty());
        assert_eq!(plan.transferred(), 2);
        assert!(primary.contains("i2") && primary.contains("i3"));
    }

    #[test]
    fn overlapping_keys_are_discarded() {
        let mut primary: HashSet<String> = keys(&["o1"]).into_iter().collect();
        let plan = plan_transfer(&mut primary, keys(&["o1", "o2"]));
        assert_eq!(plan.reassign, keys(&["o2"]));
        assert_eq!(plan.discard, keys(&["o1"]));
    }

    #[test]
    fn second_duplicate_with_same_key_is_reconciled() {
        let mut primary = HashSet::new();
        let first = plan_transfer(&mut primary, keys(&["p1"]));
        let second = plan_transfer(&mut primary, keys(&["p1"]));
        assert_eq!(first.transferred(), 1);
        assert_eq!(second.transferred(), 0);
        assert_eq!(second.discard, keys(&["p1"]));
    }

    #[test]
    fn table_metadata_matches_schema() {
        assert_eq!(LinkTable::PersonFacet.table_name(), "person_facet");
        assert_eq!(LinkTable::PersonFacet.key_column(), "facet_account_id");
        assert_eq!(LinkTable::PeoplePersonas.key_column(), "persona_id");
        assert_eq!(LinkTable::ALL.len(), 6);
    }
}
