//! Merge orchestration for one primary and N duplicates.
//!
//! `Validating -> Transferring -> FieldMerging -> Deleting -> Done`, or
//! `Failed` with whatever partial effects already happened. There is no
//! global rollback; row-level failures accumulate in `MergeResult::errors`.

use std::collections::HashSet;
use std::time::Duration;
use uuid::Uuid;

use crate::field_merge::build_patch;
use crate::models::{MergeResult, Person, ProjectScope};
use crate::relationships::transfer_relationships;
use crate::store::{MergeLease, PeopleStore};

/// Default lifetime of a merge lock before it is considered abandoned.
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeState {
    Validating,
    Transferring,
    FieldMerging,
    Deleting,
    Done,
    Failed,
}

/// Tunables shared by manual and automatic merges.
#[derive(Debug, Clone)]
pub struct MergeOptions {
    pub lock_ttl: Duration,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            lock_ttl: DEFAULT_LOCK_TTL,
        }
    }
}

struct MergeRun<'a, S: ?Sized> {
    store: &'a S,
    dry_run: bool,
    state: MergeState,
    result: MergeResult,
}

impl<'a, S> MergeRun<'a, S>
where
    S: PeopleStore + ?Sized,
{
    fn advance(&mut self, next: MergeState) {
        tracing::debug!(
            "Merge {}: {:?} -> {:?}",
            self.result.primary_id,
            self.state,
            next
        );
        self.state = next;
    }

    fn fail(mut self, error: String) -> MergeResult {
        tracing::error!("Merge into {} failed: {}", self.result.primary_id, error);
        self.advance(MergeState::Failed);
        self.result.errors.push(error);
        self.result.success = false;
        self.result
    }

    fn finish(mut self) -> MergeResult {
        self.advance(MergeState::Done);
        self.result.success = self.result.errors.is_empty();
        tracing::info!(
            "{}Merge complete. Transferred: {}",
            if self.dry_run { "[DRY RUN] " } else { "" },
            self.result.relationships_transferred
        );
        self.result
    }

    /// Loads the primary and the duplicates that still exist, in request order.
    async fn validate(
        &mut self,
        scope: &ProjectScope,
        duplicate_ids: &[Uuid],
    ) -> Result<(Person, Vec<Person>), String> {
        let primary_id = self.result.primary_id;

        let primary = match self.store.get_person(scope, primary_id).await {
            Ok(Some(primary)) => primary,
            Ok(None) => return Err(format!("Primary person not found: {}", primary_id)),
            Err(e) => return Err(format!("Error fetching primary person {}: {}", primary_id, e)),
        };

        let requested = distinct_duplicates(primary_id, duplicate_ids);
        if requested.is_empty() {
            return Ok((primary, Vec::new()));
        }

        let fetched = self
            .store
            .get_people(scope, &requested)
            .await
            .map_err(|e| format!("Error fetching duplicates: {}", e))?;

        let mut duplicates = Vec::with_capacity(fetched.len());
        let mut missing = Vec::new();
        for id in &requested {
            match fetched.iter().find(|p| p.id == *id) {
                Some(person) => duplicates.push(person.clone()),
                None => missing.push(id.to_string()),
            }
        }
        if !missing.is_empty() {
            tracing::warn!("Some duplicate IDs not found: {}", missing.join(", "));
        }

        Ok((primary, duplicates))
    }

    async fn release(&self, lease: &MergeLease) {
        if let Err(e) = self.store.release_merge_lock(lease).await {
            tracing::warn!(
                "Failed to release merge lock {} for {}: {}",
                lease.lease_id,
                self.result.primary_id,
                e
            );
        }
    }
}

/// Duplicate ids without repeats and without the primary itself.
fn distinct_duplicates(primary_id: Uuid, duplicate_ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    let mut ids = Vec::with_capacity(duplicate_ids.len());
    for &id in duplicate_ids {
        if id == primary_id {
            tracing::warn!("Ignoring primary {} listed as its own duplicate", primary_id);
            continue;
        }
        if seen.insert(id) {
            ids.push(id);
        }
    }
    ids
}

/// Merges `duplicate_ids` into `primary_id` within `scope`.
///
/// Missing duplicates are skipped with a warning, so re-running a finished
/// merge is a no-op that reports success. A duplicate whose relationships
/// could not all be moved is neither deleted nor listed in `merged_ids`. With `dry_run` the relationship
/// counters are computed from reads and nothing is written.
pub async fn merge_people<S>(
    store: &S,
    scope: &ProjectScope,
    primary_id: Uuid,
    duplicate_ids: &[Uuid],
    dry_run: bool,
    options: &MergeOptions,
) -> MergeResult
where
    S: PeopleStore + ?Sized,
{
    let mut run = MergeRun {
        store,
        dry_run,
        state: MergeState::Validating,
        result: MergeResult::new(primary_id),
    };

    let (primary, duplicates) = match run.validate(scope, duplicate_ids).await {
        Ok(loaded) => loaded,
        Err(error) => return run.fail(error),
    };

    if duplicates.is_empty() {
        tracing::info!("No duplicates left to merge into {}", primary_id);
        return run.finish();
    }

    let found_ids: Vec<Uuid> = duplicates.iter().map(|p| p.id).collect();
    tracing::info!(
        "{}Merging {} duplicates into {}",
        if dry_run { "[DRY RUN] " } else { "" },
        found_ids.len(),
        primary_id
    );

    let lease = if dry_run {
        None
    } else {
        let mut lock_ids = Vec::with_capacity(found_ids.len() + 1);
        lock_ids.push(primary_id);
        lock_ids.extend(&found_ids);
        match store.acquire_merge_lock(&lock_ids, options.lock_ttl).await {
            Ok(Some(lease)) => Some(lease),
            Ok(None) => {
                return run.fail(format!("Merge already in progress for {}", primary_id));
            }
            Err(e) => return run.fail(format!("Failed to acquire merge lock: {}", e)),
        }
    };

    run.advance(MergeState::Transferring);
    let transfer = transfer_relationships(store, primary_id, &found_ids, dry_run).await;
    run.result.relationships_transferred = transfer.counts;
    run.result.errors.extend(transfer.errors.iter().cloned());

    // Duplicates that still own rows are kept so nothing is orphaned.
    let (merged_ids, kept): (Vec<Uuid>, Vec<Uuid>) = found_ids
        .iter()
        .copied()
        .partition(|id| transfer.completed(*id));
    if !kept.is_empty() {
        tracing::warn!(
            "Keeping {} duplicate(s) with untransferred relationships: {}",
            kept.len(),
            kept.iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    run.result.merged_ids = merged_ids.clone();

    let Some(lease) = lease else {
        return run.finish();
    };

    run.advance(MergeState::FieldMerging);
    let patch = build_patch(&primary, &duplicates);
    if !patch.is_empty() {
        match store.update_person_fields(primary_id, &patch).await {
            Ok(()) => tracing::info!(
                "Updated primary with merged fields: {}",
                patch.columns().join(", ")
            ),
            Err(e) => {
                tracing::error!("Failed to back-fill fields on {}: {}", primary_id, e);
                run.result.errors.push(format!(
                    "Failed to update primary {} with merged fields: {}",
                    primary_id, e
                ));
            }
        }
    }

    run.advance(MergeState::Deleting);
    for id in &merged_ids {
        if let Err(e) = store.delete_person(*id).await {
            tracing::error!("Failed to delete duplicate {}: {}", id, e);
            run.result
                .errors
                .push(format!("Failed to delete duplicate {}: {}", id, e));
        }
    }

    run.release(&lease).await;
    run.finish()
}
