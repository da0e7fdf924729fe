//! Operation surface: detection, manual merge and project-wide auto-merge.
//!
//! Every operation is scoped to one `(account_id, project_id)` pair.

use crate::grouping::group_duplicates;
use crate::models::{AutoMergeResult, DeduplicationResult, ProjectScope};
use crate::scoring::rank_by_completeness;
use crate::store::PeopleStore;

pub use crate::merge::{merge_people, MergeOptions};

/// Finds candidate duplicate groups in one project. Read-only.
///
/// All-or-nothing: a store failure yields `success = false` and no groups.
pub async fn find_duplicates<S>(store: &S, scope: &ProjectScope) -> DeduplicationResult
where
    S: PeopleStore + ?Sized,
{
    let people = match store.list_project_people(scope).await {
        Ok(people) => people,
        Err(e) => {
            tracing::error!(
                "Error fetching people for project {}: {}",
                scope.project_id,
                e
            );
            return DeduplicationResult {
                success: false,
                duplicate_groups: Vec::new(),
                errors: vec![e.to_string()],
            };
        }
    };

    let duplicate_groups = group_duplicates(&people);
    let grouped: usize = duplicate_groups.iter().map(|g| g.people.len()).sum();
    tracing::info!(
        "Found {} duplicate groups with {} people in project {}",
        duplicate_groups.len(),
        grouped,
        scope.project_id
    );

    DeduplicationResult {
        success: true,
        duplicate_groups,
        errors: Vec::new(),
    }
}

/// Detects duplicates and merges each group into its most complete member.
///
/// Groups are processed one after another. Errors from detection and from
/// every merge are collected; a failing group does not stop the rest.
pub async fn auto_merge_duplicates<S>(
    store: &S,
    scope: &ProjectScope,
    dry_run: bool,
    options: &MergeOptions,
) -> AutoMergeResult
where
    S: PeopleStore + ?Sized,
{
    let detection = find_duplicates(store, scope).await;
    let mut summary = AutoMergeResult {
        errors: detection.errors,
        ..Default::default()
    };

    for group in detection.duplicate_groups {
        let mut ranked = group.people;
        rank_by_completeness(&mut ranked);

        let Some((primary, duplicates)) = ranked.split_first() else {
            continue;
        };
        let duplicate_ids: Vec<_> = duplicates.iter().map(|p| p.id).collect();

        tracing::info!(
            "{}Processing group \"{}\": primary={}, duplicates={}",
            if dry_run { "[DRY RUN] " } else { "" },
            group.key,
            primary
                .name
                .clone()
                .unwrap_or_else(|| primary.id.to_string()),
            duplicate_ids.len()
        );

        let result = merge_people(store, scope, primary.id, &duplicate_ids, dry_run, options).await;

        summary.errors.extend(result.errors);
        summary.groups_processed += 1;
        summary.people_merged += result.merged_ids.len();
    }

    summary.success = summary.errors.is_empty();
    tracing::info!(
        "{}Auto-merge finished for project {}: groups={}, merged={}, errors={}",
        if dry_run { "[DRY RUN] " } else { "" },
        scope.project_id,
        summary.groups_processed,
        summary.people_merged,
        summary.errors.len()
    );
    summary
}
