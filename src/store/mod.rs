//! Storage contract consumed by the detection and merge engine.
//!
//! The relational store is owned elsewhere; the engine only reads people,
//! reads relationship keys, applies transfer plans, back-fills fields and
//! deletes duplicates through this trait.

use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

use crate::errors::AppError;
use crate::field_merge::PersonPatch;
use crate::models::{Person, ProjectScope};
use crate::relationships::{LinkTable, TransferPlan};

pub mod memory;
pub mod postgres;

pub use memory::{InMemoryStore, PeopleRead};
pub use postgres::PgPeopleStore;

/// A held "merge in progress" marker over a set of people.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeLease {
    pub lease_id: Uuid,
    pub person_ids: Vec<Uuid>,
}

#[async_trait]
pub trait PeopleStore: Send + Sync {
    /// Every person in scope, oldest first, with affiliations attached.
    async fn list_project_people(&self, scope: &ProjectScope) -> Result<Vec<Person>, AppError>;

    /// One person in scope, with affiliations.
    async fn get_person(&self, scope: &ProjectScope, id: Uuid)
        -> Result<Option<Person>, AppError>;

    /// The subset of `ids` that exist in scope, with affiliations. Order is unspecified.
    async fn get_people(&self, scope: &ProjectScope, ids: &[Uuid])
        -> Result<Vec<Person>, AppError>;

    /// Natural-key values (as text) of every row in `table` for `person_id`.
    async fn list_link_keys(&self, table: LinkTable, person_id: Uuid)
        -> Result<Vec<String>, AppError>;

    /// Rebinds `plan.reassign` rows from `from` to `to` and deletes
    /// `plan.discard` rows of `from`, atomically.
    async fn apply_transfer(
        &self,
        table: LinkTable,
        from: Uuid,
        to: Uuid,
        plan: &TransferPlan,
    ) -> Result<(), AppError>;

    /// Writes the patch columns on one person.
    async fn update_person_fields(&self, id: Uuid, patch: &PersonPatch) -> Result<(), AppError>;

    async fn delete_person(&self, id: Uuid) -> Result<(), AppError>;

    /// Marks every id as being merged. Returns `None` when any of them is
    /// already held by a lease younger than `ttl`.
    async fn acquire_merge_lock(
        &self,
        person_ids: &[Uuid],
        ttl: Duration,
    ) -> Result<Option<MergeLease>, AppError>;

    async fn release_merge_lock(&self, lease: &MergeLease) -> Result<(), AppError>;
}
