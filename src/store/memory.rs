use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::{MergeLease, PeopleStore};
use crate::errors::AppError;
use crate::field_merge::PersonPatch;
use crate::models::{Affiliation, Person, ProjectScope};
use crate::relationships::{LinkTable, TransferPlan};

#[derive(Debug, Clone)]
struct LinkRow {
    person_id: Uuid,
    key: String,
}

#[derive(Debug, Default)]
struct State {
    /// Insertion order doubles as creation order.
    people: Vec<Person>,
    /// Rows of every table except `people_organizations`.
    links: HashMap<LinkTable, Vec<LinkRow>>,
    /// Rows of `people_organizations`, in insertion order.
    affiliations: Vec<Affiliation>,
    locks: HashMap<Uuid, (Uuid, Instant)>,
    failing_tables: HashSet<LinkTable>,
    failing_deletes: HashSet<Uuid>,
    failing_reads: HashSet<PeopleRead>,
}

/// Person reads that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeopleRead {
    /// `list_project_people`
    ProjectListing,
    /// `get_person`
    Lookup,
    /// `get_people`
    BatchLookup,
}

impl State {
    fn with_affiliations(&self, person: &Person) -> Person {
        let mut person = person.clone();
        person.organizations = self
            .affiliations
            .iter()
            .filter(|a| a.person_id == person.id)
            .cloned()
            .collect();
        person
    }

    fn in_scope(person: &Person, scope: &ProjectScope) -> bool {
        person.account_id == scope.account_id && person.project_id == scope.project_id
    }

    fn check_read(&self, read: PeopleRead) -> Result<(), AppError> {
        if self.failing_reads.contains(&read) {
            return Err(AppError::InternalError(format!(
                "injected read failure on {:?}",
                read
            )));
        }
        Ok(())
    }

    /// Tables that still hold rows for `person_id`.
    fn referencing_tables(&self, person_id: Uuid) -> Vec<LinkTable> {
        LinkTable::ALL
            .into_iter()
            .filter(|table| !InMemoryStore::keys_in(self, *table, person_id).is_empty())
            .collect()
    }
}

/// Process-local store with the same contract as the Postgres store.
///
/// Used by the test suites. Failures can be injected per table or per person
/// to exercise row-level error handling.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, AppError> {
        self.state
            .lock()
            .map_err(|_| AppError::InternalError("in-memory store lock poisoned".to_string()))
    }

    fn state_unchecked(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Inserts a person. Any affiliations on it are stored as
    /// `people_organizations` rows.
    pub fn insert_person(&self, person: Person) {
        let mut state = self.state_unchecked();
        state.affiliations.extend(person.organizations.iter().cloned());
        state.people.push(Person {
            organizations: Vec::new(),
            ..person
        });
    }

    /// Adds a row to a relationship table.
    ///
    /// # Panics
    ///
    /// For `people_organizations` the key must be an organization UUID.
    pub fn link(&self, table: LinkTable, person_id: Uuid, key: impl Into<String>) {
        let key = key.into();
        let mut state = self.state_unchecked();
        if table == LinkTable::PeopleOrganizations {
            let organization_id = Uuid::parse_str(&key).unwrap_or_else(|_| {
                panic!("people_organizations key must be an organization id, got {:?}", key)
            });
            state.affiliations.push(Affiliation {
                person_id,
                organization_id,
                ..Default::default()
            });
        } else {
            state
                .links
                .entry(table)
                .or_default()
                .push(LinkRow { person_id, key });
        }
    }

    /// Natural keys currently linked to `person_id`, in row order.
    pub fn keys_for(&self, table: LinkTable, person_id: Uuid) -> Vec<String> {
        Self::keys_in(&self.state_unchecked(), table, person_id)
    }

    pub fn person(&self, id: Uuid) -> Option<Person> {
        let state = self.state_unchecked();
        state
            .people
            .iter()
            .find(|p| p.id == id)
            .map(|p| state.with_affiliations(p))
    }

    pub fn people_count(&self) -> usize {
        self.state_unchecked().people.len()
    }

    pub fn is_locked(&self, person_id: Uuid) -> bool {
        self.state_unchecked().locks.contains_key(&person_id)
    }

    /// Makes every `apply_transfer` on `table` fail.
    pub fn fail_transfers_on(&self, table: LinkTable) {
        self.state_unchecked().failing_tables.insert(table);
    }

    /// Makes `delete_person(person_id)` fail.
    pub fn fail_delete_of(&self, person_id: Uuid) {
        self.state_unchecked().failing_deletes.insert(person_id);
    }

    /// Makes one kind of person read fail.
    pub fn fail_reads_of(&self, read: PeopleRead) {
        self.state_unchecked().failing_reads.insert(read);
    }

    fn keys_in(state: &State, table: LinkTable, person_id: Uuid) -> Vec<String> {
        if table == LinkTable::PeopleOrganizations {
            state
                .affiliations
                .iter()
                .filter(|a| a.person_id == person_id)
                .map(|a| a.organization_id.to_string())
                .collect()
        } else {
            state
                .links
                .get(&table)
                .map(|rows| {
                    rows.iter()
                        .filter(|r| r.person_id == person_id)
                        .map(|r| r.key.clone())
                        .collect()
                })
                .unwrap_or_default()
        }
    }
}

#[async_trait]
impl PeopleStore for InMemoryStore {
    async fn list_project_people(&self, scope: &ProjectScope) -> Result<Vec<Person>, AppError> {
        let state = self.state()?;
        state.check_read(PeopleRead::ProjectListing)?;
        Ok(state
            .people
            .iter()
            .filter(|p| State::in_scope(p, scope))
            .map(|p| state.with_affiliations(p))
            .collect())
    }

    async fn get_person(
        &self,
        scope: &ProjectScope,
        id: Uuid,
    ) -> Result<Option<Person>, AppError> {
        let state = self.state()?;
        state.check_read(PeopleRead::Lookup)?;
        Ok(state
            .people
            .iter()
            .find(|p| p.id == id && State::in_scope(p, scope))
            .map(|p| state.with_affiliations(p)))
    }

    async fn get_people(
        &self,
        scope: &ProjectScope,
        ids: &[Uuid],
    ) -> Result<Vec<Person>, AppError> {
        let state = self.state()?;
        state.check_read(PeopleRead::BatchLookup)?;
        Ok(state
            .people
            .iter()
            .filter(|p| ids.contains(&p.id) && State::in_scope(p, scope))
            .map(|p| state.with_affiliations(p))
            .collect())
    }

    async fn list_link_keys(
        &self,
        table: LinkTable,
        person_id: Uuid,
    ) -> Result<Vec<String>, AppError> {
        let state = self.state()?;
        Ok(Self::keys_in(&state, table, person_id))
    }

    async fn apply_transfer(
        &self,
        table: LinkTable,
        from: Uuid,
        to: Uuid,
        plan: &TransferPlan,
    ) -> Result<(), AppError> {
        let mut state = self.state()?;
        if state.failing_tables.contains(&table) {
            return Err(AppError::InternalError(format!(
                "injected failure on {}",
                table
            )));
        }

        if table == LinkTable::PeopleOrganizations {
            let affiliations = std::mem::take(&mut state.affiliations);
            state.affiliations = affiliations
                .into_iter()
                .filter_map(|mut a| {
                    if a.person_id != from {
                        return Some(a);
                    }
                    let key = a.organization_id.to_string();
                    if plan.discard.contains(&key) {
                        None
                    } else {
                        if plan.reassign.contains(&key) {
                            a.person_id = to;
                        }
                        Some(a)
                    }
                })
                .collect();
        } else {
            let rows = state.links.entry(table).or_default();
            rows.retain(|r| !(r.person_id == from && plan.discard.contains(&r.key)));
            for row in rows.iter_mut() {
                if row.person_id == from && plan.reassign.contains(&row.key) {
                    row.person_id = to;
                }
            }
        }
        Ok(())
    }

    async fn update_person_fields(&self, id: Uuid, patch: &PersonPatch) -> Result<(), AppError> {
        let mut state = self.state()?;
        let person = state
            .people
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Person {} not found", id)))?;
        patch.apply_to(person);
        Ok(())
    }

    async fn delete_person(&self, id: Uuid) -> Result<(), AppError> {
        let mut state = self.state()?;
        if state.failing_deletes.contains(&id) {
            return Err(AppError::InternalError(format!(
                "injected delete failure for {}",
                id
            )));
        }
        // Relationship rows reference people without cascading.
        let referencing = state.referencing_tables(id);
        if !referencing.is_empty() {
            let tables: Vec<&str> = referencing.iter().map(|t| t.table_name()).collect();
            return Err(AppError::Conflict(format!(
                "Person {} is still referenced by {}",
                id,
                tables.join(", ")
            )));
        }
        let before = state.people.len();
        state.people.retain(|p| p.id != id);
        if state.people.len() == before {
            return Err(AppError::NotFound(format!("Person {} not found", id)));
        }
        Ok(())
    }

    async fn acquire_merge_lock(
        &self,
        person_ids: &[Uuid],
        ttl: Duration,
    ) -> Result<Option<MergeLease>, AppError> {
        let mut state = self.state()?;
        let now = Instant::now();
        state
            .locks
            .retain(|_, (_, acquired)| now.duration_since(*acquired) < ttl);

        if person_ids.iter().any(|id| state.locks.contains_key(id)) {
            return Ok(None);
        }

        let lease_id = Uuid::new_v4();
        for id in person_ids {
            state.locks.insert(*id, (lease_id, now));
        }
        Ok(Some(MergeLease {
            lease_id,
            person_ids: person_ids.to_vec(),
        }))
    }

    async fn release_merge_lock(&self, lease: &MergeLease) -> Result<(), AppError> {
        let mut state = self.state()?;
        state
            .locks
            .retain(|_, (lease_id, _)| *lease_id != lease.lease_id);
        Ok(())
    }
}
