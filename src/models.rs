use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

use crate::relationships::LinkTable;

// ============ Database Models ============

/// Tenant scope every operation runs under.
///
/// People outside the `(account_id, project_id)` pair are never visible to a
/// single detection or merge invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectScope {
    /// Owning account.
    pub account_id: Uuid,
    /// Project inside the account.
    pub project_id: Uuid,
}

impl ProjectScope {
    pub fn new(account_id: Uuid, project_id: Uuid) -> Self {
        Self {
            account_id,
            project_id,
        }
    }
}

/// A person row under resolution.
///
/// Created by ingestion (interview upload, CSV import, survey response).
/// The merge engine only back-fills `None` fields or deletes the row.
#[derive(Debug, Clone, Default, FromRow, Serialize, Deserialize, PartialEq)]
pub struct Person {
    /// Unique identifier for the person.
    pub id: Uuid,
    /// Owning account.
    pub account_id: Uuid,
    /// Project the person belongs to.
    pub project_id: Uuid,
    /// Display name (may be a transcription label such as "Participant 1").
    pub name: Option<String>,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub primary_email: Option<String>,
    pub primary_phone: Option<String>,
    /// Social-profile URL.
    pub linkedin_url: Option<String>,
    pub title: Option<String>,
    pub job_function: Option<String>,
    pub seniority_level: Option<String>,
    /// Free-text company, independent of organization affiliations.
    pub company: Option<String>,
    pub industry: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub image_url: Option<String>,
    pub website_url: Option<String>,
    pub age: Option<i32>,
    pub age_range: Option<String>,
    pub life_stage: Option<String>,
    pub segment: Option<String>,
    /// Timestamp of creation. Detection feeds people oldest first.
    pub created_at: DateTime<Utc>,
    /// Organization affiliations, in the order the store returned them.
    #[sqlx(skip)]
    #[serde(default)]
    pub organizations: Vec<Affiliation>,
}

impl Person {
    /// The first affiliation returned for the person.
    ///
    /// No `is_primary` precedence is applied.
    pub fn primary_organization(&self) -> Option<&Affiliation> {
        self.organizations.first()
    }
}

impl AsRef<Person> for Person {
    fn as_ref(&self) -> &Person {
        self
    }
}

/// A `people_organizations` row joined with its organization.
#[derive(Debug, Clone, Default, FromRow, Serialize, Deserialize, PartialEq)]
pub struct Affiliation {
    pub person_id: Uuid,
    pub organization_id: Uuid,
    /// Organization name (`organizations.name`).
    pub organization_name: Option<String>,
    /// Organization industry (`organizations.industry`).
    pub organization_industry: Option<String>,
    pub is_primary: Option<bool>,
    pub job_title: Option<String>,
}

// ============ Detection Models ============

/// Which matching pass produced a duplicate group.
///
/// Variants are declared in pass priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchReason {
    Email,
    Linkedin,
    NameCompany,
    FirstnameCompany,
    PlaceholderName,
}

impl MatchReason {
    /// All passes, highest priority first.
    pub const ALL: [MatchReason; 5] = [
        MatchReason::Email,
        MatchReason::Linkedin,
        MatchReason::NameCompany,
        MatchReason::FirstnameCompany,
        MatchReason::PlaceholderName,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MatchReason::Email => "email",
            MatchReason::Linkedin => "linkedin",
            MatchReason::NameCompany => "name_company",
            MatchReason::FirstnameCompany => "firstname_company",
            MatchReason::PlaceholderName => "placeholder_name",
        }
    }

    /// Prefix used in [`DuplicateGroup::key`].
    pub fn key_prefix(self) -> &'static str {
        match self {
            MatchReason::PlaceholderName => "placeholder",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for MatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A set of people believed to be the same human. Recomputed on every run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateGroup {
    /// `"<pass>:<matched value>"`, stable across runs for re-display.
    pub key: String,
    pub reason: MatchReason,
    /// Members in input order.
    pub people: Vec<Person>,
}

impl DuplicateGroup {
    pub fn person_ids(&self) -> Vec<Uuid> {
        self.people.iter().map(|p| p.id).collect()
    }
}

/// Response of `find_duplicates`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeduplicationResult {
    pub success: bool,
    pub duplicate_groups: Vec<DuplicateGroup>,
    pub errors: Vec<String>,
}

// ============ Merge Models ============

/// Rows moved from duplicates to the primary, per relationship table.
///
/// Reconciled (discarded) rows are not counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipCounts {
    pub interview_people: u32,
    pub evidence_people: u32,
    pub person_facet: u32,
    pub people_personas: u32,
    pub people_organizations: u32,
    pub asset_people: u32,
}

impl RelationshipCounts {
    pub fn get(&self, table: LinkTable) -> u32 {
        match table {
            LinkTable::InterviewPeople => self.interview_people,
            LinkTable::EvidencePeople => self.evidence_people,
            LinkTable::PersonFacet => self.person_facet,
            LinkTable::PeoplePersonas => self.people_personas,
            LinkTable::PeopleOrganizations => self.people_organizations,
            LinkTable::AssetPeople => self.asset_people,
        }
    }

    pub fn add(&mut self, table: LinkTable, count: u32) {
        let slot = match table {
            LinkTable::InterviewPeople => &mut self.interview_people,
            LinkTable::EvidencePeople => &mut self.evidence_people,
            LinkTable::PersonFacet => &mut self.person_facet,
            LinkTable::PeoplePersonas => &mut self.people_personas,
            LinkTable::PeopleOrganizations => &mut self.people_organizations,
            LinkTable::AssetPeople => &mut self.asset_people,
        };
        *slot += count;
    }

    pub fn total(&self) -> u32 {
        LinkTable::ALL.iter().map(|t| self.get(*t)).sum()
    }
}

impl fmt::Display for RelationshipCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "interviews={}, evidence={}, facets={}, personas={}, orgs={}, assets={}",
            self.interview_people,
            self.evidence_people,
            self.person_facet,
            self.people_personas,
            self.people_organizations,
            self.asset_people
        )
    }
}

/// Report of one merge (primary + N duplicates).
///
/// In dry-run mode the counters are would-be effects computed from reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeResult {
    pub success: bool,
    pub primary_id: Uuid,
    /// Duplicates that were found and processed.
    pub merged_ids: Vec<Uuid>,
    pub relationships_transferred: RelationshipCounts,
    pub errors: Vec<String>,
}

impl MergeResult {
    pub fn new(primary_id: Uuid) -> Self {
        Self {
            success: false,
            primary_id,
            merged_ids: Vec::new(),
            relationships_transferred: RelationshipCounts::default(),
            errors: Vec::new(),
        }
    }
}

/// Report of `auto_merge_duplicates` over a whole project.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutoMergeResult {
    pub success: bool,
    pub groups_processed: usize,
    pub people_merged: usize,
    pub errors: Vec<String>,
}

// ============ API Request Models ============

/// Body of `POST .../people/merge`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRequest {
    pub primary_id: Uuid,
    pub duplicate_ids: Vec<Uuid>,
    #[serde(default)]
    pub dry_run: bool,
}

/// Body of `POST .../people/auto-merge`. Dry run unless explicitly disabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoMergeRequest {
    #[serde(default = "default_true")]
    pub dry_run: bool,
}

impl Default for AutoMergeRequest {
    fn default() -> Self {
        Self { dry_run: true }
    }
}

fn default_true() -> bool {
    true
}
