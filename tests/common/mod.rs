//! Shared fixtures for the integration suites.
#![allow(dead_code)]

use chrono::{Duration, TimeZone, Utc};
use uuid::Uuid;

use rust_people_merge_api::models::{Affiliation, Person, ProjectScope};

pub fn scope() -> ProjectScope {
    ProjectScope::new(Uuid::new_v4(), Uuid::new_v4())
}

/// A person in `scope` created `minute` minutes after a fixed epoch.
pub fn person(scope: &ProjectScope, minute: i64, name: &str) -> Person {
    Person {
        id: Uuid::new_v4(),
        account_id: scope.account_id,
        project_id: scope.project_id,
        name: Some(name.to_string()),
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minute),
        ..Default::default()
    }
}

pub fn affiliation(person: &Person, organization_id: Uuid, organization_name: &str) -> Affiliation {
    Affiliation {
        person_id: person.id,
        organization_id,
        organization_name: Some(organization_name.to_string()),
        ..Default::default()
    }
}
