//! Completeness scoring, used only to pick which duplicate survives.

use std::cmp::Reverse;

use crate::models::Person;
use crate::normalize::is_present;

/// Point total for how much usable data a person row carries.
///
/// Not a probability; it never decides whether two rows match.
pub fn completeness_score(person: &Person) -> u32 {
    let has = |value: &Option<String>| is_present(value.as_deref());
    let org = person.primary_organization();

    let mut score = 0;

    // Identity
    if has(&person.name) {
        score += 10;
    }
    if has(&person.firstname) && has(&person.lastname) {
        score += 5;
    }
    if has(&person.primary_email) {
        score += 15;
    }
    if has(&person.primary_phone) {
        score += 5;
    }
    if has(&person.linkedin_url) {
        score += 10;
    }

    // Professional
    if has(&person.title) {
        score += 5;
    }
    if has(&person.job_function) {
        score += 5;
    }
    if has(&person.seniority_level) {
        score += 5;
    }
    if org.is_some_and(|o| has(&o.organization_name)) {
        score += 5;
    }
    if org.is_some_and(|o| has(&o.organization_industry)) {
        score += 3;
    }

    // Profile
    if has(&person.description) {
        score += 3;
    }
    if has(&person.location) {
        score += 3;
    }
    if has(&person.image_url) {
        score += 5;
    }
    if has(&person.website_url) {
        score += 2;
    }

    // Demographics
    if has(&person.age_range) || person.age.is_some() {
        score += 2;
    }
    if has(&person.life_stage) {
        score += 2;
    }

    score
}

/// Sorts most complete first. The sort is stable, so ties keep input order.
pub fn rank_by_completeness<P>(people: &mut [P])
where
    P: AsRef<Person>,
{
    people.sort_by_key(|p| Reverse(completeness_score(p.as_ref())));
}
