//! Candidate grouping: five ordered matching passes over one project's people.
//!
//! Passes run in [`MatchReason::ALL`] order. A person claimed by an earlier
//! pass is invisible to every later one, so a person id lands in at most one
//! group per run. Passes stay strictly exclusive; transitive matches across
//! passes (A~B by email, B~C by name) are not unioned.

use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::models::{DuplicateGroup, MatchReason, Person};
use crate::normalize::{
    email_key, first_name, linkedin_key, normalize_opt, placeholder_group_key,
};

/// Normalized name of the person's first affiliation, empty when there is none.
pub fn primary_company(person: &Person) -> String {
    normalize_opt(
        person
            .primary_organization()
            .and_then(|org| org.organization_name.as_deref()),
    )
}

/// Grouping key a pass assigns to a person, if any.
pub fn match_key(reason: MatchReason, person: &Person) -> Option<String> {
    match reason {
        MatchReason::Email => email_key(person.primary_email.as_deref()),
        MatchReason::Linkedin => linkedin_key(person.linkedin_url.as_deref()),
        MatchReason::NameCompany => {
            let name = normalize_opt(person.name.as_deref());
            let company = primary_company(person);
            if name.is_empty() || company.is_empty() {
                None
            } else {
                Some(format!("{}|{}", name, company))
            }
        }
        MatchReason::FirstnameCompany => {
            let first = first_name(person).filter(|f| f.chars().count() >= 2)?;
            let company = primary_company(person);
            if company.is_empty() {
                None
            } else {
                Some(format!("{}|{}", first, company))
            }
        }
        MatchReason::PlaceholderName => placeholder_group_key(person.name.as_deref()),
    }
}

/// Buckets keyed by match value, remembering first-seen key order.
struct Buckets<'a> {
    order: Vec<String>,
    members: HashMap<String, Vec<&'a Person>>,
}

impl<'a> Buckets<'a> {
    fn new() -> Self {
        Self {
            order: Vec::new(),
            members: HashMap::new(),
        }
    }

    fn push(&mut self, key: String, person: &'a Person) {
        match self.members.get_mut(&key) {
            Some(group) => group.push(person),
            None => {
                self.order.push(key.clone());
                self.members.insert(key, vec![person]);
            }
        }
    }

    fn into_groups(mut self, reason: MatchReason) -> Vec<DuplicateGroup> {
        let mut groups = Vec::new();
        for key in self.order {
            let Some(people) = self.members.remove(&key) else {
                continue;
            };
            if people.len() < 2 {
                continue;
            }
            groups.push(DuplicateGroup {
                key: format!("{}:{}", reason.key_prefix(), key),
                reason,
                people: people.into_iter().cloned().collect(),
            });
        }
        groups
    }
}

fn run_pass(
    reason: MatchReason,
    people: &[Person],
    claimed: &mut HashSet<Uuid>,
) -> Vec<DuplicateGroup> {
    let mut buckets = Buckets::new();
    for person in people {
        if claimed.contains(&person.id) {
            continue;
        }
        if let Some(key) = match_key(reason, person) {
            buckets.push(key, person);
        }
    }

    let groups = buckets.into_groups(reason);
    for group in &groups {
        claimed.extend(group.people.iter().map(|p| p.id));
    }
    groups
}

/// Runs every pass and returns groups in pass order, then first-seen key order.
///
/// `people` should be ordered oldest first; members keep that order.
pub fn group_duplicates(people: &[Person]) -> Vec<DuplicateGroup> {
    let mut claimed = HashSet::new();
    let mut groups = Vec::new();

    for reason in MatchReason::ALL {
        let found = run_pass(reason, people, &mut claimed);
        tracing::debug!("Pass {}: {} group(s)", reason, found.len());
        groups.extend(found);
    }

    groups
}
