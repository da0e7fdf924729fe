/// Property-based tests using proptest
/// Tests invariants of normalization, grouping and scoring for arbitrary inputs
use proptest::prelude::*;
use std::collections::HashSet;
use uuid::Uuid;

use rust_people_merge_api::grouping::group_duplicates;
use rust_people_merge_api::models::{Affiliation, Person};
use rust_people_merge_api::normalize::{email_key, linkedin_key, normalize};
use rust_people_merge_api::scoring::{completeness_score, rank_by_completeness};

// Property: normalization is total and idempotent
proptest! {
    #[test]
    fn normalize_never_panics(text in "\\PC*") {
        let _ = normalize(&text);
        let _ = email_key(Some(&text));
        let _ = linkedin_key(Some(&text));
    }

    #[test]
    fn normalize_is_idempotent(text in "\\PC*") {
        let once = normalize(&text);
        prop_assert_eq!(normalize(&once), once);
    }

    #[test]
    fn normalized_text_has_no_outer_or_double_spaces(text in "[ a-zA-Z\\t]{0,40}") {
        let normalized = normalize(&text);
        prop_assert_eq!(normalized.trim(), normalized.as_str());
        prop_assert!(!normalized.contains("  "));
    }
}

fn arb_person() -> impl Strategy<Value = Person> {
    let names = prop::option::of(prop::sample::select(vec![
        "Alice Smith",
        "alice smith",
        "Alice Jones",
        "Bob",
        "Participant 1",
        "Participant 2",
        "Speaker 3",
        "Unknown",
    ]));
    let emails = prop::option::of(prop::sample::select(vec![
        "alice@acme.com",
        "ALICE@acme.com",
        "bob@acme.com",
        "not-an-email",
    ]));
    let orgs = prop::option::of(prop::sample::select(vec!["Acme", "acme ", "Globex"]));
    let urls = prop::option::of(prop::sample::select(vec![
        "https://linkedin.com/in/alice",
        "linkedin.com/in/Alice/",
        "https://example.com/alice",
    ]));

    (names, emails, orgs, urls).prop_map(|(name, email, org, url)| {
        let id = Uuid::new_v4();
        Person {
            id,
            name: name.map(str::to_string),
            primary_email: email.map(str::to_string),
            linkedin_url: url.map(str::to_string),
            organizations: org
                .map(|org| {
                    vec![Affiliation {
                        person_id: id,
                        organization_id: Uuid::new_v4(),
                        organization_name: Some(org.to_string()),
                        ..Default::default()
                    }]
                })
                .unwrap_or_default(),
            ..Default::default()
        }
    })
}

// Property: every person id appears in at most one group, and groups have two or more members
proptest! {
    #[test]
    fn grouping_is_exclusive(people in prop::collection::vec(arb_person(), 0..30)) {
        let groups = group_duplicates(&people);
        let mut seen = HashSet::new();
        for group in &groups {
            prop_assert!(group.people.len() >= 2);
            prop_assert!(group.key.starts_with(group.reason.key_prefix()));
            for id in group.person_ids() {
                prop_assert!(seen.insert(id), "person {} grouped twice", id);
            }
        }
    }

    #[test]
    fn grouping_is_deterministic(people in prop::collection::vec(arb_person(), 0..30)) {
        let first: Vec<_> = group_duplicates(&people).iter().map(|g| (g.key.clone(), g.person_ids())).collect();
        let second: Vec<_> = group_duplicates(&people).iter().map(|g| (g.key.clone(), g.person_ids())).collect();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn ranking_orders_by_score_and_keeps_everyone(people in prop::collection::vec(arb_person(), 0..20)) {
        let mut people = people;
        let before: HashSet<Uuid> = people.iter().map(|p| p.id).collect();
        rank_by_completeness(&mut people);
        let after: HashSet<Uuid> = people.iter().map(|p| p.id).collect();
        prop_assert_eq!(before, after);
        for pair in people.windows(2) {
            prop_assert!(completeness_score(&pair[0]) >= completeness_score(&pair[1]));
        }
    }
}
