//! Back-fills missing fields on the primary from its duplicates.

use crate::models::Person;
use crate::normalize::is_present;
use crate::scoring::rank_by_completeness;

/// Person columns eligible for back-fill. All are text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergeField {
    Firstname,
    Lastname,
    PrimaryEmail,
    PrimaryPhone,
    LinkedinUrl,
    Title,
    JobFunction,
    SeniorityLevel,
    Company,
    Industry,
    Description,
    Location,
    ImageUrl,
    WebsiteUrl,
    AgeRange,
    LifeStage,
    Segment,
}

impl MergeField {
    pub const ALL: [MergeField; 17] = [
        MergeField::Firstname,
        MergeField::Lastname,
        MergeField::PrimaryEmail,
        MergeField::PrimaryPhone,
        MergeField::LinkedinUrl,
        MergeField::Title,
        MergeField::JobFunction,
        MergeField::SeniorityLevel,
        MergeField::Company,
        MergeField::Industry,
        MergeField::Description,
        MergeField::Location,
        MergeField::ImageUrl,
        MergeField::WebsiteUrl,
        MergeField::AgeRange,
        MergeField::LifeStage,
        MergeField::Segment,
    ];

    /// Column name in `people`.
    pub fn column(self) -> &'static str {
        match self {
            MergeField::Firstname => "firstname",
            MergeField::Lastname => "lastname",
            MergeField::PrimaryEmail => "primary_email",
            MergeField::PrimaryPhone => "primary_phone",
            MergeField::LinkedinUrl => "linkedin_url",
            MergeField::Title => "title",
            MergeField::JobFunction => "job_function",
            MergeField::SeniorityLevel => "seniority_level",
            MergeField::Company => "company",
            MergeField::Industry => "industry",
            MergeField::Description => "description",
            MergeField::Location => "location",
            MergeField::ImageUrl => "image_url",
            MergeField::WebsiteUrl => "website_url",
            MergeField::AgeRange => "age_range",
            MergeField::LifeStage => "life_stage",
            MergeField::Segment => "segment",
        }
    }

    fn slot(self, person: &Person) -> &Option<String> {
        match self {
            MergeField::Firstname => &person.firstname,
            MergeField::Lastname => &person.lastname,
            MergeField::PrimaryEmail => &person.primary_email,
            MergeField::PrimaryPhone => &person.primary_phone,
            MergeField::LinkedinUrl => &person.linkedin_url,
            MergeField::Title => &person.title,
            MergeField::JobFunction => &person.job_function,
            MergeField::SeniorityLevel => &person.seniority_level,
            MergeField::Company => &person.company,
            MergeField::Industry => &person.industry,
            MergeField::Description => &person.description,
            MergeField::Location => &person.location,
            MergeField::ImageUrl => &person.image_url,
            MergeField::WebsiteUrl => &person.website_url,
            MergeField::AgeRange => &person.age_range,
            MergeField::LifeStage => &person.life_stage,
            MergeField::Segment => &person.segment,
        }
    }

    fn slot_mut(self, person: &mut Person) -> &mut Option<String> {
        match self {
            MergeField::Firstname => &mut person.firstname,
            MergeField::Lastname => &mut person.lastname,
            MergeField::PrimaryEmail => &mut person.primary_email,
            MergeField::PrimaryPhone => &mut person.primary_phone,
            MergeField::LinkedinUrl => &mut person.linkedin_url,
            MergeField::Title => &mut person.title,
            MergeField::JobFunction => &mut person.job_function,
            MergeField::SeniorityLevel => &mut person.seniority_level,
            MergeField::Company => &mut person.company,
            MergeField::Industry => &mut person.industry,
            MergeField::Description => &mut person.description,
            MergeField::Location => &mut person.location,
            MergeField::ImageUrl => &mut person.image_url,
            MergeField::WebsiteUrl => &mut person.website_url,
            MergeField::AgeRange => &mut person.age_range,
            MergeField::LifeStage => &mut person.life_stage,
            MergeField::Segment => &mut person.segment,
        }
    }

    pub fn value(self, person: &Person) -> Option<&str> {
        self.slot(person).as_deref()
    }
}

/// Column values to write onto the primary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersonPatch {
    values: Vec<(MergeField, String)>,
}

impl PersonPatch {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(MergeField, String)> {
        self.values.iter()
    }

    pub fn get(&self, field: MergeField) -> Option<&str> {
        self.values
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, v)| v.as_str())
    }

    /// Column names, for logging.
    pub fn columns(&self) -> Vec<&'static str> {
        self.values.iter().map(|(f, _)| f.column()).collect()
    }

    /// Writes the patch onto an in-memory person.
    ///
    /// Only `None` slots are filled, matching what the patch was built for.
    pub fn apply_to(&self, person: &mut Person) {
        for (field, value) in &self.values {
            let slot = field.slot_mut(person);
            if slot.is_none() {
                *slot = Some(value.clone());
            }
        }
    }
}

/// Fills each `None` field on `primary` from the most complete duplicate that
/// has a non-blank value. Populated primary fields are never touched.
pub fn build_patch(primary: &Person, duplicates: &[Person]) -> PersonPatch {
    let mut ranked: Vec<&Person> = duplicates.iter().collect();
    rank_by_completeness(&mut ranked);

    let mut patch = PersonPatch::default();
    for field in MergeField::ALL {
        if field.value(primary).is_some() {
            continue;
        }
        let donor = ranked
            .iter()
            .filter_map(|dup| field.value(dup))
            .find(|value| is_present(Some(*value)));
        if let Some(value) = donor {
            patch.values.push((field, value.to_string()));
        }
    }
    patch
}
