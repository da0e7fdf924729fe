use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

use super::{MergeLease, PeopleStore};
use crate::errors::{AppError, ResultExt};
use crate::field_merge::PersonPatch;
use crate::models::{Affiliation, Person, ProjectScope};
use crate::relationships::{LinkTable, TransferPlan};

const PERSON_COLUMNS: &str = r#"
    id, account_id, project_id, name, firstname, lastname, primary_email,
    primary_phone, linkedin_url, title, job_function, seniority_level, company,
    industry, description, location, image_url, website_url, age, age_range,
    life_stage, segment, created_at
"#;

/// Postgres-backed store for people and their relationship tables.
#[derive(Clone)]
pub struct PgPeopleStore {
    pool: PgPool,
}

impl PgPeopleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Loads affiliations for `person_ids`, oldest link first, grouped per person.
    async fn load_affiliations(
        &self,
        person_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<Affiliation>>, AppError> {
        if person_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<_, Affiliation>(
            r#"
            SELECT po.person_id,
                   po.organization_id,
                   o.name AS organization_name,
                   o.industry AS organization_industry,
                   po.is_primary,
                   po.job_title
            FROM people_organizations po
            LEFT JOIN organizations o ON o.id = po.organization_id
            WHERE po.person_id = ANY($1)
            ORDER BY po.created_at ASC
            "#,
        )
        .bind(person_ids)
        .fetch_all(&self.pool)
        .await
        .context("Loading organization affiliations")?;

        let mut by_person: HashMap<Uuid, Vec<Affiliation>> = HashMap::new();
        for row in rows {
            by_person.entry(row.person_id).or_default().push(row);
        }
        Ok(by_person)
    }

    async fn attach_affiliations(&self, mut people: Vec<Person>) -> Result<Vec<Person>, AppError> {
        let ids: Vec<Uuid> = people.iter().map(|p| p.id).collect();
        let mut affiliations = self.load_affiliations(&ids).await?;
        for person in &mut people {
            person.organizations = affiliations.remove(&person.id).unwrap_or_default();
        }
        Ok(people)
    }
}

#[async_trait]
impl PeopleStore for PgPeopleStore {
    async fn list_project_people(&self, scope: &ProjectScope) -> Result<Vec<Person>, AppError> {
        let people = sqlx::query_as::<_, Person>(&format!(
            "SELECT {} FROM people WHERE account_id = $1 AND project_id = $2 ORDER BY created_at ASC",
            PERSON_COLUMNS
        ))
        .bind(scope.account_id)
        .bind(scope.project_id)
        .fetch_all(&self.pool)
        .await
        .context("Fetching project people")?;

        self.attach_affiliations(people).await
    }

    async fn get_person(
        &self,
        scope: &ProjectScope,
        id: Uuid,
    ) -> Result<Option<Person>, AppError> {
        let person = sqlx::query_as::<_, Person>(&format!(
            "SELECT {} FROM people WHERE id = $1 AND account_id = $2 AND project_id = $3",
            PERSON_COLUMNS
        ))
        .bind(id)
        .bind(scope.account_id)
        .bind(scope.project_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Fetching person {}", id))?;

        match person {
            Some(person) => Ok(self.attach_affiliations(vec![person]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn get_people(
        &self,
        scope: &ProjectScope,
        ids: &[Uuid],
    ) -> Result<Vec<Person>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let people = sqlx::query_as::<_, Person>(&format!(
            "SELECT {} FROM people WHERE id = ANY($1) AND account_id = $2 AND project_id = $3",
            PERSON_COLUMNS
        ))
        .bind(ids)
        .bind(scope.account_id)
        .bind(scope.project_id)
        .fetch_all(&self.pool)
        .await
        .context("Fetching duplicate people")?;

        self.attach_affiliations(people).await
    }

    async fn list_link_keys(
        &self,
        table: LinkTable,
        person_id: Uuid,
    ) -> Result<Vec<String>, AppError> {
        // Table and column names come from the closed LinkTable enum.
        let sql = format!(
            "SELECT {key}::text FROM {table} WHERE person_id = $1",
            key = table.key_column(),
            table = table.table_name()
        );

        sqlx::query_scalar::<_, String>(&sql)
            .bind(person_id)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Reading {} for {}", table, person_id))
    }

    async fn apply_transfer(
        &self,
        table: LinkTable,
        from: Uuid,
        to: Uuid,
        plan: &TransferPlan,
    ) -> Result<(), AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Starting transfer transaction")?;

        if !plan.reassign.is_empty() {
            let sql = format!(
                "UPDATE {table} SET person_id = $1 WHERE person_id = $2 AND {key}::text = ANY($3)",
                table = table.table_name(),
                key = table.key_column()
            );
            sqlx::query(&sql)
                .bind(to)
                .bind(from)
                .bind(&plan.reassign)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Reassigning {} rows", table))?;
        }

        if !plan.discard.is_empty() {
            let sql = format!(
                "DELETE FROM {table} WHERE person_id = $1 AND {key}::text = ANY($2)",
                table = table.table_name(),
                key = table.key_column()
            );
            sqlx::query(&sql)
                .bind(from)
                .bind(&plan.discard)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Deleting reconciled {} rows", table))?;
        }

        tx.commit().await.context("Committing transfer")?;
        Ok(())
    }

    async fn update_person_fields(&self, id: Uuid, patch: &PersonPatch) -> Result<(), AppError> {
        if patch.is_empty() {
            return Ok(());
        }

        // Column names come from the closed MergeField enum; values are bound.
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE people SET ");
        let mut assignments = builder.separated(", ");
        for (field, value) in patch.iter() {
            assignments.push(format!("{} = ", field.column()));
            assignments.push_bind_unseparated(value.clone());
        }
        assignments.push("updated_at = now()");
        builder.push(" WHERE id = ");
        builder.push_bind(id);

        builder
            .build()
            .execute(&self.pool)
            .await
            .with_context(|| format!("Updating merged fields on {}", id))?;
        Ok(())
    }

    async fn delete_person(&self, id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM people WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Deleting person {}", id))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Person {} not found", id)));
        }
        Ok(())
    }

    async fn acquire_merge_lock(
        &self,
        person_ids: &[Uuid],
        ttl: Duration,
    ) -> Result<Option<MergeLease>, AppError> {
        let lease_id = Uuid::new_v4();
        let mut tx = self.pool.begin().await.context("Starting lock transaction")?;

        // Reclaim markers left behind by crashed merges.
        sqlx::query(
            r#"
            DELETE FROM person_merge_locks
            WHERE person_id = ANY($1)
              AND acquired_at < now() - make_interval(secs => $2)
            "#,
        )
        .bind(person_ids)
        .bind(ttl.as_secs_f64())
        .execute(&mut *tx)
        .await
        .context("Reclaiming stale merge locks")?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO person_merge_locks (person_id, lease_id)
            SELECT unnest($1::uuid[]), $2
            ON CONFLICT (person_id) DO NOTHING
            "#,
        )
        .bind(person_ids)
        .bind(lease_id)
        .execute(&mut *tx)
        .await
        .context("Inserting merge locks")?;

        if inserted.rows_affected() as usize != person_ids.len() {
            tx.rollback().await.context("Rolling back merge lock")?;
            return Ok(None);
        }

        tx.commit().await.context("Committing merge lock")?;
        Ok(Some(MergeLease {
            lease_id,
            person_ids: person_ids.to_vec(),
        }))
    }

    async fn release_merge_lock(&self, lease: &MergeLease) -> Result<(), AppError> {
        sqlx::query("DELETE FROM person_merge_locks WHERE lease_id = $1")
            .bind(lease.lease_id)
            .execute(&self.pool)
            .await
            .context("Releasing merge lock")?;
        Ok(())
    }
}
