use std::collections::{HashMap, HashSet};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    CheckinRecord, CommentRecord, Organization, OrganizationId, TeamMember, TimeWindow, UserId,
};
use crate::store::EngagementStore;
use crate::user::{self, NotificationSettings};

/// Advisory lock key held by the transaction of an active scoring run.
const ENGAGEMENT_LOCK_KEY: i64 = 0x656e_6761_6765;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let organizations = vec![
        (
            Uuid::parse_str("6b1f2c7e-2d1a-4c55-9a0e-0d6f2f8b9a10")?,
            "Acme Robotics",
            true,
        ),
        (
            Uuid::parse_str("a93c5e44-71f8-4b8e-8d3e-5f0b6a1c2d21")?,
            "Bluebird Labs",
            true,
        ),
        (
            Uuid::parse_str("c4e8a1b2-3f5d-4e6a-9b7c-8d9e0f1a2b32")?,
            "Cedar Health",
            true,
        ),
        (
            Uuid::parse_str("f0d1c2b3-a4e5-4f67-8a9b-0c1d2e3f4a43")?,
            "Driftwood Analytics",
            false,
        ),
    ];

    let mut organization_ids = HashMap::new();
    for (id, name, onboarded) in organizations {
        let id: Uuid = sqlx::query(
            r#"
            INSERT INTO engagement.organizations (id, name, onboarded)
            VALUES ($1, $2, $3)
            ON CONFLICT (name) DO UPDATE SET onboarded = EXCLUDED.onboarded
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(onboarded)
        .fetch_one(pool)
        .await?
        .get("id");
        organization_ids.insert(name, id);
    }

    let relationships = vec![
        ("Acme Robotics", "Bluebird Labs"),
        ("Bluebird Labs", "Acme Robotics"),
        ("Acme Robotics", "Cedar Health"),
        ("Cedar Health", "Bluebird Labs"),
    ];

    for (from, to) in relationships {
        sqlx::query(
            r#"
            INSERT INTO engagement.relationships (organization_id, connected_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(organization_ids[from])
        .bind(organization_ids[to])
        .execute(pool)
        .await?;
    }

    let users = vec![
        ("Avery Lee", "avery.lee@acmerobotics.io", Some("averybuilds"), "Acme Robotics"),
        ("Jules Moreno", "jules.moreno@acmerobotics.io", None, "Acme Robotics"),
        ("Kiara Patel", "kiara.patel@bluebirdlabs.com", Some("kiarap"), "Bluebird Labs"),
        ("Sam Ortiz", "sam.ortiz@cedarhealth.org", None, "Cedar Health"),
        ("Priya Shah", "priya.shah@driftwood.ai", Some("priyadata"), "Driftwood Analytics"),
    ];

    let settings = Json(NotificationSettings::default());
    let mut user_ids = HashMap::new();
    for (name, email, handle, organization) in users {
        user::validate_email(email).map_err(anyhow::Error::msg)?;
        let new_id = Uuid::new_v4();
        let id: Uuid = sqlx::query(
            r#"
            INSERT INTO engagement.users
            (id, organization_id, full_name, email, handle, chat_username, settings)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (email) DO UPDATE
            SET full_name = EXCLUDED.full_name, organization_id = EXCLUDED.organization_id
            RETURNING id
            "#,
        )
        .bind(new_id)
        .bind(organization_ids[organization])
        .bind(name)
        .bind(email)
        .bind(handle)
        .bind(user::internal_email(handle, new_id))
        .bind(&settings)
        .fetch_one(pool)
        .await?
        .get("id");
        user_ids.insert(email, id);
    }

    let now = Utc::now();
    let checkins = vec![
        ("seed-checkin-001", "Bluebird Labs", true, 6),
        ("seed-checkin-002", "Bluebird Labs", true, 3),
        ("seed-checkin-003", "Bluebird Labs", false, 1),
        ("seed-checkin-004", "Cedar Health", true, 5),
        ("seed-checkin-005", "Acme Robotics", true, 4),
        ("seed-checkin-006", "Driftwood Analytics", true, 2),
    ];

    let mut checkin_ids = HashMap::new();
    for (source_key, organization, completed, days_ago) in checkins {
        let id: Uuid = sqlx::query(
            r#"
            INSERT INTO engagement.checkins (id, organization_id, completed, source_key, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (source_key) DO UPDATE SET completed = EXCLUDED.completed
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(organization_ids[organization])
        .bind(completed)
        .bind(source_key)
        .bind(now - Duration::days(days_ago))
        .fetch_one(pool)
        .await?
        .get("id");
        checkin_ids.insert(source_key, id);
    }

    let comments = vec![
        ("seed-comment-001", "avery.lee@acmerobotics.io", "seed-checkin-001", "Great demo, what's the churn look like?", 5),
        ("seed-comment-002", "avery.lee@acmerobotics.io", "seed-checkin-001", "Happy to intro you to our pilot lead.", 5),
        ("seed-comment-003", "avery.lee@acmerobotics.io", "seed-checkin-001", "Following up on the pricing question.", 4),
        ("seed-comment-004", "avery.lee@acmerobotics.io", "seed-checkin-004", "Congrats on the hospital partnership!", 4),
        ("seed-comment-005", "jules.moreno@acmerobotics.io", "seed-checkin-005", "Noting our own blockers here.", 3),
        ("seed-comment-006", "jules.moreno@acmerobotics.io", "seed-checkin-002", "Which onboarding flow did you ship?", 2),
        ("seed-comment-007", "kiara.patel@bluebirdlabs.com", "seed-checkin-005", "Nice progress on the gripper.", 3),
        ("seed-comment-008", "sam.ortiz@cedarhealth.org", "seed-checkin-002", "We hit the same compliance issue.", 2),
    ];

    for (source_key, email, checkin, body, days_ago) in comments {
        sqlx::query(
            r#"
            INSERT INTO engagement.comments (id, user_id, checkin_id, body, source_key, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_ids[email])
        .bind(checkin_ids[checkin])
        .bind(body)
        .bind(source_key)
        .bind(now - Duration::days(days_ago))
        .execute(pool)
        .await?;
    }

    info!(
        organizations = organization_ids.len(),
        users = user_ids.len(),
        checkins = checkin_ids.len(),
        "seed data inserted"
    );
    Ok(())
}

/// Postgres adapter that runs every call inside one transaction.
///
/// The transaction holds an advisory lock for its lifetime, so a second run
/// fails with [`StoreError::RunInProgress`] instead of racing on ratings.
/// Dropping the store without [`PgEngagementStore::commit`] rolls back.
pub struct PgEngagementStore {
    tx: Transaction<'static, Postgres>,
}

impl PgEngagementStore {
    pub async fn begin(pool: &PgPool) -> Result<Self, StoreError> {
        let mut tx = pool.begin().await?;
        let locked: bool = sqlx::query_scalar("SELECT pg_try_advisory_xact_lock($1)")
            .bind(ENGAGEMENT_LOCK_KEY)
            .fetch_one(&mut *tx)
            .await?;
        if !locked {
            return Err(StoreError::RunInProgress);
        }
        debug!("engagement run lock acquired");
        Ok(Self { tx })
    }

    pub async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl EngagementStore for PgEngagementStore {
    async fn comments_between(
        &mut self,
        window: &TimeWindow,
    ) -> Result<Vec<CommentRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, checkin_id
            FROM engagement.comments
            WHERE created_at >= $1 AND created_at < $2
            "#,
        )
        .bind(window.from)
        .bind(window.to)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| CommentRecord {
                user_id: row.get("user_id"),
                checkin_id: row.get("checkin_id"),
            })
            .collect())
    }

    async fn completed_checkins_between(
        &mut self,
        window: &TimeWindow,
    ) -> Result<Vec<CheckinRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, organization_id
            FROM engagement.checkins
            WHERE completed AND created_at >= $1 AND created_at < $2
            "#,
        )
        .bind(window.from)
        .bind(window.to)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| CheckinRecord {
                id: row.get("id"),
                organization_id: row.get("organization_id"),
            })
            .collect())
    }

    async fn onboarded_organizations(&mut self) -> Result<Vec<Organization>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, name FROM engagement.organizations WHERE onboarded ORDER BY name",
        )
        .fetch_all(&mut *self.tx)
        .await?;

        let mut organizations: Vec<Organization> = rows
            .into_iter()
            .map(|row| Organization {
                id: row.get("id"),
                name: row.get("name"),
                team_members: Vec::new(),
            })
            .collect();

        let ids: Vec<Uuid> = organizations.iter().map(|o| o.id).collect();
        let member_rows = sqlx::query(
            r#"
            SELECT id, organization_id, full_name
            FROM engagement.users
            WHERE organization_id = ANY($1)
            ORDER BY full_name
            "#,
        )
        .bind(&ids)
        .fetch_all(&mut *self.tx)
        .await?;

        let mut members: HashMap<OrganizationId, Vec<TeamMember>> = HashMap::new();
        for row in member_rows {
            members
                .entry(row.get("organization_id"))
                .or_default()
                .push(TeamMember {
                    id: row.get("id"),
                    full_name: row.get("full_name"),
                });
        }

        for organization in organizations.iter_mut() {
            organization.team_members = members.remove(&organization.id).unwrap_or_default();
        }
        Ok(organizations)
    }

    async fn connection_ids_for(
        &mut self,
        organization_id: OrganizationId,
    ) -> Result<HashSet<OrganizationId>, StoreError> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT connected_id FROM engagement.relationships WHERE organization_id = $1",
        )
        .bind(organization_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(ids.into_iter().collect())
    }

    async fn save_user_rating(
        &mut self,
        user_id: UserId,
        rating: Option<f64>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE engagement.users SET rating = $2 WHERE id = $1")
            .bind(user_id)
            .bind(rating)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn save_organization_rating(
        &mut self,
        organization_id: OrganizationId,
        rating: Option<f64>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE engagement.organizations SET rating = $2 WHERE id = $1")
            .bind(organization_id)
            .bind(rating)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }
}

pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")
}
