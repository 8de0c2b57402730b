use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    CheckinId, CheckinRecord, CommentRecord, Organization, OrganizationId, TeamMember,
    TimeWindow, UserId,
};
use crate::store::EngagementStore;

fn in_window(window: &TimeWindow, at: DateTime<Utc>) -> bool {
    at >= window.from && at < window.to
}

#[derive(Debug, Clone)]
struct StoredOrganization {
    id: OrganizationId,
    name: String,
    onboarded: bool,
}

#[derive(Debug, Clone)]
struct StoredCheckin {
    id: CheckinId,
    organization_id: OrganizationId,
    completed: bool,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct StoredComment {
    user_id: UserId,
    checkin_id: CheckinId,
    created_at: DateTime<Utc>,
}

/// Test store that applies the same filters as the Postgres queries.
#[derive(Debug, Default)]
pub struct MemoryStore {
    organizations: Vec<StoredOrganization>,
    members: Vec<(OrganizationId, TeamMember)>,
    connections: HashMap<OrganizationId, HashSet<OrganizationId>>,
    checkins: Vec<StoredCheckin>,
    comments: Vec<StoredComment>,
    pub user_ratings: HashMap<UserId, Option<f64>>,
    pub organization_ratings: HashMap<OrganizationId, Option<f64>>,
    pub reads: usize,
    pub writes: usize,
}

impl MemoryStore {
    pub fn add_organization(&mut self, name: &str, onboarded: bool) -> OrganizationId {
        let id = Uuid::new_v4();
        self.organizations.push(StoredOrganization {
            id,
            name: name.to_string(),
            onboarded,
        });
        id
    }

    pub fn add_user(&mut self, organization_id: OrganizationId, full_name: &str) -> UserId {
        let id = Uuid::new_v4();
        self.members.push((
            organization_id,
            TeamMember {
                id,
                full_name: full_name.to_string(),
            },
        ));
        id
    }

    pub fn connect(&mut self, from: OrganizationId, to: OrganizationId) {
        self.connections.entry(from).or_default().insert(to);
    }

    pub fn add_checkin(
        &mut self,
        organization_id: OrganizationId,
        completed: bool,
        created_at: DateTime<Utc>,
    ) -> CheckinId {
        let id = Uuid::new_v4();
        self.checkins.push(StoredCheckin {
            id,
            organization_id,
            completed,
            created_at,
        });
        id
    }

    pub fn add_comment(&mut self, user_id: UserId, checkin_id: CheckinId, created_at: DateTime<Utc>) {
        self.comments.push(StoredComment {
            user_id,
            checkin_id,
            created_at,
        });
    }
}

#[async_trait]
impl EngagementStore for MemoryStore {
    async fn comments_between(
        &mut self,
        window: &TimeWindow,
    ) -> Result<Vec<CommentRecord>, StoreError> {
        self.reads += 1;
        Ok(self
            .comments
            .iter()
            .filter(|comment| in_window(window, comment.created_at))
            .map(|comment| CommentRecord {
                user_id: comment.user_id,
                checkin_id: comment.checkin_id,
            })
            .collect())
    }

    async fn completed_checkins_between(
        &mut self,
        window: &TimeWindow,
    ) -> Result<Vec<CheckinRecord>, StoreError> {
        self.reads += 1;
        Ok(self
            .checkins
            .iter()
            .filter(|checkin| checkin.completed && in_window(window, checkin.created_at))
            .map(|checkin| CheckinRecord {
                id: checkin.id,
                organization_id: checkin.organization_id,
            })
            .collect())
    }

    async fn onboarded_organizations(&mut self) -> Result<Vec<Organization>, StoreError> {
        self.reads += 1;
        Ok(self
            .organizations
            .iter()
            .filter(|organization| organization.onboarded)
            .map(|organization| Organization {
                id: organization.id,
                name: organization.name.clone(),
                team_members: self
                    .members
                    .iter()
                    .filter(|(organization_id, _)| *organization_id == organization.id)
                    .map(|(_, member)| member.clone())
                    .collect(),
            })
            .collect())
    }

    async fn connection_ids_for(
        &mut self,
        organization_id: OrganizationId,
    ) -> Result<HashSet<OrganizationId>, StoreError> {
        self.reads += 1;
        Ok(self
            .connections
            .get(&organization_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_user_rating(
        &mut self,
        user_id: UserId,
        rating: Option<f64>,
    ) -> Result<(), StoreError> {
        self.writes += 1;
        self.user_ratings.insert(user_id, rating);
        Ok(())
    }

    async fn save_organization_rating(
        &mut self,
        organization_id: OrganizationId,
        rating: Option<f64>,
    ) -> Result<(), StoreError> {
        self.writes += 1;
        self.organization_ratings.insert(organization_id, rating);
        Ok(())
    }
}
