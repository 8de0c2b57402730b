use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

pub type UserId = Uuid;
pub type OrganizationId = Uuid;
pub type CheckinId = Uuid;

/// Half-open time range `[from, to)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CommentRecord {
    pub user_id: UserId,
    pub checkin_id: CheckinId,
}

/// A completed checkin.
#[derive(Debug, Clone)]
pub struct CheckinRecord {
    pub id: CheckinId,
    pub organization_id: OrganizationId,
}

#[derive(Debug, Clone)]
pub struct TeamMember {
    pub id: UserId,
    pub full_name: String,
}

/// An onboarded organization with its team members loaded.
#[derive(Debug, Clone)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
    pub team_members: Vec<TeamMember>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrganizationEngagement {
    #[serde(skip)]
    pub name: String,
    pub total: Option<f64>,
    #[serde(flatten)]
    pub members: BTreeMap<UserId, Option<f64>>,
    #[serde(skip)]
    pub member_names: BTreeMap<UserId, String>,
}

/// Result of one scoring run, keyed by organization.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct EngagementReport {
    pub organizations: BTreeMap<OrganizationId, OrganizationEngagement>,
}

#[derive(Debug, Clone)]
pub struct MemberScore {
    pub organization_name: String,
    pub member_name: String,
    pub rating: f64,
}
