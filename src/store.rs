use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{
    CheckinRecord, CommentRecord, Organization, OrganizationId, TimeWindow, UserId,
};

/// Data access needed by one scoring run.
///
/// Methods take `&mut self` so an adapter can route every call through a
/// single transaction.
#[async_trait]
pub trait EngagementStore: Send {
    /// Comments created inside the window.
    async fn comments_between(
        &mut self,
        window: &TimeWindow,
    ) -> Result<Vec<CommentRecord>, StoreError>;

    /// Completed checkins created inside the window.
    async fn completed_checkins_between(
        &mut self,
        window: &TimeWindow,
    ) -> Result<Vec<CheckinRecord>, StoreError>;

    /// All onboarded organizations with their team members.
    async fn onboarded_organizations(&mut self) -> Result<Vec<Organization>, StoreError>;

    /// Organizations this one is connected to. Direction matters.
    async fn connection_ids_for(
        &mut self,
        organization_id: OrganizationId,
    ) -> Result<HashSet<OrganizationId>, StoreError>;

    /// Overwrite a user's rating, skipping field validation.
    async fn save_user_rating(
        &mut self,
        user_id: UserId,
        rating: Option<f64>,
    ) -> Result<(), StoreError>;

    /// Overwrite an organization's rating, skipping field validation.
    async fn save_organization_rating(
        &mut self,
        organization_id: OrganizationId,
        rating: Option<f64>,
    ) -> Result<(), StoreError>;
}
