use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::error::EngagementError;
use crate::models::{
    CheckinId, CommentRecord, EngagementReport, MemberScore, OrganizationEngagement,
    OrganizationId, TimeWindow, UserId,
};
use crate::store::EngagementStore;

pub const DEFAULT_MAX_COMMENTS_PER_CHECKIN: usize = 2;

#[derive(Debug, Clone)]
pub struct EngagementParams {
    pub from: DateTime<Utc>,
    /// Defaults to the current time when unset.
    pub to: Option<DateTime<Utc>>,
    pub persist: bool,
    pub max_comments_per_checkin: usize,
}

impl EngagementParams {
    pub fn new(from: DateTime<Utc>) -> Self {
        Self {
            from,
            to: None,
            persist: true,
            max_comments_per_checkin: DEFAULT_MAX_COMMENTS_PER_CHECKIN,
        }
    }

    pub fn window(&self) -> Result<TimeWindow, EngagementError> {
        let to = self.to.unwrap_or_else(Utc::now);
        if self.from > to {
            return Err(EngagementError::InvalidRange {
                from: self.from,
                to,
            });
        }
        Ok(TimeWindow {
            from: self.from,
            to,
        })
    }
}

/// Computes engagement ratings for every onboarded organization and its
/// team members over the requested window.
///
/// A member's rating is the number of comments they left on other
/// organizations' checkins (capped per checkin) divided by the number of
/// completed checkins made by the organizations theirs is connected to.
/// The organization total is the member ratings summed over team size.
/// Both are `None` when the connected organizations made no checkins.
///
/// When `persist` is set every rating is written back through the store.
pub async fn compute_engagement<S>(
    store: &mut S,
    params: &EngagementParams,
) -> Result<EngagementReport, EngagementError>
where
    S: EngagementStore + ?Sized,
{
    let window = params.window()?;
    info!(
        from = %window.from,
        to = %window.to,
        persist = params.persist,
        max_comments_per_checkin = params.max_comments_per_checkin,
        "computing engagement ratings"
    );

    let mut comments_by_user: HashMap<UserId, Vec<CommentRecord>> = HashMap::new();
    for comment in store.comments_between(&window).await? {
        comments_by_user.entry(comment.user_id).or_default().push(comment);
    }

    let mut checkins_by_organization: HashMap<OrganizationId, HashSet<CheckinId>> =
        HashMap::new();
    for checkin in store.completed_checkins_between(&window).await? {
        checkins_by_organization
            .entry(checkin.organization_id)
            .or_default()
            .insert(checkin.id);
    }

    let organizations = store.onboarded_organizations().await?;
    let mut report = EngagementReport::default();

    for organization in organizations {
        let own_checkins = checkins_by_organization.get(&organization.id);

        // Only connected organizations' checkins form the denominator.
        let num_checkins: usize = store
            .connection_ids_for(organization.id)
            .await?
            .iter()
            .filter(|id| **id != organization.id)
            .filter_map(|id| checkins_by_organization.get(id))
            .map(HashSet::len)
            .sum();

        let mut entry = OrganizationEngagement {
            name: organization.name.clone(),
            total: None,
            members: Default::default(),
            member_names: Default::default(),
        };
        let mut num_for_organization = 0.0;

        for member in &organization.team_members {
            let rating = member_rating(
                comments_by_user.get(&member.id).map(Vec::as_slice),
                own_checkins,
                num_checkins,
                params.max_comments_per_checkin,
            );
            if let Some(value) = rating {
                num_for_organization += value;
            }
            if params.persist {
                store.save_user_rating(member.id, rating).await?;
            }
            entry.members.insert(member.id, rating);
            entry
                .member_names
                .insert(member.id, member.full_name.clone());
        }

        let team_size = organization.team_members.len();
        let total = if num_checkins == 0 || team_size == 0 {
            None
        } else {
            Some(round_rating(num_for_organization / team_size as f64))
        };
        if params.persist {
            store.save_organization_rating(organization.id, total).await?;
        }
        entry.total = total;

        debug!(
            organization = %organization.name,
            num_checkins,
            team_size,
            total = ?total,
            "organization scored"
        );
        report.organizations.insert(organization.id, entry);
    }

    info!(
        organizations = report.organizations.len(),
        "engagement ratings computed"
    );
    Ok(report)
}

fn member_rating(
    comments: Option<&[CommentRecord]>,
    own_checkins: Option<&HashSet<CheckinId>>,
    num_checkins: usize,
    max_comments_per_checkin: usize,
) -> Option<f64> {
    if num_checkins == 0 {
        return None;
    }

    let mut comments_by_checkin: HashMap<CheckinId, usize> = HashMap::new();
    for comment in comments.unwrap_or_default() {
        *comments_by_checkin.entry(comment.checkin_id).or_insert(0) += 1;
    }

    let num_comments: usize = comments_by_checkin
        .into_iter()
        .filter(|(checkin_id, _)| !own_checkins.is_some_and(|own| own.contains(checkin_id)))
        .map(|(_, count)| count.min(max_comments_per_checkin))
        .sum();

    Some(round_rating(num_comments as f64 / num_checkins as f64))
}

/// Rounds to three decimal places, halves away from zero.
pub fn round_rating(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Start of a window covering the last `since_days` days, at least one.
pub fn window_start(since_days: i64) -> Result<DateTime<Utc>, EngagementError> {
    let days = since_days.max(1);
    Duration::try_days(days)
        .and_then(|span| Utc::now().checked_sub_signed(span))
        .ok_or(EngagementError::WindowOutOfRange(days))
}

/// Flattens a report into rated members, highest first.
pub fn ranked_members(report: &EngagementReport) -> Vec<MemberScore> {
    let mut members: Vec<MemberScore> = report
        .organizations
        .values()
        .flat_map(|organization| {
            organization
                .members
                .iter()
                .filter_map(move |(user_id, rating)| {
                    let rating = (*rating)?;
                    Some(MemberScore {
                        organization_name: organization.name.clone(),
                        member_name: organization
                            .member_names
                            .get(user_id)
                            .cloned()
                            .unwrap_or_else(|| user_id.to_string()),
                        rating,
                    })
                })
        })
        .collect();

    members.sort_by(|a, b| {
        b.rating
            .partial_cmp(&a.rating)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.member_name.cmp(&b.member_name))
    });
    members
}
