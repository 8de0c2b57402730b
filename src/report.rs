use std::fmt::Write;

use serde::Serialize;

use crate::engagement;
use crate::models::{EngagementReport, OrganizationEngagement, TimeWindow};
use crate::user;

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    organization: &'a str,
    member: &'a str,
    chat_name: String,
    rating: Option<f64>,
    organization_total: Option<f64>,
}

/// Organizations ordered by total, highest first, unrated last.
pub fn ranked_organizations(report: &EngagementReport) -> Vec<&OrganizationEngagement> {
    let mut organizations: Vec<&OrganizationEngagement> =
        report.organizations.values().collect();
    organizations.sort_by(|a, b| match (a.total, b.total) {
        (Some(x), Some(y)) => y
            .partial_cmp(&x)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.name.cmp(&b.name),
    });
    organizations
}

pub fn build_report(window: &TimeWindow, report: &EngagementReport, limit: usize) -> String {
    let organizations = ranked_organizations(report);
    let members = engagement::ranked_members(report);
    let rated = organizations.iter().filter(|o| o.total.is_some()).count();

    let mut output = String::new();
    let _ = writeln!(output, "# Engagement Report");
    let _ = writeln!(
        output,
        "Comments on connected check-ins from {} to {}",
        window.from.format("%Y-%m-%d %H:%M UTC"),
        window.to.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Summary");
    let _ = writeln!(
        output,
        "- {} organizations scored, {} with a rating",
        organizations.len(),
        rated
    );
    let _ = writeln!(output, "- {} members with a rating", members.len());

    let _ = writeln!(output);
    let _ = writeln!(output, "## Organizations");

    if organizations.is_empty() {
        let _ = writeln!(output, "No onboarded organizations.");
    } else {
        for organization in organizations.iter() {
            let _ = writeln!(
                output,
                "- {}: {} ({} members)",
                organization.name,
                format_rating(organization.total),
                organization.members.len()
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Most Engaged Members");

    if members.is_empty() {
        let _ = writeln!(output, "No rated members for this window.");
    } else {
        for member in members.iter().take(limit) {
            let _ = writeln!(
                output,
                "- {} ({}) rating {:.3}",
                member.member_name, member.organization_name, member.rating
            );
        }
    }

    let quiet: Vec<String> = members
        .iter()
        .filter(|member| member.rating == 0.0)
        .map(|member| user::first_name(&member.member_name))
        .collect();
    if !quiet.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## No Comments Yet");
        let _ = writeln!(output, "{}", quiet.join(", "));
    }

    output
}

pub fn write_csv<W: std::io::Write>(report: &EngagementReport, writer: W) -> anyhow::Result<usize> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    let mut rows = 0usize;

    for organization in ranked_organizations(report) {
        for (user_id, rating) in organization.members.iter() {
            let member = organization
                .member_names
                .get(user_id)
                .map(String::as_str)
                .unwrap_or_default();
            csv_writer.serialize(CsvRow {
                organization: &organization.name,
                member,
                chat_name: user::chat_display_name(
                    Some(member),
                    None,
                    Some(&organization.name),
                ),
                rating: *rating,
                organization_total: organization.total,
            })?;
            rows += 1;
        }
    }

    csv_writer.flush()?;
    Ok(rows)
}

fn format_rating(rating: Option<f64>) -> String {
    match rating {
        Some(value) => format!("{value:.3}"),
        None => "no rating".to_string(),
    }
}
