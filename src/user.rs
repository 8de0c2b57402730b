use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const INTERNAL_EMAIL_DOMAIN: &str = "users.nreduce.com";

static TRAILING_NAMES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\n\x0B\x0C\r]+.*").expect("valid name pattern"));

static INTERNAL_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@[A-Za-z0-9_]+\.nreduce\.com$").expect("valid address pattern")
});

pub const EMAIL_LABELS: &[(&str, &str)] = &[
    ("docheckin", "Reminder to Check-in"),
    ("comment", "New Comment"),
    ("meeting", "Meeting Reminder"),
    ("checkin", "New Checkin"),
    ("relationship", "Relationships"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSettings {
    #[serde(default)]
    pub email_on: Vec<String>,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            email_on: EMAIL_LABELS
                .iter()
                .map(|(kind, _)| kind.to_string())
                .collect(),
        }
    }
}

/// Everything before the first run of whitespace. A leading space yields "".
pub fn first_name(full_name: &str) -> String {
    TRAILING_NAMES.replace(full_name, "").into_owned()
}

/// Addresses on our own internal subdomains cannot be used for sign-up.
/// Blank addresses pass; presence is checked elsewhere.
pub fn validate_email(email: &str) -> Result<(), String> {
    if INTERNAL_ADDRESS.is_match(email) {
        return Err(format!("{email} is not valid"));
    }
    Ok(())
}

pub fn internal_email(handle: Option<&str>, id: Uuid) -> String {
    match handle.filter(|value| !value.is_empty()) {
        Some(handle) => format!("{handle}@{INTERNAL_EMAIL_DOMAIN}"),
        None => format!("{id}@{INTERNAL_EMAIL_DOMAIN}"),
    }
}

/// Display name for the team chat service, which requires at least two words.
pub fn chat_display_name(
    full_name: Option<&str>,
    handle: Option<&str>,
    organization_name: Option<&str>,
) -> String {
    let mut name = match full_name.filter(|value| !value.trim().is_empty()) {
        Some(value) => value.to_string(),
        None => handle.unwrap_or_default().replacen('@', "", 1),
    };

    match organization_name {
        Some(organization) => {
            name.push_str(" | ");
            name.push_str(organization);
        }
        None if name.split_whitespace().count() < 2 => name.push_str(" S12"),
        None => {}
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_enable_every_label() {
        let settings = NotificationSettings::default();
        assert_eq!(settings.email_on.len(), EMAIL_LABELS.len());
        assert!(settings.email_on.iter().any(|kind| kind == "docheckin"));
    }

    #[test]
    fn settings_tolerate_missing_list() {
        let settings: NotificationSettings = serde_json::from_str("{}").unwrap();
        assert!(settings.email_on.is_empty());
    }

    #[test]
    fn first_name_takes_leading_word() {
        assert_eq!(first_name("Kiara Patel"), "Kiara");
        assert_eq!(first_name("Jules"), "Jules");
        assert_eq!(first_name("Avery\tLee Jr"), "Avery");
        assert_eq!(first_name(" Kiara"), "");
        assert_eq!(first_name("   "), "");
        assert_eq!(first_name(""), "");
    }

    #[test]
    fn rejects_internal_addresses() {
        assert!(validate_email("avery.lee@example.com").is_ok());
        assert!(validate_email("avery@nreduce.com").is_ok());
        assert!(validate_email("avery@a.b.nreduce.com").is_ok());
        assert!(validate_email("42@users.nreduce.com").is_err());
        assert!(validate_email("x@y@users.nreduce.com").is_err());
    }

    #[test]
    fn internal_match_is_case_sensitive_and_ignores_blanks() {
        assert!(validate_email("avery@USERS.NREDUCE.COM").is_ok());
        assert!(validate_email("").is_ok());
        assert!(validate_email("not-an-email").is_ok());
    }

    #[test]
    fn internal_email_prefers_handle() {
        let id = Uuid::new_v4();
        assert_eq!(internal_email(Some("avery"), id), "avery@users.nreduce.com");
        assert_eq!(internal_email(None, id), format!("{id}@users.nreduce.com"));
    }

    #[test]
    fn chat_names_are_qualified() {
        assert_eq!(
            chat_display_name(Some("Avery Lee"), None, Some("Acme Robotics")),
            "Avery Lee | Acme Robotics"
        );
        assert_eq!(chat_display_name(None, Some("@jules"), None), "jules S12");
        assert_eq!(chat_display_name(Some("Kiara Patel"), None, None), "Kiara Patel");
    }
}
