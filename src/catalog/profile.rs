use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api::models::{de_user_id, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(deserialize_with = "de_user_id")]
    pub id: UserId,
    #[serde(alias = "name")]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, alias = "phoneNumber")]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProfileError {
    #[error("name cannot be empty")]
    EmptyName,
    #[error("`{0}` is not a valid email address")]
    InvalidEmail(String),
    #[error("`{0}` is not a valid phone number (9 to 11 digits)")]
    InvalidPhone(String),
    #[error("nothing to update")]
    NothingToUpdate,
}

/// Edit form of the profile page; only set fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl ProfileUpdate {
    /// Trims every field and normalises the phone number to its digits.
    pub fn validate(self) -> Result<Self, ProfileError> {
        if self == Self::default() {
            return Err(ProfileError::NothingToUpdate);
        }
        let full_name = match self.full_name {
            Some(name) if name.trim().is_empty() => return Err(ProfileError::EmptyName),
            Some(name) => Some(name.trim().to_string()),
            None => None,
        };
        let email = match self.email {
            Some(email) => Some(validate_email(email.trim())?),
            None => None,
        };
        let phone = match self.phone {
            Some(phone) => Some(normalize_phone(&phone)?),
            None => None,
        };
        let address = self.address.map(|a| a.trim().to_string());
        Ok(Self {
            full_name,
            email,
            phone,
            address,
        })
    }
}

fn validate_email(email: &str) -> Result<String, ProfileError> {
    let invalid = || ProfileError::InvalidEmail(email.to_string());
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    let (host, tld) = domain.rsplit_once('.').ok_or_else(invalid)?;
    if host.is_empty() || tld.is_empty() || email.contains(char::is_whitespace) {
        return Err(invalid());
    }
    Ok(email.to_string())
}

fn normalize_phone(phone: &str) -> Result<String, ProfileError> {
    let trimmed = phone.trim();
    let (plus, rest) = match trimmed.strip_prefix('+') {
        Some(rest) => ("+", rest),
        None => ("", trimmed),
    };
    let digits: String = rest.chars().filter(|c| !matches!(c, ' ' | '-' | '.')).collect();
    if !(9..=11).contains(&digits.len()) || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(ProfileError::InvalidPhone(phone.to_string()));
    }
    Ok(format!("{plus}{digits}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_update_is_trimmed() {
        let update = ProfileUpdate {
            full_name: Some("  Tran Bao ".into()),
            email: Some(" bao@example.vn ".into()),
            phone: Some("090-123 4567".into()),
            address: None,
        }
        .validate()
        .unwrap();
        assert_eq!(update.full_name.as_deref(), Some("Tran Bao"));
        assert_eq!(update.email.as_deref(), Some("bao@example.vn"));
        assert_eq!(update.phone.as_deref(), Some("0901234567"));
    }

    #[test]
    fn bad_fields_are_rejected() {
        let name = ProfileUpdate { full_name: Some("   ".into()), ..Default::default() };
        assert_eq!(name.validate(), Err(ProfileError::EmptyName));

        for email in ["bao", "@x.vn", "bao@vn", "a@b@c.vn", "bao@.vn"] {
            let update = ProfileUpdate { email: Some(email.into()), ..Default::default() };
            assert!(matches!(update.validate(), Err(ProfileError::InvalidEmail(_))), "{email}");
        }

        for phone in ["12345", "09012345678901", "09x1234567"] {
            let update = ProfileUpdate { phone: Some(phone.into()), ..Default::default() };
            assert!(matches!(update.validate(), Err(ProfileError::InvalidPhone(_))), "{phone}");
        }
    }

    #[test]
    fn international_prefix_is_kept() {
        let update = ProfileUpdate { phone: Some("+84 901 234 567".into()), ..Default::default() };
        assert_eq!(update.validate().unwrap().phone.as_deref(), Some("+84901234567"));
    }

    #[test]
    fn empty_update_is_rejected() {
        assert_eq!(ProfileUpdate::default().validate(), Err(ProfileError::NothingToUpdate));
    }

    #[test]
    fn only_set_fields_are_serialized() {
        let update = ProfileUpdate { address: Some("Đà Nẵng".into()), ..Default::default() };
        assert_eq!(
            serde_json::to_value(update).unwrap(),
            serde_json::json!({ "address": "Đà Nẵng" })
        );
    }
}
