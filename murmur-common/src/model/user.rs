use crate::model::{Id, credential::Password};
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use thiserror::Error;
use time::UtcDateTime;

pub const USER_NAME_MAX_LEN: usize = 100;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct UserMarker;

/// A full profile as returned to clients.
///
/// Credential material (salt, password hash) lives in the database layer
/// only and has no field here, so it can never be serialized by accident.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct User {
    pub id: Id<UserMarker>,
    pub name: UserName,
    pub email: Email,
    pub about: Option<String>,
    pub created: UtcDateTime,
    pub updated: Option<UtcDateTime>,
    pub following: Vec<UserSummary>,
    pub followers: Vec<UserSummary>,
}

/// The public-safe shape embedded in posts, follow lists and the signin
/// response.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct UserSummary {
    pub id: Id<UserMarker>,
    pub name: UserName,
    pub email: Email,
}

/// One entry of the unauthenticated user listing: names, emails and
/// timestamps only.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct UserListing {
    pub id: Id<UserMarker>,
    pub name: UserName,
    pub email: Email,
    pub created: UtcDateTime,
    pub updated: Option<UtcDateTime>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
pub struct CreateUser {
    pub name: UserName,
    pub email: Email,
    pub password: Password,
    #[serde(default)]
    pub about: Option<String>,
}

/// Partial profile update; absent fields keep their stored value.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Default)]
pub struct UpdateUser {
    pub name: Option<UserName>,
    pub email: Option<Email>,
    pub about: Option<AboutUpdate>,
}

/// The bio is the one field that can be unset again, so its update
/// distinguishes clearing from leaving it alone.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub enum AboutUpdate {
    Set(String),
    Clear,
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct UserName(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
pub enum InvalidUserNameError {
    #[default]
    #[error("Name is required")]
    Missing,
    #[error("Name must be at most {USER_NAME_MAX_LEN} characters")]
    TooLong,
}

impl UserName {
    pub fn new(name: String) -> Result<Self, InvalidUserNameError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            Err(InvalidUserNameError::Missing)
        } else if trimmed.chars().count() > USER_NAME_MAX_LEN {
            Err(InvalidUserNameError::TooLong)
        } else {
            Ok(Self(trimmed.to_owned()))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl<'de> Deserialize<'de> for UserName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        UserName::new(inner).map_err(Error::custom)
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct Email(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("Please fill a valid email address")]
pub struct InvalidEmailError;

impl Email {
    /// Accepts addresses of the shape `local@domain.tld` with non-empty
    /// parts, mirroring the `.+@.+\..+` rule of the stored schema.
    pub fn new(email: String) -> Result<Self, InvalidEmailError> {
        let trimmed = email.trim();

        let (local, domain) = trimmed.split_once('@').ok_or(InvalidEmailError)?;
        let valid = !local.is_empty()
            && domain.contains('.')
            && domain.split('.').all(|part| !part.is_empty())
            && !trimmed.chars().any(char::is_whitespace);

        if valid {
            Ok(Self(trimmed.to_owned()))
        } else {
            Err(InvalidEmailError)
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl<'de> Deserialize<'de> for Email {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        Email::new(inner.clone())
            .map_err(|_| Error::invalid_value(Unexpected::Str(&inner), &"an email address"))
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{
        Id,
        user::{Email, InvalidUserNameError, UserName, UserSummary},
    };

    #[test]
    fn user_name_is_trimmed_and_bounded() {
        assert_eq!(UserName::new("  alice  ".to_owned()).unwrap().get(), "alice");
        assert_eq!(
            UserName::new("   ".to_owned()),
            Err(InvalidUserNameError::Missing)
        );
        assert_eq!(
            UserName::new("x".repeat(101)),
            Err(InvalidUserNameError::TooLong)
        );
    }

    #[test]
    fn email_shape() {
        for valid in ["alice@x.com", " bob@mail.example.org ", "a@b.c"] {
            assert!(Email::new(valid.to_owned()).is_ok(), "{valid}");
        }
        for invalid in ["", "alice", "alice@", "@x.com", "alice@x", "alice@.com", "alice@x.", "a b@x.com"] {
            assert!(Email::new(invalid.to_owned()).is_err(), "{invalid}");
        }
    }

    #[test]
    fn summary_serializes_without_credential_fields() {
        let summary = UserSummary {
            id: Id::random(),
            name: UserName::new("alice".to_owned()).unwrap(),
            email: Email::new("alice@x.com".to_owned()).unwrap(),
        };

        let json = serde_json::to_string(&summary).unwrap();
        assert!(!json.contains("password"));
        assert!(!json.contains("salt"));
        assert!(!json.contains("hash"));
    }
}
