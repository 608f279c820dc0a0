pub mod auth;
pub mod credential;
pub mod post;
pub mod user;

use crate::model::{
    credential::{InvalidCredentialPartsError, InvalidPasswordError},
    post::{InvalidCommentTextError, InvalidPostTextError},
    user::{InvalidEmailError, InvalidUserNameError},
};
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Debug, Display, Formatter},
    marker::PhantomData,
    str::FromStr,
};
use thiserror::Error;
use uuid::Uuid;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Error)]
pub enum ModelValidationError {
    #[error(transparent)]
    UserName(#[from] InvalidUserNameError),
    #[error(transparent)]
    Email(#[from] InvalidEmailError),
    #[error(transparent)]
    Password(#[from] InvalidPasswordError),
    #[error(transparent)]
    Credential(#[from] InvalidCredentialPartsError),
    #[error(transparent)]
    PostText(#[from] InvalidPostTextError),
    #[error(transparent)]
    CommentText(#[from] InvalidCommentTextError),
}

/// Strongly typed UUID so user, post and comment ids cannot be mixed up.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Id<Marker>(Uuid, #[serde(skip)] PhantomData<Marker>);

impl<Marker> Id<Marker> {
    #[must_use]
    pub fn new(uuid: Uuid) -> Self {
        Self(uuid, PhantomData)
    }

    #[must_use]
    pub fn random() -> Self {
        Self::new(Uuid::new_v4())
    }

    #[must_use]
    pub fn uuid(self) -> Uuid {
        self.0
    }
}

impl<Marker> Display for Id<Marker> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<Marker> From<Uuid> for Id<Marker> {
    fn from(value: Uuid) -> Self {
        Self::new(value)
    }
}

impl<Marker> From<Id<Marker>> for Uuid {
    fn from(value: Id<Marker>) -> Self {
        value.0
    }
}

impl<Marker> FromStr for Id<Marker> {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::from_str(s).map(Self::new)
    }
}

/// Binary image plus its content type, stored alongside a user or post.
///
/// Photos are served through dedicated routes and never appear in JSON
/// bodies, so this type carries no serde impls.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct Photo {
    pub data: Vec<u8>,
    pub content_type: String,
}

impl Debug for Photo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Photo")
            .field("content_type", &self.content_type)
            .field("data", &format_args!("{} bytes", self.data.len()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{Id, user::UserMarker};
    use uuid::Uuid;

    #[test]
    fn id_serde_is_transparent() {
        let uuid = Uuid::new_v4();
        let id = Id::<UserMarker>::new(uuid);

        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{uuid}\""));

        let parsed: Id<UserMarker> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn id_parses_from_str() {
        let id = Id::<UserMarker>::random();
        let parsed: Id<UserMarker> = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);

        assert!("not-a-uuid".parse::<Id<UserMarker>>().is_err());
    }
}
