use murmur_common::model::{
    ModelValidationError, Photo,
    auth::{AuthTokenHash, InvalidAuthTokenHashError, Session},
    credential::{InvalidCredentialPartsError, StoredCredential},
    post::{Comment, CommentText, PostText},
    user::{Email, UserListing, UserName, UserSummary},
};
use sqlx::FromRow;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

#[derive(Clone, Eq, PartialEq, Debug, FromRow)]
pub(crate) struct UserRow {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub about: Option<String>,
    pub created: OffsetDateTime,
    pub updated: Option<OffsetDateTime>,
}

#[derive(Clone, Eq, PartialEq, Debug, FromRow)]
pub(crate) struct UserSummaryRow {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
}

#[derive(Clone, Eq, PartialEq, Debug, FromRow)]
pub(crate) struct CredentialRow {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub salt: Vec<u8>,
    pub password_hash: Vec<u8>,
}

#[derive(Clone, Eq, PartialEq, Debug, FromRow)]
pub(crate) struct PostRow {
    pub post_id: Uuid,
    pub text: String,
    pub created: OffsetDateTime,
    pub owner_id: Uuid,
    pub owner_name: String,
    pub owner_email: String,
}

#[derive(Clone, Eq, PartialEq, Debug, FromRow)]
pub(crate) struct CommentRow {
    pub comment_id: Uuid,
    pub text: String,
    pub created: OffsetDateTime,
    pub author_id: Uuid,
    pub author_name: String,
    pub author_email: String,
}

#[derive(Clone, Eq, PartialEq, Debug, FromRow)]
pub(crate) struct PhotoRow {
    pub photo_data: Option<Vec<u8>>,
    pub photo_content_type: Option<String>,
}

#[derive(Clone, Eq, PartialEq, Debug, FromRow)]
pub(crate) struct SessionRow {
    pub token_hash: Vec<u8>,
    pub user_id: Uuid,
    pub created: OffsetDateTime,
    pub expires_after_seconds: Option<i64>,
}

impl TryFrom<UserSummaryRow> for UserSummary {
    type Error = ModelValidationError;

    fn try_from(value: UserSummaryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.user_id.into(),
            name: UserName::new(value.name)?,
            email: Email::new(value.email)?,
        })
    }
}

impl TryFrom<UserRow> for UserListing {
    type Error = ModelValidationError;

    fn try_from(value: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.user_id.into(),
            name: UserName::new(value.name)?,
            email: Email::new(value.email)?,
            created: value.created.to_utc(),
            updated: value.updated.map(OffsetDateTime::to_utc),
        })
    }
}

impl TryFrom<CredentialRow> for (UserSummary, StoredCredential) {
    type Error = CredentialRowError;

    fn try_from(value: CredentialRow) -> Result<Self, Self::Error> {
        let summary = UserSummary {
            id: value.user_id.into(),
            name: UserName::new(value.name).map_err(ModelValidationError::from)?,
            email: Email::new(value.email).map_err(ModelValidationError::from)?,
        };
        let credential = StoredCredential::from_parts(&value.salt, &value.password_hash)?;

        Ok((summary, credential))
    }
}

#[derive(Clone, Eq, PartialEq, Debug, thiserror::Error)]
pub(crate) enum CredentialRowError {
    #[error(transparent)]
    Data(#[from] ModelValidationError),
    #[error(transparent)]
    Credential(#[from] InvalidCredentialPartsError),
}

impl TryFrom<CommentRow> for Comment {
    type Error = ModelValidationError;

    fn try_from(value: CommentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.comment_id.into(),
            author: UserSummary {
                id: value.author_id.into(),
                name: UserName::new(value.author_name)?,
                email: Email::new(value.author_email)?,
            },
            text: CommentText::new(value.text)?,
            created: value.created.to_utc(),
        })
    }
}

impl PostRow {
    pub(crate) fn owner(&self) -> Result<UserSummary, ModelValidationError> {
        Ok(UserSummary {
            id: self.owner_id.into(),
            name: UserName::new(self.owner_name.clone())?,
            email: Email::new(self.owner_email.clone())?,
        })
    }

    pub(crate) fn text(&self) -> Result<PostText, ModelValidationError> {
        Ok(PostText::new(self.text.clone())?)
    }
}

impl From<PhotoRow> for Option<Photo> {
    fn from(value: PhotoRow) -> Self {
        match (value.photo_data, value.photo_content_type) {
            (Some(data), Some(content_type)) => Some(Photo { data, content_type }),
            _ => None,
        }
    }
}

impl TryFrom<SessionRow> for Session {
    type Error = InvalidAuthTokenHashError;

    fn try_from(value: SessionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            user: value.user_id.into(),
            token_hash: AuthTokenHash::try_from(value.token_hash.into_boxed_slice())?,
            created_at: value.created.to_utc(),
            expires_after: value.expires_after_seconds.map(Duration::seconds),
        })
    }
}
