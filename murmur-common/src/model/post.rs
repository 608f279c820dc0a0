use crate::model::{
    Id,
    user::{UserMarker, UserSummary},
};
use serde::{Deserialize, Deserializer, Serialize, de::Error};
use thiserror::Error;
use time::UtcDateTime;

pub const POST_TEXT_MAX_LEN: usize = 5000;
pub const COMMENT_TEXT_MAX_LEN: usize = 1000;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct CommentMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct Post {
    pub id: Id<PostMarker>,
    pub owner: UserSummary,
    pub text: PostText,
    pub created: UtcDateTime,
    /// Ids of the users who liked this post; set semantics, no duplicates.
    pub likes: Vec<Id<UserMarker>>,
    pub comments: Vec<Comment>,
}

/// A comment carries its own generated id so removal can be keyed on it
/// instead of matching content.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct Comment {
    pub id: Id<CommentMarker>,
    pub author: UserSummary,
    pub text: CommentText,
    pub created: UtcDateTime,
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct PostText(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
pub enum InvalidPostTextError {
    #[default]
    #[error("Text is required")]
    Missing,
    #[error("Text must be at most {POST_TEXT_MAX_LEN} characters")]
    TooLong,
}

impl PostText {
    pub fn new(text: String) -> Result<Self, InvalidPostTextError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            Err(InvalidPostTextError::Missing)
        } else if trimmed.chars().count() > POST_TEXT_MAX_LEN {
            Err(InvalidPostTextError::TooLong)
        } else {
            Ok(Self(trimmed.to_owned()))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for PostText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        PostText::new(inner).map_err(Error::custom)
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct CommentText(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
pub enum InvalidCommentTextError {
    #[default]
    #[error("Comment text is required")]
    Missing,
    #[error("Comment text must be at most {COMMENT_TEXT_MAX_LEN} characters")]
    TooLong,
}

impl CommentText {
    pub fn new(text: String) -> Result<Self, InvalidCommentTextError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            Err(InvalidCommentTextError::Missing)
        } else if trimmed.chars().count() > COMMENT_TEXT_MAX_LEN {
            Err(InvalidCommentTextError::TooLong)
        } else {
            Ok(Self(trimmed.to_owned()))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for CommentText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        CommentText::new(inner).map_err(Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use crate::model::post::{
        CommentText, InvalidCommentTextError, InvalidPostTextError, POST_TEXT_MAX_LEN, PostText,
    };

    #[test]
    fn post_text_rules() {
        assert_eq!(PostText::new("  hello  ".to_owned()).unwrap().get(), "hello");
        assert_eq!(
            PostText::new("   ".to_owned()),
            Err(InvalidPostTextError::Missing)
        );
        assert_eq!(
            PostText::new("x".repeat(POST_TEXT_MAX_LEN + 1)),
            Err(InvalidPostTextError::TooLong)
        );
    }

    #[test]
    fn comment_text_rules() {
        assert!(CommentText::new("nice".to_owned()).is_ok());
        assert_eq!(
            CommentText::new(String::new()),
            Err(InvalidCommentTextError::Missing)
        );
    }

    #[test]
    fn blank_post_text_fails_deserialization() {
        let result: Result<PostText, _> = serde_json::from_str("\"  \"");
        assert!(result.is_err());
    }
}
