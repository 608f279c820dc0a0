use crate::record::{
    CommentRow, CredentialRow, PhotoRow, PostRow, SessionRow, UserRow, UserSummaryRow,
};
use murmur_common::model::{
    Id, ModelValidationError, Photo,
    auth::{AuthTokenHash, InvalidAuthTokenHashError, Session},
    credential::{InvalidCredentialPartsError, StoredCredential},
    post::{Comment, CommentMarker, CommentText, Post, PostMarker, PostText},
    user::{
        AboutUpdate, CreateUser, Email, UpdateUser, User, UserListing, UserMarker, UserName,
        UserSummary,
    },
};
use sqlx::{PgPool, error::ErrorKind, query, query_as, query_scalar};
use time::OffsetDateTime;
use uuid::Uuid;

pub type Result<T, E = DbError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error("A stored credential was malformed: {0}")]
    Credential(#[from] InvalidCredentialPartsError),
    #[error("A stored token hash was malformed: {0}")]
    TokenHash(#[from] InvalidAuthTokenHashError),
    #[error("Email already exists")]
    DuplicateEmail,
    #[error("A referenced user or post does not exist")]
    MissingReference,
    #[error("A row may not reference itself")]
    SelfReference,
    #[error("Running migrations failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error(transparent)]
    Sqlx(sqlx::Error),
}

impl From<sqlx::Error> for DbError {
    fn from(value: sqlx::Error) -> Self {
        if let sqlx::Error::Database(database_error) = &value {
            match database_error.kind() {
                ErrorKind::UniqueViolation => return DbError::DuplicateEmail,
                ErrorKind::ForeignKeyViolation => return DbError::MissingReference,
                ErrorKind::CheckViolation => return DbError::SelfReference,
                _ => {}
            }
        }

        DbError::Sqlx(value)
    }
}

impl From<crate::record::CredentialRowError> for DbError {
    fn from(value: crate::record::CredentialRowError) -> Self {
        match value {
            crate::record::CredentialRowError::Data(err) => DbError::Data(err),
            crate::record::CredentialRowError::Credential(err) => DbError::Credential(err),
        }
    }
}

#[derive(Debug)]
pub struct DbClient {
    pool: PgPool,
}

impl DbClient {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!().run(&self.pool).await?;
        Ok(())
    }

    // --- users ---

    pub async fn create_user(
        &self,
        user: &CreateUser,
        credential: &StoredCredential,
    ) -> Result<Id<UserMarker>> {
        let user_id = Id::<UserMarker>::random();

        query(
            "
            INSERT INTO users (user_id, name, email, salt, password_hash, about)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(user_id.uuid())
        .bind(user.name.get())
        .bind(user.email.get())
        .bind(credential.salt())
        .bind(credential.hash())
        .bind(user.about.as_deref())
        .execute(&self.pool)
        .await?;

        Ok(user_id)
    }

    pub async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>> {
        let row = query_as::<_, UserRow>(
            "
            SELECT user_id, name, email, about, created, updated
            FROM users
            WHERE user_id = $1
            ",
        )
        .bind(user_id.uuid())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let following = self.following_of(user_id).await?;
        let followers = self.followers_of(user_id).await?;

        Ok(Some(User {
            id: row.user_id.into(),
            name: UserName::new(row.name).map_err(ModelValidationError::from)?,
            email: Email::new(row.email).map_err(ModelValidationError::from)?,
            about: row.about,
            created: row.created.to_utc(),
            updated: row.updated.map(OffsetDateTime::to_utc),
            following,
            followers,
        }))
    }

    pub async fn list_users(&self) -> Result<Vec<UserListing>> {
        let rows = query_as::<_, UserRow>(
            "
            SELECT user_id, name, email, about, created, updated
            FROM users
            ORDER BY created
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| UserListing::try_from(row).map_err(DbError::from))
            .collect()
    }

    pub async fn fetch_credential_by_email(
        &self,
        email: &str,
    ) -> Result<Option<(UserSummary, StoredCredential)>> {
        let row = query_as::<_, CredentialRow>(
            "
            SELECT user_id, name, email, salt, password_hash
            FROM users
            WHERE email = $1
            ",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        let parsed = row
            .map(<(UserSummary, StoredCredential)>::try_from)
            .transpose()?;
        Ok(parsed)
    }

    pub async fn update_user(
        &self,
        user_id: Id<UserMarker>,
        update: &UpdateUser,
        credential: Option<&StoredCredential>,
        photo: Option<&Photo>,
    ) -> Result<Option<User>> {
        let about = match &update.about {
            Some(AboutUpdate::Set(text)) => Some(text.as_str()),
            Some(AboutUpdate::Clear) | None => None,
        };

        let result = query(
            "
            UPDATE users SET
                name = COALESCE($2, name),
                email = COALESCE($3, email),
                about = CASE WHEN $4 THEN NULL ELSE COALESCE($5, about) END,
                salt = COALESCE($6, salt),
                password_hash = COALESCE($7, password_hash),
                photo_data = COALESCE($8, photo_data),
                photo_content_type = COALESCE($9, photo_content_type),
                updated = $10
            WHERE user_id = $1
            ",
        )
        .bind(user_id.uuid())
        .bind(update.name.as_ref().map(|name| name.get().to_owned()))
        .bind(update.email.as_ref().map(|email| email.get().to_owned()))
        .bind(matches!(update.about, Some(AboutUpdate::Clear)))
        .bind(about)
        .bind(credential.map(|credential| credential.salt().to_vec()))
        .bind(credential.map(|credential| credential.hash().to_vec()))
        .bind(photo.map(|photo| photo.data.clone()))
        .bind(photo.map(|photo| photo.content_type.clone()))
        .bind(OffsetDateTime::now_utc())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.fetch_user(user_id).await
    }

    /// Deletes the account. Follow edges, sessions, posts and engagement
    /// rows go with it through the foreign key cascades, so no partial
    /// state can be observed.
    pub async fn delete_user(&self, user_id: Id<UserMarker>) -> Result<bool> {
        let result = query("DELETE FROM users WHERE user_id = $1")
            .bind(user_id.uuid())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn user_exists(&self, user_id: Id<UserMarker>) -> Result<bool> {
        let exists = query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM users WHERE user_id = $1)")
            .bind(user_id.uuid())
            .fetch_one(&self.pool)
            .await?;

        Ok(exists)
    }

    pub async fn fetch_user_photo(&self, user_id: Id<UserMarker>) -> Result<Option<Photo>> {
        let row = query_as::<_, PhotoRow>(
            "SELECT photo_data, photo_content_type FROM users WHERE user_id = $1",
        )
        .bind(user_id.uuid())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.and_then(Option::from))
    }

    // --- social graph ---

    /// Records the follow edge. A single row carries both directions of the
    /// relationship, so the `following`/`followers` views stay consistent
    /// by construction. Re-following is a no-op.
    pub async fn follow(
        &self,
        follower: Id<UserMarker>,
        followee: Id<UserMarker>,
    ) -> Result<()> {
        query(
            "
            INSERT INTO follows (follower, followee)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            ",
        )
        .bind(follower.uuid())
        .bind(followee.uuid())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Removes the follow edge; a no-op if it does not exist.
    pub async fn unfollow(
        &self,
        follower: Id<UserMarker>,
        followee: Id<UserMarker>,
    ) -> Result<()> {
        query("DELETE FROM follows WHERE follower = $1 AND followee = $2")
            .bind(follower.uuid())
            .bind(followee.uuid())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn following_of(&self, user_id: Id<UserMarker>) -> Result<Vec<UserSummary>> {
        let rows = query_as::<_, UserSummaryRow>(
            "
            SELECT users.user_id, users.name, users.email
            FROM follows JOIN users ON users.user_id = follows.followee
            WHERE follows.follower = $1
            ORDER BY follows.created
            ",
        )
        .bind(user_id.uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| UserSummary::try_from(row).map_err(DbError::from))
            .collect()
    }

    pub async fn followers_of(&self, user_id: Id<UserMarker>) -> Result<Vec<UserSummary>> {
        let rows = query_as::<_, UserSummaryRow>(
            "
            SELECT users.user_id, users.name, users.email
            FROM follows JOIN users ON users.user_id = follows.follower
            WHERE follows.followee = $1
            ORDER BY follows.created
            ",
        )
        .bind(user_id.uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| UserSummary::try_from(row).map_err(DbError::from))
            .collect()
    }

    /// Everyone except the user themselves and the people they already
    /// follow.
    pub async fn find_people(&self, user_id: Id<UserMarker>) -> Result<Vec<UserSummary>> {
        let rows = query_as::<_, UserSummaryRow>(
            "
            SELECT user_id, name, email
            FROM users
            WHERE user_id <> $1
              AND user_id NOT IN (SELECT followee FROM follows WHERE follower = $1)
            ORDER BY name
            ",
        )
        .bind(user_id.uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| UserSummary::try_from(row).map_err(DbError::from))
            .collect()
    }

    // --- posts ---

    pub async fn create_post(
        &self,
        owner: Id<UserMarker>,
        text: &PostText,
        photo: Option<&Photo>,
    ) -> Result<Id<PostMarker>> {
        let post_id = Id::<PostMarker>::random();

        query(
            "
            INSERT INTO posts (post_id, owner_id, text, photo_data, photo_content_type)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(post_id.uuid())
        .bind(owner.uuid())
        .bind(text.get())
        .bind(photo.map(|photo| photo.data.clone()))
        .bind(photo.map(|photo| photo.content_type.clone()))
        .execute(&self.pool)
        .await?;

        Ok(post_id)
    }

    pub async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        let row = query_as::<_, PostRow>(
            "
            SELECT
                posts.post_id, posts.text, posts.created,
                users.user_id AS owner_id,
                users.name AS owner_name,
                users.email AS owner_email
            FROM posts JOIN users ON users.user_id = posts.owner_id
            WHERE posts.post_id = $1
            ",
        )
        .bind(post_id.uuid())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        self.hydrate_post(row).await.map(Some)
    }

    pub async fn fetch_post_owner(
        &self,
        post_id: Id<PostMarker>,
    ) -> Result<Option<Id<UserMarker>>> {
        let owner = query_scalar::<_, Uuid>("SELECT owner_id FROM posts WHERE post_id = $1")
            .bind(post_id.uuid())
            .fetch_optional(&self.pool)
            .await?;

        Ok(owner.map(Id::new))
    }

    pub async fn delete_post(&self, post_id: Id<PostMarker>) -> Result<bool> {
        let result = query("DELETE FROM posts WHERE post_id = $1")
            .bind(post_id.uuid())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn fetch_post_photo(&self, post_id: Id<PostMarker>) -> Result<Option<Photo>> {
        let row = query_as::<_, PhotoRow>(
            "SELECT photo_data, photo_content_type FROM posts WHERE post_id = $1",
        )
        .bind(post_id.uuid())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.and_then(Option::from))
    }

    /// Posts authored by everyone `user_id` follows, newest first. The
    /// user's own posts are excluded by construction: self-edges cannot
    /// exist in the follows table.
    pub async fn newsfeed(&self, user_id: Id<UserMarker>) -> Result<Vec<Post>> {
        let rows = query_as::<_, PostRow>(
            "
            SELECT
                posts.post_id, posts.text, posts.created,
                users.user_id AS owner_id,
                users.name AS owner_name,
                users.email AS owner_email
            FROM posts JOIN users ON users.user_id = posts.owner_id
            WHERE posts.owner_id IN (SELECT followee FROM follows WHERE follower = $1)
            ORDER BY posts.created DESC
            ",
        )
        .bind(user_id.uuid())
        .fetch_all(&self.pool)
        .await?;

        self.hydrate_posts(rows).await
    }

    /// All posts owned by one user, newest first.
    pub async fn posts_by(&self, user_id: Id<UserMarker>) -> Result<Vec<Post>> {
        let rows = query_as::<_, PostRow>(
            "
            SELECT
                posts.post_id, posts.text, posts.created,
                users.user_id AS owner_id,
                users.name AS owner_name,
                users.email AS owner_email
            FROM posts JOIN users ON users.user_id = posts.owner_id
            WHERE posts.owner_id = $1
            ORDER BY posts.created DESC
            ",
        )
        .bind(user_id.uuid())
        .fetch_all(&self.pool)
        .await?;

        self.hydrate_posts(rows).await
    }

    // --- likes & comments ---

    /// Adds the like; a no-op if the user already likes the post.
    pub async fn like(&self, user_id: Id<UserMarker>, post_id: Id<PostMarker>) -> Result<()> {
        query(
            "
            INSERT INTO likes (post_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            ",
        )
        .bind(post_id.uuid())
        .bind(user_id.uuid())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn unlike(&self, user_id: Id<UserMarker>, post_id: Id<PostMarker>) -> Result<()> {
        query("DELETE FROM likes WHERE post_id = $1 AND user_id = $2")
            .bind(post_id.uuid())
            .bind(user_id.uuid())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn create_comment(
        &self,
        post_id: Id<PostMarker>,
        author: Id<UserMarker>,
        text: &CommentText,
    ) -> Result<Id<CommentMarker>> {
        let comment_id = Id::<CommentMarker>::random();

        query(
            "
            INSERT INTO comments (comment_id, post_id, author_id, text)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(comment_id.uuid())
        .bind(post_id.uuid())
        .bind(author.uuid())
        .bind(text.get())
        .execute(&self.pool)
        .await?;

        Ok(comment_id)
    }

    /// Returns (post id, author id) for the guard checks on removal.
    pub async fn fetch_comment_refs(
        &self,
        comment_id: Id<CommentMarker>,
    ) -> Result<Option<(Id<PostMarker>, Id<UserMarker>)>> {
        let refs = query_as::<_, (Uuid, Uuid)>(
            "SELECT post_id, author_id FROM comments WHERE comment_id = $1",
        )
        .bind(comment_id.uuid())
        .fetch_optional(&self.pool)
        .await?;

        Ok(refs.map(|(post_id, author_id)| (Id::new(post_id), Id::new(author_id))))
    }

    pub async fn delete_comment(&self, comment_id: Id<CommentMarker>) -> Result<bool> {
        let result = query("DELETE FROM comments WHERE comment_id = $1")
            .bind(comment_id.uuid())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // --- sessions ---

    pub async fn create_session(&self, session: &Session) -> Result<()> {
        query(
            "
            INSERT INTO sessions (token_hash, user_id, created, expires_after_seconds)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(session.token_hash.0.to_vec())
        .bind(session.user.uuid())
        .bind(OffsetDateTime::from(session.created_at))
        .bind(session.expires_after.map(time::Duration::whole_seconds))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn fetch_session(&self, token_hash: &AuthTokenHash) -> Result<Option<Session>> {
        let row = query_as::<_, SessionRow>(
            "
            SELECT token_hash, user_id, created, expires_after_seconds
            FROM sessions
            WHERE token_hash = $1
            ",
        )
        .bind(token_hash.0.to_vec())
        .fetch_optional(&self.pool)
        .await?;

        let session = row.map(Session::try_from).transpose()?;
        Ok(session)
    }

    pub async fn delete_session(&self, token_hash: &AuthTokenHash) -> Result<()> {
        query("DELETE FROM sessions WHERE token_hash = $1")
            .bind(token_hash.0.to_vec())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn hydrate_posts(&self, rows: Vec<PostRow>) -> Result<Vec<Post>> {
        let mut posts = Vec::with_capacity(rows.len());
        for row in rows {
            posts.push(self.hydrate_post(row).await?);
        }

        Ok(posts)
    }

    async fn hydrate_post(&self, row: PostRow) -> Result<Post> {
        let likes = query_scalar::<_, Uuid>(
            "SELECT user_id FROM likes WHERE post_id = $1 ORDER BY created",
        )
        .bind(row.post_id)
        .fetch_all(&self.pool)
        .await?;

        let comment_rows = query_as::<_, CommentRow>(
            "
            SELECT
                comments.comment_id, comments.text, comments.created,
                users.user_id AS author_id,
                users.name AS author_name,
                users.email AS author_email
            FROM comments JOIN users ON users.user_id = comments.author_id
            WHERE comments.post_id = $1
            ORDER BY comments.created
            ",
        )
        .bind(row.post_id)
        .fetch_all(&self.pool)
        .await?;

        let comments = comment_rows
            .into_iter()
            .map(|comment_row| Comment::try_from(comment_row).map_err(DbError::from))
            .collect::<Result<Vec<_>>>()?;

        Ok(Post {
            id: row.post_id.into(),
            owner: row.owner()?,
            text: row.text()?,
            created: row.created.to_utc(),
            likes: likes.into_iter().map(Id::new).collect(),
            comments,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::client::{DbClient, DbError};
    use murmur_common::model::{
        Id,
        credential::{Password, StoredCredential},
        post::{PostMarker, PostText},
        user::{AboutUpdate, CreateUser, Email, UpdateUser, UserMarker, UserName},
    };
    use sqlx::PgPool;
    use std::{thread, time::Duration};

    async fn signed_up(db: &DbClient, name: &str, email: &str) -> Id<UserMarker> {
        let user = CreateUser {
            name: UserName::new(name.to_owned()).unwrap(),
            email: Email::new(email.to_owned()).unwrap(),
            password: Password::new("secret1".to_owned()).unwrap(),
            about: None,
        };
        let credential = StoredCredential::derive(&user.password).unwrap();

        db.create_user(&user, &credential).await.unwrap()
    }

    async fn posted(db: &DbClient, owner: Id<UserMarker>, text: &str) -> Id<PostMarker> {
        // Timestamps order the feed; keep consecutive posts apart.
        thread::sleep(Duration::from_millis(2));
        db.create_post(owner, &PostText::new(text.to_owned()).unwrap(), None)
            .await
            .unwrap()
    }

    #[sqlx::test]
    async fn follow_then_unfollow_round_trips(pool: PgPool) {
        let db = DbClient::new(pool);
        let alice = signed_up(&db, "alice", "alice@x.com").await;
        let bob = signed_up(&db, "bob", "bob@x.com").await;

        db.follow(alice, bob).await.unwrap();
        // Re-following is a no-op.
        db.follow(alice, bob).await.unwrap();

        let following: Vec<_> = db
            .following_of(alice)
            .await
            .unwrap()
            .into_iter()
            .map(|user| user.id)
            .collect();
        assert_eq!(following, vec![bob]);
        let followers: Vec<_> = db
            .followers_of(bob)
            .await
            .unwrap()
            .into_iter()
            .map(|user| user.id)
            .collect();
        assert_eq!(followers, vec![alice]);
        assert!(db.followers_of(alice).await.unwrap().is_empty());
        assert!(db.following_of(bob).await.unwrap().is_empty());

        db.unfollow(alice, bob).await.unwrap();
        assert!(db.following_of(alice).await.unwrap().is_empty());
        assert!(db.followers_of(bob).await.unwrap().is_empty());
    }

    #[sqlx::test]
    async fn self_follow_is_rejected(pool: PgPool) {
        let db = DbClient::new(pool);
        let alice = signed_up(&db, "alice", "alice@x.com").await;

        assert!(matches!(
            db.follow(alice, alice).await,
            Err(DbError::SelfReference)
        ));
        assert!(db.following_of(alice).await.unwrap().is_empty());
    }

    #[sqlx::test]
    async fn newsfeed_is_followed_posts_newest_first(pool: PgPool) {
        let db = DbClient::new(pool);
        let alice = signed_up(&db, "alice", "alice@x.com").await;
        let bob = signed_up(&db, "bob", "bob@x.com").await;
        let carol = signed_up(&db, "carol", "carol@x.com").await;

        db.follow(alice, bob).await.unwrap();

        posted(&db, alice, "my own post").await;
        let first = posted(&db, bob, "first").await;
        let second = posted(&db, bob, "second").await;
        posted(&db, carol, "from a stranger").await;

        let feed: Vec<_> = db
            .newsfeed(alice)
            .await
            .unwrap()
            .into_iter()
            .map(|post| post.id)
            .collect();
        assert_eq!(feed, vec![second, first]);
    }

    #[sqlx::test]
    async fn update_clears_about_when_asked(pool: PgPool) {
        let db = DbClient::new(pool);
        let alice = signed_up(&db, "alice", "alice@x.com").await;

        let set = UpdateUser {
            about: Some(AboutUpdate::Set("climbing".to_owned())),
            ..UpdateUser::default()
        };
        let user = db.update_user(alice, &set, None, None).await.unwrap().unwrap();
        assert_eq!(user.about.as_deref(), Some("climbing"));

        // An update without the field keeps the stored bio.
        let keep = UpdateUser::default();
        let user = db.update_user(alice, &keep, None, None).await.unwrap().unwrap();
        assert_eq!(user.about.as_deref(), Some("climbing"));

        let clear = UpdateUser {
            about: Some(AboutUpdate::Clear),
            ..UpdateUser::default()
        };
        let user = db.update_user(alice, &clear, None, None).await.unwrap().unwrap();
        assert_eq!(user.about, None);
    }
}
