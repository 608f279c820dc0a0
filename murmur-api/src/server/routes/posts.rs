use crate::server::{
    Result, ServerError, ServerRouter, auth::AuthenticatedUser, json::Json, multipart::Multipart,
    routes::photo_response,
};
use axum::{extract::State, response::Response};
use axum_extra::routing::{RouterExt, TypedPath};
use murmur_common::model::{
    Id, ModelValidationError, Photo,
    post::{CommentMarker, CommentText, InvalidPostTextError, Post, PostMarker, PostText},
    user::UserMarker,
};
use murmur_db::client::DbClient;
use serde::Deserialize;
use std::sync::Arc;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(feed)
        .typed_get(posts_by_user)
        .typed_post(create_post)
        .typed_delete(delete_post)
        .typed_get(get_post_photo)
        .typed_put(like)
        .typed_put(unlike)
        .typed_put(comment)
        .typed_put(uncomment)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/posts/feed/{user_id}", rejection(ServerError))]
struct FeedPath {
    user_id: Id<UserMarker>,
}

/// The newsfeed: posts from everyone `user_id` follows, newest first.
async fn feed(
    FeedPath { user_id }: FeedPath,
    State(db): State<Arc<DbClient>>,
    _user: AuthenticatedUser,
) -> Result<Json<Vec<Post>>> {
    if !db.user_exists(user_id).await? {
        return Err(ServerError::UserByIdNotFound(user_id));
    }

    Ok(Json(db.newsfeed(user_id).await?))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/posts/by/{user_id}", rejection(ServerError))]
struct PostsByUserPath {
    user_id: Id<UserMarker>,
}

async fn posts_by_user(
    PostsByUserPath { user_id }: PostsByUserPath,
    State(db): State<Arc<DbClient>>,
    _user: AuthenticatedUser,
) -> Result<Json<Vec<Post>>> {
    if !db.user_exists(user_id).await? {
        return Err(ServerError::UserByIdNotFound(user_id));
    }

    Ok(Json(db.posts_by(user_id).await?))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/posts/new/{user_id}", rejection(ServerError))]
struct NewPostPath {
    user_id: Id<UserMarker>,
}

/// Creates a post owned by the authenticated user; multipart with a `text`
/// field and an optional `photo` file.
async fn create_post(
    NewPostPath { user_id }: NewPostPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
    multipart: Multipart,
) -> Result<Json<Post>> {
    if user.user_id() != user_id {
        return Err(ServerError::NotAuthorized);
    }

    let form = NewPostForm::read(multipart).await?;
    let text = form.text.ok_or(ServerError::Validation(
        ModelValidationError::PostText(InvalidPostTextError::Missing),
    ))?;

    let post_id = db.create_post(user_id, &text, form.photo.as_ref()).await?;
    let post = db
        .fetch_post(post_id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(post_id))?;

    Ok(Json(post))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/posts/{id}", rejection(ServerError))]
struct PostPath {
    id: Id<PostMarker>,
}

/// Deletes a post and returns it; only its owner may do this.
async fn delete_post(
    PostPath { id }: PostPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
) -> Result<Json<Post>> {
    let post = db
        .fetch_post(id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;

    if post.owner.id != user.user_id() {
        return Err(ServerError::NotAuthorized);
    }

    db.delete_post(id).await?;

    Ok(Json(post))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/posts/photo/{id}", rejection(ServerError))]
struct PostPhotoPath {
    id: Id<PostMarker>,
}

async fn get_post_photo(
    PostPhotoPath { id }: PostPhotoPath,
    State(db): State<Arc<DbClient>>,
) -> Result<Response> {
    let photo = db
        .fetch_post_photo(id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;

    Ok(photo_response(photo))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/posts/like", rejection(ServerError))]
struct LikePath();

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
struct LikeRequest {
    post_id: Id<PostMarker>,
}

/// Adds the authenticated user to the post's likes; liking twice is a
/// no-op. Returns the updated post.
async fn like(
    LikePath(): LikePath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
    Json(request): Json<LikeRequest>,
) -> Result<Json<Post>> {
    db.like(user.user_id(), request.post_id).await?;

    let post = db
        .fetch_post(request.post_id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(request.post_id))?;
    Ok(Json(post))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/posts/unlike", rejection(ServerError))]
struct UnlikePath();

async fn unlike(
    UnlikePath(): UnlikePath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
    Json(request): Json<LikeRequest>,
) -> Result<Json<Post>> {
    db.unlike(user.user_id(), request.post_id).await?;

    let post = db
        .fetch_post(request.post_id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(request.post_id))?;
    Ok(Json(post))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/posts/comment", rejection(ServerError))]
struct CommentPath();

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
struct CommentRequest {
    post_id: Id<PostMarker>,
    text: CommentText,
}

async fn comment(
    CommentPath(): CommentPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
    Json(request): Json<CommentRequest>,
) -> Result<Json<Post>> {
    db.create_comment(request.post_id, user.user_id(), &request.text)
        .await?;

    let post = db
        .fetch_post(request.post_id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(request.post_id))?;
    Ok(Json(post))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/posts/uncomment", rejection(ServerError))]
struct UncommentPath();

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
struct UncommentRequest {
    comment_id: Id<CommentMarker>,
}

/// Removes a comment by its id; only the comment's author may do this.
async fn uncomment(
    UncommentPath(): UncommentPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
    Json(request): Json<UncommentRequest>,
) -> Result<Json<Post>> {
    let (post_id, author) = db
        .fetch_comment_refs(request.comment_id)
        .await?
        .ok_or(ServerError::CommentByIdNotFound(request.comment_id))?;

    if author != user.user_id() {
        return Err(ServerError::NotAuthorized);
    }

    db.delete_comment(request.comment_id).await?;

    let post = db
        .fetch_post(post_id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(post_id))?;
    Ok(Json(post))
}

#[derive(Default)]
struct NewPostForm {
    text: Option<PostText>,
    photo: Option<Photo>,
}

impl NewPostForm {
    async fn read(Multipart(mut multipart): Multipart) -> Result<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_owned) else {
                continue;
            };

            match name.as_str() {
                "text" => {
                    let text = PostText::new(field.text().await?)
                        .map_err(ModelValidationError::from)?;
                    form.text = Some(text);
                }
                "photo" => {
                    let content_type = field
                        .content_type()
                        .map_or_else(|| "application/octet-stream".to_owned(), str::to_owned);
                    form.photo = Some(Photo {
                        data: field.bytes().await?.to_vec(),
                        content_type,
                    });
                }
                _ => {}
            }
        }

        Ok(form)
    }
}
