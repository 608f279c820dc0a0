use crate::server::{
    Result, ServerError, ServerRouter,
    auth::AuthenticatedUser,
    json::Json,
    multipart::Multipart,
    routes::{MessageResponse, photo_response},
};
use axum::{
    extract::State,
    response::{IntoResponse, Response},
};
use axum_extra::routing::{RouterExt, TypedPath};
use murmur_common::model::{
    Id, ModelValidationError, Photo,
    credential::{Password, StoredCredential},
    user::{
        AboutUpdate, CreateUser, Email, UpdateUser, User, UserListing, UserMarker, UserName,
        UserSummary,
    },
};
use murmur_db::client::DbClient;
use serde::Deserialize;
use std::sync::Arc;

static DEFAULT_AVATAR: &[u8] = include_bytes!("../../../assets/default-avatar.png");

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_post(create_user)
        .typed_get(list_users)
        .typed_get(get_user)
        .typed_put(update_user)
        .typed_delete(delete_user)
        .typed_get(get_user_photo)
        .typed_get(get_default_photo)
        .typed_put(follow)
        .typed_put(unfollow)
        .typed_get(find_people)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/users", rejection(ServerError))]
struct UsersPath();

async fn create_user(
    UsersPath(): UsersPath,
    State(db): State<Arc<DbClient>>,
    Json(request): Json<CreateUser>,
) -> Result<Json<MessageResponse>> {
    let credential = StoredCredential::derive(&request.password)?;
    db.create_user(&request, &credential).await?;

    Ok(Json(MessageResponse {
        message: "Successfully signed up!",
    }))
}

async fn list_users(
    UsersPath(): UsersPath,
    State(db): State<Arc<DbClient>>,
) -> Result<Json<Vec<UserListing>>> {
    Ok(Json(db.list_users().await?))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/users/{id}", rejection(ServerError))]
struct UserPath {
    id: Id<UserMarker>,
}

async fn get_user(
    UserPath { id }: UserPath,
    State(db): State<Arc<DbClient>>,
    _user: AuthenticatedUser,
) -> Result<Json<User>> {
    let user = db
        .fetch_user(id)
        .await?
        .ok_or(ServerError::UserByIdNotFound(id))?;

    Ok(Json(user))
}

/// Profile edit; multipart so a photo can ride along with the field
/// changes. Only the account owner may call this.
async fn update_user(
    UserPath { id }: UserPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
    multipart: Multipart,
) -> Result<Json<User>> {
    if user.user_id() != id {
        return Err(ServerError::NotAuthorized);
    }

    let form = UpdateForm::read(multipart).await?;
    let credential = form
        .password
        .as_ref()
        .map(StoredCredential::derive)
        .transpose()?;

    let updated = db
        .update_user(id, &form.update, credential.as_ref(), form.photo.as_ref())
        .await?
        .ok_or(ServerError::UserByIdNotFound(id))?;

    Ok(Json(updated))
}

/// Deletes the account and returns the removed profile. Posts are removed
/// with the account; see the schema for what cascades.
async fn delete_user(
    UserPath { id }: UserPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
) -> Result<Json<User>> {
    if user.user_id() != id {
        return Err(ServerError::NotAuthorized);
    }

    let profile = db
        .fetch_user(id)
        .await?
        .ok_or(ServerError::UserByIdNotFound(id))?;
    db.delete_user(id).await?;

    Ok(Json(profile))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/users/photo/{id}", rejection(ServerError))]
struct UserPhotoPath {
    id: Id<UserMarker>,
}

async fn get_user_photo(
    UserPhotoPath { id }: UserPhotoPath,
    State(db): State<Arc<DbClient>>,
) -> Result<Response> {
    match db.fetch_user_photo(id).await? {
        Some(photo) => Ok(photo_response(photo)),
        None => Ok(default_avatar_response()),
    }
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/users/defaultphoto", rejection(ServerError))]
struct DefaultPhotoPath();

async fn get_default_photo(DefaultPhotoPath(): DefaultPhotoPath) -> Response {
    default_avatar_response()
}

fn default_avatar_response() -> Response {
    (
        [(axum::http::header::CONTENT_TYPE, "image/png")],
        DEFAULT_AVATAR,
    )
        .into_response()
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/users/follow", rejection(ServerError))]
struct FollowPath();

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
struct FollowRequest {
    follow_id: Id<UserMarker>,
}

/// Adds the follow edge from the authenticated user to `follow_id` and
/// returns the updated profile with its follow lists.
async fn follow(
    FollowPath(): FollowPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
    Json(request): Json<FollowRequest>,
) -> Result<Json<User>> {
    if request.follow_id == user.user_id() {
        return Err(ServerError::SelfFollow);
    }
    if !db.user_exists(request.follow_id).await? {
        return Err(ServerError::UserByIdNotFound(request.follow_id));
    }

    db.follow(user.user_id(), request.follow_id).await?;

    let profile = db
        .fetch_user(user.user_id())
        .await?
        .ok_or(ServerError::UserByIdNotFound(user.user_id()))?;
    Ok(Json(profile))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/users/unfollow", rejection(ServerError))]
struct UnfollowPath();

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
struct UnfollowRequest {
    unfollow_id: Id<UserMarker>,
}

async fn unfollow(
    UnfollowPath(): UnfollowPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
    Json(request): Json<UnfollowRequest>,
) -> Result<Json<User>> {
    db.unfollow(user.user_id(), request.unfollow_id).await?;

    let profile = db
        .fetch_user(user.user_id())
        .await?
        .ok_or(ServerError::UserByIdNotFound(user.user_id()))?;
    Ok(Json(profile))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/users/findpeople/{id}", rejection(ServerError))]
struct FindPeoplePath {
    id: Id<UserMarker>,
}

/// Users the given user does not follow yet, themselves excluded.
async fn find_people(
    FindPeoplePath { id }: FindPeoplePath,
    State(db): State<Arc<DbClient>>,
    _user: AuthenticatedUser,
) -> Result<Json<Vec<UserSummary>>> {
    if !db.user_exists(id).await? {
        return Err(ServerError::UserByIdNotFound(id));
    }

    Ok(Json(db.find_people(id).await?))
}

#[derive(Default)]
struct UpdateForm {
    update: UpdateUser,
    password: Option<Password>,
    photo: Option<Photo>,
}

impl UpdateForm {
    async fn read(Multipart(mut multipart): Multipart) -> Result<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_owned) else {
                continue;
            };

            match name.as_str() {
                "name" => {
                    let name = UserName::new(field.text().await?)
                        .map_err(ModelValidationError::from)?;
                    form.update.name = Some(name);
                }
                "email" => {
                    let email =
                        Email::new(field.text().await?).map_err(ModelValidationError::from)?;
                    form.update.email = Some(email);
                }
                "about" => {
                    // A blank field clears the bio; there is no other way to
                    // send "no bio" through a form.
                    let text = field.text().await?;
                    form.update.about = Some(if text.trim().is_empty() {
                        AboutUpdate::Clear
                    } else {
                        AboutUpdate::Set(text)
                    });
                }
                "password" => {
                    let password = Password::new(field.text().await?)
                        .map_err(ModelValidationError::from)?;
                    form.password = Some(password);
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
