use crate::server::ServerRouter;
use axum::{
    Router,
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};
use murmur_common::model::Photo;
use serde::Serialize;

mod auth;
mod posts;
mod users;

pub fn routes() -> ServerRouter {
    Router::new()
        .merge(auth::routes())
        .merge(users::routes())
        .merge(posts::routes())
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub(crate) struct MessageResponse {
    pub message: &'static str,
}

pub(crate) fn photo_response(photo: Photo) -> Response {
    let content_type = HeaderValue::from_str(&photo.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));

    ([(header::CONTENT_TYPE, content_type)], photo.data).into_response()
}

#[cfg(test)]
mod tests {
    use crate::server::{ServerState, SessionTtl};
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use murmur_common::model::{
        Id,
        auth::{AuthToken, Session},
        credential::{Password, StoredCredential},
        post::PostText,
        user::{CreateUser, Email, UserMarker, UserName},
    };
    use murmur_db::client::DbClient;
    use sqlx::PgPool;
    use std::sync::Arc;
    use time::{Duration, UtcDateTime};
    use tower::ServiceExt;

    fn app(db: &Arc<DbClient>) -> axum::Router {
        crate::server::routes().with_state(ServerState {
            db_client: Arc::clone(db),
            session_ttl: SessionTtl(None),
        })
    }

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

    async fn signed_in(
        db: &DbClient,
        user: Id<UserMarker>,
        created_at: UtcDateTime,
        ttl: Option<Duration>,
    ) -> String {
        let token = AuthToken::generate_random(user);
        let session = Session {
            user,
            token_hash: token.hash().unwrap(),
            created_at,
            expires_after: ttl,
        };
        db.create_session(&session).await.unwrap();

        token.as_token_str()
    }

    #[sqlx::test(migrations = "../murmur-db/migrations")]
    async fn profile_changes_by_another_user_are_forbidden(pool: PgPool) {
        let db = Arc::new(DbClient::new(pool));
        let app = app(&db);
        let alice = signed_up(&db, "alice", "alice@x.com").await;
        let bob = signed_up(&db, "bob", "bob@x.com").await;
        let token = signed_in(&db, alice, UtcDateTime::now(), None).await;

        let update = Request::builder()
            .method("PUT")
            .uri(format!("/api/users/{bob}"))
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(
                header::CONTENT_TYPE,
                "multipart/form-data; boundary=boundary",
            )
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(update).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let delete = Request::builder()
            .method("DELETE")
            .uri(format!("/api/users/{bob}"))
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(delete).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(String::from_utf8_lossy(&body).contains("User is not authorized"));

        assert!(db.fetch_user(bob).await.unwrap().is_some());
    }

    #[sqlx::test(migrations = "../murmur-db/migrations")]
    async fn deleting_anothers_post_is_forbidden(pool: PgPool) {
        let db = Arc::new(DbClient::new(pool));
        let app = app(&db);
        let alice = signed_up(&db, "alice", "alice@x.com").await;
        let bob = signed_up(&db, "bob", "bob@x.com").await;
        let token = signed_in(&db, alice, UtcDateTime::now(), None).await;
        let post = db
            .create_post(bob, &PostText::new("mine".to_owned()).unwrap(), None)
            .await
            .unwrap();

        let delete = Request::builder()
            .method("DELETE")
            .uri(format!("/api/posts/{post}"))
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(delete).await.unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(db.fetch_post(post).await.unwrap().is_some());
    }

    #[sqlx::test(migrations = "../murmur-db/migrations")]
    async fn expired_session_is_rejected_and_pruned(pool: PgPool) {
        let db = Arc::new(DbClient::new(pool));
        let app = app(&db);
        let alice = signed_up(&db, "alice", "alice@x.com").await;
        let token = signed_in(
            &db,
            alice,
            UtcDateTime::now() - Duration::hours(2),
            Some(Duration::hours(1)),
        )
        .await;

        let request = Request::builder()
            .uri(format!("/api/users/{alice}"))
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let token_hash = token.parse::<AuthToken>().unwrap().hash().unwrap();
        assert!(db.fetch_session(&token_hash).await.unwrap().is_none());
    }
}
