// src/comments.rs

use actix_web::{http::header, web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde::Deserialize;

use crate::app_state::AppState;
use crate::auth::{current_user, session_id};
use crate::comment_cache::SaveOutcome;
use crate::error::{PortalError, Result};
use crate::models::profile::email_domain;
use crate::models::{Comment, CommentAuthor};
use crate::profiles::require_admin;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    pub text: String,
    /// Display name for anonymous visitors; signed-in users use their profile name.
    pub author_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FlagRequest {
    pub flagged: bool,
}

#[derive(Debug, Deserialize)]
pub struct RestoreRequest {
    pub key: String,
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub format: Option<String>,
}

fn comment_author(req: &HttpRequest, data: &AppState, fallback_name: Option<&str>) -> Result<CommentAuthor> {
    let session = session_id(req)?;
    let author = match current_user(req) {
        Ok(claims) => CommentAuthor {
            name: claims
                .name
                .clone()
                .unwrap_or_else(|| claims.email.split('@').next().unwrap_or_default().to_string()),
            is_institutional: email_domain(&claims.email) == data.config.corporate_domain,
            email: Some(claims.email),
            photo_url: claims.picture,
            session_id: session,
            uid: Some(claims.sub),
        },
        Err(_) => CommentAuthor {
            name: fallback_name
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .unwrap_or("Anônimo")
                .to_string(),
            email: None,
            photo_url: None,
            session_id: session,
            uid: None,
            is_institutional: false,
        },
    };
    Ok(author)
}

/// GET /suggestions/{id}/comments
pub async fn list_comments(data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse> {
    let comments = data.comments.load(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(comments.iter().map(Comment::view).collect::<Vec<_>>()))
}

/// POST /suggestions/{id}/comments
/// The comment is accepted even when the database is unreachable.
pub async fn create_comment(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<CreateCommentRequest>,
) -> Result<HttpResponse> {
    let prompt_id = path.into_inner();
    let author = comment_author(&req, &data, payload.author_name.as_deref())?;
    let response = match data.comments.save(&prompt_id, &payload.text, &author).await? {
        SaveOutcome::Synced(comment) => HttpResponse::Created()
            .json(serde_json::json!({ "comment": comment.view(), "synced": true, "duplicate": false })),
        SaveOutcome::Queued(comment) => HttpResponse::Accepted()
            .json(serde_json::json!({ "comment": comment.view(), "synced": false, "duplicate": false })),
        SaveOutcome::Duplicate => {
            HttpResponse::Ok().json(serde_json::json!({ "synced": false, "duplicate": true }))
        }
    };
    Ok(response)
}

/// DELETE /suggestions/{id}/comments/{comment_id}
/// Signed-in authors may delete their own comments; admins may delete any.
/// Anonymous comments have no owner.
pub async fn delete_comment(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse> {
    let (prompt_id, comment_id) = path.into_inner();
    let own = match current_user(&req) {
        Ok(claims) => data
            .comments
            .cached(&prompt_id)?
            .iter()
            .any(|c| c.id == comment_id && c.is_authored_by(&claims.sub)),
        Err(_) => false,
    };
    if !own {
        require_admin(&req, &data).await?;
    }
    data.comments.delete(&prompt_id, &comment_id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "deleted": comment_id })))
}

/// POST /suggestions/{id}/comments/{comment_id}/like
pub async fn like_comment(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse> {
    let (prompt_id, comment_id) = path.into_inner();
    let session = session_id(&req)?;
    let outcome = data.comments.like(&prompt_id, &comment_id, &session).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

/// POST /suggestions/{id}/comments/{comment_id}/flag
pub async fn flag_comment(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
    payload: web::Json<FlagRequest>,
) -> Result<HttpResponse> {
    require_admin(&req, &data).await?;
    let (prompt_id, comment_id) = path.into_inner();
    let comment = data.comments.flag(&prompt_id, &comment_id, payload.flagged).await?;
    Ok(HttpResponse::Ok().json(comment.view()))
}

/// POST /comments/sync
pub async fn sync_comments(data: web::Data<AppState>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(data.comments.sync().await?))
}

/// GET /comments/stats
pub async fn comment_stats(data: web::Data<AppState>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(data.comments.stats()?))
}

/// GET /comments/export?format=json|csv
pub async fn export_comments(
    req: HttpRequest,
    data: web::Data<AppState>,
    query: web::Query<ExportQuery>,
) -> Result<HttpResponse> {
    require_admin(&req, &data).await?;
    let stem = format!("comentarios_{}", Utc::now().format("%Y-%m-%d"));
    match query.format.as_deref().unwrap_or("json") {
        "json" => Ok(HttpResponse::Ok()
            .content_type("application/json; charset=utf-8")
            .insert_header((header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}.json\"", stem)))
            .body(data.comments.export_json()?)),
        "csv" => Ok(HttpResponse::Ok()
            .content_type("text/csv; charset=utf-8")
            .insert_header((header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}.csv\"", stem)))
            .body(data.comments.export_csv()?)),
        other => Err(PortalError::Validation(format!("unknown export format: {}", other))),
    }
}

/// POST /comments/import
/// Body must be a JSON document produced by the export.
pub async fn import_comments(
    req: HttpRequest,
    data: web::Data<AppState>,
    body: String,
) -> Result<HttpResponse> {
    require_admin(&req, &data).await?;
    let imported = data.comments.import_json(&body)?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "imported": imported })))
}

/// POST /comments/backup
pub async fn backup_comments(req: HttpRequest, data: web::Data<AppState>) -> Result<HttpResponse> {
    require_admin(&req, &data).await?;
    let key = data.comments.backup(Utc::now().date_naive())?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "key": key })))
}

/// GET /comments/backups
pub async fn list_backups(req: HttpRequest, data: web::Data<AppState>) -> Result<HttpResponse> {
    require_admin(&req, &data).await?;
    Ok(HttpResponse::Ok().json(data.comments.list_backups()?))
}

/// POST /comments/restore
pub async fn restore_comments(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<RestoreRequest>,
) -> Result<HttpResponse> {
    require_admin(&req, &data).await?;
    let restored = data.comments.restore(&payload.key)?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "restored": restored })))
}

/// POST /comments/dedupe
pub async fn dedupe_comments(req: HttpRequest, data: web::Data<AppState>) -> Result<HttpResponse> {
    require_admin(&req, &data).await?;
    let removed = data.comments.remove_duplicates()?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "removed": removed })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use actix_web::{test, App};
    use jsonwebtoken::{encode, EncodingKey, Header};

    use crate::auth::{Authentication, Claims, SessionPolicy, SESSION_HEADER};
    use crate::comment_cache::CommentCache;
    use crate::config::Config;
    use crate::db::MongoDB;
    use crate::likes::LikeLedger;
    use crate::local_store::{MemoryLocalStore, LIKED_PROMPTS_KEY};
    use crate::remote::testing::FakeRemote;

    const SECRET: &str = "comments-test-secret";

    async fn app_state() -> web::Data<AppState> {
        let config = Config {
            mongo_uri: "mongodb://127.0.0.1:27017".into(),
            database_name: "pge_sugestoes_test".into(),
            jwt_secret: SECRET.into(),
            corporate_domain: "pge.sc.gov.br".into(),
            frontend_origin: "http://localhost:3000".into(),
            bind_addr: "127.0.0.1:0".into(),
            local_store_path: "unused.json".into(),
            duplicate_window_secs: 60,
            sync_interval_secs: 30,
            allow_auto_logout: false,
        };
        let store = Arc::new(MemoryLocalStore::new());
        let comments =
            CommentCache::new(Arc::new(FakeRemote::default()), store.clone(), chrono::Duration::seconds(60))
                .unwrap();
        let mongodb = MongoDB::init(&config.mongo_uri, &config.database_name).await.unwrap();
        web::Data::new(AppState {
            mongodb: Arc::new(mongodb),
            config,
            comments: Arc::new(comments),
            prompt_likes: Arc::new(LikeLedger::new(store, LIKED_PROMPTS_KEY)),
            policy: SessionPolicy { allow_auto_logout: false },
        })
    }

    fn bearer(uid: &str) -> String {
        let claims = Claims {
            sub: uid.into(),
            email: "ana@pge.sc.gov.br".into(),
            name: Some("Ana".into()),
            picture: None,
            exp: usize::MAX / 2,
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_ref())).unwrap();
        format!("Bearer {}", token)
    }

    #[actix_web::test]
    async fn only_the_signed_in_author_deletes_without_admin_rights() {
        let data = app_state().await;
        let app = test::init_service(
            App::new()
                .wrap(Authentication::new(SECRET, data.policy))
                .app_data(data.clone())
                .route("/suggestions/{id}/comments", web::get().to(list_comments))
                .route("/suggestions/{id}/comments", web::post().to(create_comment))
                .route("/suggestions/{id}/comments/{comment_id}", web::delete().to(delete_comment)),
        )
        .await;

        // anonymous comment
        let req = test::TestRequest::post()
            .uri("/suggestions/abc123/comments")
            .insert_header((SESSION_HEADER, "visitor-session"))
            .set_json(serde_json::json!({ "text": "Comentário anônimo", "authorName": "Visitante" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 201);
        let body: serde_json::Value = test::read_body_json(resp).await;
        let anonymous_id = body["comment"]["id"].as_str().unwrap().to_string();
        assert!(body["comment"].get("sessionId").is_none());

        // signed-in comment
        let req = test::TestRequest::post()
            .uri("/suggestions/abc123/comments")
            .insert_header((header::AUTHORIZATION, bearer("uid-1")))
            .insert_header((SESSION_HEADER, "author-session"))
            .set_json(serde_json::json!({ "text": "Comentário da Ana" }))
            .to_request();
        let body: serde_json::Value = test::read_body_json(test::call_service(&app, req).await).await;
        let own_id = body["comment"]["id"].as_str().unwrap().to_string();

        let req = test::TestRequest::get().uri("/suggestions/abc123/comments").to_request();
        let listed: serde_json::Value = test::read_body_json(test::call_service(&app, req).await).await;
        let listed = listed.as_array().unwrap();
        assert_eq!(listed.len(), 2);
        for c in listed {
            assert!(c.get("sessionId").is_none());
            assert!(c.get("authorUid").is_none());
        }

        // knowing the author's session is not enough
        for (id, session) in [(&anonymous_id, "visitor-session"), (&own_id, "author-session")] {
            let req = test::TestRequest::delete()
                .uri(&format!("/suggestions/abc123/comments/{}", id))
                .insert_header((SESSION_HEADER, session))
                .to_request();
            assert_eq!(test::call_service(&app, req).await.status(), 401);
        }
        assert_eq!(data.comments.cached("abc123").unwrap().len(), 2);

        let req = test::TestRequest::delete()
            .uri(&format!("/suggestions/abc123/comments/{}", own_id))
            .insert_header((header::AUTHORIZATION, bearer("uid-1")))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 200);
        let left = data.comments.cached("abc123").unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, anonymous_id);
    }
}
