// src/main.rs

mod app_state;
mod auth;
mod comment_cache;
mod comments;
mod config;
mod db;
mod error;
mod export;
mod feedback;
mod likes;
mod local_store;
mod models;
mod profiles;
mod remote;
mod suggestion;
mod validation;

use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{http, middleware::Logger, web, App, HttpServer};
use chrono::Utc;
use env_logger::Env;
use log::{error, info, warn};

use crate::app_state::AppState;
use crate::auth::{logout, Authentication, SessionPolicy};
use crate::comment_cache::CommentCache;
use crate::comments::{
    backup_comments, comment_stats, create_comment, dedupe_comments, delete_comment, export_comments,
    flag_comment, import_comments, like_comment, list_backups, list_comments, restore_comments,
    sync_comments,
};
use crate::db::{MongoCommentStore, MongoDB};
use crate::feedback::{
    delete_feedback, feedback_statistics, list_feedback, submit_feedback, update_feedback_status,
};
use crate::likes::LikeLedger;
use crate::local_store::{clear_stale_session, FileLocalStore, LocalStore, LIKED_PROMPTS_KEY};
use crate::profiles::{create_admin, delete_admin, list_admins, start_session, update_photo};
use crate::remote::{wait_for_connectivity, CommentRemote, DEFAULT_CONNECTIVITY_TIMEOUT};
use crate::suggestion::{
    approve_suggestion, create_suggestion, delete_suggestion, export_suggestions, get_suggestion,
    like_status, like_suggestion, list_all, list_approved, reject_suggestion, suggestion_statistics,
};

/// Periodic sync of queued comments, plus one dated backup per day.
fn spawn_sync_task(cache: Arc<CommentCache>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        let mut last_backup = None;
        loop {
            ticker.tick().await;
            if let Err(e) = cache.sync().await {
                error!("background comment sync failed: {}", e);
            }
            let today = Utc::now().date_naive();
            if last_backup != Some(today) {
                match cache.backup(today) {
                    Ok(_) => last_backup = Some(today),
                    Err(e) => error!("daily comment backup failed: {}", e),
                }
            }
        }
    });
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = config::Config::from_env().map_err(std::io::Error::other)?;
    let mongodb = Arc::new(
        MongoDB::init(&config.mongo_uri, &config.database_name)
            .await
            .map_err(std::io::Error::other)?,
    );
    let store: Arc<dyn LocalStore> =
        Arc::new(FileLocalStore::open(&config.local_store_path).map_err(std::io::Error::other)?);
    if clear_stale_session(store.as_ref()).map_err(std::io::Error::other)? {
        info!("Cleared stale login timestamp from the local store");
    }
    let remote: Arc<dyn CommentRemote> = Arc::new(MongoCommentStore::new(&mongodb));

    if wait_for_connectivity(remote.as_ref(), DEFAULT_CONNECTIVITY_TIMEOUT).await {
        info!("Connected to database {}", config.database_name);
    } else {
        warn!("Database unreachable at startup; comments will be kept locally until it returns");
    }

    let comments = Arc::new(
        CommentCache::new(
            remote,
            store.clone(),
            chrono::Duration::seconds(config.duplicate_window_secs),
        )
        .map_err(std::io::Error::other)?,
    );
    spawn_sync_task(comments.clone(), Duration::from_secs(config.sync_interval_secs.max(1)));

    let state = web::Data::new(AppState {
        mongodb: mongodb.clone(),
        config: config.clone(),
        comments: comments.clone(),
        prompt_likes: Arc::new(LikeLedger::new(store, LIKED_PROMPTS_KEY)),
        policy: SessionPolicy { allow_auto_logout: config.allow_auto_logout },
    });

    info!("Server running at http://{}", config.bind_addr);
    info!("Allowed CORS Origin: {}", config.frontend_origin);

    let frontend_origin = config.frontend_origin.clone();
    let jwt_secret = config.jwt_secret.clone();
    let policy = state.policy;

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&frontend_origin)
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                http::header::CONTENT_TYPE,
                http::header::ACCEPT,
                http::header::AUTHORIZATION,
                http::header::HeaderName::from_static("x-session-id"),
            ])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .wrap(Authentication::new(&jwt_secret, policy))
            .app_data(state.clone())
            .service(
                web::scope("/auth")
                    .route("/session", web::post().to(start_session))
                    .route("/logout", web::post().to(logout)),
            )
            .service(web::scope("/users").route("/me/photo", web::put().to(update_photo)))
            .service(
                web::scope("/admins")
                    .route("", web::get().to(list_admins))
                    .route("", web::post().to(create_admin))
                    .route("/{uid}", web::delete().to(delete_admin)),
            )
            // SUGGESTIONS (static segments before "/{id}")
            .service(
                web::scope("/suggestions")
                    .route("", web::get().to(list_approved))
                    .route("", web::post().to(create_suggestion))
                    .route("/all", web::get().to(list_all))
                    .route("/export", web::get().to(export_suggestions))
                    .route("/stats", web::get().to(suggestion_statistics))
                    .route("/{id}", web::get().to(get_suggestion))
                    .route("/{id}", web::delete().to(delete_suggestion))
                    .route("/{id}/like", web::get().to(like_status))
                    .route("/{id}/like", web::post().to(like_suggestion))
                    .route("/{id}/approve", web::post().to(approve_suggestion))
                    .route("/{id}/reject", web::post().to(reject_suggestion))
                    .route("/{id}/comments", web::get().to(list_comments))
                    .route("/{id}/comments", web::post().to(create_comment))
                    .route("/{id}/comments/{comment_id}", web::delete().to(delete_comment))
                    .route("/{id}/comments/{comment_id}/like", web::post().to(like_comment))
                    .route("/{id}/comments/{comment_id}/flag", web::post().to(flag_comment)),
            )
            .service(
                web::scope("/comments")
                    .route("/sync", web::post().to(sync_comments))
                    .route("/stats", web::get().to(comment_stats))
                    .route("/export", web::get().to(export_comments))
                    .route("/import", web::post().to(import_comments))
                    .route("/backup", web::post().to(backup_comments))
                    .route("/backups", web::get().to(list_backups))
                    .route("/restore", web::post().to(restore_comments))
                    .route("/dedupe", web::post().to(dedupe_comments)),
            )
            .service(
                web::scope("/feedback")
                    .route("", web::get().to(list_feedback))
                    .route("", web::post().to(submit_feedback))
                    .route("/stats", web::get().to(feedback_statistics))
                    .route("/{id}/status", web::put().to(update_feedback_status))
                    .route("/{id}", web::delete().to(delete_feedback)),
            )
    })
    .bind(&config.bind_addr)?
    .run();

    let result = server.await;

    match comments.emergency_backup() {
        Ok(()) => info!("Emergency comment backup written"),
        Err(e) => error!("Emergency comment backup failed: {}", e),
    }
    if let Ok(pending) = comments.pending_count() {
        if pending > 0 {
            warn!("{} comments still waiting to sync; they stay in the local store", pending);
        }
    }
    result
}
