// src/suggestion.rs

use std::collections::BTreeMap;

use actix_web::{http::header, web, HttpRequest, HttpResponse};
use chrono::Utc;
use log::{error, info, warn};
use mongodb::bson::{doc, to_bson, Document};
use mongodb::options::ReturnDocument;
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::auth::session_id;
use crate::db::{
    find_records, inserted_id, into_record, newest_records_first, object_id, to_stored, SUGGESTIONS,
};
use crate::error::{PortalError, Result};
use crate::export::{suggestions_csv, suggestions_json};
use crate::models::suggestion::CreateSuggestionRequest;
use crate::models::{Category, Record, Status, Suggestion};
use crate::profiles::require_admin;
use crate::validation::validate_suggestion;

#[derive(Debug, Deserialize)]
pub struct SuggestionQuery {
    pub status: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub format: Option<String>,
}

#[derive(Debug, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionStats {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_category: BTreeMap<String, usize>,
    pub total_likes: i64,
    pub total_views: i64,
}

/// Builds the Mongo filter for optional status/category query values.
pub fn suggestion_filter(status: Option<&str>, category: Option<&str>) -> Result<Document> {
    let mut filter = doc! {};
    if let Some(status) = status.filter(|s| !s.trim().is_empty()) {
        let status: Status = status.parse()?;
        filter.insert("status", status.as_str());
    }
    if let Some(category) = category.filter(|c| !c.trim().is_empty()) {
        let category: Category = category.parse()?;
        filter.insert("category", category.label());
    }
    Ok(filter)
}

pub fn suggestion_stats(items: &[Suggestion]) -> SuggestionStats {
    let mut stats = SuggestionStats { total: items.len(), ..Default::default() };
    for s in items {
        *stats.by_status.entry(s.status.to_string()).or_default() += 1;
        *stats.by_category.entry(s.category.to_string()).or_default() += 1;
        stats.total_likes += s.likes;
        stats.total_views += s.views;
    }
    stats
}

async fn fetch(data: &AppState, filter: Document) -> Result<Vec<Record<Suggestion>>> {
    let mut items = find_records(&data.mongodb.collection(SUGGESTIONS), filter, doc! { "createdAt": -1 }).await?;
    newest_records_first(&mut items, |s: &Suggestion| s.created_at);
    Ok(items)
}

async fn fetch_one(data: &AppState, id: &str) -> Result<Record<Suggestion>> {
    let found = data
        .mongodb
        .collection(SUGGESTIONS)
        .find_one(doc! { "_id": object_id(id)? })
        .await?;
    match found {
        Some(document) => into_record(document),
        None => Err(PortalError::not_found("Suggestion", id)),
    }
}

/// POST /suggestions
pub async fn create_suggestion(
    data: web::Data<AppState>,
    payload: web::Json<CreateSuggestionRequest>,
) -> Result<HttpResponse> {
    let category = validate_suggestion(&payload)?;
    let suggestion = Suggestion::new(&payload, category, Utc::now());

    let result = data
        .mongodb
        .collection(SUGGESTIONS)
        .insert_one(to_stored(&suggestion)?)
        .await
        .map_err(|e| {
            error!("Error inserting suggestion: {}", e);
            PortalError::from(e)
        })?;
    let id = inserted_id(&result)?;
    info!("Suggestion created: {} ({})", id, suggestion.category);
    Ok(HttpResponse::Created().json(Record { id, data: suggestion }))
}

/// GET /suggestions
/// Public listing: approved suggestions only.
pub async fn list_approved(
    data: web::Data<AppState>,
    query: web::Query<SuggestionQuery>,
) -> Result<HttpResponse> {
    let filter = suggestion_filter(Some(Status::Approved.as_str()), query.category.as_deref())?;
    Ok(HttpResponse::Ok().json(fetch(&data, filter).await?))
}

/// GET /suggestions/all
pub async fn list_all(
    req: HttpRequest,
    data: web::Data<AppState>,
    query: web::Query<SuggestionQuery>,
) -> Result<HttpResponse> {
    require_admin(&req, &data).await?;
    let filter = suggestion_filter(query.status.as_deref(), query.category.as_deref())?;
    Ok(HttpResponse::Ok().json(fetch(&data, filter).await?))
}

/// GET /suggestions/{id}
/// Counts a view on every read; views are not deduplicated.
pub async fn get_suggestion(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let id = path.into_inner();
    let updated = data
        .mongodb
        .collection(SUGGESTIONS)
        .find_one_and_update(doc! { "_id": object_id(&id)? }, doc! { "$inc": { "views": 1 } })
        .return_document(ReturnDocument::After)
        .await?;
    match updated {
        Some(document) => Ok(HttpResponse::Ok().json(into_record::<Suggestion>(document)?)),
        None => Err(PortalError::not_found("Suggestion", &id)),
    }
}

/// POST /suggestions/{id}/like
pub async fn like_suggestion(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let id = path.into_inner();
    let oid = object_id(&id)?;
    let session = session_id(&req)?;

    if !data.prompt_likes.record(&session, &id)? {
        return Ok(HttpResponse::Ok().json(serde_json::json!({ "liked": false })));
    }

    let res = data
        .mongodb
        .collection(SUGGESTIONS)
        .update_one(doc! { "_id": oid }, doc! { "$inc": { "likes": 1 } })
        .await;
    match res {
        Ok(r) if r.matched_count > 0 => {
            Ok(HttpResponse::Ok().json(serde_json::json!({ "liked": true })))
        }
        Ok(_) => {
            data.prompt_likes.forget(&session, &id)?;
            Err(PortalError::not_found("Suggestion", &id))
        }
        Err(e) => {
            error!("Error liking suggestion {}: {}", id, e);
            data.prompt_likes.forget(&session, &id)?;
            Err(e.into())
        }
    }
}

/// GET /suggestions/{id}/like
pub async fn like_status(req: HttpRequest, data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse> {
    let session = session_id(&req)?;
    let liked = data.prompt_likes.has_liked(&session, &path.into_inner())?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "liked": liked })))
}

async fn moderate(req: HttpRequest, data: web::Data<AppState>, id: String, target: Status) -> Result<HttpResponse> {
    let admin = require_admin(&req, &data).await?;
    let current = fetch_one(&data, &id).await?;
    let next = current.data.status.transition(target)?;

    let now = Utc::now();
    let stamp = to_bson(&now).map_err(|e| PortalError::Remote(format!("bson encode: {}", e)))?;
    let mut set = doc! { "status": next.as_str() };
    match next {
        Status::Approved => set.insert("approvedAt", stamp),
        _ => set.insert("rejectedAt", stamp),
    };

    // only apply if nobody moderated it in the meantime
    let filter = doc! { "_id": object_id(&id)?, "status": current.data.status.as_str() };
    let res = data
        .mongodb
        .collection(SUGGESTIONS)
        .update_one(filter, doc! { "$set": set })
        .await?;
    if res.matched_count == 0 {
        return Err(PortalError::Conflict(format!("suggestion {} changed concurrently", id)));
    }

    info!("Suggestion {} {} by {}", id, next, admin.email);
    let mut updated = current;
    updated.data.status = next;
    match next {
        Status::Approved => updated.data.approved_at = Some(now),
        _ => updated.data.rejected_at = Some(now),
    }
    Ok(HttpResponse::Ok().json(updated))
}

/// POST /suggestions/{id}/approve
pub async fn approve_suggestion(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    moderate(req, data, path.into_inner(), Status::Approved).await
}

/// POST /suggestions/{id}/reject
pub async fn reject_suggestion(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    moderate(req, data, path.into_inner(), Status::Rejected).await
}

/// DELETE /suggestions/{id}
pub async fn delete_suggestion(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let admin = require_admin(&req, &data).await?;
    let id = path.into_inner();
    let res = data
        .mongodb
        .collection(SUGGESTIONS)
        .delete_one(doc! { "_id": object_id(&id)? })
        .await?;
    if res.deleted_count == 0 {
        return Err(PortalError::not_found("Suggestion", &id));
    }
    match data.comments.purge_prompt(&id).await {
        Ok(n) => info!("Suggestion {} deleted by {} with {} comments", id, admin.email, n),
        Err(e) => warn!("Suggestion {} deleted but its comments remain: {}", id, e),
    }
    Ok(HttpResponse::Ok().json(serde_json::json!({ "deleted": id })))
}

/// GET /suggestions/export?format=csv|json
pub async fn export_suggestions(
    req: HttpRequest,
    data: web::Data<AppState>,
    query: web::Query<ExportQuery>,
) -> Result<HttpResponse> {
    require_admin(&req, &data).await?;
    let items = fetch(&data, Document::new()).await?;
    let now = Utc::now();
    let stem = format!("sugestoes_{}", now.format("%Y-%m-%d"));

    match query.format.as_deref().unwrap_or("json") {
        "csv" => Ok(HttpResponse::Ok()
            .content_type("text/csv; charset=utf-8")
            .insert_header((header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}.csv\"", stem)))
            .body(suggestions_csv(&items))),
        "json" => Ok(HttpResponse::Ok()
            .content_type("application/json; charset=utf-8")
            .insert_header((header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}.json\"", stem)))
            .body(suggestions_json(&items, now)?)),
        other => Err(PortalError::Validation(format!("unknown export format: {}", other))),
    }
}

/// GET /suggestions/stats
pub async fn suggestion_statistics(data: web::Data<AppState>) -> Result<HttpResponse> {
    let items: Vec<Suggestion> = fetch(&data, Document::new())
        .await?
        .into_iter()
        .map(|r| r.data)
        .collect();
    Ok(HttpResponse::Ok().json(suggestion_stats(&items)))
}
