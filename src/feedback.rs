// src/feedback.rs

use std::collections::BTreeMap;

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use log::{error, info};
use mongodb::bson::{doc, to_bson};
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::db::{find_records, inserted_id, newest_records_first, object_id, to_stored, FEEDBACK};
use crate::error::{PortalError, Result};
use crate::models::feedback::{CreateFeedbackRequest, UpdateFeedbackStatusRequest};
use crate::models::{Feedback, Record, Status};
use crate::profiles::require_admin;
use crate::validation::validate_feedback;

#[derive(Debug, Deserialize)]
pub struct FeedbackQuery {
    pub status: Option<String>,
}

#[derive(Debug, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackStats {
    pub total: usize,
    /// `None` when there is no feedback yet.
    pub average_rating: Option<f64>,
    pub by_status: BTreeMap<String, usize>,
}

pub fn feedback_stats(items: &[Feedback]) -> FeedbackStats {
    let mut by_status = BTreeMap::new();
    for f in items {
        *by_status.entry(f.status.to_string()).or_default() += 1;
    }
    let average_rating = if items.is_empty() {
        None
    } else {
        let sum: i64 = items.iter().map(|f| f.rating as i64).sum();
        Some(sum as f64 / items.len() as f64)
    };
    FeedbackStats { total: items.len(), average_rating, by_status }
}

/// POST /feedback
pub async fn submit_feedback(
    data: web::Data<AppState>,
    payload: web::Json<CreateFeedbackRequest>,
) -> Result<HttpResponse> {
    validate_feedback(&payload)?;
    let feedback = Feedback::new(&payload, Utc::now());
    let result = data
        .mongodb
        .collection(FEEDBACK)
        .insert_one(to_stored(&feedback)?)
        .await
        .map_err(|e| {
            error!("Error inserting feedback: {}", e);
            PortalError::from(e)
        })?;
    let id = inserted_id(&result)?;
    info!("Feedback received: {} (rating {})", id, feedback.rating);
    Ok(HttpResponse::Created().json(Record { id, data: feedback }))
}

/// GET /feedback
pub async fn list_feedback(
    req: HttpRequest,
    data: web::Data<AppState>,
    query: web::Query<FeedbackQuery>,
) -> Result<HttpResponse> {
    require_admin(&req, &data).await?;
    let mut filter = doc! {};
    if let Some(status) = query.status.as_deref().filter(|s| !s.trim().is_empty()) {
        let status: Status = status.parse()?;
        filter.insert("status", status.as_str());
    }
    let mut items: Vec<Record<Feedback>> =
        find_records(&data.mongodb.collection(FEEDBACK), filter, doc! { "createdAt": -1 }).await?;
    newest_records_first(&mut items, |f: &Feedback| f.created_at);
    Ok(HttpResponse::Ok().json(items))
}

/// PUT /feedback/{id}/status
pub async fn update_feedback_status(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<UpdateFeedbackStatusRequest>,
) -> Result<HttpResponse> {
    let admin = require_admin(&req, &data).await?;
    let id = path.into_inner();
    let status: Status = payload.status.parse()?;
    let stamp = to_bson(&Utc::now()).map_err(|e| PortalError::Remote(format!("bson encode: {}", e)))?;

    let res = data
        .mongodb
        .collection(FEEDBACK)
        .update_one(
            doc! { "_id": object_id(&id)? },
            doc! { "$set": { "status": status.as_str(), "updatedAt": stamp } },
        )
        .await?;
    if res.matched_count == 0 {
        return Err(PortalError::not_found("Feedback", &id));
    }
    info!("Feedback {} marked {} by {}", id, status, admin.email);
    Ok(HttpResponse::Ok().json(serde_json::json!({ "id": id, "status": status })))
}

/// DELETE /feedback/{id}
pub async fn delete_feedback(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    require_admin(&req, &data).await?;
    let id = path.into_inner();
    let res = data
        .mongodb
        .collection(FEEDBACK)
        .delete_one(doc! { "_id": object_id(&id)? })
        .await?;
    if res.deleted_count == 0 {
        return Err(PortalError::not_found("Feedback", &id));
    }
    Ok(HttpResponse::Ok().json(serde_json::json!({ "deleted": id })))
}

/// GET /feedback/stats
pub async fn feedback_statistics(data: web::Data<AppState>) -> Result<HttpResponse> {
    let items: Vec<Record<Feedback>> =
        find_records(&data.mongodb.collection(FEEDBACK), doc! {}, doc! { "createdAt": -1 }).await?;
    let items: Vec<Feedback> = items.into_iter().map(|r| r.data).collect();
    Ok(HttpResponse::Ok().json(feedback_stats(&items)))
}
