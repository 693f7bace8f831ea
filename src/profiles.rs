// src/profiles.rs

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use log::{info, warn};
use mongodb::bson::{doc, to_bson, Document};

use crate::app_state::AppState;
use crate::auth::{current_user, Claims};
use crate::db::{find_records, to_stored, ADMINS, USERS};
use crate::error::{PortalError, Result};
use crate::models::profile::{email_domain, CreateAdminRequest, UpdatePhotoRequest};
use crate::models::{Profile, Record};

/// Corporate-domain users become admins on first login unless already one.
pub fn should_auto_register(email: &str, corporate_domain: &str, already_admin: bool) -> bool {
    let domain = email_domain(email);
    !already_admin && !domain.is_empty() && domain == corporate_domain.to_lowercase()
}

async fn find_profile(data: &AppState, collection: &str, uid: &str) -> Result<Option<Profile>> {
    let found = data
        .mongodb
        .collection(collection)
        .find_one(doc! { "uid": uid })
        .await?;
    match found {
        Some(mut document) => {
            document.remove("_id");
            let profile = mongodb::bson::from_document(document)
                .map_err(|e| PortalError::Remote(format!("bson decode: {}", e)))?;
            Ok(Some(profile))
        }
        None => Ok(None),
    }
}

pub async fn is_admin(data: &AppState, uid: &str) -> Result<bool> {
    Ok(find_profile(data, ADMINS, uid).await?.is_some())
}

/// Claims of the caller, provided they are listed in `admins`.
pub async fn require_admin(req: &HttpRequest, data: &AppState) -> Result<Claims> {
    let claims = current_user(req)?;
    if !is_admin(data, &claims.sub).await? {
        return Err(PortalError::Forbidden("admin access required".to_string()));
    }
    Ok(claims)
}

fn time_bson() -> Result<mongodb::bson::Bson> {
    to_bson(&Utc::now()).map_err(|e| PortalError::Remote(format!("bson encode: {}", e)))
}

/// POST /auth/session
/// Called once the identity provider has signed the user in.
pub async fn start_session(req: HttpRequest, data: web::Data<AppState>) -> Result<HttpResponse> {
    let claims = current_user(&req)?;
    let now = Utc::now();
    let users = data.mongodb.collection(USERS);

    let profile = match find_profile(&data, USERS, &claims.sub).await? {
        Some(mut existing) => {
            let mut set = doc! { "lastLogin": time_bson()? };
            if let Some(name) = &claims.name {
                set.insert("displayName", name.as_str());
                existing.display_name = Some(name.clone());
            }
            users.update_one(doc! { "uid": &claims.sub }, doc! { "$set": set }).await?;
            existing.last_login = Some(now);
            existing
        }
        None => {
            let profile = Profile::user(
                &claims.sub,
                &claims.email,
                claims.name.clone(),
                claims.picture.clone(),
                &data.config.corporate_domain,
                now,
            );
            users.insert_one(to_stored(&profile)?).await?;
            info!("registered user profile {}", claims.sub);
            profile
        }
    };

    let mut admin = is_admin(&data, &claims.sub).await?;
    if should_auto_register(&claims.email, &data.config.corporate_domain, admin) {
        let admin_profile = profile.clone().into_admin(None, true);
        data.mongodb
            .collection(ADMINS)
            .insert_one(to_stored(&admin_profile)?)
            .await?;
        info!("auto-registered institutional admin {}", claims.email);
        admin = true;
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({ "profile": profile, "isAdmin": admin })))
}

/// PUT /users/me/photo
/// The image itself lives in the external blob store; only its URL is kept.
pub async fn update_photo(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<UpdatePhotoRequest>,
) -> Result<HttpResponse> {
    let claims = current_user(&req)?;
    let url = payload.photo_url.trim();
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        return Err(PortalError::validation("photoUrl must be an http(s) URL"));
    }
    let filter = doc! { "uid": &claims.sub };
    let update = doc! { "$set": { "photoUrl": url } };
    let res = data.mongodb.collection(USERS).update_one(filter.clone(), update.clone()).await?;
    if res.matched_count == 0 {
        return Err(PortalError::not_found("Profile", &claims.sub));
    }
    // admins carry their own copy of the profile
    if let Err(e) = data.mongodb.collection(ADMINS).update_one(filter, update).await {
        warn!("admin profile photo not updated for {}: {}", claims.sub, e);
    }
    Ok(HttpResponse::Ok().json(serde_json::json!({ "photoUrl": url })))
}

/// GET /admins
pub async fn list_admins(req: HttpRequest, data: web::Data<AppState>) -> Result<HttpResponse> {
    require_admin(&req, &data).await?;
    let admins: Vec<Record<Profile>> =
        find_records(&data.mongodb.collection(ADMINS), Document::new(), doc! { "email": 1 }).await?;
    Ok(HttpResponse::Ok().json(admins.into_iter().map(|r| r.data).collect::<Vec<_>>()))
}

/// POST /admins
pub async fn create_admin(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<CreateAdminRequest>,
) -> Result<HttpResponse> {
    let caller = require_admin(&req, &data).await?;
    if payload.uid.trim().is_empty() || !payload.email.contains('@') {
        return Err(PortalError::validation("uid and a valid email are required"));
    }
    if is_admin(&data, &payload.uid).await? {
        return Err(PortalError::Conflict(format!("{} is already an admin", payload.email)));
    }
    let profile = Profile::user(
        &payload.uid,
        &payload.email,
        payload.display_name.clone(),
        None,
        &data.config.corporate_domain,
        Utc::now(),
    )
    .into_admin(payload.permissions.clone(), false);
    data.mongodb.collection(ADMINS).insert_one(to_stored(&profile)?).await?;
    info!("{} granted admin to {}", caller.email, profile.email);
    Ok(HttpResponse::Created().json(profile))
}

/// DELETE /admins/{uid}
pub async fn delete_admin(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let caller = require_admin(&req, &data).await?;
    let uid = path.into_inner();
    if uid == caller.sub {
        return Err(PortalError::Conflict("admins cannot remove themselves".to_string()));
    }
    let res = data.mongodb.collection(ADMINS).delete_one(doc! { "uid": &uid }).await?;
    if res.deleted_count == 0 {
        return Err(PortalError::not_found("Admin", &uid));
    }
    info!("{} revoked admin from {}", caller.email, uid);
    Ok(HttpResponse::Ok().json(serde_json::json!({ "deleted": uid })))
}
