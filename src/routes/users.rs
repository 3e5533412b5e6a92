use crate::{auth, auth::AuthUser, db::Db, errors::ApiError};
use crate::models::user::{User, UserProfile};
use actix_web::{HttpResponse, web};
use serde::Deserialize;
use sqlx::Row;

pub async fn me(db: web::Data<Db>, user: AuthUser) -> Result<HttpResponse, ApiError> {
    let row = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(&user.user_id)
        .fetch_optional(&db.0)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(HttpResponse::Ok().json(UserProfile::from(row)))
}

#[derive(Deserialize)]
pub struct UpdateMeReq {
    pub username: String,
}

/// Only the display name is mutable; the email address is the account's
/// identity once verified and cannot be changed here.
pub async fn update_me(
    db: web::Data<Db>,
    user: AuthUser,
    body: web::Json<UpdateMeReq>,
) -> Result<HttpResponse, ApiError> {
    if body.username.len() < 3 {
        return Err(ApiError::BadRequest("username too short".into()));
    }
    let res = sqlx::query("UPDATE users SET username = ?, updated_at = ? WHERE id = ?")
        .bind(&body.username)
        .bind(chrono::Utc::now())
        .bind(&user.user_id)
        .execute(&db.0)
        .await;

    match res {
        Ok(_) => me(db, user).await,
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            Err(ApiError::Conflict("username already exists".into()))
        }
        Err(e) => Err(e.into()),
    }
}

#[derive(Deserialize)]
pub struct ChangePasswordReq {
    pub current_password: String,
    pub new_password: String,
}

pub async fn change_password(
    db: web::Data<Db>,
    user: AuthUser,
    body: web::Json<ChangePasswordReq>,
) -> Result<HttpResponse, ApiError> {
    if body.new_password.len() < 8 {
        return Err(ApiError::BadRequest("new password too short".into()));
    }
    let row = sqlx::query("SELECT password_hash FROM users WHERE id = ?")
        .bind(&user.user_id)
        .fetch_one(&db.0)
        .await?;
    let hash: String = row.get("password_hash");
    if !auth::verify_password(&hash, &body.current_password) {
        return Err(ApiError::Forbidden);
    }
    let new_hash = auth::hash_password(&body.new_password)?;
    sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(new_hash)
        .bind(chrono::Utc::now())
        .bind(&user.user_id)
        .execute(&db.0)
        .await?;
    Ok(HttpResponse::Ok().finish())
}
