use crate::{auth, config::Config, db::Db, errors::ApiError, mailer::Mailer, otp};
use crate::models::user::{ROLE_USER, User, UserProfile};
use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
pub struct SignupReq {
    pub username: String,
    pub email: String,
    pub password: String,
}

pub async fn signup(
    cfg: web::Data<Config>,
    db: web::Data<Db>,
    mailer: web::Data<dyn Mailer>,
    body: web::Json<SignupReq>,
) -> Result<HttpResponse, ApiError> {
    if body.username.len() < 3 || body.password.len() < 8 {
        return Err(ApiError::BadRequest("invalid username/password".into()));
    }
    if !body.email.contains('@') {
        return Err(ApiError::BadRequest("invalid email".into()));
    }

    let hash = auth::hash_password(&body.password)?;
    let user_id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now();
    let code = otp::generate_code();
    let otp_expires_at = now + chrono::Duration::minutes(cfg.otp_ttl_minutes);

    let res = sqlx::query(
        "INSERT INTO users(id, username, email, password_hash, role, verified, otp_code, otp_expires_at, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, 0, ?, ?, ?, ?)",
    )
    .bind(&user_id)
    .bind(&body.username)
    .bind(&body.email)
    .bind(&hash)
    .bind(ROLE_USER)
    .bind(&code)
    .bind(otp_expires_at)
    .bind(now)
    .bind(now)
    .execute(&db.0)
    .await;

    if let Err(e) = res {
        if let sqlx::Error::Database(db_err) = &e {
            if db_err.is_unique_violation() {
                return Err(ApiError::Conflict("username or email already exists".into()));
            }
        }
        return Err(e.into());
    }

    mailer.send(
        &body.email,
        "Your NebulaShare verification code",
        &format!(
            "Welcome to NebulaShare!\n\nYour verification code is: {code}\n\nIt expires in {} minutes.",
            cfg.otp_ttl_minutes
        ),
    )?;

    log::info!("signup user_id={user_id} email={}", body.email);
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "registered, verification code sent"
    })))
}

#[derive(Deserialize)]
pub struct VerifyReq {
    pub email: String,
    pub code: String,
}

pub async fn verify(db: web::Data<Db>, body: web::Json<VerifyReq>) -> Result<HttpResponse, ApiError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(&body.email)
        .fetch_optional(&db.0)
        .await?
        .ok_or(ApiError::NotFound)?;

    if user.verified {
        return Ok(HttpResponse::Ok().json(serde_json::json!({"message": "already verified"})));
    }
    let (stored, expires_at) = match (&user.otp_code, user.otp_expires_at) {
        (Some(c), Some(e)) => (c, e),
        _ => return Err(ApiError::BadRequest("no pending verification code".into())),
    };

    match otp::validate_code(&body.code, stored, expires_at, chrono::Utc::now()) {
        Ok(()) => {
            sqlx::query(
                "UPDATE users SET verified = 1, otp_code = NULL, otp_expires_at = NULL, updated_at = ? WHERE id = ?",
            )
            .bind(chrono::Utc::now())
            .bind(&user.id)
            .execute(&db.0)
            .await?;
            log::info!("verified user_id={}", user.id);
            Ok(HttpResponse::Ok().json(serde_json::json!({"message": "email verified"})))
        }
        Err(otp::OtpError::Expired) => {
            // a stale code is useless, drop it so a fresh signup attempt is clean
            sqlx::query(
                "UPDATE users SET otp_code = NULL, otp_expires_at = NULL, updated_at = ? WHERE id = ?",
            )
            .bind(chrono::Utc::now())
            .bind(&user.id)
            .execute(&db.0)
            .await?;
            Err(ApiError::BadRequest("verification code expired".into()))
        }
        Err(otp::OtpError::Mismatch) => Err(ApiError::BadRequest("invalid verification code".into())),
    }
}

#[derive(Deserialize)]
pub struct LoginReq {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResp {
    token: String,
    user: UserProfile,
}

/// Tokens are only minted for verified accounts; everything behind the
/// bearer gate can rely on that.
pub async fn login(
    cfg: web::Data<Config>,
    db: web::Data<Db>,
    body: web::Json<LoginReq>,
) -> Result<HttpResponse, ApiError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(&body.email)
        .fetch_optional(&db.0)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    if !auth::verify_password(&user.password_hash, &body.password) {
        return Err(ApiError::Unauthorized);
    }
    if !user.verified {
        return Err(ApiError::Forbidden);
    }

    let token = auth::create_access_token(&user.id, &user.role, &cfg)?;
    Ok(HttpResponse::Ok().json(LoginResp {
        token,
        user: user.into(),
    }))
}
