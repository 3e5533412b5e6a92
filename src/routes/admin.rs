use crate::{auth::AuthUser, db::Db, errors::ApiError, permissions::require_admin, storage::FileStore};
use crate::models::user::{User, UserProfile};
use actix_web::{HttpResponse, web};

pub async fn list_users(db: web::Data<Db>, user: AuthUser) -> Result<HttpResponse, ApiError> {
    require_admin(&user)?;
    let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY username ASC")
        .fetch_all(&db.0)
        .await?;
    let users: Vec<UserProfile> = users.into_iter().map(UserProfile::from).collect();
    Ok(HttpResponse::Ok().json(users))
}

pub async fn delete_user(
    db: web::Data<Db>,
    store: web::Data<FileStore>,
    user: AuthUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&user)?;
    let target_id = path.into_inner();
    if target_id == user.user_id {
        return Err(ApiError::Forbidden);
    }

    let exists = sqlx::query("SELECT 1 FROM users WHERE id = ?")
        .bind(&target_id)
        .fetch_optional(&db.0)
        .await?;
    if exists.is_none() {
        return Err(ApiError::NotFound);
    }

    // reclaim the account's files (bytes and metadata) before the row goes
    let removed = store.delete_all_owned_by(&target_id).await?;

    let res = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(&target_id)
        .execute(&db.0)
        .await?;
    if res.rows_affected() == 0 {
        return Err(ApiError::NotFound);
    }

    log::info!(
        "AdminAction: delete_user admin_id={} target_id={target_id} files_removed={removed}",
        user.user_id
    );
    Ok(HttpResponse::Ok().json(serde_json::json!({"message": "user deleted"})))
}

pub async fn list_files(
    store: web::Data<FileStore>,
    user: AuthUser,
) -> Result<HttpResponse, ApiError> {
    require_admin(&user)?;
    let files = store.list_all().await?;
    Ok(HttpResponse::Ok().json(files))
}

pub async fn delete_file(
    store: web::Data<FileStore>,
    user: AuthUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&user)?;
    let file_id = path.into_inner();
    store.admin_delete(&file_id).await?;
    log::info!(
        "AdminAction: delete_file admin_id={} file_id={file_id}",
        user.user_id
    );
    Ok(HttpResponse::Ok().json(serde_json::json!({"message": "file deleted"})))
}
