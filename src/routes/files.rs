use crate::{auth::AuthUser, config::Config, errors::ApiError, storage::FileStore};
use crate::models::file::LinkKind;
use actix_multipart::Multipart;
use actix_web::http::header::{
    self, ContentDisposition, DispositionParam, DispositionType,
};
use actix_web::{HttpResponse, web};
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt as _;
use serde::Deserialize;

pub async fn upload_file(
    cfg: web::Data<Config>,
    store: web::Data<FileStore>,
    user: AuthUser,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|_| ApiError::BadRequest("invalid multipart".into()))?
    {
        let declared_name = field
            .content_disposition()
            .and_then(|cd| cd.get_filename().map(|s| s.to_string()))
            .unwrap_or_else(|| "upload.bin".into());
        let declared_mime = field.content_type().map(|m| m.to_string());

        let mut data: Vec<u8> = Vec::new();
        while let Some(chunk) = field
            .try_next()
            .await
            .map_err(|_| ApiError::BadRequest("upload read error".into()))?
        {
            data.extend_from_slice(&chunk);
            if data.len() > cfg.max_upload_size {
                return Err(ApiError::BadRequest("file too large".into()));
            }
        }

        let meta = store
            .store(&data, &declared_name, declared_mime, &user.user_id)
            .await?;
        return Ok(HttpResponse::Ok().json(meta));
    }
    Err(ApiError::BadRequest("no file part".into()))
}

pub async fn list_files(
    store: web::Data<FileStore>,
    user: AuthUser,
) -> Result<HttpResponse, ApiError> {
    let files = store.list_owned_by(&user.user_id).await?;
    Ok(HttpResponse::Ok().json(files))
}

pub async fn get_file(
    store: web::Data<FileStore>,
    user: AuthUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let meta = store.fetch_for_read(&path.into_inner(), &user.user_id).await?;
    Ok(HttpResponse::Ok().json(meta))
}

pub async fn download_file(
    store: web::Data<FileStore>,
    user: AuthUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let (meta, bytes) = store
        .open_for_streaming(&path.into_inner(), &user.user_id)
        .await?;

    let mut resp = HttpResponse::Ok();
    if let Some(mime) = &meta.mime_type {
        if let Ok(val) = header::HeaderValue::from_str(mime) {
            resp.insert_header((header::CONTENT_TYPE, val));
        }
    }
    resp.insert_header(ContentDisposition {
        disposition: DispositionType::Attachment,
        parameters: vec![DispositionParam::Filename(meta.original_name.clone())],
    });
    Ok(resp.body(bytes))
}

pub async fn delete_file(
    store: web::Data<FileStore>,
    user: AuthUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    store.delete(&path.into_inner(), &user.user_id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({"message": "file deleted"})))
}

#[derive(Deserialize)]
pub struct ShareReq {
    pub kind: LinkKind,
    pub expires_at: Option<DateTime<Utc>>,
}

pub async fn create_share_link(
    cfg: web::Data<Config>,
    store: web::Data<FileStore>,
    user: AuthUser,
    path: web::Path<String>,
    body: web::Json<ShareReq>,
) -> Result<HttpResponse, ApiError> {
    let meta = store
        .create_share_link(&path.into_inner(), &user.user_id, body.kind, body.expires_at)
        .await?;
    // fetch_for_read above guarantees the descriptor is present
    let share = meta.share.as_ref().ok_or(ApiError::Internal)?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "link": format!("{}/share/{}", cfg.share_base_url, share.link_id),
        "kind": share.kind,
        "expires_at": share.expires_at,
    })))
}
