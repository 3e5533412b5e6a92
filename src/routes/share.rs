use crate::{errors::ApiError, storage::FileStore};
use actix_web::http::header::{
    self, ContentDisposition, DispositionParam, DispositionType,
};
use actix_web::{HttpResponse, web};

/// Public share resolution: no bearer token, the unguessable link id is
/// the whole credential. One-time links are consumed by the storage core
/// on first successful resolution.
pub async fn resolve_share(
    store: web::Data<FileStore>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let link_id = path.into_inner();
    let (meta, bytes) = store.resolve_share(&link_id, chrono::Utc::now()).await?;

    let mut resp = HttpResponse::Ok();
    if let Some(mime) = &meta.mime_type {
        if let Ok(val) = header::HeaderValue::from_str(mime) {
            resp.insert_header((header::CONTENT_TYPE, val));
        }
    }
    resp.insert_header(ContentDisposition {
        disposition: DispositionType::Inline,
        parameters: vec![DispositionParam::Filename(meta.original_name.clone())],
    });
    Ok(resp.body(bytes))
}
