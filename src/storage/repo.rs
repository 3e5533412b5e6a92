use crate::db::Db;
use crate::errors::ApiError;
use crate::models::file::{FileMeta, LinkKind, ShareDescriptor};
use async_trait::async_trait;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

/// Metadata repository the storage core runs against. Purely transactional
/// create/read/delete by key; the core never sees SQL.
#[async_trait]
pub trait FileRepo: Send + Sync {
    async fn save(&self, meta: &FileMeta) -> Result<(), ApiError>;
    async fn find_by_id(&self, id: &str) -> Result<Option<FileMeta>, ApiError>;
    async fn find_by_id_and_owner(
        &self,
        id: &str,
        owner_id: &str,
    ) -> Result<Option<FileMeta>, ApiError>;
    async fn find_all_by_owner(&self, owner_id: &str) -> Result<Vec<FileMeta>, ApiError>;
    async fn find_all(&self) -> Result<Vec<FileMeta>, ApiError>;
    async fn exists_by_id(&self, id: &str) -> Result<bool, ApiError>;
    /// Returns false when the row was already gone, so concurrent deletes
    /// settle on exactly one winner.
    async fn delete(&self, id: &str) -> Result<bool, ApiError>;
    async fn set_share(&self, file_id: &str, share: &ShareDescriptor) -> Result<(), ApiError>;
    async fn find_by_link_id(&self, link_id: &str) -> Result<Option<FileMeta>, ApiError>;
    /// Clears the descriptor only while `link_id` still matches; the
    /// returned bool arbitrates one-time consumption races.
    async fn clear_share(&self, file_id: &str, link_id: &str) -> Result<bool, ApiError>;
}

pub struct SqliteFileRepo {
    db: Db,
}

impl SqliteFileRepo {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

const FILE_COLUMNS: &str = "id, owner_id, original_name, stored_name, mime_type, size_bytes, \
                            created_at, share_link_id, share_kind, share_expires_at";

fn row_to_meta(row: SqliteRow) -> FileMeta {
    let link_id: Option<String> = row.get("share_link_id");
    let kind: Option<String> = row.get("share_kind");
    let share = match (link_id, kind.as_deref().and_then(LinkKind::parse)) {
        (Some(link_id), Some(kind)) => Some(ShareDescriptor {
            link_id,
            kind,
            expires_at: row.get("share_expires_at"),
        }),
        _ => None,
    };
    FileMeta {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        original_name: row.get("original_name"),
        stored_name: row.get("stored_name"),
        mime_type: row.get("mime_type"),
        size_bytes: row.get("size_bytes"),
        created_at: row.get("created_at"),
        share,
    }
}

#[async_trait]
impl FileRepo for SqliteFileRepo {
    async fn save(&self, meta: &FileMeta) -> Result<(), ApiError> {
        sqlx::query(
            "INSERT INTO files(id, owner_id, original_name, stored_name, mime_type, size_bytes, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&meta.id)
        .bind(&meta.owner_id)
        .bind(&meta.original_name)
        .bind(&meta.stored_name)
        .bind(&meta.mime_type)
        .bind(meta.size_bytes)
        .bind(meta.created_at)
        .execute(&self.db.0)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<FileMeta>, ApiError> {
        let row = sqlx::query(&format!("SELECT {FILE_COLUMNS} FROM files WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.db.0)
            .await?;
        Ok(row.map(row_to_meta))
    }

    async fn find_by_id_and_owner(
        &self,
        id: &str,
        owner_id: &str,
    ) -> Result<Option<FileMeta>, ApiError> {
        let row = sqlx::query(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE id = ? AND owner_id = ?"
        ))
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.db.0)
        .await?;
        Ok(row.map(row_to_meta))
    }

    async fn find_all_by_owner(&self, owner_id: &str) -> Result<Vec<FileMeta>, ApiError> {
        let rows = sqlx::query(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE owner_id = ? ORDER BY created_at ASC"
        ))
        .bind(owner_id)
        .fetch_all(&self.db.0)
        .await?;
        Ok(rows.into_iter().map(row_to_meta).collect())
    }

    async fn find_all(&self) -> Result<Vec<FileMeta>, ApiError> {
        let rows = sqlx::query(&format!(
            "SELECT {FILE_COLUMNS} FROM files ORDER BY created_at ASC"
        ))
        .fetch_all(&self.db.0)
        .await?;
        Ok(rows.into_iter().map(row_to_meta).collect())
    }

    async fn exists_by_id(&self, id: &str) -> Result<bool, ApiError> {
        let row = sqlx::query("SELECT 1 FROM files WHERE id = ? LIMIT 1")
            .bind(id)
            .fetch_optional(&self.db.0)
            .await?;
        Ok(row.is_some())
    }

    async fn delete(&self, id: &str) -> Result<bool, ApiError> {
        let res = sqlx::query("DELETE FROM files WHERE id = ?")
            .bind(id)
            .execute(&self.db.0)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn set_share(&self, file_id: &str, share: &ShareDescriptor) -> Result<(), ApiError> {
        sqlx::query(
            "UPDATE files SET share_link_id = ?, share_kind = ?, share_expires_at = ? WHERE id = ?",
        )
        .bind(&share.link_id)
        .bind(share.kind.as_str())
        .bind(share.expires_at)
        .bind(file_id)
        .execute(&self.db.0)
        .await?;
        Ok(())
    }

    async fn find_by_link_id(&self, link_id: &str) -> Result<Option<FileMeta>, ApiError> {
        let row = sqlx::query(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE share_link_id = ?"
        ))
        .bind(link_id)
        .fetch_optional(&self.db.0)
        .await?;
        Ok(row.map(row_to_meta))
    }

    async fn clear_share(&self, file_id: &str, link_id: &str) -> Result<bool, ApiError> {
        let res = sqlx::query(
            "UPDATE files SET share_link_id = NULL, share_kind = NULL, share_expires_at = NULL \
             WHERE id = ? AND share_link_id = ?",
        )
        .bind(file_id)
        .bind(link_id)
        .execute(&self.db.0)
        .await?;
        Ok(res.rows_affected() > 0)
    }
}
