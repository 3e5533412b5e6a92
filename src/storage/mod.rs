pub mod blobs;
pub mod repo;

use crate::errors::ApiError;
use crate::models::file::{FileMeta, LinkKind, ShareDescriptor};
use blobs::BlobStore;
use chrono::{DateTime, Utc};
use repo::FileRepo;
use sanitize_filename::sanitize;
use std::path::Path;
use std::sync::Arc;

/// Ownership-scoped storage core. Every operation that takes a requester
/// authorizes against ownership itself; routes only do request plumbing.
///
/// "Absent" and "not yours" are deliberately the same `NotFound` on every
/// owner-gated path, so a non-owner can't probe which ids exist.
pub struct FileStore {
    repo: Arc<dyn FileRepo>,
    blobs: BlobStore,
}

impl FileStore {
    pub fn new(repo: Arc<dyn FileRepo>, blobs: BlobStore) -> Self {
        Self { repo, blobs }
    }

    /// Write-then-persist: bytes land on disk first, and a failed metadata
    /// save removes them again so no record exists without its bytes and
    /// no orphan survives a failed store.
    pub async fn store(
        &self,
        bytes: &[u8],
        declared_name: &str,
        declared_mime: Option<String>,
        owner_id: &str,
    ) -> Result<FileMeta, ApiError> {
        if declared_name.contains("..") {
            return Err(ApiError::BadRequest("invalid path sequence in filename".into()));
        }
        let original_name = sanitize(declared_name);
        if original_name.is_empty() {
            return Err(ApiError::BadRequest("empty filename".into()));
        }

        // The locator is a fresh random id plus the original extension,
        // never derived from the declared name.
        let ext = Path::new(&original_name)
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("bin");
        let stored_name = format!("{}.{}", uuid::Uuid::new_v4(), ext);

        let mime = declared_mime.or_else(|| infer::get(bytes).map(|t| t.mime_type().to_string()));
        let meta = FileMeta {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            original_name,
            stored_name,
            mime_type: mime,
            size_bytes: bytes.len() as i64,
            created_at: Utc::now(),
            share: None,
        };

        if let Err(e) = self.blobs.write_new(&meta.stored_name, bytes) {
            // a failed write can still leave a truncated blob behind
            if let Err(rm) = self.blobs.remove_if_exists(&meta.stored_name) {
                log::error!(
                    "partial bytes left after failed write locator={} err={rm:?}",
                    meta.stored_name
                );
            }
            return Err(e.into());
        }
        if let Err(e) = self.repo.save(&meta).await {
            if let Err(rm) = self.blobs.remove_if_exists(&meta.stored_name) {
                log::error!(
                    "orphaned bytes after failed metadata save locator={} err={rm:?}",
                    meta.stored_name
                );
            }
            return Err(e);
        }
        Ok(meta)
    }

    pub async fn list_owned_by(&self, owner_id: &str) -> Result<Vec<FileMeta>, ApiError> {
        self.repo.find_all_by_owner(owner_id).await
    }

    /// Ownership is the sole read gate here; admins get no bypass on this
    /// path (the admin listing goes through `list_all`/`admin_delete`).
    pub async fn fetch_for_read(
        &self,
        file_id: &str,
        requester_id: &str,
    ) -> Result<FileMeta, ApiError> {
        self.repo
            .find_by_id_and_owner(file_id, requester_id)
            .await?
            .ok_or(ApiError::NotFound)
    }

    /// Re-validates ownership, then resolves the locator. Metadata without
    /// bytes is storage/metadata divergence and reads as absent.
    pub async fn open_for_streaming(
        &self,
        file_id: &str,
        requester_id: &str,
    ) -> Result<(FileMeta, Vec<u8>), ApiError> {
        let meta = self.fetch_for_read(file_id, requester_id).await?;
        let bytes = self.read_blob(&meta)?;
        Ok((meta, bytes))
    }

    fn read_blob(&self, meta: &FileMeta) -> Result<Vec<u8>, ApiError> {
        match self.blobs.read_all(&meta.stored_name) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!(
                    "metadata without bytes file_id={} locator={}",
                    meta.id,
                    meta.stored_name
                );
                Err(ApiError::NotFound)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Replaces any previous descriptor. Link ids are fresh random UUIDs,
    /// never sequential. Expiry is recorded here and enforced on resolve.
    pub async fn create_share_link(
        &self,
        file_id: &str,
        requester_id: &str,
        kind: LinkKind,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<FileMeta, ApiError> {
        let mut meta = self.fetch_for_read(file_id, requester_id).await?;
        let share = ShareDescriptor {
            link_id: uuid::Uuid::new_v4().simple().to_string(),
            kind,
            expires_at,
        };
        self.repo.set_share(&meta.id, &share).await?;
        meta.share = Some(share);
        Ok(meta)
    }

    /// Public path: no principal, the link id is the credential. Unknown,
    /// expired and already-consumed links are indistinguishable. A one-time
    /// link is consumed with a guarded clear; when two resolutions race,
    /// the guard lets exactly one of them return the bytes.
    pub async fn resolve_share(
        &self,
        link_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(FileMeta, Vec<u8>), ApiError> {
        let meta = self
            .repo
            .find_by_link_id(link_id)
            .await?
            .ok_or(ApiError::NotFound)?;
        let share = meta.share.clone().ok_or(ApiError::NotFound)?;
        if let Some(expires_at) = share.expires_at {
            if now > expires_at {
                return Err(ApiError::NotFound);
            }
        }
        let bytes = self.read_blob(&meta)?;
        if share.kind == LinkKind::OneTime && !self.repo.clear_share(&meta.id, link_id).await? {
            return Err(ApiError::NotFound);
        }
        Ok((meta, bytes))
    }

    /// Bytes go before metadata: an IO failure removing the blob keeps the
    /// record (and surfaces Internal) rather than silently orphaning bytes.
    /// A concurrent delete losing the metadata race observes NotFound.
    pub async fn delete(&self, file_id: &str, requester_id: &str) -> Result<(), ApiError> {
        let meta = self.fetch_for_read(file_id, requester_id).await?;
        self.remove_record(&meta).await
    }

    async fn remove_record(&self, meta: &FileMeta) -> Result<(), ApiError> {
        // re-check right before acting so a concurrent delete settles on
        // NotFound instead of double-removing
        if !self.repo.exists_by_id(&meta.id).await? {
            return Err(ApiError::NotFound);
        }
        self.blobs.remove_if_exists(&meta.stored_name)?;
        if !self.repo.delete(&meta.id).await? {
            return Err(ApiError::NotFound);
        }
        Ok(())
    }

    // Admin listing path, only reachable behind the admin role gate.

    pub async fn list_all(&self) -> Result<Vec<FileMeta>, ApiError> {
        self.repo.find_all().await
    }

    pub async fn admin_delete(&self, file_id: &str) -> Result<(), ApiError> {
        let meta = self
            .repo
            .find_by_id(file_id)
            .await?
            .ok_or(ApiError::NotFound)?;
        self.remove_record(&meta).await
    }

    /// Reclaims every file a user owns; used when an admin removes the
    /// account itself.
    pub async fn delete_all_owned_by(&self, owner_id: &str) -> Result<usize, ApiError> {
        let files = self.repo.find_all_by_owner(owner_id).await?;
        let mut removed = 0;
        for meta in &files {
            match self.remove_record(meta).await {
                Ok(()) => removed += 1,
                // a concurrent owner delete got there first, that's fine
                Err(ApiError::NotFound) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Db, MIGRATOR};
    use super::repo::SqliteFileRepo;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use std::str::FromStr;

    const ALICE: &str = "user-alice";
    const BOB: &str = "user-bob";

    async fn setup() -> (FileStore, tempfile::TempDir) {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:").unwrap();
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await
            .unwrap();
        MIGRATOR.run(&pool).await.unwrap();
        for (id, name) in [(ALICE, "alice"), (BOB, "bob")] {
            sqlx::query(
                "INSERT INTO users(id, username, email, password_hash, role, verified, created_at, updated_at) \
                 VALUES (?, ?, ?, 'x', 'user', 1, ?, ?)",
            )
            .bind(id)
            .bind(name)
            .bind(format!("{name}@example.org"))
            .bind(Utc::now())
            .bind(Utc::now())
            .execute(&pool)
            .await
            .unwrap();
        }
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(
            Arc::new(SqliteFileRepo::new(Db(pool))),
            BlobStore::new(dir.path()),
        );
        (store, dir)
    }

    #[actix_web::test]
    async fn store_then_fetch_matches_input() {
        let (store, _dir) = setup().await;
        let meta = store
            .store(b"0123456789", "report.pdf", Some("application/pdf".into()), ALICE)
            .await
            .unwrap();
        assert_eq!(meta.size_bytes, 10);
        assert_eq!(meta.original_name, "report.pdf");
        assert!(meta.stored_name.ends_with(".pdf"));
        assert_ne!(meta.stored_name, "report.pdf");

        let fetched = store.fetch_for_read(&meta.id, ALICE).await.unwrap();
        assert_eq!(fetched.size_bytes, 10);
        assert_eq!(fetched.mime_type.as_deref(), Some("application/pdf"));

        let (_, bytes) = store.open_for_streaming(&meta.id, ALICE).await.unwrap();
        assert_eq!(bytes, b"0123456789");
    }

    #[actix_web::test]
    async fn traversal_name_is_rejected_and_nothing_is_written() {
        let (store, dir) = setup().await;
        let err = store
            .store(b"sneaky", "../secret", None, ALICE)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        assert!(store.list_owned_by(ALICE).await.unwrap().is_empty());
    }

    #[actix_web::test]
    async fn non_owner_gets_not_found_everywhere() {
        let (store, _dir) = setup().await;
        let meta = store.store(b"mine", "mine.txt", None, ALICE).await.unwrap();

        assert_eq!(
            store.fetch_for_read(&meta.id, BOB).await.unwrap_err(),
            ApiError::NotFound
        );
        assert_eq!(
            store.open_for_streaming(&meta.id, BOB).await.unwrap_err(),
            ApiError::NotFound
        );
        assert_eq!(
            store.delete(&meta.id, BOB).await.unwrap_err(),
            ApiError::NotFound
        );
        // still intact for the owner
        assert!(store.fetch_for_read(&meta.id, ALICE).await.is_ok());
    }

    #[actix_web::test]
    async fn listing_is_scoped_to_the_owner() {
        let (store, _dir) = setup().await;
        store.store(b"a", "a.txt", None, ALICE).await.unwrap();
        store.store(b"b", "b.txt", None, ALICE).await.unwrap();
        store.store(b"c", "c.txt", None, BOB).await.unwrap();

        assert_eq!(store.list_owned_by(ALICE).await.unwrap().len(), 2);
        assert_eq!(store.list_owned_by(BOB).await.unwrap().len(), 1);
        assert_eq!(store.list_all().await.unwrap().len(), 3);
    }

    /// Repo whose `save` always fails, for exercising the store rollback.
    struct FailingSaveRepo;

    #[async_trait::async_trait]
    impl FileRepo for FailingSaveRepo {
        async fn save(&self, _meta: &FileMeta) -> Result<(), ApiError> {
            Err(ApiError::Internal)
        }
        async fn find_by_id(&self, _id: &str) -> Result<Option<FileMeta>, ApiError> {
            Ok(None)
        }
        async fn find_by_id_and_owner(
            &self,
            _id: &str,
            _owner_id: &str,
        ) -> Result<Option<FileMeta>, ApiError> {
            Ok(None)
        }
        async fn find_all_by_owner(&self, _owner_id: &str) -> Result<Vec<FileMeta>, ApiError> {
            Ok(Vec::new())
        }
        async fn find_all(&self) -> Result<Vec<FileMeta>, ApiError> {
            Ok(Vec::new())
        }
        async fn exists_by_id(&self, _id: &str) -> Result<bool, ApiError> {
            Ok(false)
        }
        async fn delete(&self, _id: &str) -> Result<bool, ApiError> {
            Ok(false)
        }
        async fn set_share(
            &self,
            _file_id: &str,
            _share: &ShareDescriptor,
        ) -> Result<(), ApiError> {
            Ok(())
        }
        async fn find_by_link_id(&self, _link_id: &str) -> Result<Option<FileMeta>, ApiError> {
            Ok(None)
        }
        async fn clear_share(&self, _file_id: &str, _link_id: &str) -> Result<bool, ApiError> {
            Ok(false)
        }
    }

    #[actix_web::test]
    async fn failed_metadata_save_rolls_back_written_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(Arc::new(FailingSaveRepo), BlobStore::new(dir.path()));

        let err = store
            .store(b"doomed", "doc.txt", None, ALICE)
            .await
            .unwrap_err();
        assert_eq!(err, ApiError::Internal);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[actix_web::test]
    async fn failed_blob_write_creates_no_metadata() {
        let (mut store, dir) = setup().await;
        // point the blob root somewhere that cannot be written to
        store.blobs = BlobStore::new(dir.path().join("missing"));

        let err = store
            .store(b"doomed", "doc.txt", None, ALICE)
            .await
            .unwrap_err();
        assert_eq!(err, ApiError::Internal);
        assert!(store.list_owned_by(ALICE).await.unwrap().is_empty());
    }

    #[actix_web::test]
    async fn delete_reclaims_bytes_and_second_delete_is_not_found() {
        let (store, dir) = setup().await;
        let meta = store.store(b"bye", "bye.txt", None, ALICE).await.unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

        store.delete(&meta.id, ALICE).await.unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        assert_eq!(
            store.delete(&meta.id, ALICE).await.unwrap_err(),
            ApiError::NotFound
        );
    }

    #[actix_web::test]
    async fn concurrent_deletes_settle_on_exactly_one_winner() {
        let (store, _dir) = setup().await;
        let store = Arc::new(store);
        let meta = store.store(b"bye", "bye.txt", None, ALICE).await.unwrap();

        let (s1, s2) = (store.clone(), store.clone());
        let (id1, id2) = (meta.id.clone(), meta.id.clone());
        let h1 = actix_web::rt::spawn(async move { s1.delete(&id1, ALICE).await });
        let h2 = actix_web::rt::spawn(async move { s2.delete(&id2, ALICE).await });
        let results = [h1.await.unwrap(), h2.await.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        for r in results {
            if let Err(e) = r {
                assert_eq!(e, ApiError::NotFound);
            }
        }
        assert!(store.list_owned_by(ALICE).await.unwrap().is_empty());
    }

    #[actix_web::test]
    async fn missing_bytes_with_metadata_reads_as_not_found() {
        let (store, dir) = setup().await;
        let meta = store.store(b"gone", "gone.txt", None, ALICE).await.unwrap();
        std::fs::remove_file(dir.path().join(&meta.stored_name)).unwrap();
        assert_eq!(
            store.open_for_streaming(&meta.id, ALICE).await.unwrap_err(),
            ApiError::NotFound
        );
    }

    #[actix_web::test]
    async fn one_time_link_serves_exactly_once() {
        let (store, _dir) = setup().await;
        let meta = store
            .store(b"0123456789", "report.pdf", None, ALICE)
            .await
            .unwrap();
        assert_eq!(
            store.fetch_for_read(&meta.id, BOB).await.unwrap_err(),
            ApiError::NotFound
        );

        let shared = store
            .create_share_link(&meta.id, ALICE, LinkKind::OneTime, None)
            .await
            .unwrap();
        let link_id = shared.share.unwrap().link_id;

        let (_, bytes) = store.resolve_share(&link_id, Utc::now()).await.unwrap();
        assert_eq!(bytes, b"0123456789");
        assert_eq!(
            store.resolve_share(&link_id, Utc::now()).await.unwrap_err(),
            ApiError::NotFound
        );
        // the file itself is untouched by link consumption
        assert!(store.fetch_for_read(&meta.id, ALICE).await.is_ok());
    }

    #[actix_web::test]
    async fn permanent_link_survives_repeat_resolution() {
        let (store, _dir) = setup().await;
        let meta = store.store(b"doc", "doc.txt", None, ALICE).await.unwrap();
        let shared = store
            .create_share_link(&meta.id, ALICE, LinkKind::Permanent, None)
            .await
            .unwrap();
        let link_id = shared.share.unwrap().link_id;

        store.resolve_share(&link_id, Utc::now()).await.unwrap();
        store.resolve_share(&link_id, Utc::now()).await.unwrap();
    }

    #[actix_web::test]
    async fn expired_link_is_not_found() {
        let (store, _dir) = setup().await;
        let meta = store.store(b"doc", "doc.txt", None, ALICE).await.unwrap();
        let expires = Utc::now() - chrono::Duration::seconds(1);
        let shared = store
            .create_share_link(&meta.id, ALICE, LinkKind::Permanent, Some(expires))
            .await
            .unwrap();
        let link_id = shared.share.unwrap().link_id;

        assert_eq!(
            store.resolve_share(&link_id, Utc::now()).await.unwrap_err(),
            ApiError::NotFound
        );
    }

    #[actix_web::test]
    async fn share_link_only_mintable_by_the_owner() {
        let (store, _dir) = setup().await;
        let meta = store.store(b"doc", "doc.txt", None, ALICE).await.unwrap();
        assert_eq!(
            store
                .create_share_link(&meta.id, BOB, LinkKind::Permanent, None)
                .await
                .unwrap_err(),
            ApiError::NotFound
        );
    }

    #[actix_web::test]
    async fn deleting_a_user_reclaims_every_owned_file() {
        let (store, dir) = setup().await;
        store.store(b"a", "a.txt", None, ALICE).await.unwrap();
        store.store(b"b", "b.txt", None, ALICE).await.unwrap();
        store.store(b"c", "c.txt", None, BOB).await.unwrap();

        assert_eq!(store.delete_all_owned_by(ALICE).await.unwrap(), 2);
        assert!(store.list_owned_by(ALICE).await.unwrap().is_empty());
        assert_eq!(store.list_owned_by(BOB).await.unwrap().len(), 1);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
