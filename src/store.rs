//! Object store listing.
//!
//! The producer only needs paged key listing. [`DirStore`] maps a bucket to
//! a local directory; [`StaticStore`] serves a fixed key list.

use crate::error::{Error, Result};
use std::future::Future;
use std::path::PathBuf;
use tracing::warn;

/// One page of keys plus the token to fetch the next one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectPage {
    pub keys: Vec<String>,
    pub next: Option<String>,
}

pub trait ObjectStore: Send + Sync {
    fn list_page(
        &self,
        bucket: &str,
        page_size: usize,
        continuation: Option<&str>,
    ) -> impl Future<Output = Result<ObjectPage>> + Send;
}

/// Paginate a sorted key list: keys strictly after `continuation`.
fn page_of(sorted: &[String], page_size: usize, continuation: Option<&str>) -> ObjectPage {
    let start = match continuation {
        Some(after) => sorted.partition_point(|k| k.as_str() <= after),
        None => 0,
    };
    let end = (start + page_size).min(sorted.len());
    let keys = sorted[start..end].to_vec();
    let next = if end < sorted.len() {
        keys.last().cloned()
    } else {
        None
    };
    ObjectPage { keys, next }
}

/// Buckets are subdirectories of `root`; keys are the regular file names.
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ObjectStore for DirStore {
    async fn list_page(
        &self,
        bucket: &str,
        page_size: usize,
        continuation: Option<&str>,
    ) -> Result<ObjectPage> {
        let dir = self.root.join(bucket);
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| Error::Store(format!("cannot list {}: {e}", dir.display())))?;

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(key) => keys.push(key),
                Err(name) => warn!(?name, bucket, "skipping file name that is not UTF-8"),
            }
        }
        keys.sort();
        Ok(page_of(&keys, page_size, continuation))
    }
}

/// A fixed key list, served for any bucket.
pub struct StaticStore {
    keys: Vec<String>,
}

impl StaticStore {
    pub fn new<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let mut keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        keys.sort();
        keys.dedup();
        Self { keys }
    }
}

impl ObjectStore for StaticStore {
    async fn list_page(
        &self,
        _bucket: &str,
        page_size: usize,
        continuation: Option<&str>,
    ) -> Result<ObjectPage> {
        Ok(page_of(&self.keys, page_size, continuation))
    }
}

/// Either store backend, chosen at startup.
pub enum Store {
    Dir(DirStore),
    Static(StaticStore),
}

impl ObjectStore for Store {
    async fn list_page(
        &self,
        bucket: &str,
        page_size: usize,
        continuation: Option<&str>,
    ) -> Result<ObjectPage> {
        match self {
            Store::Dir(s) => s.list_page(bucket, page_size, continuation).await,
            Store::Static(s) => s.list_page(bucket, page_size, continuation).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_store_pages_in_key_order() {
        let store = StaticStore::new(["c.jpg", "a.jpg", "b.jpg"]);
        let first = store.list_page("any", 2, None).await.unwrap();
        assert_eq!(first.keys, ["a.jpg", "b.jpg"]);
        assert_eq!(first.next.as_deref(), Some("b.jpg"));

        let second = store
            .list_page("any", 2, first.next.as_deref())
            .await
            .unwrap();
        assert_eq!(second.keys, ["c.jpg"]);
        assert!(second.next.is_none());
    }

    #[tokio::test]
    async fn exact_multiple_of_page_size_ends_cleanly() {
        let store = StaticStore::new(["a", "b"]);
        let page = store.list_page("any", 2, None).await.unwrap();
        assert_eq!(page.keys.len(), 2);
        assert!(page.next.is_none());
    }

    #[tokio::test]
    async fn dir_store_lists_files_of_bucket() {
        let root = std::env::temp_dir()
            .join("carscan-test")
            .join(uuid::Uuid::new_v4().to_string());
        let bucket = root.join("cars");
        tokio::fs::create_dir_all(bucket.join("nested")).await.unwrap();
        tokio::fs::write(bucket.join("b.jpg"), b"").await.unwrap();
        tokio::fs::write(bucket.join("a.jpg"), b"").await.unwrap();

        let store = DirStore::new(&root);
        let page = store.list_page("cars", 10, None).await.unwrap();
        assert_eq!(page.keys, ["a.jpg", "b.jpg"]);

        let missing = store.list_page("trucks", 10, None).await;
        assert!(matches!(missing, Err(Error::Store(_))));

        let _ = tokio::fs::remove_dir_all(&root).await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn dir_store_skips_non_utf8_names() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let root = std::env::temp_dir()
            .join("carscan-test")
            .join(uuid::Uuid::new_v4().to_string());
        let bucket = root.join("cars");
        tokio::fs::create_dir_all(&bucket).await.unwrap();
        tokio::fs::write(bucket.join("a.jpg"), b"").await.unwrap();
        tokio::fs::write(bucket.join(OsStr::from_bytes(b"bad\xff.jpg")), b"")
            .await
            .unwrap();

        let page = DirStore::new(&root).list_page("cars", 10, None).await.unwrap();
        assert_eq!(page.keys, ["a.jpg"]);
        assert!(page.next.is_none());

        let _ = tokio::fs::remove_dir_all(&root).await;
    }
}
