use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::{debug, warn};

use crate::db;
use crate::fetch::Fetch;

/// A document served from (or freshly written to) the cache.
#[derive(Debug)]
pub struct CachedDocument {
    pub bytes: Vec<u8>,
    pub path: PathBuf,
    pub file_id: i64,
    /// Set once the document has been linked to the entity it describes.
    pub link_id: Option<i64>,
}

/// On-disk store of downloaded documents, indexed in `linked_files`.
pub struct ContentCache {
    dir: PathBuf,
}

impl ContentCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        ContentCache { dir: dir.into() }
    }

    /// Serve `url` from the cache when its file is still on disk, otherwise
    /// download it. A stale entry is rewritten in place so it keeps its link.
    pub async fn get_or_fetch<F: Fetch>(
        &self,
        conn: &Connection,
        fetcher: &F,
        url: &str,
    ) -> Result<CachedDocument> {
        let entries = db::linked_files_by_url(conn, url)?;
        if entries.len() > 1 {
            warn!("Found {} cache entries for {}, taking the first", entries.len(), url);
        }

        let stale = match entries.into_iter().next() {
            Some(entry) => {
                let path = PathBuf::from(&entry.path);
                debug!("Trying to reuse {} from {:?}", url, path);
                match std::fs::read(&path) {
                    Ok(bytes) => {
                        return Ok(CachedDocument {
                            bytes,
                            path,
                            file_id: entry.id,
                            link_id: entry.link_id,
                        });
                    }
                    Err(e) => {
                        debug!("Not reusing {:?}: {}", path, e);
                        Some(entry)
                    }
                }
            }
            None => None,
        };

        debug!("Getting {}", url);
        let bytes = fetcher
            .get(url, None)
            .await
            .with_context(|| format!("Failed to download {}", url))?;

        let path = self.target_path(conn, url)?;
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {:?}", self.dir))?;
        std::fs::write(&path, &bytes).with_context(|| format!("Failed to write {:?}", path))?;
        let path_str = path.to_string_lossy();

        let (file_id, link_id) = match stale {
            Some(entry) => {
                db::refresh_linked_file(conn, entry.id, &path_str)?;
                (entry.id, entry.link_id)
            }
            None => (db::insert_linked_file(conn, url, &path_str)?, None),
        };

        Ok(CachedDocument {
            bytes,
            path,
            file_id,
            link_id,
        })
    }

    /// `<dir>/<basename of the URL path>`, suffixed `_N` while another
    /// URL's entry owns that name.
    fn target_path(&self, conn: &Connection, url: &str) -> Result<PathBuf> {
        let name = basename(url);
        let stem = Path::new(&name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.clone());
        let ext = Path::new(&name)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        let mut candidate = self.dir.join(&name);
        let mut n = 1;
        while db::path_owned_by_other(conn, &candidate.to_string_lossy(), url)? {
            candidate = self.dir.join(format!("{}_{}{}", stem, n, ext));
            n += 1;
        }
        Ok(candidate)
    }
}

fn basename(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::Canned;

    const URL: &str = "http://www.knesset.gov.il/laws/data/booklet/700/700.pdf";

    #[tokio::test]
    async fn warm_entry_makes_no_network_call() {
        let dir = tempfile::tempdir().unwrap();
        let conn = db::test_conn();
        let path = dir.path().join("700.pdf");
        std::fs::write(&path, b"cached").unwrap();
        db::insert_linked_file(&conn, URL, &path.to_string_lossy()).unwrap();

        let fetcher = Canned::default();
        let cache = ContentCache::new(dir.path());
        let doc = cache.get_or_fetch(&conn, &fetcher, URL).await.unwrap();

        assert_eq!(doc.bytes, b"cached");
        assert_eq!(fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn missing_file_is_downloaded_once_and_entry_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let conn = db::test_conn();
        let gone = dir.path().join("old/700.pdf");
        let file_id = db::insert_linked_file(&conn, URL, &gone.to_string_lossy()).unwrap();
        let link_id = db::insert_link(&conn, URL, URL, "gov_proposal", 1).unwrap();
        db::attach_link(&conn, file_id, link_id).unwrap();

        let fetcher = Canned::default().bytes(URL, b"fresh");
        let cache = ContentCache::new(dir.path().join("files"));
        let doc = cache.get_or_fetch(&conn, &fetcher, URL).await.unwrap();

        assert_eq!(fetcher.call_count(), 1);
        assert_eq!(doc.bytes, b"fresh");
        assert_eq!(doc.file_id, file_id);
        assert_eq!(doc.link_id, Some(link_id));
        assert!(doc.path.exists());

        let entries = db::linked_files_by_url(&conn, URL).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(PathBuf::from(&entries[0].path), doc.path);

        // And now it is warm.
        cache.get_or_fetch(&conn, &fetcher, URL).await.unwrap();
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn cold_miss_writes_basename_and_unlinked_entry() {
        let dir = tempfile::tempdir().unwrap();
        let conn = db::test_conn();
        let fetcher = Canned::default().bytes(URL, b"pdf");
        let cache = ContentCache::new(dir.path());

        let doc = cache.get_or_fetch(&conn, &fetcher, URL).await.unwrap();
        assert_eq!(doc.path, dir.path().join("700.pdf"));
        assert_eq!(doc.link_id, None);
    }

    #[tokio::test]
    async fn same_basename_for_different_urls_does_not_clobber() {
        let dir = tempfile::tempdir().unwrap();
        let conn = db::test_conn();
        let other = "http://www.knesset.gov.il/laws/data/booklet/701/700.pdf";
        let fetcher = Canned::default().bytes(URL, b"a").bytes(other, b"b");
        let cache = ContentCache::new(dir.path());

        let a = cache.get_or_fetch(&conn, &fetcher, URL).await.unwrap();
        let b = cache.get_or_fetch(&conn, &fetcher, other).await.unwrap();
        assert_ne!(a.path, b.path);
        assert_eq!(b.path, dir.path().join("700_1.pdf"));
        assert_eq!(std::fs::read(&a.path).unwrap(), b"a");
    }

    #[tokio::test]
    async fn download_failure_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let conn = db::test_conn();
        let cache = ContentCache::new(dir.path());
        assert!(cache.get_or_fetch(&conn, &Canned::default(), URL).await.is_err());
    }
}
