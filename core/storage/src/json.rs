//! JSON file persistence shared by the file-backed stores.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;

use offsync_common::Result;

/// Load a JSON document, or `T::default()` if the file does not exist.
///
/// # Errors
/// - I/O errors other than "not found"
/// - Corrupt documents (never silently discarded)
pub async fn load_or_default<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    match fs::read_to_string(path).await {
        Ok(content) => Ok(serde_json::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e.into()),
    }
}

/// Write a JSON document atomically.
///
/// The document is written to a sibling temp file, flushed, and renamed over
/// the target so a crash leaves either the old or the new version.
pub async fn store_atomic<T>(path: &Path, value: &T) -> Result<()>
where
    T: Serialize + ?Sized,
{
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }

    let json = serde_json::to_vec_pretty(value)?;
    let tmp = temp_path(path);

    {
        use tokio::io::AsyncWriteExt;
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
    }

    fs::rename(&tmp, path).await?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_yields_default() {
        let temp = TempDir::new().unwrap();
        let loaded: BTreeMap<String, i64> =
            load_or_default(&temp.path().join("absent.json")).await.unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn test_store_creates_parents_and_leaves_no_temp() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/dir/state.json");

        let mut value = BTreeMap::new();
        value.insert("note".to_string(), 42i64);
        store_atomic(&path, &value).await.unwrap();

        let loaded: BTreeMap<String, i64> = load_or_default(&path).await.unwrap();
        assert_eq!(loaded.get("note"), Some(&42));
        assert!(!temp_path(&path).exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let loaded: Result<BTreeMap<String, i64>> = load_or_default(&path).await;
        assert!(loaded.is_err());
    }
}
