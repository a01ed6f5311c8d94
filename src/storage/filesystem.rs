use super::{ObjectLocation, ObjectStore, StorageError, Tags};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

const TAGS_DIR: &str = ".tags";

/// 本地文件系统对象存储
///
/// 布局: `{root}/{bucket}/{key}`，标签存放在 `{root}/.tags/{bucket}/{key}.json`。
/// 写入采用临时文件 + rename，读取方不会看到半个文件。
#[derive(Debug, Clone)]
pub struct FilesystemObjectStore {
    root: PathBuf,
}

impl FilesystemObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, location: &ObjectLocation) -> Result<PathBuf, StorageError> {
        let bucket = checked_bucket(&location.bucket)?;
        Ok(self.root.join(bucket).join(relative_key(&location.key)?))
    }

    fn tags_path(&self, location: &ObjectLocation) -> Result<PathBuf, StorageError> {
        let bucket = checked_bucket(&location.bucket)?;
        let mut path = self.root.join(TAGS_DIR).join(bucket).join(relative_key(&location.key)?);
        let file_name = match path.file_name() {
            Some(name) => format!("{}.json", name.to_string_lossy()),
            None => return Err(StorageError::InvalidKey(location.key.clone())),
        };
        path.set_file_name(file_name);
        Ok(path)
    }

    async fn read_tags_file(&self, location: &ObjectLocation) -> Result<Tags, StorageError> {
        match fs::read(self.tags_path(location)?).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Tags::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn ensure_exists(&self, location: &ObjectLocation) -> Result<(), StorageError> {
        if self.exists(location).await? {
            Ok(())
        } else {
            Err(StorageError::NotFound(location.clone()))
        }
    }
}

fn checked_bucket(bucket: &str) -> Result<&str, StorageError> {
    if bucket.is_empty() || bucket.starts_with('.') || bucket.contains(['/', '\\']) {
        return Err(StorageError::InvalidKey(format!("bucket '{}'", bucket)));
    }
    Ok(bucket)
}

/// key 转相对路径；拒绝 `..`、隐藏段与空 key
fn relative_key(key: &str) -> Result<PathBuf, StorageError> {
    let mut path = PathBuf::new();
    for segment in key.split('/').filter(|s| !s.is_empty()) {
        if segment.starts_with('.') || segment.contains('\\') {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        path.push(segment);
    }
    if path.as_os_str().is_empty() {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(path)
}

async fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StorageError> {
    let Some(parent) = path.parent() else {
        return Err(StorageError::InvalidKey(path.display().to_string()));
    };
    fs::create_dir_all(parent).await?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = parent.join(format!(".{}.tmp", file_name));
    fs::write(&temp_path, data).await?;
    fs::rename(&temp_path, path).await.map_err(|e| {
        warn!(from = %temp_path.display(), to = %path.display(), error = %e, "object store: rename failed");
        e
    })?;
    Ok(())
}

async fn remove_if_present(path: &Path) -> Result<(), StorageError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl ObjectStore for FilesystemObjectStore {
    async fn put(&self, location: &ObjectLocation, data: &[u8]) -> Result<(), StorageError> {
        let path = self.object_path(location)?;
        debug!(location = %location, size = data.len(), "object store: put");
        write_atomic(&path, data).await?;
        remove_if_present(&self.tags_path(location)?).await
    }

    async fn get(&self, location: &ObjectLocation) -> Result<Vec<u8>, StorageError> {
        match fs::read(self.object_path(location)?).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound(location.clone())),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, bucket: &str) -> Result<Vec<String>, StorageError> {
        let base = self.root.join(checked_bucket(bucket)?);
        let mut keys = Vec::new();
        let mut pending = vec![base.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                if entry.file_name().to_string_lossy().starts_with('.') {
                    continue;
                }
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                } else if let Ok(relative) = path.strip_prefix(&base) {
                    let key: Vec<String> = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect();
                    keys.push(key.join("/"));
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn get_tags(&self, location: &ObjectLocation) -> Result<Tags, StorageError> {
        self.ensure_exists(location).await?;
        self.read_tags_file(location).await
    }

    async fn put_tags(&self, location: &ObjectLocation, tags: &Tags) -> Result<(), StorageError> {
        self.ensure_exists(location).await?;
        let bytes = serde_json::to_vec(tags)?;
        write_atomic(&self.tags_path(location)?, &bytes).await
    }

    async fn copy(&self, from: &ObjectLocation, to: &ObjectLocation) -> Result<(), StorageError> {
        let data = self.get(from).await?;
        let tags = self.read_tags_file(from).await?;
        write_atomic(&self.object_path(to)?, &data).await?;

        let tags_path = self.tags_path(to)?;
        if tags.is_empty() {
            remove_if_present(&tags_path).await
        } else {
            write_atomic(&tags_path, &serde_json::to_vec(&tags)?).await
        }
    }

    async fn delete(&self, location: &ObjectLocation) -> Result<(), StorageError> {
        remove_if_present(&self.object_path(location)?).await?;
        remove_if_present(&self.tags_path(location)?).await
    }

    async fn exists(&self, location: &ObjectLocation) -> Result<bool, StorageError> {
        Ok(fs::try_exists(self.object_path(location)?).await?)
    }
}
