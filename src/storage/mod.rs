//! 对象存储抽象：原始单据与抽取结果都按 (bucket, key) 存放，并可打标签。

pub mod filesystem;
pub mod memory;

pub use filesystem::FilesystemObjectStore;
pub use memory::MemoryObjectStore;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 对象标签 (保持写入顺序)
pub type Tags = IndexMap<String, String>;

/// 对象位置
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// 同名 key 换到另一个 bucket
    pub fn in_bucket(&self, bucket: &str) -> Self {
        Self::new(bucket, self.key.clone())
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key.trim_start_matches('/'))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(ObjectLocation),

    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed tag set: {0}")]
    Tags(#[from] serde_json::Error),
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, location: &ObjectLocation, data: &[u8]) -> Result<(), StorageError>;

    async fn get(&self, location: &ObjectLocation) -> Result<Vec<u8>, StorageError>;

    /// 列出 bucket 下所有 key (字典序)
    async fn list(&self, bucket: &str) -> Result<Vec<String>, StorageError>;

    async fn get_tags(&self, location: &ObjectLocation) -> Result<Tags, StorageError>;

    /// 整体替换标签集
    async fn put_tags(&self, location: &ObjectLocation, tags: &Tags) -> Result<(), StorageError>;

    /// 复制对象 (连同标签)
    async fn copy(&self, from: &ObjectLocation, to: &ObjectLocation) -> Result<(), StorageError>;

    /// 删除对象；不存在时视为成功
    async fn delete(&self, location: &ObjectLocation) -> Result<(), StorageError>;

    async fn exists(&self, location: &ObjectLocation) -> Result<bool, StorageError>;
}
