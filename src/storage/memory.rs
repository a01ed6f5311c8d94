use super::{ObjectLocation, ObjectStore, StorageError, Tags};
use async_trait::async_trait;
use dashmap::DashMap;

#[derive(Debug, Clone, Default)]
struct StoredObject {
    data: Vec<u8>,
    tags: Tags,
}

/// 进程内对象存储 (本地运行与测试)
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: DashMap<ObjectLocation, StoredObject>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, location: &ObjectLocation, data: &[u8]) -> Result<(), StorageError> {
        // 覆盖写入会清空旧标签
        self.objects.insert(
            location.clone(),
            StoredObject {
                data: data.to_vec(),
                tags: Tags::new(),
            },
        );
        Ok(())
    }

    async fn get(&self, location: &ObjectLocation) -> Result<Vec<u8>, StorageError> {
        self.objects
            .get(location)
            .map(|obj| obj.data.clone())
            .ok_or_else(|| StorageError::NotFound(location.clone()))
    }

    async fn list(&self, bucket: &str) -> Result<Vec<String>, StorageError> {
        let mut keys: Vec<String> = self
            .objects
            .iter()
            .filter(|entry| entry.key().bucket == bucket)
            .map(|entry| entry.key().key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn get_tags(&self, location: &ObjectLocation) -> Result<Tags, StorageError> {
        self.objects
            .get(location)
            .map(|obj| obj.tags.clone())
            .ok_or_else(|| StorageError::NotFound(location.clone()))
    }

    async fn put_tags(&self, location: &ObjectLocation, tags: &Tags) -> Result<(), StorageError> {
        match self.objects.get_mut(location) {
            Some(mut obj) => {
                obj.tags = tags.clone();
                Ok(())
            }
            None => Err(StorageError::NotFound(location.clone())),
        }
    }

    async fn copy(&self, from: &ObjectLocation, to: &ObjectLocation) -> Result<(), StorageError> {
        // 先克隆再插入，避免同时持有两个分片锁
        let object = self
            .objects
            .get(from)
            .map(|obj| obj.clone())
            .ok_or_else(|| StorageError::NotFound(from.clone()))?;
        self.objects.insert(to.clone(), object);
        Ok(())
    }

    async fn delete(&self, location: &ObjectLocation) -> Result<(), StorageError> {
        self.objects.remove(location);
        Ok(())
    }

    async fn exists(&self, location: &ObjectLocation) -> Result<bool, StorageError> {
        Ok(self.objects.contains_key(location))
    }
}
