use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;

use crate::services::question_bank::BankError;

/// Named-slot key/value capability the question bank persists through.
///
/// Each call is atomic with respect to its own slot; there is no
/// cross-call transaction.
#[async_trait]
pub trait SlotStorage: Send + Sync {
    fn backend(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<String>, BankError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), BankError>;

    async fn remove(&self, key: &str) -> Result<(), BankError>;

    async fn ping(&self) -> Result<(), BankError> {
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySlotStorage {
    slots: RwLock<HashMap<String, String>>,
}

impl MemorySlotStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SlotStorage for MemorySlotStorage {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, BankError> {
        Ok(self.slots.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), BankError> {
        self.slots
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), BankError> {
        self.slots.write().await.remove(key);
        Ok(())
    }
}

/// Stores every slot as `<dir>/<key>.json`. Writes go through a temporary
/// file and a rename so a slot is never observed half-written.
pub struct FileSlotStorage {
    dir: PathBuf,
}

impl FileSlotStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn slot_path(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", file_name))
    }
}

#[async_trait]
impl SlotStorage for FileSlotStorage {
    fn backend(&self) -> &'static str {
        "file"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, BankError> {
        match tokio::fs::read_to_string(self.slot_path(key)).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BankError::storage(format!("Failed to read slot {}: {}", key, e))),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), BankError> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            BankError::storage(format!(
                "Failed to create bank directory {}: {}",
                self.dir.display(),
                e
            ))
        })?;

        let path = self.slot_path(key);
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, value)
            .await
            .map_err(|e| BankError::storage(format!("Failed to write slot {}: {}", key, e)))?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| BankError::storage(format!("Failed to replace slot {}: {}", key, e)))?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), BankError> {
        match tokio::fs::remove_file(self.slot_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BankError::storage(format!("Failed to remove slot {}: {}", key, e))),
        }
    }

    async fn ping(&self) -> Result<(), BankError> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            BankError::storage(format!(
                "Bank directory {} is not writable: {}",
                self.dir.display(),
                e
            ))
        })
    }
}

pub struct RedisSlotStorage {
    redis: ConnectionManager,
}

impl RedisSlotStorage {
    pub async fn connect(redis_uri: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_uri)?;

        tracing::info!("Attempting to connect to Redis...");

        let redis = tokio::time::timeout(
            std::time::Duration::from_secs(30),
            ConnectionManager::new(client),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

        let storage = Self { redis };
        storage.ping().await?;

        tracing::info!("Redis connection established successfully");
        Ok(storage)
    }
}

#[async_trait]
impl SlotStorage for RedisSlotStorage {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, BankError> {
        let mut conn = self.redis.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async::<Option<String>>(&mut conn)
            .await
            .map_err(|e| BankError::storage(format!("Redis GET {} failed: {}", key, e)))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), BankError> {
        let mut conn = self.redis.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| BankError::storage(format!("Redis SET {} failed: {}", key, e)))
    }

    async fn remove(&self, key: &str) -> Result<(), BankError> {
        let mut conn = self.redis.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| BankError::storage(format!("Redis DEL {} failed: {}", key, e)))
    }

    async fn ping(&self) -> Result<(), BankError> {
        let mut conn = self.redis.clone();
        tokio::time::timeout(
            std::time::Duration::from_millis(500),
            redis::cmd("PING").query_async::<String>(&mut conn),
        )
        .await
        .map_err(|_| BankError::storage("Redis timeout after 500ms"))?
        .map_err(|e| BankError::storage(format!("Redis error: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_slots_round_trip() {
        let storage = MemorySlotStorage::new();
        assert_eq!(storage.get("k").await.unwrap(), None);
        storage.set("k", "[]").await.unwrap();
        assert_eq!(storage.get("k").await.unwrap().as_deref(), Some("[]"));
        storage.remove("k").await.unwrap();
        assert_eq!(storage.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn file_slots_persist_across_instances() {
        let dir = tempfile::TempDir::new().unwrap();
        let bank_dir = dir.path().join("bank");

        let storage = FileSlotStorage::new(&bank_dir);
        assert_eq!(storage.get("zhixue_question_bank").await.unwrap(), None);
        storage.set("zhixue_question_bank", "[1]").await.unwrap();

        let reopened = FileSlotStorage::new(&bank_dir);
        assert_eq!(
            reopened.get("zhixue_question_bank").await.unwrap().as_deref(),
            Some("[1]")
        );
        assert!(!bank_dir.join("zhixue_question_bank.json.tmp").exists());

        reopened.remove("zhixue_question_bank").await.unwrap();
        reopened.remove("zhixue_question_bank").await.unwrap();
        assert_eq!(storage.get("zhixue_question_bank").await.unwrap(), None);
    }

    #[test]
    fn file_slot_names_are_sanitized() {
        let storage = FileSlotStorage::new("/tmp/bank");
        assert_eq!(
            storage.slot_path("../etc/passwd"),
            PathBuf::from("/tmp/bank/___etc_passwd.json")
        );
    }
}
