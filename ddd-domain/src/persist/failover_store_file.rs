//! 基于文件目录的失败存储（FileFailoverStore）
//!
//! 每条记录保存为目录下的一个 `{key}.json` 文件：
//! - 写入先落到隐藏的临时文件，再以硬链接原子发布到最终文件名，
//!   读取方不会看到半写入的记录，已存在的键也不会被覆盖；
//! - 非 `.json` 结尾或以 `.` 开头的文件一律忽略；
//! - 键按文件名字典序列出，配合时间戳前缀即为捕获时间顺序。
//!
use crate::{
    error::{DomainError, DomainResult},
    persist::{FailoverStore, SerializedEvent},
};
use async_trait::async_trait;
use bon::Builder;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

const RECORD_SUFFIX: &str = ".json";

/// 失败存储配置
#[derive(Builder, Clone, Debug)]
pub struct FailoverConfig {
    /// 记录目录，不存在时自动创建
    #[builder(into, default = PathBuf::from("failed_domain_events"))]
    pub directory: PathBuf,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Clone, Debug)]
pub struct FileFailoverStore {
    directory: PathBuf,
}

impl FileFailoverStore {
    /// 打开（必要时创建）记录目录
    pub async fn open(config: FailoverConfig) -> DomainResult<Self> {
        fs::create_dir_all(&config.directory).await?;
        Ok(Self {
            directory: config.directory,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn record_path(&self, key: &str) -> DomainResult<PathBuf> {
        if key.is_empty() || key.starts_with('.') || key.contains(['/', '\\']) {
            return Err(DomainError::failover_store(key, "invalid record key"));
        }
        Ok(self.directory.join(format!("{key}{RECORD_SUFFIX}")))
    }
}

#[async_trait]
impl FailoverStore for FileFailoverStore {
    #[tracing::instrument(level = "debug", skip(self, record), fields(dir = %self.directory.display()))]
    async fn append(&self, key: &str, record: &SerializedEvent) -> DomainResult<()> {
        let path = self.record_path(key)?;
        let tmp = self
            .directory
            .join(format!(".{key}.{}{RECORD_SUFFIX}.tmp", Uuid::new_v4().simple()));
        fs::write(&tmp, record.to_json()?).await?;

        let linked = fs::hard_link(&tmp, &path).await;
        if let Err(err) = fs::remove_file(&tmp).await {
            tracing::warn!(tmp = %tmp.display(), error = %err, "temporary record not removed");
        }
        match linked {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                Err(DomainError::failover_store(key, "key already exists"))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn list_keys(&self) -> DomainResult<Vec<String>> {
        let mut entries = fs::read_dir(&self.directory).await?;
        let mut keys = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            if let Some(key) = name.strip_suffix(RECORD_SUFFIX) {
                keys.push(key.to_string());
            }
        }

        keys.sort_unstable();
        Ok(keys)
    }

    async fn read(&self, key: &str) -> DomainResult<SerializedEvent> {
        let path = self.record_path(key)?;
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(DomainError::NotFound {
                    reason: format!("failover record {key}"),
                });
            }
            Err(err) => return Err(err.into()),
        };

        SerializedEvent::from_json(&bytes)
            .map_err(|e| DomainError::failover_store(key, e.to_string()))
    }

    async fn remove(&self, key: &str) -> DomainResult<bool> {
        let path = self.record_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}
