//! External collaborators the protocol engine calls into
//!
//! Beatmap metadata, performance calculation, account storage and the
//! session journal sit behind traits so the dispatcher can be driven with
//! in-memory implementations. Every awaited call goes through
//! [`Services::bounded`], which caps it with the configured timeout.

use crate::config::{AccountConfig, BeatmapConfig, Config};
use crate::session::normalize_name;
use async_trait::async_trait;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use shared::{ActionStatus, Mode, Mods, Privileges};
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("collaborator call timed out after {0:?}")]
    Timeout(Duration),
    #[error("{0} is not available")]
    Unavailable(&'static str),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encoding error: {0}")]
    Encode(#[from] bincode::Error),
}

/// Metadata of one beatmap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeatmapInfo {
    pub id: i32,
    pub hash: String,
    pub title: String,
    pub mode: Mode,
}

#[async_trait]
pub trait BeatmapLookup: Send + Sync + Debug {
    async fn by_hash(&self, hash: &str) -> Result<Option<BeatmapInfo>, ServiceError>;
    async fn by_id(&self, id: i32) -> Result<Option<BeatmapInfo>, ServiceError>;
}

/// Beatmaps listed in the configuration file
#[derive(Debug, Default)]
pub struct BeatmapTable {
    maps: HashMap<String, BeatmapInfo>,
}

impl BeatmapTable {
    pub fn from_config(configs: &[BeatmapConfig]) -> Self {
        let maps = configs
            .iter()
            .map(|c| {
                let info = BeatmapInfo {
                    id: c.id,
                    hash: c.hash.clone(),
                    title: c.title.clone(),
                    mode: Mode::from_u8(c.mode).unwrap_or_default(),
                };
                (c.hash.clone(), info)
            })
            .collect();
        Self { maps }
    }
}

#[async_trait]
impl BeatmapLookup for BeatmapTable {
    async fn by_hash(&self, hash: &str) -> Result<Option<BeatmapInfo>, ServiceError> {
        Ok(self.maps.get(hash).cloned())
    }

    async fn by_id(&self, id: i32) -> Result<Option<BeatmapInfo>, ServiceError> {
        Ok(self.maps.values().find(|m| m.id == id).cloned())
    }
}

/// Inputs for a performance calculation
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceRequest {
    pub map_id: i32,
    pub map_hash: String,
    pub mode: Mode,
    pub mods: Mods,
    pub count_300: u16,
    pub count_100: u16,
    pub count_50: u16,
    pub count_geki: u16,
    pub count_katu: u16,
    pub count_miss: u16,
    pub max_combo: u16,
    /// When set the hit counts are ignored and a full combo at this
    /// accuracy (in percent) is assumed
    pub accuracy: Option<f32>,
}

impl PerformanceRequest {
    /// A full-combo play at `accuracy` percent
    pub fn for_accuracy(map: &BeatmapInfo, mods: Mods, accuracy: f32) -> Self {
        Self {
            map_id: map.id,
            map_hash: map.hash.clone(),
            mode: map.mode,
            mods,
            count_300: 0,
            count_100: 0,
            count_50: 0,
            count_geki: 0,
            count_katu: 0,
            count_miss: 0,
            max_combo: 0,
            accuracy: Some(accuracy),
        }
    }
}

#[async_trait]
pub trait PerformanceCalculator: Send + Sync + Debug {
    /// Performance points for the given play
    async fn calculate(&self, request: &PerformanceRequest) -> Result<f32, ServiceError>;
}

/// Calculator used when no difficulty backend is configured
#[derive(Debug, Default)]
pub struct NoPerformance;

#[async_trait]
impl PerformanceCalculator for NoPerformance {
    async fn calculate(&self, _request: &PerformanceRequest) -> Result<f32, ServiceError> {
        Err(ServiceError::Unavailable("performance calculation"))
    }
}

/// Stored account data needed at login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: i32,
    pub username: String,
    pub password_md5: String,
    pub privileges: Privileges,
    pub country: u8,
    pub friends: Vec<i32>,
}

#[async_trait]
pub trait AccountStore: Send + Sync + Debug {
    /// Looks up an account by username, ignoring case and spaces
    async fn find(&self, username: &str) -> Result<Option<Account>, ServiceError>;
}

/// Accounts listed in the configuration file
#[derive(Debug, Default)]
pub struct ConfigAccounts {
    accounts: HashMap<String, Account>,
}

impl ConfigAccounts {
    pub fn from_config(configs: &[AccountConfig]) -> Self {
        let accounts = configs
            .iter()
            .map(|c| {
                let account = Account {
                    id: c.id,
                    username: c.username.clone(),
                    password_md5: c.password_md5.to_lowercase(),
                    privileges: Privileges::from_bits_retain(c.privileges),
                    country: c.country,
                    friends: c.friends.clone(),
                };
                (normalize_name(&c.username), account)
            })
            .collect();
        Self { accounts }
    }
}

#[async_trait]
impl AccountStore for ConfigAccounts {
    async fn find(&self, username: &str) -> Result<Option<Account>, ServiceError> {
        Ok(self.accounts.get(&normalize_name(username)).cloned())
    }
}

/// Seconds since the Unix epoch
pub fn unix_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Events appended to the session journal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JournalRecord {
    SessionStart {
        user_id: i32,
        username: String,
        timestamp: u64,
    },
    SessionEnd {
        user_id: i32,
        timestamp: u64,
    },
    StatusChange {
        user_id: i32,
        action: ActionStatus,
        text: String,
        map_id: i32,
    },
    MatchCompleted {
        match_id: i16,
        map_hash: String,
        players: Vec<i32>,
        timestamp: u64,
    },
}

/// Fire-and-forget sink for [`JournalRecord`]s
pub trait Journal: Send + Sync + Debug {
    fn record(&self, record: JournalRecord);
}

/// Journal that drops everything
#[derive(Debug, Default)]
pub struct NullJournal;

impl Journal for NullJournal {
    fn record(&self, _record: JournalRecord) {}
}

/// Journal appending length-prefixed bincode records to a file
///
/// Records go through an unbounded channel to a writer task, so callers
/// never wait on disk.
#[derive(Debug, Clone)]
pub struct FileJournal {
    tx: mpsc::UnboundedSender<JournalRecord>,
}

impl FileJournal {
    /// Opens (or creates) the journal file and spawns its writer task
    ///
    /// The task ends once every `FileJournal` handle has been dropped.
    pub async fn open(path: &Path) -> Result<(Self, JoinHandle<()>), ServiceError> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        let (tx, mut rx) = mpsc::unbounded_channel::<JournalRecord>();
        let display = path.display().to_string();
        info!("Journal writing to {}", display);

        let handle = tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                let bytes = match bincode::serialize(&record) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        error!("Failed to encode journal record: {}", e);
                        continue;
                    }
                };
                let mut frame = (bytes.len() as u32).to_le_bytes().to_vec();
                frame.extend(bytes);

                if let Err(e) = file.write_all(&frame).await {
                    error!("Failed to write journal {}: {}", display, e);
                }
            }
            if let Err(e) = file.flush().await {
                error!("Failed to flush journal {}: {}", display, e);
            }
            debug!("Journal writer for {} stopped", display);
        });

        Ok((Self { tx }, handle))
    }

    /// Reads every record from a journal file
    pub fn read_all(path: &Path) -> Result<Vec<JournalRecord>, ServiceError> {
        let data = std::fs::read(path)?;
        let mut records = Vec::new();
        let mut rest = data.as_slice();

        while rest.len() >= 4 {
            let len = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
            if rest.len() < 4 + len {
                break;
            }
            records.push(bincode::deserialize(&rest[4..4 + len])?);
            rest = &rest[4 + len..];
        }

        Ok(records)
    }
}

impl Journal for FileJournal {
    fn record(&self, record: JournalRecord) {
        if self.tx.send(record).is_err() {
            error!("Journal writer has stopped; record dropped");
        }
    }
}

/// Every collaborator the server talks to
#[derive(Debug, Clone)]
pub struct Services {
    pub beatmaps: Arc<dyn BeatmapLookup>,
    pub performance: Arc<dyn PerformanceCalculator>,
    pub accounts: Arc<dyn AccountStore>,
    pub journal: Arc<dyn Journal>,
    pub timeout: Duration,
}

impl Services {
    /// Config-backed collaborators with no performance backend and no journal
    pub fn from_config(config: &Config) -> Self {
        Self {
            beatmaps: Arc::new(BeatmapTable::from_config(&config.beatmaps)),
            performance: Arc::new(NoPerformance),
            accounts: Arc::new(ConfigAccounts::from_config(&config.accounts)),
            journal: Arc::new(NullJournal),
            timeout: config.collaborator_timeout(),
        }
    }

    pub fn with_journal(mut self, journal: Arc<dyn Journal>) -> Self {
        self.journal = journal;
        self
    }

    pub fn with_performance(mut self, performance: Arc<dyn PerformanceCalculator>) -> Self {
        self.performance = performance;
        self
    }

    /// Awaits a collaborator call for at most the configured timeout
    pub async fn bounded<T, F>(&self, call: F) -> Result<T, ServiceError>
    where
        F: Future<Output = Result<T, ServiceError>>,
    {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| ServiceError::Timeout(self.timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[derive(Debug)]
    struct SlowCalculator;

    #[async_trait]
    impl PerformanceCalculator for SlowCalculator {
        async fn calculate(&self, _request: &PerformanceRequest) -> Result<f32, ServiceError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(100.0)
        }
    }

    fn request() -> PerformanceRequest {
        PerformanceRequest {
            map_id: 1,
            map_hash: "abc".to_string(),
            mode: Mode::Osu,
            mods: Mods::empty(),
            count_300: 100,
            count_100: 0,
            count_50: 0,
            count_geki: 0,
            count_katu: 0,
            count_miss: 0,
            max_combo: 100,
            accuracy: None,
        }
    }

    #[tokio::test]
    async fn test_beatmap_table_lookup() {
        let table = BeatmapTable::from_config(&[BeatmapConfig {
            id: 42,
            hash: "abc123".to_string(),
            title: "Artist - Song [Hard]".to_string(),
            mode: 1,
        }]);

        let by_hash = table.by_hash("abc123").await.unwrap().unwrap();
        assert_eq!(by_hash.id, 42);
        assert_eq!(by_hash.mode, Mode::Taiko);
        assert_eq!(table.by_id(42).await.unwrap(), Some(by_hash));
        assert!(table.by_hash("missing").await.unwrap().is_none());
    }

    #[test]
    fn test_accounts_ignore_case() {
        let accounts = ConfigAccounts::from_config(&[AccountConfig {
            id: 3,
            username: "Cool Guy".to_string(),
            password_md5: "ABCDEF".to_string(),
            privileges: 6,
            country: 0,
            friends: vec![],
        }]);

        let account = tokio_test::block_on(accounts.find("cool_guy")).unwrap().unwrap();
        assert_eq!(account.id, 3);
        assert_eq!(account.password_md5, "abcdef");
        assert!(tokio_test::block_on(accounts.find("nobody")).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bounded_call_times_out() {
        let services = Services {
            timeout: Duration::from_millis(20),
            ..Services::from_config(&Config::default())
        }
        .with_performance(Arc::new(SlowCalculator));

        let result = services
            .bounded(services.performance.calculate(&request()))
            .await;
        assert!(matches!(result, Err(ServiceError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_default_performance_is_unavailable() {
        let services = Services::from_config(&Config::default());
        let result = services
            .bounded(services.performance.calculate(&request()))
            .await;
        assert!(matches!(result, Err(ServiceError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_file_journal_appends_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.bin");

        let (journal, handle) = FileJournal::open(&path).await.unwrap();
        journal.record(JournalRecord::SessionStart {
            user_id: 3,
            username: "alice".to_string(),
            timestamp: 10,
        });
        journal.record(JournalRecord::SessionEnd {
            user_id: 3,
            timestamp: 20,
        });
        drop(journal);
        handle.await.unwrap();

        let records = FileJournal::read_all(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[1],
            JournalRecord::SessionEnd {
                user_id: 3,
                timestamp: 20
            }
        );
    }
}
