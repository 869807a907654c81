//! Alarm persistence seam.
//!
//! The engine decides *when* to persist (after every registry mutation);
//! an [`AlarmStore`] decides *how*.

use crate::alarm::Alarm;
use crate::error::StorageError;

pub const ALARMS_KEY: &str = "alarms";

pub trait AlarmStore: Send {
    /// Boot-time load. Invalid records are skipped, not fatal.
    fn load_alarms(&self) -> Result<Vec<Alarm>, StorageError>;

    /// Replace the persisted alarm list.
    fn save_alarms(&mut self, alarms: &[Alarm]) -> Result<(), StorageError>;

    /// Token that changes whenever another writer has committed since the
    /// store was opened. `None` for stores nobody else can write to.
    fn external_revision(&self) -> Result<Option<u64>, StorageError> {
        Ok(None)
    }
}

pub(crate) fn encode_alarms(alarms: &[Alarm]) -> Result<String, StorageError> {
    serde_json::to_string(alarms).map_err(|e| StorageError::Corrupt {
        key: ALARMS_KEY.into(),
        message: e.to_string(),
    })
}

/// Decode the persisted list, dropping records that fail validation.
pub(crate) fn decode_alarms(json: &str) -> Result<Vec<Alarm>, StorageError> {
    let records: Vec<serde_json::Value> =
        serde_json::from_str(json).map_err(|e| StorageError::Corrupt {
            key: ALARMS_KEY.into(),
            message: e.to_string(),
        })?;

    let mut alarms = Vec::with_capacity(records.len());
    for (index, record) in records.into_iter().enumerate() {
        let parsed = serde_json::from_value::<Alarm>(record)
            .map_err(|e| e.to_string())
            .and_then(|a| a.validate().map(|()| a).map_err(|e| e.to_string()));
        match parsed {
            Ok(alarm) => alarms.push(alarm),
            Err(reason) => tracing::warn!(index, %reason, "skipping invalid alarm record"),
        }
    }
    Ok(alarms)
}

/// In-memory store. Can be told to fail writes, simulating a full quota.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    alarms: Vec<Alarm>,
    fail_writes: bool,
    saves: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_alarms(alarms: Vec<Alarm>) -> Self {
        Self {
            alarms,
            ..Self::default()
        }
    }

    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    pub fn alarms(&self) -> &[Alarm] {
        &self.alarms
    }

    /// Successful saves so far.
    pub fn saves(&self) -> usize {
        self.saves
    }
}

impl AlarmStore for MemoryStore {
    fn load_alarms(&self) -> Result<Vec<Alarm>, StorageError> {
        Ok(self.alarms.clone())
    }

    fn save_alarms(&mut self, alarms: &[Alarm]) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::Full("quota exceeded".into()));
        }
        self.alarms = alarms.to_vec();
        self.saves += 1;
        Ok(())
    }
}
