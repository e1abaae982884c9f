//! 内存版安装记录存储，用于测试和临时运行

use super::store::InstallationStore;
use super::{DataError, Result};
use crate::models::InstallationRecord;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
pub struct MemoryInstallationStore {
    records: Mutex<BTreeMap<String, InstallationRecord>>,
}

impl MemoryInstallationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = InstallationRecord>) -> Self {
        let map = records
            .into_iter()
            .map(|r| (r.tool_id.clone(), r))
            .collect();
        Self {
            records: Mutex::new(map),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, InstallationRecord>>> {
        self.records
            .lock()
            .map_err(|e| DataError::Concurrency(e.to_string()))
    }
}

impl InstallationStore for MemoryInstallationStore {
    fn get(&self, tool_id: &str) -> Result<Option<InstallationRecord>> {
        Ok(self.lock()?.get(tool_id).cloned())
    }

    fn insert(&self, record: &InstallationRecord) -> Result<bool> {
        let mut records = self.lock()?;
        if records.contains_key(&record.tool_id) {
            return Ok(false);
        }
        records.insert(record.tool_id.clone(), record.clone());
        Ok(true)
    }

    fn remove(&self, tool_id: &str) -> Result<Option<InstallationRecord>> {
        Ok(self.lock()?.remove(tool_id))
    }

    fn list(&self) -> Result<Vec<InstallationRecord>> {
        Ok(self.lock()?.values().cloned().collect())
    }
}
