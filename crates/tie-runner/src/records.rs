use std::collections::HashMap;
use std::path::PathBuf;

use crate::call_id::CallId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    pub call_id: CallId,
    pub out_dir: PathBuf,
}

/// Run-scoped map from call id to call record. Owned by the pipeline and
/// handed to every stage call as it is constructed.
#[derive(Debug, Default)]
pub struct CallRecordStore {
    records: HashMap<CallId, CallRecord>,
}

impl CallRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: CallId, record: CallRecord) {
        self.records.insert(id, record);
    }

    pub fn lookup(&self, id: &CallId) -> Option<&CallRecord> {
        self.records.get(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
