//! Rule-set persistence — JSON transcoding of rule records.
//!
//! The engine is agnostic to the serialized form beyond `RuleRecord`;
//! these helpers just read and write the record list as a JSON file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::alerts::manager::{AlertManager, RuleId};
use crate::error::AlertError;

/// Serialized form of one rule. Timestamp state is deliberately not
/// persisted — a loaded rule starts with a fresh clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRecord {
    pub topic_filter: Option<String>,
    pub condition: Option<String>,
    pub notify_address: Option<String>,
    pub min_suppress_secs: u64,
    pub max_silence_secs: u64,
}

/// Load rule records from a JSON file into the manager.
pub fn load_rules(manager: &mut AlertManager, path: &Path) -> Result<Vec<RuleId>, AlertError> {
    let text = std::fs::read_to_string(path).map_err(|e| AlertError::StoreIo {
        path: path.display().to_string(),
        source: e,
    })?;
    let records: Vec<RuleRecord> = serde_json::from_str(&text).map_err(|e| {
        AlertError::StoreFormat {
            path: path.display().to_string(),
            source: e,
        }
    })?;
    manager.from_records(&records)
}

/// Save the manager's rule set as a JSON file.
pub fn save_rules(manager: &AlertManager, path: &Path) -> Result<(), AlertError> {
    let text = serde_json::to_string_pretty(&manager.to_records()).map_err(|e| {
        AlertError::StoreFormat {
            path: path.display().to_string(),
            source: e,
        }
    })?;
    std::fs::write(path, text).map_err(|e| AlertError::StoreIo {
        path: path.display().to_string(),
        source: e,
    })
}
