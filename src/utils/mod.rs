use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

mod logging;

pub use logging::*;

/// Counters accumulated over one engine run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaData {
    pub paths_explored: usize,
    pub tests_generated: usize,
    pub call_paths_dumped: usize,
    pub call_prefixes_dumped: usize,
    pub truncated_call_records: usize,
}

impl MetaData {
    pub fn new() -> Self {
        Self {
            paths_explored: 0,
            tests_generated: 0,
            call_paths_dumped: 0,
            call_prefixes_dumped: 0,
            truncated_call_records: 0,
        }
    }

    pub fn combine(self, other: MetaData) -> MetaData {
        MetaData {
            paths_explored: self.paths_explored + other.paths_explored,
            tests_generated: self.tests_generated + other.tests_generated,
            call_paths_dumped: self.call_paths_dumped + other.call_paths_dumped,
            call_prefixes_dumped: self.call_prefixes_dumped + other.call_prefixes_dumped,
            truncated_call_records: self.truncated_call_records + other.truncated_call_records,
        }
    }

    pub fn dump(&self, filename: PathBuf) -> Result<(), String> {
        let json = serde_json::to_string_pretty(self).map_err(|_| String::from("Cannot serialize run metadata"))?;
        fs::write(filename, json).map_err(|_| String::from("Cannot write run metadata file"))
    }
}

/// Root of the runtime-support tree. An environment override wins; otherwise
/// the root is inferred from the directory holding the running executable.
pub fn runtime_library_path() -> Result<PathBuf, String> {
    if let Ok(path) = env::var("PATHFUSE_RUNTIME_PATH") {
        return Ok(PathBuf::from(path));
    }
    let mut dir = env::current_exe().map_err(|_| String::from("Cannot locate the current executable"))?;
    dir.pop();
    Ok(dir.join("runtime"))
}
