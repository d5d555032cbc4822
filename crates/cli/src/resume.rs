//! Resume log (spec §6): an append-only JSON Lines file recording one
//! record per completed program, so a killed or restarted run can skip
//! whatever already finished instead of re-minimizing it.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use syzmini_engine::model::Program;

#[derive(Debug, Serialize, Deserialize)]
pub struct ResumeRecord {
    pub source_file: String,
    pub program: Program,
    pub k: i64,
    pub influence_learned: bool,
}

/// Reads every already-recorded `source_file` name out of an existing
/// resume log, so the caller can skip those inputs. Missing file reads as
/// an empty set — the common case of a first run.
pub fn load_completed(path: &Path) -> Result<HashSet<String>> {
    let Ok(file) = File::open(path) else {
        return Ok(HashSet::new());
    };
    let mut done = HashSet::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: ResumeRecord = serde_json::from_str(&line)?;
        done.insert(record.source_file);
    }
    Ok(done)
}

pub struct ResumeLog {
    file: File,
}

impl ResumeLog {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(ResumeLog { file })
    }

    pub fn append(&mut self, record: &ResumeRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        self.file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syzmini_engine::model::test_fixtures::two_resource_program;

    #[test]
    fn round_trips_through_a_temp_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resume.jsonl");

        {
            let mut log = ResumeLog::open(&path).unwrap();
            log.append(&ResumeRecord {
                source_file: "prog0.json".to_string(),
                program: two_resource_program(),
                k: 1,
                influence_learned: false,
            })
            .unwrap();
        }

        let done = load_completed(&path).unwrap();
        assert!(done.contains("prog0.json"));
        assert_eq!(done.len(), 1);
    }

    #[test]
    fn missing_file_is_empty() {
        let done = load_completed(Path::new("/nonexistent/resume.jsonl")).unwrap();
        assert!(done.is_empty());
    }
}
