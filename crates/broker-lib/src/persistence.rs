//! Append-only allocation log
//!
//! Every successful allocation is written as one JSON object per line. The
//! log is an audit side channel: a failed write never undoes an allocation.

use crate::models::{InstanceSpecs, Provider, ResourceAllocation, ResourceRequest, WorkloadType};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Allocation fields captured in the log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedAllocation {
    pub instance_id: String,
    pub provider: Provider,
    pub cost_per_hour: f64,
    pub specs: InstanceSpecs,
}

/// Originating request fields captured in the log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedRequest {
    pub workload_type: WorkloadType,
    pub duration: f64,
    pub budget: f64,
}

/// One line of the allocation log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationLogRecord {
    /// Seconds since the Unix epoch
    pub timestamp: f64,
    pub allocation: LoggedAllocation,
    pub request: LoggedRequest,
}

impl AllocationLogRecord {
    pub fn new(allocation: &ResourceAllocation, request: &ResourceRequest) -> Self {
        Self {
            timestamp: chrono::Utc::now().timestamp_millis() as f64 / 1000.0,
            allocation: LoggedAllocation {
                instance_id: allocation.instance_id.clone(),
                provider: allocation.provider,
                cost_per_hour: allocation.cost_per_hour,
                specs: allocation.specs.clone(),
            },
            request: LoggedRequest {
                workload_type: request.workload_type,
                duration: request.duration_hours,
                budget: request.budget_usd,
            },
        }
    }
}

/// Destination for allocation log records
pub trait AllocationSink: Send + Sync {
    /// Append one record
    fn append(&self, record: &AllocationLogRecord) -> Result<()>;
}

/// Sink that discards every record
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl AllocationSink for NullSink {
    fn append(&self, _record: &AllocationLogRecord) -> Result<()> {
        Ok(())
    }
}

/// JSON-lines file sink
#[derive(Debug)]
pub struct JsonlAllocationLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlAllocationLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AllocationSink for JsonlAllocationLog {
    fn append(&self, record: &AllocationLogRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record).context("Failed to serialize log record")?;
        line.push(b'\n');

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("Allocation log lock poisoned"))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory {:?}", parent))?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open allocation log {:?}", self.path))?;

        // Single write so concurrent appenders never split a line
        file.write_all(&line)
            .context("Failed to write allocation log record")?;

        debug!(
            path = %self.path.display(),
            instance_id = %record.allocation.instance_id,
            "Allocation log record appended"
        );
        Ok(())
    }
}

/// Read every well-formed record from a log file.
///
/// Blank, torn or otherwise unparsable lines are skipped with a warning. A
/// missing file reads as an empty log.
pub fn read_allocation_log(path: &Path) -> Result<Vec<AllocationLogRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open allocation log {:?}", path))?;

    let mut records = Vec::new();
    for (index, line) in BufReader::new(file).split(b'\n').enumerate() {
        let line = line.with_context(|| format!("Failed to read line {} of {:?}", index + 1, path))?;
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        // Invalid UTF-8 from a cut multi-byte character fails here too
        match serde_json::from_slice::<AllocationLogRecord>(&line) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    line = index + 1,
                    error = %e,
                    "Skipping unreadable allocation log line"
                );
            }
        }
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_allocation(id: &str) -> (ResourceAllocation, ResourceRequest) {
        let request = ResourceRequest {
            workload_type: WorkloadType::AiTraining,
            gpu_memory_gb: 24,
            vcpu_count: 8,
            ram_gb: 32,
            storage_gb: 500,
            duration_hours: 48.0,
            budget_usd: 100.0,
        };
        let allocation = ResourceAllocation {
            provider: Provider::VastaiReserved,
            instance_id: id.to_string(),
            workload_type: WorkloadType::AiTraining,
            cost_per_hour: 0.36,
            estimated_completion: 48.0,
            specs: InstanceSpecs::GpuMarketplace {
                gpu: "RTX 5090".to_string(),
                template: Some("au".to_string()),
                storage_gb: 500,
                reserved: true,
            },
            created_at: 1_700_000_000,
        };
        (allocation, request)
    }

    #[test]
    fn test_record_shape() {
        let (allocation, request) = create_test_allocation("vastai_reserved-ai_training-abc");
        let record = AllocationLogRecord::new(&allocation, &request);
        let value = serde_json::to_value(&record).unwrap();

        assert!(value["timestamp"].as_f64().unwrap() > 0.0);
        assert_eq!(value["allocation"]["provider"], "vastai_reserved");
        assert_eq!(value["allocation"]["specs"]["gpu"], "RTX 5090");
        assert_eq!(value["allocation"]["specs"]["reserved"], true);
        assert_eq!(value["request"]["workload_type"], "ai_training");
        assert_eq!(value["request"]["duration"], 48.0);
        assert_eq!(value["request"]["budget"], 100.0);
    }

    #[test]
    fn test_append_and_read_back() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("logs").join("allocations.log");
        let log = JsonlAllocationLog::new(&path);

        for id in ["a-1", "a-2", "a-3"] {
            let (allocation, request) = create_test_allocation(id);
            log.append(&AllocationLogRecord::new(&allocation, &request)).unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 3);

        let records = read_allocation_log(&path).unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.allocation.instance_id.as_str()).collect();
        assert_eq!(ids, vec!["a-1", "a-2", "a-3"]);
    }

    #[test]
    fn test_reader_skips_torn_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("allocations.log");
        let log = JsonlAllocationLog::new(&path);

        let (allocation, request) = create_test_allocation("good-1");
        log.append(&AllocationLogRecord::new(&allocation, &request)).unwrap();

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"\n{\"timestamp\": 17000").unwrap();

        let records = read_allocation_log(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].allocation.instance_id, "good-1");
    }

    #[test]
    fn test_reader_skips_line_cut_inside_utf8_character() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("allocations.log");
        let log = JsonlAllocationLog::new(&path);

        let (allocation, request) = create_test_allocation("good-1");
        log.append(&AllocationLogRecord::new(&allocation, &request)).unwrap();

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"timestamp\":2.0,\"note\":\"caf\xC3").unwrap();

        let records = read_allocation_log(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].allocation.instance_id, "good-1");
    }

    #[test]
    fn test_missing_log_reads_empty() {
        let temp_dir = TempDir::new().unwrap();
        let records = read_allocation_log(&temp_dir.path().join("absent.log")).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_append_fails_when_path_is_directory() {
        let temp_dir = TempDir::new().unwrap();
        let log = JsonlAllocationLog::new(temp_dir.path());
        let (allocation, request) = create_test_allocation("x");

        assert!(log.append(&AllocationLogRecord::new(&allocation, &request)).is_err());
    }
}
