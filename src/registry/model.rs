//! Wire types exchanged with the workload registry.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle states tracked by the registry. Only the registry moves a
/// workload between them; this crate reads `Claimed` rows and drives them to
/// a terminal state through pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadStatus {
    Pending,
    Claimed,
    Launched,
    Running,
    Success,
    Failure,
    Cancelled,
}

impl WorkloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadStatus::Pending => "pending",
            WorkloadStatus::Claimed => "claimed",
            WorkloadStatus::Launched => "launched",
            WorkloadStatus::Running => "running",
            WorkloadStatus::Success => "success",
            WorkloadStatus::Failure => "failure",
            WorkloadStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkloadStatus::Success | WorkloadStatus::Failure | WorkloadStatus::Cancelled
        )
    }
}

impl fmt::Display for WorkloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of work a workload represents. Only used to tag metrics and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadType {
    Sync,
    Check,
    Discover,
    Spec,
}

impl WorkloadType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadType::Sync => "sync",
            WorkloadType::Check => "check",
            WorkloadType::Discover => "discover",
            WorkloadType::Spec => "spec",
        }
    }
}

impl fmt::Display for WorkloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadLabel {
    pub key: String,
    pub value: String,
}

/// Registry record for a single unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workload {
    pub id: String,
    #[serde(default)]
    pub dataplane_id: Option<String>,
    pub status: WorkloadStatus,
    #[serde(rename = "type")]
    pub workload_type: WorkloadType,
    #[serde(default)]
    pub workload_input: String,
    #[serde(default)]
    pub log_path: String,
    #[serde(default)]
    pub mutex_key: Option<String>,
    #[serde(default)]
    pub labels: Vec<WorkloadLabel>,
}

/// Filter for the registry list query. Both lists are OR-ed internally and
/// AND-ed with each other by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadListRequest {
    #[serde(rename = "dataplane")]
    pub owner_ids: Vec<String>,
    #[serde(rename = "status")]
    pub statuses: Vec<WorkloadStatus>,
}

impl WorkloadListRequest {
    /// Selects the workloads `owner_id` claimed but has not driven further.
    pub fn claimed_by(owner_id: impl Into<String>) -> Self {
        Self {
            owner_ids: vec![owner_id.into()],
            statuses: vec![WorkloadStatus::Claimed],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadListResponse {
    #[serde(default)]
    pub workloads: Vec<Workload>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadFailureRequest {
    pub workload_id: String,
    pub source: String,
    pub reason: String,
}
