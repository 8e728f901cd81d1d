use crate::registry::model::{Workload, WorkloadType};
use std::collections::BTreeMap;

/// Immutable projection of a registry [`Workload`] carrying everything the
/// launch stages need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LauncherInput {
    pub workload_id: String,
    pub workload_type: WorkloadType,
    pub workload_input: String,
    pub labels: BTreeMap<String, String>,
    pub log_path: String,
    pub mutex_key: Option<String>,
}

impl From<Workload> for LauncherInput {
    fn from(workload: Workload) -> Self {
        let labels = workload
            .labels
            .into_iter()
            .map(|label| (label.key, label.value))
            .collect();

        Self {
            workload_id: workload.id,
            workload_type: workload.workload_type,
            workload_input: workload.workload_input,
            labels,
            log_path: workload.log_path,
            mutex_key: workload.mutex_key,
        }
    }
}
