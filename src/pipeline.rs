//! Launch pipeline: the stage contract, the per-run context, and the ordered
//! runner that drives one workload to a terminal outcome.

pub mod hooks;
pub mod input;
pub mod io;
pub mod launch;
pub mod stage;
