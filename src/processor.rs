//! Processor orchestration covering the generic backoff loop, claim recovery
//! scanning, and bounded pipeline dispatch.

pub mod backoff;
pub mod dispatcher;
pub mod scanner;
