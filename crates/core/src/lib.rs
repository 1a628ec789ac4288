//! Job lifecycle management for the upload-and-analyse service.
//!
//! Uploads become jobs under a jobs root; each job is run through an external
//! analysis command by a worker task and its progress is persisted as a
//! record file. A single external viewer can be pointed at a finished job.

pub mod error;
pub mod job;
pub mod paths;
pub mod runner;
pub mod service;
pub mod store;
pub mod subprocess;
pub mod types;
pub mod viewer;
