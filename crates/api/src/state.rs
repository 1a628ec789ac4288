use std::sync::Arc;

use submitter_core::service::JobService;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`). Server settings are
/// consumed while the router is built and are not carried here.
#[derive(Clone)]
pub struct AppState {
    /// Job lifecycle service (runner, record store, viewer supervisor).
    pub jobs: Arc<JobService>,
}
