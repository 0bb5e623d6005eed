//! Application state shared by the control plane handlers.

use std::sync::Arc;

use getset::Getters;
use tidepool_core::management::Lifecycle;

use crate::config::Config;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Application state structure
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub with_prefix")]
pub struct AppState {
    /// The server configuration
    config: Arc<Config>,

    /// The lifecycle controller all sandbox operations go through
    lifecycle: Arc<Lifecycle>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl AppState {
    /// Create a new application state instance
    pub fn new(config: Arc<Config>, lifecycle: Arc<Lifecycle>) -> Self {
        Self { config, lifecycle }
    }
}
