//! Shared application state
//!
//! One pipeline instance serves every request; it is stateless per run,
//! so sharing it behind an `Arc` is safe.

use std::sync::Arc;

use text2sql::Pipeline;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}
