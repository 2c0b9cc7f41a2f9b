pub mod api;
pub mod config;
pub mod error;
pub mod formatters;
pub mod html;
pub mod http_client;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod prompt;
pub mod sources;
pub mod store;
pub mod webhook;

use std::sync::Arc;
use config::Config;
use error::Result;
use pipeline::Pipeline;
use store::Store;

/// Application state that will be shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<Store>,
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    /// Opens the store under `config.data_dir` and wires up the pipeline.
    pub fn new(config: Config) -> Result<Self> {
        let store = Arc::new(Store::open(&config.data_dir)?);
        let pipeline = Arc::new(Pipeline::new(&config, store.clone()));
        Ok(Self {
            config: Arc::new(config),
            store,
            pipeline,
        })
    }
}
