use std::sync::Arc;

use tokio::task;

use crate::{
    auth::jwt::JwtService,
    config::AppConfig,
    error::{AppError, AppResult, CoreResult},
    lifecycle::LifecycleEngine,
};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<LifecycleEngine>,
    pub config: Arc<AppConfig>,
    pub jwt: JwtService,
}

impl AppState {
    pub fn new(engine: Arc<LifecycleEngine>, config: AppConfig, jwt: JwtService) -> Self {
        Self {
            engine,
            config: Arc::new(config),
            jwt,
        }
    }

    /// Runs blocking engine work off the async executor.
    pub async fn run<T, F>(&self, work: F) -> AppResult<T>
    where
        F: FnOnce(&LifecycleEngine) -> CoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let engine = self.engine.clone();
        task::spawn_blocking(move || work(&engine))
            .await
            .map_err(|err| AppError::internal(format!("engine task failed: {err}")))?
            .map_err(AppError::from)
    }
}
