//! Starts sessions whose supervisor loop runs as a background task.

use super::control::SessionHandle;
use super::coordinator::{Coordinator, CoordinatorSettings, WorkerFactory};
use crate::config::SessionPaths;
use crate::errors::SessionError;
use crate::session::{SessionStore, new_session_id};
use crate::triad_config::TriadConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Resolve the directory the workers operate on. Relative paths are taken
/// from the project directory.
pub fn resolve_target_dir(project_dir: &Path, target_dir: Option<&Path>) -> PathBuf {
    match target_dir {
        Some(dir) if dir.is_absolute() => dir.to_path_buf(),
        Some(dir) => project_dir.join(dir),
        None => project_dir.to_path_buf(),
    }
}

pub struct SessionLauncher {
    project_dir: PathBuf,
    workspace_root: PathBuf,
    support_dir: PathBuf,
    settings: CoordinatorSettings,
    factory: Arc<dyn WorkerFactory>,
}

impl SessionLauncher {
    pub fn new(config: &TriadConfig, factory: Arc<dyn WorkerFactory>) -> Self {
        Self {
            project_dir: config.project_dir.clone(),
            workspace_root: config.workspace_root(),
            support_dir: config.support_dir.clone(),
            settings: CoordinatorSettings::from_config(config),
            factory,
        }
    }

    pub fn with_settings(mut self, settings: CoordinatorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Launch a new session, register its handle in `store` and spawn its
    /// loop. Launch failures are returned before anything is registered.
    pub async fn start(
        &self,
        store: &SessionStore,
        prompt: &str,
        target_dir: Option<&Path>,
    ) -> Result<SessionHandle, SessionError> {
        let session_id = new_session_id();
        let paths = SessionPaths::for_session(
            &self.workspace_root,
            &session_id,
            resolve_target_dir(&self.project_dir, target_dir),
            self.support_dir.clone(),
        );
        let mut coordinator = Coordinator::start_session(
            &session_id,
            prompt,
            paths,
            self.settings.clone(),
            self.factory.as_ref(),
        )
        .await?;

        let handle = coordinator.handle();
        store.insert(handle.clone()).await;
        tokio::spawn(async move {
            let summary = coordinator.run().await;
            info!(
                session_id = %summary.session_id,
                complete = summary.complete,
                "Background session finished"
            );
        });
        Ok(handle)
    }
}
