use anyhow::{bail, Context, Result};
use linkpage_editor::{Backend, BackendState, EditSession, MemoryBackend, SessionConfig};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// A data file on disk served through an in-memory backend
pub struct Workspace {
    config: SessionConfig,
    data_path: PathBuf,
    backend: Arc<MemoryBackend>,
}

impl Workspace {
    pub fn open(cwd: &Path) -> Result<Self> {
        let config = SessionConfig::load(cwd)?;
        let data_path = config.data_path(cwd);

        if !data_path.exists() {
            bail!(
                "No data file at {}. Run `linkpage init` first.",
                data_path.display()
            );
        }

        let content = fs::read_to_string(&data_path)
            .with_context(|| format!("Failed to read {}", data_path.display()))?;
        let state: BackendState = serde_json::from_str(&content)
            .with_context(|| format!("Invalid data file {}", data_path.display()))?;
        debug!(path = %data_path.display(), widgets = state.page.widgets.len(), "Loaded data file");

        let backend = Arc::new(MemoryBackend::with_state(state).with_author(config.author.clone()));

        Ok(Self {
            config,
            data_path,
            backend,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Open an edit session with the snapshot and history loaded
    pub async fn session(&self) -> Result<EditSession> {
        let session = EditSession::new("cli", Backend::single(self.backend.clone()), self.config.clone());
        session.open().await?;
        Ok(session)
    }

    /// Write the backend state back to the data file
    pub fn save(&self) -> Result<()> {
        write_state(&self.data_path, &self.backend.state())
    }
}

pub fn write_state(path: &Path, state: &BackendState) -> Result<()> {
    let json = serde_json::to_string_pretty(state)?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    debug!(path = %path.display(), "Saved data file");
    Ok(())
}
