use crate::infrastructure::config::{ensure_default_config, load_planner_config, PlannerConfig};
use crate::infrastructure::error::InfraError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const OFFLINE_DOCUMENT_FILE: &str = "planner-document.json";

#[derive(Debug)]
pub struct BootstrapResult {
    pub config: PlannerConfig,
    pub offline_document_path: PathBuf,
}

pub fn bootstrap_workspace(workspace_root: &Path) -> Result<BootstrapResult, InfraError> {
    let config_dir = workspace_root.join("config");
    let state_dir = workspace_root.join("state");

    fs::create_dir_all(&config_dir)?;
    fs::create_dir_all(&state_dir)?;

    ensure_default_config(&config_dir)?;
    let config = load_planner_config(&config_dir)?;
    debug!(
        workspace = %workspace_root.display(),
        timezone = %config.timezone,
        "workspace ready"
    );

    Ok(BootstrapResult {
        config,
        offline_document_path: state_dir.join(OFFLINE_DOCUMENT_FILE),
    })
}
