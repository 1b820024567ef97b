use crate::error::RunnerError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name of the container credential configuration
pub const AUTH_FILE_NAME: &str = "auth.json";

#[derive(Debug, Serialize)]
struct RegistryAuth {
    auth: String,
}

/// Credential configuration with no helpers, no store and an empty
/// credential for the registry, which forces anonymous access.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnonymousAuthConfig {
    auths: BTreeMap<String, RegistryAuth>,
    cred_helpers: BTreeMap<String, String>,
    creds_store: String,
}

impl AnonymousAuthConfig {
    fn for_registry(registry: &str) -> Self {
        Self {
            auths: BTreeMap::from([(
                registry.to_string(),
                RegistryAuth {
                    auth: String::new(),
                },
            )]),
            cred_helpers: BTreeMap::new(),
            creds_store: String::new(),
        }
    }
}

/// `<home>/.config/containers`, unless an override is configured
pub fn containers_config_dir(override_dir: Option<&Path>) -> Result<PathBuf, RunnerError> {
    if let Some(dir) = override_dir {
        return Ok(dir.to_path_buf());
    }
    let base = directories_next::BaseDirs::new().ok_or_else(|| {
        RunnerError::configuration("could not determine the user's home directory")
    })?;
    Ok(base.home_dir().join(".config").join("containers"))
}

/// Write the anonymous auth file for `registry` into `dir`, creating it if needed.
/// Returns the path of the written file.
pub async fn write_anonymous_auth(dir: &Path, registry: &str) -> Result<PathBuf, RunnerError> {
    tokio::fs::create_dir_all(dir).await?;

    let config = AnonymousAuthConfig::for_registry(registry);
    let content = serde_json::to_string_pretty(&config)
        .map_err(|e| RunnerError::Other(anyhow::anyhow!("failed to encode auth config: {e}")))?;

    let path = dir.join(AUTH_FILE_NAME);
    tokio::fs::write(&path, content).await?;
    debug!(path = %path.display(), registry, "Wrote anonymous registry credentials");
    Ok(path)
}
