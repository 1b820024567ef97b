use crate::config::{ConnectionDescriptor, RunnerSettings};
use crate::credentials::containers_config_dir;
use crate::engine::ContainerEngine;
use crate::error::RunnerError;
use crate::image::{ResolvedImage, resolve_image};
use crate::machine::VmBootstrapper;
use crate::pull::{PullOutcome, pull_image};
use tracing::{debug, info, warn};

/// Program and arguments the child is finally started with
#[derive(Debug)]
pub struct PreparedCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Image found in a container command line
    pub image: Option<ResolvedImage>,
    /// Result of the pre-pull, when one was attempted
    pub pull: Option<PullOutcome>,
}

impl PreparedCommand {
    fn unchanged(connection: &ConnectionDescriptor) -> Self {
        Self {
            program: connection.command.clone(),
            args: connection.args.clone(),
            image: None,
            pull: None,
        }
    }
}

/// Rewrite a container engine invocation before it is spawned.
///
/// Commands that do not name a container engine pass through untouched. For
/// engine commands the program becomes the configured engine, the engine VM is
/// brought up when the platform needs one, the image is pre-pulled and its
/// reference qualified with the default registry. Only a failed VM bootstrap
/// is an error; pull failures are logged and the command is run regardless.
pub async fn prepare_container_command(
    engine: &dyn ContainerEngine,
    connection: &ConnectionDescriptor,
    settings: &RunnerSettings,
) -> Result<PreparedCommand, RunnerError> {
    let Some(kind) = connection.engine() else {
        return Ok(PreparedCommand::unchanged(connection));
    };

    let program = settings.engine.clone();
    if kind.as_str() != program {
        info!(from = %kind, to = %program, "Rewriting container engine");
    }

    if settings.vm_policy.requires_vm() {
        VmBootstrapper::new(engine, &settings.machine_name, &settings.verification_retry)
            .ensure_running()
            .await?;
    }

    let mut args = connection.args.clone();
    let image = resolve_image(&args, &settings.default_registry);

    let pull = match &image {
        Some(image) if settings.pull_images => {
            let credentials_dir = containers_config_dir(settings.containers_config_dir.as_deref())
                .inspect_err(|e| warn!(error = %e, "Anonymous pull credentials unavailable"))
                .ok();
            Some(
                pull_image(
                    engine,
                    &image.normalized,
                    &settings.default_registry,
                    credentials_dir.as_deref(),
                )
                .await,
            )
        }
        Some(_) => None,
        None => {
            debug!("No image reference in container command");
            None
        }
    };

    if let Some(image) = image.as_ref().filter(|_| settings.registry_override) {
        if image.was_qualified() {
            debug!(image = %image.original, "Image already names a registry");
        } else {
            info!(from = %image.original, to = %image.normalized, "Qualifying image with default registry");
            args[image.index] = image.normalized.clone();
        }
    }

    info!(program = %program, args = ?args, "Prepared container command");
    Ok(PreparedCommand {
        program,
        args,
        image,
        pull,
    })
}
