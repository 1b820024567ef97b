use crate::credentials::write_anonymous_auth;
use crate::engine::ContainerEngine;
use crate::error::EngineError;
use std::path::Path;
use tracing::{info, warn};

/// Step of the pull fallback chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullStrategy {
    /// Pull with whatever credentials the engine is configured with
    Direct,
    /// Pull after forcing anonymous access through the auth file
    Anonymous,
    /// Pull after logging out of the registry
    LogoutThenPull,
}

impl std::fmt::Display for PullStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PullStrategy::Direct => "direct",
            PullStrategy::Anonymous => "anonymous",
            PullStrategy::LogoutThenPull => "logout-then-pull",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub enum PullOutcome {
    Succeeded(PullStrategy),
    /// Every strategy failed; the caller continues regardless
    Exhausted { last_error: EngineError },
}

impl PullOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PullOutcome::Succeeded(_))
    }
}

/// Pull `image`, falling back from direct to anonymous to logged-out pulls.
///
/// Never fails: exhaustion is reported through [`PullOutcome::Exhausted`].
pub async fn pull_image(
    engine: &dyn ContainerEngine,
    image: &str,
    registry: &str,
    credentials_dir: Option<&Path>,
) -> PullOutcome {
    info!(image, "Pulling image");

    let error = match engine.pull(image).await {
        Ok(_) => return succeeded(image, PullStrategy::Direct),
        Err(error) => error,
    };
    warn!(image, error = %error, "Pull with existing credentials failed, trying anonymous pull");

    match credentials_dir {
        Some(dir) => {
            if let Err(error) = write_anonymous_auth(dir, registry).await {
                warn!(error = %error, "Failed to configure anonymous credentials");
            }
        }
        None => warn!("No container config directory available, skipping anonymous credentials"),
    }

    let error = match engine.pull(image).await {
        Ok(_) => return succeeded(image, PullStrategy::Anonymous),
        Err(anonymous_error) => {
            warn!(
                image,
                registry,
                error = %anonymous_error,
                previous = %error,
                "Anonymous pull failed, logging out of registry"
            );
            anonymous_error
        }
    };

    if let Err(logout_error) = engine.logout(registry).await {
        warn!(registry, error = %logout_error, "Logout failed, pulling anyway");
    }

    match engine.pull(image).await {
        Ok(_) => succeeded(image, PullStrategy::LogoutThenPull),
        Err(last_error) => {
            warn!(
                image,
                error = %last_error,
                previous = %error,
                "All pull strategies failed, continuing with the original command"
            );
            PullOutcome::Exhausted { last_error }
        }
    }
}

fn succeeded(image: &str, strategy: PullStrategy) -> PullOutcome {
    info!(image, %strategy, "Image pulled");
    PullOutcome::Succeeded(strategy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedEngine;

    const IMAGE: &str = "docker.io/mcp/time";

    #[tokio::test]
    async fn test_direct_pull() {
        let engine = ScriptedEngine::new();
        let temp = tempfile::tempdir().unwrap();

        let outcome = pull_image(&engine, IMAGE, "docker.io", Some(temp.path())).await;

        assert!(matches!(outcome, PullOutcome::Succeeded(PullStrategy::Direct)));
        assert_eq!(engine.calls(), vec!["pull docker.io/mcp/time"]);
        assert!(!temp.path().join("auth.json").exists());
    }

    #[tokio::test]
    async fn test_anonymous_pull_skips_logout() {
        let engine = ScriptedEngine::new()
            .fail("pull docker.io/mcp/time", "unauthorized")
            .ok("pull docker.io/mcp/time", "");
        let temp = tempfile::tempdir().unwrap();

        let outcome = pull_image(&engine, IMAGE, "docker.io", Some(temp.path())).await;

        assert!(matches!(outcome, PullOutcome::Succeeded(PullStrategy::Anonymous)));
        assert_eq!(engine.count("pull docker.io/mcp/time"), 2);
        assert_eq!(engine.count("logout docker.io"), 0);
        assert!(temp.path().join("auth.json").exists());
    }

    #[tokio::test]
    async fn test_logout_then_pull() {
        let engine = ScriptedEngine::new()
            .fail("pull docker.io/mcp/time", "unauthorized")
            .fail("pull docker.io/mcp/time", "unauthorized")
            .ok("pull docker.io/mcp/time", "");
        let temp = tempfile::tempdir().unwrap();

        let outcome = pull_image(&engine, IMAGE, "docker.io", Some(temp.path())).await;

        assert!(matches!(
            outcome,
            PullOutcome::Succeeded(PullStrategy::LogoutThenPull)
        ));
        assert_eq!(
            engine.calls(),
            vec![
                "pull docker.io/mcp/time",
                "pull docker.io/mcp/time",
                "logout docker.io",
                "pull docker.io/mcp/time",
            ]
        );
    }

    #[tokio::test]
    async fn test_logout_failure_still_pulls() {
        let engine = ScriptedEngine::new()
            .fail("pull docker.io/mcp/time", "unauthorized")
            .fail("pull docker.io/mcp/time", "unauthorized")
            .ok("pull docker.io/mcp/time", "")
            .fail("logout docker.io", "not logged in");

        let outcome = pull_image(&engine, IMAGE, "docker.io", None).await;

        assert!(outcome.is_success());
        assert_eq!(engine.count("pull docker.io/mcp/time"), 3);
    }

    #[tokio::test]
    async fn test_exhausted() {
        let engine = ScriptedEngine::new().fail("pull docker.io/mcp/time", "manifest unknown");
        let temp = tempfile::tempdir().unwrap();

        let outcome = pull_image(&engine, IMAGE, "docker.io", Some(temp.path())).await;

        match outcome {
            PullOutcome::Exhausted { last_error } => {
                assert!(last_error.to_string().contains("manifest unknown"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(engine.count("pull docker.io/mcp/time"), 3);
    }
}
