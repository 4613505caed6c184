//! Opportunistic docker image precaching.
//!
//! When a batch fans out into N concurrent `docker run` invocations and the
//! image is not present locally, each invocation independently attempts the
//! same pull. Pulling once up front amortizes that cost. The pull here is
//! advisory only: it takes no lock on the image, and every chunk subprocess
//! can still pull on its own if this attempt failed or raced.

use std::process::Stdio;

use tokio::process::Command;

const DOCKER_PROGRAM: &str = "docker";

/// Extract the image reference from a `docker run`-style token list.
///
/// The documented convention is `[--entrypoint[=VALUE] [VALUE]] IMAGE
/// [ARGS...]`, but some callers put arbitrary `docker run` options first.
/// A candidate beginning with `-` is one of those options, not an image, and
/// yields `None`: skipping the precache is safe, misidentifying an option as
/// an image is not.
pub fn image_ref(command: &[String]) -> Option<&str> {
    let candidate = if command.first().map(String::as_str) == Some("--entrypoint") {
        command.get(2)?
    } else if command.first()?.starts_with("--entrypoint=") {
        command.get(1)?
    } else {
        command.first()?
    };
    (!candidate.starts_with('-')).then_some(candidate.as_str())
}

/// Best-effort image puller.
///
/// The program name is injectable so tests can point it at a binary that
/// fails; the default is `docker` on `PATH`.
#[derive(Debug, Clone)]
pub struct Precacher {
    docker: String,
}

impl Default for Precacher {
    fn default() -> Self {
        Self::new(DOCKER_PROGRAM)
    }
}

impl Precacher {
    pub fn new(docker: impl Into<String>) -> Self {
        Self {
            docker: docker.into(),
        }
    }

    /// Pull the image `command` refers to, if one can be identified.
    ///
    /// Every failure (unrecognized command shape, spawn error, nonzero pull
    /// exit) is absorbed here and logged at debug level. The mandatory pull
    /// inside the actual chunk invocation is the authoritative attempt.
    pub async fn warm(&self, command: &[String]) {
        let Some(image) = image_ref(command) else {
            tracing::debug!("No image reference recognized, skipping precache");
            return;
        };

        tracing::debug!(image, "Precaching image");
        let result = Command::new(&self.docker)
            .args(["pull", image])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match result {
            Ok(status) if status.success() => {
                tracing::debug!(image, "Image precached");
            }
            Ok(status) => {
                tracing::debug!(image, code = ?status.code(), "Precache pull failed");
            }
            Err(e) => {
                tracing::debug!(image, error = %e, "Precache pull did not run");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(toks: &[&str]) -> Vec<String> {
        toks.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn plain_image_is_first_token() {
        let cmd = tokens(&["image:tag", "arg"]);
        assert_eq!(image_ref(&cmd), Some("image:tag"));
    }

    #[test]
    fn entrypoint_flag_skips_its_value() {
        let cmd = tokens(&["--entrypoint", "/bin/sh", "image:tag"]);
        assert_eq!(image_ref(&cmd), Some("image:tag"));
    }

    #[test]
    fn entrypoint_equals_form() {
        let cmd = tokens(&["--entrypoint=/bin/sh", "image:tag"]);
        assert_eq!(image_ref(&cmd), Some("image:tag"));
    }

    #[test]
    fn leading_option_is_not_an_image() {
        let cmd = tokens(&["--rm", "image:tag"]);
        assert_eq!(image_ref(&cmd), None);
    }

    #[test]
    fn short_commands_yield_nothing() {
        assert_eq!(image_ref(&[]), None);
        assert_eq!(image_ref(&tokens(&["--entrypoint"])), None);
        assert_eq!(image_ref(&tokens(&["--entrypoint", "/bin/sh"])), None);
    }

    #[tokio::test]
    async fn warm_swallows_pull_failure() {
        // `false` exits nonzero no matter the arguments.
        Precacher::new("false").warm(&tokens(&["image:tag"])).await;
    }

    #[tokio::test]
    async fn warm_swallows_missing_puller() {
        Precacher::new("no-such-docker-7c1fa")
            .warm(&tokens(&["image:tag"]))
            .await;
    }

    #[tokio::test]
    async fn warm_skips_unrecognized_commands() {
        // Never spawns anything, so a nonexistent program is never touched.
        Precacher::new("no-such-docker-7c1fa")
            .warm(&tokens(&["--rm", "image:tag"]))
            .await;
    }
}
