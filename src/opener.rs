//! Opening the external platform. The tracker only asks for a platform to be opened and records
//! what went wrong, resolution of schemes and fallbacks lives entirely in the implementations.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::platform::Platform;

/// Result of an open request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenOutcome {
    pub success: bool,
    /// Human readable explanation, mostly present on failure.
    pub message: Option<String>,
}

impl OpenOutcome {
    pub fn opened() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlatformOpener: Send + Sync + 'static {
    async fn open(&self, platform: Platform) -> OpenOutcome;
}

/// Opens the platform through the operating system: the native app scheme first, then the
/// platform's website.
pub struct SystemOpener;

#[async_trait]
impl PlatformOpener for SystemOpener {
    async fn open(&self, platform: Platform) -> OpenOutcome {
        let targets = [platform.scheme(), platform.web_url()];
        let attempt = tokio::task::spawn_blocking(move || {
            let mut errors = Vec::new();
            for target in targets {
                match open::that(target) {
                    Ok(()) => return Ok(target),
                    Err(e) => errors.push(format!("{target}: {e}")),
                }
            }
            Err(errors.join("; "))
        })
        .await;

        match attempt {
            Ok(Ok(target)) => {
                debug!("Opened {platform} through {target}");
                OpenOutcome::opened()
            }
            Ok(Err(errors)) => {
                warn!("Couldn't open {platform}: {errors}");
                OpenOutcome::failed(format!("Couldn't open {}. {errors}", platform.name()))
            }
            Err(e) => {
                warn!("Open task for {platform} failed {e:?}");
                OpenOutcome::failed(format!("Couldn't open {}", platform.name()))
            }
        }
    }
}

/// Opener that never leaves the terminal. Used when opening is disabled.
pub struct NoopOpener;

#[async_trait]
impl PlatformOpener for NoopOpener {
    async fn open(&self, platform: Platform) -> OpenOutcome {
        debug!("Skipping open of {platform}");
        OpenOutcome::opened()
    }
}
