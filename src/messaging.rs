//! Cross-context command delivery (popup or background to a page frame).

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use crate::router::{Command, CommandResponse, VideoMetadata};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SendError {
    /// No listener in the target context (navigated away, not injected)
    #[error("Could not reach page")]
    Unreachable,

    #[error("Message failed: {0}")]
    Failed(String),
}

/// Transport to a page's frame contexts. `frame = None` targets the main frame.
#[async_trait(?Send)]
pub trait Messenger {
    async fn send(&self, frame: Option<u32>, command: Command) -> Result<CommandResponse, SendError>;
}

/// Sender side used by the popup and background contexts
pub struct PageLink<M: Messenger> {
    messenger: M,
}

impl<M: Messenger> PageLink<M> {
    pub fn new(messenger: M) -> Self {
        Self { messenger }
    }

    /// Deliver a command; an unreachable page is a silent `None`
    pub async fn send(&self, frame: Option<u32>, command: Command) -> Option<CommandResponse> {
        match self.messenger.send(frame, command).await {
            Ok(response) => Some(response),
            Err(SendError::Unreachable) => {
                debug!("📭 Page unreachable, dropping command");
                None
            }
            Err(e) => {
                warn!("📭 {}", e);
                None
            }
        }
    }

    /// Ask for video metadata, retrying while the page has no video yet
    pub async fn probe_metadata(&self, attempts: u32, interval: Duration) -> Option<VideoMetadata> {
        for attempt in 1..=attempts {
            if let Some(CommandResponse::Metadata { metadata: Some(metadata) }) =
                self.send(None, Command::GetVideoMetadata).await
            {
                return Some(metadata);
            }
            debug!("No video metadata yet (attempt {}/{})", attempt, attempts);
            if attempt < attempts {
                tokio::time::sleep(interval).await;
            }
        }
        None
    }

    pub fn messenger(&self) -> &M {
        &self.messenger
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct FlakyMessenger {
        calls: Cell<u32>,
        ready_after: u32,
    }

    #[async_trait(?Send)]
    impl Messenger for FlakyMessenger {
        async fn send(&self, _frame: Option<u32>, _command: Command) -> Result<CommandResponse, SendError> {
            let call = self.calls.get() + 1;
            self.calls.set(call);
            if call < self.ready_after {
                return Err(SendError::Unreachable);
            }
            Ok(CommandResponse::Metadata {
                metadata: Some(VideoMetadata {
                    title: "Clip".to_string(),
                    url: "https://example.com/".to_string(),
                    duration: Some(60.0),
                    current_time: 1.0,
                }),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_retries_until_reachable() {
        let link = PageLink::new(FlakyMessenger {
            calls: Cell::new(0),
            ready_after: 3,
        });
        let metadata = link.probe_metadata(5, Duration::from_secs(1)).await;
        assert_eq!(metadata.map(|m| m.title), Some("Clip".to_string()));
        assert_eq!(link.messenger().calls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_gives_up() {
        let link = PageLink::new(FlakyMessenger {
            calls: Cell::new(0),
            ready_after: 10,
        });
        assert!(link.probe_metadata(5, Duration::from_secs(1)).await.is_none());
        assert_eq!(link.messenger().calls.get(), 5);
    }
}
