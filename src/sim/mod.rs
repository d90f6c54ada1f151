//! In-memory page, platform and overlay host used by the CLI and the tests.

pub mod overlay;
pub mod page;
pub mod platform;
pub mod scenario;

pub use overlay::RecordingHost;
pub use page::SimPage;
pub use platform::{SimPlatform, SimWindow};
pub use scenario::{ElementSpec, Scenario, SimWorld, VideoSpec};

use async_trait::async_trait;
use std::rc::Rc;
use tracing::{debug, warn};

use crate::config::Config;
use crate::context::FrameContext;
use crate::messaging::{Messenger, SendError};
use crate::router::{Command, CommandResponse, KeyInput};

/// Upper bound on event rounds per pump; each round can queue follow-ups
const MAX_PUMP_ROUNDS: usize = 32;

/// One simulated frame: page, platform, overlay host and the frame context on top
pub struct SimFrame {
    pub page: Rc<SimPage>,
    pub platform: Rc<SimPlatform>,
    pub host: Rc<RecordingHost>,
    pub context: FrameContext,
}

impl SimFrame {
    pub fn new(frame_id: u32, page: Rc<SimPage>, platform: Rc<SimPlatform>, config: &Config) -> Self {
        let host = Rc::new(RecordingHost::new());
        let context = FrameContext::new(frame_id, page.clone(), platform.clone(), host.clone(), config);
        Self {
            page,
            platform,
            host,
            context,
        }
    }

    pub fn from_scenario(frame_id: u32, scenario: &Scenario, config: &Config) -> Self {
        let world = scenario.build();
        Self::new(frame_id, world.page, world.platform, config)
    }

    /// Deliver queued page and platform events until both queues are empty
    pub async fn pump(&self) -> usize {
        let mut delivered = 0;
        for _ in 0..MAX_PUMP_ROUNDS {
            let mut events = self.page.take_events();
            events.extend(self.platform.take_events());
            if events.is_empty() {
                return delivered;
            }
            for event in events {
                debug!("📨 Frame {} event: {:?}", self.context.frame_id(), event);
                self.context.handle_event(event).await;
                delivered += 1;
            }
        }
        warn!("Event pump stopped after {} rounds", MAX_PUMP_ROUNDS);
        delivered
    }

    pub async fn command(&self, command: Command) -> CommandResponse {
        let response = self.context.handle_command(command).await;
        self.pump().await;
        response
    }

    pub async fn key(&self, input: &KeyInput) -> bool {
        let handled = self.context.handle_key(input).await;
        self.pump().await;
        handled
    }
}

/// Routes commands to simulated frames by index; `None` is the main frame
pub struct SimMessenger {
    frames: Vec<Rc<SimFrame>>,
}

impl SimMessenger {
    pub fn new(frames: Vec<Rc<SimFrame>>) -> Self {
        Self { frames }
    }

    pub fn frame(&self, index: usize) -> Option<&Rc<SimFrame>> {
        self.frames.get(index)
    }
}

#[async_trait(?Send)]
impl Messenger for SimMessenger {
    async fn send(&self, frame: Option<u32>, command: Command) -> Result<CommandResponse, SendError> {
        let index = frame.unwrap_or(0) as usize;
        let target = self.frames.get(index).ok_or(SendError::Unreachable)?;
        Ok(target.command(command).await)
    }
}
