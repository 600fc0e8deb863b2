pub mod backends;
pub mod config;
pub mod cost;
pub mod element;
pub mod engine;
pub mod errors;
pub mod locator;
pub mod vision;

pub use config::{AgentEnvironment, ProbeConfig, ResolutionMode};
pub use element::{ElementHandle, HandleSource, Point, Rect};
pub use engine::dispatcher::{Action, ActionResult, ActionStatus};
pub use engine::resolver::{WaitOptions, WaitState};
pub use engine::Session;
pub use errors::{ProbeError, ProbeResult};
pub use locator::{normalize, Locator, Strategy};

/// Installs the default tracing subscriber. Test harnesses that manage
/// their own subscriber skip this.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
