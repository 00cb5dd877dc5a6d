//! Tower layers composed into every built transport.

mod user_agent;

pub use user_agent::{UserAgentLayer, UserAgentService};
