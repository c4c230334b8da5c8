pub mod error;
pub mod identity;
pub mod lifecycle;

pub use error::{MissionError, Result};
pub use identity::IdentityManager;
pub use lifecycle::MissionManager;
