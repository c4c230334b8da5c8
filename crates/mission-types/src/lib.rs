pub mod api;
pub mod models;

pub use api::{JoinOutcome, MissionDeleted, MissionEnded, Registration};
pub use models::{
    Mission, MissionId, MissionOutcome, MissionStatus, ParseIdError, UnknownStatus, User, UserId,
};
