use thiserror::Error;

/// Everything a manager operation can report back to the menu.
///
/// Only `Store` aborts the operation; the other variants are ordinary
/// answers ("no such mission", "not yours") that the caller shows and moves on.
#[derive(Debug, Error)]
pub enum MissionError {
    #[error("{0}")]
    NotFound(String),

    /// The target is in a state that does not allow the request.
    #[error("{0}")]
    Conflict(String),

    /// The caller is not the mission's leader, or is the leader where a member is expected.
    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("store failure: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl MissionError {
    pub fn is_store_failure(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

pub type Result<T> = std::result::Result<T, MissionError>;

/// Trims a user-supplied name and rejects it when nothing is left.
pub(crate) fn require_name<'a>(raw: &'a str, what: &str) -> Result<&'a str> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(MissionError::InvalidInput(format!("{} must not be empty", what)));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_store_errors_abort() {
        assert!(MissionError::Store(anyhow::anyhow!("disk full")).is_store_failure());
        assert!(!MissionError::NotFound("x".into()).is_store_failure());
        assert!(!MissionError::Forbidden("x".into()).is_store_failure());
    }

    #[test]
    fn names_are_trimmed() {
        assert_eq!(require_name("  alice \n", "User name").unwrap(), "alice");
        assert!(matches!(
            require_name("   ", "User name"),
            Err(MissionError::InvalidInput(_))
        ));
    }
}
