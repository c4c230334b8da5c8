use std::path::PathBuf;

pub const DEFAULT_DB_PATH: &str = "mission_app.db";
pub const DEFAULT_LOG_FILTER: &str = "mission_cli=info,mission_api=info,mission_db=info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_path: PathBuf,
}

impl Config {
    /// Reads `MISSION_DB_PATH`; unset or blank falls back to the default file.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let db_path = lookup("MISSION_DB_PATH")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_DB_PATH.into());

        Self {
            db_path: PathBuf::from(db_path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_unset_or_blank() {
        assert_eq!(Config::from_lookup(|_| None).db_path, PathBuf::from(DEFAULT_DB_PATH));
        assert_eq!(
            Config::from_lookup(|_| Some("   ".into())).db_path,
            PathBuf::from(DEFAULT_DB_PATH)
        );
    }

    #[test]
    fn reads_db_path() {
        let config = Config::from_lookup(|key| {
            (key == "MISSION_DB_PATH").then(|| "/tmp/missions.db".to_string())
        });
        assert_eq!(config.db_path, PathBuf::from("/tmp/missions.db"));
    }
}
