//! Database row types. These map directly to SQLite rows and are converted
//! into mission-types records at the boundary, where the text columns
//! (status, timestamps) get validated.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::Row;

use mission_types::{Mission, MissionId, MissionStatus, User, UserId};

/// Format produced by SQLite's `datetime('now')`.
const SQLITE_DATETIME: &str = "%Y-%m-%d %H:%M:%S";

pub struct UserRow {
    pub user_id: i64,
    pub name: String,
    pub created_at: String,
}

impl UserRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            user_id: row.get(0)?,
            name: row.get(1)?,
            created_at: row.get(2)?,
        })
    }
}

pub struct MissionRow {
    pub mission_id: i64,
    pub name: String,
    pub status: String,
    pub mission_leader_id: i64,
    pub leader_name: String,
    pub created_at: String,
}

impl MissionRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            mission_id: row.get(0)?,
            name: row.get(1)?,
            status: row.get(2)?,
            mission_leader_id: row.get(3)?,
            leader_name: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

/// A `mission_member` row joined with the member's name.
pub struct MemberRow {
    pub mission_id: i64,
    pub member_id: i64,
    pub name: String,
    pub joined_at: String,
}

impl MemberRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            mission_id: row.get(0)?,
            member_id: row.get(1)?,
            name: row.get(2)?,
            joined_at: row.get(3)?,
        })
    }
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw, SQLITE_DATETIME)
        .with_context(|| format!("bad timestamp in store: {:?}", raw))?;
    Ok(naive.and_utc())
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(User {
            id: UserId(row.user_id),
            created_at: parse_timestamp(&row.created_at)?,
            name: row.name,
        })
    }
}

impl TryFrom<MissionRow> for Mission {
    type Error = anyhow::Error;

    fn try_from(row: MissionRow) -> Result<Self> {
        let status: MissionStatus = row
            .status
            .parse()
            .with_context(|| format!("mission {} has a corrupt status", row.mission_id))?;

        Ok(Mission {
            id: MissionId(row.mission_id),
            status,
            leader_id: UserId(row.mission_leader_id),
            created_at: parse_timestamp(&row.created_at)?,
            name: row.name,
            leader_name: row.leader_name,
        })
    }
}
