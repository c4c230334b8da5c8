use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};

use crate::Database;
use crate::models::{MemberRow, MissionRow, UserRow};

/// Every mission read carries the leader's name, so listings never need a second lookup.
const MISSION_SELECT: &str = "
     SELECT m.mission_id, m.name, m.status, m.mission_leader_id, u.name, m.created_at
     FROM mission m
     JOIN user u ON u.user_id = m.mission_leader_id";

/// Row counts touched by [`Database::delete_mission`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteCounts {
    pub missions: usize,
    pub members: usize,
}

impl Database {
    // -- Users --

    /// Inserts a user and returns the assigned `user_id`.
    pub fn create_user(&self, name: &str) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute("INSERT INTO user (name) VALUES (?1)", [name])?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_user_by_name(&self, name: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT user_id, name, created_at FROM user WHERE name = ?1",
                    [name],
                    UserRow::from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn get_user_by_id(&self, user_id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT user_id, name, created_at FROM user WHERE user_id = ?1",
                    [user_id],
                    UserRow::from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    // -- Missions --

    /// Inserts a mission in `not_started` and returns the assigned `mission_id`.
    pub fn create_mission(&self, name: &str, leader_id: i64) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO mission (name, status, mission_leader_id)
                 VALUES (?1, 'not_started', ?2)",
                params![name, leader_id],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_mission(&self, mission_id: i64) -> Result<Option<MissionRow>> {
        self.with_conn(|conn| {
            let sql = format!("{MISSION_SELECT} WHERE m.mission_id = ?1");
            let row = conn
                .query_row(&sql, [mission_id], MissionRow::from_row)
                .optional()?;
            Ok(row)
        })
    }

    pub fn list_missions(&self) -> Result<Vec<MissionRow>> {
        self.with_conn(|conn| {
            let sql = format!("{MISSION_SELECT} ORDER BY m.mission_id");
            query_missions(conn, &sql, params![])
        })
    }

    /// Missions led by `leader_id`, optionally narrowed to one status.
    pub fn list_missions_by_leader(
        &self,
        leader_id: i64,
        status: Option<&str>,
    ) -> Result<Vec<MissionRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{MISSION_SELECT}
                 WHERE m.mission_leader_id = ?1 AND (?2 IS NULL OR m.status = ?2)
                 ORDER BY m.mission_id"
            );
            query_missions(conn, &sql, params![leader_id, status])
        })
    }

    /// Missions `user_id` could still join: not already joined, not led by
    /// them, and not finished.
    pub fn list_joinable_missions(&self, user_id: i64) -> Result<Vec<MissionRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{MISSION_SELECT}
                 WHERE m.mission_id NOT IN
                       (SELECT mission_id FROM mission_member WHERE member_id = ?1)
                   AND m.mission_leader_id != ?1
                   AND m.status != 'finished'
                 ORDER BY m.mission_id"
            );
            query_missions(conn, &sql, params![user_id])
        })
    }

    /// Moves a mission from `from` to `to`, but only if it is led by
    /// `leader_id` and currently in `from`. Returns the affected row count.
    pub fn update_mission_status(
        &self,
        mission_id: i64,
        leader_id: i64,
        from: &str,
        to: &str,
    ) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE mission SET status = ?4
                 WHERE mission_id = ?1 AND mission_leader_id = ?2 AND status = ?3",
                params![mission_id, leader_id, from, to],
            )?;
            Ok(changed)
        })
    }

    /// Deletes a mission by primary key, restricted to its leader, together
    /// with its membership rows. Nothing is touched when the caller does not
    /// lead the mission.
    pub fn delete_mission(&self, mission_id: i64, leader_id: i64) -> Result<DeleteCounts> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let owned: bool = tx.query_row(
                "SELECT EXISTS(
                     SELECT 1 FROM mission WHERE mission_id = ?1 AND mission_leader_id = ?2
                 )",
                params![mission_id, leader_id],
                |row| row.get(0),
            )?;
            if !owned {
                return Ok(DeleteCounts::default());
            }

            let members =
                tx.execute("DELETE FROM mission_member WHERE mission_id = ?1", [mission_id])?;
            let missions = tx.execute(
                "DELETE FROM mission WHERE mission_id = ?1 AND mission_leader_id = ?2",
                params![mission_id, leader_id],
            )?;

            tx.commit()?;
            Ok(DeleteCounts { missions, members })
        })
    }

    // -- Membership --

    /// Adds `member_id` to a mission. Returns false when the pair already existed.
    pub fn add_member(&self, mission_id: i64, member_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO mission_member (mission_id, member_id) VALUES (?1, ?2)",
                params![mission_id, member_id],
            )?;
            Ok(inserted > 0)
        })
    }

    pub fn is_member(&self, mission_id: i64, member_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn.query_row(
                "SELECT EXISTS(
                     SELECT 1 FROM mission_member WHERE mission_id = ?1 AND member_id = ?2
                 )",
                params![mission_id, member_id],
                |row| row.get(0),
            )?;
            Ok(found)
        })
    }

    pub fn count_members(&self, mission_id: i64) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM mission_member WHERE mission_id = ?1",
                [mission_id],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
    }

    /// Members of a mission in join order.
    pub fn list_members(&self, mission_id: i64) -> Result<Vec<MemberRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT mm.mission_id, mm.member_id, u.name, mm.joined_at
                 FROM mission_member mm
                 JOIN user u ON u.user_id = mm.member_id
                 WHERE mm.mission_id = ?1
                 ORDER BY mm.rowid",
            )?;

            let rows = stmt
                .query_map([mission_id], MemberRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

fn query_missions(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::ToSql],
) -> Result<Vec<MissionRow>> {
    let mut stmt = conn.prepare(sql)?;

    let rows = stmt
        .query_map(params, MissionRow::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> (Database, i64, i64) {
        let db = Database::open_in_memory().unwrap();
        let alice = db.create_user("alice").unwrap();
        let bob = db.create_user("bob").unwrap();
        (db, alice, bob)
    }

    #[test]
    fn user_names_are_unique() {
        let (db, alice, _) = seeded();
        assert!(db.create_user("alice").is_err());

        let row = db.get_user_by_name("alice").unwrap().unwrap();
        assert_eq!(row.user_id, alice);
        assert_eq!(db.get_user_by_id(alice).unwrap().unwrap().name, "alice");
        assert!(db.get_user_by_name("carol").unwrap().is_none());
    }

    #[test]
    fn ids_are_assigned_in_order() {
        let (db, alice, bob) = seeded();
        assert_eq!((alice, bob), (1, 2));
        assert_eq!(db.create_mission("Rescue", alice).unwrap(), 1);
        assert_eq!(db.create_mission("Recon", bob).unwrap(), 2);
    }

    #[test]
    fn new_missions_start_not_started() {
        let (db, alice, _) = seeded();
        let id = db.create_mission("Rescue", alice).unwrap();

        let row = db.get_mission(id).unwrap().unwrap();
        assert_eq!(row.status, "not_started");
        assert_eq!(row.mission_leader_id, alice);
        assert_eq!(row.leader_name, "alice");
        assert!(db.get_mission(id + 1).unwrap().is_none());
    }

    #[test]
    fn duplicate_membership_is_ignored() {
        let (db, alice, bob) = seeded();
        let id = db.create_mission("Rescue", alice).unwrap();

        assert!(db.add_member(id, bob).unwrap());
        assert!(!db.add_member(id, bob).unwrap());
        assert_eq!(db.count_members(id).unwrap(), 1);
        assert!(db.is_member(id, bob).unwrap());

        let members = db.list_members(id).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].name, "bob");
        assert_eq!(members[0].member_id, bob);
    }

    #[test]
    fn joinable_excludes_joined_led_and_finished() {
        let (db, alice, bob) = seeded();
        let rescue = db.create_mission("Rescue", alice).unwrap();
        let recon = db.create_mission("Recon", alice).unwrap();
        let own = db.create_mission("Bob's", bob).unwrap();
        let done = db.create_mission("Done", alice).unwrap();
        db.update_mission_status(done, alice, "not_started", "in_progress").unwrap();
        db.update_mission_status(done, alice, "in_progress", "finished").unwrap();

        db.add_member(rescue, bob).unwrap();

        let joinable: Vec<i64> = db
            .list_joinable_missions(bob)
            .unwrap()
            .into_iter()
            .map(|m| m.mission_id)
            .collect();
        assert_eq!(joinable, vec![recon]);
        assert!(!joinable.contains(&own));
    }

    #[test]
    fn status_update_requires_leader_and_expected_status() {
        let (db, alice, bob) = seeded();
        let id = db.create_mission("Rescue", alice).unwrap();

        assert_eq!(db.update_mission_status(id, bob, "not_started", "in_progress").unwrap(), 0);
        assert_eq!(db.update_mission_status(id, alice, "in_progress", "finished").unwrap(), 0);
        assert_eq!(db.update_mission_status(id, alice, "not_started", "in_progress").unwrap(), 1);
        assert_eq!(db.get_mission(id).unwrap().unwrap().status, "in_progress");
    }

    #[test]
    fn leader_listing_filters_by_status() {
        let (db, alice, bob) = seeded();
        let a = db.create_mission("A", alice).unwrap();
        let b = db.create_mission("B", alice).unwrap();
        db.create_mission("C", bob).unwrap();
        db.update_mission_status(b, alice, "not_started", "in_progress").unwrap();

        assert_eq!(db.list_missions_by_leader(alice, None).unwrap().len(), 2);
        let started = db.list_missions_by_leader(alice, Some("in_progress")).unwrap();
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].mission_id, b);
        let pending = db.list_missions_by_leader(alice, Some("not_started")).unwrap();
        assert_eq!(pending[0].mission_id, a);
        assert_eq!(db.list_missions().unwrap().len(), 3);
    }

    #[test]
    fn delete_by_non_leader_changes_nothing() {
        let (db, alice, bob) = seeded();
        let id = db.create_mission("Rescue", alice).unwrap();
        db.add_member(id, bob).unwrap();

        assert_eq!(db.delete_mission(id, bob).unwrap(), DeleteCounts::default());
        assert_eq!(db.list_missions().unwrap().len(), 1);
        assert_eq!(db.count_members(id).unwrap(), 1);
    }

    #[test]
    fn delete_by_leader_removes_memberships() {
        let (db, alice, bob) = seeded();
        let id = db.create_mission("Rescue", alice).unwrap();
        db.add_member(id, bob).unwrap();

        let counts = db.delete_mission(id, alice).unwrap();
        assert_eq!(counts, DeleteCounts { missions: 1, members: 1 });
        assert!(db.get_mission(id).unwrap().is_none());
        assert_eq!(db.count_members(id).unwrap(), 0);
    }
}
