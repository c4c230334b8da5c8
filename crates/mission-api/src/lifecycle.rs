use std::sync::Arc;

use rand::Rng;
use tracing::{info, warn};

use mission_db::Database;
use mission_types::{
    JoinOutcome, Mission, MissionDeleted, MissionEnded, MissionId, MissionOutcome, MissionStatus,
    UserId,
};

use crate::error::{MissionError, Result, require_name};

/// Owns mission CRUD, membership, and the
/// `not_started -> in_progress -> finished` transitions.
///
/// Leader-only operations check leadership and the current status before
/// writing, and the write itself is conditioned on both again, so a zero-row
/// update never silently passes.
pub struct MissionManager {
    db: Arc<Database>,
}

impl MissionManager {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn create(&self, leader: UserId, name: &str) -> Result<Mission> {
        let name = require_name(name, "Mission name")?;

        if self.db.get_user_by_id(leader.0)?.is_none() {
            return Err(MissionError::NotFound(format!("User {} not found", leader)));
        }

        let id = MissionId(self.db.create_mission(name, leader.0)?);
        let mission = self.load(id)?;

        info!(mission_id = %id, leader_id = %leader, name = %mission.name, "Mission created");
        Ok(mission)
    }

    /// All missions, whoever leads them.
    pub fn list(&self) -> Result<Vec<Mission>> {
        collect(self.db.list_missions()?)
    }

    /// Every mission led by `leader`, in any state.
    pub fn owned(&self, leader: UserId) -> Result<Vec<Mission>> {
        collect(self.db.list_missions_by_leader(leader.0, None)?)
    }

    // -- Membership --

    /// Missions `user` may join: not yet joined, not their own, not finished.
    pub fn joinable(&self, user: UserId) -> Result<Vec<Mission>> {
        collect(self.db.list_joinable_missions(user.0)?)
    }

    pub fn join(&self, user: UserId, mission_id: MissionId) -> Result<JoinOutcome> {
        let mission = self.load(mission_id)?;

        if mission.is_led_by(user) {
            warn!(mission_id = %mission_id, user_id = %user, "Leader tried to join own mission");
            return Err(MissionError::Forbidden(format!(
                "You lead mission {}; leaders are not members",
                mission_id
            )));
        }
        if self.db.is_member(mission_id.0, user.0)? {
            return Ok(JoinOutcome::AlreadyMember);
        }
        if mission.status.is_finished() {
            return Err(MissionError::Conflict(format!(
                "Mission {} is already finished",
                mission_id
            )));
        }

        if !self.db.add_member(mission_id.0, user.0)? {
            return Ok(JoinOutcome::AlreadyMember);
        }

        info!(mission_id = %mission_id, user_id = %user, "Member joined mission");
        Ok(JoinOutcome::Joined)
    }

    /// Member names of a mission in join order.
    pub fn members(&self, mission_id: MissionId) -> Result<Vec<String>> {
        let rows = self.db.list_members(mission_id.0)?;
        Ok(rows.into_iter().map(|row| row.name).collect())
    }

    // -- Transitions --

    /// The leader's missions that can still be started.
    pub fn startable(&self, leader: UserId) -> Result<Vec<Mission>> {
        self.by_leader_in(leader, MissionStatus::NotStarted)
    }

    /// Allowed only from `not_started`; re-starting an in-progress or
    /// finished mission is a conflict.
    pub fn start(&self, leader: UserId, mission_id: MissionId) -> Result<Mission> {
        let mission = self.transition(leader, mission_id, MissionStatus::InProgress)?;

        info!(mission_id = %mission_id, leader_id = %leader, "Mission started");
        Ok(mission)
    }

    /// The leader's missions that can be ended.
    pub fn endable(&self, leader: UserId) -> Result<Vec<Mission>> {
        self.by_leader_in(leader, MissionStatus::InProgress)
    }

    pub fn end(&self, leader: UserId, mission_id: MissionId) -> Result<MissionEnded> {
        self.end_with_rng(leader, mission_id, &mut rand::rng())
    }

    /// Finishes the mission, then draws the outcome from `rng`. The outcome
    /// is reported only; nothing about it is stored.
    ///
    /// Members are read before the status write, so a failed read leaves the
    /// mission in progress.
    pub fn end_with_rng<R: Rng>(
        &self,
        leader: UserId,
        mission_id: MissionId,
        rng: &mut R,
    ) -> Result<MissionEnded> {
        let members = self.members(mission_id)?;
        let mission = self.transition(leader, mission_id, MissionStatus::Finished)?;
        let outcome = draw_outcome(rng);

        info!(
            mission_id = %mission_id,
            leader_id = %leader,
            members = members.len(),
            %outcome,
            "Mission ended"
        );
        Ok(MissionEnded {
            mission,
            members,
            outcome,
        })
    }

    // -- Deletion --

    /// Removes a mission led by `leader` together with its membership rows.
    pub fn delete(&self, leader: UserId, mission_id: MissionId) -> Result<MissionDeleted> {
        let mission = self.load(mission_id)?;

        if !mission.is_led_by(leader) {
            warn!(
                mission_id = %mission_id,
                user_id = %leader,
                "Non-leader tried to delete mission"
            );
            return Err(MissionError::Forbidden(format!(
                "Mission {} is not yours to delete",
                mission_id
            )));
        }

        let counts = self.db.delete_mission(mission_id.0, leader.0)?;
        if counts.missions == 0 {
            return Err(MissionError::NotFound(format!("Mission {} not found", mission_id)));
        }

        info!(
            mission_id = %mission_id,
            leader_id = %leader,
            members_removed = counts.members,
            "Mission deleted"
        );
        Ok(MissionDeleted {
            mission,
            members_removed: counts.members,
        })
    }

    fn load(&self, mission_id: MissionId) -> Result<Mission> {
        let row = self
            .db
            .get_mission(mission_id.0)?
            .ok_or_else(|| MissionError::NotFound(format!("Mission {} not found", mission_id)))?;
        Ok(Mission::try_from(row)?)
    }

    fn by_leader_in(&self, leader: UserId, status: MissionStatus) -> Result<Vec<Mission>> {
        collect(self.db.list_missions_by_leader(leader.0, Some(status.as_str()))?)
    }

    fn transition(
        &self,
        leader: UserId,
        mission_id: MissionId,
        next: MissionStatus,
    ) -> Result<Mission> {
        let mission = self.load(mission_id)?;

        if !mission.is_led_by(leader) {
            warn!(
                mission_id = %mission_id,
                user_id = %leader,
                to = %next,
                "Non-leader transition rejected"
            );
            return Err(MissionError::Forbidden(format!(
                "Only the leader of mission {} can change its status",
                mission_id
            )));
        }
        if !mission.status.can_transition_to(next) {
            warn!(
                mission_id = %mission_id,
                from = %mission.status,
                to = %next,
                "Illegal transition rejected"
            );
            return Err(MissionError::Conflict(format!(
                "Mission {} is {}; it cannot move to {}",
                mission_id, mission.status, next
            )));
        }

        let changed = self.db.update_mission_status(
            mission_id.0,
            leader.0,
            mission.status.as_str(),
            next.as_str(),
        )?;
        if changed == 0 {
            return Err(MissionError::Conflict(format!(
                "Mission {} changed before it could move to {}",
                mission_id, next
            )));
        }

        Ok(Mission {
            status: next,
            ..mission
        })
    }
}

fn collect(rows: Vec<mission_db::models::MissionRow>) -> Result<Vec<Mission>> {
    let missions = rows
        .into_iter()
        .map(Mission::try_from)
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(missions)
}

/// Fair coin between won and lost.
fn draw_outcome<R: Rng>(rng: &mut R) -> MissionOutcome {
    if rng.random_bool(0.5) {
        MissionOutcome::Won
    } else {
        MissionOutcome::Lost
    }
}
