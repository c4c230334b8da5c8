use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tracing::{debug, error};

use mission_api::{IdentityManager, MissionError, MissionManager};
use mission_types::{JoinOutcome, Mission, MissionId, Registration, User};

use crate::console::Console;

/// Whether the session keeps going after an action. `Quit` comes from the
/// Exit option or from input running out at any prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

enum Pick {
    Chosen(MissionId),
    Skipped,
    Quit,
}

/// Prompt for one line, or leave the current action with `Flow::Quit` on end of input.
macro_rules! ask_or_quit {
    ($console:expr, $prompt:expr) => {
        match $console.ask($prompt).await? {
            Some(line) => line,
            None => return Ok(Flow::Quit),
        }
    };
}

pub struct App {
    identity: IdentityManager,
    missions: MissionManager,
}

impl App {
    pub fn new(identity: IdentityManager, missions: MissionManager) -> Self {
        Self { identity, missions }
    }

    /// Main menu loop. Returns once the user exits or input ends; `Err` only
    /// for console I/O failures.
    pub async fn run<R, W>(&self, console: &mut Console<R, W>) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        loop {
            console.say("\n=== MAIN MENU ===").await?;
            console.say("1. Create User").await?;
            console.say("2. Login User").await?;
            console.say("3. Exit").await?;

            let Some(choice) = console.ask("Select option: ").await? else {
                break;
            };

            let flow = match choice.trim() {
                "1" => self.create_user(console).await?,
                "2" => self.login(console).await?,
                "3" => Flow::Quit,
                other => {
                    debug!(choice = other, "Unknown main menu option");
                    console.say("Invalid option!").await?;
                    Flow::Continue
                }
            };

            if flow == Flow::Quit {
                break;
            }
        }

        console.say("Goodbye!").await?;
        Ok(())
    }

    async fn create_user<R, W>(&self, console: &mut Console<R, W>) -> Result<Flow>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let name = ask_or_quit!(console, "Enter user name: ");

        match self.identity.register(&name) {
            Ok(Registration::Created(user)) => {
                console.say(&format!("User created with ID: {}", user.id)).await?
            }
            Ok(Registration::AlreadyExists(_)) => console.say("User already exists!").await?,
            Err(e) => report(console, "create user", e).await?,
        }
        Ok(Flow::Continue)
    }

    async fn login<R, W>(&self, console: &mut Console<R, W>) -> Result<Flow>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let name = ask_or_quit!(console, "Enter your username: ");

        match self.identity.authenticate(&name) {
            Ok(Some(user)) => {
                console
                    .say(&format!("Logged in as {} (ID: {})", user.name, user.id))
                    .await?;
                self.mission_menu(console, &user).await
            }
            Ok(None) => {
                console.say("User not found!").await?;
                Ok(Flow::Continue)
            }
            Err(e) => {
                report(console, "login", e).await?;
                Ok(Flow::Continue)
            }
        }
    }

    async fn mission_menu<R, W>(&self, console: &mut Console<R, W>, user: &User) -> Result<Flow>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        loop {
            console.say("\n=== MISSION MENU ===").await?;
            console.say("1. Create Mission").await?;
            console.say("2. Join Mission").await?;
            console.say("3. Start Mission").await?;
            console.say("4. End Mission").await?;
            console.say("5. List All Missions").await?;
            console.say("6. Delete Mission").await?;
            console.say("7. Back to Main Menu").await?;

            let choice = ask_or_quit!(console, "Select option: ");

            let flow = match choice.trim() {
                "1" => self.create_mission(console, user).await?,
                "2" => self.join_mission(console, user).await?,
                "3" => self.start_mission(console, user).await?,
                "4" => self.end_mission(console, user).await?,
                "5" => self.list_missions(console).await?,
                "6" => self.delete_mission(console, user).await?,
                "7" => return Ok(Flow::Continue),
                other => {
                    debug!(choice = other, "Unknown mission menu option");
                    console.say("Invalid option!").await?;
                    Flow::Continue
                }
            };

            if flow == Flow::Quit {
                return Ok(Flow::Quit);
            }
        }
    }

    async fn create_mission<R, W>(&self, console: &mut Console<R, W>, user: &User) -> Result<Flow>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let name = ask_or_quit!(console, "Enter mission name: ");

        match self.missions.create(user.id, &name) {
            Ok(mission) => {
                console
                    .say(&format!("Mission \"{}\" created with ID: {}", mission.name, mission.id))
                    .await?
            }
            Err(e) => report(console, "create mission", e).await?,
        }
        Ok(Flow::Continue)
    }

    async fn join_mission<R, W>(&self, console: &mut Console<R, W>, user: &User) -> Result<Flow>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let id = match pick(
            console,
            self.missions.joinable(user.id),
            "No available missions to join!",
            "\nAvailable Missions:",
            "Enter mission ID to join: ",
        )
        .await?
        {
            Pick::Chosen(id) => id,
            Pick::Skipped => return Ok(Flow::Continue),
            Pick::Quit => return Ok(Flow::Quit),
        };

        match self.missions.join(user.id, id) {
            Ok(JoinOutcome::Joined) => console.say("You joined the mission!").await?,
            Ok(JoinOutcome::AlreadyMember) => {
                console.say("You are already a member of this mission.").await?
            }
            Err(e) => report(console, "join mission", e).await?,
        }
        Ok(Flow::Continue)
    }

    async fn start_mission<R, W>(&self, console: &mut Console<R, W>, user: &User) -> Result<Flow>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let id = match pick(
            console,
            self.missions.startable(user.id),
            "No missions waiting to start for this leader!",
            "Your Missions:",
            "Enter mission ID to start: ",
        )
        .await?
        {
            Pick::Chosen(id) => id,
            Pick::Skipped => return Ok(Flow::Continue),
            Pick::Quit => return Ok(Flow::Quit),
        };

        match self.missions.start(user.id, id) {
            Ok(_) => console.say("Mission started!").await?,
            Err(e) if !e.is_store_failure() => {
                console.say(&format!("You can't start this mission! ({})", e)).await?
            }
            Err(e) => report(console, "start mission", e).await?,
        }
        Ok(Flow::Continue)
    }

    async fn end_mission<R, W>(&self, console: &mut Console<R, W>, user: &User) -> Result<Flow>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let id = match pick(
            console,
            self.missions.endable(user.id),
            "No missions in progress for you to end.",
            "Your missions in progress:",
            "Enter mission ID to end: ",
        )
        .await?
        {
            Pick::Chosen(id) => id,
            Pick::Skipped => return Ok(Flow::Continue),
            Pick::Quit => return Ok(Flow::Quit),
        };

        match self.missions.end(user.id, id) {
            Ok(ended) => {
                console
                    .say(&format!(
                        "Mission {} ended (status = {})",
                        ended.mission.id, ended.mission.status
                    ))
                    .await?;
                console.say("Members in this mission:").await?;
                if ended.members.is_empty() {
                    console.say("- (no members)").await?;
                }
                for name in &ended.members {
                    console.say(&format!("- {}", name)).await?;
                }
                console.say(&format!("Mission result: {}", ended.outcome)).await?;
            }
            Err(e) if !e.is_store_failure() => {
                console
                    .say(&format!("Mission not found or not allowed to end. ({})", e))
                    .await?
            }
            Err(e) => report(console, "end mission", e).await?,
        }
        Ok(Flow::Continue)
    }

    async fn list_missions<R, W>(&self, console: &mut Console<R, W>) -> Result<Flow>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        match self.missions.list() {
            Ok(missions) if missions.is_empty() => console.say("No missions found.").await?,
            Ok(missions) => {
                for m in &missions {
                    console
                        .say(&format!(
                            "\n{}: {}, Status: {}, Leader: {}",
                            m.id, m.name, m.status, m.leader_name
                        ))
                        .await?;
                }
            }
            Err(e) => report(console, "list missions", e).await?,
        }
        Ok(Flow::Continue)
    }

    async fn delete_mission<R, W>(&self, console: &mut Console<R, W>, user: &User) -> Result<Flow>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let id = match pick(
            console,
            self.missions.owned(user.id),
            "No missions to delete!",
            "Your missions:",
            "Enter mission ID to delete: ",
        )
        .await?
        {
            Pick::Chosen(id) => id,
            Pick::Skipped => return Ok(Flow::Continue),
            Pick::Quit => return Ok(Flow::Quit),
        };

        match self.missions.delete(user.id, id) {
            Ok(deleted) if deleted.members_removed > 0 => {
                console
                    .say(&format!(
                        "Mission deleted! ({} member(s) removed)",
                        deleted.members_removed
                    ))
                    .await?
            }
            Ok(_) => console.say("Mission deleted!").await?,
            Err(e) => report(console, "delete mission", e).await?,
        }
        Ok(Flow::Continue)
    }
}

/// Shows the candidate missions and reads the chosen id. Empty candidate
/// lists and unparsable ids end the action without touching the store.
async fn pick<R, W>(
    console: &mut Console<R, W>,
    candidates: mission_api::Result<Vec<Mission>>,
    empty: &str,
    header: &str,
    prompt: &str,
) -> Result<Pick>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let candidates = match candidates {
        Ok(c) => c,
        Err(e) => {
            report(console, "load missions", e).await?;
            return Ok(Pick::Skipped);
        }
    };

    if candidates.is_empty() {
        console.say(empty).await?;
        return Ok(Pick::Skipped);
    }

    console.say(header).await?;
    for m in &candidates {
        console.say(&format!("{}: {} [{}]", m.id, m.name, m.status)).await?;
    }

    let Some(input) = console.ask(prompt).await? else {
        return Ok(Pick::Quit);
    };

    match input.parse::<MissionId>() {
        Ok(id) => Ok(Pick::Chosen(id)),
        Err(e) => {
            debug!(error = %e, "Rejected mission id");
            console.say("Invalid mission ID.").await?;
            Ok(Pick::Skipped)
        }
    }
}

/// Store failures abort only the current action; everything else is a plain answer for the user.
async fn report<R, W>(console: &mut Console<R, W>, action: &str, err: MissionError) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if err.is_store_failure() {
        error!("Failed to {}: {}", action, err);
        console.say(&format!("Error: could not {}; operation aborted.", action)).await
    } else {
        console.say(&err.to_string()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use mission_db::Database;

    fn app() -> (Arc<Database>, App) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let app = App::new(IdentityManager::new(db.clone()), MissionManager::new(db.clone()));
        (db, app)
    }

    async fn session(app: &App, script: impl AsRef<[u8]>) -> String {
        let mut console = Console::new(script.as_ref(), Vec::new());
        app.run(&mut console).await.unwrap();
        String::from_utf8(console.into_output()).unwrap()
    }

    #[tokio::test]
    async fn duplicate_registration_is_reported() {
        let (_db, app) = app();
        let out = session(&app, "1\nalice\n1\nalice\n3\n").await;

        assert!(out.contains("User created with ID: 1"));
        assert!(out.contains("User already exists!"));
        assert!(out.trim_end().ends_with("Goodbye!"));
    }

    #[tokio::test]
    async fn unknown_login_and_bad_options() {
        let (_db, app) = app();
        let out = session(&app, "9\n2\nnobody\n3\n").await;

        assert!(out.contains("Invalid option!"));
        assert!(out.contains("User not found!"));
    }

    #[tokio::test]
    async fn non_utf8_input_is_reported_and_the_menu_continues() {
        let (db, app) = app();
        let out = session(&app, b"1\n\xffalice\n1\nbob\n3\n").await;

        assert!(out.contains("Invalid input: not valid UTF-8."));
        assert!(out.contains("User name must not be empty"));
        assert!(out.contains("User created with ID: 1"));
        assert!(out.trim_end().ends_with("Goodbye!"));
        assert_eq!(db.get_user_by_name("bob").unwrap().unwrap().user_id, 1);
    }

    #[tokio::test]
    async fn store_failure_aborts_only_the_current_action() {
        let (db, app) = app();
        db.create_user("alice").unwrap();
        db.with_conn(|conn| {
            conn.execute_batch("DROP TABLE mission_member; DROP TABLE mission;")?;
            Ok(())
        })
        .unwrap();

        let out = session(&app, "2\nalice\n5\n7\n3\n").await;

        let aborted = out
            .find("Error: could not list missions; operation aborted.")
            .expect("abort message shown");
        assert!(out[aborted..].contains("=== MISSION MENU ==="));
        assert_eq!(out.matches("=== MISSION MENU ===").count(), 2);
        assert!(out.trim_end().ends_with("Goodbye!"));
    }

    #[tokio::test]
    async fn end_of_input_exits_cleanly() {
        let (_db, app) = app();
        let out = session(&app, "1\nalice\n2\nalice\n").await;

        assert!(out.contains("Logged in as alice (ID: 1)"));
        assert!(out.contains("=== MISSION MENU ==="));
        assert!(out.trim_end().ends_with("Goodbye!"));
    }

    #[tokio::test]
    async fn rescue_scenario_through_the_menus() {
        let (db, app) = app();
        let script = concat!(
            "1\nalice\n",
            "1\nbob\n",
            // alice creates Rescue
            "2\nalice\n1\nRescue\n7\n",
            // bob joins it
            "2\nbob\n2\n1\n7\n",
            // alice starts, ends, lists
            "2\nalice\n3\n1\n4\n1\n5\n7\n",
            "3\n",
        );
        let out = session(&app, script).await;

        assert!(out.contains("Mission \"Rescue\" created with ID: 1"));
        assert!(out.contains("1: Rescue [not_started]"));
        assert!(out.contains("You joined the mission!"));
        assert!(out.contains("Mission started!"));
        assert!(out.contains("Mission 1 ended (status = finished)"));
        assert!(out.contains("Members in this mission:\n- bob\n"));
        assert!(out.contains("Mission result: WON") || out.contains("Mission result: LOST"));
        assert!(out.contains("1: Rescue, Status: finished, Leader: alice"));

        assert!(db.is_member(1, 2).unwrap());
    }

    #[tokio::test]
    async fn leader_actions_are_scoped_to_the_caller() {
        let (db, app) = app();
        let script = concat!(
            "1\nalice\n1\nbob\n",
            "2\nalice\n1\nRescue\n7\n",
            // bob has nothing to start, end, or delete, and cannot join via a typo
            "2\nbob\n3\n4\n6\n2\nabc\n7\n",
            "3\n",
        );
        let out = session(&app, script).await;

        assert!(out.contains("No missions waiting to start for this leader!"));
        assert!(out.contains("No missions in progress for you to end."));
        assert!(out.contains("No missions to delete!"));
        assert!(out.contains("Invalid mission ID."));
        assert_eq!(db.list_missions().unwrap().len(), 1);
        assert_eq!(db.count_members(1).unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_removes_mission_and_members() {
        let (db, app) = app();
        let script = concat!(
            "1\nalice\n1\nbob\n",
            "2\nalice\n1\nRescue\n7\n",
            "2\nbob\n2\n1\n7\n",
            "2\nalice\n6\n1\n5\n7\n",
            "3\n",
        );
        let out = session(&app, script).await;

        assert!(out.contains("Mission deleted! (1 member(s) removed)"));
        assert!(out.contains("No missions found."));
        assert!(db.list_missions().unwrap().is_empty());
    }
}
