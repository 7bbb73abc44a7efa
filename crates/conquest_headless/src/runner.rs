//! Interactive match runner driven by JSON lines.
//!
//! One command per line arrives on a reader, one or more responses per
//! command leave on a writer. The runner owns the simulation and the
//! scripted policies for any baseline seats; external seats inject
//! dispatches through `send` commands. All command handling is pure
//! in-memory work, so tests drive [`MatchRunner::handle`] directly and
//! only the outer loop touches IO.

use std::io::{self, BufRead, Write};

use tracing::{debug, info, warn};

use conquest_core::action::Action;
use conquest_core::faction::FactionId;
use conquest_core::simulation::ConquestSim;

use crate::policy::{drive_tick, roster, BaselinePolicy};
use crate::protocol::{
    Command, DetachmentRow, MatchResult, MatchStatus, Response, StrongholdRow,
};
use crate::scenario::{Scenario, ScenarioError};

/// Upper bound on a single `tick` command, so a typo cannot wedge the
/// session for hours.
pub const MAX_TICKS_PER_COMMAND: u32 = 100_000;

/// Configuration for a runner session.
#[derive(Debug, Clone, Default)]
pub struct RunnerConfig {
    /// The scenario to play.
    pub scenario: Scenario,
    /// Emit a full state response after every tick command.
    pub auto_state: bool,
}

/// Owns one match and answers protocol commands against it.
pub struct MatchRunner {
    sim: ConquestSim,
    scenario: Scenario,
    policies: Vec<(FactionId, BaselinePolicy)>,
    auto_state: bool,
    finished: bool,
}

impl MatchRunner {
    /// Build a runner for the configured scenario.
    ///
    /// # Errors
    ///
    /// Returns an error if the scenario fails validation.
    pub fn new(config: RunnerConfig) -> Result<Self, ScenarioError> {
        let sim = config.scenario.build_sim()?;
        let policies = roster(&config.scenario.seats, config.scenario.seed);
        info!(
            scenario = %config.scenario.name,
            factions = sim.total_factions(),
            strongholds = sim.strongholds().len(),
            "match ready"
        );
        Ok(Self {
            sim,
            scenario: config.scenario,
            policies,
            auto_state: config.auto_state,
            finished: false,
        })
    }

    /// The simulation being driven.
    #[must_use]
    pub const fn sim(&self) -> &ConquestSim {
        &self.sim
    }

    /// Whether the match has been decided or drawn.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// Apply one command and return the responses it produces.
    pub fn handle(&mut self, cmd: Command) -> Vec<Response> {
        debug!(cmd = cmd.name(), "command");
        match cmd {
            Command::Tick { count } => self.handle_tick(count),
            Command::Query => vec![self.state_response()],
            Command::Send {
                faction,
                source,
                target,
                percentage,
                seed,
            } => self.handle_send(faction, source, target, percentage, seed),
            Command::Hash => vec![Response::StateHash {
                tick: self.sim.get_tick(),
                hash: self.sim.state_hash(),
            }],
            Command::LoadScenario { path } => match Scenario::load(&path) {
                Ok(scenario) => match self.reset(scenario) {
                    Ok(()) => vec![Response::ack("load_scenario")],
                    Err(err) => vec![Response::error(err.to_string(), Some("load_scenario"))],
                },
                Err(err) => vec![Response::error(err.to_string(), Some("load_scenario"))],
            },
            Command::Quit => vec![Response::Bye],
        }
    }

    fn handle_tick(&mut self, count: u32) -> Vec<Response> {
        if count > MAX_TICKS_PER_COMMAND {
            return vec![Response::error(
                format!("tick count {count} exceeds limit {MAX_TICKS_PER_COMMAND}"),
                Some("tick"),
            )];
        }
        if self.finished {
            return vec![Response::error("match is over", Some("tick"))];
        }
        let mut game_over = None;
        for _ in 0..count {
            game_over = self.step();
            if game_over.is_some() {
                break;
            }
        }
        let mut responses = vec![Response::ack("tick")];
        if self.auto_state {
            responses.push(self.state_response());
        }
        if let Some(over) = game_over {
            responses.push(over);
        }
        responses
    }

    fn handle_send(
        &mut self,
        faction: u8,
        source: usize,
        target: usize,
        percentage: u8,
        seed: u64,
    ) -> Vec<Response> {
        if self.finished {
            return vec![Response::error("match is over", Some("send"))];
        }
        if faction >= self.sim.total_factions() {
            return vec![Response::error(
                format!("no faction {faction} in this match"),
                Some("send"),
            )];
        }
        let action = Action::SendUnits {
            source,
            target,
            percentage,
            seed,
        };
        match self.sim.apply_action(FactionId(faction), &action) {
            Ok(_) => vec![Response::ack("send")],
            Err(err) => vec![Response::error(err.to_string(), Some("send"))],
        }
    }

    /// Advance one tick: baseline seats decide, then the world steps.
    /// Returns the game-over response the first time the match ends.
    fn step(&mut self) -> Option<Response> {
        let events = drive_tick(&mut self.sim, &mut self.policies);

        if let Some(winner) = events.winner {
            self.finished = true;
            info!(%winner, tick = self.sim.get_tick(), "match decided");
            return Some(Response::GameOver {
                result: MatchResult::Decided,
                winner: Some(winner.0),
                ticks: self.sim.get_tick(),
            });
        }
        if let Some(limit) = self.scenario.tick_limit {
            if self.sim.get_tick() >= limit {
                self.finished = true;
                info!(tick = self.sim.get_tick(), "tick limit reached, draw");
                return Some(Response::GameOver {
                    result: MatchResult::Draw,
                    winner: None,
                    ticks: self.sim.get_tick(),
                });
            }
        }
        None
    }

    fn reset(&mut self, scenario: Scenario) -> Result<(), ScenarioError> {
        self.sim = scenario.build_sim()?;
        self.policies = roster(&scenario.seats, scenario.seed);
        self.scenario = scenario;
        self.finished = false;
        info!(scenario = %self.scenario.name, "scenario loaded");
        Ok(())
    }

    fn state_response(&self) -> Response {
        let coordinator = self.sim.coordinator();
        let strongholds = self
            .sim
            .strongholds()
            .iter()
            .enumerate()
            .map(|(index, s)| StrongholdRow {
                index,
                x: s.position().x.to_num::<f64>(),
                y: s.position().y.to_num::<f64>(),
                owner: s.owner().faction().map(|f| f.0),
                garrison: s.garrison(),
                tier: s.tier().into(),
                besieged: coordinator.is_besieged(index),
            })
            .collect();

        // Sorted so identical states always serialize identically.
        let store = self.sim.detachments();
        let detachments = store
            .sorted_ids()
            .into_iter()
            .filter_map(|id| store.get(id))
            .map(|d| DetachmentRow {
                id: d.id().0,
                faction: d.faction().0,
                units: d.units(),
                x: d.position().x.to_num::<f64>(),
                y: d.position().y.to_num::<f64>(),
                source: d.source(),
                target: d.target(),
                phase: d.phase().into(),
            })
            .collect();

        let winner = self.sim.winner();
        let status = if winner.is_some() {
            MatchStatus::Decided
        } else if self.finished {
            MatchStatus::Draw
        } else {
            MatchStatus::InProgress
        };
        Response::State {
            tick: self.sim.get_tick(),
            status,
            winner: winner.map(|f| f.0),
            strongholds,
            detachments,
            hash: self.sim.state_hash(),
        }
    }

    /// Drive the session: read commands line by line, write responses.
    ///
    /// Unparseable lines get an error response and the session carries
    /// on; a `quit` command ends it.
    ///
    /// # Errors
    ///
    /// Returns an error only when the reader or writer fails.
    pub fn run<R: BufRead, W: Write>(mut self, reader: R, writer: &mut W) -> io::Result<()> {
        writer.write_all(Response::ready(self.sim.get_tick()).to_json_line().as_bytes())?;
        writer.flush()?;

        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let cmd = match Command::from_json(line) {
                Ok(cmd) => cmd,
                Err(err) => {
                    warn!(%err, "unparseable command");
                    writer.write_all(
                        Response::error(format!("parse error: {err}"), None)
                            .to_json_line()
                            .as_bytes(),
                    )?;
                    writer.flush()?;
                    continue;
                }
            };
            let quitting = matches!(cmd, Command::Quit);
            for response in self.handle(cmd) {
                writer.write_all(response.to_json_line().as_bytes())?;
            }
            writer.flush()?;
            if quitting {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{Controller, Difficulty};
    use std::io::Cursor;

    /// Citadel assault with both seats external, so nothing moves unless
    /// a test says so.
    fn quiet_scenario() -> Scenario {
        let mut scenario = Scenario::citadel_assault();
        for seat in &mut scenario.seats {
            seat.controller = Controller::External;
        }
        scenario
    }

    fn quiet_runner() -> MatchRunner {
        MatchRunner::new(RunnerConfig {
            scenario: quiet_scenario(),
            auto_state: false,
        })
        .unwrap()
    }

    #[test]
    fn test_tick_advances_simulation() {
        let mut runner = quiet_runner();
        let responses = runner.handle(Command::Tick { count: 5 });
        assert_eq!(responses, vec![Response::ack("tick")]);
        assert_eq!(runner.sim().get_tick(), 5);
    }

    #[test]
    fn test_oversized_tick_rejected() {
        let mut runner = quiet_runner();
        let responses = runner.handle(Command::Tick {
            count: MAX_TICKS_PER_COMMAND + 1,
        });
        assert!(matches!(responses[0], Response::Error { .. }));
        assert_eq!(runner.sim().get_tick(), 0);
    }

    #[test]
    fn test_send_spawns_detachment() {
        let mut runner = quiet_runner();
        let responses = runner.handle(Command::Send {
            faction: 0,
            source: 0,
            target: 2,
            percentage: 50,
            seed: 1,
        });
        assert_eq!(responses, vec![Response::ack("send")]);

        let state = runner.handle(Command::Query).remove(0);
        let Response::State { detachments, .. } = state else {
            panic!("query must answer with state");
        };
        assert_eq!(detachments.len(), 1);
        assert_eq!(detachments[0].faction, 0);
        assert_eq!(detachments[0].target, 2);
    }

    #[test]
    fn test_send_validation_failures_reported() {
        let mut runner = quiet_runner();

        let same = runner.handle(Command::Send {
            faction: 0,
            source: 0,
            target: 0,
            percentage: 50,
            seed: 0,
        });
        let Response::Error { cmd, .. } = &same[0] else {
            panic!("expected error for source == target");
        };
        assert_eq!(cmd.as_deref(), Some("send"));

        let unseated = runner.handle(Command::Send {
            faction: 9,
            source: 0,
            target: 1,
            percentage: 50,
            seed: 0,
        });
        assert!(matches!(unseated[0], Response::Error { .. }));
    }

    #[test]
    fn test_hash_stable_without_ticks() {
        let mut runner = quiet_runner();
        let a = runner.handle(Command::Hash).remove(0);
        let b = runner.handle(Command::Hash).remove(0);
        assert_eq!(a, b);
    }

    #[test]
    fn test_draw_at_tick_limit() {
        let mut scenario = quiet_scenario();
        scenario.tick_limit = Some(3);
        let mut runner = MatchRunner::new(RunnerConfig {
            scenario,
            auto_state: false,
        })
        .unwrap();

        let responses = runner.handle(Command::Tick { count: 10 });
        assert_eq!(responses[0], Response::ack("tick"));
        assert_eq!(
            responses[1],
            Response::GameOver {
                result: MatchResult::Draw,
                winner: None,
                ticks: 3,
            }
        );
        assert!(runner.is_finished());

        let after = runner.handle(Command::Tick { count: 1 });
        assert!(matches!(after[0], Response::Error { .. }));
    }

    #[test]
    fn test_auto_state_follows_tick() {
        let mut runner = MatchRunner::new(RunnerConfig {
            scenario: quiet_scenario(),
            auto_state: true,
        })
        .unwrap();
        let responses = runner.handle(Command::Tick { count: 1 });
        assert_eq!(responses.len(), 2);
        assert!(matches!(responses[1], Response::State { tick: 1, .. }));
    }

    #[test]
    fn test_baseline_seats_act_on_their_own() {
        let mut scripted = Scenario::citadel_assault();
        for seat in &mut scripted.seats {
            seat.controller = Controller::Baseline(Difficulty::Hard);
        }
        let mut driven = MatchRunner::new(RunnerConfig {
            scenario: scripted,
            auto_state: false,
        })
        .unwrap();

        let mut idle_scenario = Scenario::citadel_assault();
        for seat in &mut idle_scenario.seats {
            seat.controller = Controller::Idle;
        }
        let mut idle = MatchRunner::new(RunnerConfig {
            scenario: idle_scenario,
            auto_state: false,
        })
        .unwrap();

        driven.handle(Command::Tick { count: 2000 });
        idle.handle(Command::Tick { count: 2000 });

        // Production runs in both, so any divergence is policy activity.
        assert_ne!(driven.sim().state_hash(), idle.sim().state_hash());
    }

    #[test]
    fn test_load_scenario_replaces_match() {
        let mut runner = quiet_runner();
        runner.handle(Command::Tick { count: 10 });

        let ron = r#"
            Scenario(
                name: "Duel",
                description: "two strongholds only",
                board: Placed([
                    Placement(x: 100, y: 100, owner: Some(0), garrison: 10),
                    Placement(x: 400, y: 100, owner: Some(1), garrison: 10),
                ]),
                seats: [
                    Seat(faction: 0, controller: External),
                    Seat(faction: 1, controller: External),
                ],
            )
        "#;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(ron.as_bytes()).unwrap();

        let path = file.path().to_string_lossy().to_string();
        let responses = runner.handle(Command::LoadScenario { path });
        assert_eq!(responses, vec![Response::ack("load_scenario")]);
        assert_eq!(runner.sim().get_tick(), 0);
        assert_eq!(runner.sim().strongholds().len(), 2);
    }

    #[test]
    fn test_load_scenario_missing_file_reported() {
        let mut runner = quiet_runner();
        let responses = runner.handle(Command::LoadScenario {
            path: "nowhere/missing.ron".to_string(),
        });
        let Response::Error { cmd, .. } = &responses[0] else {
            panic!("expected error for missing file");
        };
        assert_eq!(cmd.as_deref(), Some("load_scenario"));
    }

    #[test]
    fn test_run_loop_end_to_end() {
        let input = concat!(
            "{\"cmd\":\"query\"}\n",
            "\n",
            "not json\n",
            "{\"cmd\":\"tick\",\"count\":3}\n",
            "{\"cmd\":\"hash\"}\n",
            "{\"cmd\":\"quit\"}\n",
        );
        let mut output = Vec::new();
        let runner = quiet_runner();
        runner.run(Cursor::new(input), &mut output).unwrap();

        let text = String::from_utf8(output).unwrap();
        let responses: Vec<Response> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert!(matches!(responses[0], Response::Ready { tick: 0, .. }));
        assert!(matches!(responses[1], Response::State { .. }));
        assert!(matches!(responses[2], Response::Error { .. }));
        assert_eq!(responses[3], Response::ack("tick"));
        assert!(matches!(responses[4], Response::StateHash { tick: 3, .. }));
        assert_eq!(responses.last(), Some(&Response::Bye));
    }

    #[test]
    fn test_state_reports_besieged_ground() {
        // An attack on a garrisoned hostile stronghold opens a siege once
        // the detachment arrives; before anyone marches nothing is besieged.
        let mut runner = quiet_runner();
        let state = runner.handle(Command::Query).remove(0);
        let Response::State { strongholds, .. } = state else {
            panic!("query must answer with state");
        };
        assert!(strongholds.iter().all(|s| !s.besieged));
        assert_eq!(strongholds[0].owner, Some(0));
        assert_eq!(strongholds[2].owner, None);
    }

    #[test]
    fn test_seat_roster_mirrors_scenario() {
        let runner = MatchRunner::new(RunnerConfig {
            scenario: Scenario::three_way(),
            auto_state: false,
        })
        .unwrap();
        assert_eq!(runner.policies.len(), 3);
        assert_eq!(
            runner.policies[0].0,
            FactionId(Scenario::three_way().seats[0].faction)
        );
    }
}
