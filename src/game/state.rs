//! Bot state representation
//!
//! Tracks the classified screen, the running battle and the counters
//! published to status sinks.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::ai::EconomyState;

/// Screen the application is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BotState {
    /// Main menu with the market button
    Menu,
    /// A battle is running
    Battle,
    /// Anything else: result screens, dialogs, loading
    Unclassified,
}

/// The battle currently being played
#[derive(Debug, Clone)]
pub struct BattleSession {
    started_at: Instant,
    skills_cast: bool,
    units_unlocked: bool,
}

impl BattleSession {
    /// A battle starting now. Unit creation stays locked until the skills
    /// are cast.
    pub fn start() -> Self {
        Self::started_at(Instant::now())
    }

    pub fn started_at(started_at: Instant) -> Self {
        Self {
            started_at,
            skills_cast: false,
            units_unlocked: false,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn skills_cast(&self) -> bool {
        self.skills_cast
    }

    pub fn units_unlocked(&self) -> bool {
        self.units_unlocked
    }

    /// Record the skill sequence as cast, which unlocks unit creation
    pub fn mark_skills_cast(&mut self) {
        self.skills_cast = true;
        self.units_unlocked = true;
    }
}

/// State owned by the control loop
#[derive(Debug, Clone)]
pub struct ControlState {
    /// Current classified state
    pub state: BotState,
    /// Previous state (for transition detection)
    pub previous: BotState,
    /// Running battle, if any
    pub session: Option<BattleSession>,
    /// Ticks spent in the current state
    pub ticks_in_state: u32,
    /// Decision ticks run
    pub ticks: u64,
    /// Application restarts performed
    pub restarts: u32,
    /// Battles started
    pub battles: u32,
}

impl Default for ControlState {
    fn default() -> Self {
        Self {
            state: BotState::Unclassified,
            previous: BotState::Unclassified,
            session: None,
            ticks_in_state: 0,
            ticks: 0,
            restarts: 0,
            battles: 0,
        }
    }
}

impl ControlState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a classification
    pub fn update(&mut self, state: BotState) {
        if state != self.state {
            log::debug!("State {:?} -> {:?}", self.state, state);
            self.previous = self.state;
            self.state = state;
            self.ticks_in_state = 0;
        } else {
            self.ticks_in_state = self.ticks_in_state.saturating_add(1);
        }
    }

    /// The battle was confirmed after tapping start
    pub fn begin_battle(&mut self) {
        self.session = Some(BattleSession::start());
        self.battles += 1;
        self.update(BotState::Battle);
    }

    /// Session of the running battle, starting one now if the battle was
    /// entered without the menu flow
    pub fn session_mut(&mut self) -> &mut BattleSession {
        self.session.get_or_insert_with(BattleSession::start)
    }

    /// The battle result was closed
    pub fn end_battle(&mut self) {
        self.session = None;
        self.update(BotState::Menu);
    }

    /// The application was restarted
    pub fn reset_after_restart(&mut self) {
        self.session = None;
        self.restarts += 1;
        self.update(BotState::Unclassified);
    }
}

/// Read-only copy of the bot state for status sinks
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BotSnapshot {
    pub state: BotState,
    pub previous: BotState,
    /// Ticks spent in `state` since it was entered
    pub ticks_in_state: u32,
    pub economy: EconomyState,
    pub ticks: u64,
    pub restarts: u32,
    pub battles: u32,
    pub in_battle_for_ms: Option<u64>,
}

impl Default for BotSnapshot {
    fn default() -> Self {
        Self {
            state: BotState::Unclassified,
            previous: BotState::Unclassified,
            ticks_in_state: 0,
            economy: EconomyState::default(),
            ticks: 0,
            restarts: 0,
            battles: 0,
            in_battle_for_ms: None,
        }
    }
}

impl BotSnapshot {
    pub fn capture(control: &ControlState, economy: &EconomyState) -> Self {
        Self {
            state: control.state,
            previous: control.previous,
            ticks_in_state: control.ticks_in_state,
            economy: economy.clone(),
            ticks: control.ticks,
            restarts: control.restarts,
            battles: control.battles,
            in_battle_for_ms: control
                .session
                .as_ref()
                .map(|s| u64::try_from(s.elapsed().as_millis()).unwrap_or(u64::MAX)),
        }
    }
}

/// Latest published snapshot, shared with status sinks
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    latest: Arc<Mutex<BotSnapshot>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, snapshot: BotSnapshot) {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }

    pub fn latest(&self) -> BotSnapshot {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Latest snapshot as JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.latest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        let mut control = ControlState::new();

        control.update(BotState::Menu);
        assert_eq!(control.state, BotState::Menu);
        assert_eq!(control.previous, BotState::Unclassified);
        assert_eq!(control.ticks_in_state, 0);

        control.update(BotState::Menu);
        assert_eq!(control.ticks_in_state, 1);
    }

    #[test]
    fn test_battle_lifecycle() {
        let mut control = ControlState::new();
        control.update(BotState::Menu);

        control.begin_battle();
        assert_eq!(control.state, BotState::Battle);
        assert_eq!(control.battles, 1);
        let session = control.session.as_ref().unwrap();
        assert!(!session.units_unlocked());
        assert!(!session.skills_cast());

        control.session_mut().mark_skills_cast();
        assert!(control.session.as_ref().unwrap().units_unlocked());

        control.end_battle();
        assert!(control.session.is_none());
        assert_eq!(control.state, BotState::Menu);
    }

    #[test]
    fn test_battle_without_session_starts_one() {
        let mut control = ControlState::new();
        assert!(control.session.is_none());
        assert!(!control.session_mut().skills_cast());
        assert!(control.session.is_some());
    }

    #[test]
    fn test_restart_resets_battle() {
        let mut control = ControlState::new();
        control.begin_battle();
        control.reset_after_restart();

        assert!(control.session.is_none());
        assert_eq!(control.restarts, 1);
        assert_eq!(control.state, BotState::Unclassified);
    }

    #[test]
    fn test_status_board_serializes() {
        let board = StatusBoard::new();
        let mut control = ControlState::new();
        control.update(BotState::Menu);
        control.update(BotState::Battle);
        control.update(BotState::Battle);
        control.ticks = 4;

        let mut economy = EconomyState::default();
        economy.record_battle_gold(250.0);
        board.publish(BotSnapshot::capture(&control, &economy));

        let latest = board.latest();
        assert_eq!(latest.state, BotState::Battle);
        assert_eq!(latest.ticks, 4);
        assert_eq!(latest.previous, BotState::Menu);
        assert_eq!(latest.ticks_in_state, 1);

        let json = board.to_json().unwrap();
        assert!(json.contains("\"state\":\"Battle\""));
        assert!(json.contains("\"previous\":\"Menu\""));
        assert!(json.contains("\"total_battle_gold\":250.0"));
    }
}
