//! Operator console
//!
//! Single-key commands read from the terminal while the bot runs. Commands
//! only flip [`BotConfig`] flags; the control loop picks them up on its next
//! tick.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;

use crate::config::BotConfig;
use crate::game::StatusBoard;

/// Commands available from the console
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    TogglePause,
    ToggleUpgrade,
    Quit,
    SelectTroop(u8),
    PrintGold,
    ToggleDebug,
}

impl OperatorCommand {
    /// Map a key to a command
    pub fn from_key(key: char) -> Option<Self> {
        match key {
            'p' => Some(Self::TogglePause),
            'u' => Some(Self::ToggleUpgrade),
            'q' => Some(Self::Quit),
            '1'..='3' => key.to_digit(10).map(|d| Self::SelectTroop(d as u8)),
            's' => Some(Self::PrintGold),
            'd' => Some(Self::ToggleDebug),
            _ => None,
        }
    }

    fn from_event(key: &KeyEvent) -> Option<Self> {
        if key.kind != KeyEventKind::Press {
            return None;
        }
        match key.code {
            // Raw mode swallows the interrupt signal
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(Self::Quit),
            KeyCode::Char(ch) => Self::from_key(ch),
            _ => None,
        }
    }

    /// Apply the command to the runtime flags
    pub fn apply(self, config: &BotConfig, status: &StatusBoard) {
        match self {
            Self::TogglePause => {
                if config.toggle_pause() {
                    log::info!("Paused");
                } else {
                    log::info!("Resumed");
                }
            }
            Self::ToggleUpgrade => {
                if config.toggle_upgrade() {
                    log::info!("Upgrading production");
                } else {
                    log::info!("Not upgrading production");
                }
            }
            Self::Quit => {
                log::info!("Stopping bot...");
                config.stop();
            }
            Self::SelectTroop(troop) => {
                config.set_troop(troop);
                log::info!("Creating troop {}", troop);
            }
            Self::PrintGold => {
                let snapshot = status.latest();
                log::info!(
                    "Gold won so far: {} ({} battles)",
                    snapshot.economy.total_battle_gold,
                    snapshot.battles
                );
            }
            Self::ToggleDebug => {
                if config.log_pinned() {
                    log::info!("Log level is set by RUST_LOG, ignoring the debug toggle");
                    return;
                }
                let debug = config.toggle_debug();
                log::set_max_level(if debug {
                    log::LevelFilter::Debug
                } else {
                    log::LevelFilter::Info
                });
                log::info!("Verbose logging {}", if debug { "on" } else { "off" });
            }
        }
    }
}

/// Restores cooked mode when the console thread ends
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

/// Start the console thread. It reads keys until the bot stops.
pub fn spawn_console(config: Arc<BotConfig>, status: StatusBoard) -> io::Result<JoinHandle<()>> {
    let guard = RawModeGuard::enable()?;

    Ok(thread::spawn(move || {
        let _guard = guard;
        while config.is_running() {
            match event::poll(Duration::from_millis(100)) {
                Ok(true) => match event::read() {
                    Ok(Event::Key(key)) => {
                        if let Some(command) = OperatorCommand::from_event(&key) {
                            command.apply(&config, &status);
                        }
                    }
                    Ok(_) => {}
                    Err(e) => log::warn!("Failed to read key: {}", e),
                },
                Ok(false) => {}
                Err(e) => {
                    log::warn!("Console input unavailable: {}", e);
                    break;
                }
            }
        }
        log::debug!("Console stopped");
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_mapping() {
        assert_eq!(OperatorCommand::from_key('p'), Some(OperatorCommand::TogglePause));
        assert_eq!(OperatorCommand::from_key('u'), Some(OperatorCommand::ToggleUpgrade));
        assert_eq!(OperatorCommand::from_key('q'), Some(OperatorCommand::Quit));
        assert_eq!(OperatorCommand::from_key('3'), Some(OperatorCommand::SelectTroop(3)));
        assert_eq!(OperatorCommand::from_key('s'), Some(OperatorCommand::PrintGold));
        assert_eq!(OperatorCommand::from_key('4'), None);
        assert_eq!(OperatorCommand::from_key('x'), None);
    }

    #[test]
    fn test_ctrl_c_quits() {
        let key = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(OperatorCommand::from_event(&key), Some(OperatorCommand::Quit));

        let key = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::NONE);
        assert_eq!(OperatorCommand::from_event(&key), None);
    }

    #[test]
    fn test_commands_flip_flags() {
        let config = BotConfig::default();
        let status = StatusBoard::new();

        OperatorCommand::TogglePause.apply(&config, &status);
        assert!(config.is_paused());
        OperatorCommand::TogglePause.apply(&config, &status);
        assert!(!config.is_paused());

        OperatorCommand::ToggleUpgrade.apply(&config, &status);
        assert!(!config.upgrade_enabled());

        OperatorCommand::SelectTroop(1).apply(&config, &status);
        assert_eq!(config.troop(), 1);

        OperatorCommand::PrintGold.apply(&config, &status);
        assert!(config.is_running());

        OperatorCommand::Quit.apply(&config, &status);
        assert!(!config.is_running());
    }

    #[test]
    fn test_debug_toggle() {
        let config = BotConfig::default();
        OperatorCommand::ToggleDebug.apply(&config, &StatusBoard::new());
        assert!(config.debug());
        OperatorCommand::ToggleDebug.apply(&config, &StatusBoard::new());
        assert!(!config.debug());
    }

    #[test]
    fn test_debug_toggle_ignored_when_log_level_pinned() {
        let config = BotConfig::default();
        config.set_log_pinned(true);

        OperatorCommand::ToggleDebug.apply(&config, &StatusBoard::new());

        assert!(!config.debug());
    }
}
