//! Control state machine
//!
//! Each decision tick classifies the screen and runs the handler for the
//! Menu, Battle or Unclassified state. Tick failures are logged by [`run`]
//! and never stop the bot.
//!
//! [`run`]: Controller::run

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use image::GrayImage;

use super::state::{BotSnapshot, BotState, ControlState, StatusBoard};
use super::TickError;
use crate::ai::{EconomyActions, EconomyPlanner, EconomyState};
use crate::android::input::tap_sequence;
use crate::android::{ActionDispatcher, Device, DeviceError};
use crate::config::{BotConfig, Point, Region, Settings, StuckRecovery};
use crate::vision::{FrameSource, NumericReader, Ocr, StuckDetector, VisualMatcher};

/// Screen interactions for the economy planner
struct MenuActions<'a> {
    dispatcher: &'a ActionDispatcher,
    reader: &'a NumericReader,
}

impl EconomyActions for MenuActions<'_> {
    fn tap(&mut self, point: Point) -> Result<(), DeviceError> {
        self.dispatcher.tap(point)
    }

    fn long_press(&mut self, point: Point, duration_ms: u32) -> Result<(), DeviceError> {
        self.dispatcher.long_press(point, duration_ms)
    }

    fn read_fresh(&mut self, region: Region) -> f64 {
        self.reader.read(region, true)
    }

    fn pause(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Drives the application through its menu and battle screens
pub struct Controller {
    settings: Settings,
    config: Arc<BotConfig>,
    frames: FrameSource,
    matcher: VisualMatcher,
    reader: NumericReader,
    dispatcher: ActionDispatcher,
    stuck: StuckDetector,
    planner: EconomyPlanner,
    status: StatusBoard,
    control: ControlState,
    economy: EconomyState,
    session_started: Instant,
}

impl Controller {
    /// Create a controller for a device
    pub fn new(
        settings: Settings,
        config: Arc<BotConfig>,
        device: Arc<dyn Device>,
        frames: FrameSource,
        matcher: VisualMatcher,
        ocr: Arc<dyn Ocr>,
    ) -> Self {
        Self {
            stuck: StuckDetector::from_settings(&settings.stuck),
            planner: EconomyPlanner::from_settings(&settings),
            reader: NumericReader::new(frames.clone(), ocr),
            dispatcher: ActionDispatcher::new(device),
            status: StatusBoard::new(),
            control: ControlState::new(),
            economy: EconomyState::default(),
            session_started: Instant::now(),
            settings,
            config,
            frames,
            matcher,
        }
    }

    /// Handle to the published snapshots
    pub fn status(&self) -> StatusBoard {
        self.status.clone()
    }

    pub fn state(&self) -> BotState {
        self.control.state
    }

    pub fn control(&self) -> &ControlState {
        &self.control
    }

    pub fn economy(&self) -> &EconomyState {
        &self.economy
    }

    /// Run until the bot is stopped
    pub fn run(&mut self) {
        log::info!("Bot started");
        if let Err(e) = self.classify_startup() {
            log::warn!("Initial classification failed: {}", e);
        }

        let pause_poll = Duration::from_millis(self.settings.timings.pause_poll_ms);
        let mut was_paused = false;
        while self.config.is_running() {
            if self.config.is_paused() {
                was_paused = true;
                thread::sleep(pause_poll);
                continue;
            }

            // Paused frames must not count towards stuck detection
            if was_paused {
                was_paused = false;
                self.frames.clear_history();
                log::debug!("Resumed, frame history cleared");
            }

            match self.tick() {
                Ok(()) => {}
                Err(e @ TickError::ActionTimeout { .. }) => log::warn!("{}", e),
                Err(e) => log::error!("Tick failed: {}", e),
            }
        }

        log::info!("Bot stopped");
    }

    /// Run one decision tick and publish the resulting snapshot
    pub fn tick(&mut self) -> Result<(), TickError> {
        self.control.ticks += 1;
        let result = self.step();
        self.publish();
        result
    }

    fn step(&mut self) -> Result<(), TickError> {
        if self.session_expired() {
            log::info!("Session time is up, restarting the application");
            return self.restart_application();
        }

        if self.stuck.check(&self.frames.history()) {
            return self.recover_from_stuck();
        }

        let state = self.classify()?;
        self.control.update(state);

        match state {
            BotState::Battle => self.handle_battle(),
            BotState::Menu => self.handle_menu(),
            BotState::Unclassified => self.handle_unclassified(),
        }
    }

    fn publish(&self) {
        self.status
            .publish(BotSnapshot::capture(&self.control, &self.economy));
    }

    fn session_expired(&self) -> bool {
        self.settings
            .session_restart_secs
            .is_some_and(|secs| self.session_started.elapsed() >= Duration::from_secs(secs))
    }

    /// Classify the current screen. Battle wins when both templates match.
    pub fn classify(&self) -> Result<BotState, TickError> {
        let frame = self.frames.current()?;
        Ok(self.classify_image(frame.image()))
    }

    fn classify_image(&self, image: &GrayImage) -> BotState {
        let templates = &self.settings.layout.templates;
        if self.matcher.find(image, &templates.in_battle).is_some() {
            BotState::Battle
        } else if self.matcher.find(image, &templates.on_menu).is_some() {
            BotState::Menu
        } else {
            BotState::Unclassified
        }
    }

    fn classify_startup(&mut self) -> Result<(), TickError> {
        let state = self.classify()?;
        self.control.update(state);
        log::info!("Starting in {:?}", state);
        Ok(())
    }

    /// Locate a template on the current screen
    fn find_now(&self, name: &str) -> Result<Option<Point>, TickError> {
        let frame = self.frames.current()?;
        Ok(self.matcher.find(frame.image(), name).map(|m| m.point()))
    }

    /// Locate a template on a screen captured now
    fn find_fresh(&self, name: &str) -> Result<Option<Point>, TickError> {
        let frame = self.frames.poll()?;
        Ok(self.matcher.find(frame.image(), name).map(|m| m.point()))
    }

    fn handle_battle(&mut self) -> Result<(), TickError> {
        let skill_delay = Duration::from_millis(self.settings.timings.skill_delay_ms);
        let skill_interval = self.settings.timings.skill_tap_interval_ms;
        let layout = &self.settings.layout;
        let session = self.control.session_mut();

        if session.units_unlocked() {
            self.dispatcher
                .tap(layout.troop_point(self.config.troop()))?;
        }

        if !session.skills_cast() && session.elapsed() >= skill_delay {
            log::info!("Casting skills");
            self.dispatcher
                .dispatch_all(&tap_sequence(&layout.skills, skill_interval))?;
            session.mark_skills_cast();
        }

        if let Some(close) = self.find_now(&layout.templates.close_battle)? {
            self.exit_battle(close)?;
        }

        Ok(())
    }

    fn exit_battle(&mut self, close: Point) -> Result<(), TickError> {
        let gold = self
            .reader
            .read(self.settings.layout.battle_gold_region, true);
        self.economy.record_battle_gold(gold);
        log::info!(
            "Battle finished: {} gold ({} total)",
            gold,
            self.economy.total_battle_gold
        );

        self.dispatcher.tap(close)?;
        thread::sleep(Duration::from_millis(self.settings.timings.settle_ms));
        self.dismiss_stuck_dialog()?;

        self.control.end_battle();
        Ok(())
    }

    fn dismiss_stuck_dialog(&self) -> Result<(), TickError> {
        if let Some(button) = self.find_fresh(&self.settings.layout.templates.stuck_dialog)? {
            log::info!("Dismissing stuck dialog");
            self.dispatcher.tap(button)?;
        }
        Ok(())
    }

    fn handle_menu(&mut self) -> Result<(), TickError> {
        self.dismiss_stuck_dialog()?;

        self.economy.gold_held = self.reader.read(self.settings.layout.gold_region, false);
        let mut actions = MenuActions {
            dispatcher: &self.dispatcher,
            reader: &self.reader,
        };
        self.planner
            .run(&mut self.economy, self.config.upgrade_enabled(), &mut actions)?;

        let start = self.find_start_control()?;
        self.start_battle(start)
    }

    /// Open the battle menu until a start control shows up
    fn find_start_control(&self) -> Result<Point, TickError> {
        let timings = &self.settings.timings;
        let layout = &self.settings.layout;
        let timeout = Duration::from_millis(timings.entry_timeout_ms);
        let retry = Duration::from_millis(timings.capture_period_ms);
        let started = Instant::now();

        loop {
            self.dispatcher.tap(layout.battle_menu)?;

            let frame = self.frames.poll()?;
            let found = self
                .matcher
                .find(frame.image(), &layout.templates.start_ready)
                .or_else(|| {
                    self.matcher
                        .find(frame.image(), &layout.templates.start_cooldown)
                });
            if let Some(button) = found {
                return Ok(button.point());
            }

            if started.elapsed() >= timeout {
                return Err(TickError::ActionTimeout {
                    what: "start battle button",
                    waited_ms: timings.entry_timeout_ms,
                });
            }
            thread::sleep(retry);
        }
    }

    /// Tap the start control until the battle screen is confirmed
    fn start_battle(&mut self, button: Point) -> Result<(), TickError> {
        let timings = &self.settings.timings;
        let timeout = Duration::from_millis(timings.start_timeout_ms);
        let interval = Duration::from_millis(timings.start_tap_interval_ms);
        let started = Instant::now();

        loop {
            self.dispatcher.tap(button)?;
            thread::sleep(interval);

            let frame = self.frames.poll()?;
            if self.classify_image(frame.image()) == BotState::Battle {
                self.control.begin_battle();
                log::info!("Battle {} started", self.control.battles);
                return Ok(());
            }

            if started.elapsed() >= timeout {
                return Err(TickError::ActionTimeout {
                    what: "battle to start",
                    waited_ms: timings.start_timeout_ms,
                });
            }
        }
    }

    fn handle_unclassified(&mut self) -> Result<(), TickError> {
        self.dispatcher.tap(self.settings.layout.dismiss)?;

        if let Some(close) = self.find_fresh(&self.settings.layout.templates.close_battle)? {
            self.exit_battle(close)?;
        }
        Ok(())
    }

    fn recover_from_stuck(&mut self) -> Result<(), TickError> {
        match self.settings.recovery {
            StuckRecovery::Restart => {
                log::warn!("Screen is stuck, restarting the application");
                self.restart_application()
            }
            StuckRecovery::ClearHistory => {
                log::warn!("Screen is stuck, clearing frame history");
                self.frames.clear_history();
                Ok(())
            }
        }
    }

    /// Force-stop and relaunch the application, then pick up from whatever
    /// screen it opens on
    pub fn restart_application(&mut self) -> Result<(), TickError> {
        let timings = &self.settings.timings;
        let package = &self.settings.package_name;

        self.dispatcher.force_stop(package)?;
        thread::sleep(Duration::from_millis(timings.stop_wait_ms));
        self.dispatcher.launch(package)?;
        thread::sleep(Duration::from_millis(timings.launch_wait_ms));
        self.dispatcher.tap(self.settings.layout.enter_event)?;

        self.frames.clear_history();
        self.control.reset_after_restart();
        self.session_started = Instant::now();
        log::info!("Application restarted ({} restarts)", self.control.restarts);

        self.classify_startup()
    }
}
