//! Upgrade-versus-save spending decisions
//!
//! Each menu visit the planner decides whether to look at the upgrade menu
//! at all, and once there whether to buy production upgrades now or keep the
//! gold for the much larger evolution purchase.

use std::time::Duration;

use serde::Serialize;

use crate::android::DeviceError;
use crate::config::{Layout, Point, Region, Settings, TimingSettings};

/// Gold readings and the saving decision, kept for the process lifetime
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EconomyState {
    /// Gold currently held
    pub gold_held: f64,
    /// Gold won in the last battle
    pub last_battle_gold: f64,
    /// Gold won across all battles since start
    pub total_battle_gold: f64,
    /// Cost of the next production upgrade
    pub next_upgrade_cost: f64,
    /// Cost of the next evolution
    pub evolve_threshold: f64,
    /// Whether gold is being kept for the evolution
    pub saving_to_evolve: bool,
}

impl EconomyState {
    /// Record the gold won by a battle
    pub fn record_battle_gold(&mut self, gold: f64) {
        self.last_battle_gold = gold;
        self.total_battle_gold += gold;
    }
}

/// Screen interactions the planner needs
pub trait EconomyActions {
    fn tap(&mut self, point: Point) -> Result<(), DeviceError>;

    fn long_press(&mut self, point: Point, duration_ms: u32) -> Result<(), DeviceError>;

    /// Read an amount from a freshly captured screen. 0.0 when unreadable.
    fn read_fresh(&mut self, region: Region) -> f64;

    fn pause(&mut self, duration: Duration);
}

/// What a planner visit ended with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanOutcome {
    /// The upgrade menu was not opened
    Skipped,
    /// The menu was checked but gold is kept for the evolution
    Saved,
    /// A production upgrade was bought
    Spent,
}

/// Decides and carries out upgrade spending
#[derive(Debug, Clone)]
pub struct EconomyPlanner {
    /// Evolve cost to battle income ratio above which upgrades are bought
    ratio: f64,
    layout: Layout,
    timings: TimingSettings,
}

impl EconomyPlanner {
    pub fn new(ratio: f64, layout: Layout, timings: TimingSettings) -> Self {
        Self {
            ratio,
            layout,
            timings,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.economy.evolve_income_ratio,
            settings.layout.clone(),
            settings.timings.clone(),
        )
    }

    /// Whether the upgrade menu is worth a visit
    pub fn should_commit(state: &EconomyState, upgrade_enabled: bool) -> bool {
        upgrade_enabled
            && (state.gold_held >= state.next_upgrade_cost
                || state.gold_held == 0.0
                || state.next_upgrade_cost == 0.0
                || state.gold_held >= state.evolve_threshold)
    }

    /// Whether to buy production upgrades instead of saving.
    ///
    /// Upgrades are bought while the evolution is many battles away, or when
    /// the upgrade cost could not be read.
    pub fn should_spend(&self, state: &EconomyState) -> bool {
        let far_from_evolve = state.evolve_threshold != 0.0
            && state.last_battle_gold != 0.0
            && state.evolve_threshold / state.last_battle_gold > self.ratio;

        far_from_evolve || state.next_upgrade_cost == 0.0
    }

    /// Run one menu visit
    pub fn run(
        &self,
        state: &mut EconomyState,
        upgrade_enabled: bool,
        actions: &mut impl EconomyActions,
    ) -> Result<PlanOutcome, DeviceError> {
        if !Self::should_commit(state, upgrade_enabled) {
            state.saving_to_evolve = true;
            log::debug!(
                "Skipping upgrades: held {} / cost {} / evolve {}",
                state.gold_held,
                state.next_upgrade_cost,
                state.evolve_threshold
            );
            return Ok(PlanOutcome::Skipped);
        }

        let layout = &self.layout;
        let menu_open = Duration::from_millis(self.timings.menu_open_ms);
        let tab_switch = Duration::from_millis(self.timings.tab_switch_ms);

        actions.tap(layout.upgrade_menu)?;
        actions.pause(menu_open);
        actions.tap(layout.evolution_tab)?;
        actions.pause(tab_switch);

        state.evolve_threshold = actions.read_fresh(layout.evolve_cost_region);
        log::info!("Evolve threshold: {}", state.evolve_threshold);

        actions.tap(layout.evolve_button)?;
        actions.pause(menu_open);
        // Dismiss the purchase offer that may pop up after evolving
        actions.tap(layout.dismiss)?;

        actions.tap(layout.upgrade_tab)?;
        actions.pause(tab_switch);
        state.next_upgrade_cost = actions.read_fresh(layout.production_cost_region);

        if !self.should_spend(state) {
            state.saving_to_evolve = true;
            log::info!(
                "Saving for evolution: {} / {} per battle",
                state.evolve_threshold,
                state.last_battle_gold
            );
            return Ok(PlanOutcome::Saved);
        }

        log::info!("Upgrading production for {}", state.next_upgrade_cost);
        actions.long_press(layout.upgrade_production, self.timings.upgrade_hold_ms)?;
        state.saving_to_evolve = false;
        actions.tap(layout.dismiss)?;
        state.next_upgrade_cost = actions.read_fresh(layout.production_cost_region);

        Ok(PlanOutcome::Spent)
    }
}

impl Default for EconomyPlanner {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}
