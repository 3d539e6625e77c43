//! Screen layout registry
//!
//! Tap coordinates, OCR regions and template names for the driven
//! application. Defaults are calibrated for a 1080x2400 portrait device;
//! a different screen only needs a different layout file.

use serde::{Deserialize, Serialize};

/// A device pixel coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// A crop box given as left/top/right/bottom edges (right and bottom exclusive)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl Region {
    pub const fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Clamp the box to a `width` x `height` frame.
    ///
    /// Returns `(x, y, w, h)`, or `None` when nothing of the box is left.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let right = self.right.min(width);
        let bottom = self.bottom.min(height);
        if self.left >= right || self.top >= bottom {
            return None;
        }
        Some((self.left, self.top, right - self.left, bottom - self.top))
    }
}

/// Names of the reference images, resolved as `<assets>/<name>.png`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Templates {
    pub in_battle: String,
    pub on_menu: String,
    pub close_battle: String,
    pub stuck_dialog: String,
    /// Start control when the battle is available right away
    pub start_ready: String,
    /// Start control shown while a cooldown runs
    pub start_cooldown: String,
}

impl Default for Templates {
    fn default() -> Self {
        Self {
            in_battle: "is-in-battle".to_string(),
            on_menu: "market-menu-button".to_string(),
            close_battle: "close-battle-button".to_string(),
            stuck_dialog: "are-you-stuck-button".to_string(),
            start_ready: "start-battle-brown-button".to_string(),
            start_cooldown: "start-battle-button".to_string(),
        }
    }
}

impl Templates {
    /// Every template the control loop looks for
    pub fn names(&self) -> [&str; 6] {
        [
            self.in_battle.as_str(),
            self.on_menu.as_str(),
            self.close_battle.as_str(),
            self.stuck_dialog.as_str(),
            self.start_ready.as_str(),
            self.start_cooldown.as_str(),
        ]
    }
}

/// Screen layout of the driven application
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Layout {
    pub templates: Templates,
    /// Create-unit buttons for troops 1, 2 and 3
    pub troops: [Point; 3],
    /// Skill buttons, tapped in order once per battle
    pub skills: Vec<Point>,
    pub battle_menu: Point,
    pub upgrade_menu: Point,
    pub evolution_tab: Point,
    pub evolve_button: Point,
    pub upgrade_tab: Point,
    pub upgrade_production: Point,
    /// Neutral spot used to dismiss interstitials and upsell dialogs
    pub dismiss: Point,
    /// Tapped after the application has been relaunched
    pub enter_event: Point,
    pub gold_region: Region,
    pub battle_gold_region: Region,
    pub production_cost_region: Region,
    pub evolve_cost_region: Region,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            templates: Templates::default(),
            troops: [
                Point::new(540, 2024),
                Point::new(680, 2024),
                Point::new(800, 2024),
            ],
            skills: vec![Point::new(750, 1750), Point::new(950, 1750)],
            battle_menu: Point::new(543, 2178),
            upgrade_menu: Point::new(330, 2178),
            evolution_tab: Point::new(663, 1900),
            evolve_button: Point::new(550, 1425),
            upgrade_tab: Point::new(400, 1900),
            upgrade_production: Point::new(852, 1307),
            dismiss: Point::new(500, 1900),
            enter_event: Point::new(500, 1500),
            gold_region: Region::new(80, 7, 300, 70),
            battle_gold_region: Region::new(360, 1024, 800, 1125),
            production_cost_region: Region::new(800, 1245, 980, 1330),
            evolve_cost_region: Region::new(380, 1380, 720, 1470),
        }
    }
}

/// Troop used when the configured index is out of range
pub const DEFAULT_TROOP: u8 = 2;

impl Layout {
    /// Create-unit button for a troop index, falling back to the default troop
    pub fn troop_point(&self, troop: u8) -> Point {
        match troop {
            1..=3 => self.troops[usize::from(troop) - 1],
            _ => {
                log::warn!(
                    "Invalid troop number: {}. Creating default unit {}",
                    troop,
                    DEFAULT_TROOP
                );
                self.troops[usize::from(DEFAULT_TROOP) - 1]
            }
        }
    }
}
