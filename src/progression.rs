//! Maps completion counts and lock state onto display tiers, badges, and
//! formatted counters.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Locked,
    Gray,
    Green,
    Blue,
    Purple,
    Orange,
}

impl Tier {
    pub const ALL: [Tier; 6] = [
        Tier::Locked,
        Tier::Gray,
        Tier::Green,
        Tier::Blue,
        Tier::Purple,
        Tier::Orange,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Locked => "locked",
            Tier::Gray => "gray",
            Tier::Green => "green",
            Tier::Blue => "blue",
            Tier::Purple => "purple",
            Tier::Orange => "orange",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Tier::Locked => "Locked",
            Tier::Gray => "Not started",
            Tier::Green => "First run",
            Tier::Blue => "Practicing",
            Tier::Purple => "Habit",
            Tier::Orange => "Mastered",
        }
    }

    /// Class name handed to presentation components.
    pub fn css_class(&self) -> &'static str {
        match self {
            Tier::Locked => "tier-locked",
            Tier::Gray => "tier-gray",
            Tier::Green => "tier-green",
            Tier::Blue => "tier-blue",
            Tier::Purple => "tier-purple",
            Tier::Orange => "tier-orange",
        }
    }
}

pub fn classify(completion_count: u32, is_locked: bool) -> Tier {
    if is_locked {
        return Tier::Locked;
    }
    match completion_count {
        0 => Tier::Gray,
        1 => Tier::Green,
        2..=10 => Tier::Blue,
        11..=50 => Tier::Purple,
        _ => Tier::Orange,
    }
}

pub fn format_count(count: u32) -> String {
    match count {
        0 => String::new(),
        1..=50 => format!("{}x", count),
        _ => "50+".to_string(),
    }
}

/// Checklist completion as a whole percentage; an empty checklist is 0%.
pub fn progress_percentage(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (completed as f64 / total as f64 * 100.0).round();
    pct.clamp(0.0, 100.0) as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BadgeColor {
    Gray,
    Yellow,
    Blue,
    Green,
}

impl BadgeColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            BadgeColor::Gray => "gray",
            BadgeColor::Yellow => "yellow",
            BadgeColor::Blue => "blue",
            BadgeColor::Green => "green",
        }
    }
}

pub fn badge_color_for_percentage(pct: u8) -> BadgeColor {
    match pct {
        0 => BadgeColor::Gray,
        1..=49 => BadgeColor::Yellow,
        50..=99 => BadgeColor::Blue,
        _ => BadgeColor::Green,
    }
}

// Locked -> Unlocked -> Completed(1) -> Completed(2) -> ...
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "count", rename_all = "snake_case")]
pub enum ProgressState {
    Locked,
    Unlocked,
    Completed(u32),
}

impl ProgressState {
    pub fn from_parts(completion_count: u32, is_locked: bool) -> Self {
        match (is_locked, completion_count) {
            (true, _) => ProgressState::Locked,
            (false, 0) => ProgressState::Unlocked,
            (false, n) => ProgressState::Completed(n),
        }
    }

    pub fn tier(&self) -> Tier {
        match self {
            ProgressState::Locked => classify(0, true),
            ProgressState::Unlocked => classify(0, false),
            ProgressState::Completed(n) => classify(*n, false),
        }
    }
}
