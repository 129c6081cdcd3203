use crate::{
    constants::{STAT_MAX, STAT_MIN},
    models::{Action, StatValues},
};

/// Stat increments granted by one action. Every component is non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatDelta {
    pub love: i32,
    pub hunger: i32,
    pub happiness: i32,
}

impl StatDelta {
    pub const fn for_action(action: Action) -> Self {
        match action {
            Action::Feed => Self {
                love: 0,
                hunger: 20,
                happiness: 5,
            },
            Action::Cuddle => Self {
                love: 10,
                hunger: 0,
                happiness: 15,
            },
            Action::Love => Self {
                love: 15,
                hunger: 0,
                happiness: 10,
            },
        }
    }
}

fn bump(value: i32, delta: i32) -> i32 {
    value.saturating_add(delta).clamp(STAT_MIN, STAT_MAX)
}

/// Applies `action` to `current`, capping every stat at 100.
pub fn apply_action(current: StatValues, action: Action) -> StatValues {
    let delta = StatDelta::for_action(action);
    StatValues {
        love: bump(current.love, delta.love),
        hunger: bump(current.hunger, delta.hunger),
        happiness: bump(current.happiness, delta.happiness),
    }
}
