use std::time::Duration;

use crate::routing::RoutingEngine;
use crate::{
    ALIGNMENT_TOLERANCE, DEFAULT_STORAGE_KEY, DEFAULT_THEME, GRID_UNIT, HISTORY_CAPACITY,
    NOTICE_CAPACITY, PERSIST_DEBOUNCE_MS, RESIZE_THROTTLE_MS,
};

#[derive(Debug, Clone)]
pub struct EditorConfig {
    pub grid_unit: i32,
    pub alignment_tolerance: i32,
    pub history_capacity: usize,
    pub notice_capacity: usize,
    pub persist_debounce: Duration,
    pub resize_throttle: Duration,
    pub storage_key: String,
    pub theme: String,
    pub routing: RoutingEngine,
}

fn env_or<T: std::str::FromStr>(name: &str, fallback: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(fallback)
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            grid_unit: env_or("ARCHDRAW_GRID", GRID_UNIT).max(1),
            alignment_tolerance: env_or("ARCHDRAW_ALIGN_TOLERANCE", ALIGNMENT_TOLERANCE).max(0),
            history_capacity: env_or("ARCHDRAW_HISTORY", HISTORY_CAPACITY).max(1),
            notice_capacity: NOTICE_CAPACITY,
            persist_debounce: Duration::from_millis(env_or(
                "ARCHDRAW_PERSIST_DEBOUNCE_MS",
                PERSIST_DEBOUNCE_MS,
            )),
            resize_throttle: Duration::from_millis(RESIZE_THROTTLE_MS),
            storage_key: std::env::var("ARCHDRAW_STORAGE_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_STORAGE_KEY.to_string()),
            theme: DEFAULT_THEME.to_string(),
            routing: RoutingEngine::default(),
        }
    }
}

impl EditorConfig {
    /// Built-in defaults, ignoring the environment.
    pub fn builtin() -> Self {
        Self {
            grid_unit: GRID_UNIT,
            alignment_tolerance: ALIGNMENT_TOLERANCE,
            history_capacity: HISTORY_CAPACITY,
            notice_capacity: NOTICE_CAPACITY,
            persist_debounce: Duration::from_millis(PERSIST_DEBOUNCE_MS),
            resize_throttle: Duration::from_millis(RESIZE_THROTTLE_MS),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            theme: DEFAULT_THEME.to_string(),
            routing: RoutingEngine::default(),
        }
    }

    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    pub fn with_grid_unit(mut self, grid_unit: i32) -> Self {
        self.grid_unit = grid_unit.max(1);
        self
    }
}
