pub mod catalog;
pub mod codec;
pub mod config;
pub mod controller;
pub mod editor;
pub mod error;
pub mod geometry;
pub mod history;
pub mod model;
pub mod notify;
pub mod routing;
pub mod scheduler;
#[cfg(feature = "server")]
pub mod serve;
pub mod storage;
pub mod store;
pub mod svg;
pub mod templates;
pub mod utils;

pub use catalog::{Catalog, CatalogEntry, NodeCatalog, NodeCategory};
pub use codec::{CanvasDocument, LoadReport};
pub use config::EditorConfig;
pub use controller::{
    EditorMode, InputEvent, InteractionState, Key, Modifiers, PointerTarget,
};
pub use editor::CanvasEditor;
pub use error::{CanvasError, StorageError};
pub use geometry::{Alignment, AnchorSide, Point, Position, Rect, Size};
pub use history::{GraphSnapshot, History};
pub use model::{Attributes, Edge, EdgeId, EdgeKind, Node, NodeId, Routing};
pub use notify::{Notice, NoticeLevel, Notifier};
pub use routing::{ArrowHead, Route, RoutingEngine};
pub use scheduler::{Clock, CoalescingScheduler, ManualClock, SystemClock};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use store::EntityStore;
pub use templates::Template;
pub use utils::*;

/// Node coordinates and sizes are clamped to this magnitude on every way in.
pub const CANVAS_EXTENT: i32 = 1_000_000;
pub const GRID_UNIT: i32 = 20;
pub const ALIGNMENT_TOLERANCE: i32 = 8;
pub const HISTORY_CAPACITY: usize = 50;
pub const NOTICE_CAPACITY: usize = 20;
pub const PERSIST_DEBOUNCE_MS: u64 = 500;
pub const RESIZE_THROTTLE_MS: u64 = 100;
pub const ROUTE_STANDOFF: f32 = 40.0;
pub const OBSTACLE_MARGIN: f32 = 10.0;
pub const OBSTACLE_MAX_ITER: usize = 5;
pub const MANUAL_COLINEAR_TOLERANCE: f32 = 5.0;
pub const ARROW_LENGTH: f32 = 10.0;
pub const ARROW_HALF_WIDTH: f32 = 5.0;
pub const MID_ARROW_MIN_LENGTH: f32 = 160.0;
pub const ANCHOR_HANDLE_RADIUS: f32 = 8.0;
pub const EDGE_HIT_TOLERANCE: f32 = 6.0;
pub const FREE_SPOT_PADDING: i32 = 20;
pub const FREE_SPOT_COLUMNS: i32 = 12;
pub const DEFAULT_NODE_WIDTH: i32 = 160;
pub const DEFAULT_NODE_HEIGHT: i32 = 80;
pub const DOCUMENT_VERSION: &str = "2.0";
pub const DEFAULT_THEME: &str = "light";
pub const DEFAULT_STORAGE_KEY: &str = "archdraw-canvas";
