//! Pure decision logic for a projection run: which film to import, which block
//! to reuse, what to call it, and when the shows go on.
//!
//! Nothing here talks to a device; every function is deterministic over its
//! inputs so the orchestrator can run all of it before committing anything.

pub mod blocks;
pub mod format;
pub mod naming;
pub mod schedule;

pub use blocks::{select_block, BlockSelection, DEFAULT_SCAN_LIMIT};
pub use format::{
    classify_label, detect_import, discover_candidates, extract_film_name, infer_format,
    select_candidate, DetectedImport,
};
pub use naming::compose_block_name;
pub use schedule::{weekly_slots, weekly_slots_for, WeekWindow, SHOW_DAYS};
