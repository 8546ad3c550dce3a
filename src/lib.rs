//! # Questline - Per-Player Quest Progress Engine
//!
//! Questline tracks, for every player of a persistent game world, the
//! lifecycle of quests made of tasks: starting, cancelling, completing and
//! tracking quests, accumulating task progress from gameplay events, and
//! persisting that state.
//!
//! ## Features
//!
//! - **Lifecycle state machine**: start/cancel/complete/track with a fixed
//!   eligibility order (start limit, repeatability, cooldown, prerequisites,
//!   permissions).
//! - **Task type contract**: pluggable handlers subscribed to typed gameplay
//!   events, with aggregated config validation at load time.
//! - **Per-player locking**: events for different players never contend.
//! - **Persistence**: sled (bincode) or JSON files, both replacing the durable
//!   record in one step.
//! - **Notifications**: transitions are published on a channel for
//!   presentation and reward collaborators.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use questline::engine::QuestEngine;
//! use questline::storage::SledProgressStore;
//! use questline::tasktype::{GameEvent, IslandLevelTaskType};
//!
//! fn main() -> anyhow::Result<()> {
//!     let store = SledProgressStore::open("./data/progress.sled")?;
//!     let engine = QuestEngine::builder(Arc::new(store))
//!         .with_task_type(Arc::new(IslandLevelTaskType::new()))
//!         .build();
//!     let report = engine.load_quests_from_file("quests.json")?;
//!     println!("{} quests accepted", report.accepted.len());
//!
//!     let player = uuid::Uuid::new_v4();
//!     engine.join(player);
//!     engine.start_quest(player, "island_1")?;
//!     engine.handle_event(&GameEvent::IslandWorthCalculated { player, level: 20.0 });
//!     engine.shutdown()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`engine`] - Process-wide facade: reload, event routing, join/leave
//! - [`player`] - Online player registry and snapshot saves
//! - [`progress`] - Progress entities and the per-player lifecycle state machine
//! - [`quest`] - Quest definitions, catalog and definition loader
//! - [`tasktype`] - Task type contract, event registry and reference task types
//! - [`storage`] - Persistence contract plus sled and JSON backends
//! - [`config`] - TOML configuration
//! - [`permission`] - Permission oracle contract
//! - [`clock`] - Time source
//! - [`logging`] - Logger setup
//! - [`errors`] - Error types
//!
//! ## Architecture
//!
//! ```text
//! GameEvent ──▶ QuestEngine ──▶ PlayerManager ──▶ QuestPlayer (Mutex)
//!                    │                                  │
//!                    ▼                                  ▼
//!             TaskTypeManager ───── on_event ────▶ QuestProgressFile
//!                    │                                  │
//!             StaticCatalog ◀──── lookups ──────────────┤
//!                                                       ▼
//!                                       PlayerSnapshot ──▶ ProgressPersistence
//! ```

pub mod clock;
pub mod config;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod permission;
pub mod player;
pub mod progress;
pub mod quest;
pub mod storage;
pub mod tasktype;
