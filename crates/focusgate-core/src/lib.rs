//! # FocusGate Core Library
//!
//! This library provides the background logic for FocusGate, a Pomodoro timer
//! paired with a distracting-site blocker. All operations are available
//! through the standalone `focusgate` CLI, which also hosts the long-running
//! daemon; a browser or desktop shell is a thin layer over the same core.
//!
//! ## Architecture
//!
//! - **Timer**: [`TimerManager`] is a state machine driven by an external
//!   one-second tick. It owns the live [`TimerState`], daily stats and the
//!   sound controller.
//! - **Blocker**: [`SiteBlocker`] evaluates the persisted blocking policy
//!   against the live timer and the local time, and redirects navigations
//!   and open tabs.
//! - **Messaging**: [`MessageHandler`] dispatches requests, broadcasts
//!   state to every listening context and throttles persistence.
//! - **Storage**: a two-namespace key-value store ([`Database`] on SQLite,
//!   [`storage::MemoryStore`] in memory) and TOML host configuration.
//!
//! Host-specific effects (audio, badge, notifications, tabs) are reached
//! only through the traits in [`audio`], [`timer`], [`notify`] and
//! [`blocker`].

pub mod audio;
pub mod blocker;
pub mod clock;
pub mod error;
pub mod events;
pub mod handler;
pub mod notify;
pub mod service;
pub mod stats;
pub mod storage;
pub mod surfaces;
pub mod timer;

pub use blocker::{BlockerSettings, BlockingMode, SiteBlocker};
pub use error::{ConfigError, CoreError, StoreError, ValidationError};
pub use events::Event;
pub use handler::{Broadcaster, ContextKind, Delivery, MessageHandler, Request, Response};
pub use service::{Background, BrowserEvent, SharedBackground};
pub use storage::{Config, Database, DurableStore, Namespace};
pub use timer::{Phase, TimerManager, TimerState, TimerStatus};
