//! # Core Paging Logic
//!
//! This module contains pagekit's business logic.
//! It knows nothing about HTTP, document stores or terminals.
//!
//! ```text
//!                    ┌─────────────────────────┐
//!                    │         CORE            │
//!                    │  (this module)          │
//!                    │                         │
//!                    │  • PageState (data)     │
//!                    │  • Action (events)      │
//!                    │  • update() (reducer)   │
//!                    │  • ListBinding (scroll) │
//!                    │                         │
//!                    │  No I/O. No UI. Pure.   │
//!                    └───────────┬─────────────┘
//!                                │
//!            ┌───────────────────┼───────────────────┐
//!            ▼                   ▼                   ▼
//!     ┌────────────┐      ┌────────────┐      ┌────────────┐
//!     │   Pager    │      │    TUI     │      │  --print   │
//!     │  (tokio)   │      │ (ratatui)  │      │   (CLI)    │
//!     └────────────┘      └────────────┘      └────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`paging`]: `PageState`, `Action`, `Effect` and the `update()` reducer
//! - [`binding`]: scroll-proximity trigger and list footer derivation
//! - [`item`]: key paths and patch merging for list entries
//! - [`navigation`]: screen stacks and modals for consumers
//! - [`config`]: config file and override resolution

pub mod binding;
pub mod config;
pub mod item;
pub mod navigation;
pub mod paging;
