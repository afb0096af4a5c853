//! Core module - configuration, host events and persisted state

pub mod config;
pub mod debounce;
pub mod events;
pub mod layout;
pub mod state;
