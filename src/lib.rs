//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates (e.g., `core-service`, `core-playback`). Host applications
//! can depend on `npc-workspace` and enable `desktop-shims` to get the
//! reqwest/SQLite-backed defaults without wiring each crate individually.
