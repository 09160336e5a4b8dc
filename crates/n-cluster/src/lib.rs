//! # n-cluster — Monitor clusters for n-monitor
//!
//! Unit display blocks placed next to each other merge into rectangular
//! clusters that share one terminal. This crate keeps that mapping right:
//!
//! - **[`geometry`]** — `Facing`, `BlockPos`, the 12 valid `Rotation`s and
//!   the right/down/front axes they imply
//! - **[`monitor`]** — per-cell state (`MonitorState`) and `Monitors`, the
//!   engine handle over a world
//! - **[`membership`]** — place/remove/rotate/load, merging and splitting
//! - **[`server`]** — terminal ownership on the origin, text scale, ticks
//! - **[`touch`]** — face hit → terminal character
//! - **[`sync`]** — `Watcher`, pushing geometry and terminal diffs to observers
//! - **[`client`]** — `ReplicaWorld`, the observer's copy
//! - **[`world`]** — the `MonitorWorld` lookup trait and an in-memory
//!   chunked `GridWorld`
//! - **[`config`]**, **[`device`]**, **[`error`]**
//!
//! Clusters are never stored as records. Each cell knows its index within
//! its cluster, the cluster's size and rotation; everything else, including
//! which cell owns the terminal, is derived by walking the grid.

pub mod client;
pub mod config;
pub mod device;
pub mod error;
pub mod geometry;
pub mod membership;
pub mod monitor;
pub mod server;
pub mod sync;
pub mod touch;
pub mod world;

pub use client::ReplicaWorld;
pub use config::MonitorConfig;
pub use device::{DeviceEvent, DeviceId, DeviceSink};
pub use error::{MonitorError, Result};
pub use geometry::{BlockPos, ChunkPos, Facing, Rotation};
pub use monitor::{Kind, Monitor, MonitorState, Monitors};
pub use server::{ServerMonitor, TextScale};
pub use sync::{ClientMessage, ObserverId, Outgoing, Watcher};
pub use world::{GridWorld, MonitorWorld};
