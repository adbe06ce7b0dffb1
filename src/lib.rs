//! Taskflow Realtime - event distribution core for the Taskflow
//! task-management platform.
//!
//! This crate delivers domain events to in-process handlers and to
//! connected WebSocket clients, tracks user presence across nodes and
//! coordinates per-resource collaboration.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
