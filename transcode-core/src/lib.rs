//! # Transcode Core
//!
//! Core types shared by the timing and filtering crates.
//!
//! This crate provides:
//! - Error handling types
//! - The [`Buffer`] unit of pipeline data and owned [`BufferList`] chains
//! - 90 kHz timestamp helpers and rationals
//! - The bounded timestamp [`ReorderQueue`]

pub mod buffer;
pub mod error;
pub mod rational;
pub mod reorder;
pub mod timestamp;

pub use buffer::{Buffer, BufferFlags, BufferList, PixelLayout, Plane};
pub use error::{Error, Result};
pub use rational::Rational;
pub use reorder::{ReorderConfig, ReorderQueue, TimestampHeap, DEFAULT_REORDER_CAPACITY};
pub use timestamp::{ticks_to_seconds, ClockTime, TimeBase, CLOCK_RATE};
