//! Configuration management
//!
//! This module handles the settings of a single overlay node: which port
//! it listens on, where the seed lives, and how patient it is with the
//! network (timeouts, retry budget, inbound concurrency).

pub mod settings;

pub use settings::{NodeConfig, RetryPolicy, DEFAULT_SEED_PORT, LOOPBACK};
