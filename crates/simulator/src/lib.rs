//! Fast-sync scenario simulator.
//!
//! Builds a network of serving peers (honest, forging or silent) around one
//! joining node on top of `fastsync-simulation`, runs it to completion and
//! reports what happened.
//!
//! # Example
//!
//! ```ignore
//! use fastsync_simulator::{Simulator, SimulatorConfig};
//!
//! let config = SimulatorConfig::new(4, 1_000).with_forging_peers(1);
//! let mut simulator = Simulator::new(config)?;
//! let report = simulator.run();
//!
//! println!("{report}");
//! ```

pub mod config;
pub mod runner;

pub use config::{SimulatorConfig, SimulatorError};
pub use runner::{Simulator, SyncReport};
