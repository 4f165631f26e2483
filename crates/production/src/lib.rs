//! Production runner with async I/O.
//!
//! Wraps the deterministic sync state machine with tokio:
//!
//! - Inbound messages via a bounded mpsc channel, peer joins and departures
//!   via an unbounded one
//! - Timers as spawned sleep tasks
//! - Shutdown via a cancellation token, completion via a oneshot
//!
//! # Architecture
//!
//! A single task owns the state machine and receives events over channels.
//! Store and executor are only touched from that task.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  SyncRunner task                                             │
//! │    loop { event = select!(control, peers, timers, messages); │
//! │           actions = machine.handle(event);                   │
//! │           execute(actions) }                                 │
//! └──────────────┬──────────────────────────────┬────────────────┘
//!                │ SendToPeer / Disconnect      │ SetTimer
//!                ▼                              ▼
//!          Transport (codec, rate limit)   TimerManager (tokio)
//! ```
//!
//! # Example
//!
//! ```no_run
//! # use fastsync_production::{LocalNetwork, RunnerConfig, SyncRunner};
//! # use fastsync_engine::{ChainExecutor, MemBlockStore};
//! # use fastsync_sync::SyncStateMachine;
//! # use fastsync_types::{ChainState, PeerId};
//! # async fn example(genesis: ChainState) -> Result<(), Box<dyn std::error::Error>> {
//! let config = RunnerConfig::default();
//! let network = LocalNetwork::new(config.rate_limit_config());
//!
//! let machine = SyncStateMachine::new(
//!     config.sync_config(),
//!     genesis,
//!     MemBlockStore::new(),
//!     ChainExecutor::new(),
//! );
//! let runner = SyncRunner::new(&config, machine);
//! let transport = network.register(PeerId(1), runner.inbox())?;
//! let mut handle = runner.spawn(transport);
//!
//! let outcome = handle.completed().await?;
//! println!("sync ended: {outcome:?}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod network;
mod runner;
pub mod telemetry;
mod timers;

pub use config::{RunnerConfig, RunnerConfigError};
pub use network::{LocalNetwork, LocalTransport, NetworkError, RateLimitConfig};
pub use runner::{RunnerError, RunnerInbox, SyncHandle, SyncRunner};
pub use telemetry::{init_telemetry, TelemetryError};
pub use timers::TimerManager;
