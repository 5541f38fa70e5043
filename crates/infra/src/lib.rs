//! Infrastructure layer: event store, command dispatch, read models,
//! collaborator ports, numbering, configuration and background workers.

pub mod command_dispatcher;
pub mod config;
pub mod directory;
pub mod event_store;
pub mod numbering;
pub mod projections;
pub mod read_model;
pub mod workers;

pub use command_dispatcher::{CommandDispatcher, DispatchError, Dispatched};
pub use config::EngineConfig;
pub use numbering::NumberSequence;
