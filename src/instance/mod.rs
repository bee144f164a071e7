//! Instance lifecycle
//!
//! A [`BoxInstance`] compiles a chain, renders and launches helper processes for the
//! hops the core cannot run, and then starts the core. Teardown runs in reverse and
//! never stops at the first failure.

pub mod box_instance;
pub mod collaborators;
pub mod command;
pub mod shutdown;
mod url_test;

pub use box_instance::{BoxInstance, InstanceState, TeardownFailure, TeardownReport, TeardownStep};
pub use collaborators::{
    CaptureMode, CoreFactory, CoreHandle, HelperResolver, HelperSupervisor, InstanceDeps,
    ManagedInstance,
};
pub use command::{helper_command, HelperCommand};
pub use shutdown::{ExitProcess, ProcessTerminator, ShutdownPolicy};
