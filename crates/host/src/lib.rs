//! Host application surface the gateway plugin talks to.
//!
//! The host owns conversation state and is single-threaded: everything in
//! [`HostApp`] runs on its main thread. Background workers reach it through
//! [`main_thread::MainThreadHandle`], which marshals closures onto that
//! thread and waits for the result with a bounded timeout.

pub mod app;
pub mod error;
pub mod local;
pub mod main_thread;
pub mod plugin;
pub mod turn;

pub use {
    app::{AgentType, HostApp, HostEvent, KernelState},
    error::{Error, Result},
    local::LocalHost,
    main_thread::{MainThreadHandle, MainThreadQueue},
    plugin::{HostPlugin, PluginRegistry},
    turn::Turn,
};
