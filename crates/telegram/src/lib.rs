//! Telegram gateway plugin for deskgram.
//!
//! Runs a long-polling Telegram bot on its own thread and relays chat
//! messages and slash commands into the host application through
//! [`deskgram_host::MainThreadHandle`].

pub mod access;
pub mod bot;
pub mod commands;
pub mod config;
pub mod error;
pub mod handlers;
pub mod markdown;
pub mod outbound;
pub mod plugin;
pub mod poller;
pub mod relay;
pub mod runtime;
pub mod state;

#[cfg(test)]
mod test_support;

pub use {
    error::{Error, Result},
    plugin::{PLUGIN_ID, TelegramGatewayPlugin},
    runtime::BotRuntime,
};
