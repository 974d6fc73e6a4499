//! gmbot core library: messaging-network seam, name resolution, session
//! state, chat commands, broadcast timer, and the agent loop used by the CLI.

pub mod agent;
pub mod broadcast;
pub mod commands;
pub mod config;
pub mod identity;
pub mod init;
pub mod names;
pub mod network;
pub mod reconnect;
pub mod session;
