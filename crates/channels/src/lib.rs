//! Chat platform adapters for Banter.
//!
//! - **Discord**: gateway client for live messages plus REST access for
//!   replies and paginated history

pub mod discord;

pub use discord::DiscordChannel;
