//! # Banter Core
//!
//! Domain types, collaborator traits, and error definitions for the Banter
//! Discord bot. This crate has **no platform dependencies**: Discord, the
//! language-model HTTP client and the knowledge index all implement or
//! consume the traits defined here.
//!
//! ## Collaborators
//!
//! - [`Channel`]: live chat gateway (receive messages, send replies)
//! - [`HistorySource`]: paginated channel history for index builds
//! - [`Provider`]: language-model completions
//! - [`MemberSource`]: member profiles for "about me" questions

pub mod channel;
pub mod error;
pub mod history;
pub mod member;
pub mod message;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use channel::{Channel, ChannelKind, IncomingMessage};
pub use error::{ChannelError, Error, ProviderError, Result};
pub use history::{HistoryChannel, HistoryMessage, HistorySource};
pub use member::{MemberProfile, MemberSource};
pub use message::{Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};
