//! Core of the Tensor chat bot: prompt construction, remote text generation,
//! response cleanup, and moderation/audit storage.
//!
//! The chat-platform layer is a separate concern; it feeds conversation
//! history and input strings into [`ChatEngine::respond`] and calls the
//! [`ModerationDb`] / [`MessageLog`] operations from its command handlers.

pub mod config;
pub mod engine;
pub mod kobold;
pub mod message_log;
pub mod moderation;
pub mod sanitize;
pub mod template;

pub use config::Config;
pub use engine::ChatEngine;
pub use kobold::{KoboldClient, SamplingParams};
pub use message_log::{LoggedMessage, MessageLog};
pub use moderation::{BlacklistEntry, ModerationDb, StoreError, Warn};
pub use sanitize::fix_code_block;
pub use template::PromptTemplate;
