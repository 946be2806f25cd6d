pub mod config;
pub mod conversation;
pub mod errors;
pub mod secrets;

pub use config::{AppConfig, ConfigError, LoadOptions};
pub use conversation::{
    ChannelMetadata, ConversationContext, ConversationKey, EventKind, HistoryEntry, PromptBuilder,
};
pub use errors::ApplicationError;
pub use secrets::{
    CachedSecret, SearchCredentials, SecretError, SecretProvider, SlackCredentials,
};
