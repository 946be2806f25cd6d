//! Slack integration for answerbot.
//!
//! - **Signatures** (`signature`) - `v0` request signing checks for the Events API webhook
//! - **Events** (`events`) - inbound payload model and the filters applied before dispatch
//! - **Block Kit** (`blocks`) - the subset of blocks the bot renders
//! - **Web API** (`api`) - `users.info`, `conversations.replies`, `chat.postMessage`, `chat.update`

pub mod api;
pub mod blocks;
pub mod events;
pub mod signature;

pub use api::{
    OutgoingMessage, PostedMessage, SlackApi, SlackApiError, SlackUser, SlackWebClient,
    ThreadMessage, ThreadReplies,
};
pub use blocks::{markdown_block, Block, TextObject};
pub use events::{EventPayload, FilterRejection, QualifiedEvent, RetryMarker};
pub use signature::verify_signature;
