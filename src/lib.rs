//! Client for composing Discord webhook messages and sending, editing and
//! deleting them, with optional retry on rate limits.

#![recursion_limit = "1024"]

pub mod batch;
pub mod blocking;
pub mod client;
pub mod components;
pub mod dispatch;
pub mod embed;
pub mod errors;
pub mod mentions;
pub mod webhook;

pub use batch::{create_batch, send_all};
pub use components::{ActionRow, Button, ButtonOptions, ButtonStyle, Component, ComponentType};
pub use dispatch::{Outcome, RetryPolicy, SendOptions, WebhookResponse};
pub use embed::{
    DiscordEmbed, EmbedAuthor, EmbedField, EmbedFooter, EmbedMedia, EmbedProvider, EmbedVideo,
};
pub use errors::{Error, ErrorKind, Result};
pub use mentions::{AllowedMentions, MentionKind};
pub use webhook::{
    Attachment, DiscordWebhook, EmbedEntry, MessageFlags, WebhookFile, WebhookOptions,
};
