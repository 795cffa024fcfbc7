use std::collections::BTreeMap;
use std::ops::BitOr;
use std::time::Duration;

use error_chain::bail;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::components::ActionRow;
use crate::dispatch::RetryPolicy;
use crate::embed::DiscordEmbed;
use crate::errors::*;
use crate::mentions::AllowedMentions;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct MessageFlags(u64);

impl MessageFlags {
    pub const NONE: Self = Self(0);
    pub const SUPPRESS_EMBEDS: Self = Self(1 << 2);
    pub const SUPPRESS_NOTIFICATIONS: Self = Self(1 << 12);

    pub fn bits(self) -> u64 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl BitOr for MessageFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// An embed as handed to the message, either modelled or as a plain JSON object.
#[derive(Debug, Clone, PartialEq)]
pub enum EmbedEntry {
    Structured(DiscordEmbed),
    Raw(Map<String, Value>),
}

impl EmbedEntry {
    fn flatten(&self) -> Result<Value> {
        Ok(match self {
            Self::Structured(embed) => serde_json::to_value(embed)?,
            Self::Raw(map) => Value::Object(map.clone()),
        })
    }
}

impl From<DiscordEmbed> for EmbedEntry {
    fn from(embed: DiscordEmbed) -> Self {
        Self::Structured(embed)
    }
}

impl From<Map<String, Value>> for EmbedEntry {
    fn from(map: Map<String, Value>) -> Self {
        Self::Raw(map)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookFile {
    pub name: String,
    pub content: Vec<u8>,
}

/// File metadata echoed back by Discord once a message carrying files exists.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Attachment {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub filename: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Everything a message can be created with apart from its identity.
#[derive(Debug, Clone, Default)]
pub struct WebhookOptions {
    pub url: Vec<String>,
    pub content: Option<String>,
    pub username: Option<String>,
    pub avatar_url: Option<String>,
    pub tts: bool,
    pub embeds: Vec<EmbedEntry>,
    pub files: Vec<WebhookFile>,
    pub components: Vec<ActionRow>,
    pub allowed_mentions: Option<AllowedMentions>,
    pub flags: MessageFlags,
    pub thread_id: Option<String>,
    pub thread_name: Option<String>,
    pub timeout: Option<Duration>,
    pub proxies: BTreeMap<String, String>,
    pub retry: RetryPolicy,
}

#[derive(Serialize, Debug)]
struct WebhookPayload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    avatar_url: Option<&'a str>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    tts: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    embeds: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    attachments: Option<&'a [Attachment]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    components: Option<&'a [ActionRow]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    allowed_mentions: Option<&'a AllowedMentions>,
    #[serde(skip_serializing_if = "MessageFlags::is_empty")]
    flags: MessageFlags,
    #[serde(skip_serializing_if = "Option::is_none")]
    thread_name: Option<&'a str>,
}

fn non_empty(s: &Option<String>) -> Option<&str> {
    s.as_deref().filter(|s| !s.is_empty())
}

/// A webhook message and the network settings used to deliver it.
///
/// `embeds` and `attachments` stay unset until first touched. Once set they
/// are always serialized, even when empty, so an edit can clear them.
#[derive(Debug, Clone, Default)]
pub struct DiscordWebhook {
    urls: Vec<String>,
    id: Option<String>,
    origin: Option<String>,
    content: Option<String>,
    username: Option<String>,
    avatar_url: Option<String>,
    tts: bool,
    embeds: Option<Vec<EmbedEntry>>,
    files: BTreeMap<String, WebhookFile>,
    attachments: Option<Vec<Attachment>>,
    components: Vec<ActionRow>,
    allowed_mentions: Option<AllowedMentions>,
    flags: MessageFlags,
    thread_id: Option<String>,
    thread_name: Option<String>,
    timeout: Option<Duration>,
    proxies: BTreeMap<String, String>,
    retry: RetryPolicy,
}

impl DiscordWebhook {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_urls([url.into()])
    }

    pub fn with_urls(urls: impl IntoIterator<Item = String>) -> Self {
        Self {
            urls: urls.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn from_options(options: WebhookOptions) -> Self {
        let mut webhook = Self {
            urls: options.url,
            content: options.content,
            username: options.username,
            avatar_url: options.avatar_url,
            tts: options.tts,
            components: options.components,
            allowed_mentions: options.allowed_mentions,
            flags: options.flags,
            thread_id: options.thread_id,
            thread_name: options.thread_name,
            timeout: options.timeout,
            proxies: options.proxies,
            retry: options.retry,
            ..Default::default()
        };
        for embed in options.embeds {
            webhook.add_embed(embed);
        }
        for file in options.files {
            webhook.add_file(file.content, file.name);
        }
        webhook
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn set_urls(&mut self, urls: impl IntoIterator<Item = String>) {
        self.urls = urls.into_iter().collect();
    }

    /// Message id assigned by Discord on the last successful send.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// The url the current `id` belongs to.
    pub(crate) fn origin(&self) -> Option<&str> {
        self.origin
            .as_deref()
            .or_else(|| self.urls.first().map(String::as_str))
    }

    pub(crate) fn assign_id(&mut self, id: String, url: &str) {
        self.id = Some(id);
        self.origin = Some(url.to_owned());
    }

    pub(crate) fn forget_id(&mut self) {
        self.id = None;
        self.origin = None;
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = Some(content.into());
    }

    pub fn set_username(&mut self, username: impl Into<String>) {
        self.username = Some(username.into());
    }

    pub fn set_avatar_url(&mut self, avatar_url: impl Into<String>) {
        self.avatar_url = Some(avatar_url.into());
    }

    pub fn set_tts(&mut self, tts: bool) {
        self.tts = tts;
    }

    pub fn add_embed(&mut self, embed: impl Into<EmbedEntry>) {
        self.embeds.get_or_insert_with(Vec::new).push(embed.into());
    }

    pub fn remove_embed(&mut self, index: usize) -> Result<EmbedEntry> {
        match self.embeds.as_mut() {
            Some(embeds) if index < embeds.len() => Ok(embeds.remove(index)),
            embeds => bail!(ErrorKind::IndexOutOfRange(
                index,
                embeds.map_or(0, |embeds| embeds.len())
            )),
        }
    }

    pub fn clear_embeds(&mut self) {
        self.embeds = Some(Vec::new());
    }

    pub fn get_embeds(&self) -> &[EmbedEntry] {
        self.embeds.as_deref().unwrap_or_default()
    }

    /// Adds a file, replacing any earlier file with the same name.
    pub fn add_file(&mut self, content: impl Into<Vec<u8>>, filename: impl Into<String>) {
        let name = filename.into();
        self.files.insert(
            name.clone(),
            WebhookFile {
                name,
                content: content.into(),
            },
        );
    }

    pub fn remove_file(&mut self, filename: &str) -> Option<WebhookFile> {
        self.files.remove(filename)
    }

    /// Drops all pending files. With `clear_attachments` the files already on
    /// the server are also dropped from the next edit.
    pub fn clear_files(&mut self, clear_attachments: bool) {
        self.files.clear();
        if clear_attachments {
            self.clear_attachments();
        }
    }

    pub fn clear_attachments(&mut self) {
        self.attachments = Some(Vec::new());
    }

    pub fn files(&self) -> impl Iterator<Item = &WebhookFile> {
        self.files.values()
    }

    pub fn has_files(&self) -> bool {
        !self.files.is_empty()
    }

    pub fn attachments(&self) -> &[Attachment] {
        self.attachments.as_deref().unwrap_or_default()
    }

    pub(crate) fn set_attachments(&mut self, attachments: Vec<Attachment>) {
        self.attachments = Some(attachments);
    }

    pub fn add_component(&mut self, row: ActionRow) {
        self.components.push(row);
    }

    pub fn clear_components(&mut self) {
        self.components.clear();
    }

    pub fn components(&self) -> &[ActionRow] {
        &self.components
    }

    pub fn set_allowed_mentions(&mut self, mentions: AllowedMentions) {
        self.allowed_mentions = Some(mentions);
    }

    pub fn flags(&self) -> MessageFlags {
        self.flags
    }

    pub fn set_flags(&mut self, flags: MessageFlags) {
        self.flags = flags;
    }

    pub fn thread_id(&self) -> Option<&str> {
        non_empty(&self.thread_id)
    }

    pub fn set_thread_id(&mut self, thread_id: impl Into<String>) {
        self.thread_id = Some(thread_id.into());
    }

    /// Creates a forum post with this name when sent to a forum channel.
    pub fn set_thread_name(&mut self, thread_name: impl Into<String>) {
        self.thread_name = Some(thread_name.into());
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
    }

    pub fn proxies(&self) -> &BTreeMap<String, String> {
        &self.proxies
    }

    /// Proxies keyed by scheme (`http`, `https` or `all`).
    pub fn set_proxies(&mut self, proxies: BTreeMap<String, String>) {
        self.proxies = proxies;
    }

    pub fn set_rate_limit_retry(&mut self, enabled: bool) {
        self.retry.enabled = enabled;
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn set_retry_policy(&mut self, retry: RetryPolicy) {
        self.retry = retry;
    }

    /// Builds the JSON body sent to Discord.
    ///
    /// Routing data (urls, files, thread id) never ends up in the body.
    pub fn to_payload(&self) -> Result<Value> {
        let embeds = self
            .embeds
            .as_ref()
            .map(|embeds| embeds.iter().map(EmbedEntry::flatten).collect::<Result<Vec<_>>>())
            .transpose()?;

        let payload = WebhookPayload {
            content: non_empty(&self.content),
            username: non_empty(&self.username),
            avatar_url: non_empty(&self.avatar_url),
            tts: self.tts,
            embeds,
            attachments: self.attachments.as_deref(),
            components: Some(self.components.as_slice()).filter(|c| !c.is_empty()),
            allowed_mentions: self.allowed_mentions.as_ref(),
            flags: self.flags,
            thread_name: non_empty(&self.thread_name),
        };

        let has_embed = payload.embeds.iter().flatten().any(|e| match e {
            Value::Object(map) => !map.is_empty(),
            _ => false,
        });
        if payload.content.is_none() && !has_embed && self.files.is_empty() {
            warn!("webhook message is empty, set content, embed data or files");
        }

        Ok(serde_json::to_value(&payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Button, ButtonOptions, ButtonStyle};
    use crate::mentions::MentionKind;
    use serde_json::json;

    const URL: &str = "https://discord.com/api/webhooks/123456/abcdef";

    #[test]
    fn test_payload_skips_routing_and_empty_fields() {
        let mut webhook = DiscordWebhook::new(URL);
        webhook.set_content("Hello, World!");
        webhook.set_username("");
        webhook.set_thread_id("999");
        webhook.set_timeout(Duration::from_secs(5));
        webhook.add_file(b"data".to_vec(), "a.txt");

        assert_eq!(
            webhook.to_payload().unwrap(),
            json!({"content": "Hello, World!"})
        );
    }

    #[test]
    fn test_empty_message_still_builds() {
        let webhook = DiscordWebhook::new(URL);
        assert_eq!(webhook.to_payload().unwrap(), json!({}));
    }

    #[test]
    fn test_embeds_key_survives_clearing() {
        let mut webhook = DiscordWebhook::new(URL);
        assert!(webhook.to_payload().unwrap().get("embeds").is_none());

        webhook.add_embed(DiscordEmbed::new("title", "description"));
        webhook.clear_embeds();
        assert_eq!(webhook.to_payload().unwrap(), json!({"embeds": []}));
    }

    #[test]
    fn test_attachments_key_after_clear() {
        let mut webhook = DiscordWebhook::new(URL);
        webhook.set_attachments(vec![Attachment {
            id: "1".to_string(),
            filename: "a.png".to_string(),
            extra: Map::new(),
        }]);
        assert_eq!(
            webhook.to_payload().unwrap()["attachments"],
            json!([{"id": "1", "filename": "a.png"}])
        );

        webhook.clear_files(true);
        assert_eq!(webhook.to_payload().unwrap()["attachments"], json!([]));
    }

    #[test]
    fn test_structured_and_raw_embeds_flatten_alike() {
        let mut embed = DiscordEmbed::new("Alert", "Something happened");
        embed.set_color(0xED4245_i64).unwrap();
        embed.add_field("Side", "YES");

        let raw = json!({"title": "Raw", "description": "kept as is", "custom": 1});

        let mut webhook = DiscordWebhook::new(URL);
        webhook.add_embed(embed);
        webhook.add_embed(raw.as_object().unwrap().clone());

        let payload = webhook.to_payload().unwrap();
        assert_eq!(payload["embeds"][0]["title"], "Alert");
        assert_eq!(payload["embeds"][0]["color"], 0xED4245);
        assert_eq!(payload["embeds"][0]["fields"][0]["inline"], true);
        assert_eq!(payload["embeds"][1], raw);
    }

    #[test]
    fn test_to_payload_is_idempotent() {
        let mut webhook = DiscordWebhook::new(URL);
        webhook.set_content("content");
        webhook.add_embed(DiscordEmbed::new("a", "b"));
        webhook.add_component(
            ActionRow::with_components([Button::new(
                ButtonStyle::Link,
                ButtonOptions {
                    url: Some("https://example.com".to_string()),
                    ..Default::default()
                },
            )
            .unwrap()])
            .unwrap(),
        );

        let first = webhook.to_payload().unwrap();
        let second = webhook.to_payload().unwrap();
        assert_eq!(first, second);
        assert_eq!(webhook.get_embeds().len(), 1);
    }

    #[test]
    fn test_remove_embed() {
        let mut webhook = DiscordWebhook::new(URL);
        webhook.add_embed(DiscordEmbed::new("a", "1"));
        webhook.add_embed(DiscordEmbed::new("b", "2"));

        match webhook.remove_embed(0).unwrap() {
            EmbedEntry::Structured(e) => assert_eq!(e.title.as_deref(), Some("a")),
            other => panic!("unexpected embed {:?}", other),
        }
        assert_eq!(webhook.get_embeds().len(), 1);

        let err = webhook.remove_embed(3).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::IndexOutOfRange(3, 1)));
    }

    #[test]
    fn test_failed_remove_embed_leaves_payload_alone() {
        let mut webhook = DiscordWebhook::new(URL);
        webhook.set_content("hi");

        let err = webhook.remove_embed(0).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::IndexOutOfRange(0, 0)));
        assert_eq!(webhook.to_payload().unwrap(), json!({"content": "hi"}));
    }

    #[test]
    fn test_files() {
        let mut webhook = DiscordWebhook::new(URL);
        webhook.add_file(b"first".to_vec(), "a.txt");
        webhook.add_file(b"second".to_vec(), "a.txt");
        webhook.add_file(b"other".to_vec(), "b.txt");

        assert_eq!(webhook.files().count(), 2);
        assert_eq!(webhook.remove_file("a.txt").unwrap().content, b"second");
        assert!(webhook.remove_file("a.txt").is_none());

        webhook.clear_files(false);
        assert!(!webhook.has_files());
        assert!(webhook.to_payload().unwrap().get("attachments").is_none());
    }

    #[test]
    fn test_flags_and_mentions() {
        let mut webhook = DiscordWebhook::new(URL);
        webhook.set_content("quiet");
        webhook.set_flags(MessageFlags::SUPPRESS_EMBEDS | MessageFlags::SUPPRESS_NOTIFICATIONS);
        webhook.set_allowed_mentions(AllowedMentions::with_parse([MentionKind::Users]));
        webhook.set_tts(true);

        let payload = webhook.to_payload().unwrap();
        assert_eq!(payload["flags"], 4100);
        assert_eq!(payload["allowed_mentions"], json!({"parse": ["users"]}));
        assert_eq!(payload["tts"], true);
        assert!(webhook.flags().contains(MessageFlags::SUPPRESS_EMBEDS));
    }

    #[test]
    fn test_from_options() {
        let webhook = DiscordWebhook::from_options(WebhookOptions {
            url: vec![URL.to_string()],
            content: Some("Test".to_string()),
            thread_name: Some("New post".to_string()),
            files: vec![WebhookFile {
                name: "a.txt".to_string(),
                content: b"a".to_vec(),
            }],
            ..Default::default()
        });

        assert_eq!(webhook.urls(), [URL.to_string()]);
        assert_eq!(webhook.content(), Some("Test"));
        assert!(webhook.has_files());
        assert_eq!(webhook.to_payload().unwrap()["thread_name"], "New post");
        assert!(webhook.id().is_none());
    }
}
