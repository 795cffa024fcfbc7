use error_chain::bail;
use futures_util::stream::{self, StreamExt};

use crate::dispatch::Outcome;
use crate::errors::*;
use crate::webhook::{DiscordWebhook, WebhookOptions};

/// Builds one independent message per url, all from the same options.
///
/// The options must not carry a url of their own, it would be ambiguous
/// with the per-message urls.
pub fn create_batch<I, S>(urls: I, options: WebhookOptions) -> Result<Vec<DiscordWebhook>>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    if !options.url.is_empty() {
        bail!(ErrorKind::InvalidArgument(
            "shared options can't set a url, pass the urls to create_batch instead".to_owned()
        ));
    }

    Ok(urls
        .into_iter()
        .map(|url| {
            let mut webhook = DiscordWebhook::from_options(options.clone());
            webhook.set_urls([url.into()]);
            webhook
        })
        .collect())
}

/// Sends every message with at most `concurrency` dispatches in flight.
///
/// Results keep the order of `webhooks`; one failing message does not stop
/// the others.
pub async fn send_all(
    webhooks: &mut [DiscordWebhook],
    concurrency: usize,
) -> Vec<Result<Vec<Outcome>>> {
    stream::iter(webhooks.iter_mut())
        .map(|webhook| webhook.send())
        .buffered(concurrency.max(1))
        .collect()
        .await
}
