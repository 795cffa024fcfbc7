use std::time::Duration;

use error_chain::bail;
use reqwest::header::{HeaderMap, RETRY_AFTER, VIA};
use reqwest::{Method, Proxy};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error};
use url::Url;

use crate::errors::*;
use crate::webhook::{Attachment, DiscordWebhook};

pub const RATE_LIMIT_MARGIN: Duration = Duration::from_millis(150);
const FALLBACK_RETRY_AFTER: Duration = Duration::from_secs(1);

/// How a dispatch reacts to HTTP 429.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Sleep and resend on 429. When off, a 429 is returned like any failure.
    pub enabled: bool,
    /// `None` keeps retrying until Discord answers with something else.
    pub max_retries: Option<u32>,
    /// Added on top of the server supplied `retry_after`.
    pub margin: Duration,
    /// Treat a 429 without a `Via` header as a hard error instead of retrying.
    pub require_via: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            max_retries: None,
            margin: RATE_LIMIT_MARGIN,
            require_via: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Edit,
    Delete,
}

impl Operation {
    pub(crate) fn method(self) -> Method {
        match self {
            Self::Create => Method::POST,
            Self::Edit => Method::PATCH,
            Self::Delete => Method::DELETE,
        }
    }

    pub(crate) fn past_tense(self) -> &'static str {
        match self {
            Self::Create => "executed",
            Self::Edit => "edited",
            Self::Delete => "deleted",
        }
    }
}

/// What a send does to the message once every url has been tried.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendOptions {
    pub remove_embeds: bool,
    pub remove_files: bool,
}

/// Result of dispatching to one url. Transport failures stay per url so the
/// other urls of the same message are still tried.
pub type Outcome = Result<WebhookResponse>;

/// Status, headers and body of one finished HTTP exchange.
#[derive(Debug, Clone)]
pub struct WebhookResponse {
    pub url: String,
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

#[derive(Deserialize, Debug)]
struct RateLimitBody {
    retry_after: Option<f64>,
}

#[derive(Deserialize, Debug)]
struct MessageBody {
    id: Option<Value>,
    attachments: Option<Vec<Attachment>>,
}

impl WebhookResponse {
    pub fn is_success(&self) -> bool {
        matches!(self.status, 200 | 204)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }

    pub fn json(&self) -> Result<Value> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Id of the message Discord created, only present with `wait=true`.
    pub fn message_id(&self) -> Option<String> {
        let body: MessageBody = serde_json::from_str(&self.body).ok()?;
        match body.id? {
            Value::String(id) => Some(id),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }

    pub fn attachments(&self) -> Option<Vec<Attachment>> {
        serde_json::from_str::<MessageBody>(&self.body)
            .ok()?
            .attachments
    }

    /// Wait requested by Discord: the JSON `retry_after` (seconds), then the
    /// `Retry-After` header, then one second. Negative or unrepresentable
    /// values count as missing.
    pub fn retry_after(&self) -> Duration {
        serde_json::from_str::<RateLimitBody>(&self.body)
            .ok()
            .and_then(|b| b.retry_after)
            .or_else(|| {
                self.headers
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<f64>().ok())
            })
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .unwrap_or(FALLBACK_RETRY_AFTER)
    }

    /// Discord's own rate limiter answers through its proxy layer.
    pub fn has_via(&self) -> bool {
        self.headers.contains_key(VIA)
    }
}

#[derive(Debug)]
enum Verdict {
    Finished,
    RetryAfter(Duration),
}

/// Decides whether a response ends the dispatch or must be resent.
fn assess(
    response: &WebhookResponse,
    policy: &RetryPolicy,
    retries: u32,
) -> Result<Verdict> {
    if !response.is_rate_limited() || !policy.enabled {
        return Ok(Verdict::Finished);
    }
    if policy.require_via && !response.has_via() {
        bail!(ErrorKind::RateLimitedWithoutVia(response.url.clone()));
    }
    if policy.max_retries.map_or(false, |max| retries >= max) {
        return Ok(Verdict::Finished);
    }
    Ok(Verdict::RetryAfter(
        response.retry_after().saturating_add(policy.margin),
    ))
}

/// Retry bookkeeping for one dispatch. The transports own the request and
/// the sleep, this decides whether there is another round.
pub(crate) struct Backoff<'a> {
    policy: &'a RetryPolicy,
    retries: u32,
}

impl<'a> Backoff<'a> {
    pub(crate) fn new(policy: &'a RetryPolicy) -> Self {
        Self { policy, retries: 0 }
    }

    /// `None` once the response is final, otherwise how long to sleep before
    /// resending.
    pub(crate) fn next_wait(&mut self, response: &WebhookResponse) -> Result<Option<Duration>> {
        match assess(response, self.policy, self.retries)? {
            Verdict::Finished => Ok(None),
            Verdict::RetryAfter(wait) => {
                log_rate_limit(wait);
                self.retries += 1;
                Ok(Some(wait))
            }
        }
    }
}

fn log_rate_limit(wait: Duration) {
    error!(
        "Webhook rate limited: sleeping for {:.3} seconds...",
        wait.as_secs_f64()
    );
}

fn log_outcome(op: Operation, index: usize, total: usize, response: &WebhookResponse) {
    if response.is_success() {
        debug!("[{}/{}] Webhook {}", index + 1, total, op.past_tense());
    } else {
        error!(
            url = %response.url,
            "[{}/{}] Webhook status code {}: {}",
            index + 1,
            total,
            response.status,
            response.body
        );
    }
}

fn log_failure(op: Operation, index: usize, total: usize, url: &str, err: &Error) {
    error!(
        url = %url,
        "[{}/{}] Webhook could not be {}: {}",
        index + 1,
        total,
        op.past_tense(),
        err
    );
}

/// Body of a request, rebuilt into a transport form for every attempt.
#[derive(Debug, Clone)]
pub(crate) enum Body {
    Empty,
    Json(String),
    Multipart {
        payload_json: String,
        files: Vec<(String, Vec<u8>)>,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct RequestPlan {
    pub method: Method,
    pub url: Url,
    pub body: Body,
    pub timeout: Option<Duration>,
}

impl RequestPlan {
    pub(crate) fn target(&self) -> &str {
        self.url.as_str()
    }

    pub(crate) fn response(&self, status: u16, headers: HeaderMap, body: String) -> WebhookResponse {
        WebhookResponse {
            url: self.target().to_owned(),
            status,
            headers,
            body,
        }
    }
}

/// Resolves the endpoint for an operation: the webhook url itself for
/// create, `{url}/messages/{id}` for edit and delete.
pub(crate) fn endpoint(
    base: &str,
    message_id: Option<&str>,
    thread_id: Option<&str>,
) -> Result<Url> {
    let mut url = Url::parse(base)?;
    url.set_query(None);
    url.set_fragment(None);

    if let Some(id) = message_id {
        url.path_segments_mut()
            .map_err(|_| ErrorKind::InvalidArgument(format!("{} can't be a base url", base)))?
            .pop_if_empty()
            .extend(["messages", id]);
    }

    {
        let mut query = url.query_pairs_mut();
        query.append_pair("wait", "true");
        if let Some(thread_id) = thread_id {
            query.append_pair("thread_id", thread_id);
        }
    }
    Ok(url)
}

impl DiscordWebhook {
    pub(crate) fn plan(&self, op: Operation, base: &str) -> Result<RequestPlan> {
        let message_id = match op {
            Operation::Create => None,
            Operation::Edit | Operation::Delete => {
                Some(self.id().ok_or(ErrorKind::MissingMessageId)?)
            }
        };
        let url = endpoint(base, message_id, self.thread_id())?;

        let body = match op {
            Operation::Delete => Body::Empty,
            Operation::Create | Operation::Edit => {
                let payload_json = serde_json::to_string(&self.to_payload()?)?;
                if self.has_files() {
                    Body::Multipart {
                        payload_json,
                        files: self
                            .files()
                            .map(|f| (f.name.clone(), f.content.clone()))
                            .collect(),
                    }
                } else {
                    Body::Json(payload_json)
                }
            }
        };

        Ok(RequestPlan {
            method: op.method(),
            url,
            body,
            timeout: self.timeout(),
        })
    }

    /// Urls a create goes to, failing before any network call when there are none.
    pub(crate) fn create_targets(&self) -> Result<Vec<String>> {
        if self.urls().is_empty() {
            bail!(ErrorKind::MissingWebhookUrl);
        }
        Ok(self.urls().to_vec())
    }

    /// Url used for edit and delete, failing before any network call.
    pub(crate) fn message_target(&self) -> Result<String> {
        let url = self.origin().ok_or(ErrorKind::MissingWebhookUrl)?.to_owned();
        if self.id().is_none() {
            bail!(ErrorKind::MissingMessageId);
        }
        Ok(url)
    }

    pub(crate) fn proxy_list(&self) -> Result<Vec<Proxy>> {
        self.proxies()
            .iter()
            .map(|(scheme, target)| -> Result<Proxy> {
                Ok(match scheme.as_str() {
                    "http" => Proxy::http(target.as_str())?,
                    "https" => Proxy::https(target.as_str())?,
                    "all" => Proxy::all(target.as_str())?,
                    other => bail!(ErrorKind::InvalidArgument(format!(
                        "unknown proxy scheme {:?}, expected http, https or all",
                        other
                    ))),
                })
            })
            .collect()
    }

    pub(crate) fn finish(&mut self, options: SendOptions) {
        if options.remove_embeds {
            self.clear_embeds();
        }
        if options.remove_files {
            self.clear_files(false);
        }
    }

    /// Logs a create outcome and threads a success back into the message.
    pub(crate) fn record(&mut self, index: usize, total: usize, url: &str, outcome: &Outcome) {
        match outcome {
            Ok(response) => {
                log_outcome(Operation::Create, index, total, response);
                self.absorb(Operation::Create, response);
            }
            Err(err) => log_failure(Operation::Create, index, total, url, err),
        }
    }

    /// Logs an edit or delete response and threads it back into the message.
    pub(crate) fn complete(&mut self, op: Operation, response: &WebhookResponse) {
        log_outcome(op, 0, 1, response);
        self.absorb(op, response);
    }

    /// Threads a finished response back into the message.
    ///
    /// Only one message id is tracked. With several urls the last successful
    /// create wins and the messages behind the other urls are no longer
    /// reachable through edit or delete.
    pub(crate) fn absorb(&mut self, op: Operation, response: &WebhookResponse) {
        if !response.is_success() {
            return;
        }
        match op {
            Operation::Create | Operation::Edit => {
                if let Some(id) = response.message_id() {
                    let origin = endpoint_base(&response.url, op);
                    if let Some(previous) = self.id().filter(|previous| *previous != id) {
                        debug!(
                            previous = %previous,
                            id = %id,
                            url = %origin,
                            "Replacing tracked message id"
                        );
                    }
                    self.assign_id(id, &origin);
                }
                if let Some(attachments) = response.attachments() {
                    self.set_attachments(attachments);
                }
            }
            Operation::Delete => self.forget_id(),
        }
    }
}

/// Strips query and the `/messages/{id}` suffix an edit added.
fn endpoint_base(url: &str, op: Operation) -> String {
    let base = url.split('?').next().unwrap_or(url);
    match op {
        Operation::Edit => base
            .rsplitn(3, '/')
            .nth(2)
            .unwrap_or(base)
            .to_owned(),
        _ => base.to_owned(),
    }
}
