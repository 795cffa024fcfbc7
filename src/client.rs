use futures_util::future::join_all;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use tokio::time::sleep;
use tracing::debug;

use crate::dispatch::*;
use crate::errors::*;
use crate::webhook::DiscordWebhook;

fn build_client(webhook: &DiscordWebhook) -> Result<Client> {
    let mut builder = Client::builder();
    for proxy in webhook.proxy_list()? {
        builder = builder.proxy(proxy);
    }
    Ok(builder.build()?)
}

async fn execute_once(client: &Client, plan: &RequestPlan) -> Result<WebhookResponse> {
    let mut request = client.request(plan.method.clone(), plan.url.clone());
    if let Some(timeout) = plan.timeout {
        request = request.timeout(timeout);
    }
    request = match &plan.body {
        Body::Empty => request,
        Body::Json(json) => request
            .header(CONTENT_TYPE, "application/json")
            .body(json.clone()),
        Body::Multipart {
            payload_json,
            files,
        } => {
            let mut form = Form::new().text("payload_json", payload_json.clone());
            for (i, (name, content)) in files.iter().enumerate() {
                let part = Part::bytes(content.clone()).file_name(name.clone());
                form = form.part(format!("files[{}]", i), part);
            }
            request.multipart(form)
        }
    };

    let response = request
        .send()
        .await
        .map_err(|e| transport_error(plan.target(), e))?;
    let status = response.status().as_u16();
    let headers = response.headers().clone();
    let body = response
        .text()
        .await
        .map_err(|e| transport_error(plan.target(), e))?;

    Ok(plan.response(status, headers, body))
}

/// Sends one planned request, sleeping through 429s as the policy allows.
async fn perform(
    client: &Client,
    plan: &RequestPlan,
    policy: &RetryPolicy,
) -> Result<WebhookResponse> {
    let mut backoff = Backoff::new(policy);
    loop {
        let response = execute_once(client, plan).await?;
        match backoff.next_wait(&response)? {
            None => return Ok(response),
            Some(wait) => sleep(wait).await,
        }
    }
}

async fn dispatch_one(
    client: &Client,
    webhook: &DiscordWebhook,
    op: Operation,
    url: &str,
) -> Result<WebhookResponse> {
    let plan = webhook.plan(op, url)?;
    debug!(method = %plan.method, url = %plan.target(), "Sending webhook request");
    perform(client, &plan, webhook.retry_policy()).await
}

impl DiscordWebhook {
    /// Sends the message to each of its urls in turn.
    pub async fn send(&mut self) -> Result<Vec<Outcome>> {
        self.send_with(SendOptions::default()).await
    }

    pub async fn send_with(&mut self, options: SendOptions) -> Result<Vec<Outcome>> {
        let urls = self.create_targets()?;
        let client = build_client(self)?;
        let total = urls.len();

        let mut outcomes = Vec::with_capacity(total);
        for (i, url) in urls.iter().enumerate() {
            let outcome = dispatch_one(&client, self, Operation::Create, url).await;
            self.record(i, total, url, &outcome);
            outcomes.push(outcome);
        }

        self.finish(options);
        Ok(outcomes)
    }

    /// Sends the message to all of its urls at once. Outcomes keep url order.
    pub async fn send_concurrent(&mut self, options: SendOptions) -> Result<Vec<Outcome>> {
        let urls = self.create_targets()?;
        let client = build_client(self)?;
        let total = urls.len();

        let this: &DiscordWebhook = self;
        let outcomes = join_all(
            urls.iter()
                .map(|url| dispatch_one(&client, this, Operation::Create, url)),
        )
        .await;

        for (i, (url, outcome)) in urls.iter().zip(&outcomes).enumerate() {
            self.record(i, total, url, outcome);
        }

        self.finish(options);
        Ok(outcomes)
    }

    /// Replaces the previously sent message with the current content.
    ///
    /// Only the last message created by a send is tracked. When the message
    /// went to several urls, the copies behind the other urls are left as
    /// they are.
    pub async fn edit(&mut self) -> Result<WebhookResponse> {
        let url = self.message_target()?;
        let client = build_client(self)?;
        let response = dispatch_one(&client, self, Operation::Edit, &url).await?;
        self.complete(Operation::Edit, &response);
        Ok(response)
    }

    /// Deletes the tracked message, with the same single-message reach as
    /// [`DiscordWebhook::edit`].
    pub async fn delete(&mut self) -> Result<WebhookResponse> {
        let url = self.message_target()?;
        let client = build_client(self)?;
        let response = dispatch_one(&client, self, Operation::Delete, &url).await?;
        self.complete(Operation::Delete, &response);
        Ok(response)
    }
}
