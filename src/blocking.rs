//! Synchronous dispatch for callers without an async runtime.
//!
//! These methods block the calling thread, including while sleeping through
//! a rate limit, and must not be called from inside a tokio runtime.

use std::thread::sleep;

use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;

use crate::dispatch::*;
use crate::errors::*;
use crate::webhook::DiscordWebhook;

fn build_client(webhook: &DiscordWebhook) -> Result<Client> {
    let mut builder = Client::builder();
    for proxy in webhook.proxy_list()? {
        builder = builder.proxy(proxy);
    }
    // The blocking client defaults to a 30s timeout, the message decides instead.
    Ok(builder.timeout(webhook.timeout()).build()?)
}

fn execute_once(client: &Client, plan: &RequestPlan) -> Result<WebhookResponse> {
    let mut request = client.request(plan.method.clone(), plan.url.clone());
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
        .map_err(|e| transport_error(plan.target(), e))?;
    let status = response.status().as_u16();
    let headers = response.headers().clone();
    let body = response
        .text()
        .map_err(|e| transport_error(plan.target(), e))?;

    Ok(plan.response(status, headers, body))
}

fn perform(client: &Client, plan: &RequestPlan, policy: &RetryPolicy) -> Result<WebhookResponse> {
    let mut backoff = Backoff::new(policy);
    loop {
        let response = execute_once(client, plan)?;
        match backoff.next_wait(&response)? {
            None => return Ok(response),
            Some(wait) => sleep(wait),
        }
    }
}

fn dispatch_one(
    client: &Client,
    webhook: &DiscordWebhook,
    op: Operation,
    url: &str,
) -> Result<WebhookResponse> {
    let plan = webhook.plan(op, url)?;
    perform(client, &plan, webhook.retry_policy())
}

impl DiscordWebhook {
    pub fn send_blocking(&mut self) -> Result<Vec<Outcome>> {
        self.send_blocking_with(SendOptions::default())
    }

    pub fn send_blocking_with(&mut self, options: SendOptions) -> Result<Vec<Outcome>> {
        let urls = self.create_targets()?;
        let client = build_client(self)?;
        let total = urls.len();

        let mut outcomes = Vec::with_capacity(total);
        for (i, url) in urls.iter().enumerate() {
            let outcome = dispatch_one(&client, self, Operation::Create, url);
            self.record(i, total, url, &outcome);
            outcomes.push(outcome);
        }

        self.finish(options);
        Ok(outcomes)
    }

    pub fn edit_blocking(&mut self) -> Result<WebhookResponse> {
        let url = self.message_target()?;
        let client = build_client(self)?;
        let response = dispatch_one(&client, self, Operation::Edit, &url)?;
        self.complete(Operation::Edit, &response);
        Ok(response)
    }

    pub fn delete_blocking(&mut self) -> Result<WebhookResponse> {
        let url = self.message_target()?;
        let client = build_client(self)?;
        let response = dispatch_one(&client, self, Operation::Delete, &url)?;
        self.complete(Operation::Delete, &response);
        Ok(response)
    }
}
