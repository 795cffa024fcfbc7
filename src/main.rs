use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use discord_webhook::DiscordWebhook;
use dotenv::dotenv;
use itertools::Itertools;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Trigger discord webhook(s).
#[derive(Parser, Debug)]
#[command(name = "discord-webhook", version)]
struct Args {
    /// Webhook url(s)
    #[arg(
        short,
        long,
        required = true,
        num_args = 1..,
        value_delimiter = ',',
        env = "DISCORD_WEBHOOK_URL"
    )]
    url: Vec<String>,

    /// Message content
    #[arg(short, long)]
    content: String,

    /// Override the default username of the webhook
    #[arg(long, env = "DISCORD_WEBHOOK_USERNAME")]
    username: Option<String>,

    /// Override the default avatar of the webhook
    #[arg(long = "avatar_url", env = "DISCORD_WEBHOOK_AVATAR_URL")]
    avatar_url: Option<String>,

    /// Sleep and retry when Discord rate limits the request
    #[arg(long)]
    rate_limit_retry: bool,

    /// Seconds to wait for Discord to answer
    #[arg(long, value_parser = parse_timeout)]
    timeout: Option<Duration>,
}

fn parse_timeout(s: &str) -> Result<Duration, String> {
    let secs: f64 = s.parse().map_err(|e| format!("{}", e))?;
    if secs <= 0.0 {
        return Err("must be a positive number of seconds".to_owned());
    }
    Duration::try_from_secs_f64(secs).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut webhook = DiscordWebhook::with_urls(args.url);
    webhook.set_content(args.content);
    if let Some(username) = args.username {
        webhook.set_username(username);
    }
    if let Some(avatar_url) = args.avatar_url {
        webhook.set_avatar_url(avatar_url);
    }
    if let Some(timeout) = args.timeout {
        webhook.set_timeout(timeout);
    }
    webhook.set_rate_limit_retry(args.rate_limit_retry);

    let outcomes = match webhook.send().await {
        Ok(outcomes) => outcomes,
        Err(err) => {
            error!("{}", err);
            return ExitCode::FAILURE;
        }
    };

    let statuses = outcomes
        .iter()
        .map(|outcome| match outcome {
            Ok(response) => response.status.to_string(),
            Err(_) => "no response".to_owned(),
        })
        .join(", ");
    info!("Webhook responses: {}", statuses);

    if outcomes.iter().all(|outcome| outcome.is_ok()) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
