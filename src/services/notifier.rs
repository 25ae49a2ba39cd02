//! Opportunity alerts over push, SMS and Discord

use crate::config::NotificationConfig;
use crate::error::NotificationError;
use crate::types::Opportunity;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response};
use serde_json::json;
use tracing::{debug, warn};

/// Human-readable alert for one opportunity
#[derive(Debug, Clone)]
pub struct Alert {
    pub title: String,
    pub message: String,
    pub url: String,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn for_opportunity(opportunity: &Opportunity) -> Self {
        Self {
            title: format!("Deal alert: save ${:.2}", opportunity.discount()),
            message: format!(
                "{}\nPrice: ${:.2}\nEstimated value: ${:.2}\nDiscount: ${:.2}",
                opportunity.deal.short_description(120),
                opportunity.deal.price,
                opportunity.estimated_value,
                opportunity.discount()
            ),
            url: opportunity.url().to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Single block of text for channels without separate fields
    pub fn text(&self) -> String {
        format!("{}\n{}\n{}", self.title, self.message, self.url)
    }
}

/// A destination alerts can be delivered to
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, alert: &Alert) -> Result<(), NotificationError>;

    fn name(&self) -> &'static str;
}

async fn check(channel: &'static str, response: Result<Response, reqwest::Error>) -> Result<(), NotificationError> {
    let response = response.map_err(|source| NotificationError::Request { channel, source })?;
    if response.status().is_success() {
        Ok(())
    } else {
        Err(NotificationError::Status {
            channel,
            status: response.status().as_u16(),
        })
    }
}

/// Push notifications through Pushover
pub struct PushoverChannel {
    client: Client,
    user: String,
    token: String,
}

impl PushoverChannel {
    pub const API_URL: &'static str = "https://api.pushover.net/1/messages.json";

    pub fn new(client: Client, user: String, token: String) -> Self {
        Self { client, user, token }
    }
}

#[async_trait]
impl NotificationChannel for PushoverChannel {
    async fn send(&self, alert: &Alert) -> Result<(), NotificationError> {
        let form = [
            ("user", self.user.as_str()),
            ("token", self.token.as_str()),
            ("title", alert.title.as_str()),
            ("message", alert.message.as_str()),
            ("url", alert.url.as_str()),
            ("sound", "cashregister"),
        ];
        check(self.name(), self.client.post(Self::API_URL).form(&form).send().await).await
    }

    fn name(&self) -> &'static str {
        "pushover"
    }
}

/// SMS through Twilio
pub struct TwilioChannel {
    client: Client,
    account_sid: String,
    auth_token: String,
    from: String,
    to: String,
}

impl TwilioChannel {
    pub fn new(client: Client, account_sid: String, auth_token: String, from: String, to: String) -> Self {
        Self {
            client,
            account_sid,
            auth_token,
            from,
            to,
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.account_sid
        )
    }
}

#[async_trait]
impl NotificationChannel for TwilioChannel {
    async fn send(&self, alert: &Alert) -> Result<(), NotificationError> {
        let body = alert.text();
        let form = [
            ("From", self.from.as_str()),
            ("To", self.to.as_str()),
            ("Body", body.as_str()),
        ];
        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await;
        check(self.name(), response).await
    }

    fn name(&self) -> &'static str {
        "twilio"
    }
}

/// Discord webhook embed
pub struct DiscordChannel {
    client: Client,
    webhook_url: String,
}

impl DiscordChannel {
    pub fn new(client: Client, webhook_url: String) -> Self {
        Self { client, webhook_url }
    }
}

#[async_trait]
impl NotificationChannel for DiscordChannel {
    async fn send(&self, alert: &Alert) -> Result<(), NotificationError> {
        let embed = json!({
            "embeds": [{
                "title": alert.title,
                "description": alert.message,
                "color": 0x00FF00,
                "url": alert.url,
                "footer": { "text": "Deal Hunter" },
                "timestamp": alert.timestamp.to_rfc3339()
            }]
        });
        check(self.name(), self.client.post(&self.webhook_url).json(&embed).send().await).await
    }

    fn name(&self) -> &'static str {
        "discord"
    }
}

/// Outcome of one `notify` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Fans an alert out to every configured channel
pub struct Notifier {
    channels: Vec<Box<dyn NotificationChannel>>,
}

impl Notifier {
    pub fn new(channels: Vec<Box<dyn NotificationChannel>>) -> Self {
        Self { channels }
    }

    /// Channels enabled by configuration; a channel missing any field is left out
    pub fn from_config(client: &Client, config: &NotificationConfig) -> Self {
        let mut channels: Vec<Box<dyn NotificationChannel>> = Vec::new();

        if let (Some(user), Some(token)) = (&config.pushover_user, &config.pushover_token) {
            channels.push(Box::new(PushoverChannel::new(client.clone(), user.clone(), token.clone())));
        }

        if let (Some(sid), Some(auth), Some(from), Some(to)) = (
            &config.twilio_account_sid,
            &config.twilio_auth_token,
            &config.twilio_from,
            &config.twilio_to,
        ) {
            channels.push(Box::new(TwilioChannel::new(
                client.clone(),
                sid.clone(),
                auth.clone(),
                from.clone(),
                to.clone(),
            )));
        }

        if let Some(url) = &config.discord_webhook_url {
            channels.push(Box::new(DiscordChannel::new(client.clone(), url.clone())));
        }

        Self { channels }
    }

    pub fn channel_names(&self) -> Vec<&'static str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Send one alert per channel. Failures are logged, never returned.
    pub async fn notify(&self, opportunity: &Opportunity) -> DeliveryReport {
        let alert = Alert::for_opportunity(opportunity);
        let mut report = DeliveryReport::default();

        for channel in &self.channels {
            match channel.send(&alert).await {
                Ok(()) => {
                    debug!("Sent alert via {}", channel.name());
                    report.delivered += 1;
                }
                Err(e) => {
                    warn!("Failed to send alert via {}: {}", channel.name(), e);
                    report.failed += 1;
                }
            }
        }

        report
    }
}
