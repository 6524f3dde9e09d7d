//! Notifier configuration — loaded from environment variables.

use std::fmt;
use std::time::Duration;

use anyhow::Context;
use reqwest::Url;

use crate::models::identity::IdentityMap;

pub const DEFAULT_MESSAGE_TEMPLATE: &str = "@{handle} broke the build! {url}";
pub const DEFAULT_CHAT_ARGS: &str = "chat send --channel {channel} --icon {icon} --text {message}";
pub const DEFAULT_DOWNSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct BreakerConfig {
    /// Basic-auth username for the CI server.
    pub ci_username: String,
    /// Basic-auth password for the CI server.
    pub ci_password: String,
    /// Known team members, in match order.
    pub identities: IdentityMap,
    /// Strip `<...>` tags from build pages before matching.
    pub strip_html: bool,
    pub chat: ChatConfig,
    /// Optional external breaker tally store.
    pub tally: Option<TallyConfig>,
    /// Upper bound on each CI fetch, tally request and chat command.
    pub downstream_timeout: Duration,
}

#[derive(Clone)]
pub struct ChatConfig {
    pub channel: String,
    /// Posting token; handed to the chat command through its environment,
    /// and through `{token}` for CLIs that take it as an argument.
    pub token: String,
    pub icon: String,
    /// Chat CLI program.
    pub command: String,
    /// Argument template; `{channel}`, `{icon}`, `{token}` and `{message}` are substituted per argument.
    pub args: Vec<String>,
    /// Message template; `{handle}`, `{url}` and `{job}` are substituted.
    pub message_template: String,
}

#[derive(Clone, Debug)]
pub struct TallyConfig {
    pub base_url: Url,
    /// Object path under the base URL; one key per breaker lives below it.
    pub object_path: String,
}

impl BreakerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps variable names to values.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let ci_username = var("JENKINS_USERNAME").unwrap_or_default();
        let ci_password = var("JENKINS_PASSWORD").unwrap_or_default();

        let identities = match var("WBB_IDENTITY_FILE") {
            Some(path) => {
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading identity file {path}"))?;
                IdentityMap::from_json(&text)
                    .with_context(|| format!("parsing identity file {path}"))?
            }
            None => IdentityMap::from_members(
                var("WBB_TEAM_MEMBERS")
                    .unwrap_or_default()
                    .split(',')
                    .map(str::trim)
                    .filter(|m| !m.is_empty()),
            ),
        };

        let strip_html = match var("WBB_STRIP_HTML") {
            Some(v) => parse_bool(&v).with_context(|| format!("WBB_STRIP_HTML={v}"))?,
            None => true,
        };

        let chat = ChatConfig {
            channel: var("WBB_CHAT_CHANNEL").unwrap_or_else(|| "#general".to_string()),
            token: var("WBB_CHAT_TOKEN").unwrap_or_default(),
            icon: var("WBB_CHAT_ICON").unwrap_or_else(|| ":rotating_light:".to_string()),
            command: var("WBB_CHAT_COMMAND").unwrap_or_else(|| "slack".to_string()),
            args: var("WBB_CHAT_ARGS")
                .unwrap_or_else(|| DEFAULT_CHAT_ARGS.to_string())
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            message_template: var("WBB_MESSAGE_TEMPLATE")
                .unwrap_or_else(|| DEFAULT_MESSAGE_TEMPLATE.to_string()),
        };

        let tally = match var("WBB_TALLY_URL") {
            Some(raw) => {
                let base_url: Url = raw
                    .parse()
                    .with_context(|| format!("WBB_TALLY_URL is not a valid URL: {raw}"))?;
                if base_url.cannot_be_a_base() {
                    anyhow::bail!("WBB_TALLY_URL cannot be used as a base URL: {raw}");
                }
                Some(TallyConfig {
                    base_url,
                    object_path: var("WBB_TALLY_PATH").unwrap_or_else(|| "breakers".to_string()),
                })
            }
            None => None,
        };

        let downstream_timeout = match var("WBB_DOWNSTREAM_TIMEOUT_SECS") {
            Some(v) => {
                let secs: u64 = v
                    .trim()
                    .parse()
                    .with_context(|| format!("WBB_DOWNSTREAM_TIMEOUT_SECS={v}"))?;
                if secs == 0 {
                    anyhow::bail!("WBB_DOWNSTREAM_TIMEOUT_SECS must be greater than zero");
                }
                Duration::from_secs(secs)
            }
            None => DEFAULT_DOWNSTREAM_TIMEOUT,
        };

        if ci_username.is_empty() || ci_password.is_empty() {
            tracing::warn!("JENKINS_USERNAME/JENKINS_PASSWORD not set -- build pages fetched without credentials");
        }
        if identities.is_empty() {
            tracing::warn!("No team members configured -- failed builds will never be attributed");
        }
        if chat.token.is_empty() {
            tracing::warn!("WBB_CHAT_TOKEN not set -- chat command must find its own token");
        }

        Ok(Self {
            ci_username,
            ci_password,
            identities,
            strip_html,
            chat,
            tally,
            downstream_timeout,
        })
    }
}

fn parse_bool(value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("expected a boolean, got {other:?}"),
    }
}

const REDACTED: &str = "<redacted>";

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        ""
    } else {
        REDACTED
    }
}

impl fmt::Debug for BreakerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BreakerConfig")
            .field("ci_username", &self.ci_username)
            .field("ci_password", &redact(&self.ci_password))
            .field("identities", &self.identities.len())
            .field("strip_html", &self.strip_html)
            .field("chat", &self.chat)
            .field("tally", &self.tally)
            .field("downstream_timeout", &self.downstream_timeout)
            .finish()
    }
}

impl fmt::Debug for ChatConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatConfig")
            .field("channel", &self.channel)
            .field("token", &redact(&self.token))
            .field("icon", &self.icon)
            .field("command", &self.command)
            .field("args", &self.args)
            .field("message_template", &self.message_template)
            .finish()
    }
}
