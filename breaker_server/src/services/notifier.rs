//! Breaker notification — chat callout through an external CLI, plus the tally.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::{Captures, Regex};
use tokio::process::Command;

use crate::config::ChatConfig;
use crate::error::EventError;
use crate::models::build::BuildNotification;
use crate::services::tally::TallyStore;

/// Environment variable the chat CLI reads its token from.
pub const TOKEN_ENV: &str = "SLACK_CLI_TOKEN";

static PLACEHOLDER_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{([a-z]+)\}").unwrap());

/// Announces who broke a build.
#[async_trait]
pub trait BreakNotifier: Send + Sync {
    async fn notify(&self, handle: &str, build: &BuildNotification) -> Result<(), EventError>;
}

pub struct ChatNotifier {
    chat: ChatConfig,
    tally: Option<TallyStore>,
    timeout: Duration,
}

impl ChatNotifier {
    /// `timeout` bounds each run of the chat command; a command still running is killed.
    pub fn new(chat: ChatConfig, tally: Option<TallyStore>, timeout: Duration) -> Self {
        Self {
            chat,
            tally,
            timeout,
        }
    }

    pub fn render_message(&self, handle: &str, build: &BuildNotification) -> String {
        fill_placeholders(
            &self.chat.message_template,
            &[
                ("handle", handle),
                ("url", &build.build.full_url),
                ("job", build.name.as_deref().unwrap_or("")),
            ],
        )
    }

    /// Argument list with placeholders filled in. Each template argument stays one argument.
    ///
    /// The result may carry the token; it is never logged.
    pub fn render_args(&self, message: &str) -> Vec<String> {
        let values = [
            ("channel", self.chat.channel.as_str()),
            ("icon", self.chat.icon.as_str()),
            ("token", self.chat.token.as_str()),
            ("message", message),
        ];
        self.chat
            .args
            .iter()
            .map(|arg| fill_placeholders(arg, &values))
            .collect()
    }

    async fn post(&self, message: &str) -> Result<(), EventError> {
        let mut cmd = Command::new(&self.chat.command);
        cmd.args(self.render_args(message)).kill_on_drop(true);
        if !self.chat.token.is_empty() {
            cmd.env(TOKEN_ENV, &self.chat.token);
        }

        let dispatch_error = |source| EventError::Dispatch {
            program: self.chat.command.clone(),
            source,
        };
        let status = tokio::time::timeout(self.timeout, cmd.status())
            .await
            .map_err(|_| {
                dispatch_error(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("still running after {}s, killed", self.timeout.as_secs_f32()),
                ))
            })?
            .map_err(dispatch_error)?;

        // Exit status is informational only.
        tracing::debug!(
            command = %self.chat.command,
            exit_code = ?status.code(),
            "Chat command finished"
        );
        Ok(())
    }
}

/// Replace each `{name}` with its value in one pass, so substituted text is never re-expanded.
/// Unknown placeholders are left as written.
fn fill_placeholders(template: &str, values: &[(&str, &str)]) -> String {
    PLACEHOLDER_REGEX
        .replace_all(template, |caps: &Captures| {
            values
                .iter()
                .find(|(name, _)| *name == &caps[1])
                .map(|(_, value)| value.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

#[async_trait]
impl BreakNotifier for ChatNotifier {
    /// Fails only when the callout itself could not be posted. Tally failures are
    /// logged and counted on their own since the callout already went out.
    async fn notify(&self, handle: &str, build: &BuildNotification) -> Result<(), EventError> {
        let message = self.render_message(handle, build);
        self.post(&message).await?;
        tracing::info!(breaker = handle, channel = %self.chat.channel, "Breaker called out");

        if let Some(tally) = &self.tally {
            match tally.increment(handle).await {
                Ok(count) => {
                    tracing::info!(breaker = handle, count, "Breaker tally incremented");
                }
                Err(source) => {
                    let e = EventError::Tally {
                        key: handle.to_string(),
                        source,
                    };
                    crate::metrics::event_error(e.category());
                    tracing::warn!(category = e.category(), "Breaker tally not updated: {e}");
                }
            }
        }

        Ok(())
    }
}
