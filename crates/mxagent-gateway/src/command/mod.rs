//! Command-style gateway
//!
//! Chat/CLI grammar translated 1:1 into contract calls:
//!
//! ```text
//! get -r <resource> -n <name> [-j|-t]
//! set -r <resource> -n <name> -v <json>
//! attr-list [-r <resource>]
//! notifs [-f <filter>]
//! help
//! ```

mod parser;

pub use parser::{Command, OutputFormat};

use futures::stream::{SelectAll, StreamExt};
use mxagent_core::bridge::json::parse_lenient;
use mxagent_core::AgentError;
use serde_json::{json, Value as Json};
use thiserror::Error;
use tracing::debug;

use crate::contract::{JsonCodec, NotificationStream, ResourceGateway};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("syntax error: {0}")]
    Syntax(String),

    #[error(transparent)]
    Agent(#[from] AgentError),
}

pub type CommandResult<T> = std::result::Result<T, CommandError>;

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Text(String),
    Json(Json),
}

impl Reply {
    /// Render for a text channel.
    pub fn render(&self) -> String {
        match self {
            Reply::Text(text) => text.clone(),
            Reply::Json(json) => json.to_string(),
        }
    }
}

pub const HELP: &str = "\
get -r <resource> -n <name> [-j|-t]  read an attribute
set -r <resource> -n <name> -v <json>  write an attribute
attr-list [-r <resource>]  list bound attributes
notifs [-f <filter>]  receive notifications from every resource
help  show this text";

/// One command session, e.g. one chat conversation.
///
/// `notifs` keeps its subscriptions in the session until the next `notifs`
/// or until the session is dropped.
pub struct CommandExecutor {
    gateway: ResourceGateway<JsonCodec>,
    listening: Option<SelectAll<NotificationStream<Json>>>,
}

impl CommandExecutor {
    pub fn new(gateway: ResourceGateway<JsonCodec>) -> Self {
        Self {
            gateway,
            listening: None,
        }
    }

    pub async fn execute_line(&mut self, line: &str) -> CommandResult<Reply> {
        let command = Command::parse(line)?;
        self.execute(command).await
    }

    pub async fn execute(&mut self, command: Command) -> CommandResult<Reply> {
        debug!(command = ?command, "[CommandExecutor] Executing");
        match command {
            Command::Help => Ok(Reply::Text(HELP.to_string())),
            Command::Get {
                resource,
                name,
                format,
            } => {
                let value = self.gateway.get_attribute(&resource, &name).await?;
                Ok(match format {
                    OutputFormat::Json => Reply::Json(value),
                    OutputFormat::Text => Reply::Text(match value {
                        Json::String(text) => text,
                        other => other.to_string(),
                    }),
                })
            }
            Command::Set {
                resource,
                name,
                value,
            } => {
                let wire = parse_lenient(&value);
                let written = self.gateway.set_attribute(&resource, &name, &wire).await?;
                Ok(Reply::Text(if written {
                    "OK".to_string()
                } else {
                    format!("Timed out writing {} of {}", name, resource)
                }))
            }
            Command::AttrList { resource } => {
                let lines: Vec<String> = self
                    .gateway
                    .list_attributes(resource.as_deref())
                    .into_iter()
                    .map(|d| {
                        format!(
                            "{}/{} {} {}",
                            d.resource,
                            d.name,
                            d.canonical_type,
                            d.access()
                        )
                    })
                    .collect();
                Ok(Reply::Text(if lines.is_empty() {
                    "No attributes".to_string()
                } else {
                    lines.join("\n")
                }))
            }
            Command::Notifs { filter } => self.listen_all(filter.as_deref()).await,
        }
    }

    async fn listen_all(&mut self, filter: Option<&str>) -> CommandResult<Reply> {
        self.listening = None;
        let resources: Vec<String> = self
            .gateway
            .agent()
            .notifications()
            .list_resources()
            .into_iter()
            .collect();
        if resources.is_empty() {
            return Err(AgentError::not_found("no resource has enabled notifications").into());
        }

        let mut streams = SelectAll::new();
        for resource in &resources {
            streams.push(self.gateway.listen(resource, None, filter).await?);
        }
        self.listening = Some(streams);
        Ok(Reply::Json(json!({ "listening": resources })))
    }

    pub fn is_listening(&self) -> bool {
        self.listening.is_some()
    }

    /// Next notification received by `notifs`, rendered as one chat line.
    /// `None` when not listening or every subscription ended.
    pub async fn next_notification(&mut self) -> Option<String> {
        let streams = self.listening.as_mut()?;
        let event = streams.next().await?;
        Some(render_notification(&event))
    }
}

fn render_notification(event: &Json) -> String {
    let text = |key: &str| event.get(key).and_then(Json::as_str).unwrap_or_default().to_string();
    format!(
        "[{}] {}/{}: {}",
        text("severity"),
        text("source"),
        text("category"),
        text("message")
    )
}
