//! Slash commands embedded in the message-posting path.
//!
//! Text starting with `/` is a command: `/<name> <arg1> <arg2> ...`, tokens
//! separated by whitespace. A [`CommandRegistry`] maps each command name to
//! its ordered parameter names and a builder producing a typed [`Command`].
//! Validation happens entirely here; malformed commands never reach the
//! engine.

use std::collections::BTreeMap;

use parley_proto::{ChannelId, IdentityKey, payloads::InviteRequest};
use thiserror::Error;

/// Command text that could not be dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// No command registered under this name.
    #[error("Unknown command: /{name}")]
    Unknown {
        /// Name as typed, without the leading `/`.
        name: String,
    },

    /// Argument count did not match the command's parameters.
    #[error("Invalid command arguments. Expected: {usage}")]
    Arguments {
        /// Expected signature, e.g. `/invite inviteeName requestId request`.
        usage: String,
    },
}

/// Parameters of `/invite`: grant a peer's invite request on the current
/// channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteParams {
    /// Inviting identity (the poster).
    pub identity_key: IdentityKey,
    /// Channel the invitee joins (the channel posted to).
    pub channel_id: ChannelId,
    /// Name the invitee will be known by.
    pub invitee_name: String,
    /// Out-of-band identifier of the request; not sent to the engine.
    pub request_id: String,
    /// Invite request blob produced by the invitee.
    pub request: String,
}

impl InviteParams {
    /// Engine request body for these parameters.
    pub fn to_request(&self) -> InviteRequest {
        InviteRequest {
            identity_key: self.identity_key.clone(),
            channel_id: self.channel_id.clone(),
            invitee_name: self.invitee_name.clone(),
            request: self.request.clone(),
        }
    }
}

/// A validated command ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/invite inviteeName requestId request`
    Invite(InviteParams),
}

/// Parsed command text with positional arguments bound to parameter names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    /// Command name without the leading `/`.
    pub name: String,
    /// Channel the text was posted to.
    pub channel_id: ChannelId,
    /// Identity the text was posted as.
    pub identity_key: IdentityKey,
    /// Parameter name -> argument.
    pub args: BTreeMap<&'static str, String>,
}

impl CommandInvocation {
    fn take(&mut self, param: &str) -> String {
        self.args.remove(param).unwrap_or_default()
    }
}

/// Declaration of one command.
#[derive(Debug, Clone, Copy)]
pub struct CommandSpec {
    /// Name typed after `/`.
    pub name: &'static str,
    /// Ordered parameter names.
    pub params: &'static [&'static str],
    /// Turns a validated invocation into a [`Command`].
    pub build: fn(CommandInvocation) -> Command,
}

impl CommandSpec {
    /// Signature shown when arguments do not match.
    pub fn usage(&self) -> String {
        let mut usage = format!("/{}", self.name);
        for param in self.params {
            usage.push(' ');
            usage.push_str(param);
        }
        usage
    }
}

fn build_invite(mut invocation: CommandInvocation) -> Command {
    let invitee_name = invocation.take("inviteeName");
    let request_id = invocation.take("requestId");
    let request = invocation.take("request");
    Command::Invite(InviteParams {
        identity_key: invocation.identity_key,
        channel_id: invocation.channel_id,
        invitee_name,
        request_id,
        request,
    })
}

/// Registered commands.
#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    commands: BTreeMap<&'static str, CommandSpec>,
}

impl CommandRegistry {
    /// Registry with no commands.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in commands (`/invite`).
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(CommandSpec {
            name: "invite",
            params: &["inviteeName", "requestId", "request"],
            build: build_invite,
        });
        registry
    }

    /// Register `spec`, returning any command it replaced.
    pub fn register(&mut self, spec: CommandSpec) -> Option<CommandSpec> {
        self.commands.insert(spec.name, spec)
    }

    /// Look up a command by name.
    pub fn get(&self, name: &str) -> Option<&CommandSpec> {
        self.commands.get(name)
    }

    /// Whether `text` is a command rather than a plain message.
    pub fn is_command(text: &str) -> bool {
        text.starts_with('/')
    }

    /// Validate `text` and bind its arguments.
    pub fn parse(
        &self,
        text: &str,
        channel_id: &str,
        identity_key: &str,
    ) -> Result<CommandInvocation, CommandError> {
        self.resolve(text, channel_id, identity_key).map(|(_, invocation)| invocation)
    }

    /// Validate `text` and build its typed [`Command`].
    pub fn dispatch(
        &self,
        text: &str,
        channel_id: &str,
        identity_key: &str,
    ) -> Result<Command, CommandError> {
        let (spec, invocation) = self.resolve(text, channel_id, identity_key)?;
        Ok((spec.build)(invocation))
    }

    fn resolve(
        &self,
        text: &str,
        channel_id: &str,
        identity_key: &str,
    ) -> Result<(&CommandSpec, CommandInvocation), CommandError> {
        let mut tokens = text.split_whitespace();
        let head = tokens.next().unwrap_or_default();
        let name = head.strip_prefix('/').unwrap_or(head);
        let args: Vec<&str> = tokens.collect();

        let spec =
            self.commands.get(name).ok_or_else(|| CommandError::Unknown { name: name.to_owned() })?;
        if args.len() != spec.params.len() {
            return Err(CommandError::Arguments { usage: spec.usage() });
        }

        let invocation = CommandInvocation {
            name: name.to_owned(),
            channel_id: channel_id.to_owned(),
            identity_key: identity_key.to_owned(),
            args: spec.params.iter().copied().zip(args.into_iter().map(str::to_owned)).collect(),
        };
        Ok((spec, invocation))
    }
}
