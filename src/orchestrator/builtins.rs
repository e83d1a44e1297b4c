//! Built-in slash command handlers.
//!
//! A prompt whose text begins with `/` is checked against the built-in
//! command set before anything is sent to the agent. Built-ins answer with
//! response text (and optionally a session state change); user-defined
//! commands are resolved elsewhere into an agent prompt instead.
//!
//! Collaborator failures (model listing, auth calls) degrade to an
//! explanatory response message — they never abort the prompt.

use tracing::warn;

use crate::agent_cli::{AgentCli, AuthStatus};
use crate::custom::loader::CustomCommand;
use crate::orchestrator::session::PermissionMode;

/// Context a built-in handler runs against.
#[derive(Debug)]
pub struct BuiltinContext<'a> {
    /// Auxiliary agent invocations (models, auth).
    pub agent_cli: &'a AgentCli,
    /// Custom commands visible from the session workspace, for `/help`.
    pub custom_commands: &'a [CustomCommand],
    /// The session's current permission mode.
    pub current_mode: PermissionMode,
    /// The session's current model override, if any.
    pub current_model: Option<&'a str>,
}

/// Result of a built-in command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuiltinReply {
    /// Plain response text.
    Message(String),
    /// Switch the session mode, then respond.
    SetMode {
        /// Mode to switch to.
        mode: PermissionMode,
        /// Response text.
        message: String,
    },
    /// Switch the session model, then respond.
    SetModel {
        /// Model id to select.
        model_id: String,
        /// Response text.
        message: String,
    },
}

/// Split a `/command args…` prompt into its command name and raw argument
/// string. Returns `None` when the text is not a slash command.
#[must_use]
pub fn split_command(text: &str) -> Option<(&str, &str)> {
    let rest = text.strip_prefix('/')?;
    if rest.is_empty() {
        return None;
    }
    match rest.split_once(char::is_whitespace) {
        Some((name, args)) => Some((name, args.trim())),
        None => Some((rest, "")),
    }
}

/// Dispatch a built-in command. Returns `None` when `name` is not a
/// built-in, leaving resolution to the custom-command path.
pub async fn dispatch(name: &str, args: &str, ctx: &BuiltinContext<'_>) -> Option<BuiltinReply> {
    match name {
        "help" => Some(help(ctx)),
        "status" => Some(status(ctx).await),
        "login" => Some(login(ctx).await),
        "logout" => Some(logout(ctx).await),
        "model" => Some(model(args, ctx).await),
        "mode" => Some(mode(args, ctx)),
        _ => None,
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// `/help` — list built-ins and discovered custom commands.
fn help(ctx: &BuiltinContext<'_>) -> BuiltinReply {
    let mut text = String::from(
        "Available commands:\n\
         /help — show this help\n\
         /status — show authentication status\n\
         /login — log in to the agent\n\
         /logout — log out of the agent\n\
         /model [id] — list models or select one\n\
         /mode [id] — list permission modes or switch",
    );

    if !ctx.custom_commands.is_empty() {
        text.push_str("\n\nCustom commands:");
        for command in ctx.custom_commands {
            text.push_str(&format!("\n/{}", command.name));
            if let Some(hint) = &command.argument_hint {
                text.push_str(&format!(" {hint}"));
            }
            if let Some(description) = &command.description {
                text.push_str(&format!(" — {description}"));
            }
        }
    }

    BuiltinReply::Message(text)
}

/// `/status` — authentication status.
async fn status(ctx: &BuiltinContext<'_>) -> BuiltinReply {
    let text = match ctx.agent_cli.auth_status().await {
        Ok(AuthStatus::LoggedIn { account }) => format!("Logged in as {account}"),
        Ok(AuthStatus::LoggedOut) => "Not logged in".to_owned(),
        Err(err) => {
            warn!(%err, "status check failed");
            format!("Unable to determine status: {err}")
        }
    };
    BuiltinReply::Message(text)
}

/// `/login` — run the agent login flow.
async fn login(ctx: &BuiltinContext<'_>) -> BuiltinReply {
    let text = match ctx.agent_cli.login().await {
        Ok(AuthStatus::LoggedIn { account }) => format!("Logged in as {account}"),
        Ok(AuthStatus::LoggedOut) => "Login did not complete; still not logged in".to_owned(),
        Err(err) => {
            warn!(%err, "login failed");
            format!("Login failed: {err}")
        }
    };
    BuiltinReply::Message(text)
}

/// `/logout` — run the agent logout flow.
async fn logout(ctx: &BuiltinContext<'_>) -> BuiltinReply {
    let text = match ctx.agent_cli.logout().await {
        Ok(AuthStatus::LoggedOut) => "Logged out".to_owned(),
        Ok(AuthStatus::LoggedIn { account }) => {
            format!("Logout did not complete; still logged in as {account}")
        }
        Err(err) => {
            warn!(%err, "logout failed");
            format!("Logout failed: {err}")
        }
    };
    BuiltinReply::Message(text)
}

/// `/model [id]` — list models, or select one for the session.
async fn model(args: &str, ctx: &BuiltinContext<'_>) -> BuiltinReply {
    if !args.is_empty() {
        return BuiltinReply::SetModel {
            model_id: args.to_owned(),
            message: format!("Model set to {args}"),
        };
    }

    match ctx.agent_cli.list_models().await {
        Ok(models) if models.is_empty() => {
            BuiltinReply::Message("No models reported by the agent".to_owned())
        }
        Ok(models) => {
            let mut text = String::from("Available models:");
            for m in models {
                text.push_str(&format!("\n{} — {}", m.model_id, m.name));
                if m.current || ctx.current_model == Some(m.model_id.as_str()) {
                    text.push_str(" (current)");
                }
            }
            BuiltinReply::Message(text)
        }
        Err(err) => {
            warn!(%err, "model listing failed");
            BuiltinReply::Message(format!("Unable to list models: {err}"))
        }
    }
}

/// `/mode [id]` — list permission modes, or switch the session mode.
fn mode(args: &str, ctx: &BuiltinContext<'_>) -> BuiltinReply {
    if args.is_empty() {
        let mut text = String::from("Permission modes:");
        for m in PermissionMode::ALL {
            text.push_str(&format!("\n{}", m.id()));
            if m == ctx.current_mode {
                text.push_str(" (current)");
            }
        }
        return BuiltinReply::Message(text);
    }

    match PermissionMode::parse(args) {
        Some(mode) => BuiltinReply::SetMode {
            mode,
            message: format!("Mode set to {}", mode.id()),
        },
        None => BuiltinReply::Message(format!("Unknown mode '{args}'")),
    }
}
