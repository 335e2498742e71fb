//! The command contract consumed by console sessions.
//!
//! Commands are external collaborators to the session machinery: the session
//! tokenises each input line, looks the first token up in the
//! [`CommandRegistry`](super::CommandRegistry), and hands the remainder to
//! [`ConsoleCommand::execute`]. Everything a command may touch arrives
//! through the [`CommandContext`].

use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::metrics::MetricsHub;
use crate::router::RouterSet;
use crate::router::io::SessionIo;

use super::registry::CommandRegistry;

/// What the session loop does after a command returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Prompt for the next command.
    Continue,
    /// End the session and run cleanup.
    Terminate,
}

/// Errors a command surfaces to the session loop.
///
/// These are printed to the session and logged; they never end the session,
/// let alone the process.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The argument string could not be understood.
    #[error("invalid arguments: {message}")]
    InvalidArguments {
        /// What was wrong with the arguments.
        message: String,
    },
    /// An interactive sub-session failed.
    #[error("sub-session failed: {source}")]
    Subsession {
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl CommandError {
    /// Creates an invalid-arguments error.
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            message: message.into(),
        }
    }
}

/// One flag accepted by a command, rendered by `help <command>`.
///
/// The parsing grammar itself is each command's own business; these entries
/// only feed the help output.
#[derive(Debug, Clone, Copy)]
pub struct OptionSpec {
    /// Short form, e.g. `-m`.
    pub short: &'static str,
    /// Long form, e.g. `--memory`.
    pub long: &'static str,
    /// One-line help text.
    pub help: &'static str,
}

/// A console command.
pub trait ConsoleCommand: Send + Sync {
    /// The token that invokes the command.
    fn name(&self) -> &'static str;

    /// One-line description shown by `help`.
    fn description(&self) -> &'static str;

    /// Usage string shown by `help <command>`.
    fn usage(&self) -> &'static str;

    /// Flags accepted by the command, if any.
    fn options(&self) -> &'static [OptionSpec] {
        &[]
    }

    /// Executes the command with the remainder of the input line.
    ///
    /// # Errors
    ///
    /// Returns a [`CommandError`] when the argument string is unusable; the
    /// session prints it and keeps running.
    fn execute(
        &self,
        ctx: &mut CommandContext<'_>,
        line: &str,
    ) -> Result<CommandOutcome, CommandError>;
}

/// Everything a command may reach during execution.
pub struct CommandContext<'a> {
    io: &'a mut SessionIo,
    registry: &'a CommandRegistry,
    routers: &'a Arc<RouterSet>,
    hub: &'a Arc<MetricsHub>,
}

impl<'a> CommandContext<'a> {
    pub(crate) fn new(
        io: &'a mut SessionIo,
        registry: &'a CommandRegistry,
        routers: &'a Arc<RouterSet>,
        hub: &'a Arc<MetricsHub>,
    ) -> Self {
        Self {
            io,
            registry,
            routers,
            hub,
        }
    }

    /// The session's routed line I/O.
    pub fn io(&mut self) -> &mut SessionIo {
        self.io
    }

    /// The registry the session dispatches through, for `help`.
    #[must_use]
    pub fn registry(&self) -> &CommandRegistry {
        self.registry
    }

    /// The session's router set, for scoped control-hook reroutes.
    #[must_use]
    pub fn routers(&self) -> Arc<RouterSet> {
        Arc::clone(self.routers)
    }

    /// The metric stores, for read-only inspection.
    #[must_use]
    pub fn hub(&self) -> &MetricsHub {
        self.hub
    }
}
