//! Hand-off to an interactive sub-session.
//!
//! The sub-session itself (a REPL, typically) is an opaque collaborator; the
//! machinery here is the part the session machinery owns: while the
//! sub-session runs, the quit/exit control hook is rerouted so that a quit
//! request raises a controlled termination signal for the sub-session driver
//! instead of the default process-wide behaviour. Ending the sub-session
//! must not close the owning session's I/O route. The reroute is installed
//! before entry and removed on every exit path, panic included.

use std::io;
use std::sync::Arc;

use tracing::{debug, warn};

use super::CONSOLE_TARGET;
use super::command::{CommandContext, CommandError, CommandOutcome, ConsoleCommand};
use crate::router::io::SessionIo;
use crate::router::quit::{QuitHook, QuitRouteGuard};
use crate::worker::StopFlag;

/// An opaque interactive sub-session the console can hand control to.
///
/// The sub-session reads and writes through the owning session's routed I/O
/// and must return promptly once `quit` is raised.
pub trait Subsession: Send + Sync {
    /// The command token and display name for the sub-session.
    fn name(&self) -> &'static str;

    /// Runs the sub-session until it finishes or `quit` is raised.
    ///
    /// # Errors
    ///
    /// I/O failures end the sub-session; the owning console session keeps
    /// running.
    fn run(&self, io: &mut SessionIo, quit: &StopFlag) -> io::Result<()>;
}

/// Console command that drives a [`Subsession`] under the quit reroute.
pub struct InteractiveCommand {
    subsession: Arc<dyn Subsession>,
}

impl InteractiveCommand {
    /// Wraps `subsession` as a console command named after it.
    #[must_use]
    pub fn new(subsession: Arc<dyn Subsession>) -> Self {
        Self { subsession }
    }
}

impl ConsoleCommand for InteractiveCommand {
    fn name(&self) -> &'static str {
        self.subsession.name()
    }

    fn description(&self) -> &'static str {
        "Provides an interactive sub-session."
    }

    fn usage(&self) -> &'static str {
        self.subsession.name()
    }

    fn execute(
        &self,
        ctx: &mut CommandContext<'_>,
        _line: &str,
    ) -> Result<CommandOutcome, CommandError> {
        let name = self.subsession.name();
        ctx.io().write_line(&format!("Dropping to {name}..."));

        let quit = StopFlag::new();
        let hook: QuitHook = {
            let quit = quit.clone();
            Arc::new(move |_code| quit.request_stop())
        };
        let routers = ctx.routers();
        let guard = QuitRouteGuard::install(routers.quit(), hook);
        let result = self.subsession.run(ctx.io(), &quit);
        drop(guard);

        match result {
            Ok(()) => debug!(target: CONSOLE_TARGET, subsession = name, "sub-session finished"),
            Err(error) => {
                warn!(
                    target: CONSOLE_TARGET,
                    subsession = name,
                    error = %error,
                    "sub-session failed"
                );
                ctx.io()
                    .write_line(&format!("error: sub-session failed: {error}"));
            }
        }
        ctx.io().write_line(&format!("Leaving {name}..."));
        Ok(CommandOutcome::Continue)
    }
}
