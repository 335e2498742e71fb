//! Console command dispatch.
//!
//! Sessions resolve each input line against a [`CommandRegistry`] of
//! [`ConsoleCommand`] implementations. The built-ins cover documentation
//! (`help`), session termination (`exit`, `quit`), and metric inspection
//! (`stats`); embedders may register further commands, including an
//! [`InteractiveCommand`] wrapping a [`Subsession`], before attaching.

mod builtins;
mod command;
mod interactive;
mod registry;

pub use self::builtins::{ExitCommand, HelpCommand, QuitCommand, StatsCommand};
pub use self::command::{
    CommandContext, CommandError, CommandOutcome, ConsoleCommand, OptionSpec,
};
pub use self::interactive::{InteractiveCommand, Subsession};
pub use self::registry::CommandRegistry;

pub(crate) const CONSOLE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::console");

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::metrics::MetricsHub;
    use crate::router::RouterSet;
    use crate::router::io::SessionIo;
    use crate::router::io::test_support::MemoryStream;
    use crate::router::io::{IoDestination, IoSlot};

    use super::*;

    /// Runs one command line against a throwaway session environment and
    /// returns everything it wrote.
    fn run_command(
        registry: &CommandRegistry,
        hub: &Arc<MetricsHub>,
        line: &str,
    ) -> (Result<CommandOutcome, CommandError>, String) {
        let set = Arc::new(RouterSet::with_process_defaults());
        let memory = MemoryStream::with_input(b"");
        set.io_slot(IoSlot::Stdout)
            .register(Arc::clone(&memory) as IoDestination);

        let mut io = SessionIo::for_set(&set);
        let mut split = line.splitn(2, char::is_whitespace);
        let name = split.next().unwrap_or_default();
        let remainder = split.next().unwrap_or_default();
        let command = registry.get(name).expect("command registered");
        let mut ctx = CommandContext::new(&mut io, registry, &set, hub);
        let result = command.execute(&mut ctx, remainder);

        set.io_slot(IoSlot::Stdout).unregister();
        (result, memory.written_string())
    }

    fn fresh_hub() -> Arc<MetricsHub> {
        Arc::new(MetricsHub::with_queue_capacity(16))
    }

    #[test]
    fn exit_and_quit_terminate() {
        let registry = CommandRegistry::builtin();
        let hub = fresh_hub();
        for line in ["exit", "quit"] {
            let (result, _) = run_command(&registry, &hub, line);
            assert_eq!(result.expect("command runs"), CommandOutcome::Terminate);
        }
    }

    #[test]
    fn help_lists_all_commands() {
        let registry = CommandRegistry::builtin();
        let (result, output) = run_command(&registry, &fresh_hub(), "help");
        assert_eq!(result.expect("help runs"), CommandOutcome::Continue);
        assert!(output.contains("Available Commands:"));
        for name in ["exit", "help", "quit", "stats"] {
            assert!(output.contains(&format!("  {name} - ")), "missing {name}");
        }
        assert!(output.contains("help <command>"));
    }

    #[test]
    fn help_shows_command_detail_with_options() {
        let registry = CommandRegistry::builtin();
        let (_, output) = run_command(&registry, &fresh_hub(), "help stats");
        assert!(output.contains("Usage:"));
        assert!(output.contains("stats [options] [stat_name]"));
        assert!(output.contains("Description:"));
        assert!(output.contains("Options:"));
        assert!(output.contains("-m, --memory"));
    }

    #[test]
    fn help_rejects_unknown_command_names() {
        let registry = CommandRegistry::builtin();
        let (_, output) = run_command(&registry, &fresh_hub(), "help bogus");
        assert!(output.contains("bogus is not a valid command."));
    }

    #[test]
    fn stats_summary_reports_empty_stores() {
        let registry = CommandRegistry::builtin();
        let (_, output) = run_command(&registry, &fresh_hub(), "stats");
        assert!(output.contains("No stats recorded."));
    }

    #[test]
    fn stats_summary_lists_counters_and_series() {
        use crate::metrics::{CounterAction, counter_event, series_event};

        let registry = CommandRegistry::builtin();
        let hub = fresh_hub();
        hub.apply(counter_event("requests", CounterAction::Set(42)), 500);
        hub.apply(series_event("latency", (1, 9)), 500);

        let (_, output) = run_command(&registry, &hub, "stats");
        assert!(output.contains("Counters:"));
        assert!(output.contains("  requests:42"));
        assert!(output.contains("Series:"));
        assert!(output.contains("  latency:1"));
    }

    #[test]
    fn stats_displays_a_single_stat_or_reports_absence() {
        use crate::metrics::{CounterAction, counter_event, series_event};

        let registry = CommandRegistry::builtin();
        let hub = fresh_hub();
        hub.apply(counter_event("hits", CounterAction::Set(7)), 500);
        hub.apply(series_event("load", (0, 1)), 500);

        let (_, output) = run_command(&registry, &hub, "stats hits");
        assert!(output.contains('7'));

        let (_, output) = run_command(&registry, &hub, "stats load");
        assert!(output.contains("[(0, 1)]"));

        let (_, output) = run_command(&registry, &hub, "stats missing");
        assert!(output.contains("No stat recorded with that name."));
    }

    #[test]
    fn stats_memory_flag_prints_the_probe() {
        let registry = CommandRegistry::builtin();
        let (_, output) = run_command(&registry, &fresh_hub(), "stats --memory");
        assert!(output.contains("Memory (max RSS): "));
    }

    #[test]
    fn stats_rejects_unknown_flags() {
        let registry = CommandRegistry::builtin();
        let (result, _) = run_command(&registry, &fresh_hub(), "stats --bogus");
        assert!(matches!(
            result,
            Err(CommandError::InvalidArguments { .. })
        ));
    }

    #[test]
    fn interactive_command_reroutes_quit_and_restores() {
        use crate::worker::StopFlag;

        /// Raises a quit through the session's quit slot and checks the
        /// reroute turned it into a controlled termination signal.
        struct ScriptedSubsession {
            set: Arc<RouterSet>,
        }

        impl Subsession for ScriptedSubsession {
            fn name(&self) -> &'static str {
                "repl"
            }

            fn run(&self, io: &mut SessionIo, quit: &StopFlag) -> std::io::Result<()> {
                io.write_line("inside");
                // Ending the sub-session must not close the session's route.
                (self.set.quit().resolve())(0);
                assert!(quit.stop_requested());
                Ok(())
            }
        }

        let set = Arc::new(RouterSet::with_process_defaults());
        let mut registry = CommandRegistry::builtin();
        registry.register(Box::new(InteractiveCommand::new(Arc::new(
            ScriptedSubsession {
                set: Arc::clone(&set),
            },
        ))));

        let memory = MemoryStream::with_input(b"");
        set.io_slot(IoSlot::Stdout)
            .register(Arc::clone(&memory) as IoDestination);

        let hub = fresh_hub();
        let mut io = SessionIo::for_set(&set);
        let command = registry.get("repl").expect("repl registered");
        let mut ctx = CommandContext::new(&mut io, &registry, &set, &hub);
        let result = command.execute(&mut ctx, "");

        set.io_slot(IoSlot::Stdout).unregister();

        assert_eq!(result.expect("repl runs"), CommandOutcome::Continue);
        let output = memory.written_string();
        assert!(output.contains("Dropping to repl..."));
        assert!(output.contains("inside"));
        assert!(output.contains("Leaving repl..."));
        assert!(!set.quit().has_route(), "quit reroute must be removed");
    }
}
