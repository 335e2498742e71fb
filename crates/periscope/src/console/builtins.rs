//! The built-in console commands.

use super::command::{CommandContext, CommandError, CommandOutcome, ConsoleCommand, OptionSpec};
use crate::metrics;

/// Exits the console session.
pub struct ExitCommand;

impl ConsoleCommand for ExitCommand {
    fn name(&self) -> &'static str {
        "exit"
    }

    fn description(&self) -> &'static str {
        "Exits the console. (same as quit)"
    }

    fn usage(&self) -> &'static str {
        "exit"
    }

    fn execute(
        &self,
        _ctx: &mut CommandContext<'_>,
        _line: &str,
    ) -> Result<CommandOutcome, CommandError> {
        Ok(CommandOutcome::Terminate)
    }
}

/// Quits the console session.
pub struct QuitCommand;

impl ConsoleCommand for QuitCommand {
    fn name(&self) -> &'static str {
        "quit"
    }

    fn description(&self) -> &'static str {
        "Quits the console. (same as exit)"
    }

    fn usage(&self) -> &'static str {
        "quit"
    }

    fn execute(
        &self,
        _ctx: &mut CommandContext<'_>,
        _line: &str,
    ) -> Result<CommandOutcome, CommandError> {
        Ok(CommandOutcome::Terminate)
    }
}

/// In-console documentation: a command listing, or per-command detail.
pub struct HelpCommand;

impl HelpCommand {
    fn display_commands(ctx: &mut CommandContext<'_>) {
        let listing: Vec<(&str, &str)> = ctx
            .registry()
            .commands()
            .map(|command| (command.name(), command.description()))
            .collect();
        ctx.io().write_line("Available Commands:");
        ctx.io().write_line("");
        for (name, description) in listing {
            ctx.io().write_line(&format!("  {name} - {description}"));
        }
        ctx.io().write_line("");
        ctx.io()
            .write_line("For more info on a specific command, enter \"help <command>\"");
    }

    fn display_command_detail(ctx: &mut CommandContext<'_>, name: &str) {
        let Some((usage, description, options)) = ctx
            .registry()
            .get(name)
            .map(|command| (command.usage(), command.description(), command.options()))
        else {
            ctx.io()
                .write_line(&format!("{name} is not a valid command."));
            return;
        };
        ctx.io().write_line("Usage:");
        ctx.io().write_line(&format!("  {usage}"));
        ctx.io().write_line("");
        ctx.io().write_line("Description:");
        ctx.io().write_line(&format!("  {description}"));
        if !options.is_empty() {
            ctx.io().write_line("");
            ctx.io().write_line("Options:");
            for option in options {
                ctx.io().write_line(&format!(
                    "  {}, {}    {}",
                    option.short, option.long, option.help
                ));
            }
        }
    }
}

impl ConsoleCommand for HelpCommand {
    fn name(&self) -> &'static str {
        "help"
    }

    fn description(&self) -> &'static str {
        "help provides in-console documentation."
    }

    fn usage(&self) -> &'static str {
        "help [command]"
    }

    fn execute(
        &self,
        ctx: &mut CommandContext<'_>,
        line: &str,
    ) -> Result<CommandOutcome, CommandError> {
        match line.split_whitespace().next() {
            None => Self::display_commands(ctx),
            Some(name) => Self::display_command_detail(ctx, name),
        }
        Ok(CommandOutcome::Continue)
    }
}

/// Inspects recorded metrics.
pub struct StatsCommand;

const STATS_OPTIONS: &[OptionSpec] = &[OptionSpec {
    short: "-m",
    long: "--memory",
    help: "Include process memory usage in the output",
}];

impl StatsCommand {
    fn display_summary(ctx: &mut CommandContext<'_>) {
        let counters = ctx.hub().counter_summary();
        let series = ctx.hub().series_summary();
        if counters.is_empty() && series.is_empty() {
            ctx.io().write_line("No stats recorded.");
            return;
        }
        if !counters.is_empty() {
            ctx.io().write_line("Counters:");
            for (name, value) in counters {
                ctx.io().write_line(&format!("  {name}:{value}"));
            }
        }
        if !series.is_empty() {
            ctx.io().write_line("Series:");
            for (name, count) in series {
                ctx.io().write_line(&format!("  {name}:{count}"));
            }
        }
    }

    fn display_single_stat(ctx: &mut CommandContext<'_>, name: &str) {
        if let Some(value) = ctx.hub().counter(name) {
            ctx.io().write_line(&value.to_string());
        } else if let Some(points) = ctx.hub().series(name) {
            ctx.io().write_line(&format!("{points:?}"));
        } else {
            ctx.io().write_line("No stat recorded with that name.");
        }
    }
}

impl ConsoleCommand for StatsCommand {
    fn name(&self) -> &'static str {
        "stats"
    }

    fn description(&self) -> &'static str {
        "Outputs recorded stats."
    }

    fn usage(&self) -> &'static str {
        "stats [options] [stat_name]"
    }

    fn options(&self) -> &'static [OptionSpec] {
        STATS_OPTIONS
    }

    fn execute(
        &self,
        ctx: &mut CommandContext<'_>,
        line: &str,
    ) -> Result<CommandOutcome, CommandError> {
        let mut stat_name = None;
        for token in line.split_whitespace() {
            match token {
                "-m" | "--memory" => {
                    let usage = metrics::current_memory_usage();
                    ctx.io().write_line(&format!("Memory (max RSS): {usage}"));
                }
                flag if flag.starts_with('-') => {
                    return Err(CommandError::invalid_arguments(format!(
                        "unknown option '{flag}'"
                    )));
                }
                name => {
                    stat_name = Some(name);
                }
            }
        }
        match stat_name {
            Some(name) => Self::display_single_stat(ctx, name),
            None if line.split_whitespace().next().is_none() => Self::display_summary(ctx),
            None => {}
        }
        Ok(CommandOutcome::Continue)
    }
}
