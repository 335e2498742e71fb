//! The command registry.
//!
//! An explicit map from command name to implementation, populated at
//! construction. Nothing is discovered by scanning or naming convention;
//! embedders register additional commands before attaching.

use std::collections::BTreeMap;

use tracing::debug;

use super::CONSOLE_TARGET;
use super::builtins::{ExitCommand, HelpCommand, QuitCommand, StatsCommand};
use super::command::ConsoleCommand;

/// Maps command names to their implementations.
pub struct CommandRegistry {
    commands: BTreeMap<&'static str, Box<dyn ConsoleCommand>>,
}

impl CommandRegistry {
    /// A registry with no commands at all.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            commands: BTreeMap::new(),
        }
    }

    /// The built-in command set: `help`, `exit`, `quit`, and `stats`.
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(HelpCommand));
        registry.register(Box::new(ExitCommand));
        registry.register(Box::new(QuitCommand));
        registry.register(Box::new(StatsCommand));
        registry
    }

    /// Registers a command under its own name, replacing any previous
    /// command of the same name.
    pub fn register(&mut self, command: Box<dyn ConsoleCommand>) {
        let name = command.name();
        if self.commands.insert(name, command).is_some() {
            debug!(target: CONSOLE_TARGET, command = name, "replaced registered command");
        }
    }

    /// Looks a command up by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn ConsoleCommand> {
        self.commands.get(name).map(Box::as_ref)
    }

    /// All registered commands in name order.
    pub fn commands(&self) -> impl Iterator<Item = &dyn ConsoleCommand> {
        self.commands.values().map(Box::as_ref)
    }

    /// Number of registered commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether the registry has no commands.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_has_the_documented_commands() {
        let registry = CommandRegistry::builtin();
        for name in ["help", "exit", "quit", "stats"] {
            assert!(registry.get(name).is_some(), "missing builtin '{name}'");
        }
        assert_eq!(registry.len(), 4);
        assert!(registry.get("bogus").is_none());
    }

    #[test]
    fn commands_iterate_in_name_order() {
        let registry = CommandRegistry::builtin();
        let names: Vec<_> = registry.commands().map(ConsoleCommand::name).collect();
        assert_eq!(names, vec!["exit", "help", "quit", "stats"]);
    }
}
