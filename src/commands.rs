/// Available commands and autocomplete logic

#[derive(Debug, Clone)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub description: &'static str,
}

/// All available commands
pub const COMMANDS: &[Command] = &[
  Command {
    name: "integrations",
    aliases: &["int", "i"],
    description: "Connected platforms",
  },
  Command {
    name: "add",
    aliases: &["a", "connect"],
    description: "Connect Rootly or PagerDuty",
  },
  Command {
    name: "mappings",
    aliases: &["m", "map"],
    description: "Manual user mappings",
  },
  Command {
    name: "members",
    aliases: &["team", "org"],
    description: "Organization members and invitations",
  },
  Command {
    name: "refresh",
    aliases: &["r", "reload"],
    description: "Refresh integrations now",
  },
  Command {
    name: "login",
    aliases: &["token", "auth"],
    description: "Set the API token",
  },
  Command {
    name: "logout",
    aliases: &["signout"],
    description: "Forget the API token and cached session",
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    description: "Exit b9s",
  },
];

/// Get autocomplete suggestions for a given input
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  let input_lower = input.to_lowercase();

  if input_lower.is_empty() {
    return COMMANDS.iter().collect();
  }

  let mut matches: Vec<(&Command, u32)> = Vec::new();

  for cmd in COMMANDS {
    if cmd.name == input_lower {
      matches.push((cmd, 0));
      continue;
    }

    if cmd.aliases.contains(&input_lower.as_str()) {
      matches.push((cmd, 1));
      continue;
    }

    if cmd.name.starts_with(&input_lower) {
      matches.push((cmd, 2));
      continue;
    }

    if cmd.aliases.iter().any(|a| a.starts_with(&input_lower)) {
      matches.push((cmd, 3));
      continue;
    }

    if cmd.name.contains(&input_lower) {
      matches.push((cmd, 4));
    }
  }

  // Stable sort keeps declaration order within a priority
  matches.sort_by_key(|(_, priority)| *priority);

  matches.into_iter().map(|(cmd, _)| cmd).collect()
}

/// Resolve typed input to a command name, taking the best suggestion.
pub fn resolve(input: &str) -> Option<&'static str> {
  get_suggestions(input.trim()).first().map(|c| c.name)
}
