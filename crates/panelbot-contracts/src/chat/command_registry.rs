#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BotCommand {
    Dokaku,
    Dongzhuo,
    Fortune,
    Start,
    Help,
    Cancel,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: BotCommand,
    pub summary: &'static str,
}

pub(crate) const BOT_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "dokaku",
        action: BotCommand::Dokaku,
        summary: "两张图 → 三格漫画（旧版，本地拼图）",
    },
    CommandSpec {
        command: "dongzhuo",
        action: BotCommand::Dongzhuo,
        summary: "两张图 → 三格漫画（一次成图）",
    },
    CommandSpec {
        command: "fortune",
        action: BotCommand::Fortune,
        summary: "抽今日运势",
    },
    CommandSpec {
        command: "start",
        action: BotCommand::Start,
        summary: "使用说明",
    },
    CommandSpec {
        command: "help",
        action: BotCommand::Help,
        summary: "命令列表",
    },
    CommandSpec {
        command: "cancel",
        action: BotCommand::Cancel,
        summary: "退出当前对话",
    },
];

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/dokaku",
    "/dongzhuo",
    "/fortune",
    "/start",
    "/help",
    "/cancel",
];

pub(crate) fn find_command(command: &str) -> Option<&'static CommandSpec> {
    BOT_COMMANDS.iter().find(|spec| spec.command == command)
}

impl BotCommand {
    pub fn name(self) -> &'static str {
        BOT_COMMANDS
            .iter()
            .find(|spec| spec.action == self)
            .map(|spec| spec.command)
            .unwrap_or_default()
    }
}

/// One line per command, in registry order.
pub fn help_text() -> String {
    BOT_COMMANDS
        .iter()
        .map(|spec| format!("/{}  {}", spec.command, spec.summary))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn help_lists_every_registered_command() {
        let help = help_text();
        for command in CHAT_HELP_COMMANDS {
            assert!(help.contains(command), "{command} missing from help");
        }
        assert_eq!(help.lines().count(), BOT_COMMANDS.len());
    }

    #[test]
    fn command_names_round_trip_through_registry() {
        for spec in BOT_COMMANDS {
            assert_eq!(spec.action.name(), spec.command);
            assert_eq!(find_command(spec.command).map(|found| found.action), Some(spec.action));
        }
    }
}
