use super::command_registry::{find_command, BotCommand};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentAction {
    Command(BotCommand),
    Unknown(String),
    Text,
    Noop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intent {
    pub action: IntentAction,
    pub raw: String,
    /// `Bot` in `/cmd@Bot`.
    pub mention: Option<String>,
    pub arg: String,
}

impl Intent {
    fn new(action: IntentAction, raw: &str) -> Self {
        Self {
            action,
            raw: raw.to_string(),
            mention: None,
            arg: String::new(),
        }
    }

    pub fn command(&self) -> Option<BotCommand> {
        match self.action {
            IntentAction::Command(command) => Some(command),
            _ => None,
        }
    }

    /// Commands mentioning another bot in a group chat are not ours.
    pub fn is_addressed_to(&self, bot_username: Option<&str>) -> bool {
        match (&self.mention, bot_username) {
            (Some(mention), Some(username)) => {
                mention.eq_ignore_ascii_case(username.trim_start_matches('@'))
            }
            _ => true,
        }
    }
}

pub fn parse_intent(text: &str) -> Intent {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return Intent::new(IntentAction::Noop, text);
    }

    if let Some(slash_tail) = raw_trimmed.strip_prefix('/') {
        let command_len = slash_tail
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            .count();
        if command_len > 0 {
            let command = slash_tail[..command_len].to_ascii_lowercase();
            let mut remainder = &slash_tail[command_len..];
            let mut mention = None;
            if let Some(after_at) = remainder.strip_prefix('@') {
                let name_len = after_at
                    .chars()
                    .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
                    .count();
                if name_len > 0 {
                    mention = Some(after_at[..name_len].to_string());
                    remainder = &after_at[name_len..];
                }
            }

            let action = match find_command(&command) {
                Some(spec) => IntentAction::Command(spec.action),
                None => IntentAction::Unknown(command),
            };
            let mut intent = Intent::new(action, text);
            intent.mention = mention;
            intent.arg = remainder.trim().to_string();
            return intent;
        }
    }

    Intent::new(IntentAction::Text, text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain_command() {
        let intent = parse_intent("/dokaku");
        assert_eq!(intent.command(), Some(BotCommand::Dokaku));
        assert_eq!(intent.mention, None);
        assert_eq!(intent.arg, "");
    }

    #[test]
    fn parse_bot_suffixed_command_case_insensitively() {
        let intent = parse_intent("  /DongZhuo@Panel_Bot  now ");
        assert_eq!(intent.command(), Some(BotCommand::Dongzhuo));
        assert_eq!(intent.mention.as_deref(), Some("Panel_Bot"));
        assert_eq!(intent.arg, "now");
        assert!(intent.is_addressed_to(Some("@panel_bot")));
        assert!(!intent.is_addressed_to(Some("other_bot")));
        assert!(intent.is_addressed_to(None));
    }

    #[test]
    fn parse_unknown_command() {
        let intent = parse_intent("/magic foo bar");
        assert_eq!(intent.action, IntentAction::Unknown("magic".to_string()));
        assert_eq!(intent.arg, "foo bar");
    }

    #[test]
    fn parse_text_and_blank() {
        assert_eq!(parse_intent("hello").action, IntentAction::Text);
        assert_eq!(parse_intent("/ not a command").action, IntentAction::Text);
        assert_eq!(parse_intent("   ").action, IntentAction::Noop);
    }

    #[test]
    fn unmentioned_command_is_for_everyone() {
        assert!(parse_intent("/fortune").is_addressed_to(Some("panel_bot")));
    }
}
