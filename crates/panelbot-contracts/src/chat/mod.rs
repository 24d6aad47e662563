pub mod command_registry;
pub mod intent_parser;

pub use command_registry::{help_text, BotCommand, CHAT_HELP_COMMANDS};
pub use intent_parser::{parse_intent, Intent, IntentAction};
