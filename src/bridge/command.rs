/// What an inbound text message asks the bridge to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Plan,
    Stop,
    Help,
    UnknownCommand(String),
    Prompt(String),
}

impl Inbound {
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        let Some(command) = trimmed.strip_prefix('/') else {
            return Inbound::Prompt(text.to_string());
        };
        // Group chats address bots as `/plan@my_bot`.
        let name = command
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .split('@')
            .next()
            .unwrap_or_default();
        match name {
            "plan" => Inbound::Plan,
            "stop" => Inbound::Stop,
            "help" => Inbound::Help,
            other => Inbound::UnknownCommand(other.to_string()),
        }
    }
}

pub const HELP_TEXT: &str = "🤖 <b>Claude Telegram Bridge</b>

<b>Commands:</b>
/help - Show this help
/plan - Toggle plan mode on/off
/stop - Stop the bridge

<b>How to use:</b>
• Send any text → types into Claude Code
• Tap Allow/Deny buttons → responds to permission requests

<b>Limitations:</b>
• Claude Code's tmux pane must be the active one
• Plan mode may desync if toggled via keyboard
• One chat controls whichever pane is focused";

pub const STARTED_TEXT: &str =
    "🌉 Bridge started!\n\nCommands:\n/help - Show help\n/plan - Toggle plan mode\n/stop - Stop bridge";

#[cfg(test)]
mod tests {
    use super::Inbound;

    #[test]
    fn slash_commands_are_recognised() {
        assert_eq!(Inbound::parse("/plan"), Inbound::Plan);
        assert_eq!(Inbound::parse(" /stop "), Inbound::Stop);
        assert_eq!(Inbound::parse("/help@codebridge_bot"), Inbound::Help);
        assert_eq!(
            Inbound::parse("/start"),
            Inbound::UnknownCommand("start".into())
        );
    }

    #[test]
    fn everything_else_is_a_prompt() {
        assert_eq!(
            Inbound::parse("fix the bug"),
            Inbound::Prompt("fix the bug".into())
        );
        assert_eq!(
            Inbound::parse("path is a/b/c"),
            Inbound::Prompt("path is a/b/c".into())
        );
    }
}
