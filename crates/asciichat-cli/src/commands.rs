//! Console input parsing: slash commands and emoji shortcodes

use asciichat_core::PaletteColor;

/// Help text shown for `/help`
pub const HELP_LINES: [&str; 5] = [
    "Available commands:",
    "/ping {message} - Send an alert to the other user",
    "/color-chat {color} - Change your chat message color",
    "/help - Show this list",
    "/quit - Leave the chat",
];

const UNKNOWN_HINT: &str = "Try /ping, /color-chat, /help or /quit";

/// Shortcodes expanded in outgoing chat lines, applied in order
const EMOJI_SHORTCODES: [(&str, &str); 23] = [
    (":)", "\u{1F60A}"),
    (":D", "\u{1F604}"),
    (":(", "\u{1F622}"),
    (":P", "\u{1F61B}"),
    (";)", "\u{1F609}"),
    ("<3", "\u{2764}\u{FE0F}"),
    (":heart:", "\u{2764}\u{FE0F}"),
    (":fire:", "\u{1F525}"),
    (":star:", "\u{2B50}"),
    (":check:", "\u{2713}"),
    (":x:", "\u{2717}"),
    (":thumbsup:", "\u{1F44D}"),
    (":thumbsdown:", "\u{1F44E}"),
    (":wave:", "\u{1F44B}"),
    (":clap:", "\u{1F44F}"),
    (":rocket:", "\u{1F680}"),
    (":eyes:", "\u{1F440}"),
    (":100:", "\u{1F4AF}"),
    (":thinking:", "\u{1F914}"),
    (":laugh:", "\u{1F602}"),
    (":cry:", "\u{1F62D}"),
    (":cool:", "\u{1F60E}"),
    (":party:", "\u{1F389}"),
];

/// One line of console input, interpreted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Plain chat line, emoji already expanded
    Chat(String),
    /// `/ping <message>`
    Ping(String),
    /// `/color-chat <color>`
    ColorChat(PaletteColor),
    Help,
    Quit,
    /// A known command used wrongly; carries the lines to show
    Usage(Vec<String>),
    /// Unrecognized slash command
    Unknown(String),
    /// Blank input
    Empty,
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return ConsoleCommand::Empty;
        }
        if !line.starts_with('/') {
            return ConsoleCommand::Chat(expand_emoji(line));
        }

        let (command, args) = match line.split_once(char::is_whitespace) {
            Some((command, args)) => (command, args.trim()),
            None => (line, ""),
        };
        let wants_help = args.is_empty() || args.eq_ignore_ascii_case("help");

        match command.to_ascii_lowercase().as_str() {
            "/ping" if wants_help => ConsoleCommand::Usage(vec![
                "/ping {message} - Send an alert to the other user with a message".to_string(),
                "Example: /ping Come look at this!".to_string(),
            ]),
            "/ping" => ConsoleCommand::Ping(args.to_string()),
            "/color-chat" if wants_help => ConsoleCommand::Usage(vec![
                "/color-chat {color} - Change your chat message color".to_string(),
                format!("Available colors: {}", color_names()),
            ]),
            "/color-chat" => match PaletteColor::from_name(args) {
                Some(color) => ConsoleCommand::ColorChat(color),
                None => ConsoleCommand::Usage(vec![format!(
                    "Invalid color '{}'. Valid colors: {}",
                    args.to_ascii_lowercase(),
                    color_names()
                )]),
            },
            "/help" => ConsoleCommand::Help,
            "/quit" | "/exit" => ConsoleCommand::Quit,
            other => ConsoleCommand::Unknown(other.to_string()),
        }
    }

    /// Lines to show locally for commands that are not sent anywhere
    pub fn feedback(&self) -> Vec<String> {
        match self {
            ConsoleCommand::Help => HELP_LINES.iter().map(|line| line.to_string()).collect(),
            ConsoleCommand::Usage(lines) => lines.clone(),
            ConsoleCommand::Unknown(command) => {
                vec![format!("Unknown command '{}'. {}", command, UNKNOWN_HINT)]
            }
            _ => Vec::new(),
        }
    }
}

/// Replace emoji shortcodes with their characters
pub fn expand_emoji(text: &str) -> String {
    EMOJI_SHORTCODES
        .iter()
        .fold(text.to_string(), |text, (code, emoji)| text.replace(code, emoji))
}

fn color_names() -> String {
    PaletteColor::ALL
        .iter()
        .map(|color| color.name())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_lines_expand_emoji() {
        assert_eq!(
            ConsoleCommand::parse("  hello :) <3 "),
            ConsoleCommand::Chat("hello \u{1F60A} \u{2764}\u{FE0F}".to_string())
        );
        assert_eq!(expand_emoji("ship it :rocket::fire:"), "ship it \u{1F680}\u{1F525}");
        assert_eq!(expand_emoji("no codes here"), "no codes here");
        assert_eq!(ConsoleCommand::parse("   "), ConsoleCommand::Empty);
    }

    #[test]
    fn test_ping() {
        assert_eq!(
            ConsoleCommand::parse("/ping Come look at this!"),
            ConsoleCommand::Ping("Come look at this!".to_string())
        );
        assert!(matches!(ConsoleCommand::parse("/ping"), ConsoleCommand::Usage(_)));
        assert!(matches!(
            ConsoleCommand::parse("/PING help"),
            ConsoleCommand::Usage(_)
        ));
    }

    #[test]
    fn test_color_chat() {
        assert_eq!(
            ConsoleCommand::parse("/color-chat Magenta"),
            ConsoleCommand::ColorChat(PaletteColor::Magenta)
        );

        let command = ConsoleCommand::parse("/color-chat orange");
        let feedback = command.feedback();
        assert_eq!(feedback.len(), 1);
        assert!(feedback[0].starts_with("Invalid color 'orange'"));
        assert!(feedback[0].contains("magenta"));
    }

    #[test]
    fn test_help_quit_and_unknown() {
        assert_eq!(ConsoleCommand::parse("/help"), ConsoleCommand::Help);
        assert_eq!(ConsoleCommand::Help.feedback().len(), HELP_LINES.len());
        assert_eq!(ConsoleCommand::parse("/quit"), ConsoleCommand::Quit);

        let command = ConsoleCommand::parse("/dance now");
        assert_eq!(command, ConsoleCommand::Unknown("/dance".to_string()));
        assert!(command.feedback()[0].contains("/help"));
        assert!(ConsoleCommand::Chat("hi".to_string()).feedback().is_empty());
    }
}
