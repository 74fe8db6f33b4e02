#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    Clear,
    /// Save the last reply to the given path.
    Save(String),
    /// Toggle automatic block persistence.
    Persist(bool),
    Exit,
    Unknown(String),
}

pub const HELP_TEXT: &str = "\
/help              show this help
/clear             forget the conversation so far
/save <path>       save the last reply verbatim to <path>
/persist on|off    toggle writing fenced blocks to the workspace
/exit              quit";

pub fn parse_slash_command(input: &str) -> Option<SlashCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let (command, argument) = match trimmed.split_once(char::is_whitespace) {
        Some((command, argument)) => (command, argument.trim()),
        None => (trimmed, ""),
    };

    let parsed = match (command, argument) {
        ("/help", _) => SlashCommand::Help,
        ("/clear", _) => SlashCommand::Clear,
        ("/save", path) if !path.is_empty() => SlashCommand::Save(path.to_owned()),
        ("/persist", "on") => SlashCommand::Persist(true),
        ("/persist", "off") => SlashCommand::Persist(false),
        ("/exit" | "/quit", _) => SlashCommand::Exit,
        _ => SlashCommand::Unknown(trimmed.to_owned()),
    };

    Some(parsed)
}
