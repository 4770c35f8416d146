//! Abstract command names and their protocol tokens.

use crate::error::{Result, RokuError};
use crate::protocol::CommandToken;

/// Every accepted command name with its token, aliases included
pub const COMMANDS: &[(&str, CommandToken)] = &[
    ("power", CommandToken::Key("Power")),
    ("home", CommandToken::Key("Home")),
    ("back", CommandToken::Key("Back")),
    ("up", CommandToken::Key("Up")),
    ("down", CommandToken::Key("Down")),
    ("left", CommandToken::Key("Left")),
    ("right", CommandToken::Key("Right")),
    ("ok", CommandToken::Key("Select")),
    ("select", CommandToken::Key("Select")),
    ("volume_up", CommandToken::Key("VolumeUp")),
    ("volume_down", CommandToken::Key("VolumeDown")),
    ("volume_mute", CommandToken::Key("VolumeMute")),
    ("play", CommandToken::Key("Play")),
    // The device toggles play/pause on the same key
    ("pause", CommandToken::Key("Play")),
    ("replay", CommandToken::Key("InstantReplay")),
    ("rewind", CommandToken::Key("Rev")),
    ("forward", CommandToken::Key("Fwd")),
    ("voice", CommandToken::Key("Search")),
    ("search", CommandToken::Key("Search")),
    ("options", CommandToken::Key("Info")),
    ("info", CommandToken::Key("Info")),
    ("netflix", CommandToken::Launch(12)),
    ("disney", CommandToken::Launch(529)),
    ("appletv", CommandToken::Launch(551_728)),
    ("paramount", CommandToken::Launch(31_440)),
];

/// Translate a command name, ignoring case and surrounding whitespace
pub fn translate(command: &str) -> Result<CommandToken> {
    let wanted = command.trim();
    COMMANDS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(wanted))
        .map(|(_, token)| *token)
        .ok_or_else(|| RokuError::Unsupported {
            command: command.to_string(),
        })
}
