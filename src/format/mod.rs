//! Display strings for announcing winners in a forum post

use std::fmt;
use std::str::FromStr;

use crate::models::Winner;

/// The eight announcement layouts, numbered as offered to organizers.
///
/// Styles 1-4 put every winner on one line separated by `", "`; styles 5-8
/// put each winner on its own line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Style {
    /// `@Username (ID: 123)`, inline
    #[default]
    MentionWithId = 1,
    /// `Username (ID: 123)`, inline
    NameWithId = 2,
    /// `@Username`, inline
    Mention = 3,
    /// `Username`, inline
    Name = 4,
    /// `@Username (ID: 123)`, one per line
    MentionWithIdLines = 5,
    /// `Username (ID: 123)`, one per line
    NameWithIdLines = 6,
    /// `@Username`, one per line
    MentionLines = 7,
    /// `Username`, one per line
    NameLines = 8,
}

impl Style {
    pub const ALL: [Style; 8] = [
        Style::MentionWithId,
        Style::NameWithId,
        Style::Mention,
        Style::Name,
        Style::MentionWithIdLines,
        Style::NameWithIdLines,
        Style::MentionLines,
        Style::NameLines,
    ];

    /// Looks up a style by its menu number.
    pub fn from_number(number: u8) -> Option<Self> {
        Self::ALL.get(usize::from(number).checked_sub(1)?).copied()
    }

    /// Parses a menu choice, falling back to [`Style::MentionWithId`] when
    /// the choice is absent or not one of the eight numbers.
    pub fn from_choice(choice: Option<&str>) -> Self {
        choice
            .and_then(|c| c.trim().parse().ok())
            .unwrap_or_default()
    }

    pub fn number(self) -> u8 {
        self as u8
    }

    fn mention(self) -> bool {
        matches!(
            self,
            Self::MentionWithId | Self::Mention | Self::MentionWithIdLines | Self::MentionLines
        )
    }

    fn with_id(self) -> bool {
        matches!(
            self,
            Self::MentionWithId | Self::NameWithId | Self::MentionWithIdLines | Self::NameWithIdLines
        )
    }

    fn one_per_line(self) -> bool {
        self.number() >= 5
    }

    fn render(self, winner: &Winner) -> String {
        let prefix = if self.mention() { "@" } else { "" };
        if self.with_id() {
            format!("{prefix}{} (ID: {})", winner.username, winner.id)
        } else {
            format!("{prefix}{}", winner.username)
        }
    }
}

impl FromStr for Style {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u8>()
            .ok()
            .and_then(Self::from_number)
            .ok_or_else(|| format!("unknown output style {s:?}, expected 1-8"))
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Renders the winner announcement.
///
/// Always starts with `"Winners:\n"`. Line styles terminate every entry with
/// a newline, inline styles join entries with `", "`.
pub fn format_winners(winners: &[Winner], style: Style) -> String {
    let mut output = String::from("Winners:\n");

    if style.one_per_line() {
        for winner in winners {
            output.push_str(&style.render(winner));
            output.push('\n');
        }
    } else {
        let entries: Vec<String> = winners.iter().map(|w| style.render(w)).collect();
        output.push_str(&entries.join(", "));
    }

    output
}
