//! Channel mode flags.

use serde::{Deserialize, Serialize};

/// A channel mode flag, drawn from the classical set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChannelMode {
    /// `+i` - invite only.
    #[serde(rename = "+i")]
    InviteOnly,
    /// `+m` - moderated (only VOICE and above may speak).
    #[serde(rename = "+m")]
    Moderated,
    /// `+n` - no external messages.
    #[serde(rename = "+n")]
    NoExternalMessages,
    /// `+t` - topic settable by OP and above only.
    #[serde(rename = "+t")]
    TopicLocked,
    /// `+k` - key required to join.
    #[serde(rename = "+k")]
    Keyed,
    /// `+l` - member limit in effect.
    #[serde(rename = "+l")]
    Limited,
}

impl ChannelMode {
    /// The flag spelling with its sign, e.g. `+i`.
    pub fn flag(self) -> &'static str {
        match self {
            Self::InviteOnly => "+i",
            Self::Moderated => "+m",
            Self::NoExternalMessages => "+n",
            Self::TopicLocked => "+t",
            Self::Keyed => "+k",
            Self::Limited => "+l",
        }
    }

    /// Parse a flag from user input; accepts both `+i` and bare `i`.
    pub fn from_flag(input: &str) -> Option<Self> {
        let letter = input.strip_prefix('+').unwrap_or(input);
        match letter {
            "i" => Some(Self::InviteOnly),
            "m" => Some(Self::Moderated),
            "n" => Some(Self::NoExternalMessages),
            "t" => Some(Self::TopicLocked),
            "k" => Some(Self::Keyed),
            "l" => Some(Self::Limited),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChannelMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.flag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_roundtrip() {
        for mode in [
            ChannelMode::InviteOnly,
            ChannelMode::Moderated,
            ChannelMode::NoExternalMessages,
            ChannelMode::TopicLocked,
            ChannelMode::Keyed,
            ChannelMode::Limited,
        ] {
            assert_eq!(ChannelMode::from_flag(mode.flag()), Some(mode));
        }
    }

    #[test]
    fn test_bare_letter_accepted() {
        assert_eq!(ChannelMode::from_flag("m"), Some(ChannelMode::Moderated));
        assert_eq!(ChannelMode::from_flag("x"), None);
    }

    #[test]
    fn test_serde_spelling() {
        assert_eq!(
            serde_json::to_string(&ChannelMode::InviteOnly).unwrap(),
            "\"+i\""
        );
        let m: ChannelMode = serde_json::from_str("\"+l\"").unwrap();
        assert_eq!(m, ChannelMode::Limited);
    }
}
