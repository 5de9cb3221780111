//! Classical wire-line parsing and numeric replies.
//!
//! The compatibility endpoint speaks a deliberately small subset of the
//! classical protocol: `PING`, `NICK`, `JOIN`, `LIST`, `PRIVMSG`, answered
//! with three-digit numerics and prefixed `PRIVMSG` echoes.

/// A parsed inbound wire line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireCommand {
    Ping {
        token: Option<String>,
    },
    Nick {
        nick: Option<String>,
    },
    Join {
        channel: Option<String>,
    },
    List,
    Privmsg {
        target: Option<String>,
        text: Option<String>,
    },
    /// Anything else; the verb is kept for the error reply.
    Unknown {
        verb: String,
    },
}

/// Numeric replies used by the compatibility endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Numeric {
    RplWelcome,
    RplList,
    RplListEnd,
    RplNamReply,
    RplEndOfNames,
    ErrNoSuchNick,
    ErrNoTextToSend,
    ErrErroneousNickname,
    ErrNicknameInUse,
    ErrNeedMoreParams,
}

impl Numeric {
    /// The three-digit code.
    pub fn code(self) -> u16 {
        match self {
            Self::RplWelcome => 1,
            Self::RplList => 322,
            Self::RplListEnd => 323,
            Self::RplNamReply => 353,
            Self::RplEndOfNames => 366,
            Self::ErrNoSuchNick => 401,
            Self::ErrNoTextToSend => 412,
            Self::ErrErroneousNickname => 432,
            Self::ErrNicknameInUse => 433,
            Self::ErrNeedMoreParams => 461,
        }
    }
}

/// Parse one CR/LF-terminated line. Returns `None` for blank lines.
pub fn parse_line(line: &str) -> Option<WireCommand> {
    let line = line.trim_end_matches(['\r', '\n']).trim();
    if line.is_empty() {
        return None;
    }

    // Split off the trailing parameter first: everything after " :".
    let (head, trailing) = match line.split_once(" :") {
        Some((head, trailing)) => (head, Some(trailing.to_string())),
        None => (line, None),
    };

    let mut tokens = head.split_ascii_whitespace();
    let verb = tokens.next()?.to_ascii_uppercase();
    let first = tokens.next().map(|s| s.to_string());

    Some(match verb.as_str() {
        "PING" => WireCommand::Ping {
            token: first.or(trailing),
        },
        "NICK" => WireCommand::Nick {
            nick: first.or(trailing),
        },
        "JOIN" => WireCommand::Join {
            channel: first.or(trailing),
        },
        "LIST" => WireCommand::List,
        "PRIVMSG" => WireCommand::Privmsg {
            target: first,
            text: trailing,
        },
        _ => WireCommand::Unknown { verb },
    })
}

/// Format a numeric reply line, CR/LF-terminated.
///
/// `params` are middle parameters; `trailing` is appended after ` :`.
pub fn numeric(server: &str, num: Numeric, target: &str, params: &[&str], trailing: &str) -> String {
    let mut out = format!(":{} {:03} {}", server, num.code(), target);
    for p in params {
        out.push(' ');
        out.push_str(p);
    }
    out.push_str(" :");
    out.push_str(trailing);
    out.push_str("\r\n");
    out
}

/// Format a prefixed `PRIVMSG` line, CR/LF-terminated.
pub fn privmsg(from_nick: &str, target: &str, text: &str) -> String {
    format!(":{from_nick}!{from_nick}@ultra PRIVMSG {target} :{text}\r\n")
}

/// Format a `PONG` reply.
pub fn pong(server: &str, token: Option<&str>) -> String {
    match token {
        Some(token) => format!(":{server} PONG {server} :{token}\r\n"),
        None => format!(":{server} PONG {server}\r\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_verbs() {
        assert_eq!(
            parse_line("NICK Eve\r\n"),
            Some(WireCommand::Nick {
                nick: Some("Eve".into())
            })
        );
        assert_eq!(
            parse_line("JOIN #lobby"),
            Some(WireCommand::Join {
                channel: Some("#lobby".into())
            })
        );
        assert_eq!(parse_line("list"), Some(WireCommand::List));
        assert_eq!(parse_line("   "), None);
    }

    #[test]
    fn test_parse_privmsg_trailing() {
        assert_eq!(
            parse_line("PRIVMSG #lobby :hello world"),
            Some(WireCommand::Privmsg {
                target: Some("#lobby".into()),
                text: Some("hello world".into())
            })
        );
        assert_eq!(
            parse_line("PRIVMSG #lobby"),
            Some(WireCommand::Privmsg {
                target: Some("#lobby".into()),
                text: None
            })
        );
    }

    #[test]
    fn test_parse_ping_token_forms() {
        assert_eq!(
            parse_line("PING :tok"),
            Some(WireCommand::Ping {
                token: Some("tok".into())
            })
        );
        assert_eq!(
            parse_line("PING tok"),
            Some(WireCommand::Ping {
                token: Some("tok".into())
            })
        );
        assert_eq!(parse_line("PING"), Some(WireCommand::Ping { token: None }));
    }

    #[test]
    fn test_unknown_verb_kept() {
        assert_eq!(
            parse_line("WHOWAS Eve"),
            Some(WireCommand::Unknown {
                verb: "WHOWAS".into()
            })
        );
    }

    #[test]
    fn test_numeric_formatting() {
        let line = numeric(
            "ultra",
            Numeric::RplList,
            "Eve",
            &["#lobby", "3"],
            "general chat",
        );
        assert_eq!(line, ":ultra 322 Eve #lobby 3 :general chat\r\n");

        let line = numeric(
            "ultra",
            Numeric::ErrNicknameInUse,
            "*",
            &["Eve"],
            "Nickname is already in use",
        );
        assert!(line.starts_with(":ultra 433 * Eve :"));
    }

    #[test]
    fn test_privmsg_prefix() {
        let line = privmsg("Eve", "#lobby", "hi");
        assert_eq!(line, ":Eve!Eve@ultra PRIVMSG #lobby :hi\r\n");
    }
}
