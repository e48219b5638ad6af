//! Console line scraping.
//!
//! The Bedrock server reports player activity only as free-text log lines,
//! so the roster is derived by pattern-matching each complete line. The
//! matching rules live behind [`LineMatcher`] so they can be swapped or
//! tested independently of the supervisor's state machine; the log format is
//! effectively a versioned contract with the upstream binary.

/// A structured event recovered from one console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleEvent {
    Joined { name: String, xuid: String },
    Left { name: String, xuid: String },
    Ping { name: String, ping: u32 },
}

/// Strategy for turning one console line into at most one event.
///
/// Non-matching lines yield `None`; the caller still forwards them verbatim
/// as raw output.
pub trait LineMatcher: Send + Sync {
    fn parse(&self, line: &str) -> Option<ConsoleEvent>;
}

/// Matcher for the Bedrock dedicated server log format:
///
/// ```text
/// [2024-01-01 12:00:00 INFO] Player connected: Steve, xuid: 2535412345678901
/// [2024-01-01 12:05:00 INFO] Player disconnected: Steve, xuid: 2535412345678901
/// Player Ping: Steve, 42
/// ```
///
/// Matching is case-insensitive; join, leave, ping are tried in that order
/// and the first match wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct BedrockLineMatcher;

const JOIN_MARKER: &str = "player connected:";
const LEAVE_MARKER: &str = "player disconnected:";
const PING_MARKER: &str = "player ping:";

impl LineMatcher for BedrockLineMatcher {
    fn parse(&self, line: &str) -> Option<ConsoleEvent> {
        // ASCII lowercasing keeps byte offsets aligned with the original.
        let lower = line.to_ascii_lowercase();

        if let Some(rest) = after_marker(line, &lower, JOIN_MARKER)
            && let Some((name, xuid)) = parse_name_and_xuid(rest)
        {
            return Some(ConsoleEvent::Joined { name, xuid });
        }

        if let Some(rest) = after_marker(line, &lower, LEAVE_MARKER)
            && let Some((name, xuid)) = parse_name_and_xuid(rest)
        {
            return Some(ConsoleEvent::Left { name, xuid });
        }

        if let Some(rest) = after_marker(line, &lower, PING_MARKER)
            && let Some((name, ping)) = parse_name_and_ping(rest)
        {
            return Some(ConsoleEvent::Ping { name, ping });
        }

        None
    }
}

fn after_marker<'a>(line: &'a str, lower: &str, marker: &str) -> Option<&'a str> {
    let at = lower.find(marker)?;
    Some(&line[at + marker.len()..])
}

/// `<name>, xuid: <digits>` — name runs to the first comma.
fn parse_name_and_xuid(rest: &str) -> Option<(String, String)> {
    let (name_raw, tail) = rest.split_once(',')?;
    let tail_lower = tail.to_ascii_lowercase();
    let at = tail_lower.find("xuid:")?;
    let xuid = leading_digits(tail[at + "xuid:".len()..].trim_start())?;
    Some((sanitize_name(name_raw), xuid.to_string()))
}

/// `<name>, <digits>` — the ping line carries no xuid.
fn parse_name_and_ping(rest: &str) -> Option<(String, u32)> {
    let (name_raw, tail) = rest.split_once(',')?;
    let digits = leading_digits(tail.trim_start())?;
    let ping = digits.parse::<u32>().ok()?;
    Some((sanitize_name(name_raw), ping))
}

fn leading_digits(s: &str) -> Option<&str> {
    let end = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    if end == 0 { None } else { Some(&s[..end]) }
}

/// Strips Minecraft `§x` formatting pairs and non-printable control
/// characters from a display name, then trims surrounding whitespace.
pub fn sanitize_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '§' {
            // The formatting code consumes the following character too.
            chars.next();
            continue;
        }
        if c.is_control() {
            continue;
        }
        out.push(c);
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Option<ConsoleEvent> {
        BedrockLineMatcher.parse(line)
    }

    #[test]
    fn join_line_with_log_prefix() {
        let line = "[2024-01-01 12:00:00 INFO] Player connected: Steve, xuid: 2535412345678901";
        assert_eq!(
            parse(line),
            Some(ConsoleEvent::Joined {
                name: "Steve".to_string(),
                xuid: "2535412345678901".to_string(),
            })
        );
    }

    #[test]
    fn leave_line() {
        let line = "Player disconnected: Steve, xuid: 123";
        assert_eq!(
            parse(line),
            Some(ConsoleEvent::Left {
                name: "Steve".to_string(),
                xuid: "123".to_string(),
            })
        );
    }

    #[test]
    fn ping_line() {
        let line = "Player Ping: Steve, 42";
        assert_eq!(
            parse(line),
            Some(ConsoleEvent::Ping {
                name: "Steve".to_string(),
                ping: 42,
            })
        );
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert!(matches!(
            parse("PLAYER CONNECTED: alex, XUID: 99"),
            Some(ConsoleEvent::Joined { .. })
        ));
        assert!(matches!(
            parse("player ping: alex, 7"),
            Some(ConsoleEvent::Ping { .. })
        ));
    }

    #[test]
    fn name_with_spaces_is_trimmed() {
        let line = "Player connected:   Dark Lord 99  , xuid: 42";
        assert_eq!(
            parse(line),
            Some(ConsoleEvent::Joined {
                name: "Dark Lord 99".to_string(),
                xuid: "42".to_string(),
            })
        );
    }

    #[test]
    fn formatting_codes_are_stripped_from_names() {
        let line = "Player connected: §cRed§r Steve, xuid: 5";
        assert_eq!(
            parse(line),
            Some(ConsoleEvent::Joined {
                name: "Red Steve".to_string(),
                xuid: "5".to_string(),
            })
        );
    }

    #[test]
    fn non_numeric_xuid_does_not_match() {
        assert_eq!(parse("Player connected: Steve, xuid: abc"), None);
    }

    #[test]
    fn ping_without_number_does_not_match() {
        assert_eq!(parse("Player Ping: Steve, high"), None);
    }

    #[test]
    fn unrelated_lines_do_not_match() {
        assert_eq!(parse("Server started."), None);
        assert_eq!(parse("Version: 1.20.81.01"), None);
        assert_eq!(parse(""), None);
    }

    #[test]
    fn sanitize_drops_control_chars() {
        assert_eq!(sanitize_name("Ste\u{0007}ve\r"), "Steve");
        assert_eq!(sanitize_name("§l§4Boss"), "Boss");
    }
}
