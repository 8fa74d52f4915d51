//! Minimal IRC line parsing.
//!
//! Lines look like `[@tags ][:prefix ]COMMAND[ params...][ :trailing]`. Only
//! what the Twitch feed needs is extracted: the sender nick (from
//! `nick!user@host` prefixes), the command, middle params and the trailing
//! text.

/// One parsed IRC line, borrowing from the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcLine<'a> {
    pub nick: Option<&'a str>,
    pub command: &'a str,
    pub params: Vec<&'a str>,
    pub trailing: Option<&'a str>,
}

impl<'a> IrcLine<'a> {
    /// Parse a single line. Returns `None` for blank or prefix-only lines.
    pub fn parse(line: &'a str) -> Option<Self> {
        let mut rest = line.trim_end_matches(|c| c == '\r' || c == '\n');

        if rest.starts_with('@') {
            rest = rest.split_once(' ')?.1;
        }

        let mut nick = None;
        if let Some(stripped) = rest.strip_prefix(':') {
            let (prefix, tail) = stripped.split_once(' ')?;
            nick = prefix.split_once('!').map(|(n, _)| n);
            rest = tail;
        }

        let (head, trailing) = match rest.split_once(" :") {
            Some((head, trailing)) => (head, Some(trailing)),
            None => match rest.strip_prefix(':') {
                Some(trailing) => ("", Some(trailing)),
                None => (rest, None),
            },
        };

        let mut words = head.split(' ').filter(|w| !w.is_empty());
        let command = words.next()?;
        Some(Self {
            nick,
            command,
            params: words.collect(),
            trailing,
        })
    }
}
