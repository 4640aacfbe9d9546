use crate::error::{ParseError, ParseResult};

/// Hard cap on the length of a single wire line, newline included.
pub const MAX_LINE: usize = 1024;

/// The routing class of a command, taken from the first character of its
/// four character token.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum MsgType {
    /// `A` - broadcast to UDP-active peers.
    Active,
    /// `B` - broadcast to everyone.
    Broadcast,
    /// `C` - peer-to-peer side channel, never valid on hub ingress.
    Client,
    /// `D` - directed to a single peer, echoed back to the sender.
    Direct,
    /// `E` - directed to a single peer, no sender echo.
    DirectQuiet,
    /// `F` - feature-filtered broadcast.
    Feature,
    /// `H` - addressed to the hub itself.
    HubBound,
    /// `I` - originated by the hub; never valid from a peer.
    FromHub,
    /// `P` - broadcast to UDP-passive peers.
    Passive,
    /// `U` - UDP traffic, never valid on hub ingress.
    Udp,
}

impl MsgType {
    pub fn from_u8(letter: u8) -> Option<MsgType> {
        Some(match letter {
            b'A' => MsgType::Active,
            b'B' => MsgType::Broadcast,
            b'C' => MsgType::Client,
            b'D' => MsgType::Direct,
            b'E' => MsgType::DirectQuiet,
            b'F' => MsgType::Feature,
            b'H' => MsgType::HubBound,
            b'I' => MsgType::FromHub,
            b'P' => MsgType::Passive,
            b'U' => MsgType::Udp,
            _ => return None,
        })
    }

    pub fn as_char(self) -> char {
        match self {
            MsgType::Active => 'A',
            MsgType::Broadcast => 'B',
            MsgType::Client => 'C',
            MsgType::Direct => 'D',
            MsgType::DirectQuiet => 'E',
            MsgType::Feature => 'F',
            MsgType::HubBound => 'H',
            MsgType::FromHub => 'I',
            MsgType::Passive => 'P',
            MsgType::Udp => 'U',
        }
    }
}

/// Escape a token for the wire: space, newline and backslash have escaped
/// forms, everything else passes through.
pub fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + input.len() / 8);

    for symbol in input.chars() {
        match symbol {
            ' ' => out.push_str("\\s"),
            '\n' => out.push_str("\\n"),
            '\\' => out.push_str("\\\\"),
            _ => out.push(symbol),
        }
    }

    out
}

/// Invert `escape`. Unknown escape sequences and a trailing lone backslash
/// are parse errors.
pub fn unescape(input: &str) -> ParseResult<String> {
    let mut out = String::with_capacity(input.len());
    let mut symbols = input.chars();

    while let Some(symbol) = symbols.next() {
        if symbol != '\\' {
            out.push(symbol);
            continue;
        }

        match symbols.next() {
            Some('s') => out.push(' '),
            Some('n') => out.push('\n'),
            Some('\\') => out.push('\\'),
            _ => return Err(ParseError::BadEscape),
        }
    }

    Ok(out)
}

/// One parsed wire line. Keeps both the unescaped token vector and the
/// verbatim line (newline included) - routable traffic is forwarded byte
/// identically, while handlers and plugins work on the tokens.
#[derive(Debug, Clone)]
pub struct Command {
    kind: MsgType,
    tokens: Vec<String>,
    full: String,
}

impl Command {
    /// Parse a single line, without its trailing newline. Empty lines are
    /// keep-alives and must be filtered out before this point.
    pub fn parse(line: &str) -> ParseResult<Command> {
        let raw: Vec<&str> = line.split(' ').collect();
        let first = raw[0].as_bytes();

        if first.len() != 4 {
            return Err(ParseError::BadFourCc);
        }

        let kind = MsgType::from_u8(first[0]).ok_or(ParseError::BadFourCc)?;

        let mut tokens = Vec::with_capacity(raw.len());
        for token in raw {
            tokens.push(unescape(token)?);
        }

        let mut full = String::with_capacity(line.len() + 1);
        full.push_str(line);
        full.push('\n');

        Ok(Command { kind, tokens, full })
    }

    /// Build a command from already-unescaped tokens.
    pub fn from_tokens(tokens: Vec<String>) -> ParseResult<Command> {
        let first = tokens[0].as_bytes();

        if first.len() != 4 {
            return Err(ParseError::BadFourCc);
        }

        let kind = MsgType::from_u8(first[0]).ok_or(ParseError::BadFourCc)?;
        let full = assemble(&tokens);

        Ok(Command { kind, tokens, full })
    }

    #[inline]
    pub fn kind(&self) -> MsgType {
        self.kind
    }

    /// The three letter command code.
    #[inline]
    pub fn code(&self) -> &str {
        &self.tokens[0][1..]
    }

    #[inline]
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    #[inline]
    pub fn token(&self, index: usize) -> Option<&str> {
        self.tokens.get(index).map(|token| token.as_str())
    }

    /// The verbatim line, newline included.
    #[inline]
    pub fn full(&self) -> &str {
        &self.full
    }

    /// Mutable token access for plugin rewrites. `reassemble` must run
    /// afterwards for the change to reach the wire form.
    #[inline]
    pub fn tokens_mut(&mut self) -> &mut Vec<String> {
        &mut self.tokens
    }

    /// Recompute the wire form from the token vector.
    pub fn reassemble(&mut self) {
        self.full = assemble(&self.tokens);
    }
}

fn assemble(tokens: &[String]) -> String {
    let mut out = String::new();

    for (index, token) in tokens.iter().enumerate() {
        if index > 0 {
            out.push(' ');
        }
        out.push_str(&escape(token));
    }

    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_roundtrip() {
        let samples = ["", "plain", "two words", "tra\\iling", "multi\nline", "\\s"];

        for sample in &samples {
            assert_eq!(unescape(&escape(sample)).unwrap(), *sample);
        }
    }

    #[test]
    fn test_escape_forms() {
        assert_eq!(escape("Hi all"), "Hi\\sall");
        assert_eq!(escape("a\\b"), "a\\\\b");
        assert_eq!(escape("a\nb"), "a\\nb");
    }

    #[test]
    fn test_unescape_rejects_bad_sequences() {
        assert_eq!(unescape("a\\x"), Err(ParseError::BadEscape));
        assert_eq!(unescape("trailing\\"), Err(ParseError::BadEscape));
    }

    #[test]
    fn test_parse_basic() {
        let cmd = Command::parse("BMSG AAAA Hi\\sall").unwrap();

        assert_eq!(cmd.kind(), MsgType::Broadcast);
        assert_eq!(cmd.code(), "MSG");
        assert_eq!(cmd.token(1), Some("AAAA"));
        assert_eq!(cmd.token(2), Some("Hi all"));
        assert_eq!(cmd.full(), "BMSG AAAA Hi\\sall\n");
    }

    #[test]
    fn test_parse_keeps_unknown_codes() {
        let cmd = Command::parse("BXYZ AAAA data").unwrap();

        assert_eq!(cmd.kind(), MsgType::Broadcast);
        assert_eq!(cmd.code(), "XYZ");
    }

    #[test]
    fn test_parse_rejects_bad_first_token() {
        assert_eq!(Command::parse("MSG AAAA hi").err(), Some(ParseError::BadFourCc));
        assert_eq!(Command::parse("XMSG AAAA hi").err(), Some(ParseError::BadFourCc));
        assert_eq!(Command::parse("BMSGX AAAA hi").err(), Some(ParseError::BadFourCc));
    }

    #[test]
    fn test_parse_reassemble_roundtrip() {
        let lines = [
            "BMSG AAAA Hi\\sall",
            "DMSG AAAA AAAC hello",
            "BINF AAAA IDAAAAAAAAAAAAA NIAlice I4127.0.0.1",
            "FSCH AAAA +TIGR query",
        ];

        for line in &lines {
            let mut cmd = Command::parse(line).unwrap();
            cmd.reassemble();
            assert_eq!(cmd.full(), &format!("{}\n", line));
        }
    }

    #[test]
    fn test_modify_reassemble() {
        let mut cmd = Command::parse("BMSG AAAA Hi\\sall").unwrap();

        cmd.tokens_mut()[2] = "censored text".to_string();
        cmd.reassemble();

        assert_eq!(cmd.full(), "BMSG AAAA censored\\stext\n");
        assert_eq!(cmd.token(2), Some("censored text"));
    }
}
