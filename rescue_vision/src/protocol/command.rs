// THEORY:
// The wire protocol is a handful of bracketed ASCII tokens. Inbound data is matched
// by substring, so a token surrounded by line noise or a trailing newline still
// counts.
//
// Inbound bytes are framed by `CommandBuffer`: each call takes everything up to
// and including the first `]`, so back-to-back commands are served one per tick,
// in arrival order, instead of being merged. Within one frame the token
// precedence below decides. Bytes after the frame wait for the next tick.
//
// Every reply is itself bracketed: a comma-joined list of integers, or the literal
// `OK` / `NO` for the catch check. "Nothing found" is the zero-vector of the
// expected arity, never an empty write.

use std::fmt;

/// The closed set of inbound commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Command {
    FindTeamColor,
    FindBall,
    /// Is a ball sitting in the sleeve? The token's spelling is fixed by the controller firmware.
    CheckBall,
    FindPlace,
    /// Data arrived but carried no known token.
    Unknown,
}

impl Command {
    /// Tokens in precedence order; the first one found in the buffer wins.
    const TOKENS: [(&'static str, Command); 4] = [
        ("[FindTeamColor]", Command::FindTeamColor),
        ("[FindBall]", Command::FindBall),
        ("[CheakBall]", Command::CheckBall),
        ("[FindPlace]", Command::FindPlace),
    ];

    pub fn decode(data: &str) -> Self {
        Self::TOKENS
            .iter()
            .find(|(token, _)| data.contains(token))
            .map(|&(_, command)| command)
            .unwrap_or(Command::Unknown)
    }

    /// Lossy UTF-8 decode followed by `decode`.
    pub fn decode_bytes(data: &[u8]) -> Self {
        Self::decode(&String::from_utf8_lossy(data))
    }

    pub fn name(self) -> &'static str {
        match self {
            Command::FindTeamColor => "FindTeamColor",
            Command::FindBall => "FindBall",
            Command::CheckBall => "CheakBall",
            Command::FindPlace => "FindPlace",
            Command::Unknown => "Unknown",
        }
    }
}

/// Carry-over of inbound bytes not yet served.
pub const MAX_PENDING_BYTES: usize = 256;

#[derive(Debug, Default)]
pub struct CommandBuffer {
    pending: Vec<u8>,
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends inbound bytes. Only the newest `MAX_PENDING_BYTES` are kept.
    pub fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        if self.pending.len() > MAX_PENDING_BYTES {
            let excess = self.pending.len() - MAX_PENDING_BYTES;
            self.pending.drain(..excess);
        }
        self.skip_whitespace();
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// True while the last `[` has no matching `]` yet.
    pub fn awaiting_close(&self) -> bool {
        match self.pending.iter().rposition(|&b| b == b'[') {
            Some(open) => !self.pending[open..].contains(&b']'),
            None => false,
        }
    }

    /// Takes the next frame: everything through the first `]`, or all of it when
    /// no `]` has arrived. `None` when nothing is pending.
    pub fn next_command(&mut self) -> Option<Command> {
        if self.pending.is_empty() {
            return None;
        }
        let end = self
            .pending
            .iter()
            .position(|&b| b == b']')
            .map_or(self.pending.len(), |close| close + 1);
        let frame: Vec<u8> = self.pending.drain(..end).collect();
        self.skip_whitespace();
        Some(Command::decode_bytes(&frame))
    }

    fn skip_whitespace(&mut self) {
        let start = self
            .pending
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(self.pending.len());
        self.pending.drain(..start);
    }
}

/// An outbound reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Values(Vec<i64>),
    Ok,
    No,
}

impl Reply {
    pub fn zero(arity: usize) -> Self {
        Reply::Values(vec![0; arity])
    }

    pub fn caught(caught: bool) -> Self {
        if caught { Reply::Ok } else { Reply::No }
    }

    pub fn encode(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Values(values) => {
                let joined: Vec<String> = values.iter().map(i64::to_string).collect();
                write!(f, "[{}]", joined.join(","))
            }
            Reply::Ok => f.write_str("[OK]"),
            Reply::No => f.write_str("[NO]"),
        }
    }
}
