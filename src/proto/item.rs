use std::fmt::{Display, Formatter};

use crate::SvnInfoError;

/// Longest string token accepted from a peer.
pub(crate) const MAX_STRING_LEN: usize = 64 << 10;
const MAX_DEPTH: usize = 16;

#[derive(Clone, Debug, PartialEq, Eq)]
/// One token of the agent wire protocol.
///
/// The syntax is the one `svnserve` speaks: bare words, decimal numbers,
/// length-prefixed byte strings and parenthesized lists, each followed by
/// whitespace.
pub enum Item {
    /// A bare word such as `success` or a command name.
    Word(String),
    /// A decimal number.
    Number(u64),
    /// A length-prefixed byte string (may not be valid UTF-8).
    String(Vec<u8>),
    /// A parenthesized list.
    List(Vec<Item>),
}

impl Item {
    pub(crate) fn word(word: &str) -> Self {
        Item::Word(word.to_string())
    }

    pub(crate) fn string(s: impl Into<String>) -> Self {
        Item::String(s.into().into_bytes())
    }

    /// Returns the word, if this is one.
    pub fn as_word(&self) -> Option<&str> {
        match self {
            Item::Word(w) => Some(w),
            _ => None,
        }
    }

    /// Returns the number, if this is one.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Item::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the string if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Item::String(bytes) => std::str::from_utf8(bytes).ok(),
            _ => None,
        }
    }

    /// Returns the string with invalid UTF-8 replaced.
    pub fn to_lossy_string(&self) -> Option<String> {
        match self {
            Item::String(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
            Item::Word(w) => Some(w.clone()),
            _ => None,
        }
    }

    /// Returns the list elements, if this is a list.
    pub fn as_list(&self) -> Option<&[Item]> {
        match self {
            Item::List(items) => Some(items),
            _ => None,
        }
    }
}

impl Display for Item {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Item::Word(w) => write!(f, "{w}"),
            Item::Number(n) => write!(f, "{n}"),
            Item::String(s) => write!(f, "<{} bytes>", s.len()),
            Item::List(items) => write!(f, "({} items)", items.len()),
        }
    }
}

/// Appends `item` and a trailing space to `out`.
pub(crate) fn encode_item(item: &Item, out: &mut Vec<u8>) {
    match item {
        Item::Word(w) => out.extend_from_slice(w.as_bytes()),
        Item::Number(n) => out.extend_from_slice(n.to_string().as_bytes()),
        Item::String(s) => {
            out.extend_from_slice(s.len().to_string().as_bytes());
            out.push(b':');
            out.extend_from_slice(s);
        }
        Item::List(items) => {
            out.extend_from_slice(b"( ");
            for item in items {
                encode_item(item, out);
            }
            out.push(b')');
        }
    }
    out.push(b' ');
}

/// Decodes one item from the front of `buf`.
///
/// Returns `Ok(None)` while `buf` holds only a prefix of an item, and the item
/// with the number of bytes it used once complete.
pub(crate) fn decode_item(buf: &[u8]) -> Result<Option<(Item, usize)>, SvnInfoError> {
    let mut decoder = Decoder { buf, pos: 0 };
    Ok(decoder.item(0)?.map(|item| (item, decoder.pos)))
}

struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl Decoder<'_> {
    fn item(&mut self, depth: usize) -> Result<Option<Item>, SvnInfoError> {
        while self.buf.get(self.pos).is_some_and(u8::is_ascii_whitespace) {
            self.pos += 1;
        }
        match self.buf.get(self.pos) {
            None => Ok(None),
            Some(b'(') => self.list(depth),
            Some(b')') => Err(protocol("unexpected ')'")),
            Some(b'0'..=b'9') => self.number_or_string(),
            Some(_) => self.word(),
        }
    }

    fn list(&mut self, depth: usize) -> Result<Option<Item>, SvnInfoError> {
        if depth >= MAX_DEPTH {
            return Err(protocol("lists nested too deeply"));
        }
        self.pos += 1;
        if self.separator()?.is_none() {
            return Ok(None);
        }
        let mut items = Vec::new();
        loop {
            while self.buf.get(self.pos).is_some_and(u8::is_ascii_whitespace) {
                self.pos += 1;
            }
            match self.buf.get(self.pos) {
                None => return Ok(None),
                Some(b')') => {
                    self.pos += 1;
                    return Ok(self.separator()?.map(|()| Item::List(items)));
                }
                Some(_) => {
                    let Some(item) = self.item(depth + 1)? else {
                        return Ok(None);
                    };
                    items.push(item);
                }
            }
        }
    }

    fn number_or_string(&mut self) -> Result<Option<Item>, SvnInfoError> {
        let mut n = 0u64;
        loop {
            match self.buf.get(self.pos) {
                None => return Ok(None),
                Some(&b) if b.is_ascii_digit() => {
                    n = n
                        .checked_mul(10)
                        .and_then(|v| v.checked_add(u64::from(b - b'0')))
                        .ok_or_else(|| protocol("number overflow"))?;
                    self.pos += 1;
                }
                Some(b':') => break,
                Some(_) => return Ok(self.separator()?.map(|()| Item::Number(n))),
            }
        }

        self.pos += 1;
        let len = usize::try_from(n)
            .ok()
            .filter(|len| *len <= MAX_STRING_LEN)
            .ok_or_else(|| SvnInfoError::Protocol(format!("string of {n} bytes exceeds limit")))?;
        let Some(bytes) = self.buf.get(self.pos..self.pos + len) else {
            return Ok(None);
        };
        self.pos += len;
        Ok(self.separator()?.map(|()| Item::String(bytes.to_vec())))
    }

    fn word(&mut self) -> Result<Option<Item>, SvnInfoError> {
        let start = self.pos;
        loop {
            match self.buf.get(self.pos) {
                None => return Ok(None),
                Some(b) if b.is_ascii_whitespace() => break,
                Some(b'(' | b')' | b':') => return Err(protocol("invalid word token")),
                Some(_) => self.pos += 1,
            }
        }
        let word = std::str::from_utf8(&self.buf[start..self.pos])
            .map_err(|_| protocol("non-utf8 word"))?
            .to_string();
        self.pos += 1;
        Ok(Some(Item::Word(word)))
    }

    /// Consumes the whitespace every token ends with.
    fn separator(&mut self) -> Result<Option<()>, SvnInfoError> {
        match self.buf.get(self.pos) {
            None => Ok(None),
            Some(b) if b.is_ascii_whitespace() => {
                self.pos += 1;
                Ok(Some(()))
            }
            Some(_) => Err(protocol("expected whitespace")),
        }
    }
}

fn protocol(message: &str) -> SvnInfoError {
    SvnInfoError::Protocol(message.to_string())
}
