use serde::de;
use crate::error::Result;

mod decoder;
mod access;

use decoder::Decoder;

// A single bencode token, byte strings borrow from the input.
#[derive(PartialEq, Eq, Debug)]
pub enum Token<'de> {
    Integer(i64),
    ByteString(&'de [u8]),
    List,
    Dictionary,
    End,
}

impl std::fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Integer(i) => write!(f, "integer {}", i),
            Token::ByteString(b) => write!(f, "byte string of length {}", b.len()),
            Token::List => write!(f, "list"),
            Token::Dictionary => write!(f, "dictionary"),
            Token::End => write!(f, "end marker"),
        }
    }
}

// Decodes exactly one value, the whole input must be consumed.
pub fn decode_bytes<'de, T>(b: &'de [u8]) -> Result<T>
    where T: de::Deserialize<'de>
{
    let mut decoder = Decoder::new(b);
    let value = T::deserialize(&mut decoder)?;
    decoder.finish()?;
    Ok(value)
}

pub fn decode_str<'de, T>(s: &'de str) -> Result<T>
    where T: de::Deserialize<'de>
{
    decode_bytes(s.as_bytes())
}
