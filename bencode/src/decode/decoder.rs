use serde::{
    de::{self, Deserializer, IntoDeserializer},
    forward_to_deserialize_any,
};
use crate::error::{Error, Result};
use super::{access::Access, Token};

pub struct Decoder<'de> {
    input:  &'de [u8],
    pos:    usize,
    peeked: Option<Token<'de>>,
}

impl<'de> Decoder<'de> {

    pub fn new(input: &'de [u8]) -> Self {
        Self { input, pos: 0, peeked: None }
    }

    // Puts a token back so the next read returns it again.
    pub fn unread(&mut self, token: Token<'de>) {
        debug_assert!(self.peeked.is_none());
        self.peeked = Some(token);
    }

    // Errors if anything is left after the top level value.
    pub fn finish(&self) -> Result<()> {
        if self.peeked.is_some() || self.pos < self.input.len() {
            return Err(Error::TrailingData(self.input.len() - self.pos));
        }
        Ok(())
    }

    pub fn read_next(&mut self) -> Result<Token<'de>> {
        if let Some(token) = self.peeked.take() {
            return Ok(token);
        }

        let first = *self.input.get(self.pos).ok_or(Error::EOF)?;
        self.pos += 1;

        match first {
            b'i' => Ok(Token::Integer(self.read_integer()?)),
            b'0'..=b'9' => {
                // Length prefix starts at the byte just consumed.
                self.pos -= 1;
                Ok(Token::ByteString(self.read_byte_string()?))
            },
            b'l' => Ok(Token::List),
            b'd' => Ok(Token::Dictionary),
            b'e' => Ok(Token::End),
            b => Err(Error::InvalidToken {
                expected: "a bencode value".to_string(),
                found: format!("{:?}", b as char),
            }),
        }
    }

    // Reads up to and consuming the delimiter, returns the bytes before it.
    fn read_until(&mut self, delim: u8) -> Result<&'de [u8]> {
        let rest = &self.input[self.pos..];
        let end = rest.iter().position(|&b| b == delim).ok_or(Error::EOF)?;
        self.pos += end + 1;
        Ok(&rest[..end])
    }

    // i<base ten ascii>e, an optional leading minus and no sign on zero.
    fn read_integer(&mut self) -> Result<i64> {
        let raw = self.read_until(b'e')?;
        let digits = raw.strip_prefix(b"-").unwrap_or(raw);
        let text = String::from_utf8_lossy(raw);

        if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) || raw == b"-0" {
            return Err(Error::InvalidInteger(text.into_owned()));
        }
        text.parse().map_err(|_| Error::InvalidInteger(text.into_owned()))
    }

    // <length>:<contents>
    fn read_byte_string(&mut self) -> Result<&'de [u8]> {
        let raw = self.read_until(b':')?;
        let len: usize = std::str::from_utf8(raw)
            .ok()
            .filter(|s| s.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| Error::InvalidInteger(String::from_utf8_lossy(raw).into_owned()))?;

        if self.input.len() - self.pos < len {
            return Err(Error::EOF);
        }
        let bytes = &self.input[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn read_byte_string_token(&mut self) -> Result<&'de [u8]> {
        match self.read_next()? {
            Token::ByteString(b) => Ok(b),
            t => Err(Error::InvalidToken {
                expected: "byte string".to_string(),
                found: t.to_string(),
            }),
        }
    }

    fn read_str(&mut self) -> Result<&'de str> {
        let b = self.read_byte_string_token()?;
        std::str::from_utf8(b).map_err(|e| Error::Custom(format!("invalid utf-8 string: {}", e)))
    }

    fn visit_list<V: de::Visitor<'de>>(&mut self, visitor: V) -> Result<V::Value> {
        let mut access = Access::new(self);
        let value = visitor.visit_seq(&mut access)?;
        access.finish()?;
        Ok(value)
    }

    fn visit_dict<V: de::Visitor<'de>>(&mut self, visitor: V) -> Result<V::Value> {
        let mut access = Access::new(self);
        let value = visitor.visit_map(&mut access)?;
        access.finish()?;
        Ok(value)
    }
}

impl<'de, 'a> Deserializer<'de> for &'a mut Decoder<'de> {

    type Error = Error;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value>
        where V: de::Visitor<'de>
    {
        match self.read_next()? {
            Token::Integer(i) => visitor.visit_i64(i),
            Token::ByteString(b) => visitor.visit_borrowed_bytes(b),
            Token::List => self.visit_list(visitor),
            Token::Dictionary => self.visit_dict(visitor),
            Token::End => Err(Error::InvalidToken {
                expected: "a bencode value".to_string(),
                found: Token::End.to_string(),
            }),
        }
    }

    forward_to_deserialize_any! {
        char
        i8 i16 i32 i64
        u8 u16 u32 u64
        f32 f64
        unit bytes byte_buf
        seq map unit_struct tuple tuple_struct
        ignored_any struct
    }

    // Bencode has no booleans, the usual convention is i0e/i1e.
    fn deserialize_bool<V>(self, visitor: V) -> Result<V::Value>
        where V: de::Visitor<'de>
    {
        match self.read_next()? {
            Token::Integer(0) => visitor.visit_bool(false),
            Token::Integer(1) => visitor.visit_bool(true),
            t => Err(Error::InvalidType(format!("expected 0 or 1 for bool, found {}", t))),
        }
    }

    fn deserialize_str<V>(self, visitor: V) -> Result<V::Value>
        where V: de::Visitor<'de>
    {
        visitor.visit_borrowed_str(self.read_str()?)
    }

    fn deserialize_string<V>(self, visitor: V) -> Result<V::Value>
        where V: de::Visitor<'de>
    {
        self.deserialize_str(visitor)
    }

    fn deserialize_identifier<V>(self, visitor: V) -> Result<V::Value>
        where V: de::Visitor<'de>
    {
        self.deserialize_str(visitor)
    }

    // A present key is always Some, absent keys are handled by serde's defaults.
    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value>
        where V: de::Visitor<'de>
    {
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<V>(self, _name: &'static str, visitor: V) -> Result<V::Value>
        where V: de::Visitor<'de>
    {
        visitor.visit_newtype_struct(self)
    }

    // Only unit variants are supported, encoded as their name.
    fn deserialize_enum<V>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value>
        where V: de::Visitor<'de>
    {
        let variant: &'de str = self.read_str()?;
        visitor.visit_enum(variant.into_deserializer())
    }
}
