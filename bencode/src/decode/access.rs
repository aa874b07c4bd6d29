use serde::de;
use crate::error::{Error, Result};
use super::{decoder::Decoder, Token};

// Walks the elements of a list or the entries of a dictionary.
pub struct Access<'a, 'de> {
    d:    &'a mut Decoder<'de>,
    done: bool,
}

impl<'a, 'de> Access<'a, 'de> {

    pub fn new(d: &'a mut Decoder<'de>) -> Self {
        Self { d, done: false }
    }

    // Returns true if the end marker was reached, otherwise leaves the token to be read.
    fn at_end(&mut self) -> Result<bool> {
        if self.done {
            return Ok(true);
        }
        match self.d.read_next()? {
            Token::End => {
                self.done = true;
                Ok(true)
            },
            t => {
                self.d.unread(t);
                Ok(false)
            },
        }
    }

    // Consumes the end marker if the visitor stopped before reaching it.
    pub fn finish(mut self) -> Result<()> {
        if self.at_end()? {
            Ok(())
        } else {
            let found = self.d.read_next()?;
            Err(Error::InvalidToken {
                expected: "end marker".to_string(),
                found: found.to_string(),
            })
        }
    }
}

impl<'de> de::SeqAccess<'de> for Access<'_, 'de> {

    type Error = Error;

    fn next_element_seed<T>(&mut self, seed: T) -> Result<Option<T::Value>>
        where T: de::DeserializeSeed<'de>
    {
        if self.at_end()? {
            return Ok(None);
        }
        seed.deserialize(&mut *self.d).map(Some)
    }
}

impl<'de> de::MapAccess<'de> for Access<'_, 'de> {

    type Error = Error;

    fn next_key_seed<K>(&mut self, seed: K) -> Result<Option<K::Value>>
        where K: de::DeserializeSeed<'de>
    {
        if self.at_end()? {
            return Ok(None);
        }
        // Dictionary keys must be byte strings.
        match self.d.read_next()? {
            t @ Token::ByteString(_) => {
                self.d.unread(t);
                seed.deserialize(&mut *self.d).map(Some)
            },
            t => Err(Error::InvalidToken {
                expected: "byte string key".to_string(),
                found: t.to_string(),
            }),
        }
    }

    fn next_value_seed<V>(&mut self, seed: V) -> Result<V::Value>
        where V: de::DeserializeSeed<'de>
    {
        seed.deserialize(&mut *self.d)
    }
}
