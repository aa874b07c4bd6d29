use serde::ser;
use crate::{Error, Result};
use super::encoder::Encoder;

// d<contents>e, keys are byte strings in lexicographical order, so entries are
// buffered and sorted before anything is written.
// {"bar": "spam", "foo": 42} -> d3:bar4:spam3:fooi42ee.
pub struct SerializeMap<'a> {
    encoder:     &'a mut Encoder,
    entries:     Vec<(Vec<u8>, Vec<u8>)>,
    current_key: Option<Vec<u8>>,
}

impl<'a> SerializeMap<'a> {

    pub fn new(encoder: &'a mut Encoder, len: usize) -> Self {
        Self {
            encoder,
            entries: Vec::with_capacity(len),
            current_key: None,
        }
    }

    fn push_entry(&mut self, key: Vec<u8>, value: Vec<u8>) {
        // Empty output means the value was None.
        if !value.is_empty() {
            self.entries.push((key, value));
        }
    }

    fn finish(self) -> Result<()> {
        if self.current_key.is_some() {
            return Err(Error::MapSerializationOrder(
                "map ended while holding a key".to_string()
            ));
        }

        let mut entries = self.entries;
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        if entries.windows(2).any(|w| w[0].0 == w[1].0) {
            return Err(Error::MapSerializationOrder("duplicate key".to_string()));
        }

        self.encoder.push("d");
        for (k, v) in entries {
            ser::Serializer::serialize_bytes(&mut *self.encoder, &k)?;
            self.encoder.push(v);
        }
        self.encoder.push("e");
        Ok(())
    }
}

// Keys are encoded like any other value and must come out as a byte string,
// the length prefix is then stripped to leave the raw key.
fn encode_key<T: ?Sized + ser::Serialize>(key: &T) -> Result<Vec<u8>> {
    let raw = super::encode_to_raw(key)?;
    let colon = raw.iter().position(|&b| b == b':');
    match colon {
        Some(i) if i > 0 && raw[..i].iter().all(u8::is_ascii_digit) => Ok(raw[i + 1..].to_vec()),
        _ => Err(Error::InvalidType("map key must be a string or bytes".to_string())),
    }
}

impl ser::SerializeMap for SerializeMap<'_> {

    type Ok = ();
    type Error = Error;

    fn serialize_key<T: ?Sized + ser::Serialize>(&mut self, key: &T) -> Result<()> {
        if self.current_key.is_some() {
            return Err(Error::MapSerializationOrder(
                "consecutive keys without a value".to_string()
            ));
        }
        self.current_key = Some(encode_key(key)?);
        Ok(())
    }

    fn serialize_value<T: ?Sized + ser::Serialize>(&mut self, value: &T) -> Result<()> {
        let key = self.current_key.take().ok_or_else(|| {
            Error::MapSerializationOrder("value without a key".to_string())
        })?;
        let value = super::encode_to_raw(value)?;
        self.push_entry(key, value);
        Ok(())
    }

    fn end(self) -> Result<()> { self.finish() }
}

impl ser::SerializeStruct for SerializeMap<'_> {

    type Ok = ();
    type Error = Error;

    fn serialize_field<T: ?Sized + ser::Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<()> {
        let value = super::encode_to_raw(value)?;
        self.push_entry(key.as_bytes().to_vec(), value);
        Ok(())
    }

    fn end(self) -> Result<()> { self.finish() }
}
