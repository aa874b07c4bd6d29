use serde::ser;
use crate::{Error, Result};

mod encoder;
mod map;


pub use encoder::Encoder;

pub fn encode_to_raw<T: ?Sized + ser::Serialize>(v: &T) -> Result<Vec<u8>> {
    let mut encoder = Encoder::new();
    v.serialize(&mut encoder)?;
    Ok(encoder.into_buf())
}

pub fn encode_to_str<T: ?Sized + ser::Serialize>(v: &T) -> Result<String> {
    String::from_utf8(encode_to_raw(v)?)
        .map_err(|_| Error::Custom("invalid utf-8 string".to_string()))
}
