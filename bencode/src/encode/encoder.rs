use serde::ser::{self, Impossible};
use crate::{Error, Result};
use super::map::SerializeMap;

#[derive(Default)]
pub struct Encoder(Vec<u8>);

impl Encoder {
    pub fn new() -> Self { Self::default() }

    pub fn push<T: AsRef<[u8]>>(&mut self, tokens: T) {
        self.0.extend_from_slice(tokens.as_ref());
    }

    pub fn into_buf(self) -> Vec<u8> { self.0 }
}

impl AsRef<[u8]> for Encoder {
    fn as_ref(&self) -> &[u8] { &self.0 }
}

impl<'a> ser::Serializer for &'a mut Encoder {

    type Ok     = ();
    type Error  = Error;

    type SerializeSeq           = Self;
    type SerializeTuple         = Self;
    type SerializeTupleStruct   = Self;
    type SerializeMap           = SerializeMap<'a>;
    type SerializeStruct        = SerializeMap<'a>;
    type SerializeTupleVariant  = Impossible<(), Error>;
    type SerializeStructVariant = Impossible<(), Error>;

    // i<base ten ascii>e, 42 -> i42e, -42 -> i-42e.
    fn serialize_i64(self, v: i64) -> Result<()> {
        self.push(format!("i{}e", v));
        Ok(())
    }

    fn serialize_u64(self, v: u64) -> Result<()> {
        self.push(format!("i{}e", v));
        Ok(())
    }

    fn serialize_bool(self, v: bool) -> Result<()> { self.serialize_i64(v as i64) }

    fn serialize_i8(self, v: i8) -> Result<()> { self.serialize_i64(v as i64) }

    fn serialize_i16(self, v: i16) -> Result<()> { self.serialize_i64(v as i64) }

    fn serialize_i32(self, v: i32) -> Result<()> { self.serialize_i64(v as i64) }

    fn serialize_u8(self, v: u8) -> Result<()> { self.serialize_u64(v as u64) }

    fn serialize_u16(self, v: u16) -> Result<()> { self.serialize_u64(v as u64) }

    fn serialize_u32(self, v: u32) -> Result<()> { self.serialize_u64(v as u64) }

    fn serialize_f32(self, _: f32) -> Result<()> {
        Err(Error::InvalidType("f32".to_string()))
    }

    fn serialize_f64(self, _: f64) -> Result<()> {
        Err(Error::InvalidType("f64".to_string()))
    }

    // <length>:<contents>, "spam" -> 4:spam.
    fn serialize_bytes(self, v: &[u8]) -> Result<()> {
        self.push(v.len().to_string());
        self.push(":");
        self.push(v);
        Ok(())
    }

    fn serialize_char(self, v: char) -> Result<()> {
        let mut buf = [0; 4];
        self.serialize_bytes(v.encode_utf8(&mut buf).as_bytes())
    }

    fn serialize_str(self, v: &str) -> Result<()> {
        self.serialize_bytes(v.as_bytes())
    }

    // Nothing is written for none, the enclosing dictionary drops the key.
    fn serialize_none(self) -> Result<()> { Ok(()) }

    fn serialize_some<T: ?Sized + ser::Serialize>(self, value: &T) -> Result<()> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<()> { Ok(()) }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<()> { Ok(()) }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<()> {
        self.serialize_str(variant)
    }

    fn serialize_newtype_struct<T: ?Sized + ser::Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<()> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + ser::Serialize>(
        self,
        name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _value: &T,
    ) -> Result<()> {
        Err(Error::InvalidType(format!("enum variant {}::{}", name, variant)))
    }

    // l<contents>e, ["spam", 42] -> l4:spami42ee.
    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq> {
        self.push("l");
        Ok(self)
    }

    fn serialize_tuple(self, len: usize) -> Result<Self::SerializeTuple> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleStruct> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        Err(Error::InvalidType(format!("enum variant {}::{}", name, variant)))
    }

    fn serialize_map(self, len: Option<usize>) -> Result<Self::SerializeMap> {
        Ok(SerializeMap::new(self, len.unwrap_or(0)))
    }

    fn serialize_struct(self, _name: &'static str, len: usize) -> Result<Self::SerializeStruct> {
        self.serialize_map(Some(len))
    }

    fn serialize_struct_variant(
        self,
        name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant> {
        Err(Error::InvalidType(format!("enum variant {}::{}", name, variant)))
    }
}

impl ser::SerializeSeq for &mut Encoder {

    type Ok = ();
    type Error = Error;

    fn serialize_element<T: ?Sized + ser::Serialize>(&mut self, value: &T) -> Result<()> {
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<()> {
        self.push("e");
        Ok(())
    }
}

impl ser::SerializeTuple for &mut Encoder {

    type Ok = ();
    type Error = Error;

    fn serialize_element<T: ?Sized + ser::Serialize>(&mut self, value: &T) -> Result<()> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<()> { ser::SerializeSeq::end(self) }
}

impl ser::SerializeTupleStruct for &mut Encoder {

    type Ok = ();
    type Error = Error;

    fn serialize_field<T: ?Sized + ser::Serialize>(&mut self, value: &T) -> Result<()> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<()> { ser::SerializeSeq::end(self) }
}
