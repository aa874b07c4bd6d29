use std::fmt::Display;

pub type Result<T> = std::result::Result<T, Error>;

// Errors specific to bencoding on top of those present in serde.
#[derive(Debug, thiserror::Error)]
pub enum Error {

    // Attempted to (de)serialize a type bencode cannot represent.
    #[error("invalid type: {0}")]
    InvalidType(String),

    // Type valid but unexpected token.
    #[error("invalid token: expected {expected}, found {found}")]
    InvalidToken {
        expected: String,
        found: String,
    },

    #[error("invalid integer: {0:?}")]
    InvalidInteger(String),

    #[error("map serialization error: {0}")]
    MapSerializationOrder(String),

    #[error("{0} trailing bytes after value")]
    TrailingData(usize),

    #[error("{0}")]
    Custom(String),

    #[error("unexpected end of input")]
    EOF,

}

impl serde::ser::Error for Error {
    fn custom<T>(msg: T) -> Self where T: Display {
        Error::Custom(msg.to_string())
    }
}

impl serde::de::Error for Error {
    fn custom<T>(msg: T) -> Self where T: Display {
        Error::Custom(msg.to_string())
    }
}
