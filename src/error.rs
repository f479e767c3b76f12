use crate::utils::EscapedBytes;

/// String like type that occupies the same space as one usize
type TinyStr = Box<String>;

#[allow(missing_docs)]
#[derive(Debug, Display, Error)]
#[display("{:?}", self)]
#[non_exhaustive]
pub enum Error {
    Validation(#[error(not(source))] TinyStr),
    KeyTooLarge(#[error(not(source))] usize),
    ValueTooLarge(#[error(not(source))] usize),
    Corrupted(#[error(not(source))] TinyStr),
}

impl Error {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(Box::new(msg.into()))
    }

    pub(crate) fn corrupted_key(msg: &str, key: &[u8]) -> Self {
        Self::Corrupted(Box::new(format!("{msg}: {:?}", EscapedBytes(key))))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::validation(value.to_string())
    }
}

macro_rules! error_validation {
    ($($arg:tt)*) => {{
        let msg = ::std::fmt::format(::std::format_args!($($arg)*));
        crate::Error::Validation(msg.into())
    }}
}

macro_rules! error_corrupted {
    ($($arg:tt)*) => {{
        let msg = ::std::fmt::format(::std::format_args!($($arg)*));
        crate::Error::Corrupted(msg.into())
    }}
}

pub(crate) use error_corrupted;
pub(crate) use error_validation;
