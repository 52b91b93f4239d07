use std::fmt;
use std::io;
use std::path::PathBuf;
use std::result;

use thiserror::Error;

#[derive(Error, Debug)]
/// A custom crashsig error
pub enum Error {
    /// An IO based error
    IO(io::Error),
    /// Document exceeds the size bound for a single read
    TooLarge(PathBuf),
    /// No dialect marker found before end of input
    UnrecognizedFormat(PathBuf),
    /// Classifier matched a dialect no engine is registered for
    UnsupportedDialect(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::IO(ref err) => write!(f, "{err}"),
            Error::TooLarge(ref path) => {
                write!(f, "Document is too large to read: {}", path.display())
            }
            Error::UnrecognizedFormat(ref path) => {
                write!(f, "Unrecognized debugger output: {}", path.display())
            }
            Error::UnsupportedDialect(ref name) => {
                write!(f, "No engine registered for dialect: {name}")
            }
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IO(err)
    }
}

pub type Result<T> = result::Result<T, Error>;
