use failure::{Backtrace, Context, Fail};
use std::fmt::{self, Display};

#[derive(Debug)]
pub struct Error {
    inner: Context<ErrorKind>,
}

#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum ErrorKind {
    #[fail(display = "{}", _0)]
    Parse(String),
    #[fail(display = "{}", _0)]
    Codegen(String),
    #[fail(display = "{}", _0)]
    Exec(String),
    #[fail(display = "I/O error")]
    Io,
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.inner.get_context()
    }

    pub(crate) fn parse<S: Into<String>>(msg: S) -> Error {
        Error::from(ErrorKind::Parse(msg.into()))
    }

    pub(crate) fn codegen<S: Into<String>>(msg: S) -> Error {
        Error::from(ErrorKind::Codegen(msg.into()))
    }

    pub(crate) fn exec<S: Into<String>>(msg: S) -> Error {
        Error::from(ErrorKind::Exec(msg.into()))
    }
}

impl Fail for Error {
    fn cause(&self) -> Option<&dyn Fail> {
        self.inner.cause()
    }

    fn backtrace(&self) -> Option<&Backtrace> {
        self.inner.backtrace()
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(&self.inner, f)
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error {
            inner: Context::new(kind),
        }
    }
}

impl From<Context<ErrorKind>> for Error {
    fn from(inner: Context<ErrorKind>) -> Error {
        Error { inner }
    }
}
