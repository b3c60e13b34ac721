//! Error handling and C-ABI error codes for termtrack

use std::cell::RefCell;
use std::fmt;
use std::os::raw::c_char;

/// Internal error type of the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The hardware address is not in the table.
    NotFound,
    /// Every record slot is live; the insert was dropped.
    CapacityExceeded,
    ZeroCapacity,
    /// An administrative command failed to parse.
    Malformed(String),
    InvalidConfig(String),
    /// No tokio runtime was available to drive expiry timers.
    NoRuntime,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound => f.write_str("terminal not found"),
            Error::CapacityExceeded => f.write_str("terminal pool exhausted"),
            Error::ZeroCapacity => f.write_str("zero capacity"),
            Error::Malformed(msg) => write!(f, "malformed command: {msg}"),
            Error::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Error::NoRuntime => f.write_str("no tokio runtime available for expiry timers"),
        }
    }
}

impl std::error::Error for Error {}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorCode {
    Success = 0,
    CapacityExceeded = 1,
    ZeroCapacity = 2,
    InvalidMac = 3,
    InvalidHandle = 4,
    NotFound = 5,
    InvalidConfig = 6,
    RuntimeFailed = 7,
    BufferTooSmall = 8,
    Unknown = 255,
}

impl ErrorCode {
    /// NUL-terminated so the same bytes can be handed across the ABI.
    pub fn as_cstr(self) -> &'static [u8] {
        match self {
            ErrorCode::Success => b"Success\0",
            ErrorCode::CapacityExceeded => b"Capacity exceeded\0",
            ErrorCode::ZeroCapacity => b"Zero capacity\0",
            ErrorCode::InvalidMac => b"Invalid hardware address\0",
            ErrorCode::InvalidHandle => b"Invalid handle\0",
            ErrorCode::NotFound => b"Not found\0",
            ErrorCode::InvalidConfig => b"Invalid configuration\0",
            ErrorCode::RuntimeFailed => b"Timer runtime failed to start\0",
            ErrorCode::BufferTooSmall => b"Buffer too small\0",
            ErrorCode::Unknown => b"Unknown error\0",
        }
    }

    pub fn as_str(self) -> &'static str {
        let bytes = self.as_cstr();
        // every literal above is ASCII
        std::str::from_utf8(&bytes[..bytes.len() - 1]).unwrap_or("Unknown error")
    }
}

// Thread-local last error for C-ABI
thread_local! {
    static LAST_ERROR: RefCell<ErrorCode> = const { RefCell::new(ErrorCode::Success) };
}

pub fn set_last_error(code: ErrorCode) {
    LAST_ERROR.with(|cell| *cell.borrow_mut() = code);
}

pub fn get_last_error() -> ErrorCode {
    LAST_ERROR.with(|cell| *cell.borrow())
}

#[no_mangle]
pub extern "C" fn term_last_error() -> ErrorCode {
    get_last_error()
}

#[no_mangle]
pub extern "C" fn term_strerror(code: ErrorCode) -> *const c_char {
    code.as_cstr().as_ptr() as *const c_char
}

// Map internal Error to ErrorCode
pub fn map_error(e: &Error) -> ErrorCode {
    match e {
        Error::NotFound => ErrorCode::NotFound,
        Error::CapacityExceeded => ErrorCode::CapacityExceeded,
        Error::ZeroCapacity => ErrorCode::ZeroCapacity,
        Error::Malformed(_) => ErrorCode::InvalidMac,
        Error::InvalidConfig(_) => ErrorCode::InvalidConfig,
        Error::NoRuntime => ErrorCode::RuntimeFailed,
    }
}
