// Cadenza
// Copyright (c) 2024-2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `errors` module defines the common error type.

use std::error;
use std::fmt;
use std::result;

/// `Error` provides an enumeration of all possible errors reported by Cadenza.
#[derive(Debug)]
pub enum Error {
    /// A filter refused the offered input format.
    BadFormat(&'static str),
    /// The stream contained malformed data. Inside the streaming path these errors are counted
    /// and swallowed; they surface only from direct parser calls.
    DecodeError(&'static str),
    /// A default limit was reached while parsing the stream. Limits guard against malicious or
    /// heavily corrupted streams.
    LimitError(&'static str),
    /// A new filter could not be instantiated or opened during a filter-graph rebuild. Fatal:
    /// the graph must be closed and reopened.
    ChainRebuildError(&'static str),
    /// S/PDIF passthrough or encoding was rejected; the decode path is chosen instead.
    SpdifIneligible(&'static str),
    /// The downstream sink refused a negotiated format.
    SinkReject,
    /// An IO error occurred in an external byte source or sink.
    IoError(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::BadFormat(msg) => {
                write!(f, "unsupported format: {}", msg)
            }
            Error::DecodeError(msg) => {
                write!(f, "malformed stream: {}", msg)
            }
            Error::LimitError(constraint) => {
                write!(f, "limit reached: {}", constraint)
            }
            Error::ChainRebuildError(msg) => {
                write!(f, "chain rebuild failed: {}", msg)
            }
            Error::SpdifIneligible(reason) => {
                write!(f, "spdif output not eligible: {}", reason)
            }
            Error::SinkReject => {
                write!(f, "sink refused the negotiated format")
            }
            Error::IoError(ref err) => {
                write!(f, "io error: {}", err)
            }
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::IoError(ref err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}

pub type Result<T> = result::Result<T, Error>;

/// Convenience function to create a bad format error.
pub fn bad_format_error<T>(desc: &'static str) -> Result<T> {
    Err(Error::BadFormat(desc))
}

/// Convenience function to create a decode error.
pub fn decode_error<T>(desc: &'static str) -> Result<T> {
    Err(Error::DecodeError(desc))
}

/// Convenience function to create a limit error.
pub fn limit_error<T>(constraint: &'static str) -> Result<T> {
    Err(Error::LimitError(constraint))
}

/// Convenience function to create a chain rebuild error.
pub fn chain_rebuild_error<T>(desc: &'static str) -> Result<T> {
    Err(Error::ChainRebuildError(desc))
}
