/* Copyright (C) 2024 Philipp Benner
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <http://www.gnu.org/licenses/>.
 */

use std::io;

use thiserror::Error;

/* -------------------------------------------------------------------------- */

/// Error kinds produced by the BBI reader/writer core.
///
/// Low-level codec and byte-source errors are wrapped with the file offset
/// they occurred at and propagated unchanged up to the query/import
/// boundary; the core never retries.
#[derive(Error, Debug)]
pub enum BbiError {
    #[error("I/O failure at offset {offset}: {source}")]
    IoFailure { offset: u64, #[source] source: io::Error },

    #[error("not a BigWig file (magic {0:#010x} not recognized)")]
    BadMagic(u32),

    #[error("malformed data block: {0}")]
    MalformedBlock(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("sequence `{0}` not found")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("operation attempted on a closed handle")]
    ClosedHandle,
}

/* -------------------------------------------------------------------------- */

impl BbiError {
    /// Attach a file offset to an I/O failure that does not carry one yet.
    pub fn at_offset(self, offset: u64) -> Self {
        match self {
            BbiError::IoFailure { source, .. } => BbiError::IoFailure { offset, source },
            other => other,
        }
    }
}

/* -------------------------------------------------------------------------- */

impl From<io::Error> for BbiError {
    fn from(source: io::Error) -> Self {
        BbiError::IoFailure { offset: 0, source }
    }
}

/* -------------------------------------------------------------------------- */

pub type Result<T> = std::result::Result<T, BbiError>;
