// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// vCard codec errors.
#[non_exhaustive]
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Input did not contain a `BEGIN:VCARD` .. `END:VCARD` envelope.
    #[error("vCard missing BEGIN/END:VCARD envelope")]
    MissingEnvelope,

    /// Input contained more than one vCard.
    #[error("expected exactly one vCard, found {0}")]
    MultipleCards(usize),

    /// A content line had no property name or no `:` separator.
    #[error("malformed content-line: {0}")]
    MalformedContentLine(String),
}

/// Codec result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;
