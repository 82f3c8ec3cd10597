//! Errors raised by group arithmetic and cryptop primitives.

/// Errors that the group layer and its cryptops can raise.
///
/// These map directly onto the `OutsideOfGroup` / `OutsideOfBatch` /
/// `SaltIncorrectLength` / `UserIdTooShort` error kinds used by callers
/// higher in the stack; this crate only ever produces the subset that
/// originates from arithmetic or encoding, not from round or phase state.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GroupError {
    /// An integer used as an operand was zero or `>= p`, i.e. not a member
    /// of `Z_p`.
    #[error("value is not a member of the group (zero or >= p)")]
    OutOfGroup,
    /// A byte slice did not decode to a group element `< p`.
    #[error("bytes do not decode to a group element")]
    OutsideOfGroup,
    /// A salt was not exactly 32 bytes.
    #[error("salt must be exactly 32 bytes, got {0}")]
    SaltIncorrectLength(usize),
    /// A user id was shorter than the canonical id length.
    #[error("user id too short: expected {expected}, got {actual}")]
    UserIdTooShort {
        /// Canonical id length.
        expected: usize,
        /// Length actually supplied.
        actual: usize,
    },
    /// A `rootCoprime` exponent was not coprime with `q`.
    #[error("exponent is not coprime with the group order")]
    ExponentNotCoprime,
}
