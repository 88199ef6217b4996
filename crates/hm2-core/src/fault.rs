use thiserror::Error;

/// Error classes used to pick the statistics counter a dropped command bumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ErrorClass {
    /// Framing or command-field violation detected while parsing a payload.
    Parse,
    /// Access targeted an unsupported space, width or range.
    MemoryAccess,
    /// Write targeted read-only storage.
    Write,
}

/// Region registration failures, raised only during board bring-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum RegistrationError {
    /// The fixed-capacity region table has no free slot.
    #[error("region table is full ({capacity} regions)")]
    TableFull {
        /// Capacity of the table that rejected the registration.
        capacity: usize,
    },
}

/// Outcome of a routed bus access that did not complete through a handler.
///
/// [`BusError::Unmapped`] and [`BusError::NoHandler`] are not failures from
/// the caller's point of view: both mean the access falls through to the
/// register file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum BusError {
    /// No region fully contains the accessed range.
    #[error("address range is not owned by any region")]
    Unmapped,
    /// The owning region has no handler for this direction.
    #[error("owning region defines no handler for this access")]
    NoHandler,
    /// The owning region's handler refused the access.
    #[error("region handler rejected the access")]
    Rejected,
}

impl BusError {
    /// Returns `true` when the access should fall back to the register file.
    #[must_use]
    pub const fn falls_back(self) -> bool {
        matches!(self, Self::Unmapped | Self::NoHandler)
    }
}

/// Stable taxonomy for LBP16 commands dropped by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum ProtocolError {
    /// Transfer count field was zero.
    #[error("transfer count out of range")]
    InvalidTransferCount = 0x01,
    /// The payload ended before the command's declared geometry.
    #[error("payload truncated inside a command")]
    Truncated = 0x02,
    /// Memory space 1, 3 or 5 was addressed.
    #[error("unsupported memory space")]
    UnsupportedSpace = 0x03,
    /// Info-area access in reserved memory space 5.
    #[error("info area of reserved memory space")]
    ReservedInfoArea = 0x04,
    /// Info-area access with a unit size other than 16 bits.
    #[error("info area access must use 16-bit units")]
    InfoAreaWidth = 0x05,
    /// Access extends past the end of the addressed space.
    #[error("access outside memory space bounds")]
    OutOfRange = 0x06,
    /// A region handler refused the access.
    #[error("region handler rejected access")]
    HandlerRejected = 0x07,
    /// Reply data would not fit into a transport frame.
    #[error("reply exceeds transport frame size")]
    ReplyOverflow = 0x08,
    /// Write to a read-only space or info-area field.
    #[error("write to read-only storage")]
    ReadOnly = 0x09,
}

impl ProtocolError {
    /// Converts an error to its stable byte code.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Converts a stable byte code back into an error.
    #[must_use]
    pub const fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::InvalidTransferCount),
            0x02 => Some(Self::Truncated),
            0x03 => Some(Self::UnsupportedSpace),
            0x04 => Some(Self::ReservedInfoArea),
            0x05 => Some(Self::InfoAreaWidth),
            0x06 => Some(Self::OutOfRange),
            0x07 => Some(Self::HandlerRejected),
            0x08 => Some(Self::ReplyOverflow),
            0x09 => Some(Self::ReadOnly),
            _ => None,
        }
    }

    /// Returns the statistics class for this error.
    #[must_use]
    pub const fn class(self) -> ErrorClass {
        match self {
            Self::InvalidTransferCount | Self::Truncated => ErrorClass::Parse,
            Self::UnsupportedSpace
            | Self::ReservedInfoArea
            | Self::InfoAreaWidth
            | Self::OutOfRange
            | Self::HandlerRejected
            | Self::ReplyOverflow => ErrorClass::MemoryAccess,
            Self::ReadOnly => ErrorClass::Write,
        }
    }

    /// Errors after which the rest of the payload cannot be framed.
    #[must_use]
    pub const fn ends_payload(self) -> bool {
        matches!(self, Self::Truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::{BusError, ErrorClass, ProtocolError};

    #[test]
    fn stable_code_roundtrip_is_bijective_for_defined_values() {
        for code in 0x01u8..=0x09 {
            let error = ProtocolError::from_u8(code).expect("defined taxonomy code");
            assert_eq!(error.as_u8(), code);
        }
    }

    #[test]
    fn unknown_code_is_rejected() {
        assert!(ProtocolError::from_u8(0x00).is_none());
        assert!(ProtocolError::from_u8(0xFF).is_none());
    }

    #[test]
    fn class_mapping_matches_counter_layout() {
        assert_eq!(ProtocolError::InvalidTransferCount.class(), ErrorClass::Parse);
        assert_eq!(ProtocolError::Truncated.class(), ErrorClass::Parse);
        assert_eq!(
            ProtocolError::ReservedInfoArea.class(),
            ErrorClass::MemoryAccess
        );
        assert_eq!(ProtocolError::InfoAreaWidth.class(), ErrorClass::MemoryAccess);
        assert_eq!(ProtocolError::ReadOnly.class(), ErrorClass::Write);
    }

    #[test]
    fn only_truncation_ends_the_payload() {
        assert!(ProtocolError::Truncated.ends_payload());
        assert!(!ProtocolError::InvalidTransferCount.ends_payload());
        assert!(!ProtocolError::UnsupportedSpace.ends_payload());
    }

    #[test]
    fn unmapped_and_missing_handler_fall_back() {
        assert!(BusError::Unmapped.falls_back());
        assert!(BusError::NoHandler.falls_back());
        assert!(!BusError::Rejected.falls_back());
    }
}
