//! Wire-level command framing: fixed four-byte header, declared payload
//! length, and the status-word trailer carried by every response.

use alloc::vec::Vec;
use core::fmt;

/// Class byte shared by every vault command.
pub const CLA_KEYCARD: u8 = 0x80;

/// Size in bytes of the fixed command header (CLA, INS, P1, P2).
pub const HEADER_SIZE: usize = 4;

/// Commands understood by the vault dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Instruction {
    Provision = 0x20,
    VerifyPin = 0x21,
    ChangePin = 0x22,
    ResetPin = 0x23,
    WipeCard = 0x24,
    SetMasterSecret = 0x30,
    GetMasterSecret = 0x31,
    DeleteMasterSecret = 0x32,
    CreateDataFiles = 0x40,
    WriteData = 0x41,
    ReadData = 0x42,
    DeleteDataFiles = 0x43,
    GetFileSizes = 0x44,
    GetFileName = 0x45,
}

impl TryFrom<u8> for Instruction {
    type Error = ApduError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x20 => Ok(Instruction::Provision),
            0x21 => Ok(Instruction::VerifyPin),
            0x22 => Ok(Instruction::ChangePin),
            0x23 => Ok(Instruction::ResetPin),
            0x24 => Ok(Instruction::WipeCard),
            0x30 => Ok(Instruction::SetMasterSecret),
            0x31 => Ok(Instruction::GetMasterSecret),
            0x32 => Ok(Instruction::DeleteMasterSecret),
            0x40 => Ok(Instruction::CreateDataFiles),
            0x41 => Ok(Instruction::WriteData),
            0x42 => Ok(Instruction::ReadData),
            0x43 => Ok(Instruction::DeleteDataFiles),
            0x44 => Ok(Instruction::GetFileSizes),
            0x45 => Ok(Instruction::GetFileName),
            other => Err(ApduError::UnknownInstruction(other)),
        }
    }
}

impl From<Instruction> for u8 {
    fn from(value: Instruction) -> Self {
        value as u8
    }
}

/// Errors that can occur while decoding a command buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApduError {
    /// Buffer is shorter than the fixed header.
    Truncated(usize),
    /// Declared payload length does not match the received bytes.
    LengthMismatch { declared: usize, actual: usize },
    /// Class byte outside the vault's class.
    UnsupportedClass(u8),
    /// Instruction byte outside the supported set.
    UnknownInstruction(u8),
}

impl ApduError {
    /// Status word reported for this decoding failure.
    pub const fn status(self) -> StatusWord {
        match self {
            ApduError::Truncated(_) | ApduError::LengthMismatch { .. } => StatusWord::WrongLength,
            ApduError::UnsupportedClass(_) => StatusWord::UnsupportedClass,
            ApduError::UnknownInstruction(_) => StatusWord::UnsupportedInstruction,
        }
    }
}

impl fmt::Display for ApduError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApduError::Truncated(len) => {
                write!(f, "buffer of {len} bytes cannot hold a command header")
            }
            ApduError::LengthMismatch { declared, actual } => {
                write!(f, "header declared {declared} payload bytes but {actual} arrived")
            }
            ApduError::UnsupportedClass(cla) => write!(f, "unsupported class byte 0x{cla:02X}"),
            ApduError::UnknownInstruction(ins) => write!(f, "unknown instruction 0x{ins:02X}"),
        }
    }
}

/// Command header and payload view over an inbound request buffer.
///
/// A four-byte buffer is a command without payload; otherwise byte 4
/// declares the payload length and must match the bytes that follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandApdu<'a> {
    pub ins: Instruction,
    pub p1: u8,
    pub p2: u8,
    pub data: &'a [u8],
}

impl<'a> CommandApdu<'a> {
    /// Decode a command from the raw request buffer.
    pub fn parse(buffer: &'a [u8]) -> Result<Self, ApduError> {
        if buffer.len() < HEADER_SIZE {
            return Err(ApduError::Truncated(buffer.len()));
        }
        if buffer[0] != CLA_KEYCARD {
            return Err(ApduError::UnsupportedClass(buffer[0]));
        }
        let ins = Instruction::try_from(buffer[1])?;
        let (p1, p2) = (buffer[2], buffer[3]);

        let data = if buffer.len() == HEADER_SIZE {
            &buffer[HEADER_SIZE..]
        } else {
            let declared = buffer[HEADER_SIZE] as usize;
            let actual = buffer.len() - HEADER_SIZE - 1;
            if declared != actual {
                return Err(ApduError::LengthMismatch { declared, actual });
            }
            &buffer[HEADER_SIZE + 1..]
        };

        Ok(Self { ins, p1, p2, data })
    }

    /// Encode the command into a request buffer.
    ///
    /// The payload must fit the single length byte (255 bytes).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(HEADER_SIZE + 1 + self.data.len());
        buffer.extend_from_slice(&[CLA_KEYCARD, self.ins.into(), self.p1, self.p2]);
        if !self.data.is_empty() {
            buffer.push(self.data.len() as u8);
            buffer.extend_from_slice(self.data);
        }
        buffer
    }
}

/// Status word trailing every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusWord {
    /// Command completed.
    Ok,
    /// PUK accepted without a replacement PIN (ResetPin probe form).
    PukConfirmed,
    /// Secret check failed; the low nibble carries the remaining attempts.
    AuthFailed(u8),
    /// Declared payload length outside the command's expectation.
    WrongLength,
    /// Addressing parameters outside the command's fixed set.
    BadParameters,
    /// Command not allowed in the current vault state.
    NotAllowed,
    /// Command requires a validated PIN.
    AuthRequired,
    /// Terminal state: both secrets exhausted, data purged.
    Locked,
    /// Addressed file does not exist.
    FileNotFound,
    /// Supplied range falls outside the addressed file.
    WrongData,
    /// Storage collaborator is out of capacity.
    StorageExhausted,
    /// Instruction byte not supported.
    UnsupportedInstruction,
    /// Class byte not supported.
    UnsupportedClass,
}

impl StatusWord {
    /// Encode the status word for the wire.
    pub const fn to_word(self) -> u16 {
        match self {
            StatusWord::Ok => 0x9000,
            StatusWord::PukConfirmed => 0x9090,
            StatusWord::AuthFailed(remaining) => 0x63C0 | (remaining & 0x0F) as u16,
            StatusWord::WrongLength => 0x6700,
            StatusWord::BadParameters => 0x6B00,
            StatusWord::NotAllowed => 0x6986,
            StatusWord::AuthRequired => 0x6982,
            StatusWord::Locked => 0x6250,
            StatusWord::FileNotFound => 0x6A82,
            StatusWord::WrongData => 0x6A80,
            StatusWord::StorageExhausted => 0x6A84,
            StatusWord::UnsupportedInstruction => 0x6D00,
            StatusWord::UnsupportedClass => 0x6E00,
        }
    }

    /// Decode a wire status word, if it belongs to the vault's vocabulary.
    pub const fn from_word(word: u16) -> Option<Self> {
        match word {
            0x9000 => Some(StatusWord::Ok),
            0x9090 => Some(StatusWord::PukConfirmed),
            0x6700 => Some(StatusWord::WrongLength),
            0x6B00 => Some(StatusWord::BadParameters),
            0x6986 => Some(StatusWord::NotAllowed),
            0x6982 => Some(StatusWord::AuthRequired),
            0x6250 => Some(StatusWord::Locked),
            0x6A82 => Some(StatusWord::FileNotFound),
            0x6A80 => Some(StatusWord::WrongData),
            0x6A84 => Some(StatusWord::StorageExhausted),
            0x6D00 => Some(StatusWord::UnsupportedInstruction),
            0x6E00 => Some(StatusWord::UnsupportedClass),
            word if word & 0xFFF0 == 0x63C0 => Some(StatusWord::AuthFailed((word & 0x0F) as u8)),
            _ => None,
        }
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusWord::Ok => f.write_str("ok"),
            StatusWord::PukConfirmed => f.write_str("PUK confirmed"),
            StatusWord::AuthFailed(remaining) => {
                write!(f, "authentication failed, {remaining} attempts remaining")
            }
            StatusWord::WrongLength => f.write_str("wrong payload length"),
            StatusWord::BadParameters => f.write_str("bad addressing parameters"),
            StatusWord::NotAllowed => f.write_str("command not allowed in this state"),
            StatusWord::AuthRequired => f.write_str("PIN verification required"),
            StatusWord::Locked => f.write_str("card terminally locked"),
            StatusWord::FileNotFound => f.write_str("file not found"),
            StatusWord::WrongData => f.write_str("range outside file"),
            StatusWord::StorageExhausted => f.write_str("storage exhausted"),
            StatusWord::UnsupportedInstruction => f.write_str("unsupported instruction"),
            StatusWord::UnsupportedClass => f.write_str("unsupported class"),
        }
    }
}

/// Response payload plus trailing status word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub data: Vec<u8>,
    pub status: StatusWord,
}

impl Response {
    /// Successful response carrying the given payload.
    pub fn success(data: Vec<u8>) -> Self {
        Self {
            data,
            status: StatusWord::Ok,
        }
    }

    /// Response carrying a status word and no payload.
    pub const fn status_only(status: StatusWord) -> Self {
        Self {
            data: Vec::new(),
            status,
        }
    }

    /// Encode the response for the wire: payload followed by SW1 SW2.
    pub fn into_bytes(self) -> Vec<u8> {
        let mut buffer = self.data;
        buffer.extend_from_slice(&self.status.to_word().to_be_bytes());
        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn parse_rejects_short_buffer() {
        let err = CommandApdu::parse(&[0x80, 0x21]).expect_err("expected error");
        assert_eq!(err, ApduError::Truncated(2));
        assert_eq!(err.status(), StatusWord::WrongLength);
    }

    #[test]
    fn parse_rejects_foreign_class() {
        let err = CommandApdu::parse(&[0x00, 0x21, 0x01, 0x00]).expect_err("expected error");
        assert_eq!(err, ApduError::UnsupportedClass(0x00));
        assert_eq!(err.status(), StatusWord::UnsupportedClass);
    }

    #[test]
    fn parse_rejects_unknown_instruction() {
        let err = CommandApdu::parse(&[0x80, 0x99, 0x00, 0x00]).expect_err("expected error");
        assert_eq!(err, ApduError::UnknownInstruction(0x99));
        assert_eq!(err.status(), StatusWord::UnsupportedInstruction);
    }

    #[test]
    fn parse_detects_length_mismatch() {
        let err =
            CommandApdu::parse(&[0x80, 0x21, 0x01, 0x00, 0x04, 0x31, 0x32]).expect_err("error");
        assert!(matches!(
            err,
            ApduError::LengthMismatch {
                declared: 4,
                actual: 2
            }
        ));
    }

    #[test]
    fn header_only_command_has_empty_payload() {
        let apdu = CommandApdu::parse(&[0x80, 0x44, 0x03, 0x04]).expect("parse");
        assert_eq!(apdu.ins, Instruction::GetFileSizes);
        assert!(apdu.data.is_empty());
    }

    #[test]
    fn explicit_zero_length_matches_header_only() {
        let apdu = CommandApdu::parse(&[0x80, 0x44, 0x03, 0x04, 0x00]).expect("parse");
        assert!(apdu.data.is_empty());
    }

    #[test]
    fn command_round_trip() {
        let apdu = CommandApdu {
            ins: Instruction::VerifyPin,
            p1: 0x01,
            p2: 0x00,
            data: b"1234",
        };
        let bytes = apdu.to_bytes();
        assert_eq!(bytes, vec![0x80, 0x21, 0x01, 0x00, 0x04, 0x31, 0x32, 0x33, 0x34]);
        let parsed = CommandApdu::parse(&bytes).expect("parse");
        assert_eq!(parsed, apdu);
    }

    #[test]
    fn status_words_match_wire_values() {
        assert_eq!(StatusWord::Ok.to_word(), 0x9000);
        assert_eq!(StatusWord::AuthFailed(2).to_word(), 0x63C2);
        assert_eq!(StatusWord::AuthFailed(0).to_word(), 0x63C0);
        assert_eq!(StatusWord::Locked.to_word(), 0x6250);
        assert_eq!(StatusWord::PukConfirmed.to_word(), 0x9090);
    }

    #[test]
    fn status_word_round_trip() {
        for status in [
            StatusWord::Ok,
            StatusWord::PukConfirmed,
            StatusWord::AuthFailed(3),
            StatusWord::WrongLength,
            StatusWord::BadParameters,
            StatusWord::NotAllowed,
            StatusWord::AuthRequired,
            StatusWord::Locked,
            StatusWord::FileNotFound,
            StatusWord::WrongData,
            StatusWord::StorageExhausted,
            StatusWord::UnsupportedInstruction,
            StatusWord::UnsupportedClass,
        ] {
            assert_eq!(StatusWord::from_word(status.to_word()), Some(status));
        }
        assert_eq!(StatusWord::from_word(0x1234), None);
    }

    #[test]
    fn response_appends_status_trailer() {
        let response = Response::success(vec![0xAB, 0xCD]);
        assert_eq!(response.into_bytes(), vec![0xAB, 0xCD, 0x90, 0x00]);

        let failure = Response::status_only(StatusWord::AuthFailed(1));
        assert_eq!(failure.into_bytes(), vec![0x63, 0xC1]);
    }
}
