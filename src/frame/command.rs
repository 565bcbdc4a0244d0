//! Main command byte of a frame.

/// Purpose of a frame, carried in its first byte.
///
/// Codes `0x08..=0x7F` are unassigned and decode as [`MainCommand::Unassigned`];
/// codes `0x80..=0xFF` are reserved for the application and decode as
/// [`MainCommand::Application`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum MainCommand {
    /// No command. Frames built with it carry only entries.
    None,
    /// Periodic, content-free liveness frame.
    Heartbeat,
    /// Reply refreshing liveness without changing the connected flag.
    Ack,
    /// Request for data from the peer.
    DataRequest,
    /// Data sent in reply to a request, or unsolicited telemetry.
    DataResponse,
    /// First leg of the pairing handshake.
    PairRequest,
    /// Second leg of the pairing handshake.
    PairResponse,
    /// Error report.
    Error,
    /// A code in the unassigned range `0x08..=0x7F`.
    Unassigned(u8),
    /// A code in the application range `0x80..=0xFF`.
    Application(u8),
}

impl MainCommand {
    /// First code of the application-reserved range.
    pub const APPLICATION_BASE: u8 = 0x80;

    /// The wire code of this command.
    pub const fn code(self) -> u8 {
        match self {
            MainCommand::None => 0x00,
            MainCommand::Heartbeat => 0x01,
            MainCommand::Ack => 0x02,
            MainCommand::DataRequest => 0x03,
            MainCommand::DataResponse => 0x04,
            MainCommand::PairRequest => 0x05,
            MainCommand::PairResponse => 0x06,
            MainCommand::Error => 0x07,
            MainCommand::Unassigned(code) | MainCommand::Application(code) => code,
        }
    }

    /// Whether the frame is a link-level liveness frame (heartbeat or ack).
    pub fn is_liveness(self) -> bool {
        matches!(self, MainCommand::Heartbeat | MainCommand::Ack)
    }
}

impl From<u8> for MainCommand {
    fn from(code: u8) -> Self {
        match code {
            0x00 => MainCommand::None,
            0x01 => MainCommand::Heartbeat,
            0x02 => MainCommand::Ack,
            0x03 => MainCommand::DataRequest,
            0x04 => MainCommand::DataResponse,
            0x05 => MainCommand::PairRequest,
            0x06 => MainCommand::PairResponse,
            0x07 => MainCommand::Error,
            c if c >= Self::APPLICATION_BASE => MainCommand::Application(c),
            c => MainCommand::Unassigned(c),
        }
    }
}

impl From<MainCommand> for u8 {
    fn from(cmd: MainCommand) -> Self {
        cmd.code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_code_maps_back_to_itself() {
        for code in 0..=u8::MAX {
            assert_eq!(MainCommand::from(code).code(), code);
        }
    }

    #[test]
    fn test_ranges() {
        assert_eq!(MainCommand::from(0x08), MainCommand::Unassigned(0x08));
        assert_eq!(MainCommand::from(0x7f), MainCommand::Unassigned(0x7f));
        assert_eq!(MainCommand::from(0x80), MainCommand::Application(0x80));
        assert_eq!(MainCommand::from(0xff), MainCommand::Application(0xff));
        assert!(MainCommand::Ack.is_liveness());
        assert!(!MainCommand::DataResponse.is_liveness());
    }
}
