pub const FRAME_END_BYTE: u8 = 0xCE;
pub const FRAME_METHOD: u8 = 1;
pub const FRAME_CONTENT_HEADER: u8 = 2;
pub const FRAME_CONTENT_BODY: u8 = 3;
pub const FRAME_HEARTBEAT: u8 = 8;

/// type (1) + channel (2) + size (4)
pub const FRAME_HEADER_SIZE: usize = 7;
/// Header plus the trailing end octet.
pub const FRAME_OVERHEAD: u32 = FRAME_HEADER_SIZE as u32 + 1;
/// Peers must accept frames of this size before tuning.
pub const FRAME_MIN_SIZE: u32 = 4096;

/// Deepest run of tables and arrays inside one another that a decoder accepts.
pub const MAX_FIELD_NESTING: usize = 64;

pub const CONNECTION_CHANNEL: u16 = 0;

pub const CONNECTION_CLASS: u16 = 10;
pub const CONNECTION_START: u16 = 10;
pub const CONNECTION_START_OK: u16 = 11;
pub const CONNECTION_TUNE: u16 = 30;
pub const CONNECTION_TUNE_OK: u16 = 31;
pub const CONNECTION_OPEN: u16 = 40;
pub const CONNECTION_OPEN_OK: u16 = 41;

pub const CHANNEL_CLASS: u16 = 20;
pub const EXCHANGE_CLASS: u16 = 40;
pub const QUEUE_CLASS: u16 = 50;
pub const BASIC_CLASS: u16 = 60;
pub const CONFIRM_CLASS: u16 = 85;
pub const TX_CLASS: u16 = 90;

pub const MECHANISMS: &str = "PLAIN";
pub const LOCALES: &str = "en_US";

/// Wire name of an AMQP 0-9-1 class, if the class exists in that version.
pub fn class_name(class_id: u16) -> Option<&'static str> {
    match class_id {
        CONNECTION_CLASS => Some("connection"),
        CHANNEL_CLASS => Some("channel"),
        EXCHANGE_CLASS => Some("exchange"),
        QUEUE_CLASS => Some("queue"),
        BASIC_CLASS => Some("basic"),
        CONFIRM_CLASS => Some("confirm"),
        TX_CLASS => Some("tx"),
        _ => None,
    }
}

/// Protocol version spoken by the handshake. The protocol header is derived
/// from it so a second version only needs another constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
    pub revision: u8,
}

impl ProtocolVersion {
    pub const fn header(&self) -> [u8; 8] {
        [b'A', b'M', b'Q', b'P', 0, self.major, self.minor, self.revision]
    }
}

pub const AMQP_0_9_1: ProtocolVersion = ProtocolVersion {
    major: 0,
    minor: 9,
    revision: 1,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_header_matches_0_9_1() {
        assert_eq!(&AMQP_0_9_1.header(), b"AMQP\x00\x00\x09\x01");
    }

    #[test]
    fn class_names_cover_known_classes_only() {
        assert_eq!(class_name(QUEUE_CLASS), Some("queue"));
        assert_eq!(class_name(TX_CLASS), Some("tx"));
        assert_eq!(class_name(99), None);
    }
}
