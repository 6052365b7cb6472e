//! Well-known channel identifiers.
//!
//! A channel id encodes direction (C2D/D2C), acknowledgement mode and
//! medium in a single byte. IP links use the full 256-id space; BLE links
//! use a compressed 32-id space. Both peers derive ACK channel ids
//! independently, so the offsets below must never change.

/// Reserved id meaning "no channel".
pub const INVALID: u8 = 255;

/// Link-health probe, controller to drone.
pub const PING: u8 = 0;
/// Link-health probe reply, drone to controller.
pub const PONG: u8 = 1;

/// Controller-to-drone command, no acknowledgement.
pub const C2D_CMD_NOACK: u8 = 10;
/// Controller-to-drone command, acknowledged.
pub const C2D_CMD_WITHACK: u8 = 11;
/// Controller-to-drone command, high priority.
pub const C2D_CMD_HIGHPRIO: u8 = 12;

/// Drone-to-controller command, no acknowledgement.
pub const D2C_CMD_NOACK: u8 = 127;
/// Drone-to-controller command, acknowledged.
pub const D2C_CMD_WITHACK: u8 = 126;

/// Drone-to-controller command over BLE, no acknowledgement.
pub const D2C_CMD_NOACK_BLE: u8 = 15;
/// Drone-to-controller command over BLE, acknowledged.
pub const D2C_CMD_WITHACK_BLE: u8 = 14;

/// ACK id offset on IP links: half of the 256-wide id space.
pub const ACK_OFFSET: u8 = 128;
/// ACK id offset on BLE links: half of the 32-wide id space.
pub const ACK_OFFSET_BLE: u8 = 16;

/// ACK channel for [`D2C_CMD_WITHACK`], sent controller to drone.
pub const C2D_CMD_ACK: u8 = D2C_CMD_WITHACK + ACK_OFFSET;
/// ACK channel for [`C2D_CMD_WITHACK`], sent drone to controller.
pub const D2C_CMD_ACK: u8 = C2D_CMD_WITHACK + ACK_OFFSET;
/// ACK channel for [`C2D_CMD_HIGHPRIO`], sent drone to controller.
pub const D2C_CMD_HIGHPRIO_ACK: u8 = C2D_CMD_HIGHPRIO + ACK_OFFSET;
/// ACK channel for [`D2C_CMD_WITHACK_BLE`], sent controller to drone.
pub const C2D_CMD_ACK_BLE: u8 = D2C_CMD_WITHACK_BLE + ACK_OFFSET_BLE;
/// ACK channel for [`C2D_CMD_WITHACK`] on BLE, sent drone to controller.
pub const D2C_CMD_ACK_BLE: u8 = C2D_CMD_WITHACK + ACK_OFFSET_BLE;
/// ACK channel for [`C2D_CMD_HIGHPRIO`] on BLE, sent drone to controller.
pub const D2C_CMD_HIGHPRIO_ACK_BLE: u8 = C2D_CMD_HIGHPRIO + ACK_OFFSET_BLE;

/// Transport medium, selecting the channel id space width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Medium {
    Ip,
    Ble,
}

/// Derive the ACK channel id for a with-ack data channel.
///
/// Peers compute this independently on both ends of the link, so the rule
/// is fixed: add half of the medium's id space width. Only meaningful for
/// with-ack data channels; the result wraps within a byte.
pub fn ack_id(data_id: u8, medium: Medium) -> u8 {
    match medium {
        Medium::Ip => data_id.wrapping_add(ACK_OFFSET),
        Medium::Ble => data_id.wrapping_add(ACK_OFFSET_BLE),
    }
}

/// Returns a human-readable name for a channel id.
pub fn channel_name(id: u8) -> &'static str {
    match id {
        PING => "PING",
        PONG => "PONG",
        C2D_CMD_NOACK => "C2D_CMD_NOACK",
        C2D_CMD_WITHACK => "C2D_CMD_WITHACK",
        C2D_CMD_HIGHPRIO => "C2D_CMD_HIGHPRIO",
        D2C_CMD_NOACK => "D2C_CMD_NOACK",
        D2C_CMD_WITHACK => "D2C_CMD_WITHACK",
        D2C_CMD_WITHACK_BLE => "D2C_CMD_WITHACK_BLE",
        D2C_CMD_NOACK_BLE => "D2C_CMD_NOACK_BLE",
        C2D_CMD_ACK => "C2D_CMD_ACK",
        D2C_CMD_ACK => "D2C_CMD_ACK",
        D2C_CMD_HIGHPRIO_ACK => "D2C_CMD_HIGHPRIO_ACK",
        C2D_CMD_ACK_BLE => "C2D_CMD_ACK_BLE",
        D2C_CMD_ACK_BLE => "D2C_CMD_ACK_BLE",
        D2C_CMD_HIGHPRIO_ACK_BLE => "D2C_CMD_HIGHPRIO_ACK_BLE",
        INVALID => "INVALID",
        _ => "OTHER",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_derivation_matches_catalog() {
        assert_eq!(ack_id(D2C_CMD_WITHACK, Medium::Ip), 254);
        assert_eq!(ack_id(C2D_CMD_WITHACK, Medium::Ip), 139);
        assert_eq!(ack_id(C2D_CMD_HIGHPRIO, Medium::Ip), 140);
        assert_eq!(ack_id(D2C_CMD_WITHACK_BLE, Medium::Ble), 30);
    }

    #[test]
    fn derived_constants_agree_with_ack_id() {
        assert_eq!(C2D_CMD_ACK, ack_id(D2C_CMD_WITHACK, Medium::Ip));
        assert_eq!(D2C_CMD_ACK, ack_id(C2D_CMD_WITHACK, Medium::Ip));
        assert_eq!(D2C_CMD_HIGHPRIO_ACK, ack_id(C2D_CMD_HIGHPRIO, Medium::Ip));
        assert_eq!(C2D_CMD_ACK_BLE, ack_id(D2C_CMD_WITHACK_BLE, Medium::Ble));
    }

    #[test]
    fn well_known_ids_are_stable() {
        // Wire constants shared with peers; changing any of these breaks
        // interoperability.
        assert_eq!(PING, 0);
        assert_eq!(PONG, 1);
        assert_eq!(C2D_CMD_NOACK, 10);
        assert_eq!(C2D_CMD_WITHACK, 11);
        assert_eq!(C2D_CMD_HIGHPRIO, 12);
        assert_eq!(D2C_CMD_NOACK, 127);
        assert_eq!(D2C_CMD_WITHACK, 126);
        assert_eq!(D2C_CMD_NOACK_BLE, 15);
        assert_eq!(D2C_CMD_WITHACK_BLE, 14);
        assert_eq!(INVALID, 255);
    }

    #[test]
    fn names_cover_known_ids() {
        assert_eq!(channel_name(PING), "PING");
        assert_eq!(channel_name(C2D_CMD_ACK), "C2D_CMD_ACK");
        assert_eq!(channel_name(D2C_CMD_ACK_BLE), "D2C_CMD_ACK_BLE");
        assert_eq!(
            channel_name(D2C_CMD_HIGHPRIO_ACK_BLE),
            "D2C_CMD_HIGHPRIO_ACK_BLE"
        );
        assert_eq!(channel_name(42), "OTHER");
    }
}
