/// See <https://datatracker.ietf.org/doc/html/draft-davidben-tls-grease-01#page-5>
pub const TLS_GREASE_VALUES: [u16; 16] = [
    0x0a0a, 0x1a1a, 0x2a2a, 0x3a3a, 0x4a4a, 0x5a5a, 0x6a6a, 0x7a7a, 0x8a8a, 0x9a9a, 0xaaaa, 0xbaba,
    0xcaca, 0xdada, 0xeaea, 0xfafa,
];

/// Check if a value carries the GREASE pattern `0x?a?a`.
///
/// Only the two low bytes are inspected: the low nibble must be `0xa` and the
/// low byte must repeat in the second-lowest byte.
pub fn is_grease_value(value: u32) -> bool {
    if value & 0x0f != 0x0a {
        return false;
    }
    value & 0xff == (value >> 8) & 0xff
}

