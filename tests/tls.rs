mod common;

use common::{handshake, record};
use ja4plus::tls::{
    alpn_tag, certificate_message_body, find_handshake_body, handshake_messages,
    is_tls_handshake, server_hello_body, version_code, TlsVersion, HANDSHAKE_CERTIFICATE,
    HANDSHAKE_SERVER_HELLO,
};

#[test]
fn test_version_codes() {
    assert_eq!(version_code(0x0100), "s1");
    assert_eq!(version_code(0x0200), "s2");
    assert_eq!(version_code(0x0300), "s3");
    assert_eq!(version_code(0x0301), "10");
    assert_eq!(version_code(0x0302), "11");
    assert_eq!(version_code(0x0303), "12");
    assert_eq!(version_code(0x0304), "13");
}

#[test]
fn test_unknown_versions_map_to_zeros() {
    for version in [0x0000u16, 0x0305, 0x7f17, 0x7f1c, 0xfefd, 0x0a0a] {
        assert_eq!(version_code(version), "00", "{version:#06x}");
    }
    assert_eq!(TlsVersion::from(0x7f1c), TlsVersion::Unknown(0x7f1c));
}

#[test]
fn test_version_display() {
    assert_eq!(TlsVersion::V1_3.to_string(), "13");
    assert_eq!(TlsVersion::Ssl3_0.to_string(), "s3");
}

#[test]
fn test_alpn_tag() {
    assert_eq!(&alpn_tag(b"h2"), b"h2");
    assert_eq!(&alpn_tag(b"http/1.1"), b"h1");
    assert_eq!(&alpn_tag(b"x"), b"xx");
    assert_eq!(&alpn_tag(b""), b"00");
    assert_eq!(&alpn_tag(&[0x00, b'a', 0xff]), b"99");
}

#[test]
fn test_handshake_messages_across_records() {
    let mut payload = record(0x16, &handshake(HANDSHAKE_SERVER_HELLO, &[1, 2, 3]));
    payload.extend(record(
        0x16,
        &[handshake(HANDSHAKE_CERTIFICATE, &[4, 5]), handshake(0x0e, &[])].concat(),
    ));

    let messages = handshake_messages(&payload);
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0].msg_type, HANDSHAKE_SERVER_HELLO);
    assert_eq!(messages[0].body, &[1, 2, 3]);
    assert_eq!(messages[1].msg_type, HANDSHAKE_CERTIFICATE);
    assert_eq!(messages[1].body, &[4, 5]);
    assert_eq!(messages[2].msg_type, 0x0e);
    assert!(messages[2].body.is_empty());
}

#[test]
fn test_handshake_messages_stop_at_other_records() {
    let mut payload = record(0x14, &[0x01]);
    payload.extend(record(0x16, &handshake(HANDSHAKE_SERVER_HELLO, &[1])));
    assert!(handshake_messages(&payload).is_empty());
}

#[test]
fn test_find_handshake_body() {
    let payload = record(0x16, &handshake(HANDSHAKE_SERVER_HELLO, &[9, 9]));
    match find_handshake_body(&payload, HANDSHAKE_SERVER_HELLO) {
        Ok(body) => assert_eq!(body, &[9, 9]),
        Err(e) => panic!("ServerHello not found: {e}"),
    }
    assert!(find_handshake_body(&payload, HANDSHAKE_CERTIFICATE).is_err());
}

#[test]
fn test_server_flight_bodies() {
    let mut fragment = handshake(HANDSHAKE_SERVER_HELLO, &[1, 2, 3]);
    fragment.extend(handshake(HANDSHAKE_CERTIFICATE, &[0, 0, 0]));
    let payload = record(0x16, &fragment);

    assert!(matches!(server_hello_body(&payload), Ok(body) if body == [1, 2, 3]));
    assert!(matches!(certificate_message_body(&payload), Ok(body) if body == [0, 0, 0]));
    assert!(certificate_message_body(&record(0x16, &handshake(HANDSHAKE_SERVER_HELLO, &[1]))).is_err());
}

#[test]
fn test_is_tls_handshake() {
    assert!(is_tls_handshake(&[0x16, 0x03, 0x03, 0x00, 0x10]));
    assert!(is_tls_handshake(&[0x16, 0x03, 0x01, 0x00, 0x10]));
    assert!(!is_tls_handshake(&[0x17, 0x03, 0x03, 0x00, 0x10]));
    assert!(!is_tls_handshake(&[0x16, 0x03, 0x03]));
    assert!(!is_tls_handshake(b"SSH-2.0-OpenSSH_9.6"));
}
