mod common;

use common::{
    alpn, certificate, certificate_list, handshake, record, server_hello, Segment, ACK, CLIENT_IP,
    CLIENT_PORT, FIN_ACK, LINUX_OPTIONS, OID_COMMON_NAME, PSH_ACK, RST, SERVER_IP, SYN, SYN_ACK,
};
use ja4plus::{
    Field, FingerprintOutput, FlowKey, FlowProcessor, IpPort, Ja4Plus, Ja4PlusConfig, Ja4PlusError,
};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

const START: Duration = Duration::from_secs(1_700_000_000);

fn processor(config: Ja4PlusConfig) -> FlowProcessor {
    match Ja4Plus::new(config) {
        Ok(engine) => FlowProcessor::new(engine),
        Err(e) => panic!("Failed to create engine: {e}"),
    }
}

fn feed(processor: &mut FlowProcessor, segment: Segment<'_>, micros: u64) -> Vec<FingerprintOutput> {
    match processor.process_frame(&segment.frame(), START + Duration::from_micros(micros)) {
        Ok(outputs) => outputs,
        Err(e) => panic!("Failed to process frame: {e}"),
    }
}

fn value(outputs: &[FingerprintOutput], field: Field) -> Option<&str> {
    outputs.iter().find(|o| o.field == field).map(|o| o.value.as_str())
}

fn endpoint(ip: [u8; 4], port: u16) -> IpPort {
    IpPort::new(IpAddr::V4(Ipv4Addr::from(ip)), port)
}

#[test]
fn test_tls_flow_produces_every_fingerprint() {
    let mut processor = processor(Ja4PlusConfig::default());
    let mut outputs = Vec::new();

    let hello = server_hello(
        0x0303,
        0xc02f,
        &[(0xff01, vec![0x00]), (0x0010, alpn(&[b"h2"])), (0x000b, vec![0x01, 0x00])],
    );
    let cert = certificate(&[(OID_COMMON_NAME, "CA")], &[(OID_COMMON_NAME, "leaf")], &[]);
    let flight = record(
        0x16,
        &[
            handshake(0x02, &hello),
            handshake(0x0b, &certificate_list(&[cert])),
            handshake(0x0e, &[]),
        ]
        .concat(),
    );
    let (part1, part2) = flight.split_at(60);
    let client_hello = record(0x16, &handshake(0x01, &[0x03, 0x03, 0x00]));

    outputs.extend(feed(&mut processor, Segment::client(443, SYN).options(&LINUX_OPTIONS), 0));
    outputs.extend(feed(&mut processor, Segment::server(443, SYN_ACK).options(&LINUX_OPTIONS), 20_000));
    outputs.extend(feed(&mut processor, Segment::client(443, ACK), 40_000));
    outputs.extend(feed(&mut processor, Segment::client(443, PSH_ACK).payload(&client_hello), 41_000));
    outputs.extend(feed(&mut processor, Segment::server(443, PSH_ACK).payload(part1), 90_000));
    assert!(value(&outputs, Field::Ja4s).is_none());
    outputs.extend(feed(&mut processor, Segment::server(443, PSH_ACK).payload(part2), 91_000));
    outputs.extend(feed(&mut processor, Segment::client(443, PSH_ACK).payload(b"\x17\x03\x03\x00\x01\x00"), 95_000));

    assert_eq!(value(&outputs, Field::Ja4tc), Some("64240_2-1-1-4-3-0_1460_7"));
    assert_eq!(value(&outputs, Field::Ja4ts), Some("65160_2-1-1-4-3-0_1460_7"));
    assert_eq!(value(&outputs, Field::Ja4ls), Some("10000_52_24500"));
    assert_eq!(value(&outputs, Field::Ja4s), Some("t1203h2_c02f_26b1f9d0693b"));
    assert_eq!(value(&outputs, Field::Ja4sRaw), Some("t1203h2_c02f_ff01,0010,000b"));
    assert_eq!(value(&outputs, Field::Ja4x), Some("7022c563de38_7022c563de38_000000000000"));
    assert_eq!(value(&outputs, Field::Ja4xRaw), Some("550403_550403_"));
    assert_eq!(value(&outputs, Field::Ja4lc), Some("10000_64_2500"));
    assert_eq!(outputs.len(), 8);

    for output in &outputs {
        assert_eq!(output.client, endpoint(CLIENT_IP, CLIENT_PORT));
        assert_eq!(output.server, endpoint(SERVER_IP, 443));
    }
}

#[test]
fn test_ssh_window_fingerprint() {
    let config = Ja4PlusConfig { ssh_window: 4, ..Ja4PlusConfig::default() };
    let mut processor = processor(config);
    let mut outputs = Vec::new();

    outputs.extend(feed(&mut processor, Segment::client(22, SYN), 0));
    outputs.extend(feed(&mut processor, Segment::server(22, SYN_ACK), 1_000));
    outputs.extend(feed(&mut processor, Segment::client(22, ACK), 2_000));
    outputs.extend(feed(&mut processor, Segment::client(22, PSH_ACK).payload(&[0u8; 10]), 3_000));
    outputs.extend(feed(&mut processor, Segment::server(22, PSH_ACK).payload(&[0u8; 20]), 4_000));
    outputs.extend(feed(&mut processor, Segment::client(22, ACK), 5_000));
    outputs.extend(feed(&mut processor, Segment::client(22, PSH_ACK).payload(&[0u8; 10]), 6_000));
    outputs.extend(feed(&mut processor, Segment::server(22, ACK), 7_000));
    assert!(value(&outputs, Field::Ja4ssh).is_none());
    outputs.extend(feed(&mut processor, Segment::server(22, PSH_ACK).payload(&[0u8; 20]), 8_000));

    assert_eq!(value(&outputs, Field::Ja4ssh), Some("c10s20_c2s2_c2s1"));
}

#[test]
fn test_ssh_detected_from_banner() {
    let config = Ja4PlusConfig { ssh_window: 2, ..Ja4PlusConfig::default() };
    let mut processor = processor(config);

    let banner = b"SSH-2.0-OpenSSH_9.6\r\n";
    feed(&mut processor, Segment::server(2222, PSH_ACK).payload(banner), 0);
    let outputs = feed(&mut processor, Segment::client(2222, PSH_ACK).payload(banner), 10);
    assert_eq!(value(&outputs, Field::Ja4ssh), Some("c21s21_c1s1_c0s0"));
}

#[test]
fn test_non_ssh_traffic_has_no_ja4ssh() {
    let config = Ja4PlusConfig { ssh_window: 2, ..Ja4PlusConfig::default() };
    let mut processor = processor(config);

    let mut outputs = feed(&mut processor, Segment::client(8080, PSH_ACK).payload(b"GET /"), 0);
    outputs.extend(feed(&mut processor, Segment::server(8080, PSH_ACK).payload(b"200 OK"), 10));
    outputs.extend(feed(&mut processor, Segment::client(8080, PSH_ACK).payload(b"GET /"), 20));
    assert!(value(&outputs, Field::Ja4ssh).is_none());
}

#[test]
fn test_flow_oriented_from_syn_ack() {
    let mut processor = processor(Ja4PlusConfig::default());
    let outputs = feed(&mut processor, Segment::server(443, SYN_ACK).options(&LINUX_OPTIONS), 0);

    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].field, Field::Ja4ts);
    assert_eq!(outputs[0].client, endpoint(CLIENT_IP, CLIENT_PORT));
    assert_eq!(outputs[0].server, endpoint(SERVER_IP, 443));
}

#[test]
fn test_fin_from_both_sides_ends_flow() {
    let mut processor = processor(Ja4PlusConfig::default());
    let key = FlowKey::new(endpoint(CLIENT_IP, CLIENT_PORT), endpoint(SERVER_IP, 443));

    feed(&mut processor, Segment::client(443, SYN), 0);
    assert!(processor.is_tracked(&key));
    feed(&mut processor, Segment::client(443, FIN_ACK), 10);
    assert!(processor.is_tracked(&key));
    feed(&mut processor, Segment::server(443, FIN_ACK), 20);
    assert!(!processor.is_tracked(&key));
    assert_eq!(processor.active_flows(), 0);
}

#[test]
fn test_trailing_ack_does_not_recreate_flow() {
    let mut processor = processor(Ja4PlusConfig::default());

    feed(&mut processor, Segment::client(443, SYN), 0);
    feed(&mut processor, Segment::server(443, SYN_ACK), 10);
    feed(&mut processor, Segment::client(443, FIN_ACK), 20);
    feed(&mut processor, Segment::server(443, FIN_ACK), 30);
    assert_eq!(processor.active_flows(), 0);

    assert!(feed(&mut processor, Segment::client(443, ACK), 40).is_empty());
    feed(&mut processor, Segment::server(443, RST), 50);
    assert_eq!(processor.active_flows(), 0);
}

#[test]
fn test_partial_ssh_window_reported_when_flow_closes() {
    let mut processor = processor(Ja4PlusConfig::default());
    let mut outputs = Vec::new();

    outputs.extend(feed(&mut processor, Segment::client(22, SYN), 0));
    outputs.extend(feed(&mut processor, Segment::server(22, SYN_ACK), 1_000));
    outputs.extend(feed(&mut processor, Segment::client(22, ACK), 2_000));
    outputs.extend(feed(&mut processor, Segment::client(22, PSH_ACK).payload(&[0u8; 10]), 3_000));
    outputs.extend(feed(&mut processor, Segment::server(22, PSH_ACK).payload(&[0u8; 20]), 4_000));
    outputs.extend(feed(&mut processor, Segment::client(22, PSH_ACK).payload(&[0u8; 10]), 5_000));
    assert!(value(&outputs, Field::Ja4ssh).is_none());

    outputs.extend(feed(&mut processor, Segment::client(22, FIN_ACK), 6_000));
    outputs.extend(feed(&mut processor, Segment::server(22, FIN_ACK), 7_000));
    assert_eq!(value(&outputs, Field::Ja4ssh), Some("c10s20_c2s1_c1s0"));
}

#[test]
fn test_finish_reports_partial_ssh_window() {
    let mut processor = processor(Ja4PlusConfig::default());
    let mut outputs = Vec::new();

    for i in 0..20u64 {
        outputs.extend(feed(&mut processor, Segment::client(22, PSH_ACK).payload(&[0u8; 36]), i * 20));
        outputs.extend(feed(&mut processor, Segment::server(22, PSH_ACK).payload(&[0u8; 52]), i * 20 + 10));
    }
    assert!(value(&outputs, Field::Ja4ssh).is_none());

    let outputs = processor.finish();
    assert_eq!(value(&outputs, Field::Ja4ssh), Some("c36s52_c20s20_c0s0"));
    assert_eq!(processor.active_flows(), 0);
}

#[test]
fn test_reset_ends_flow() {
    let mut processor = processor(Ja4PlusConfig::default());
    feed(&mut processor, Segment::client(443, SYN), 0);
    feed(&mut processor, Segment::client(80, SYN), 0);
    assert_eq!(processor.active_flows(), 2);

    feed(&mut processor, Segment::server(443, RST), 10);
    assert_eq!(processor.active_flows(), 1);
}

#[test]
fn test_finish_releases_every_flow() {
    let mut processor = processor(Ja4PlusConfig::default());
    feed(&mut processor, Segment::client(443, SYN), 0);
    feed(&mut processor, Segment::client(8443, SYN), 0);
    assert_eq!(processor.active_flows(), 2);

    assert!(processor.finish().is_empty());
    assert_eq!(processor.active_flows(), 0);
}

#[test]
fn test_non_tcp_frames() {
    let mut processor = processor(Ja4PlusConfig::default());

    let mut udp = Segment::client(53, 0).frame();
    udp[23] = 17;
    assert!(matches!(
        processor.process_frame(&udp, START),
        Err(Ja4PlusError::UnsupportedProtocol(_))
    ));

    match processor.process_frame(&[0u8; 8], START) {
        Ok(outputs) => assert!(outputs.is_empty()),
        Err(e) => panic!("Non-IP frame should be skipped: {e}"),
    }
}

#[test]
fn test_output_display() {
    let output = FingerprintOutput {
        client: endpoint(CLIENT_IP, CLIENT_PORT),
        server: endpoint(SERVER_IP, 443),
        field: Field::Ja4s,
        value: "t130200_1301_a56c5b993250".to_string(),
    };
    let text = output.to_string();
    assert!(text.contains("192.168.1.10/51000 -> 93.184.216.34/443 (tls.ja4s)"));
    assert!(text.contains("t130200_1301_a56c5b993250"));
}
