use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use k256::ecdsa::SigningKey;

use super::*;
use crate::codec::{local_node_id, Enode};
use crate::domain::{DiscoveryConfig, Liveness, NodeAddress, NodeRecord, Timestamp};
use crate::ports::{ConfigProvider, MessageSender, NetworkError, NodeStore, StoreError, TimeSource};

fn bootnode_url(seed: u8, port: u16) -> String {
    let key = SigningKey::from_slice(&[seed; 32]).unwrap();
    format!("enode://{}@127.0.0.1:{port}", local_node_id(&key))
}

// =============================================================================
// Configuration
// =============================================================================

#[test]
fn test_toml_provider_reads_settings_and_partial_discovery_table() {
    let content = format!(
        r#"
listen_addr = "0.0.0.0:30305"
external_ip = "203.0.113.7"
bootnodes = ["{}"]

[discovery]
bucket_size = 8
ping_timeout_ms = 500
"#,
        bootnode_url(1, 30303)
    );

    let provider = TomlConfigProvider::parse(&content).unwrap();
    let config = provider.discovery_config();
    assert_eq!(config.bucket_size, 8);
    assert_eq!(config.ping_timeout_ms, 500);
    // Unset fields keep their defaults.
    assert_eq!(config.alpha, DiscoveryConfig::default().alpha);

    let bootnodes = provider.bootnodes();
    assert_eq!(bootnodes.len(), 1);
    assert_eq!(bootnodes[0].address.udp_port, 30303);

    assert_eq!(
        provider.settings().advertised_address(),
        NodeAddress::new(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7)), 30305, 30305)
    );
}

#[test]
fn test_empty_toml_is_all_defaults() {
    let provider = TomlConfigProvider::parse("").unwrap();
    assert_eq!(provider.settings(), &NodeSettings::default());
    assert_eq!(provider.discovery_config(), DiscoveryConfig::default());
    assert!(provider.bootnodes().is_empty());
}

#[test]
fn test_bad_bootnode_fails_load() {
    let result = TomlConfigProvider::parse(r#"bootnodes = ["enode://nothex@127.0.0.1:30303"]"#);
    assert!(matches!(result, Err(ConfigError::Bootnode { .. })));
}

#[test]
fn test_malformed_toml_is_parse_error() {
    let result = TomlConfigProvider::parse("listen_addr = ");
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = TomlConfigProvider::load(dir.path().join("absent.toml"));
    assert!(matches!(result, Err(ConfigError::Io { .. })));
}

#[test]
fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("disc.toml");
    std::fs::write(&path, "tcp_port = 30400\n").unwrap();

    let settings = TomlConfigProvider::load(&path).unwrap().into_settings();
    assert_eq!(settings.tcp_port, Some(30400));
    assert_eq!(settings.advertised_address().tcp_port, 30400);
    assert_eq!(settings.advertised_address().udp_port, 30303);
}

#[test]
fn test_signing_key_from_settings() {
    let mut settings = NodeSettings::default();
    assert!(settings.signing_key().unwrap().is_none());

    settings.private_key = Some("11".repeat(32));
    let key = settings.signing_key().unwrap().unwrap();
    assert_eq!(key, SigningKey::from_slice(&[0x11; 32]).unwrap());

    settings.private_key = Some("zz".into());
    assert_eq!(settings.signing_key().unwrap_err(), ConfigError::PrivateKey);
}

#[test]
fn test_static_provider_returns_what_it_was_given() {
    let enode: Enode = bootnode_url(2, 30310).parse().unwrap();
    let provider = StaticConfigProvider::new()
        .with_bootnodes(vec![enode])
        .with_config(DiscoveryConfig::for_testing());

    assert_eq!(provider.bootnodes(), vec![enode]);
    assert_eq!(provider.discovery_config(), DiscoveryConfig::for_testing());
}

// =============================================================================
// Persistence
// =============================================================================

fn record(seed: u8) -> NodeRecord {
    let key = SigningKey::from_slice(&[seed; 32]).unwrap();
    let address = NodeAddress::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, seed)), 30303, 30303);
    let mut record = NodeRecord::new(local_node_id(&key), address, 3, Timestamp::new(1_000));
    record.liveness = Liveness::Alive;
    record.last_verified = Some(Timestamp::new(1_010));
    record
}

#[test]
fn test_json_store_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonNodeStore::new(dir.path().join("nodes.json"));
    let records = vec![record(1), record(2)];

    store.save(&records).unwrap();

    assert_eq!(store.load().unwrap(), records);
    assert!(!dir.path().join("nodes.json.tmp").exists());
}

#[test]
fn test_json_store_missing_file_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonNodeStore::new(dir.path().join("nodes.json"));
    assert!(store.load().unwrap().is_empty());
}

#[test]
fn test_json_store_rejects_corrupt_file() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonNodeStore::new(dir.path().join("nodes.json"));
    std::fs::write(store.path(), "{not json").unwrap();
    assert!(matches!(store.load(), Err(StoreError::Format(_))));
}

// =============================================================================
// UDP transport
// =============================================================================

fn loopback() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
}

#[tokio::test]
async fn test_udp_transport_send_and_receive() {
    let a = UdpTransport::bind(loopback(), 1280).await.unwrap();
    let b = UdpTransport::bind(loopback(), 1280).await.unwrap();
    let b_addr = b.local_addr().unwrap();

    a.send_packet(b"hello", b_addr).await.unwrap();

    let mut buf = [0u8; 64];
    let (len, from) = b.recv(&mut buf).await.unwrap();
    assert_eq!(&buf[..len], b"hello");
    assert_eq!(from, a.local_addr().unwrap());
}

#[tokio::test]
async fn test_udp_transport_refuses_oversized_packet() {
    let transport = UdpTransport::bind(loopback(), 16).await.unwrap();
    let to = transport.local_addr().unwrap();

    let err = transport.send_packet(&[0u8; 17], to).await.unwrap_err();
    assert_eq!(err, NetworkError::MessageTooLarge { size: 17, max: 16 });
}

#[tokio::test]
async fn test_bind_conflict_is_reported() {
    let first = UdpTransport::bind(loopback(), 1280).await.unwrap();
    let taken = first.local_addr().unwrap();
    let err = UdpTransport::bind(taken, 1280).await.unwrap_err();
    assert!(matches!(err, crate::service::DiscoveryError::Bind { addr, .. } if addr == taken));
}

#[test]
fn test_system_time_source_is_after_2020() {
    assert!(SystemTimeSource::new().now().as_secs() > 1_577_836_800);
}
