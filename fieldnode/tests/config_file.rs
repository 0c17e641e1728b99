//! Configuration file loading.

use std::io::Write;

use fieldnode::{FieldNodeConfig, NodeError, SourceConfig};
use fieldnode_common::TransportConfig;

#[test]
fn test_shipped_config_loads() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/fieldnode.json5");
    let config = FieldNodeConfig::load(path).expect("shipped config should load");

    match &config.transport {
        TransportConfig::Mqtt(mqtt) => {
            assert_eq!(mqtt.host, "192.168.31.90");
            assert_eq!(mqtt.port, 1884);
        }
        other => panic!("expected mqtt transport, got {:?}", other),
    }
    assert_eq!(config.node.interface.as_deref(), Some("wlan0"));
    assert!(matches!(config.sampling.source, SourceConfig::Sysfs { .. }));

    let bindings = config.sampling.resolve();
    assert_eq!(bindings[0].input, 0);
    assert_eq!(bindings[1].input, 1);
    assert!((bindings[1].convert(4095) + 200.0).abs() < 1e-6);
}

#[test]
fn test_load_from_tempfile() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"{{
            transport: {{ type: "zenoh", mode: "client", connect: ["tcp/10.0.0.1:7447"] }},
            node: {{ node_id: "0A1B2C3D4E5F" }},
            sampling: {{ source: {{ type: "simulated" }} }},
        }}"#
    )
    .unwrap();

    let config = FieldNodeConfig::load(file.path()).unwrap();
    assert_eq!(config.transport.kind(), "zenoh");
    assert_eq!(config.node.node_id, "0A1B2C3D4E5F");
    assert_eq!(config.sampling.source, SourceConfig::Simulated);
}

#[test]
fn test_invalid_file_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "{{ schedule: {{ reconnect_delay_ms: 0 }} }}").unwrap();

    assert!(matches!(
        FieldNodeConfig::load(file.path()),
        Err(NodeError::ConfigValidation(_))
    ));
}
