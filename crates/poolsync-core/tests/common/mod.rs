#![allow(dead_code, clippy::unwrap_used)]
// Shared fixtures for the integration tests.

use std::time::Duration;

use bytes::Bytes;
use poolsync_core::{EntityKind, MeasurementSettings, MemorySource, PoolClient, PoolConfig};

pub const ICEPAP_CLASS: &str = "IcepapCtrl (/opt/pool/ctrls/icepap.py) Motor";
pub const COUNTER_CLASS: &str = "DummyCounterTimer (/opt/pool/ctrls/dummyct.py) CounterTimer";
pub const SUM_CLASS: &str = "Sum (/opt/pool/ctrls/sum.py) PseudoCounter";

pub const CTRL1: &str = "ctrl1 (icepap.IcepapCtrl/icepap.py) - Motor Python (icepap.py)";
pub const CTCTRL: &str = "ctctrl (dummyct.DummyCounterTimer/dummyct.py) - CounterTimer Python (dummyct.py)";
pub const SUMCTRL: &str = "sumctrl (sum.Sum/sum.py) - PseudoCounter Python (sum.py)";

pub fn motor(name: &str, controller: &str, index: u32) -> String {
    format!("{name} (motor/{controller}/{index}) ({controller}/{index})")
}

pub fn counter(name: &str, index: u32) -> String {
    format!("{name} (expchan/ctctrl/{index}) (ctctrl/{index}) CounterTimer")
}

pub fn motor_group(name: &str, members: &[&str]) -> String {
    format!("{name} (mg/pool/{name}) Motor list: {}", members.join(", "))
}

pub fn lines(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| (*s).to_owned()).collect()
}

/// Configuration with the periodic refresher off.
pub fn config() -> PoolConfig {
    let mut config = PoolConfig::new("test-pool", "pool/test/1");
    config.refresh_interval = Duration::ZERO;
    config
}

/// A client that has bootstrapped against `source`.
pub async fn available_client(source: &MemorySource) -> PoolClient {
    let client = PoolClient::new(config(), source.clone());
    client.set_available().await.unwrap();
    client
}

/// NUL-separated class metadata blob.
pub fn class_blob(fields: &[&str]) -> Bytes {
    let mut out = Vec::new();
    for field in fields {
        out.extend_from_slice(field.as_bytes());
        out.push(0);
    }
    Bytes::from(out)
}

/// A small but complete pool: motors in a group, counters and a pseudo
/// counter in a measurement group, with metadata for most entities.
pub fn populated_source() -> MemorySource {
    let source = MemorySource::new();
    source.set_list(EntityKind::ControllerClasses, [ICEPAP_CLASS, COUNTER_CLASS, SUM_CLASS]);
    source.set_list(EntityKind::Controllers, [CTRL1, CTCTRL, SUMCTRL]);
    source.set_list(EntityKind::Motors, [motor("mot1", "ctrl1", 1), motor("mot2", "ctrl1", 2)]);
    source.set_list(
        EntityKind::ExperimentChannels,
        [
            counter("ct01", 1),
            counter("ct02", 2),
            "total (pc/sumctrl/1) (sumctrl/1) PseudoCounter".to_owned(),
        ],
    );
    source.set_list(
        EntityKind::PseudoCounters,
        ["total (pc/sumctrl/1) (sumctrl/1) PseudoCounter Counter list: ct01, ct02"],
    );
    source.set_list(EntityKind::MotorGroups, [motor_group("mg1", &["mot1", "mot2"])]);
    source.set_list(
        EntityKind::MeasurementGroups,
        ["mnt (mntgrp/pool/mnt) ExpChannel list: ct01, ct02, total"],
    );

    source.set_class_blob(
        "icepap.py",
        "IcepapCtrl",
        class_blob(&[
            "IcePAP motor controller", "Motor", "IcePAP", "ALBA",
            "1",
            "Host", "PyTango.DevString", "IcePAP host", "icepap01",
            "", "0",
            "", "0",
            "", "0",
        ]),
    );
    source.set_class_info(
        "dummyct.py",
        "DummyCounterTimer",
        lines(&["Dummy counter/timer", "CounterTimer", "Dummy", "Pool", "0"]),
    );
    source.set_instance_info(
        "ctrl1",
        lines(&[
            "IcePAP motor controller", "Motor", "IcePAP", "ALBA",
            "1",
            "Host", "PyTango.DevString", "IcePAP host", "icepap02",
        ]),
    );
    source.set_measurement_settings(
        "mntgrp/pool/mnt",
        MeasurementSettings {
            integration_time: Some(0.5),
            integration_count: None,
            timer: Some("ct01".into()),
            monitor: Some("mot1".into()),
        },
    );
    source
}
