//! TOML capture files standing in for a live pool.
//!
//! ```toml
//! [lists]
//! ControllerList = ["ctrl1 (icepap.IcepapCtrl/icepap.py) - Motor Python (icepap.py)"]
//! MotorList = ["mot1 (motor/ctrl1/1) (ctrl1/1)"]
//!
//! [class_info."icepap.py/IcepapCtrl"]
//! fields = ["IcePAP controller", "Motor", "IcePAP", "ALBA", "0"]
//!
//! [controller_info.ctrl1]
//! fields = ["", "", "", "", "1", "Host", "PyTango.DevString", "", "icepap01"]
//!
//! [measurement_groups."mntgrp/pool/mnt"]
//! integration_time = 0.1
//! timer = "ct01"
//! ```
//!
//! Lists are keyed by pool attribute name. A collection missing from the
//! file is an empty collection.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;

use poolsync_core::{EntityKind, MeasurementSettings, MemorySource};

use crate::error::CliError;

#[derive(Debug, Default, Deserialize)]
pub struct CaptureFile {
    #[serde(default)]
    pub lists: IndexMap<String, Vec<String>>,

    /// Class info replies keyed by `file_name/ClassName`.
    #[serde(default)]
    pub class_info: IndexMap<String, InfoReply>,

    /// Instance info replies keyed by controller name.
    #[serde(default)]
    pub controller_info: IndexMap<String, InfoReply>,

    /// Settings keyed by measurement group address.
    #[serde(default)]
    pub measurement_groups: IndexMap<String, MeasurementSettings>,
}

#[derive(Debug, Default, Deserialize)]
pub struct InfoReply {
    pub fields: Vec<String>,
}

impl CaptureFile {
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let capture_err = |reason: String| CliError::Capture {
            path: path.display().to_string(),
            reason,
        };
        let text = std::fs::read_to_string(path).map_err(|e| capture_err(e.to_string()))?;
        let capture: Self = toml::from_str(&text).map_err(|e| capture_err(e.to_string()))?;

        if let Some(unknown) = capture
            .lists
            .keys()
            .find(|attr| EntityKind::from_attribute(attr).is_none())
        {
            return Err(capture_err(format!("unknown list attribute '{unknown}'")));
        }
        if let Some(bad) = capture.class_info.keys().find(|k| !k.contains('/')) {
            return Err(capture_err(format!("class info key '{bad}' is not file_name/ClassName")));
        }
        Ok(capture)
    }

    /// Snapshot lines of one collection.
    pub fn list(&self, kind: EntityKind) -> Vec<String> {
        self.lists
            .iter()
            .find(|(attr, _)| EntityKind::from_attribute(attr) == Some(kind))
            .map(|(_, lines)| lines.clone())
            .unwrap_or_default()
    }

    /// Load everything into `source`, replacing what it held.
    pub fn apply(&self, source: &MemorySource) {
        for kind in EntityKind::BOOTSTRAP_ORDER {
            source.set_list(kind, self.list(kind));
        }
        for (key, reply) in &self.class_info {
            if let Some((file_name, class_name)) = key.split_once('/') {
                source.set_class_info(file_name, class_name, reply.fields.clone());
            }
        }
        for (controller, reply) in &self.controller_info {
            source.set_instance_info(controller, reply.fields.clone());
        }
        for (address, settings) in &self.measurement_groups {
            source.set_measurement_settings(address, settings.clone());
        }
    }
}

/// A capture file and the source it feeds.
pub struct CaptureSource {
    pub path: PathBuf,
    pub source: MemorySource,
}

impl CaptureSource {
    pub fn open(path: PathBuf) -> Result<Self, CliError> {
        let source = MemorySource::new();
        CaptureFile::load(&path)?.apply(&source);
        Ok(Self { path, source })
    }

    /// Re-read the file into the source.
    pub fn reload(&self) -> Result<(), CliError> {
        CaptureFile::load(&self.path)?.apply(&self.source);
        Ok(())
    }
}
