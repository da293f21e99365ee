// ── Controller class domain types ──
//
// A controller class is identified by its library file and class name.
// Metadata (description, property schema, role schema, images) arrives
// through a secondary query and is swapped in after the class exists.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwap;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::kind::{ControllerType, Language};

// ── Module identity ─────────────────────────────────────────────────

/// Where a controller class is implemented.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleIdentity {
    /// Directory part of the full path, without the trailing separator.
    pub path: String,
    /// File name including extension, e.g. `icepap.py`.
    pub file_name: String,
    /// Module name: file name without extension.
    pub module: String,
    pub extension: String,
    pub language: Language,
}

impl ModuleIdentity {
    /// Split a full library path into its parts.
    pub fn from_full_path(full_path: &str) -> Self {
        let (path, file_name) = full_path.rsplit_once('/').unwrap_or(("", full_path));
        let (module, extension) = file_name.rsplit_once('.').unwrap_or((file_name, ""));
        Self {
            path: path.to_owned(),
            file_name: file_name.to_owned(),
            module: module.to_owned(),
            extension: extension.to_owned(),
            language: Language::from_extension(extension),
        }
    }

    pub fn full_path(&self) -> String {
        if self.path.is_empty() {
            self.file_name.clone()
        } else {
            format!("{}/{}", self.path, self.file_name)
        }
    }
}

// ── Schema pieces ───────────────────────────────────────────────────

/// One entry of a class property schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySchema {
    pub name: String,
    pub declared_type: String,
    pub description: String,
    pub default_value: Option<String>,
}

/// Ordered physical-side and pseudo-side roles of a pseudo class.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSchema {
    pub physical: Vec<String>,
    pub pseudo: Vec<String>,
}

/// One predefined value of a register class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredefinedValue {
    pub value: i64,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageRole {
    Image,
    Logo,
    Icon,
}

/// An embedded image shipped with the class metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassImage {
    pub role: ImageRole,
    pub file_name: String,
    #[serde(skip)]
    pub data: Bytes,
}

/// Metadata populated from the class-info query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClassInfo {
    pub description: String,
    pub gender: String,
    pub model: String,
    pub organization: String,
    pub properties: Vec<PropertySchema>,
    pub roles: Option<RoleSchema>,
    pub predefined_values: Vec<PredefinedValue>,
    pub images: Vec<ClassImage>,
}

impl ClassInfo {
    pub fn property(&self, name: &str) -> Option<&PropertySchema> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn image(&self, role: ImageRole) -> Option<&ClassImage> {
        self.images.iter().find(|img| img.role == role)
    }
}

// ── ControllerClass ─────────────────────────────────────────────────

/// A loadable controller class reported by the pool.
#[derive(Debug)]
pub struct ControllerClass {
    class_name: String,
    controller_type: ControllerType,
    module: ModuleIdentity,
    info: ArcSwap<ClassInfo>,
    active: AtomicBool,
}

impl ControllerClass {
    pub(crate) fn new(class_name: String, controller_type: ControllerType, module: ModuleIdentity) -> Self {
        Self {
            class_name,
            controller_type,
            module,
            info: ArcSwap::from_pointee(ClassInfo::default()),
            active: AtomicBool::new(true),
        }
    }

    /// Identity key: `file_name/ClassName`.
    pub fn key(&self) -> String {
        class_key(&self.module.file_name, &self.class_name)
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn controller_type(&self) -> ControllerType {
        self.controller_type
    }

    pub fn module(&self) -> &ModuleIdentity {
        &self.module
    }

    pub fn language(&self) -> Language {
        self.module.language
    }

    /// Current metadata (empty until the class-info query completes).
    pub fn info(&self) -> Arc<ClassInfo> {
        self.info.load_full()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn set_info(&self, info: ClassInfo) {
        self.info.store(Arc::new(info));
    }

    pub(crate) fn cleanup(&self) {
        self.active.store(false, Ordering::Release);
    }
}

/// Build the identity key of a class.
pub fn class_key(file_name: &str, class_name: &str) -> String {
    format!("{file_name}/{class_name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_identity_splits_full_path() {
        let m = ModuleIdentity::from_full_path("/opt/pool/ctrl/icepap.py");
        assert_eq!(m.path, "/opt/pool/ctrl");
        assert_eq!(m.file_name, "icepap.py");
        assert_eq!(m.module, "icepap");
        assert_eq!(m.extension, "py");
        assert_eq!(m.language, Language::Python);
        assert_eq!(m.full_path(), "/opt/pool/ctrl/icepap.py");
    }

    #[test]
    fn module_identity_without_directory() {
        let m = ModuleIdentity::from_full_path("libVmot.la");
        assert_eq!(m.path, "");
        assert_eq!(m.module, "libVmot");
        assert_eq!(m.language, Language::Cpp);
        assert_eq!(m.full_path(), "libVmot.la");
    }

    #[test]
    fn info_swaps_in_place() {
        let class = ControllerClass::new(
            "IcepapCtrl".into(),
            ControllerType::Motor,
            ModuleIdentity::from_full_path("/x/icepap.py"),
        );
        assert_eq!(class.key(), "icepap.py/IcepapCtrl");
        assert!(class.info().description.is_empty());

        class.set_info(ClassInfo {
            description: "IcePAP motor controller".into(),
            ..ClassInfo::default()
        });
        assert_eq!(class.info().description, "IcePAP motor controller");
    }
}
