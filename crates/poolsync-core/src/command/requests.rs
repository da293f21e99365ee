// ── Typed request structs for Command payloads ──
//
// Each create command carries one of these. `validate` rejects requests
// the pool would refuse anyway, before anything reaches the wire.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::model::{ControllerType, ElementKind};

fn invalid(message: impl Into<String>) -> CoreError {
    CoreError::ValidationFailed {
        message: message.into(),
    }
}

fn require(field: &str, value: &str) -> Result<(), CoreError> {
    if value.trim().is_empty() {
        return Err(invalid(format!("{field} must not be empty")));
    }
    Ok(())
}

// ── Controller ─────────────────────────────────────────────────────

/// One instance property assignment of a new controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyAssignment {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateControllerRequest {
    pub controller_type: ControllerType,
    /// Library file, e.g. `icepap.py`.
    pub file_name: String,
    pub class_name: String,
    /// Name of the new controller instance.
    pub instance: String,
    /// Element bound to each role, in role-schema order. Pseudo types only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<PropertyAssignment>,
}

impl CreateControllerRequest {
    pub(crate) fn validate(&self) -> Result<(), CoreError> {
        if self.controller_type == ControllerType::Invalid {
            return Err(invalid("controller type is not valid"));
        }
        require("library file", &self.file_name)?;
        require("class name", &self.class_name)?;
        require("instance name", &self.instance)?;
        if self.controller_type.is_pseudo() && self.roles.is_empty() {
            return Err(invalid(format!(
                "{} controller {} needs its roles bound",
                self.controller_type, self.instance
            )));
        }
        if !self.controller_type.is_pseudo() && !self.roles.is_empty() {
            return Err(invalid(format!(
                "{} controllers take no role bindings",
                self.controller_type
            )));
        }
        for prop in &self.properties {
            require("property name", &prop.name)?;
        }
        Ok(())
    }

    pub(crate) fn args(&self) -> Vec<String> {
        let mut args = vec![
            self.controller_type.to_string(),
            self.file_name.clone(),
            self.class_name.clone(),
            self.instance.clone(),
        ];
        args.extend(self.roles.iter().cloned());
        for prop in &self.properties {
            args.push(prop.name.clone());
            args.push(prop.value.clone());
        }
        args
    }
}

// ── Elements ───────────────────────────────────────────────────────

/// A new physical element at `index` of `controller`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateElementRequest {
    pub kind: ElementKind,
    /// Axis or channel number within the controller, starting at 1.
    pub index: u32,
    pub name: String,
    pub controller: String,
}

impl CreateElementRequest {
    /// Remote command creating an element of `kind`, if the pool has one.
    pub(crate) fn command_name(kind: ElementKind) -> Option<&'static str> {
        match kind {
            ElementKind::Motor => Some("CreateMotor"),
            ElementKind::CommunicationChannel => Some("CreateComChannel"),
            ElementKind::IoRegister => Some("CreateIORegister"),
            ElementKind::CounterTimer
            | ElementKind::ZeroDChannel
            | ElementKind::OneDChannel
            | ElementKind::TwoDChannel => Some("CreateExpChannel"),
            // Created along with their controller or through group commands.
            ElementKind::PseudoMotor
            | ElementKind::PseudoCounter
            | ElementKind::MotorGroup
            | ElementKind::MeasurementGroup => None,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), CoreError> {
        if Self::command_name(self.kind).is_none() {
            return Err(invalid(format!("{} elements cannot be created directly", self.kind)));
        }
        if self.index == 0 {
            return Err(invalid("element index starts at 1"));
        }
        require("element name", &self.name)?;
        require("controller name", &self.controller)
    }

    pub(crate) fn args(&self) -> Vec<String> {
        vec![self.index.to_string(), self.name.clone(), self.controller.clone()]
    }
}

// ── Groups ─────────────────────────────────────────────────────────

/// A motor group or measurement group with its ordered members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    pub members: Vec<String>,
}

impl CreateGroupRequest {
    pub(crate) fn validate(&self) -> Result<(), CoreError> {
        require("group name", &self.name)?;
        if self.members.is_empty() {
            return Err(invalid(format!("group {} needs at least one member", self.name)));
        }
        if self.members.iter().any(|m| m == &self.name) {
            return Err(invalid(format!("group {} cannot contain itself", self.name)));
        }
        for (i, member) in self.members.iter().enumerate() {
            if self.members[..i].contains(member) {
                return Err(invalid(format!("{member} is listed twice in {}", self.name)));
            }
        }
        Ok(())
    }

    pub(crate) fn args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.members.len() + 1);
        args.push(self.name.clone());
        args.extend(self.members.iter().cloned());
        args
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn pseudo_request() -> CreateControllerRequest {
        CreateControllerRequest {
            controller_type: ControllerType::PseudoMotor,
            file_name: "slit.py".into(),
            class_name: "Slit".into(),
            instance: "slit_ctrl".into(),
            roles: vec!["mot1".into(), "mot2".into(), "gap".into(), "offset".into()],
            properties: vec![PropertyAssignment {
                name: "sign".into(),
                value: "-1".into(),
            }],
        }
    }

    #[test]
    fn controller_args_follow_role_then_property_order() {
        let request = pseudo_request();
        request.validate().unwrap();
        assert_eq!(
            request.args(),
            vec!["PseudoMotor", "slit.py", "Slit", "slit_ctrl", "mot1", "mot2", "gap", "offset", "sign", "-1"]
        );
    }

    #[test]
    fn pseudo_controller_requires_roles() {
        let mut request = pseudo_request();
        request.roles.clear();
        assert!(matches!(request.validate(), Err(CoreError::ValidationFailed { .. })));

        request.controller_type = ControllerType::Motor;
        request.validate().unwrap();
        request.roles.push("mot1".into());
        assert!(request.validate().is_err());
    }

    #[test]
    fn element_request_checks_kind_and_index() {
        let mut request = CreateElementRequest {
            kind: ElementKind::ZeroDChannel,
            index: 2,
            name: "zerod2".into(),
            controller: "zctrl".into(),
        };
        request.validate().unwrap();
        assert_eq!(request.args(), vec!["2", "zerod2", "zctrl"]);

        request.index = 0;
        assert!(request.validate().is_err());

        request.index = 1;
        request.kind = ElementKind::PseudoMotor;
        assert!(request.validate().is_err());
    }

    #[test]
    fn group_request_rejects_self_and_duplicates() {
        let ok = CreateGroupRequest {
            name: "mg1".into(),
            members: vec!["mot1".into(), "mot2".into()],
        };
        ok.validate().unwrap();
        assert_eq!(ok.args(), vec!["mg1", "mot1", "mot2"]);

        let looped = CreateGroupRequest {
            name: "mg1".into(),
            members: vec!["mg1".into()],
        };
        assert!(looped.validate().is_err());

        let twice = CreateGroupRequest {
            name: "mg1".into(),
            members: vec!["mot1".into(), "mot1".into()],
        };
        assert!(twice.validate().is_err());

        let empty = CreateGroupRequest {
            name: "mg1".into(),
            members: Vec::new(),
        };
        assert!(empty.validate().is_err());
    }
}
