// ── Entity kinds and classifiers ──
//
// Fixed categories shared by the decoder, the graph, and the fanout.
// `EntityKind` names a collection; `ElementKind` names the concrete
// variant of a device entity living in one of those collections.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

// ── EntityKind ──────────────────────────────────────────────────────

/// One per-kind collection owned by the pool.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    ControllerClasses,
    Controllers,
    CommunicationChannels,
    IoRegisters,
    Motors,
    PseudoMotors,
    ExperimentChannels,
    PseudoCounters,
    MotorGroups,
    MeasurementGroups,
}

impl EntityKind {
    /// Dependency order used by bootstrap: every kind only resolves
    /// references into kinds that precede it.
    pub const BOOTSTRAP_ORDER: [Self; 10] = [
        Self::ControllerClasses,
        Self::Controllers,
        Self::CommunicationChannels,
        Self::IoRegisters,
        Self::Motors,
        Self::PseudoMotors,
        Self::ExperimentChannels,
        Self::PseudoCounters,
        Self::MotorGroups,
        Self::MeasurementGroups,
    ];

    /// Name of the pool attribute exposing this collection's snapshot.
    pub fn attribute(self) -> &'static str {
        match self {
            Self::ControllerClasses => "ControllerClassList",
            Self::Controllers => "ControllerList",
            Self::CommunicationChannels => "ComChannelList",
            Self::IoRegisters => "IORegisterList",
            Self::Motors => "MotorList",
            Self::PseudoMotors => "PseudoMotorList",
            Self::ExperimentChannels => "ExpChannelList",
            Self::PseudoCounters => "PseudoCounterList",
            Self::MotorGroups => "MotorGroupList",
            Self::MeasurementGroups => "MeasurementGroupList",
        }
    }

    /// Reverse of [`attribute`](Self::attribute).
    pub fn from_attribute(attribute: &str) -> Option<Self> {
        Self::BOOTSTRAP_ORDER
            .into_iter()
            .find(|kind| kind.attribute().eq_ignore_ascii_case(attribute))
    }

    /// `true` for collections holding device entities.
    pub fn holds_elements(self) -> bool {
        !matches!(self, Self::ControllerClasses | Self::Controllers)
    }

    /// Kinds whose device entities are owned by a controller.
    pub fn is_controller_owned(self) -> bool {
        matches!(
            self,
            Self::CommunicationChannels
                | Self::IoRegisters
                | Self::Motors
                | Self::PseudoMotors
                | Self::ExperimentChannels
                | Self::PseudoCounters
        )
    }
}

// ── ElementKind ─────────────────────────────────────────────────────

/// Concrete variant of a device entity.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum ElementKind {
    Motor,
    PseudoMotor,
    MotorGroup,
    CounterTimer,
    ZeroDChannel,
    OneDChannel,
    TwoDChannel,
    PseudoCounter,
    CommunicationChannel,
    IoRegister,
    MeasurementGroup,
}

impl ElementKind {
    /// Classify an experiment-channel type tag by its prefix.
    pub fn from_channel_tag(tag: &str) -> Option<Self> {
        // `PseudoCounter` must be tested before the generic prefixes.
        if tag.starts_with("PseudoCounter") {
            Some(Self::PseudoCounter)
        } else if tag.starts_with("Counter") {
            Some(Self::CounterTimer)
        } else if tag.starts_with("Zero") {
            Some(Self::ZeroDChannel)
        } else if tag.starts_with("One") {
            Some(Self::OneDChannel)
        } else if tag.starts_with("Two") {
            Some(Self::TwoDChannel)
        } else {
            None
        }
    }

    pub fn is_experiment_channel(self) -> bool {
        matches!(
            self,
            Self::CounterTimer
                | Self::ZeroDChannel
                | Self::OneDChannel
                | Self::TwoDChannel
                | Self::PseudoCounter
        )
    }

    /// Composite kinds carry a member list.
    pub fn is_composite(self) -> bool {
        matches!(
            self,
            Self::MotorGroup | Self::MeasurementGroup | Self::PseudoMotor | Self::PseudoCounter
        )
    }

    /// Collection a device of this kind is listed in. Pseudo counters
    /// may also appear among the experiment channels.
    pub fn collection(self) -> EntityKind {
        match self {
            Self::Motor => EntityKind::Motors,
            Self::PseudoMotor => EntityKind::PseudoMotors,
            Self::MotorGroup => EntityKind::MotorGroups,
            Self::CounterTimer | Self::ZeroDChannel | Self::OneDChannel | Self::TwoDChannel => {
                EntityKind::ExperimentChannels
            }
            Self::PseudoCounter => EntityKind::PseudoCounters,
            Self::CommunicationChannel => EntityKind::CommunicationChannels,
            Self::IoRegister => EntityKind::IoRegisters,
            Self::MeasurementGroup => EntityKind::MeasurementGroups,
        }
    }
}

// ── ControllerType ──────────────────────────────────────────────────

/// Declared kind of a controller class.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum ControllerType {
    Motor,
    PseudoMotor,
    CounterTimer,
    #[strum(to_string = "ZeroDExpChannel", serialize = "ZeroD")]
    ZeroDExpChannel,
    #[strum(to_string = "OneDExpChannel", serialize = "OneD")]
    OneDExpChannel,
    #[strum(to_string = "TwoDExpChannel", serialize = "TwoD")]
    TwoDExpChannel,
    PseudoCounter,
    Communication,
    #[strum(to_string = "IORegister")]
    IoRegister,
    Invalid,
}

impl ControllerType {
    /// Parse a type token, mapping anything unknown to `Invalid`.
    pub fn parse_lenient(token: &str) -> Self {
        token.parse().unwrap_or(Self::Invalid)
    }

    pub fn is_pseudo(self) -> bool {
        matches!(self, Self::PseudoMotor | Self::PseudoCounter)
    }
}

// ── Language ────────────────────────────────────────────────────────

/// Implementation language of a controller library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum Language {
    Python,
    Cpp,
    Unknown,
}

impl Language {
    /// Classify by library file extension.
    pub fn from_extension(extension: &str) -> Self {
        match extension.to_ascii_lowercase().as_str() {
            "py" => Self::Python,
            "la" | "so" => Self::Cpp,
            _ => Self::Unknown,
        }
    }

    /// Classify the language token of a controller line.
    pub fn from_token(token: &str) -> Self {
        if token.eq_ignore_ascii_case("cpp") {
            Self::Cpp
        } else {
            Self::Python
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn bootstrap_order_covers_every_kind_once() {
        let mut all: Vec<EntityKind> = EntityKind::iter().collect();
        let mut ordered = EntityKind::BOOTSTRAP_ORDER.to_vec();
        all.sort();
        ordered.sort();
        assert_eq!(all, ordered);
    }

    #[test]
    fn attribute_round_trips() {
        for kind in EntityKind::iter() {
            assert_eq!(EntityKind::from_attribute(kind.attribute()), Some(kind));
        }
        assert_eq!(EntityKind::from_attribute("NoSuchList"), None);
    }

    #[test]
    fn kinds_parse_from_kebab_case() {
        assert_eq!("motor-groups".parse::<EntityKind>().unwrap(), EntityKind::MotorGroups);
        assert_eq!("IO-Registers".parse::<EntityKind>().unwrap(), EntityKind::IoRegisters);
        assert_eq!(EntityKind::ControllerClasses.to_string(), "controller-classes");
    }

    #[test]
    fn channel_tags_classify_by_prefix() {
        assert_eq!(ElementKind::from_channel_tag("CounterTimer"), Some(ElementKind::CounterTimer));
        assert_eq!(ElementKind::from_channel_tag("ZeroDExpChannel"), Some(ElementKind::ZeroDChannel));
        assert_eq!(ElementKind::from_channel_tag("OneDExpChannel"), Some(ElementKind::OneDChannel));
        assert_eq!(ElementKind::from_channel_tag("TwoDExpChannel"), Some(ElementKind::TwoDChannel));
        assert_eq!(ElementKind::from_channel_tag("PseudoCounter"), Some(ElementKind::PseudoCounter));
        assert_eq!(ElementKind::from_channel_tag("Motor"), None);
    }

    #[test]
    fn controller_type_is_lenient() {
        assert_eq!(ControllerType::parse_lenient("Motor"), ControllerType::Motor);
        assert_eq!(ControllerType::parse_lenient("ioregister"), ControllerType::IoRegister);
        assert_eq!(ControllerType::parse_lenient("ZeroD"), ControllerType::ZeroDExpChannel);
        assert_eq!(ControllerType::parse_lenient("Toaster"), ControllerType::Invalid);
    }

    #[test]
    fn language_classification() {
        assert_eq!(Language::from_extension("py"), Language::Python);
        assert_eq!(Language::from_extension("la"), Language::Cpp);
        assert_eq!(Language::from_extension("txt"), Language::Unknown);
        assert_eq!(Language::from_token("CPP"), Language::Cpp);
        assert_eq!(Language::from_token("Python"), Language::Python);
    }
}
