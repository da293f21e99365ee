// ── Per-kind line grammars ──
//
// Each parser consumes one line with a `Cursor` and either yields a
// descriptor or a `DecodeError::Malformed` naming the first token that
// did not fit.

use super::cursor::Cursor;
use super::{ClassDescriptor, ControllerDescriptor, ElementDescriptor, Placement};
use crate::error::DecodeError;
use crate::model::{ControllerType, ElementKind, EntityKind, Language, ModuleIdentity, class_key};

type Parsed<T> = Result<T, DecodeError>;

// ── Controller classes / controllers ────────────────────────────────

/// `CLASS (FULL/PATH/file.ext) TYPE [REST]`
pub(super) fn controller_class(line: &str) -> Parsed<ClassDescriptor> {
    let kind = EntityKind::ControllerClasses;
    let mut c = Cursor::new(line);

    let class_name = name_token(kind, &mut c)?;
    let full_path = c
        .paren()
        .map(str::trim)
        .filter(|p| !p.is_empty() && !p.contains(char::is_whitespace))
        .ok_or_else(|| DecodeError::malformed(kind, "missing library path"))?;
    let raw_type = c
        .word()
        .ok_or_else(|| DecodeError::malformed(kind, "missing controller type"))?;

    let module = ModuleIdentity::from_full_path(full_path);
    Ok(ClassDescriptor {
        key: class_key(&module.file_name, class_name),
        class_name: class_name.to_owned(),
        module,
        controller_type: ControllerType::parse_lenient(raw_type),
        raw_type: raw_type.to_owned(),
    })
}

/// `NAME (MODULE.CLASS/FILE) - TYPE LANGUAGE [WORDS..] (LIBFILE) [REST]`
pub(super) fn controller(line: &str) -> Parsed<ControllerDescriptor> {
    let kind = EntityKind::Controllers;
    let mut c = Cursor::new(line);

    let name = name_token(kind, &mut c)?;
    let identity = c
        .paren()
        .ok_or_else(|| DecodeError::malformed(kind, "missing MODULE.CLASS/FILE block"))?;
    let (qualified, instance_file) = identity
        .split_once('/')
        .ok_or_else(|| DecodeError::malformed(kind, "class block lacks '/FILE'"))?;
    let (module, class_name) = qualified
        .split_once('.')
        .filter(|(m, cl)| !m.is_empty() && !cl.is_empty())
        .ok_or_else(|| DecodeError::malformed(kind, "class block lacks 'MODULE.CLASS'"))?;

    if c.word() != Some("-") {
        return Err(DecodeError::malformed(kind, "expected '-' after class block"));
    }
    let raw_type = c
        .word()
        .ok_or_else(|| DecodeError::malformed(kind, "missing controller type"))?;
    let language = c
        .word()
        .ok_or_else(|| DecodeError::malformed(kind, "missing language"))?;

    // Free-form words may precede the library block.
    while !c.at_paren() {
        if c.word().is_none() {
            return Err(DecodeError::malformed(kind, "missing library block"));
        }
    }
    let library = c
        .paren()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .ok_or_else(|| DecodeError::malformed(kind, "empty library block"))?;

    Ok(ControllerDescriptor {
        name: name.to_owned(),
        module: module.to_owned(),
        class_name: class_name.to_owned(),
        instance_file: instance_file.trim().to_owned(),
        declared_type: ControllerType::parse_lenient(raw_type),
        raw_type: raw_type.to_owned(),
        language: Language::from_token(language),
        library: library.to_owned(),
        extra: c.remainder().to_owned(),
    })
}

// ── Device entities ─────────────────────────────────────────────────

/// `NAME (a/b/c) (CTRLPATH/INDEX) [REST]`
pub(super) fn placed(kind: EntityKind, element: ElementKind, line: &str) -> Parsed<ElementDescriptor> {
    let mut c = Cursor::new(line);
    let mut descriptor = placed_head(kind, element, &mut c)?;
    descriptor.extra = non_empty(c.remainder());
    Ok(descriptor)
}

/// `NAME (a/b/c) (CTRLPATH/INDEX) PseudoMotor Motor list: m1, m2 [(EXTRA)]`
pub(super) fn pseudo_motor(line: &str) -> Parsed<ElementDescriptor> {
    let kind = EntityKind::PseudoMotors;
    let mut c = Cursor::new(line);
    let mut descriptor = placed_head(kind, ElementKind::PseudoMotor, &mut c)?;
    if !c.expect_words(&["PseudoMotor", "Motor", "list:"]) {
        return Err(DecodeError::malformed(kind, "expected 'PseudoMotor Motor list:'"));
    }
    let members = member_list(&mut c);
    if members.is_empty() {
        return Err(DecodeError::malformed(kind, "pseudo motor without motors"));
    }
    descriptor.members = Some(members);
    descriptor.extra = extra_block(kind, c)?;
    Ok(descriptor)
}

/// `NAME (a/b/c) (CTRLPATH/INDEX) PseudoCounter Counter list: [c1, c2] [(EXTRA)]`
pub(super) fn pseudo_counter(line: &str) -> Parsed<ElementDescriptor> {
    let kind = EntityKind::PseudoCounters;
    let mut c = Cursor::new(line);
    let mut descriptor = placed_head(kind, ElementKind::PseudoCounter, &mut c)?;
    if !c.expect_words(&["PseudoCounter", "Counter", "list:"]) {
        return Err(DecodeError::malformed(kind, "expected 'PseudoCounter Counter list:'"));
    }
    descriptor.members = Some(member_list(&mut c));
    descriptor.extra = extra_block(kind, c)?;
    Ok(descriptor)
}

/// `NAME (a/b/c) (CTRLPATH/INDEX) TYPETAG [REST]`
pub(super) fn experiment_channel(line: &str) -> Parsed<ElementDescriptor> {
    let kind = EntityKind::ExperimentChannels;
    let mut c = Cursor::new(line);
    // Subtype is only known after the tag; start from a placeholder.
    let mut descriptor = placed_head(kind, ElementKind::CounterTimer, &mut c)?;
    let tag = c
        .word()
        .ok_or_else(|| DecodeError::malformed(kind, "missing channel type tag"))?;
    descriptor.kind = ElementKind::from_channel_tag(tag)
        .ok_or_else(|| DecodeError::malformed(kind, format!("unknown channel type '{tag}'")))?;
    descriptor.channel_tag = Some(tag.to_owned());
    descriptor.extra = non_empty(c.remainder());
    Ok(descriptor)
}

/// `NAME (a/b/c) Motor list: m1, g1, pm1 [(EXTRA)]`
pub(super) fn motor_group(line: &str) -> Parsed<ElementDescriptor> {
    let kind = EntityKind::MotorGroups;
    let mut c = Cursor::new(line);
    let mut descriptor = unplaced_head(kind, ElementKind::MotorGroup, &mut c)?;
    if !c.expect_words(&["Motor", "list:"]) {
        return Err(DecodeError::malformed(kind, "expected 'Motor list:'"));
    }
    let members = member_list(&mut c);
    if members.is_empty() {
        return Err(DecodeError::malformed(kind, "motor group without members"));
    }
    descriptor.members = Some(members);
    descriptor.extra = extra_block(kind, c)?;
    Ok(descriptor)
}

/// `NAME (a/b/c) ExpChannel list: [c1, c2] [(EXTRA)]`
pub(super) fn measurement_group(line: &str) -> Parsed<ElementDescriptor> {
    let kind = EntityKind::MeasurementGroups;
    let mut c = Cursor::new(line);
    let mut descriptor = unplaced_head(kind, ElementKind::MeasurementGroup, &mut c)?;
    if !c.expect_words(&["ExpChannel", "list:"]) {
        return Err(DecodeError::malformed(kind, "expected 'ExpChannel list:'"));
    }
    descriptor.members = Some(member_list(&mut c));
    descriptor.extra = extra_block(kind, c)?;
    Ok(descriptor)
}

// ── Shared pieces ───────────────────────────────────────────────────

fn name_token<'a>(kind: EntityKind, c: &mut Cursor<'a>) -> Parsed<&'a str> {
    match c.word() {
        Some(name) if !name.starts_with('(') => Ok(name),
        _ => Err(DecodeError::malformed(kind, "missing name")),
    }
}

fn address_token(kind: EntityKind, c: &mut Cursor<'_>) -> Parsed<String> {
    let address = c
        .paren()
        .map(str::trim)
        .ok_or_else(|| DecodeError::malformed(kind, "missing address block"))?;
    let segments: Vec<&str> = address.split('/').collect();
    if segments.len() != 3 || segments.iter().any(|s| s.is_empty() || s.contains(char::is_whitespace)) {
        return Err(DecodeError::malformed(
            kind,
            format!("address '{address}' is not a three-segment device name"),
        ));
    }
    Ok(address.to_owned())
}

fn placement_token(kind: EntityKind, c: &mut Cursor<'_>) -> Parsed<Placement> {
    let block = c
        .paren()
        .map(str::trim)
        .ok_or_else(|| DecodeError::malformed(kind, "missing controller block"))?;
    let mut segments = block.rsplit('/');
    let index = segments
        .next()
        .and_then(|s| s.parse::<u32>().ok())
        .ok_or_else(|| DecodeError::malformed(kind, format!("'{block}' lacks a numeric index")))?;
    let controller = segments
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| DecodeError::malformed(kind, format!("'{block}' lacks a controller")))?;
    Ok(Placement {
        controller: controller.to_owned(),
        index,
    })
}

fn unplaced_head(kind: EntityKind, element: ElementKind, c: &mut Cursor<'_>) -> Parsed<ElementDescriptor> {
    let name = name_token(kind, c)?;
    let address = address_token(kind, c)?;
    Ok(ElementDescriptor {
        name: name.to_owned(),
        address,
        kind: element,
        placement: None,
        members: None,
        channel_tag: None,
        extra: None,
    })
}

fn placed_head(kind: EntityKind, element: ElementKind, c: &mut Cursor<'_>) -> Parsed<ElementDescriptor> {
    let mut descriptor = unplaced_head(kind, element, c)?;
    descriptor.placement = Some(placement_token(kind, c)?);
    Ok(descriptor)
}

/// Comma-separated names up to an optional `(EXTRA)` block.
fn member_list(c: &mut Cursor<'_>) -> Vec<String> {
    c.until_paren()
        .split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Optional trailing `(EXTRA)`; anything after it is malformed.
fn extra_block(kind: EntityKind, mut c: Cursor<'_>) -> Parsed<Option<String>> {
    if !c.at_paren() {
        return Ok(None);
    }
    let extra = c
        .paren()
        .ok_or_else(|| DecodeError::malformed(kind, "unterminated extra block"))?;
    if !c.remainder().is_empty() {
        return Err(DecodeError::malformed(kind, "trailing text after extra block"));
    }
    Ok(non_empty(extra))
}

fn non_empty(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_owned())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn controller_line_from_scenario() {
        let d = controller("ctrl1 (icepap.IcepapCtrl/icepap.py) - Motor Python (icepap.py)").unwrap();
        assert_eq!(d.name, "ctrl1");
        assert_eq!(d.module, "icepap");
        assert_eq!(d.class_name, "IcepapCtrl");
        assert_eq!(d.instance_file, "icepap.py");
        assert_eq!(d.declared_type, ControllerType::Motor);
        assert_eq!(d.language, Language::Python);
        assert_eq!(d.library, "icepap.py");
        assert_eq!(d.extra, "");
    }

    #[test]
    fn controller_line_with_extra_words() {
        let d = controller(
            "vct (libDummyCT.DummyCT/dummyct) - CounterTimer Cpp ctrl (libDummyCT.la) Counter list: a",
        )
        .unwrap();
        assert_eq!(d.language, Language::Cpp);
        assert_eq!(d.declared_type, ControllerType::CounterTimer);
        assert_eq!(d.library, "libDummyCT.la");
        assert_eq!(d.extra, "Counter list: a");
    }

    #[test]
    fn controller_line_requires_library_block() {
        let err = controller("ctrl1 (icepap.IcepapCtrl/icepap.py) - Motor Python").unwrap_err();
        assert!(err.to_string().contains("library"));
        assert!(controller("ctrl1 (IcepapCtrl/icepap.py) - Motor Python (icepap.py)").is_err());
        assert!(controller("ctrl1 (icepap.IcepapCtrl/icepap.py) Motor Python (icepap.py)").is_err());
    }

    #[test]
    fn class_line() {
        let d = controller_class("IcepapCtrl (/opt/pool/ctrl/icepap.py) Motor").unwrap();
        assert_eq!(d.key, "icepap.py/IcepapCtrl");
        assert_eq!(d.module.path, "/opt/pool/ctrl");
        assert_eq!(d.controller_type, ControllerType::Motor);
        assert!(controller_class("IcepapCtrl (/opt/pool/ctrl/icepap.py)").is_err());
        assert!(controller_class("IcepapCtrl () Motor").is_err());
    }

    #[test]
    fn motor_line_from_scenario() {
        let d = placed(EntityKind::Motors, ElementKind::Motor, "mot1 (motor/ctrl1/1) (ctrl1/1)").unwrap();
        assert_eq!(
            d,
            ElementDescriptor {
                name: "mot1".into(),
                address: "motor/ctrl1/1".into(),
                kind: ElementKind::Motor,
                placement: Some(Placement {
                    controller: "ctrl1".into(),
                    index: 1
                }),
                members: None,
                channel_tag: None,
                extra: None,
            }
        );
    }

    #[test]
    fn owning_controller_is_segment_before_index() {
        let d = placed(
            EntityKind::Motors,
            ElementKind::Motor,
            "mot7 (motor/ctrl2/7) (controller/IcePAP/ctrl2/7) trailing",
        )
        .unwrap();
        assert_eq!(d.placement.unwrap().controller, "ctrl2");
        assert_eq!(d.extra.as_deref(), Some("trailing"));
    }

    #[test]
    fn address_must_have_three_segments() {
        for line in [
            "mot1 (motor/ctrl1) (ctrl1/1)",
            "mot1 (motor//1) (ctrl1/1)",
            "mot1 (a/b/c/d) (ctrl1/1)",
        ] {
            assert!(placed(EntityKind::Motors, ElementKind::Motor, line).is_err(), "{line}");
        }
    }

    #[test]
    fn index_must_be_numeric() {
        assert!(placed(EntityKind::Motors, ElementKind::Motor, "mot1 (motor/ctrl1/1) (ctrl1/x)").is_err());
        assert!(placed(EntityKind::Motors, ElementKind::Motor, "mot1 (motor/ctrl1/1) (/1)").is_err());
    }

    #[test]
    fn pseudo_motor_members() {
        let d = pseudo_motor("gap (pm/slit/1) (slitctrl/1) PseudoMotor Motor list: top, bottom (slit gap)").unwrap();
        assert_eq!(d.members.unwrap(), vec!["top", "bottom"]);
        assert_eq!(d.extra.as_deref(), Some("slit gap"));
        assert!(pseudo_motor("gap (pm/slit/1) (slitctrl/1) PseudoMotor Motor list:").is_err());
    }

    #[test]
    fn pseudo_counter_allows_empty_list() {
        let d = pseudo_counter("sum (pc/sumctrl/1) (sumctrl/1) PseudoCounter Counter list:").unwrap();
        assert_eq!(d.members, Some(vec![]));
        assert_eq!(d.kind, ElementKind::PseudoCounter);
    }

    #[test]
    fn experiment_channel_subtypes() {
        let cases = [
            ("CounterTimer", ElementKind::CounterTimer),
            ("ZeroDExpChannel", ElementKind::ZeroDChannel),
            ("OneDExpChannel", ElementKind::OneDChannel),
            ("TwoDExpChannel", ElementKind::TwoDChannel),
            ("PseudoCounter", ElementKind::PseudoCounter),
        ];
        for (tag, expected) in cases {
            let line = format!("ch (expchan/c/1) (c/1) {tag}");
            assert_eq!(experiment_channel(&line).unwrap().kind, expected);
        }
        assert!(experiment_channel("ch (expchan/c/1) (c/1) Motor").is_err());
        assert!(experiment_channel("ch (expchan/c/1) (c/1)").is_err());
    }

    #[test]
    fn motor_group_requires_members() {
        let d = motor_group("mg1 (mg/pool/mg1) Motor list: mot1, mg0, pm1").unwrap();
        assert_eq!(d.members.unwrap(), vec!["mot1", "mg0", "pm1"]);
        assert!(d.placement.is_none());
        assert!(motor_group("mg1 (mg/pool/mg1) Motor list:").is_err());
        assert!(motor_group("mg1 (mg/pool/mg1) ExpChannel list: a").is_err());
    }

    #[test]
    fn measurement_group_channels() {
        let d = measurement_group("mnt (mntgrp/pool/mnt) ExpChannel list: ct01, ct02 (timer ct01)").unwrap();
        assert_eq!(d.members.unwrap(), vec!["ct01", "ct02"]);
        assert_eq!(d.extra.as_deref(), Some("timer ct01"));

        let empty = measurement_group("mnt (mntgrp/pool/mnt) ExpChannel list:").unwrap();
        assert_eq!(empty.members, Some(vec![]));

        assert!(measurement_group("mnt (mntgrp/pool/mnt) ExpChannel list: a (x) junk").is_err());
    }
}
