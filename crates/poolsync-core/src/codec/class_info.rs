// ── Class metadata decoding ──
//
// `GetControllerInfoEx` returns a NUL-separated byte blob followed by
// raw image payloads; `GetControllerInfo` returns the same leading
// fields as a string array. Both decoders are best effort: whatever
// was read before a malformed field is kept.

use bytes::{Buf, Bytes};
use tracing::warn;

use crate::model::{
    ClassImage, ClassInfo, ControllerType, ImageRole, PredefinedValue, PropertySchema, PropertyValue,
    RoleSchema,
};

const INVALID_IMAGE_SUFFIX: &str = "(invalid)";

/// Field reader over a NUL-terminated blob.
struct Blob {
    data: Bytes,
}

impl Blob {
    fn field(&mut self) -> Option<String> {
        if !self.data.has_remaining() {
            return None;
        }
        let end = self.data.iter().position(|b| *b == 0).unwrap_or(self.data.len());
        let raw = self.data.split_to(end);
        if self.data.has_remaining() {
            self.data.advance(1);
        }
        Some(String::from_utf8_lossy(&raw).into_owned())
    }

    fn number<T: std::str::FromStr>(&mut self) -> Option<T> {
        self.field()?.trim().parse().ok()
    }

    /// Property count; an unreadable count means no properties.
    fn property_count(&mut self) -> Option<usize> {
        Some(property_count(&self.field()?))
    }

    fn strings(&mut self, count: usize) -> Option<Vec<String>> {
        (0..count).map(|_| self.field()).collect()
    }

    fn bytes(&mut self, len: usize) -> Option<Bytes> {
        (self.data.remaining() >= len).then(|| self.data.split_to(len))
    }
}

fn property_count(raw: &str) -> usize {
    raw.trim().parse().unwrap_or_else(|_| {
        warn!(count = %raw, "unreadable property count, assuming no properties");
        0
    })
}

/// Decode a `GetControllerInfoEx` reply for a class of the given type.
pub fn decode_class_info(controller_type: ControllerType, blob: Bytes) -> ClassInfo {
    let mut info = ClassInfo::default();
    let mut reader = Blob { data: blob };
    if read_blob(controller_type, &mut reader, &mut info).is_none() {
        warn!(
            controller_type = %controller_type,
            description = %info.description,
            "class metadata blob is truncated or malformed, keeping partial record"
        );
    }
    info
}

fn read_blob(controller_type: ControllerType, r: &mut Blob, info: &mut ClassInfo) -> Option<()> {
    info.description = r.field()?;
    info.gender = r.field()?;
    info.model = r.field()?;
    info.organization = r.field()?;

    let property_count = r.property_count()?;
    for _ in 0..property_count {
        let name = r.field()?;
        let declared_type = r.field()?;
        let description = r.field()?;
        let default_value = r.field()?;
        info.properties.push(PropertySchema {
            name,
            declared_type,
            description,
            default_value: (!default_value.is_empty()).then_some(default_value),
        });
    }

    match controller_type {
        ControllerType::PseudoMotor | ControllerType::PseudoCounter => {
            let physical_count = r.number()?;
            let physical = r.strings(physical_count)?;
            let pseudo_count = r.number()?;
            let pseudo = r.strings(pseudo_count)?;
            info.roles = Some(RoleSchema { physical, pseudo });
        }
        ControllerType::IoRegister => {
            let count: usize = r.number()?;
            for _ in 0..count {
                let value = r.number()?;
                let label = r.field()?;
                info.predefined_values.push(PredefinedValue { value, label });
            }
        }
        _ => {}
    }

    let mut headers = Vec::with_capacity(3);
    for role in [ImageRole::Image, ImageRole::Logo, ImageRole::Icon] {
        let file_name = r.field()?;
        let size: usize = r.number()?;
        headers.push((role, file_name, size));
    }

    for (role, file_name, size) in headers {
        let data = r.bytes(size)?;
        if file_name.is_empty() || file_name.ends_with(INVALID_IMAGE_SUFFIX) || size == 0 {
            continue;
        }
        info.images.push(ClassImage { role, file_name, data });
    }

    Some(())
}

/// Decode a `GetControllerInfo` string-array reply (no roles, no images).
pub fn decode_class_info_fallback(fields: &[String]) -> ClassInfo {
    let mut info = ClassInfo::default();
    if read_fields(&mut fields.iter().cloned(), &mut info).is_none() {
        warn!(fields = fields.len(), "class info reply is truncated, keeping partial record");
    }
    info
}

fn read_fields(it: &mut impl Iterator<Item = String>, info: &mut ClassInfo) -> Option<()> {
    info.description = it.next()?;
    info.gender = it.next()?;
    info.model = it.next()?;
    info.organization = it.next()?;
    let count = property_count(&it.next()?);
    for _ in 0..count {
        let name = it.next()?;
        let declared_type = it.next()?;
        let description = it.next()?;
        let default_value = it.next()?;
        info.properties.push(PropertySchema {
            name,
            declared_type,
            description,
            default_value: (!default_value.is_empty()).then_some(default_value),
        });
    }
    Some(())
}

/// Decode the instance property values of a `GetControllerInfo` reply
/// issued with an instance name. Fields 0..4 repeat the class header,
/// field 4 is the property count followed by
/// `(name, type, description, value)` tuples.
pub fn decode_controller_properties(fields: &[String]) -> Vec<PropertyValue> {
    let Some(count) = fields.get(4).and_then(|c| c.trim().parse::<usize>().ok()) else {
        warn!(fields = fields.len(), "controller info reply lacks a property count");
        return Vec::new();
    };
    let tuples = fields[5..].chunks_exact(4).take(count);
    let values: Vec<PropertyValue> = tuples
        .map(|t| PropertyValue {
            name: t[0].clone(),
            declared_type: t[1].clone(),
            description: t[2].clone(),
            value: t[3].clone(),
        })
        .collect();
    if values.len() < count {
        warn!(expected = count, decoded = values.len(), "controller info reply is truncated");
    }
    values
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn blob(fields: &[&str], tail: &[u8]) -> Bytes {
        let mut out = Vec::new();
        for f in fields {
            out.extend_from_slice(f.as_bytes());
            out.push(0);
        }
        out.extend_from_slice(tail);
        Bytes::from(out)
    }

    #[test]
    fn motor_class_with_property_and_icon() {
        let data = blob(
            &[
                "IcePAP controller", "Motor", "IcePAP", "ALBA",
                "1",
                "Host", "PyTango.DevString", "IcePAP host", "icepap01",
                "(invalid)", "0",
                "", "0",
                "icon.png", "4",
            ],
            &[1, 0, 2, 3],
        );
        let info = decode_class_info(ControllerType::Motor, data);
        assert_eq!(info.description, "IcePAP controller");
        assert_eq!(info.organization, "ALBA");
        assert_eq!(info.property("Host").unwrap().default_value.as_deref(), Some("icepap01"));
        assert!(info.roles.is_none());
        assert_eq!(info.images.len(), 1);
        let icon = info.image(ImageRole::Icon).unwrap();
        assert_eq!(icon.file_name, "icon.png");
        assert_eq!(icon.data.as_ref(), &[1, 0, 2, 3]);
    }

    #[test]
    fn pseudo_motor_roles() {
        let data = blob(
            &[
                "Slit", "Slit", "Slit", "ALBA",
                "0",
                "2", "sl2t", "sl2b",
                "2", "Gap", "Offset",
                "", "0", "", "0", "", "0",
            ],
            &[],
        );
        let info = decode_class_info(ControllerType::PseudoMotor, data);
        assert_eq!(
            info.roles,
            Some(RoleSchema {
                physical: vec!["sl2t".into(), "sl2b".into()],
                pseudo: vec!["Gap".into(), "Offset".into()],
            })
        );
        assert!(info.images.is_empty());
    }

    #[test]
    fn io_register_predefined_values() {
        let data = blob(
            &["Shutter", "", "", "", "0", "2", "0", "closed", "1", "open", "", "0", "", "0", "", "0"],
            &[],
        );
        let info = decode_class_info(ControllerType::IoRegister, data);
        assert_eq!(
            info.predefined_values,
            vec![
                PredefinedValue { value: 0, label: "closed".into() },
                PredefinedValue { value: 1, label: "open".into() },
            ]
        );
    }

    #[test]
    fn truncated_blob_keeps_prefix() {
        let data = blob(&["Partial", "Motor", "M", "Org", "3", "OnlyName"], &[]);
        let info = decode_class_info(ControllerType::Motor, data);
        assert_eq!(info.description, "Partial");
        assert!(info.properties.is_empty());
    }

    #[test]
    fn unreadable_property_count_keeps_roles_and_images() {
        let data = blob(
            &[
                "Slit", "Slit", "Slit", "ALBA",
                "n/a",
                "1", "sl2t",
                "1", "Gap",
                "", "0", "", "0", "icon.png", "2",
            ],
            &[7, 7],
        );
        let info = decode_class_info(ControllerType::PseudoMotor, data);
        assert!(info.properties.is_empty());
        assert_eq!(
            info.roles,
            Some(RoleSchema {
                physical: vec!["sl2t".into()],
                pseudo: vec!["Gap".into()],
            })
        );
        assert_eq!(info.image(ImageRole::Icon).unwrap().data.as_ref(), &[7, 7]);
    }

    #[test]
    fn image_size_beyond_blob_is_dropped() {
        let data = blob(&["D", "", "", "", "0", "img.png", "100", "", "0", "", "0"], &[9, 9]);
        let info = decode_class_info(ControllerType::CounterTimer, data);
        assert_eq!(info.description, "D");
        assert!(info.images.is_empty());
    }

    #[test]
    fn fallback_string_array() {
        let fields: Vec<String> = ["Desc", "G", "M", "O", "1", "Port", "int", "Serial port", ""]
            .iter()
            .map(|s| (*s).to_owned())
            .collect();
        let info = decode_class_info_fallback(&fields);
        assert_eq!(info.model, "M");
        assert_eq!(info.properties.len(), 1);
        assert_eq!(info.properties[0].default_value, None);
    }

    #[test]
    fn controller_property_values() {
        let fields: Vec<String> = [
            "Motor", "icepap.py", "IcepapCtrl", "ctrl1",
            "2",
            "Host", "str", "host name", "icepap03",
            "Port", "int", "tcp port", "5000",
        ]
        .iter()
        .map(|s| (*s).to_owned())
        .collect();
        let values = decode_controller_properties(&fields);
        assert_eq!(values.len(), 2);
        assert_eq!(values[0].name, "Host");
        assert_eq!(values[0].value, "icepap03");
        assert_eq!(values[1].value, "5000");
    }

    #[test]
    fn controller_property_values_without_count() {
        let fields = vec!["Motor".to_owned()];
        assert!(decode_controller_properties(&fields).is_empty());
    }
}
