//! Court record schema and typed record construction.
//!
//! The field tables below are the single source for the model prompt contract,
//! JSON record construction, SQL column binding and the export header.

use serde_json::{Map, Value};

use crate::error::{CourtScoutError, Result};
use crate::types::{Location, NaturalKey};

// ---------------------------------------------------------------------------
// Field schema
// ---------------------------------------------------------------------------

/// Storage and coercion kind of a record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Float,
    /// Boolean stored as integer 0/1.
    Flag,
}

impl FieldKind {
    /// Type hint shown to the model.
    pub fn type_hint(&self) -> &'static str {
        match self {
            Self::Text => "str",
            Self::Integer | Self::Flag => "int",
            Self::Float => "float",
        }
    }

    /// Column affinity used in migrations.
    pub fn sql_type(&self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Integer | Self::Flag => "INTEGER",
            Self::Float => "REAL",
        }
    }
}

/// One named field of the external schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub description: &'static str,
    /// Audit fields are stored but never requested from the model.
    pub audit: bool,
}

const fn field(name: &'static str, kind: FieldKind, description: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        description,
        audit: false,
    }
}

const fn audit(name: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::Text,
        description: "audit field",
        audit: true,
    }
}

use FieldKind::{Flag, Float, Integer, Text};

/// Facility (court) fields, in column order.
pub const COURT_FIELDS: &[FieldSpec] = &[
    field("name", Text, "venue name"),
    field("description", Text, "venue description"),
    field("operator", Text, "managing or operating body (municipal, park, school)"),
    field("is_free", Flag, "whether the venue is open free of charge"),
    field("access_type", Text, "access type: open/gated/appointment/restricted"),
    field("province", Text, "province"),
    field("city", Text, "city"),
    field("district", Text, "district or county"),
    field("address", Text, "street address"),
    field("place_id", Text, "venue id assigned by a third-party map provider"),
    field("latitude", Float, "latitude in decimal degrees"),
    field("longtitude", Float, "longitude in decimal degrees"),
    field("nearest_transit", Text, "public transport description"),
    field("has_parking", Flag, "whether parking is available"),
    field("free_parking", Flag, "whether parking is free"),
    field("parking_type", Text, "parking type: on_street/lot/garage/none"),
    field("parking_fee_info", Text, "parking fee notes"),
    field("parking_capacity", Integer, "estimated number of parking spaces"),
    field("has_lights", Flag, "whether there is night lighting"),
    field("light_type", Text, "light type: flood/pole/led/none"),
    field("light_hours_desc", Text, "hours during which lights are on"),
    field("surface_type", Text, "ground surface material"),
    field("surface_notes", Text, "surface condition notes such as cracks or potholes"),
    field("total_units_count", Integer, "number of full courts (excluding standalone half courts)"),
    field("half_units_count", Integer, "number of half courts (excluding full courts)"),
    field("week_open_hours", Text, "weekly opening hours"),
    field("free_open_hours", Text, "weekly free-of-charge hours"),
    field("week_appointment_hours", Text, "weekly hours that require an appointment"),
    field("appointment_type_desc", Text, "how appointments are made"),
    field("amenities_summary", Text, "other facilities such as toilets, sinks, water fountains"),
    field("built_time", Text, "datetime the venue was built"),
    audit("gmt_create"),
    audit("creator"),
    audit("creator_id"),
    audit("gmt_modified"),
    audit("modifier_id"),
    audit("modifier"),
];

/// Sub-unit (individual court surface) fields, in column order.
pub const UNIT_FIELDS: &[FieldSpec] = &[
    field("unit_name", Text, "unit name or number, e.g. court A"),
    field("unit_type", Text, "unit type: full/half/3x3/multi"),
    field("length_m", Integer, "length in metres"),
    field("width_m", Integer, "width in metres"),
    field("is_standard", Flag, "whether the unit has regulation dimensions"),
    field("fenced", Flag, "whether the unit is fenced"),
    field("lines_painted", Flag, "whether court lines are clearly visible"),
    field("surface_condition_score", Integer, "overall condition score out of 100"),
    field("hoop_brand", Text, "hoop or backboard brand"),
    field("hoop_material", Text, "backboard material"),
    field("rim_type", Text, "rim type: breakaway/fixed/none"),
    field("rim_height_cm", Integer, "rim height in centimetres"),
    field("is_standard_rim", Flag, "whether the rim is regulation"),
    field("unit_status", Text, "unit status such as damaged or temporarily closed"),
    field("surface_type", Text, "unit ground surface material"),
    field("surface_status", Text, "unit ground surface condition"),
    audit("gmt_create"),
    audit("gmt_modified"),
    audit("modifier_id"),
    audit("modifier"),
    audit("creator_id"),
    audit("creator"),
];

/// Fields of a schema that the model is asked to fill.
pub fn prompted_fields(schema: &'static [FieldSpec]) -> impl Iterator<Item = &'static FieldSpec> {
    schema.iter().filter(|f| !f.audit)
}

// ---------------------------------------------------------------------------
// Field values
// ---------------------------------------------------------------------------

/// A populated field value. Flags are stored as `Integer(0 | 1)`.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Float(f64),
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
        }
    }
}

/// A field-level construction failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn coerce(spec: &FieldSpec, raw: &Value) -> std::result::Result<Option<FieldValue>, String> {
    let value = match raw {
        Value::Null => return Ok(None),
        Value::String(s) if s.trim().is_empty() => return Ok(None),
        other => other,
    };

    match spec.kind {
        FieldKind::Text => match value {
            Value::String(s) => Ok(Some(FieldValue::Text(s.trim().to_string()))),
            Value::Number(n) => Ok(Some(FieldValue::Text(n.to_string()))),
            Value::Bool(b) => Ok(Some(FieldValue::Text(b.to_string()))),
            _ => Err("expected text".into()),
        },
        FieldKind::Integer => match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|x| x.round() as i64))
                .map(|i| Some(FieldValue::Integer(i)))
                .ok_or_else(|| format!("number {n} out of range")),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().map(|x| x.round() as i64))
                    .map(|i| Some(FieldValue::Integer(i)))
                    .ok_or_else(|| format!("'{s}' is not an integer"))
            }
            Value::Bool(b) => Ok(Some(FieldValue::Integer(i64::from(*b)))),
            _ => Err("expected integer".into()),
        },
        FieldKind::Float => match value {
            Value::Number(n) => n
                .as_f64()
                .map(|x| Some(FieldValue::Float(x)))
                .ok_or_else(|| format!("number {n} out of range")),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(|x| Some(FieldValue::Float(x)))
                .map_err(|_| format!("'{}' is not a number", s.trim())),
            _ => Err("expected number".into()),
        },
        FieldKind::Flag => {
            let flag = match value {
                Value::Bool(b) => Some(*b),
                Value::Number(n) => match n.as_i64() {
                    Some(0) => Some(false),
                    Some(1) => Some(true),
                    _ => None,
                },
                Value::String(s) => match s.trim().to_lowercase().as_str() {
                    "true" | "1" | "yes" | "是" => Some(true),
                    "false" | "0" | "no" | "否" => Some(false),
                    _ => None,
                },
                _ => None,
            };
            flag.map(|b| Some(FieldValue::Integer(i64::from(b))))
                .ok_or_else(|| format!("'{value}' is not a flag"))
        }
    }
}

// ---------------------------------------------------------------------------
// RecordFields
// ---------------------------------------------------------------------------

/// A fixed field set bound to a schema table. Missing fields are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordFields {
    schema: &'static [FieldSpec],
    values: Vec<Option<FieldValue>>,
}

impl RecordFields {
    /// An all-empty record for `schema`.
    pub fn empty(schema: &'static [FieldSpec]) -> Self {
        Self {
            schema,
            values: vec![None; schema.len()],
        }
    }

    /// Build from a JSON object, keeping only known keys.
    ///
    /// Returns every field that failed coercion rather than stopping at the first.
    pub fn from_json(
        schema: &'static [FieldSpec],
        object: &Map<String, Value>,
    ) -> std::result::Result<Self, Vec<FieldError>> {
        let mut record = Self::empty(schema);
        let mut errors = Vec::new();

        for (slot, spec) in record.values.iter_mut().zip(schema) {
            let Some(raw) = object.get(spec.name) else {
                continue;
            };
            match coerce(spec, raw) {
                Ok(value) => *slot = value,
                Err(message) => errors.push(FieldError {
                    field: spec.name.to_string(),
                    message,
                }),
            }
        }

        if errors.is_empty() {
            Ok(record)
        } else {
            Err(errors)
        }
    }

    pub fn schema(&self) -> &'static [FieldSpec] {
        self.schema
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.schema.iter().position(|f| f.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.position(name).and_then(|i| self.values[i].as_ref())
    }

    /// Text value of a field, or `""` when empty or non-text.
    pub fn text(&self, name: &str) -> &str {
        match self.get(name) {
            Some(FieldValue::Text(s)) => s,
            _ => "",
        }
    }

    /// Rendered value of any field, `""` when empty.
    pub fn display(&self, name: &str) -> String {
        self.get(name).map(ToString::to_string).unwrap_or_default()
    }

    /// Set a text field; an empty string clears it. Returns false for unknown names.
    pub fn set_text(&mut self, name: &str, value: &str) -> bool {
        let Some(i) = self.position(name) else {
            return false;
        };
        let value = value.trim();
        self.values[i] = (!value.is_empty()).then(|| FieldValue::Text(value.to_string()));
        true
    }

    /// Populated fields in schema order.
    pub fn populated(&self) -> impl Iterator<Item = (&'static FieldSpec, &FieldValue)> {
        self.schema
            .iter()
            .zip(&self.values)
            .filter_map(|(spec, value)| value.as_ref().map(|v| (spec, v)))
    }

    pub fn is_empty(&self) -> bool {
        self.values.iter().all(Option::is_none)
    }
}

// ---------------------------------------------------------------------------
// CourtRecord / CourtUnitRecord
// ---------------------------------------------------------------------------

/// Primary facility record.
#[derive(Debug, Clone, PartialEq)]
pub struct CourtRecord(pub RecordFields);

impl Default for CourtRecord {
    fn default() -> Self {
        Self(RecordFields::empty(COURT_FIELDS))
    }
}

impl CourtRecord {
    pub fn from_json(object: &Map<String, Value>) -> std::result::Result<Self, Vec<FieldError>> {
        RecordFields::from_json(COURT_FIELDS, object).map(Self)
    }

    pub fn name(&self) -> &str {
        self.0.text("name")
    }

    /// Overwrite province, city and district with the run's target location.
    pub fn stamp_location(&mut self, location: &Location) {
        self.0.set_text("province", &location.province);
        self.0.set_text("city", &location.city);
        self.0.set_text("district", &location.district);
    }

    /// Dedup identity. Name and province are required; city and district may be empty.
    pub fn natural_key(&self) -> Result<NaturalKey> {
        let name = self.0.text("name").trim();
        let province = self.0.text("province").trim();
        if name.is_empty() {
            return Err(CourtScoutError::schema_mismatch("court has no name"));
        }
        if province.is_empty() {
            return Err(CourtScoutError::schema_mismatch(format!(
                "court '{name}' has no province"
            )));
        }
        Ok(NaturalKey {
            name: name.to_string(),
            province: province.to_string(),
            city: self.0.text("city").trim().to_string(),
            district: self.0.text("district").trim().to_string(),
        })
    }
}

/// Sub-unit record; its parent reference is assigned at insert time.
#[derive(Debug, Clone, PartialEq)]
pub struct CourtUnitRecord(pub RecordFields);

impl Default for CourtUnitRecord {
    fn default() -> Self {
        Self(RecordFields::empty(UNIT_FIELDS))
    }
}

impl CourtUnitRecord {
    pub fn from_json(object: &Map<String, Value>) -> std::result::Result<Self, Vec<FieldError>> {
        RecordFields::from_json(UNIT_FIELDS, object).map(Self)
    }

    pub fn unit_name(&self) -> &str {
        self.0.text("unit_name")
    }
}

// ---------------------------------------------------------------------------
// CandidateGroup
// ---------------------------------------------------------------------------

/// One parsed court with its units, before dedup and persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateGroup {
    pub success: bool,
    pub primary: CourtRecord,
    pub children: Vec<CourtUnitRecord>,
    /// Construction problems found while building the group.
    pub issues: Vec<String>,
}

impl CandidateGroup {
    /// Build a group from one array element.
    ///
    /// Never fails: an element that cannot be turned into a court becomes a
    /// `success = false` group carrying its issues. A unit that fails
    /// construction is dropped and noted in `issues`.
    pub fn from_json(element: &Value) -> Self {
        let mut group = Self {
            success: false,
            primary: CourtRecord::default(),
            children: Vec::new(),
            issues: Vec::new(),
        };

        let Some(object) = element.as_object() else {
            group.issues.push("element is not an object".into());
            return group;
        };

        let claimed = match object.get("success") {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_i64() == Some(1),
            Some(Value::String(s)) => matches!(s.trim().to_lowercase().as_str(), "true" | "1"),
            _ => false,
        };

        let primary = object
            .get("basketball_court")
            .or_else(|| object.get("primary"))
            .and_then(Value::as_object);
        let mut primary_ok = false;
        match primary {
            Some(fields) => match CourtRecord::from_json(fields) {
                Ok(record) => {
                    group.primary = record;
                    primary_ok = true;
                }
                Err(errors) => group
                    .issues
                    .extend(errors.iter().map(|e| format!("court field {e}"))),
            },
            None => group.issues.push("missing court object".into()),
        }

        let units = object
            .get("court_units")
            .or_else(|| object.get("children"))
            .and_then(Value::as_array);
        for (i, unit) in units.into_iter().flatten().enumerate() {
            let Some(fields) = unit.as_object() else {
                group.issues.push(format!("unit {i} is not an object"));
                continue;
            };
            match CourtUnitRecord::from_json(fields) {
                Ok(record) => group.children.push(record),
                Err(errors) => group.issues.extend(
                    errors.iter().map(|e| format!("unit {i} field {e}")),
                ),
            }
        }

        group.success = claimed && primary_ok;
        group
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn schema_tables_have_expected_shape() {
        assert_eq!(COURT_FIELDS.len(), 37);
        assert_eq!(UNIT_FIELDS.len(), 22);
        assert_eq!(prompted_fields(COURT_FIELDS).count(), 31);
        assert_eq!(prompted_fields(UNIT_FIELDS).count(), 16);
    }

    #[test]
    fn unknown_keys_dropped_and_empty_values_ignored() {
        let record = CourtRecord::from_json(&object(json!({
            "name": "  滨河公园篮球场 ",
            "address": "",
            "operator": null,
            "rating": 5
        })))
        .expect("valid record");
        assert_eq!(record.name(), "滨河公园篮球场");
        assert!(record.0.get("address").is_none());
        assert!(record.0.get("operator").is_none());
        assert_eq!(record.0.populated().count(), 1);
    }

    #[test]
    fn coerces_numbers_and_flags() {
        let record = CourtRecord::from_json(&object(json!({
            "is_free": "是",
            "has_lights": true,
            "has_parking": 0,
            "parking_capacity": "30",
            "total_units_count": 2.0,
            "latitude": "30.42",
            "place_id": 12345
        })))
        .expect("valid record");
        assert_eq!(record.0.get("is_free"), Some(&FieldValue::Integer(1)));
        assert_eq!(record.0.get("has_lights"), Some(&FieldValue::Integer(1)));
        assert_eq!(record.0.get("has_parking"), Some(&FieldValue::Integer(0)));
        assert_eq!(record.0.get("parking_capacity"), Some(&FieldValue::Integer(30)));
        assert_eq!(record.0.get("total_units_count"), Some(&FieldValue::Integer(2)));
        assert_eq!(record.0.get("latitude"), Some(&FieldValue::Float(30.42)));
        assert_eq!(record.0.text("place_id"), "12345");
    }

    #[test]
    fn collects_all_field_errors() {
        let errors = CourtRecord::from_json(&object(json!({
            "is_free": "maybe",
            "latitude": "north",
            "name": ["a"]
        })))
        .expect_err("invalid record");
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["name", "is_free", "latitude"]);
    }

    #[test]
    fn natural_key_requires_name_and_province() {
        let mut record = CourtRecord::default();
        record.0.set_text("name", "星光篮球场");
        assert!(matches!(
            record.natural_key(),
            Err(CourtScoutError::SchemaMismatch { .. })
        ));

        record.stamp_location(&Location::new("浙江省", "", "义乌市"));
        let key = record.natural_key().expect("key");
        assert_eq!(key.province, "浙江省");
        assert_eq!(key.city, "");
        assert_eq!(key.district, "义乌市");

        let unnamed = CourtRecord::default();
        assert!(unnamed.natural_key().is_err());
    }

    #[test]
    fn stamping_overwrites_model_location() {
        let mut record = CourtRecord::from_json(&object(json!({
            "name": "A",
            "province": "江苏省",
            "city": "南京市"
        })))
        .expect("valid");
        record.stamp_location(&Location::new("浙江省", "杭州市", "临平区"));
        assert_eq!(record.0.text("province"), "浙江省");
        assert_eq!(record.0.text("city"), "杭州市");
        assert_eq!(record.0.text("district"), "临平区");
    }

    #[test]
    fn group_from_model_shape() {
        let group = CandidateGroup::from_json(&json!({
            "success": true,
            "basketball_court": {"name": "临平体育公园"},
            "court_units": [{"unit_name": "A场", "unit_type": "full"}, {"unit_name": "B场"}]
        }));
        assert!(group.success);
        assert_eq!(group.primary.name(), "临平体育公园");
        assert_eq!(group.children.len(), 2);
        assert_eq!(group.children[0].unit_name(), "A场");
        assert!(group.issues.is_empty());
    }

    #[test]
    fn group_accepts_alias_keys() {
        let group = CandidateGroup::from_json(&json!({
            "success": "true",
            "primary": {"name": "X"},
            "children": [{"unit_name": "1"}]
        }));
        assert!(group.success);
        assert_eq!(group.children.len(), 1);
    }

    #[test]
    fn invalid_elements_become_failed_groups() {
        let not_object = CandidateGroup::from_json(&json!("court"));
        assert!(!not_object.success);
        assert_eq!(not_object.issues, vec!["element is not an object"]);

        let bad_field = CandidateGroup::from_json(&json!({
            "success": true,
            "basketball_court": {"name": "X", "latitude": "north"}
        }));
        assert!(!bad_field.success);
        assert_eq!(bad_field.issues.len(), 1);

        let missing = CandidateGroup::from_json(&json!({"success": true}));
        assert!(!missing.success);
    }

    #[test]
    fn bad_unit_is_dropped_but_court_survives() {
        let group = CandidateGroup::from_json(&json!({
            "success": true,
            "basketball_court": {"name": "X"},
            "court_units": [{"length_m": "long"}, {"unit_name": "B"}, 7]
        }));
        assert!(group.success);
        assert_eq!(group.children.len(), 1);
        assert_eq!(group.issues.len(), 2);
    }

    #[test]
    fn claimed_failure_is_respected() {
        let group = CandidateGroup::from_json(&json!({
            "success": false,
            "basketball_court": {"name": "X"}
        }));
        assert!(!group.success);
        assert_eq!(group.primary.name(), "X");
    }

    #[test]
    fn records_compare_by_schema_and_values() {
        let element = json!({
            "basketball_court": {"name": "滨河公园篮球场", "province": "浙江省"},
            "court_units": [{"unit_name": "A"}]
        });
        assert_eq!(
            CandidateGroup::from_json(&element),
            CandidateGroup::from_json(&element)
        );

        let mut renamed = CourtRecord::from_json(&object(json!({"name": "滨河公园篮球场"})))
            .expect("valid record");
        assert_ne!(renamed, CourtRecord::default());
        renamed.0.set_text("name", "");
        assert_eq!(renamed, CourtRecord::default());

        // Same (empty) values, different field tables.
        assert_ne!(
            RecordFields::empty(COURT_FIELDS),
            RecordFields::empty(UNIT_FIELDS)
        );
    }
}
