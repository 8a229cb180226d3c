use crate::metadata::{ColumnMetadata, ColumnType};
use crate::value::Value;
use chrono::{DateTime, NaiveDateTime, Utc};

/// Turns a raw driver value into the representation entities were hydrated with.
///
/// Must be deterministic: two raw values denoting the same identifier have to coerce
/// to equal [`Value`]s, otherwise relation maps will not match entities.
pub trait ValueCoercion {
    fn prepare_hydrated_value(&self, raw: &Value, column: &ColumnMetadata) -> Value;
}

impl<F> ValueCoercion for F
where
    F: Fn(&Value, &ColumnMetadata) -> Value,
{
    fn prepare_hydrated_value(&self, raw: &Value, column: &ColumnMetadata) -> Value {
        self(raw, column)
    }
}

/// Leaves values untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityCoercion;

impl ValueCoercion for IdentityCoercion {
    fn prepare_hydrated_value(&self, raw: &Value, _column: &ColumnMetadata) -> Value {
        raw.clone()
    }
}

const TIMESTAMP_PATTERNS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Hydrates by declared column type the way text based drivers do.
/// Values that cannot be converted are passed through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypedCoercion;

impl ValueCoercion for TypedCoercion {
    fn prepare_hydrated_value(&self, raw: &Value, column: &ColumnMetadata) -> Value {
        let coerced = match (column.column_type, raw) {
            (_, Value::Null) => None,
            (ColumnType::Int, Value::Text(s)) => s.trim().parse::<i64>().ok().map(Value::Int),
            (ColumnType::Int, Value::Float(f)) if f.fract() == 0.0 => Some(Value::Int(*f as i64)),
            (ColumnType::Int, Value::Bool(b)) => Some(Value::Int(*b as i64)),
            (ColumnType::Float, Value::Int(i)) => Some(Value::Float(*i as f64)),
            (ColumnType::Float, Value::Text(s)) => s.trim().parse::<f64>().ok().map(Value::Float),
            (ColumnType::Bool, Value::Int(i)) if *i == 0 || *i == 1 => Some(Value::Bool(*i == 1)),
            (ColumnType::Bool, Value::Text(s)) => parse_bool(s).map(Value::Bool),
            (ColumnType::Text, Value::Int(i)) => Some(Value::Text(i.to_string())),
            (ColumnType::Text, Value::Float(f)) => Some(Value::Text(f.to_string())),
            (ColumnType::Uuid, Value::Text(s)) => Some(Value::Text(s.to_lowercase())),
            (ColumnType::Timestamp, Value::Text(s)) => parse_timestamp(s).map(Value::Timestamp),
            (ColumnType::Timestamp, Value::Int(millis)) => DateTime::<Utc>::from_timestamp_millis(*millis).map(|dt| Value::Timestamp(dt.naive_utc())),
            _ => None,
        };
        coerced.unwrap_or_else(|| raw.clone())
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "t" | "1" => Some(true),
        "false" | "f" | "0" => Some(false),
        _ => None,
    }
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    TIMESTAMP_PATTERNS
        .iter()
        .find_map(|pattern| NaiveDateTime::parse_from_str(s, pattern).ok())
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.naive_utc()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn column(column_type: ColumnType) -> ColumnMetadata {
        ColumnMetadata::new("id", "id", column_type)
    }

    #[test]
    fn identity_keeps_representation() {
        let raw = Value::Text("7".into());
        assert_eq!(IdentityCoercion.prepare_hydrated_value(&raw, &column(ColumnType::Int)), raw);
    }

    #[test]
    fn numeric_strings_become_integers() {
        let int = column(ColumnType::Int);
        assert_eq!(TypedCoercion.prepare_hydrated_value(&Value::Text(" 42 ".into()), &int), Value::Int(42));
        assert_eq!(TypedCoercion.prepare_hydrated_value(&Value::Float(3.0), &int), Value::Int(3));
        assert_eq!(TypedCoercion.prepare_hydrated_value(&Value::Text("x".into()), &int), Value::Text("x".into()));
    }

    #[test]
    fn null_stays_null_for_every_type() {
        for column_type in [ColumnType::Int, ColumnType::Float, ColumnType::Bool, ColumnType::Text, ColumnType::Uuid, ColumnType::Timestamp] {
            assert_eq!(TypedCoercion.prepare_hydrated_value(&Value::Null, &column(column_type)), Value::Null);
        }
    }

    #[test]
    fn uuids_are_case_folded() {
        let raw = Value::Text("A1B2C3D4-0000-4000-8000-ABCDEF012345".into());
        assert_eq!(
            TypedCoercion.prepare_hydrated_value(&raw, &column(ColumnType::Uuid)),
            Value::Text("a1b2c3d4-0000-4000-8000-abcdef012345".into())
        );
    }

    #[test]
    fn booleans_and_text() {
        assert_eq!(TypedCoercion.prepare_hydrated_value(&Value::Int(1), &column(ColumnType::Bool)), Value::Bool(true));
        assert_eq!(TypedCoercion.prepare_hydrated_value(&Value::Text("f".into()), &column(ColumnType::Bool)), Value::Bool(false));
        assert_eq!(TypedCoercion.prepare_hydrated_value(&Value::Int(9), &column(ColumnType::Text)), Value::Text("9".into()));
    }

    #[test]
    fn timestamps_parse_from_text_and_epoch_millis() {
        let expected = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap().and_hms_opt(12, 30, 0).unwrap();
        let ts = column(ColumnType::Timestamp);
        assert_eq!(TypedCoercion.prepare_hydrated_value(&Value::Text("2024-05-01 12:30:00".into()), &ts), Value::Timestamp(expected));
        assert_eq!(TypedCoercion.prepare_hydrated_value(&Value::Text("2024-05-01T12:30:00Z".into()), &ts), Value::Timestamp(expected));
        let millis = expected.and_utc().timestamp_millis();
        assert_eq!(TypedCoercion.prepare_hydrated_value(&Value::Int(millis), &ts), Value::Timestamp(expected));
    }

    #[test]
    fn closures_act_as_coercions() {
        let upper = |raw: &Value, _: &ColumnMetadata| match raw {
            Value::Text(s) => Value::Text(s.to_uppercase()),
            other => other.clone(),
        };
        assert_eq!(upper.prepare_hydrated_value(&Value::Text("ab".into()), &column(ColumnType::Text)), Value::Text("AB".into()));
    }
}
