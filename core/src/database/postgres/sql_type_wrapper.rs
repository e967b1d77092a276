use std::str::FromStr;

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde_json::Value;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type as PgType};
use uuid::Uuid;

/// A single bound parameter. Values carry their widest natural representation and are narrowed to
/// the parameter type Postgres inferred for the prepared statement when they are encoded.
#[derive(Debug, Clone, PartialEq)]
pub enum PgValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Numeric(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
    Json(Value),
    TextArray(Vec<Option<String>>),
}

fn is_text_type(ty: &PgType) -> bool {
    *ty == PgType::TEXT || *ty == PgType::VARCHAR || *ty == PgType::BPCHAR || *ty == PgType::NAME
}

fn int_to_sql(
    value: i64,
    ty: &PgType,
    out: &mut BytesMut,
) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
    if *ty == PgType::INT2 {
        i16::try_from(value)?.to_sql(ty, out)
    } else if *ty == PgType::INT4 {
        i32::try_from(value)?.to_sql(ty, out)
    } else if *ty == PgType::NUMERIC {
        Decimal::from(value).to_sql(ty, out)
    } else if *ty == PgType::FLOAT4 {
        (value as f32).to_sql(ty, out)
    } else if *ty == PgType::FLOAT8 {
        (value as f64).to_sql(ty, out)
    } else if is_text_type(ty) {
        value.to_string().to_sql(ty, out)
    } else {
        value.to_sql_checked(ty, out)
    }
}

impl ToSql for PgValue {
    fn to_sql(
        &self,
        ty: &PgType,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            PgValue::Null => Ok(IsNull::Yes),
            PgValue::Bool(value) => value.to_sql_checked(ty, out),
            PgValue::Int(value) => int_to_sql(*value, ty, out),
            PgValue::UInt(value) => {
                if *ty == PgType::NUMERIC {
                    Decimal::from(*value).to_sql(ty, out)
                } else if is_text_type(ty) {
                    value.to_string().to_sql(ty, out)
                } else {
                    int_to_sql(i64::try_from(*value)?, ty, out)
                }
            }
            PgValue::Float(value) => {
                if *ty == PgType::FLOAT4 {
                    (*value as f32).to_sql(ty, out)
                } else if *ty == PgType::NUMERIC {
                    Decimal::try_from(*value)?.to_sql(ty, out)
                } else if is_text_type(ty) {
                    value.to_string().to_sql(ty, out)
                } else {
                    value.to_sql_checked(ty, out)
                }
            }
            PgValue::Numeric(value) => {
                if *ty == PgType::FLOAT8 || *ty == PgType::FLOAT4 {
                    let float = value
                        .to_f64()
                        .ok_or_else(|| format!("numeric {} does not fit a float", value))?;
                    PgValue::Float(float).to_sql(ty, out)
                } else if *ty == PgType::INT2 || *ty == PgType::INT4 || *ty == PgType::INT8 {
                    int_to_sql(i64::try_from(*value)?, ty, out)
                } else if is_text_type(ty) {
                    value.to_string().to_sql(ty, out)
                } else {
                    value.to_sql_checked(ty, out)
                }
            }
            PgValue::Text(value) => {
                if *ty == PgType::JSON || *ty == PgType::JSONB {
                    serde_json::from_str::<Value>(value)?.to_sql(ty, out)
                } else if *ty == PgType::UUID {
                    Uuid::parse_str(value)?.to_sql(ty, out)
                } else if *ty == PgType::NUMERIC {
                    Decimal::from_str(value)?.to_sql(ty, out)
                } else {
                    value.to_sql_checked(ty, out)
                }
            }
            PgValue::Bytes(value) => value.to_sql_checked(ty, out),
            PgValue::Uuid(value) => {
                if is_text_type(ty) {
                    value.to_string().to_sql(ty, out)
                } else if *ty == PgType::BYTEA {
                    value.as_bytes().as_slice().to_sql(ty, out)
                } else {
                    value.to_sql_checked(ty, out)
                }
            }
            PgValue::Timestamp(value) => {
                if *ty == PgType::TIMESTAMP {
                    value.naive_utc().to_sql(ty, out)
                } else if *ty == PgType::DATE {
                    value.date_naive().to_sql(ty, out)
                } else {
                    value.to_sql_checked(ty, out)
                }
            }
            PgValue::Date(value) => value.to_sql_checked(ty, out),
            PgValue::Json(value) => value.to_sql_checked(ty, out),
            PgValue::TextArray(values) => values.to_sql_checked(ty, out),
        }
    }

    fn accepts(_ty: &PgType) -> bool {
        true // narrowing happens in to_sql
    }

    to_sql_checked!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: &PgValue, ty: &PgType) -> Result<(IsNull, Vec<u8>), String> {
        let mut out = BytesMut::new();
        let is_null = value.to_sql(ty, &mut out).map_err(|e| e.to_string())?;
        Ok((is_null, out.to_vec()))
    }

    #[test]
    fn test_int_narrows_to_parameter_type() {
        let (_, int2) = encode(&PgValue::Int(7), &PgType::INT2).unwrap();
        assert_eq!(int2, 7i16.to_be_bytes().to_vec());

        let (_, int4) = encode(&PgValue::Int(7), &PgType::INT4).unwrap();
        assert_eq!(int4, 7i32.to_be_bytes().to_vec());

        let (_, int8) = encode(&PgValue::Int(7), &PgType::INT8).unwrap();
        assert_eq!(int8, 7i64.to_be_bytes().to_vec());

        let (_, text) = encode(&PgValue::Int(7), &PgType::TEXT).unwrap();
        assert_eq!(text, b"7".to_vec());
    }

    #[test]
    fn test_int_out_of_range_is_an_error() {
        assert!(encode(&PgValue::Int(i64::from(i16::MAX) + 1), &PgType::INT2).is_err());
        assert!(encode(&PgValue::UInt(u64::MAX), &PgType::INT8).is_err());
    }

    #[test]
    fn test_null_binds_as_null() {
        let (is_null, bytes) = encode(&PgValue::Null, &PgType::INT4).unwrap();
        assert!(matches!(is_null, IsNull::Yes));
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_text_parses_into_uuid_parameter() {
        let id = Uuid::parse_str("6f1c2b9e-4107-4d3a-9b51-0c7e2290aa13").unwrap();
        let (_, bytes) = encode(&PgValue::Text(id.to_string()), &PgType::UUID).unwrap();
        assert_eq!(bytes, id.as_bytes().to_vec());

        assert!(encode(&PgValue::Text("not-a-uuid".to_string()), &PgType::UUID).is_err());
    }

    #[test]
    fn test_text_parses_into_numeric_parameter() {
        let (_, expected) =
            encode(&PgValue::Numeric(Decimal::new(12345, 2)), &PgType::NUMERIC).unwrap();
        let (_, parsed) = encode(&PgValue::Text("123.45".to_string()), &PgType::NUMERIC).unwrap();
        assert_eq!(parsed, expected);

        assert!(encode(&PgValue::Text("abc".to_string()), &PgType::NUMERIC).is_err());
    }

    #[test]
    fn test_wrong_type_is_rejected() {
        assert!(encode(&PgValue::Bool(true), &PgType::INT4).is_err());
        assert!(encode(&PgValue::Bytes(vec![1, 2]), &PgType::TEXT).is_err());
    }
}
