//! Lenient string fields for configuration.
//!
//! Unquoted YAML scalars such as `password: 123456` come through as numbers or booleans.
//! Fields that end up on a command line accept any scalar and keep its text form.

use serde::de::Visitor;
use serde::Deserializer;
use std::fmt::Formatter;
use std::result;

pub struct ScalarStringVisitor;

impl Visitor<'_> for ScalarStringVisitor {
    type Value = String;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("a string, number or boolean")
    }

    fn visit_bool<E: serde::de::Error>(self, v: bool) -> result::Result<Self::Value, E> {
        Ok(v.to_string())
    }

    fn visit_i64<E: serde::de::Error>(self, v: i64) -> result::Result<Self::Value, E> {
        Ok(v.to_string())
    }

    fn visit_u64<E: serde::de::Error>(self, v: u64) -> result::Result<Self::Value, E> {
        Ok(v.to_string())
    }

    fn visit_f64<E: serde::de::Error>(self, v: f64) -> result::Result<Self::Value, E> {
        Ok(v.to_string())
    }

    fn visit_str<E: serde::de::Error>(self, v: &str) -> result::Result<Self::Value, E> {
        Ok(v.to_string())
    }

    fn visit_string<E: serde::de::Error>(self, v: String) -> result::Result<Self::Value, E> {
        Ok(v)
    }
}

/// For `#[serde(deserialize_with = "...")]` on `String` fields.
pub fn deserialize_scalar_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> result::Result<String, D::Error> {
    deserializer.deserialize_any(ScalarStringVisitor)
}
