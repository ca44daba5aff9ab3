use serde::de::Error;
use serde::{Deserialize, Deserializer};

// query strings carry everything as text, and the admin forms send ids from
// <select> elements as strings (or "" for "no category")
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(i64),
    Text(String),
}

/// Accepts `12`, `"12"`, `""` and `null`; blank text counts as absent.
pub fn deserialize_optional_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrString::Number(value)) => Ok(Some(value)),
        Some(NumberOrString::Text(value)) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            trimmed
                .parse::<i64>()
                .map(Some)
                .map_err(|_| D::Error::custom(format!("Wrong value {value}, can not parse to i64")))
        }
    }
}
