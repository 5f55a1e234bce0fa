//! Tolerant deserializers for provider payloads

use serde::{de, de::DeserializeOwned, Deserialize, Deserializer};
use serde_json::Value;
use wabs_clock::DurationSecs;

/// Reads a count of seconds from a JSON number or a numeric string
///
/// Fractional values are truncated and negative values become zero.
fn seconds(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_i64().map(|_| 0))
            .or_else(|| n.as_f64().map(|f| f as u64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<u64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as u64))
        }
        _ => None,
    }
}

/// Deserializes a required lifetime such as `expires_in`
pub(crate) fn duration_secs<'de, D>(deserializer: D) -> Result<DurationSecs, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    seconds(&value)
        .map(DurationSecs)
        .ok_or_else(|| de::Error::custom(format!("expected a number of seconds, found {value}")))
}

/// Deserializes an optional timestamp claim, yielding `None` when it is not numeric
pub(crate) fn lenient_secs<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(seconds(&value))
}

/// Deserializes an optional claim, yielding `None` when it has an unexpected type
pub(crate) fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn seconds_accept_numbers_and_numeric_strings() {
        assert_eq!(seconds(&json!(3599)), Some(3599));
        assert_eq!(seconds(&json!("3599")), Some(3599));
        assert_eq!(seconds(&json!(" 60 ")), Some(60));
        assert_eq!(seconds(&json!(59.9)), Some(59));
        assert_eq!(seconds(&json!("59.9")), Some(59));
        assert_eq!(seconds(&json!(-5)), Some(0));
    }

    #[test]
    fn seconds_reject_other_shapes() {
        assert_eq!(seconds(&json!("soon")), None);
        assert_eq!(seconds(&json!(null)), None);
        assert_eq!(seconds(&json!(true)), None);
        assert_eq!(seconds(&json!([1])), None);
    }
}
