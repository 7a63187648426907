use std::time::{Duration, SystemTime};

/// Converts a `SystemTime` object into a float timestamp.
pub fn datetime_to_timestamp(st: &SystemTime) -> f64 {
    match st.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(duration) => duration.as_secs_f64(),
        Err(_) => 0.0,
    }
}

pub fn timestamp_to_datetime(ts: f64) -> Option<SystemTime> {
    if !ts.is_finite() || ts < 0.0 {
        return None;
    }
    let duration = Duration::from_secs_f64(ts);
    SystemTime::UNIX_EPOCH.checked_add(duration)
}

/// Gregorian date for a day number counted from 1970-01-01.
fn civil_from_days(days: u64) -> (u64, u32, u32) {
    let z = days + 719_468;
    let era = z / 146_097;
    let doe = z % 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = yoe + era * 400 + u64::from(month <= 2);
    (year, month, day)
}

/// Formats a `SystemTime` as `YYYY-MM-DDTHH:MM:SS.mmmZ`, always 24 bytes.
///
/// Times before the epoch are clamped to the epoch.
pub fn to_rfc3339(st: &SystemTime) -> String {
    let duration = st
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default();
    let secs = duration.as_secs();
    let millis = duration.subsec_millis();

    let (year, month, day) = civil_from_days(secs / 86_400);
    let second_of_day = secs % 86_400;

    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
        year,
        month,
        day,
        second_of_day / 3600,
        (second_of_day % 3600) / 60,
        second_of_day % 60,
        millis
    )
}

/// Extracts the type name of a value from its `Debug` representation.
pub fn parse_type_from_debug<D: std::fmt::Debug + ?Sized>(d: &D) -> String {
    let dbg = format!("{d:?}");
    dbg.split(&['(', '{', ' '][..])
        .next()
        .unwrap_or(&dbg)
        .trim()
        .to_owned()
}

pub mod ts_seconds_float {
    use std::fmt;

    use serde::{de, ser};

    use super::*;

    pub fn deserialize<'de, D>(d: D) -> Result<SystemTime, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        d.deserialize_any(SecondsTimestampVisitor)
    }

    pub fn serialize<S>(st: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: ser::Serializer,
    {
        match st.duration_since(SystemTime::UNIX_EPOCH) {
            Ok(duration) => {
                if duration.subsec_nanos() == 0 {
                    serializer.serialize_u64(duration.as_secs())
                } else {
                    serializer.serialize_f64(duration.as_secs_f64())
                }
            }
            Err(_) => Err(ser::Error::custom(format!(
                "invalid `SystemTime` instance: {st:?}"
            ))),
        }
    }

    struct SecondsTimestampVisitor;

    impl de::Visitor<'_> for SecondsTimestampVisitor {
        type Value = SystemTime;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            write!(formatter, "a unix timestamp")
        }

        fn visit_f64<E>(self, value: f64) -> Result<SystemTime, E>
        where
            E: de::Error,
        {
            timestamp_to_datetime(value)
                .ok_or_else(|| E::custom(format!("invalid timestamp: {value}")))
        }

        fn visit_i64<E>(self, value: i64) -> Result<SystemTime, E>
        where
            E: de::Error,
        {
            let value = u64::try_from(value).map_err(|e| E::custom(format!("{e}")))?;
            self.visit_u64(value)
        }

        fn visit_u64<E>(self, value: u64) -> Result<SystemTime, E>
        where
            E: de::Error,
        {
            SystemTime::UNIX_EPOCH
                .checked_add(Duration::from_secs(value))
                .ok_or_else(|| E::custom(format!("invalid timestamp: {value}")))
        }
    }
}
