//! Wall-clock timestamps with CBOR support
use chrono::{DateTime, TimeZone, Utc};

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .unwrap()
            .into()
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
    /// Whole days remaining from `now` until `self`. Negative once `self` is in the past.
    pub fn days_until(&self, now: &TimeStamp<Utc>) -> i64 {
        (self.0 - now.0).num_days()
    }
    pub fn days_since(&self, now: &TimeStamp<Utc>) -> i64 {
        (now.0 - self.0).num_days()
    }
    pub fn plus_days(&self, days: i64) -> Self {
        Self(self.0 + chrono::Duration::days(days))
    }
    pub fn plus_seconds(&self, secs: i64) -> Self {
        Self(self.0 + chrono::Duration::seconds(secs))
    }
    pub fn is_before(&self, other: &TimeStamp<Utc>) -> bool {
        self.0 < other.0
    }
    pub fn is_at_or_after(&self, other: &TimeStamp<Utc>) -> bool {
        self.0 >= other.0
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_encoding() {
        let original = TimeStamp::new();

        let encoding = minicbor::to_vec(original.clone()).unwrap();
        let decode: TimeStamp<Utc> = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn day_arithmetic() {
        let submitted = TimeStamp::new_with(2026, 1, 1, 12, 0, 0);
        let now = TimeStamp::new_with(2026, 1, 9, 12, 0, 0);

        assert_eq!(submitted.days_since(&now), 8);
        assert_eq!(now.days_since(&submitted), -8);
        assert_eq!(now.days_until(&submitted), 8);
        assert_eq!(submitted.days_until(&now), -8);
        assert!(submitted.is_before(&now));
        assert!(now.is_at_or_after(&submitted));
    }
}
