//! Time of day and weighted random delays.

use rand::Rng;
use regex::Regex;
use serde::de::{self, Deserializer};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;

const SECONDS_PER_DAY: f64 = 86400.0;

#[derive(Debug, Fail)]
pub enum TimeError {
    #[fail(display = "error in regular expression: {}", _0)]
    RegexError(String),
    #[fail(display = "invalid time of day: {}", _0)]
    InvalidTime(String),
}

/// Simulated time of day, in seconds since midnight.
///
/// Times past midnight keep counting upwards so that schedules crossing
/// midnight still compare correctly; only the textual form wraps.
#[derive(Copy, Clone, Debug, Default, PartialEq, PartialOrd)]
pub struct Time(f64);

impl Time {
    pub fn from_seconds(s: f64) -> Time {
        Time(s)
    }

    pub fn from_hms(h: u32, m: u32, s: u32) -> Time {
        Time::from_seconds(f64::from(h * 3600 + m * 60 + s))
    }

    pub fn seconds(&self) -> f64 {
        self.0
    }

    /// Parses `HH:MM:SS` (fractional seconds allowed). The empty string
    /// is the null time.
    pub fn parse(input: &str) -> Result<Option<Time>, TimeError> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(None);
        }
        let re = Regex::new(r"^(\d{1,2}):(\d{2}):(\d{2}(?:\.\d+)?)$")
            .map_err(|e| TimeError::RegexError(format!("{:?}", e)))?;
        let groups = re
            .captures(input)
            .ok_or_else(|| TimeError::InvalidTime(input.to_string()))?;
        let h = groups[1].parse::<u32>().map_err(|_| TimeError::InvalidTime(input.to_string()))?;
        let m = groups[2].parse::<u32>().map_err(|_| TimeError::InvalidTime(input.to_string()))?;
        let s = groups[3].parse::<f64>().map_err(|_| TimeError::InvalidTime(input.to_string()))?;
        if m >= 60 || s >= 60.0 {
            return Err(TimeError::InvalidTime(input.to_string()));
        }
        Ok(Some(Time(f64::from(h * 3600 + m * 60) + s)))
    }

    pub fn add_seconds(self, secs: f64) -> Time {
        Time(self.0 + secs)
    }

    /// Seconds elapsed from `earlier` to `self` (negative if `earlier` is later).
    pub fn since(self, earlier: Time) -> f64 {
        self.0 - earlier.0
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let total = self.0.floor().rem_euclid(SECONDS_PER_DAY) as u64;
        write!(f, "{:02}:{:02}:{:02}", total / 3600, (total / 60) % 60, total % 60)
    }
}

impl Serialize for Time {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Time {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Time, D::Error> {
        let text = String::deserialize(d)?;
        match Time::parse(&text) {
            Ok(Some(t)) => Ok(t),
            Ok(None) => Err(de::Error::custom("empty time of day")),
            Err(e) => Err(de::Error::custom(e)),
        }
    }
}

/// Serde adapter for optional times written as `""` when absent.
pub mod opt_time {
    use super::Time;
    use serde::de::{self, Deserializer};
    use serde::{Deserialize, Serializer};

    pub fn serialize<S: Serializer>(t: &Option<Time>, s: S) -> Result<S::Ok, S::Error> {
        match t {
            Some(t) => s.serialize_str(&t.to_string()),
            None => s.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Time>, D::Error> {
        let text: Option<String> = Option::deserialize(d)?;
        match text {
            None => Ok(None),
            Some(text) => Time::parse(&text).map_err(de::Error::custom),
        }
    }
}

#[derive(Debug, Fail)]
pub enum DelayError {
    #[fail(display = "Unparsable JSON: {}", _0)]
    Unparsable(String),
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DelayBucket {
    pub low: f64,
    pub high: f64,
    pub probability: f64,
}

/// Random duration drawn from weighted `(low, high, probability%)` buckets.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DelayGenerator {
    pub buckets: Vec<DelayBucket>,
}

impl DelayGenerator {
    pub fn constant(seconds: f64) -> DelayGenerator {
        DelayGenerator {
            buckets: vec![DelayBucket { low: seconds, high: seconds, probability: 100.0 }],
        }
    }

    pub fn from_value(v: &serde_json::Value) -> Result<DelayGenerator, DelayError> {
        use serde_json::Value;
        match v {
            Value::Null => Ok(DelayGenerator::default()),
            Value::Number(n) => n
                .as_f64()
                .map(DelayGenerator::constant)
                .ok_or_else(|| DelayError::Unparsable(v.to_string())),
            Value::Array(rows) => {
                let mut buckets = Vec::with_capacity(rows.len());
                for row in rows {
                    let cells = match row.as_array() {
                        Some(cells) if cells.len() == 3 => cells,
                        _ => return Err(DelayError::Unparsable(v.to_string())),
                    };
                    let mut nums = cells.iter().map(|c| c.as_f64());
                    match (nums.next(), nums.next(), nums.next()) {
                        (Some(Some(low)), Some(Some(high)), Some(Some(probability))) => {
                            buckets.push(DelayBucket { low, high, probability })
                        }
                        _ => return Err(DelayError::Unparsable(v.to_string())),
                    }
                }
                Ok(DelayGenerator { buckets })
            }
            _ => Err(DelayError::Unparsable(v.to_string())),
        }
    }

    pub fn is_null(&self) -> bool {
        match self.buckets.as_slice() {
            [] => true,
            [b] => b.low == 0.0 && b.high == 0.0 && b.probability == 100.0,
            _ => false,
        }
    }

    /// Draws a delay in whole seconds. The bucket is chosen by probability
    /// over the declared total, so tables that do not add up to 100 are
    /// still honoured proportionally.
    pub fn yield_delay<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let last = match self.buckets.last() {
            Some(b) => b,
            None => return 0.0,
        };
        let total: f64 = self.buckets.iter().map(|b| b.probability.max(0.0)).sum();
        if total <= 0.0 {
            return last.high.floor();
        }
        let roll = rng.gen_range(0.0, total);
        let mut acc = 0.0;
        for bucket in &self.buckets {
            acc += bucket.probability.max(0.0);
            if roll < acc {
                if bucket.high <= bucket.low {
                    return bucket.low.floor();
                }
                return rng.gen_range(bucket.low, bucket.high).floor();
            }
        }
        last.high.floor()
    }
}

impl Serialize for DelayGenerator {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let mut seq = s.serialize_seq(Some(self.buckets.len()))?;
        for b in &self.buckets {
            seq.serialize_element(&(b.low, b.high, b.probability))?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for DelayGenerator {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<DelayGenerator, D::Error> {
        let v = serde_json::Value::deserialize(d)?;
        DelayGenerator::from_value(&v).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn parse_and_format_time() {
        let t = Time::parse("06:05:30").unwrap().unwrap();
        assert_eq!(t.seconds(), 6.0 * 3600.0 + 5.0 * 60.0 + 30.0);
        assert_eq!(t.to_string(), "06:05:30");
        assert_eq!(Time::parse("").unwrap(), None);
        assert!(Time::parse("6h05").is_err());
        assert!(Time::parse("06:75:00").is_err());
        assert_eq!(Time::from_hms(23, 59, 50).add_seconds(20.0).to_string(), "00:00:10");
    }

    #[test]
    fn delay_generator_forms() {
        let dg: DelayGenerator = serde_json::from_str("[[0, 100, 50], [100, 1000, 30], [1000, 10000, 20]]").unwrap();
        assert_eq!(dg.buckets.len(), 3);
        assert_eq!(dg.buckets[1], DelayBucket { low: 100.0, high: 1000.0, probability: 30.0 });

        let single: DelayGenerator = serde_json::from_str("30").unwrap();
        assert_eq!(single, DelayGenerator::constant(30.0));

        let zero: DelayGenerator = serde_json::from_str("[[0, 0, 100]]").unwrap();
        assert!(zero.is_null());
        assert!(DelayGenerator::default().is_null());
        assert!(!single.is_null());

        assert!(serde_json::from_str::<DelayGenerator>("\"soon\"").is_err());
        assert!(serde_json::from_str::<DelayGenerator>("[[1, 2]]").is_err());
    }

    #[test]
    fn delay_sampling_is_seeded() {
        let dg: DelayGenerator = serde_json::from_str("[[0, 100, 50], [100, 1000, 30], [1000, 10000, 20]]").unwrap();
        let a: Vec<f64> = {
            let mut rng = StdRng::seed_from_u64(1);
            (0..20).map(|_| dg.yield_delay(&mut rng)).collect()
        };
        let b: Vec<f64> = {
            let mut rng = StdRng::seed_from_u64(1);
            (0..20).map(|_| dg.yield_delay(&mut rng)).collect()
        };
        assert_eq!(a, b);
        assert!(a.iter().all(|d| *d >= 0.0 && *d < 10000.0));
    }

    #[test]
    fn delay_sampling_with_partial_table() {
        // Probabilities add up to 30 only.
        let dg: DelayGenerator = serde_json::from_str("[[10, 20, 10], [20, 30, 20]]").unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let d = dg.yield_delay(&mut rng);
            assert!(d >= 10.0 && d <= 30.0, "{}", d);
        }
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(DelayGenerator::constant(45.0).yield_delay(&mut rng), 45.0);
        assert_eq!(DelayGenerator::default().yield_delay(&mut rng), 0.0);
    }
}
