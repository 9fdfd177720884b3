// Copyright (c) The hostest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::ParallelInstancesParseError;
use serde::Deserialize;
use std::{cmp::Ordering, fmt, str::FromStr, sync::LazyLock};
use tracing::warn;

/// Returns the number of logical CPUs, or 1 if it can't be determined.
pub fn get_num_cpus() -> usize {
    static NUM_CPUS: LazyLock<usize> =
        LazyLock::new(|| match std::thread::available_parallelism() {
            Ok(count) => count.into(),
            Err(err) => {
                warn!("unable to determine num-cpus ({err}), assuming 1 logical CPU");
                1
            }
        });

    *NUM_CPUS
}

/// Type for the parallel-instances config key and the `-j` option.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParallelInstances {
    /// Run with a specified number of workers.
    Count(usize),

    /// Run with as many workers as there are logical CPUs.
    NumCpus,
}

impl ParallelInstances {
    /// Gets the actual number of workers computed at runtime.
    pub fn compute(self) -> usize {
        match self {
            Self::Count(n) => n,
            Self::NumCpus => get_num_cpus(),
        }
    }

    fn from_signed(n: i64) -> Option<Self> {
        match n.cmp(&0) {
            Ordering::Greater => Some(Self::Count(n as usize)),
            Ordering::Less => Some(Self::Count((get_num_cpus() as i64 + n).max(1) as usize)),
            Ordering::Equal => None,
        }
    }
}

impl FromStr for ParallelInstances {
    type Err = ParallelInstancesParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "num-cpus" {
            return Ok(Self::NumCpus);
        }

        match s.parse::<i64>() {
            Err(e) => Err(ParallelInstancesParseError::new(format!("{s} ({e})"))),
            Ok(n) => {
                Self::from_signed(n).ok_or_else(|| ParallelInstancesParseError::new("0 (may not be 0)"))
            }
        }
    }
}

impl fmt::Display for ParallelInstances {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(n) => write!(f, "{n}"),
            Self::NumCpus => write!(f, "num-cpus"),
        }
    }
}

impl<'de> Deserialize<'de> for ParallelInstances {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = ParallelInstances;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(formatter, "a non-zero integer or the string \"num-cpus\"")
            }

            // Environment variables always arrive as strings.
            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                v.parse().map_err(|_| {
                    serde::de::Error::invalid_value(serde::de::Unexpected::Str(v), &self)
                })
            }

            // Note that TOML uses i64, not u64.
            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                ParallelInstances::from_signed(v).ok_or_else(|| {
                    serde::de::Error::invalid_value(serde::de::Unexpected::Signed(v), &self)
                })
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                match i64::try_from(v) {
                    Ok(v) => self.visit_i64(v),
                    Err(_) => Err(serde::de::Error::invalid_value(
                        serde::de::Unexpected::Unsigned(v),
                        &self,
                    )),
                }
            }
        }

        deserializer.deserialize_any(V)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("4", Some(4) ; "positive")]
    #[test_case("-1", Some(get_num_cpus().saturating_sub(1).max(1)) ; "negative")]
    #[test_case("-100000", Some(1) ; "very negative")]
    #[test_case("num-cpus", Some(get_num_cpus()) ; "num cpus")]
    #[test_case("0", None ; "zero")]
    #[test_case("many", None ; "garbage")]
    fn parse_parallel_instances(input: &str, expected: Option<usize>) {
        let parsed = input.parse::<ParallelInstances>();
        match expected {
            None => assert!(parsed.is_err(), "{input} should fail to parse"),
            Some(n) => assert_eq!(parsed.expect("input parses").compute(), n),
        }
    }

    #[test]
    fn display_round_trips() {
        for value in [ParallelInstances::Count(3), ParallelInstances::NumCpus] {
            assert_eq!(value.to_string().parse::<ParallelInstances>().ok(), Some(value));
        }
    }
}
