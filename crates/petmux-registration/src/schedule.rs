//! Iteration schedules and similarity metrics in Greedy's argument syntax.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{RegistrationError, Result};

/// Iterations per resolution level, coarsest first (`100x50x25`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IterationSchedule(Vec<u32>);

impl IterationSchedule {
    pub fn new(levels: Vec<u32>) -> Result<Self> {
        if levels.is_empty() {
            return Err(RegistrationError::invalid_schedule("no resolution levels"));
        }
        if levels.iter().all(|&n| n == 0) {
            return Err(RegistrationError::invalid_schedule("every level has zero iterations"));
        }
        Ok(Self(levels))
    }

    pub fn levels(&self) -> &[u32] {
        &self.0
    }
}

impl Default for IterationSchedule {
    fn default() -> Self {
        Self(vec![100, 50, 25])
    }
}

impl FromStr for IterationSchedule {
    type Err = RegistrationError;

    fn from_str(s: &str) -> Result<Self> {
        let levels = s
            .trim()
            .split('x')
            .map(|level| {
                level
                    .parse::<u32>()
                    .map_err(|_| RegistrationError::invalid_schedule(format!("'{s}' is not of the form 100x50x25")))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(levels)
    }
}

impl fmt::Display for IterationSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let levels: Vec<String> = self.0.iter().map(u32::to_string).collect();
        f.write_str(&levels.join("x"))
    }
}

impl TryFrom<String> for IterationSchedule {
    type Error = RegistrationError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<IterationSchedule> for String {
    fn from(value: IterationSchedule) -> Self {
        value.to_string()
    }
}

/// Image similarity metric passed to the registration tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SimilarityMetric {
    /// Sum of squared differences.
    Ssd,
    /// Normalised cross-correlation over a patch radius per axis.
    Ncc { radius: [u32; 3] },
    /// Normalised mutual information.
    Nmi,
}

impl SimilarityMetric {
    /// Arguments following `-m`.
    pub fn greedy_args(&self) -> Vec<String> {
        match self {
            SimilarityMetric::Ssd => vec!["SSD".to_string()],
            SimilarityMetric::Nmi => vec!["NMI".to_string()],
            SimilarityMetric::Ncc { radius } => {
                vec!["NCC".to_string(), format!("{}x{}x{}", radius[0], radius[1], radius[2])]
            }
        }
    }
}

impl FromStr for SimilarityMetric {
    type Err = RegistrationError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split_whitespace();
        let name = parts.next().unwrap_or_default().to_ascii_uppercase();
        let metric = match name.as_str() {
            "SSD" => SimilarityMetric::Ssd,
            "NMI" => SimilarityMetric::Nmi,
            "NCC" => {
                let radius = parts.next().unwrap_or("2x2x2");
                let values = radius
                    .split('x')
                    .map(|r| r.parse::<u32>())
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|_| RegistrationError::invalid_metric(format!("bad NCC radius '{radius}'")))?;
                let radius: [u32; 3] = values
                    .try_into()
                    .map_err(|_| RegistrationError::invalid_metric(format!("NCC radius '{radius}' needs 3 values")))?;
                SimilarityMetric::Ncc { radius }
            }
            _ => return Err(RegistrationError::invalid_metric(format!("unknown metric '{s}'"))),
        };
        if parts.next().is_some() {
            return Err(RegistrationError::invalid_metric(format!("trailing input in '{s}'")));
        }
        Ok(metric)
    }
}

impl fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.greedy_args().join(" "))
    }
}

impl TryFrom<String> for SimilarityMetric {
    type Error = RegistrationError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<SimilarityMetric> for String {
    fn from(value: SimilarityMetric) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_parse() {
        let schedule: IterationSchedule = "100x50x25".parse().unwrap();
        assert_eq!(schedule.levels(), &[100, 50, 25]);
        assert_eq!(schedule.to_string(), "100x50x25");
        assert_eq!(schedule, IterationSchedule::default());
    }

    #[test]
    fn test_schedule_rejects_bad_input() {
        assert!("".parse::<IterationSchedule>().is_err());
        assert!("100xx25".parse::<IterationSchedule>().is_err());
        assert!("0x0".parse::<IterationSchedule>().is_err());
        assert!("100x-5".parse::<IterationSchedule>().is_err());
    }

    #[test]
    fn test_metric_parse_and_args() {
        let ncc: SimilarityMetric = "NCC 2x2x2".parse().unwrap();
        assert_eq!(ncc, SimilarityMetric::Ncc { radius: [2, 2, 2] });
        assert_eq!(ncc.greedy_args(), vec!["NCC", "2x2x2"]);
        assert_eq!("nmi".parse::<SimilarityMetric>().unwrap(), SimilarityMetric::Nmi);
        assert_eq!(SimilarityMetric::Ssd.to_string(), "SSD");
    }

    #[test]
    fn test_metric_rejects_bad_input() {
        assert!("MI".parse::<SimilarityMetric>().is_err());
        assert!("NCC 2x2".parse::<SimilarityMetric>().is_err());
        assert!("NMI extra".parse::<SimilarityMetric>().is_err());
    }
}
