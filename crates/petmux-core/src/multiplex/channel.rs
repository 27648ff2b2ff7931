//! Colour channels and tracer-to-channel assignments.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// One of the three display channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Red,
    Green,
    Blue,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Red, Channel::Green, Channel::Blue];

    /// Position in an RGB triple.
    pub fn index(self) -> usize {
        match self {
            Channel::Red => 0,
            Channel::Green => 1,
            Channel::Blue => 2,
        }
    }

    /// File-name tag for per-channel outputs.
    pub fn suffix(self) -> &'static str {
        match self {
            Channel::Red => "R",
            Channel::Green => "G",
            Channel::Blue => "B",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Channel::Red => "red",
            Channel::Green => "green",
            Channel::Blue => "blue",
        };
        f.write_str(name)
    }
}

impl FromStr for Channel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "red" | "r" => Ok(Channel::Red),
            "green" | "g" => Ok(Channel::Green),
            "blue" | "b" => Ok(Channel::Blue),
            _ => Err(CoreError::UnknownChannel(s.to_string())),
        }
    }
}

/// Bijection between tracers and channels.
///
/// Holds one to three entries; no channel and no tracer appears twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelAssignment {
    entries: Vec<(String, Channel)>,
}

impl ChannelAssignment {
    pub fn new(entries: Vec<(String, Channel)>) -> Result<Self> {
        if entries.is_empty() || entries.len() > Channel::ALL.len() {
            return Err(CoreError::ChannelCount(entries.len()));
        }

        let mut channels = BTreeSet::new();
        let mut tracers = BTreeSet::new();
        for (tracer, channel) in &entries {
            if !channels.insert(*channel) {
                return Err(CoreError::DuplicateChannel(*channel));
            }
            if !tracers.insert(tracer.as_str()) {
                return Err(CoreError::DuplicateTracer(tracer.clone()));
            }
        }
        Ok(Self { entries })
    }

    /// Assign red, green, blue in tracer order.
    pub fn sequential<S: AsRef<str>>(tracers: &[S]) -> Result<Self> {
        if tracers.len() > Channel::ALL.len() {
            return Err(CoreError::ChannelCount(tracers.len()));
        }
        Self::new(
            tracers
                .iter()
                .zip(Channel::ALL)
                .map(|(tracer, channel)| (tracer.as_ref().to_string(), channel))
                .collect(),
        )
    }

    /// Entries in the order they were given.
    pub fn entries(&self) -> &[(String, Channel)] {
        &self.entries
    }

    pub fn channel_of(&self, tracer: &str) -> Option<Channel> {
        self.entries.iter().find(|(t, _)| t == tracer).map(|(_, c)| *c)
    }

    pub fn tracer_on(&self, channel: Channel) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, c)| *c == channel)
            .map(|(t, _)| t.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(tracer: &str, channel: Channel) -> (String, Channel) {
        (tracer.to_string(), channel)
    }

    #[test]
    fn test_channel_parse() {
        assert_eq!("R".parse::<Channel>().unwrap(), Channel::Red);
        assert_eq!(" green ".parse::<Channel>().unwrap(), Channel::Green);
        assert_eq!("b".parse::<Channel>().unwrap(), Channel::Blue);
        assert!(matches!("cyan".parse::<Channel>(), Err(CoreError::UnknownChannel(_))));
    }

    #[test]
    fn test_sequential_assignment() {
        let assignment = ChannelAssignment::sequential(&["FDG", "PSMA"]).unwrap();
        assert_eq!(assignment.channel_of("FDG"), Some(Channel::Red));
        assert_eq!(assignment.channel_of("PSMA"), Some(Channel::Green));
        assert_eq!(assignment.tracer_on(Channel::Blue), None);
    }

    #[test]
    fn test_repeated_channel_fails() {
        let err = ChannelAssignment::new(vec![entry("FDG", Channel::Red), entry("PSMA", Channel::Red)]).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateChannel(Channel::Red)));
    }

    #[test]
    fn test_repeated_tracer_fails() {
        let err =
            ChannelAssignment::new(vec![entry("FDG", Channel::Red), entry("FDG", Channel::Blue)]).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateTracer(ref t) if t == "FDG"));
    }

    #[test]
    fn test_count_bounds() {
        assert!(matches!(ChannelAssignment::new(Vec::new()), Err(CoreError::ChannelCount(0))));
        assert!(matches!(
            ChannelAssignment::sequential(&["a", "b", "c", "d"]),
            Err(CoreError::ChannelCount(4))
        ));
    }
}
