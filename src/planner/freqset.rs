//! Named target frequencies

use std::str::FromStr;

use crate::error::PlanError;

/// Ordered mapping from channel label to target frequency in hertz.
///
/// Labels are unique and every frequency is positive. Insertion order is
/// preserved; the planner's collision check walks channels in this order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrequencySet {
    entries: Vec<(String, u64)>,
}

impl FrequencySet {
    /// Build a set from `(label, hz)` pairs
    pub fn new<I, S>(entries: I) -> Result<Self, PlanError>
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        let mut set = Self { entries: Vec::new() };
        for (label, hz) in entries {
            set.insert(label.into(), hz)?;
        }
        if set.entries.is_empty() {
            return Err(PlanError::EmptyFrequencySet);
        }
        Ok(set)
    }

    fn insert(&mut self, label: String, hz: u64) -> Result<(), PlanError> {
        if label.is_empty() {
            return Err(PlanError::InvalidEntry(format!("={}", hz)));
        }
        if hz == 0 {
            return Err(PlanError::NonPositiveFrequency(label));
        }
        if self.get(&label).is_some() {
            return Err(PlanError::DuplicateLabel(label));
        }
        self.entries.push((label, hz));
        Ok(())
    }

    /// Frequency of a channel, if present
    pub fn get(&self, label: &str) -> Option<u64> {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, hz)| *hz)
    }

    /// Iterate `(label, hz)` in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.entries.iter().map(|(l, hz)| (l.as_str(), *hz))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn min(&self) -> u64 {
        self.entries.iter().map(|(_, hz)| *hz).min().unwrap_or(0)
    }

    pub fn max(&self) -> u64 {
        self.entries.iter().map(|(_, hz)| *hz).max().unwrap_or(0)
    }
}

impl FromStr for FrequencySet {
    type Err = PlanError;

    /// Parse `label=kHz,label=kHz,...`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut set = Self { entries: Vec::new() };

        for entry in s.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (label, khz) = entry
                .split_once('=')
                .ok_or_else(|| PlanError::InvalidEntry(entry.to_string()))?;
            let label = label.trim();
            let khz: f64 = khz
                .trim()
                .parse()
                .map_err(|_| PlanError::InvalidEntry(entry.to_string()))?;
            if !khz.is_finite() {
                return Err(PlanError::InvalidEntry(entry.to_string()));
            }
            if khz <= 0.0 {
                return Err(PlanError::NonPositiveFrequency(label.to_string()));
            }
            // Rounded, not truncated: 144.39 * 1000 must not become 144389
            let hz = (khz * 1000.0).round() as u64;
            set.insert(label.to_string(), hz)?;
        }

        if set.entries.is_empty() {
            return Err(PlanError::EmptyFrequencySet);
        }
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keeps_order() {
        let set: FrequencySet = "RNET-OH2RCH=145787,APRS-144800=144800,2M-145500=145500"
            .parse()
            .unwrap();

        let labels: Vec<&str> = set.iter().map(|(l, _)| l).collect();
        assert_eq!(labels, vec!["RNET-OH2RCH", "APRS-144800", "2M-145500"]);
        assert_eq!(set.get("APRS-144800"), Some(144_800_000));
        assert_eq!(set.min(), 144_800_000);
        assert_eq!(set.max(), 145_787_000);
    }

    #[test]
    fn test_parse_fractional_khz() {
        let set: FrequencySet = "A=144.39, B = 145787.5".parse().unwrap();
        assert_eq!(set.get("A"), Some(144_390));
        assert_eq!(set.get("B"), Some(145_787_500));
    }

    #[test]
    fn test_parse_rejects_bad_entries() {
        assert_eq!("".parse::<FrequencySet>(), Err(PlanError::EmptyFrequencySet));
        assert!(matches!(
            "APRS".parse::<FrequencySet>(),
            Err(PlanError::InvalidEntry(_))
        ));
        assert!(matches!(
            "APRS=abc".parse::<FrequencySet>(),
            Err(PlanError::InvalidEntry(_))
        ));
        assert!(matches!(
            "=144800".parse::<FrequencySet>(),
            Err(PlanError::InvalidEntry(_))
        ));
        assert_eq!(
            "APRS=-1".parse::<FrequencySet>(),
            Err(PlanError::NonPositiveFrequency("APRS".into()))
        );
        assert_eq!(
            "A=144800,A=145500".parse::<FrequencySet>(),
            Err(PlanError::DuplicateLabel("A".into()))
        );
    }

    #[test]
    fn test_new_from_pairs() {
        let set = FrequencySet::new([("A", 145_787_000), ("B", 145_500_000)]).unwrap();
        assert_eq!(set.len(), 2);
        assert!(FrequencySet::new(Vec::<(String, u64)>::new()).is_err());
        assert_eq!(
            FrequencySet::new([("A", 0)]),
            Err(PlanError::NonPositiveFrequency("A".into()))
        );
    }
}
