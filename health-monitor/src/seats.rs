//! Seat talk-state decoding
//!
//! The seat hardware reports one bit per half seat group, packed as a string
//! of `'0'`/`'1'` characters with the least significant position last. Each
//! decode replaces the previous result entirely.

use crate::config::SeatConfig;
use crate::types::StateValue;
use serde::Serialize;

/// Talk state of one half seat group
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeatEntry {
    /// Stable key, `seat_<row>`
    pub key: String,
    /// Display name, e.g. `Seat Group 1 A-D`
    pub name: String,
    /// `Talking` or `NotTalking`
    pub state: StateValue,
}

/// Point-in-time view of the seat decoder
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeatSnapshot {
    pub name: String,
    pub color: String,
    pub dock: String,
    pub entries: Vec<SeatEntry>,
}

/// Decoder holding the most recent seat states
#[derive(Debug, Clone)]
pub struct SeatDecoder {
    config: SeatConfig,
    entries: Vec<SeatEntry>,
}

impl SeatDecoder {
    pub fn new(config: SeatConfig) -> Self {
        Self {
            config,
            entries: Vec::new(),
        }
    }

    /// Decode a bit string, replacing all previously decoded entries
    ///
    /// Characters are read right to left. Anything other than `'1'` counts as
    /// not talking.
    pub fn decode(&mut self, bits: &str) -> &[SeatEntry] {
        self.entries = decode_seats(bits);
        log::trace!("Decoded {} seat positions from {:?}", self.entries.len(), bits);
        &self.entries
    }

    /// True when `cmd` is the command routed to this decoder
    pub fn accepts(&self, cmd: &str) -> bool {
        cmd.eq_ignore_ascii_case(&self.config.command)
    }

    pub fn entries(&self) -> &[SeatEntry] {
        &self.entries
    }

    pub fn snapshot(&self) -> SeatSnapshot {
        SeatSnapshot {
            name: self.config.name.clone(),
            color: self.config.color.clone(),
            dock: self.config.dock.clone(),
            entries: self.entries.clone(),
        }
    }

    pub fn config(&self) -> &SeatConfig {
        &self.config
    }
}

/// Stateless decode of a seat bit string
pub fn decode_seats(bits: &str) -> Vec<SeatEntry> {
    bits.chars()
        .rev()
        .enumerate()
        .map(|(row, bit)| {
            let half = if row % 2 == 0 { "A-D" } else { "E-H" };
            SeatEntry {
                key: format!("seat_{}", row),
                name: format!("Seat Group {} {}", row / 2 + 1, half),
                state: if bit == '1' {
                    StateValue::Talking
                } else {
                    StateValue::NotTalking
                },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_reads_least_significant_first() {
        let entries = decode_seats("1010");
        let summary: Vec<_> = entries
            .iter()
            .map(|e| (e.key.as_str(), e.name.as_str(), e.state))
            .collect();

        assert_eq!(
            summary,
            vec![
                ("seat_0", "Seat Group 1 A-D", StateValue::NotTalking),
                ("seat_1", "Seat Group 1 E-H", StateValue::Talking),
                ("seat_2", "Seat Group 2 A-D", StateValue::NotTalking),
                ("seat_3", "Seat Group 2 E-H", StateValue::Talking),
            ]
        );
    }

    #[test]
    fn test_decode_replaces_previous_result() {
        let mut decoder = SeatDecoder::new(SeatConfig::default());
        decoder.decode("111111");
        assert_eq!(decoder.entries().len(), 6);

        let entries = decoder.decode("01");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].state, StateValue::Talking);
        assert_eq!(entries[1].state, StateValue::NotTalking);
    }

    #[test]
    fn test_empty_string_clears_entries() {
        let mut decoder = SeatDecoder::new(SeatConfig::default());
        decoder.decode("1");
        assert!(decoder.decode("").is_empty());
    }

    #[test]
    fn test_accepts_command_case_insensitively() {
        let decoder = SeatDecoder::new(SeatConfig::default());
        assert!(decoder.accepts("wdlm"));
        assert!(decoder.accepts("WDLM"));
        assert!(!decoder.accepts("wdlms"));
    }
}
