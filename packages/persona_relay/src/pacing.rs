//! Outbound pacing for persona streams.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Granularity text deltas are re-chunked into
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacingUnit {
    /// One chunk per Unicode scalar value
    #[default]
    Character,
    /// One chunk per word, trailing whitespace attached
    Word,
    /// Deltas are forwarded whole
    None,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacingPolicy {
    pub unit: PacingUnit,
    /// Sleep after each emitted unit
    pub delay: Duration,
}

impl Default for PacingPolicy {
    fn default() -> Self {
        Self {
            unit: PacingUnit::Character,
            delay: Duration::from_millis(20),
        }
    }
}

impl PacingPolicy {
    pub fn new(unit: PacingUnit, delay: Duration) -> Self {
        Self { unit, delay }
    }

    /// No splitting and no delay
    pub fn immediate() -> Self {
        Self::new(PacingUnit::None, Duration::ZERO)
    }

    /// Split `text` into units. Concatenating the result reproduces `text`.
    pub fn split<'a>(&self, text: &'a str) -> Vec<&'a str> {
        match self.unit {
            PacingUnit::Character => text
                .char_indices()
                .map(|(i, c)| &text[i..i + c.len_utf8()])
                .collect(),
            PacingUnit::Word => split_words(text),
            PacingUnit::None if text.is_empty() => Vec::new(),
            PacingUnit::None => vec![text],
        }
    }

    /// Wait between units. A zero delay still yields to the scheduler.
    pub async fn pause(&self) {
        if self.delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.delay).await;
        }
    }
}

fn split_words(text: &str) -> Vec<&str> {
    let mut words = Vec::new();
    let mut start = 0;
    let mut prev_ws = false;
    let mut seen_word = false;
    for (i, c) in text.char_indices() {
        let ws = c.is_whitespace();
        if !ws {
            if prev_ws && seen_word {
                words.push(&text[start..i]);
                start = i;
            }
            seen_word = true;
        }
        prev_ws = ws;
    }
    if start < text.len() {
        words.push(&text[start..]);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(unit: PacingUnit) -> PacingPolicy {
        PacingPolicy::new(unit, Duration::ZERO)
    }

    #[test]
    fn character_split_counts_scalars() {
        let units = policy(PacingUnit::Character).split("héllo 👋");
        assert_eq!(units.len(), "héllo 👋".chars().count());
        assert_eq!(units[1], "é");
        assert_eq!(units.concat(), "héllo 👋");
    }

    #[test]
    fn word_split_keeps_whitespace() {
        let units = policy(PacingUnit::Word).split(" Ahoy  there,\nmatey ");
        assert_eq!(units, vec![" Ahoy  ", "there,\n", "matey "]);
        assert_eq!(units.concat(), " Ahoy  there,\nmatey ");
    }

    #[test]
    fn none_passes_through() {
        assert_eq!(
            policy(PacingUnit::None).split("whole delta"),
            vec!["whole delta"]
        );
        assert!(policy(PacingUnit::None).split("").is_empty());
        assert!(policy(PacingUnit::Character).split("").is_empty());
        assert!(policy(PacingUnit::Word).split("").is_empty());
    }

    #[test]
    fn default_is_twenty_ms_per_character() {
        let p = PacingPolicy::default();
        assert_eq!(p.unit, PacingUnit::Character);
        assert_eq!(p.delay, Duration::from_millis(20));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_sleeps_for_delay() {
        let p = PacingPolicy::new(PacingUnit::Character, Duration::from_millis(20));
        let start = tokio::time::Instant::now();
        p.pause().await;
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
