//! SummaryResult - the structured output of one article analysis.

use serde::{Deserialize, Serialize};

/// Four progressively detailed summaries of one article, plus two quality scores.
///
/// Each level continues where the previous one stopped, so reading them in
/// order never repeats information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResult {
    /// 2-3 sentences with the essential message
    pub ultra_short: String,
    /// One paragraph adding what `ultra_short` left out
    pub short: String,
    /// Several paragraphs of details, arguments and evidence
    pub medium: String,
    /// Remaining structure and conclusions
    pub detailed: String,
    /// Share of filler and padding, 0-100
    pub fluff_percentage: u8,
    /// Originality of the content, 0-100
    pub novelty_score: u8,
}

impl SummaryResult {
    /// Text for the given detail level
    pub fn text(&self, level: DetailLevel) -> &str {
        match level {
            DetailLevel::Brief => &self.ultra_short,
            DetailLevel::Short => &self.short,
            DetailLevel::Medium => &self.medium,
            DetailLevel::Detailed => &self.detailed,
        }
    }

    pub fn fluff_band(&self) -> ScoreBand {
        ScoreBand::for_fluff(self.fluff_percentage)
    }

    pub fn novelty_band(&self) -> ScoreBand {
        ScoreBand::for_novelty(self.novelty_score)
    }
}

/// One of the four summary levels, from shortest to longest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum DetailLevel {
    #[default]
    Brief,
    Short,
    Medium,
    Detailed,
}

impl DetailLevel {
    pub const ALL: [DetailLevel; 4] = [
        DetailLevel::Brief,
        DetailLevel::Short,
        DetailLevel::Medium,
        DetailLevel::Detailed,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            DetailLevel::Brief => "Brief",
            DetailLevel::Short => "Short",
            DetailLevel::Medium => "Medium",
            DetailLevel::Detailed => "Detailed",
        }
    }

    /// The next level, or `None` at the most detailed one
    pub fn next(self) -> Option<Self> {
        Self::from_index(self.index() + 1)
    }

    pub fn prev(self) -> Option<Self> {
        self.index().checked_sub(1).and_then(Self::from_index)
    }

    pub fn is_last(self) -> bool {
        self == DetailLevel::Detailed
    }
}

/// Traffic-light color of a score bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreBand {
    Green,
    Amber,
    Red,
}

impl ScoreBand {
    /// High fluff is bad: red above 60, amber 36-60, green up to 35.
    pub fn for_fluff(score: u8) -> Self {
        match score {
            s if s > 60 => ScoreBand::Red,
            s if s > 35 => ScoreBand::Amber,
            _ => ScoreBand::Green,
        }
    }

    /// High novelty is good: green above 60, amber 36-60, red up to 35.
    pub fn for_novelty(score: u8) -> Self {
        match score {
            s if s > 60 => ScoreBand::Green,
            s if s > 35 => ScoreBand::Amber,
            _ => ScoreBand::Red,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SummaryResult {
        SummaryResult {
            ultra_short: "a".into(),
            short: "b".into(),
            medium: "c".into(),
            detailed: "d".into(),
            fluff_percentage: 40,
            novelty_score: 80,
        }
    }

    #[test]
    fn text_follows_level() {
        let s = sample();
        let texts: Vec<&str> = DetailLevel::ALL.iter().map(|l| s.text(*l)).collect();
        assert_eq!(texts, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["ultraShort"], "a");
        assert_eq!(json["fluffPercentage"], 40);
        assert_eq!(json["noveltyScore"], 80);
    }

    #[test]
    fn level_navigation_stops_at_the_ends() {
        assert_eq!(DetailLevel::Brief.next(), Some(DetailLevel::Short));
        assert_eq!(DetailLevel::Detailed.next(), None);
        assert_eq!(DetailLevel::Brief.prev(), None);
        assert_eq!(DetailLevel::from_index(4), None);
        assert!(DetailLevel::Detailed.is_last());
    }

    #[test]
    fn fluff_thresholds() {
        assert_eq!(ScoreBand::for_fluff(61), ScoreBand::Red);
        assert_eq!(ScoreBand::for_fluff(60), ScoreBand::Amber);
        assert_eq!(ScoreBand::for_fluff(36), ScoreBand::Amber);
        assert_eq!(ScoreBand::for_fluff(35), ScoreBand::Green);
        assert_eq!(ScoreBand::for_fluff(0), ScoreBand::Green);
    }

    #[test]
    fn novelty_thresholds_are_inverted() {
        assert_eq!(ScoreBand::for_novelty(100), ScoreBand::Green);
        assert_eq!(ScoreBand::for_novelty(61), ScoreBand::Green);
        assert_eq!(ScoreBand::for_novelty(60), ScoreBand::Amber);
        assert_eq!(ScoreBand::for_novelty(36), ScoreBand::Amber);
        assert_eq!(ScoreBand::for_novelty(35), ScoreBand::Red);
    }
}
