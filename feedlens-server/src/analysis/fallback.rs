//! Keyword-based fallback analysis
//!
//! Used when no model is configured or the model path fails. A pure function
//! of the text: the same input always yields the same annotation (apart from
//! `analyzed_at`).

use feedlens_common::models::{Analysis, AnalysisOrigin, UrgencyLevel, DEFAULT_THEME};

use super::parse::impact_from_urgency;

const NEGATIVE_WORDS: &[&str] = &[
    "bug", "crash", "broken", "error", "fail", "slow", "hate", "terrible", "awful", "useless",
    "frustrat",
];

const POSITIVE_WORDS: &[&str] = &[
    "great", "love", "excellent", "awesome", "amazing", "helpful", "fantastic", "perfect", "easy",
];

const CRITICAL_WORDS: &[&str] = &[
    "urgent", "asap", "critical", "immediately", "crash", "broken", "outage", "blocker",
    "emergency",
];

const ISSUE_WORDS: &[&str] = &["bug", "error", "slow", "issue", "problem", "fail"];

/// Theme groups, first match wins
const THEMES: &[(&str, &[&str])] = &[
    ("Bug Fix", &["bug", "crash", "broken", "error", "fail"]),
    (
        "Performance",
        &["slow", "performance", "lag", "speed", "timeout", "loading"],
    ),
    (
        "UI/UX",
        &["ui", "ux", "design", "confusing", "layout", "interface", "button"],
    ),
    (
        "Feature Request",
        &["feature", "wish", "request", "missing", "integrat"],
    ),
    (
        "Pricing",
        &["price", "pricing", "expensive", "cost", "billing", "subscription"],
    ),
];

const SENTIMENT_NEGATIVE: f32 = 0.3;
const SENTIMENT_POSITIVE: f32 = 0.8;
const SENTIMENT_NEUTRAL: f32 = 0.5;

const URGENCY_CRITICAL: f32 = 0.8;
const URGENCY_ISSUE: f32 = 0.5;
const URGENCY_ROUTINE: f32 = 0.3;

/// Lowercased alphanumeric words of the text
fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whether any word starts with any of the keywords
fn mentions(words: &[String], keywords: &[&str]) -> bool {
    words
        .iter()
        .any(|w| keywords.iter().any(|k| w.starts_with(k)))
}

fn insights_for(level: UrgencyLevel) -> Vec<String> {
    let lines: &[&str] = match level {
        UrgencyLevel::High => &[
            "Escalate to the owning team immediately",
            "Follow up with the customer once a fix is available",
        ],
        UrgencyLevel::Medium => &[
            "Add to the backlog for the next planning cycle",
            "Watch for similar reports",
        ],
        UrgencyLevel::Low => &["Track for trend analysis"],
    };
    lines.iter().map(|s| s.to_string()).collect()
}

/// Deterministic analysis of `text`
pub fn fallback_analysis(text: &str) -> Analysis {
    let words = words(text);

    let sentiment = if mentions(&words, NEGATIVE_WORDS) {
        SENTIMENT_NEGATIVE
    } else if mentions(&words, POSITIVE_WORDS) {
        SENTIMENT_POSITIVE
    } else {
        SENTIMENT_NEUTRAL
    };

    let urgency = if mentions(&words, CRITICAL_WORDS) {
        URGENCY_CRITICAL
    } else if mentions(&words, ISSUE_WORDS) {
        URGENCY_ISSUE
    } else {
        URGENCY_ROUTINE
    };

    let theme = THEMES
        .iter()
        .find(|(_, keywords)| mentions(&words, keywords))
        .map(|(theme, _)| *theme)
        .unwrap_or(DEFAULT_THEME);

    Analysis::normalized(
        sentiment,
        urgency,
        impact_from_urgency(urgency),
        theme,
        insights_for(UrgencyLevel::from_score(urgency)),
        AnalysisOrigin::Fallback,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crash_report_is_negative_urgent_bug() {
        let a = fallback_analysis("This crashes constantly, very urgent");
        assert_eq!(a.sentiment, 0.3);
        assert_eq!(a.urgency, 0.8);
        assert_eq!(a.urgency_level(), UrgencyLevel::High);
        assert_eq!(a.theme, "Bug Fix");
        assert_eq!(a.business_impact, 4);
        assert_eq!(a.origin, AnalysisOrigin::Fallback);
        assert!(!a.insights.is_empty());
    }

    #[test]
    fn test_praise_is_positive_routine() {
        let a = fallback_analysis("I love how easy the onboarding was!");
        assert_eq!(a.sentiment, 0.8);
        assert_eq!(a.urgency, 0.3);
        assert_eq!(a.theme, "General");
        assert_eq!(a.urgency_level(), UrgencyLevel::Low);
    }

    #[test]
    fn test_negative_wins_over_positive() {
        let a = fallback_analysis("Great app but the export is slow");
        assert_eq!(a.sentiment, 0.3);
        assert_eq!(a.urgency, 0.5);
        assert_eq!(a.theme, "Performance");
    }

    #[test]
    fn test_theme_group_order() {
        assert_eq!(fallback_analysis("The button layout is confusing").theme, "UI/UX");
        assert_eq!(
            fallback_analysis("Please add a Slack integration").theme,
            "Feature Request"
        );
        assert_eq!(fallback_analysis("Too expensive for small teams").theme, "Pricing");
        // Bug Fix is checked before Performance
        assert_eq!(fallback_analysis("Timeout error on login").theme, "Bug Fix");
    }

    #[test]
    fn test_prefix_match_not_substring() {
        // "debug" does not start with "bug"
        let a = fallback_analysis("Thanks for the debugging guide");
        assert_eq!(a.sentiment, 0.5);
        assert_eq!(a.theme, "General");
        // "frustrating" starts with "frustrat"
        assert_eq!(fallback_analysis("Really frustrating").sentiment, 0.3);
    }

    #[test]
    fn test_outputs_in_range_and_deterministic() {
        let samples = [
            "",
            "🔥🔥🔥",
            "URGENT outage, everything is broken!!!",
            "meh",
            "The pricing page has a bug and loads slowly",
        ];
        for text in samples {
            let a = fallback_analysis(text);
            let b = fallback_analysis(text);
            assert!((0.0..=1.0).contains(&a.sentiment));
            assert!((0.0..=1.0).contains(&a.urgency));
            assert!((1..=5).contains(&a.business_impact));
            assert!(!a.theme.is_empty());
            assert!(a.insights.len() <= 3);
            assert_eq!(
                (a.sentiment, a.urgency, a.business_impact, &a.theme, &a.insights),
                (b.sentiment, b.urgency, b.business_impact, &b.theme, &b.insights)
            );
        }
    }
}
