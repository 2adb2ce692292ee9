//! Near-duplicate detection for proposed follow-ups.
//!
//! A candidate reply is a repeat when it is byte-identical to a prior own
//! message (after trimming) or when at least 70% of its distinct tokens
//! already appear in one. Repeats are rejected before send so a drifting
//! advisor cannot make an account spam the same line twice.

use std::collections::HashSet;

/// Share of candidate tokens that must reappear for a repeat verdict.
const OVERLAP_THRESHOLD: f64 = 0.7;

fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Token overlap between a candidate and one prior message: the share of
/// the candidate's distinct tokens that also appear in the prior message.
pub fn overlap(candidate: &str, prior: &str) -> f64 {
    let candidate = tokens(candidate);
    if candidate.is_empty() {
        return 0.0;
    }
    let prior = tokens(prior);
    let shared = candidate.intersection(&prior).count();
    shared as f64 / candidate.len() as f64
}

/// Whether `candidate` repeats `prior`.
pub fn is_repeat(candidate: &str, prior: &str) -> bool {
    if candidate.trim() == prior.trim() {
        return true;
    }
    overlap(candidate, prior) >= OVERLAP_THRESHOLD
}

/// Find the first prior message the candidate repeats, if any.
pub fn find_repeat<'a, I>(candidate: &str, priors: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    priors.into_iter().find(|prior| is_repeat(candidate, prior))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_text_is_a_repeat() {
        assert!(is_repeat("Hi, still interested?", "Hi, still interested?"));
        // Surrounding whitespace doesn't change the verdict.
        assert!(is_repeat("  Hi, still interested?\n", "Hi, still interested?"));
    }

    #[test]
    fn test_high_token_overlap_is_a_repeat() {
        let prior = "What budget range are you working with for this project?";
        let candidate = "What budget range are you working with for this?";
        assert!(overlap(candidate, prior) >= OVERLAP_THRESHOLD);
        assert!(is_repeat(candidate, prior));
    }

    #[test]
    fn test_unrelated_text_passes() {
        let prior = "What budget range are you working with?";
        let candidate = "When would the project ideally kick off?";
        assert!(overlap(candidate, prior) < OVERLAP_THRESHOLD);
        assert!(!is_repeat(candidate, prior));
    }

    #[test]
    fn test_case_and_punctuation_are_ignored() {
        assert_eq!(overlap("HELLO there!!!", "hello, there."), 1.0);
    }

    #[test]
    fn test_empty_candidate_never_overlaps() {
        assert_eq!(overlap("", "anything at all"), 0.0);
        assert_eq!(overlap("?!.", "anything at all"), 0.0);
    }

    #[test]
    fn test_find_repeat_scans_all_priors() {
        let priors = ["first message here", "second message entirely"];
        assert_eq!(
            find_repeat("second message entirely", priors),
            Some("second message entirely")
        );
        assert_eq!(find_repeat("nothing like those", priors), None);
    }
}
