// Lessons learned: recurring critic feedback across a subject's earlier posts

use crate::config::constants::LESSONS_SCORE_CUTOFF;
use crate::refinement::CriticVerdict;

/// Filler words stripped from the front of an item before counting
const FILLER_PREFIXES: &[&str] = &[
    "der ", "die ", "das ", "mehr ", "weniger ", "zu ", "the ", "more ", "less ", "too ",
];

/// Items are compared on at most this many characters
const MAX_KEY_CHARS: usize = 50;

const CRITICAL_CANDIDATES: usize = 5;
const CRITICAL_LIMIT: usize = 3;
const RECURRING_CANDIDATES: usize = 10;
const RECURRING_LIMIT: usize = 4;

/// Feedback the writer should address before the critic has to ask again
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lessons {
    /// Repeated on posts that ended below the approval cutoff
    pub critical: Vec<String>,
    /// Repeated across earlier posts regardless of score, minus the critical ones
    pub recurring: Vec<String>,
}

impl Lessons {
    pub fn is_empty(&self) -> bool {
        self.critical.is_empty() && self.recurring.is_empty()
    }
}

/// Lowercase, trim, drop trailing punctuation and filler prefixes, and cut to
/// 50 characters so near-identical feedback counts together
pub fn normalize_feedback(item: &str) -> String {
    let lowered = item.trim().to_lowercase();
    let mut text = lowered
        .trim_end_matches(|c: char| c.is_ascii_punctuation())
        .trim();
    for prefix in FILLER_PREFIXES {
        if let Some(rest) = text.strip_prefix(prefix) {
            text = rest.trim_start();
        }
    }
    text.chars().take(MAX_KEY_CHARS).collect()
}

/// Occurrence counts, in order of first appearance
fn count_items<'a>(items: impl Iterator<Item = &'a String>) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for item in items {
        let key = normalize_feedback(item);
        if key.is_empty() {
            continue;
        }
        match counts.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, count)) => *count += 1,
            None => counts.push((key, 1)),
        }
    }
    counts
}

/// The `candidates` most frequent items seen at least twice.
/// Ties keep first-appearance order.
fn most_common(mut counts: Vec<(String, usize)>, candidates: usize) -> Vec<String> {
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
        .into_iter()
        .take(candidates)
        .filter(|(_, count)| *count >= 2)
        .map(|(item, _)| item)
        .collect()
}

/// Improvements that keep coming back in earlier runs.
///
/// `history` holds the verdicts of each past post in order; only the final
/// verdict of a post counts. Critical lessons come from posts that ended
/// below the cutoff, recurring ones from all posts.
pub fn extract_lessons(history: &[Vec<CriticVerdict>]) -> Lessons {
    let finals: Vec<&CriticVerdict> = history.iter().filter_map(|v| v.last()).collect();
    if finals.is_empty() {
        return Lessons::default();
    }

    let all = count_items(finals.iter().flat_map(|v| v.improvements.iter()));
    let low = count_items(
        finals
            .iter()
            .filter(|v| v.score < LESSONS_SCORE_CUTOFF)
            .flat_map(|v| v.improvements.iter()),
    );

    let critical_candidates = most_common(low, CRITICAL_CANDIDATES);
    let recurring = most_common(all, RECURRING_CANDIDATES)
        .into_iter()
        .filter(|item| !critical_candidates.contains(item))
        .take(RECURRING_LIMIT)
        .collect();
    let mut critical = critical_candidates;
    critical.truncate(CRITICAL_LIMIT);

    let lessons = Lessons { critical, recurring };
    if !lessons.is_empty() {
        let average = finals.iter().map(|v| f64::from(v.score)).sum::<f64>() / finals.len() as f64;
        tracing::info!(
            "Extracted {} critical and {} recurring lessons from {} past posts (avg score {:.1})",
            lessons.critical.len(),
            lessons.recurring.len(),
            finals.len(),
            average
        );
    }
    lessons
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(score: u8, improvements: &[&str]) -> CriticVerdict {
        let mut v = CriticVerdict::revise(score, "revise");
        v.improvements = improvements.iter().map(|s| s.to_string()).collect();
        v
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_feedback() {
        assert_eq!(normalize_feedback("  Shorter Hook!! "), "shorter hook");
        assert_eq!(normalize_feedback("..."), "");
        assert_eq!(normalize_feedback("Die Hook zu lang"), "hook zu lang");
        assert_eq!(normalize_feedback("Mehr Emotion."), "emotion");
        assert_eq!(normalize_feedback("The more concrete the better"), "concrete the better");
    }

    #[test]
    fn test_normalize_feedback_cuts_to_fifty_chars() {
        let long = format!("{} tail", "a".repeat(60));
        assert_eq!(normalize_feedback(&long), "a".repeat(50));
        // long items sharing a prefix count as one
        let other = format!("{} other", "a".repeat(60));
        assert_eq!(normalize_feedback(&long), normalize_feedback(&other));
    }

    #[test]
    fn test_critical_lessons_come_from_low_scores() {
        let history = vec![
            vec![verdict(70, &["Shorter hook.", "Add a CTA"])],
            vec![verdict(60, &["shorter hook", "fewer emojis"])],
            vec![verdict(75, &["Add a CTA!", "Shorter hook"])],
        ];
        let lessons = extract_lessons(&history);
        assert_eq!(lessons.critical, strings(&["shorter hook", "add a cta"]));
        assert!(lessons.recurring.is_empty());
    }

    #[test]
    fn test_recurring_lessons_include_approved_posts_but_not_critical_items() {
        let history = vec![
            vec![verdict(90, &["more data", "shorter hook"])],
            vec![verdict(88, &["more data"])],
            vec![verdict(60, &["shorter hook"])],
            vec![verdict(70, &["shorter hook"])],
        ];
        let lessons = extract_lessons(&history);
        assert_eq!(lessons.critical, strings(&["shorter hook"]));
        assert_eq!(lessons.recurring, strings(&["data"]));
    }

    #[test]
    fn test_only_final_verdicts_count() {
        let history = vec![
            // earlier verdicts of a run are ignored
            vec![verdict(40, &["add numbers"]), verdict(90, &["trim intro"])],
            vec![verdict(50, &["add numbers"]), verdict(88, &["end with question"])],
            vec![verdict(84, &["add numbers"])],
        ];
        assert!(extract_lessons(&history).is_empty());
    }

    #[test]
    fn test_group_limits() {
        let items = ["a", "b", "c", "d", "e", "f", "g", "h", "i", "j"];
        let history = vec![vec![verdict(50, &items)], vec![verdict(50, &items)]];
        let lessons = extract_lessons(&history);
        assert_eq!(lessons.critical, strings(&["a", "b", "c"]));
        // d and e were critical candidates, so recurring starts at f
        assert_eq!(lessons.recurring, strings(&["f", "g", "h", "i"]));
    }

    #[test]
    fn test_empty_history() {
        assert!(extract_lessons(&[]).is_empty());
        assert!(extract_lessons(&[Vec::new()]).is_empty());
    }
}
