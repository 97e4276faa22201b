//! Stop-word and interrupt-word matching for transcripts and typed input.

use crate::config::KeywordLists;

/// Outcome of classifying one transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordVerdict {
    /// End the conversation and disable auto-listen.
    Stop,
    /// Cut the assistant off and return to listening.
    Interrupt,
    None,
}

/// Raw match flags; both may be set at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeywordMatch {
    pub stop: bool,
    pub interrupt: bool,
}

impl KeywordMatch {
    /// Stop wins when both lists matched.
    pub fn verdict(&self) -> KeywordVerdict {
        if self.stop {
            KeywordVerdict::Stop
        } else if self.interrupt {
            KeywordVerdict::Interrupt
        } else {
            KeywordVerdict::None
        }
    }
}

/// Case-insensitive substring matcher over the active language's lists.
#[derive(Debug, Clone, Default)]
pub struct KeywordClassifier {
    stop_words: Vec<String>,
    interrupt_words: Vec<String>,
}

impl KeywordClassifier {
    pub fn new(stop_words: &[String], interrupt_words: &[String]) -> Self {
        Self {
            stop_words: normalize_all(stop_words),
            interrupt_words: normalize_all(interrupt_words),
        }
    }

    pub fn from_lists(lists: &KeywordLists) -> Self {
        Self::new(&lists.stop_words, &lists.interrupt_words)
    }

    pub fn classify(&self, text: &str) -> KeywordMatch {
        let haystack = text.to_lowercase();
        KeywordMatch {
            stop: contains_any(&haystack, &self.stop_words),
            interrupt: contains_any(&haystack, &self.interrupt_words),
        }
    }

    pub fn stop_words(&self) -> &[String] {
        &self.stop_words
    }

    pub fn interrupt_words(&self) -> &[String] {
        &self.interrupt_words
    }
}

fn normalize_all(words: &[String]) -> Vec<String> {
    words
        .iter()
        .map(|w| w.trim().to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

fn contains_any(haystack: &str, needles: &[String]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KeywordConfig;

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_stop_word_inside_sentence() {
        let classifier = KeywordClassifier::new(&words(&["au revoir"]), &words(&["attends"]));
        let result = classifier.classify("d'accord, au revoir");
        assert!(result.stop);
        assert!(!result.interrupt);
        assert_eq!(result.verdict(), KeywordVerdict::Stop);
    }

    #[test]
    fn test_interrupt_only_word_is_not_stop() {
        let classifier = KeywordClassifier::new(&words(&["au revoir"]), &words(&["tais-toi"]));
        let result = classifier.classify("Tais-toi un instant");
        assert!(!result.stop);
        assert!(result.interrupt);
        assert_eq!(result.verdict(), KeywordVerdict::Interrupt);
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let classifier = KeywordClassifier::new(&words(&["Goodbye"]), &[]);
        assert!(classifier.classify("OK GOODBYE then").stop);
    }

    #[test]
    fn test_stop_takes_precedence_over_interrupt() {
        let classifier = KeywordClassifier::new(&words(&["stop"]), &words(&["stop"]));
        let result = classifier.classify("stop");
        assert!(result.stop && result.interrupt);
        assert_eq!(result.verdict(), KeywordVerdict::Stop);
    }

    #[test]
    fn test_no_match() {
        let classifier = KeywordClassifier::from_lists(&KeywordConfig::default().lists_for("en"));
        let result = classifier.classify("what's the weather like");
        assert_eq!(result, KeywordMatch::default());
        assert_eq!(result.verdict(), KeywordVerdict::None);
    }

    #[test]
    fn test_blank_words_are_ignored() {
        let classifier = KeywordClassifier::new(&words(&["", "   "]), &words(&[" wait "]));
        assert!(classifier.stop_words().is_empty());
        assert_eq!(classifier.interrupt_words(), &["wait".to_string()]);
        assert!(!classifier.classify("anything").stop);
    }

    #[test]
    fn test_default_french_lists() {
        let classifier = KeywordClassifier::from_lists(&KeywordConfig::default().lists_for("fr"));
        assert_eq!(classifier.classify("Arrête, merci").verdict(), KeywordVerdict::Stop);
        assert_eq!(
            classifier.classify("attends une minute").verdict(),
            KeywordVerdict::Interrupt
        );
    }
}
