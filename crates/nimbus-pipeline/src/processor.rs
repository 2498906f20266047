//! Message processing stages.
//!
//! A chain of stages turns message bodies into a frequency mapping. Each
//! stage either passes an intermediate text sequence to the next stage or
//! terminates the chain with a final mapping; external tokenizers plug in as
//! stages, and a stopword-aware counter is always the terminal step.

use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Result of one processing stage.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    /// A text sequence for the next stage.
    Intermediate(Vec<String>),
    /// A finished token → relative weight mapping; stops the chain.
    Final(HashMap<String, f64>),
}

/// A single stage of the processing chain.
pub trait MessageProcessor: Send + Sync {
    fn process(&self, messages: Vec<String>) -> StageOutcome;
}

/// Terminal stage: count token occurrences, skipping stopwords.
#[derive(Debug, Default, Clone)]
pub struct FrequencyCounter {
    stopwords: HashSet<String>,
}

impl FrequencyCounter {
    pub fn new(stopwords: HashSet<String>) -> Self {
        Self { stopwords }
    }

    /// Load stopwords from a newline-separated file.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let stopwords = content
            .lines()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .collect();
        Ok(Self { stopwords })
    }

    pub fn count(&self, tokens: &[String]) -> HashMap<String, f64> {
        let mut frequencies: HashMap<String, f64> = HashMap::new();
        for token in tokens {
            let token = token.trim();
            if token.is_empty() || self.stopwords.contains(token) {
                continue;
            }
            *frequencies.entry(token.to_string()).or_insert(0.0) += 1.0;
        }
        frequencies
    }
}

/// Run `messages` through `stages`, stopping at the first [`StageOutcome::Final`];
/// if every stage yields an intermediate sequence, `counter` finishes the chain.
pub fn run_chain(
    stages: &[Box<dyn MessageProcessor>],
    counter: &FrequencyCounter,
    messages: Vec<String>,
) -> HashMap<String, f64> {
    let mut current = messages;
    for stage in stages {
        match stage.process(current) {
            StageOutcome::Intermediate(next) => current = next,
            StageOutcome::Final(frequencies) => return frequencies,
        }
    }
    counter.count(&current)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Splits each message on whitespace, standing in for a real tokenizer.
    struct WhitespaceTokenizer;

    impl MessageProcessor for WhitespaceTokenizer {
        fn process(&self, messages: Vec<String>) -> StageOutcome {
            StageOutcome::Intermediate(
                messages
                    .iter()
                    .flat_map(|m| m.split_whitespace())
                    .map(str::to_string)
                    .collect(),
            )
        }
    }

    /// Terminates the chain with a fixed mapping.
    struct ShortCircuit;

    impl MessageProcessor for ShortCircuit {
        fn process(&self, _messages: Vec<String>) -> StageOutcome {
            StageOutcome::Final(HashMap::from([("fixed".to_string(), 1.0)]))
        }
    }

    #[test]
    fn test_count_skips_stopwords_and_blanks() {
        let counter = FrequencyCounter::new(HashSet::from(["the".to_string()]));
        let tokens: Vec<String> = ["hello", "the", "hello", "", "  ", "world"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let frequencies = counter.count(&tokens);
        assert_eq!(frequencies.get("hello"), Some(&2.0));
        assert_eq!(frequencies.get("world"), Some(&1.0));
        assert!(!frequencies.contains_key("the"));
        assert!(!frequencies.contains_key(""));
    }

    #[test]
    fn test_chain_falls_through_to_counter() {
        let stages: Vec<Box<dyn MessageProcessor>> = vec![Box::new(WhitespaceTokenizer)];
        let counter = FrequencyCounter::default();
        let frequencies = run_chain(
            &stages,
            &counter,
            vec!["hello world".to_string(), "hello".to_string()],
        );
        assert_eq!(frequencies.get("hello"), Some(&2.0));
        assert_eq!(frequencies.get("world"), Some(&1.0));
    }

    #[test]
    fn test_chain_stops_at_first_final() {
        let stages: Vec<Box<dyn MessageProcessor>> =
            vec![Box::new(ShortCircuit), Box::new(WhitespaceTokenizer)];
        let counter = FrequencyCounter::default();
        let frequencies = run_chain(&stages, &counter, vec!["ignored".to_string()]);
        assert_eq!(frequencies, HashMap::from([("fixed".to_string(), 1.0)]));
    }

    #[test]
    fn test_from_file() {
        let dir = std::env::temp_dir();
        let path = dir.join("nimbus-stopwords-test.txt");
        std::fs::write(&path, "the\n\n  a  \n").unwrap();
        let counter = FrequencyCounter::from_file(&path).unwrap();
        let tokens: Vec<String> = ["the", "a", "word"].iter().map(|s| s.to_string()).collect();
        let frequencies = counter.count(&tokens);
        assert_eq!(frequencies.len(), 1);
        assert!(frequencies.contains_key("word"));
        std::fs::remove_file(&path).ok();
    }
}
