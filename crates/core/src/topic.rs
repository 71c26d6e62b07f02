use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;

/// Minimum skim score for a keyword to count as mentioned.
pub const DEFAULT_MATCH_THRESHOLD: i64 = 60;

/// Splits a topic into the words worth looking for in an answer.
pub fn topic_keywords(topic: &str) -> Vec<String> {
    let mut words: Vec<String> = Vec::new();
    for word in topic
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 4)
        .map(str::to_lowercase)
    {
        if !words.contains(&word) {
            words.push(word);
        }
    }
    if words.is_empty() && !topic.trim().is_empty() {
        words.push(topic.trim().to_lowercase());
    }
    words
}

/// Keywords an answer is expected to touch on, matched fuzzily.
pub struct KeywordList {
    pub keywords: Vec<String>,
    matcher: SkimMatcherV2,
}

impl KeywordList {
    pub fn new(keywords: Vec<String>) -> Self {
        Self {
            keywords,
            matcher: SkimMatcherV2::default(),
        }
    }

    // Keywords that appear in the answer with a match score above the threshold
    pub fn find_mentions(&self, answer: &str, threshold: i64) -> Vec<&str> {
        let answer_lower = answer.to_lowercase();
        self.keywords
            .iter()
            .filter(|keyword| {
                let keyword = keyword.to_lowercase();
                self.matcher
                    .fuzzy_match(&answer_lower, &keyword)
                    .unwrap_or(0)
                    > threshold
            })
            .map(String::as_str)
            .collect()
    }

    pub fn find_missing(&self, answer: &str, threshold: i64) -> Vec<&str> {
        let mentioned = self.find_mentions(answer, threshold);
        self.keywords
            .iter()
            .map(String::as_str)
            .filter(|k| !mentioned.contains(k))
            .collect()
    }

    /// Share of keywords mentioned, in `0.0..=1.0`. An empty list counts as covered.
    pub fn coverage(&self, answer: &str, threshold: i64) -> f32 {
        if self.keywords.is_empty() {
            return 1.0;
        }
        self.find_mentions(answer, threshold).len() as f32 / self.keywords.len() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_keywords_skip_short_words() {
        assert_eq!(
            topic_keywords("The water cycle of Earth"),
            vec!["water", "cycle", "earth"]
        );
        assert_eq!(topic_keywords("AI"), vec!["ai"]);
        assert!(topic_keywords("   ").is_empty());
    }

    #[test]
    fn test_topic_keywords_repeat_once() {
        assert_eq!(
            topic_keywords("Water and water cycle"),
            vec!["water", "cycle"]
        );
        let list = KeywordList::new(topic_keywords("water, cycle, Water"));
        assert_eq!(list.coverage("water", DEFAULT_MATCH_THRESHOLD), 0.5);
    }

    #[test]
    fn test_find_mentions() {
        let list = KeywordList::new(vec!["chlorophyll".into(), "sunlight".into()]);
        let answer = "Plants use Chlorophyll to capture energy.";
        assert_eq!(
            list.find_mentions(answer, DEFAULT_MATCH_THRESHOLD),
            vec!["chlorophyll"]
        );
        assert_eq!(
            list.find_missing(answer, DEFAULT_MATCH_THRESHOLD),
            vec!["sunlight"]
        );
    }

    #[test]
    fn test_coverage() {
        let list = KeywordList::new(vec!["chlorophyll".into(), "sunlight".into()]);
        assert_eq!(list.coverage("xyz", DEFAULT_MATCH_THRESHOLD), 0.0);
        assert_eq!(
            list.coverage("sunlight and chlorophyll", DEFAULT_MATCH_THRESHOLD),
            1.0
        );
        assert_eq!(KeywordList::new(vec![]).coverage("", 0), 1.0);
    }
}
