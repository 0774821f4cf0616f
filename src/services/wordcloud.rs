use std::collections::{HashMap, HashSet};

use crate::models::{MovieSeq, WordCloud, WordCount};

/// Words kept per movie
pub const WORDS_PER_MOVIE: usize = 50;

const MIN_WORD_CHARS: usize = 2;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "had", "has", "have",
    "he", "her", "his", "i", "in", "is", "it", "its", "me", "my", "of", "on", "or", "so", "she",
    "that", "the", "their", "them", "there", "they", "this", "to", "was", "we", "were", "with",
    "you", "영화", "너무", "정말", "진짜", "그냥", "이", "그", "저", "것", "수", "좀", "더",
];

/// Builds per-movie word frequencies from stored free text
#[derive(Debug, Clone)]
pub struct WordCloudBuilder {
    stop_words: HashSet<&'static str>,
    limit: usize,
}

impl Default for WordCloudBuilder {
    fn default() -> Self {
        Self::new(WORDS_PER_MOVIE)
    }
}

impl WordCloudBuilder {
    pub fn new(limit: usize) -> Self {
        Self {
            stop_words: STOP_WORDS.iter().copied().collect(),
            limit,
        }
    }

    /// Most frequent words per movie, ordered by count then alphabetically
    pub fn build(&self, texts: &[(MovieSeq, Vec<String>)]) -> Vec<WordCloud> {
        texts
            .iter()
            .map(|(movie_seq, contents)| WordCloud {
                movie_seq: *movie_seq,
                words: self.top_words(contents),
            })
            .filter(|cloud| !cloud.words.is_empty())
            .collect()
    }

    fn top_words(&self, contents: &[String]) -> Vec<WordCount> {
        let mut counts: HashMap<String, u32> = HashMap::new();

        for content in contents {
            for word in content
                .split(|c: char| !c.is_alphanumeric())
                .map(str::to_lowercase)
                .filter(|w| w.chars().count() >= MIN_WORD_CHARS)
                .filter(|w| !w.chars().all(|c| c.is_ascii_digit()))
                .filter(|w| !self.stop_words.contains(w.as_str()))
            {
                *counts.entry(word).or_insert(0) += 1;
            }
        }

        let mut words: Vec<WordCount> = counts
            .into_iter()
            .map(|(word, count)| WordCount { word, count })
            .collect();
        words.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.word.cmp(&b.word)));
        words.truncate(self.limit);
        words
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(entries: &[(i64, &[&str])]) -> Vec<(MovieSeq, Vec<String>)> {
        entries
            .iter()
            .map(|(seq, contents)| (*seq, contents.iter().map(|c| c.to_string()).collect()))
            .collect()
    }

    #[test]
    fn test_counts_across_entries() {
        let clouds = WordCloudBuilder::default().build(&texts(&[(
            1,
            &["Dream within a dream", "The DREAM heist"],
        )]));

        assert_eq!(clouds.len(), 1);
        assert_eq!(
            clouds[0].words[0],
            WordCount {
                word: "dream".to_string(),
                count: 3
            }
        );
    }

    #[test]
    fn test_stop_words_and_short_tokens_dropped() {
        let clouds = WordCloudBuilder::default().build(&texts(&[(1, &["I saw it in 2010, a b c"])]));

        let words: Vec<_> = clouds[0].words.iter().map(|w| w.word.as_str()).collect();
        assert_eq!(words, vec!["saw"]);
    }

    #[test]
    fn test_ties_sorted_alphabetically_and_limited() {
        let clouds =
            WordCloudBuilder::new(2).build(&texts(&[(1, &["zebra apple mango", "zebra apple"])]));

        let words: Vec<_> = clouds[0].words.iter().map(|w| w.word.as_str()).collect();
        assert_eq!(words, vec!["apple", "zebra"]);
    }

    #[test]
    fn test_movies_without_words_are_omitted() {
        let clouds = WordCloudBuilder::default().build(&texts(&[(1, &["the a of"]), (2, &["epic"])]));
        assert_eq!(clouds.len(), 1);
        assert_eq!(clouds[0].movie_seq, 2);
    }
}
