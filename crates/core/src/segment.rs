//! Group a word-level transcript into per-speaker segments.

use crate::types::{Segment, Word};

/// Split words into maximal runs of the same speaker.
///
/// Boundaries depend only on speaker-label changes; a long pause between two
/// words of the same speaker does not start a new segment.
pub fn group_segments(words: &[Word]) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut current: Vec<Word> = Vec::new();

    for word in words {
        let same_speaker = current
            .first()
            .map(|w| w.speaker == word.speaker)
            .unwrap_or(true);

        if !same_speaker {
            segments.push(close_segment(std::mem::take(&mut current)));
        }
        current.push(word.clone());
    }

    if !current.is_empty() {
        segments.push(close_segment(current));
    }

    segments
}

fn close_segment(words: Vec<Word>) -> Segment {
    let speaker = words[0].speaker.clone();
    let start = words[0].start;
    let end = words[words.len() - 1].end;
    Segment {
        speaker,
        words,
        start,
        end,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn w(text: &str, start: f64, end: f64, speaker: &str) -> Word {
        Word::new(text, start, end, speaker)
    }

    fn texts(seg: &Segment) -> Vec<&str> {
        seg.words.iter().map(|w| w.text.as_str()).collect()
    }

    #[test]
    fn test_group_two_speakers() {
        let words = vec![
            w("hi", 0.0, 0.5, "A"),
            w("bob", 0.5, 1.0, "A"),
            w("yo", 1.0, 1.5, "B"),
        ];
        let segments = group_segments(&words);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].speaker, "A");
        assert_eq!(texts(&segments[0]), vec!["hi", "bob"]);
        assert_eq!(segments[1].speaker, "B");
        assert_eq!(texts(&segments[1]), vec!["yo"]);
        assert!((segments[0].start - 0.0).abs() < f64::EPSILON);
        assert!((segments[0].end - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_group_empty() {
        assert!(group_segments(&[]).is_empty());
    }

    #[test]
    fn test_group_single_speaker() {
        let words: Vec<Word> = (0..7)
            .map(|i| w("word", i as f64, i as f64 + 0.5, "0"))
            .collect();
        let segments = group_segments(&words);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].words.len(), 7);
    }

    #[test]
    fn test_group_ignores_timing_gaps() {
        let words = vec![w("early", 0.0, 0.5, "A"), w("late", 120.0, 120.5, "A")];
        let segments = group_segments(&words);
        assert_eq!(segments.len(), 1);
        assert!((segments[0].end - 120.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_group_returning_speaker_gets_new_segment() {
        let words = vec![
            w("a", 0.0, 0.1, "A"),
            w("b", 0.1, 0.2, "B"),
            w("c", 0.2, 0.3, "A"),
        ];
        let segments = group_segments(&words);
        let speakers: Vec<&str> = segments.iter().map(|s| s.speaker.as_str()).collect();
        assert_eq!(speakers, vec!["A", "B", "A"]);
    }

    #[test]
    fn test_group_covers_every_word_in_order() {
        let labels = ["0", "0", "1", "2", "2", "2", "0", "unknown", "unknown", "1"];
        let words: Vec<Word> = labels
            .iter()
            .enumerate()
            .map(|(i, s)| w(&format!("w{}", i), i as f64, i as f64 + 1.0, s))
            .collect();

        let segments = group_segments(&words);

        let flattened: Vec<Word> = segments.iter().flat_map(|s| s.words.clone()).collect();
        assert_eq!(flattened, words);

        for pair in segments.windows(2) {
            assert_ne!(pair[0].speaker, pair[1].speaker);
        }
        for seg in &segments {
            assert!(!seg.words.is_empty());
            assert!(seg.words.iter().all(|w| w.speaker == seg.speaker));
        }
        assert_eq!(segments.len(), 6);
    }
}
