use tracing::warn;

use crate::error::AppError;

/// Maps free text to a polarity in roughly `[-1, 1]`. Empty text is neutral.
pub trait SentimentScorer: Send + Sync {
    fn score(&self, text: &str) -> Result<f64, AppError>;
}

/// Scores text and swallows failures. Ranking must never stop on a bad comment.
pub fn score_or_neutral(scorer: &dyn SentimentScorer, text: &str) -> f64 {
    if text.trim().is_empty() {
        return 0.0;
    }

    match scorer.score(text) {
        Ok(score) if score.is_finite() => score,
        Ok(score) => {
            warn!(score, "sentiment scorer returned a non-finite value; treating as neutral");
            0.0
        }
        Err(err) => {
            warn!(error = %err, "sentiment scoring failed; treating as neutral");
            0.0
        }
    }
}

const POSITIVE: &[&str] = &[
    "good", "great", "excellent", "amazing", "awesome", "fast", "quick", "friendly",
    "helpful", "professional", "reliable", "honest", "polite", "best", "recommend",
    "recommended", "perfect", "skilled", "efficient", "fair", "affordable", "nice",
    "satisfied", "punctual", "trustworthy", "thanks", "thank", "love", "fixed", "smooth",
];

const NEGATIVE: &[&str] = &[
    "bad", "poor", "terrible", "awful", "slow", "late", "rude", "expensive", "overpriced",
    "worst", "unprofessional", "dishonest", "delay", "delayed", "broke", "broken", "never",
    "horrible", "disappointed", "disappointing", "careless", "unreliable", "cheated",
    "scam", "waste", "angry", "useless", "problem", "issue", "worse",
];

const NEGATIONS: &[&str] = &["not", "no", "never", "hardly", "isn't", "wasn't", "don't", "didn't"];

/// Lexicon polarity: `(positive - negative) / (positive + negative)` over word
/// hits, with a preceding negation flipping the hit.
#[derive(Debug, Default, Clone, Copy)]
pub struct LexiconSentiment;

impl SentimentScorer for LexiconSentiment {
    fn score(&self, text: &str) -> Result<f64, AppError> {
        let mut positive = 0u32;
        let mut negative = 0u32;
        let mut negate = false;

        for raw in text.split_whitespace() {
            let word = raw
                .trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
                .to_lowercase();
            if word.is_empty() {
                continue;
            }

            let polarity = if POSITIVE.contains(&word.as_str()) {
                Some(true)
            } else if NEGATIVE.contains(&word.as_str()) && !NEGATIONS.contains(&word.as_str()) {
                Some(false)
            } else {
                None
            };

            match polarity {
                Some(is_positive) => {
                    if is_positive != negate {
                        positive += 1;
                    } else {
                        negative += 1;
                    }
                    negate = false;
                }
                None => negate = NEGATIONS.contains(&word.as_str()),
            }
        }

        let hits = positive + negative;
        if hits == 0 {
            return Ok(0.0);
        }
        Ok((positive as f64 - negative as f64) / hits as f64)
    }
}
