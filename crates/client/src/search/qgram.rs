//! Padded trigram similarity.
//!
//! Strings are padded with two `#` on each side and cut into overlapping
//! trigrams. The distance between two profiles is the sum of absolute
//! per-trigram count differences; similarity is
//! `(|A| + |B| - distance) / (|A| + |B|)`, which is 1.0 for identical
//! strings and 0.0 when no trigram is shared.

const PAD: char = '#';

type Gram = [char; 3];

/// Trigram counts of one string, sorted by trigram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QGramProfile {
    grams: Vec<(Gram, u32)>,
    total: u32,
}

impl QGramProfile {
    pub fn new(text: &str) -> Self {
        let padded: Vec<char> = [PAD, PAD]
            .into_iter()
            .chain(text.chars())
            .chain([PAD, PAD])
            .collect();

        let mut grams: Vec<Gram> = padded.windows(3).map(|w| [w[0], w[1], w[2]]).collect();
        let total = grams.len() as u32;
        grams.sort_unstable();

        let mut counted: Vec<(Gram, u32)> = Vec::with_capacity(grams.len());
        for gram in grams {
            match counted.last_mut() {
                Some((last, count)) if *last == gram => *count += 1,
                _ => counted.push((gram, 1)),
            }
        }

        Self { grams: counted, total }
    }

    /// Number of trigrams, counting repeats.
    pub fn len(&self) -> u32 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn similarity(&self, other: &QGramProfile) -> f32 {
        let total = self.total + other.total;
        if total == 0 {
            return 0.0;
        }

        // distance = total - 2 * shared
        let mut shared = 0u32;
        let (mut i, mut j) = (0, 0);
        while i < self.grams.len() && j < other.grams.len() {
            let (a, ca) = self.grams[i];
            let (b, cb) = other.grams[j];
            match a.cmp(&b) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    shared += ca.min(cb);
                    i += 1;
                    j += 1;
                }
            }
        }

        (2 * shared) as f32 / total as f32
    }
}

/// Similarity of two strings in `[0, 1]`.
pub fn similarity(a: &str, b: &str) -> f32 {
    QGramProfile::new(a).similarity(&QGramProfile::new(b))
}
