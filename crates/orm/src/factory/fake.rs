//! Fake data for factories and seeders

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

const FIRST_NAMES: &[&str] = &[
    "Alice", "Bob", "Charlie", "Diana", "Eve", "Frank", "Grace", "Henry", "Ivy", "Jack", "Kate",
    "Liam", "Mia", "Noah", "Olivia", "Peter", "Quinn", "Ruby", "Sam", "Tina", "Uma", "Victor",
    "Willow", "Xander", "Yara", "Zoe",
];

const LAST_NAMES: &[&str] = &[
    "Anderson", "Brown", "Clark", "Davis", "Evans", "Fisher", "Garcia", "Harris", "Johnson",
    "King", "Lopez", "Miller", "Nelson", "Parker", "Roberts", "Smith", "Taylor", "Williams",
    "Young", "Zhang",
];

const WORDS: &[&str] = &[
    "lorem", "ipsum", "dolor", "sit", "amet", "consectetur", "adipiscing", "elit", "sed", "do",
    "eiusmod", "tempor", "incididunt", "ut", "labore", "et", "dolore", "magna", "aliqua", "enim",
    "ad", "minim", "veniam", "quis", "nostrud", "exercitation", "ullamco", "laboris", "nisi",
    "aliquip", "ex", "ea", "commodo", "consequat", "duis", "aute", "irure", "in", "voluptate",
    "velit", "esse", "cillum", "fugiat", "nulla", "pariatur",
];

const EMAIL_DOMAINS: &[&str] = &["example.com", "example.org", "example.net"];

/// Random data source. Seed it for reproducible output.
pub struct Fake {
    rng: StdRng,
}

impl Default for Fake {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Fake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fake").finish_non_exhaustive()
    }
}

impl Fake {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    fn pick(&mut self, items: &[&'static str]) -> &'static str {
        items.choose(&mut self.rng).copied().unwrap_or_default()
    }

    pub fn first_name(&mut self) -> String {
        self.pick(FIRST_NAMES).to_string()
    }

    pub fn last_name(&mut self) -> String {
        self.pick(LAST_NAMES).to_string()
    }

    pub fn name(&mut self) -> String {
        format!("{} {}", self.first_name(), self.last_name())
    }

    /// `first.last{n}@example.{com,org,net}`, lowercase
    pub fn email(&mut self) -> String {
        let first = self.first_name();
        let last = self.last_name();
        let number = self.integer(1, 9999);
        let domain = self.pick(EMAIL_DOMAINS);
        format!("{}.{}{}@{}", first, last, number, domain).to_lowercase()
    }

    pub fn password(&mut self) -> String {
        (&mut self.rng)
            .sample_iter(&Alphanumeric)
            .take(16)
            .map(char::from)
            .collect()
    }

    pub fn word(&mut self) -> String {
        self.pick(WORDS).to_string()
    }

    pub fn words(&mut self, count: usize) -> Vec<String> {
        (0..count).map(|_| self.word()).collect()
    }

    /// Capitalised words ending with a period
    pub fn sentence(&mut self, words: usize) -> String {
        let words = self.words(words.max(1)).join(" ");
        let mut chars = words.chars();
        match chars.next() {
            Some(first) => format!("{}{}.", first.to_uppercase(), chars.as_str()),
            None => String::new(),
        }
    }

    pub fn paragraph(&mut self, sentences: usize) -> String {
        (0..sentences.max(1))
            .map(|_| {
                let length = self.rng.gen_range(4..=10);
                self.sentence(length)
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Sentences up to `max` characters
    pub fn text(&mut self, max: usize) -> String {
        let mut text = String::new();
        loop {
            let length = self.rng.gen_range(4..=10);
            let sentence = self.sentence(length);
            let needed = if text.is_empty() { sentence.len() } else { sentence.len() + 1 };
            if text.len() + needed > max {
                break;
            }
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(&sentence);
        }
        if text.is_empty() {
            let sentence = self.sentence(3);
            text = sentence.chars().take(max).collect();
        }
        text
    }

    pub fn integer(&mut self, min: i64, max: i64) -> i64 {
        if min >= max {
            return min;
        }
        self.rng.gen_range(min..=max)
    }

    pub fn float(&mut self, min: f64, max: f64) -> f64 {
        if min >= max {
            return min;
        }
        self.rng.gen_range(min..max)
    }

    pub fn boolean(&mut self) -> bool {
        self.rng.gen_bool(0.5)
    }

    pub fn choice<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        items.choose(&mut self.rng)
    }

    pub fn datetime_between(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> DateTime<Utc> {
        let secs = self.integer(start.timestamp(), end.timestamp());
        DateTime::from_timestamp(secs, 0).unwrap_or(start)
    }

    pub fn slug(&mut self, words: usize) -> String {
        self.words(words.max(1)).join("-")
    }

    pub fn uuid(&mut self) -> String {
        uuid::Builder::from_random_bytes(self.rng.gen()).into_uuid().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_seeded_is_reproducible() {
        let mut a = Fake::seeded(7);
        let mut b = Fake::seeded(7);
        assert_eq!(a.name(), b.name());
        assert_eq!(a.email(), b.email());
        assert_eq!(a.uuid(), b.uuid());
    }

    #[test]
    fn test_email_shape() {
        let mut fake = Fake::seeded(1);
        for _ in 0..20 {
            let email = fake.email();
            assert_eq!(email, email.to_lowercase());
            let (local, domain) = email.split_once('@').unwrap();
            assert!(local.contains('.'));
            assert!(EMAIL_DOMAINS.contains(&domain));
        }
    }

    #[test]
    fn test_text_helpers() {
        let mut fake = Fake::seeded(3);
        assert_eq!(fake.words(4).len(), 4);
        assert!(fake.sentence(5).ends_with('.'));
        assert!(fake.text(80).len() <= 80);
        assert_eq!(fake.slug(3).matches('-').count(), 2);
        assert_eq!(fake.password().len(), 16);
        assert_eq!(uuid::Uuid::parse_str(&fake.uuid()).unwrap().get_version_num(), 4);
    }

    #[test]
    fn test_ranges() {
        let mut fake = Fake::seeded(9);
        for _ in 0..50 {
            let n = fake.integer(5, 10);
            assert!((5..=10).contains(&n));
            let f = fake.float(0.0, 1.0);
            assert!((0.0..1.0).contains(&f));
        }
        assert_eq!(fake.integer(3, 3), 3);
        assert!(fake.choice::<i32>(&[]).is_none());

        let start = Utc::now() - Duration::days(30);
        let end = Utc::now();
        let when = fake.datetime_between(start, end);
        assert!(when >= start - Duration::seconds(1) && when <= end);
    }
}
