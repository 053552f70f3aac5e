//! Password strength rules and random password generation

use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;

pub const SYMBOLS: &str = "!@#$%^&*()_+-=[]{}|;:,.<>?";

const COMMON_PATTERNS: &[&str] = &["123", "abc", "qwerty", "password"];

/// Validates passwords against a configurable rule set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordValidator {
    pub min_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_numbers: bool,
    pub require_symbols: bool,
}

impl Default for PasswordValidator {
    fn default() -> Self {
        Self {
            min_length: 8,
            require_uppercase: true,
            require_lowercase: true,
            require_numbers: true,
            require_symbols: true,
        }
    }
}

impl PasswordValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min_length(mut self, length: usize) -> Self {
        self.min_length = length;
        self
    }

    pub fn require_symbols(mut self, required: bool) -> Self {
        self.require_symbols = required;
        self
    }

    pub fn require_mixed_case(mut self, required: bool) -> Self {
        self.require_uppercase = required;
        self.require_lowercase = required;
        self
    }

    pub fn require_numbers(mut self, required: bool) -> Self {
        self.require_numbers = required;
        self
    }

    /// Every rule the password breaks, empty when it is acceptable
    pub fn validate(&self, password: &str) -> Vec<String> {
        let mut errors = Vec::new();

        if password.chars().count() < self.min_length {
            errors.push(format!(
                "Password must be at least {} characters long",
                self.min_length
            ));
        }
        if self.require_uppercase && !password.chars().any(|c| c.is_uppercase()) {
            errors.push("Password must contain at least one uppercase letter".to_string());
        }
        if self.require_lowercase && !password.chars().any(|c| c.is_lowercase()) {
            errors.push("Password must contain at least one lowercase letter".to_string());
        }
        if self.require_numbers && !password.chars().any(|c| c.is_ascii_digit()) {
            errors.push("Password must contain at least one number".to_string());
        }
        if self.require_symbols && !password.chars().any(|c| SYMBOLS.contains(c)) {
            errors.push("Password must contain at least one special character".to_string());
        }

        errors
    }

    pub fn is_valid(&self, password: &str) -> bool {
        self.validate(password).is_empty()
    }

    /// Strength score between 0 and 100
    pub fn score(&self, password: &str) -> u8 {
        let length = password.chars().count() as i32;
        let mut score = (length * 4).min(25);

        if password.chars().any(|c| c.is_uppercase()) {
            score += 10;
        }
        if password.chars().any(|c| c.is_lowercase()) {
            score += 10;
        }
        if password.chars().any(|c| c.is_ascii_digit()) {
            score += 10;
        }
        if password.chars().any(|c| SYMBOLS.contains(c)) {
            score += 15;
        }

        let unique = password.chars().collect::<HashSet<_>>().len() as f64;
        if length > 0 && unique < length as f64 * 0.6 {
            score -= 10;
        }

        let lowered = password.to_lowercase();
        for pattern in COMMON_PATTERNS {
            if lowered.contains(pattern) {
                score -= 15;
            }
        }

        score.clamp(0, 100) as u8
    }

    pub fn strength_label(&self, password: &str) -> &'static str {
        match self.score(password) {
            s if s < 40 => "weak",
            s if s < 70 => "medium",
            _ => "strong",
        }
    }
}

const LOWERCASE: &str = "abcdefghjkmnpqrstuvwxyz";
const UPPERCASE: &str = "ABCDEFGHJKMNPQRSTUVWXYZ";
const DIGITS: &str = "23456789";
const URL_SAFE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

const WORDS: &[&str] = &[
    "amber", "anchor", "apple", "arrow", "autumn", "badge", "bamboo", "beacon", "birch", "blossom",
    "breeze", "bridge", "canyon", "cedar", "cobalt", "comet", "coral", "crystal", "delta", "desert",
    "ember", "falcon", "fern", "forest", "garnet", "glacier", "harbor", "hazel", "horizon", "island",
    "jasper", "juniper", "lantern", "larch", "lemon", "maple", "meadow", "meteor", "mosaic", "nectar",
    "orbit", "orchid", "pebble", "pepper", "planet", "prairie", "quartz", "raven", "river", "saffron",
    "sierra", "silver", "spruce", "summit", "thunder", "timber", "tulip", "velvet", "willow", "zephyr",
];

/// Random passwords and tokens
#[derive(Debug, Clone, Copy, Default)]
pub struct PasswordGenerator;

impl PasswordGenerator {
    /// Random password without the look-alike characters `il1Lo0O`.
    ///
    /// Every enabled character class appears at least once when the length
    /// allows it.
    pub fn generate(length: usize, symbols: bool) -> String {
        let mut rng = rand::thread_rng();
        let mut classes = vec![LOWERCASE, UPPERCASE, DIGITS];
        if symbols {
            classes.push(SYMBOLS);
        }
        let alphabet: Vec<char> = classes.iter().flat_map(|c| c.chars()).collect();

        let mut password: Vec<char> = classes
            .iter()
            .take(length)
            .filter_map(|class| class.chars().collect::<Vec<_>>().choose(&mut rng).copied())
            .collect();
        while password.len() < length {
            if let Some(c) = alphabet.choose(&mut rng) {
                password.push(*c);
            }
        }
        password.shuffle(&mut rng);
        password.into_iter().collect()
    }

    /// Sixteen characters with symbols
    pub fn generate_default() -> String {
        Self::generate(16, true)
    }

    /// Words joined by `-` with a two digit number, e.g. `cedar-orbit-fern-maple-42`
    pub fn memorable(words: usize) -> String {
        let mut rng = rand::thread_rng();
        let mut parts: Vec<String> = (0..words.max(1))
            .filter_map(|_| WORDS.choose(&mut rng).map(|w| w.to_string()))
            .collect();
        parts.push(format!("{:02}", rng.gen_range(10..100)));
        parts.join("-")
    }

    /// URL-safe random token
    pub fn token(length: usize) -> String {
        let mut rng = rand::thread_rng();
        (0..length)
            .map(|_| URL_SAFE[rng.gen_range(0..URL_SAFE.len())] as char)
            .collect()
    }
}
