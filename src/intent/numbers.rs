//! Numeric argument extraction from transcribed speech
//!
//! Accepts digits (`50`, `50%`) and spoken numbers from zero to one hundred
//! (`fifty`, `fifty five`, `fifty-five`, `a hundred`).

const UNITS: [&str; 20] = [
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
    "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen",
    "nineteen",
];

const TENS: [&str; 8] = [
    "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
];

fn unit_value(word: &str) -> Option<i64> {
    UNITS.iter().position(|u| *u == word).map(|i| i as i64)
}

fn tens_value(word: &str) -> Option<i64> {
    TENS.iter()
        .position(|t| *t == word)
        .map(|i| (i as i64 + 2) * 10)
}

fn digits_value(word: &str) -> Option<i64> {
    let digits = word.trim_end_matches('%');
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Parse a number starting at `words[0]`; returns the value and words consumed
fn parse_at(words: &[&str]) -> Option<(i64, usize)> {
    let first = *words.first()?;

    if let Some(value) = digits_value(first) {
        return Some((value, 1));
    }

    if first == "hundred" {
        return Some((100, 1));
    }
    if (first == "a" || first == "one") && words.get(1) == Some(&"hundred") {
        return Some((100, 2));
    }

    if let Some((tens, unit)) = first.split_once('-') {
        let tens = tens_value(tens)?;
        let unit = unit_value(unit).filter(|u| (1..=9).contains(u))?;
        return Some((tens + unit, 1));
    }

    if let Some(tens) = tens_value(first) {
        let unit = words
            .get(1)
            .and_then(|w| unit_value(w))
            .filter(|u| (1..=9).contains(u));
        return Some(match unit {
            Some(unit) => (tens + unit, 2),
            None => (tens, 1),
        });
    }

    unit_value(first).map(|v| (v, 1))
}

/// First number mentioned in already-normalised, whitespace-separated text
pub fn extract_number(text: &str) -> Option<i64> {
    let words: Vec<&str> = text.split_whitespace().collect();
    (0..words.len()).find_map(|i| parse_at(&words[i..]).map(|(value, _)| value))
}
