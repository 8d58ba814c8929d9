//! ISBN detection and canonicalization
//!
//! Canonical form is ISBN-13 after digit-only extraction and checksum
//! validation; ISBN-10 converts to ISBN-13 for storage so two printings
//! of the same book collide in the duplicate registry.

/// A validated ISBN pair: the form found plus the canonical ISBN-13
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Isbn {
    /// ISBN-10 form when the source carried one
    pub isbn_10: Option<String>,
    /// Canonical ISBN-13
    pub isbn_13: String,
}

/// Canonicalize an ISBN-ish string with arbitrary hyphenation/spacing
///
/// Returns the canonical ISBN-13, or `None` when neither checksum
/// validates. Idempotent: `canonical(canonical(x)) == canonical(x)`.
pub fn canonicalize(raw: &str) -> Option<String> {
    let digits = extract_digits(raw)?;
    match digits.len() {
        10 if valid_isbn10(&digits) => Some(isbn10_to_13(&digits)),
        13 if valid_isbn13(&digits) => Some(digits),
        _ => None,
    }
}

/// Scan free text for ISBN-10/13 candidates with checksum validation
pub fn scan(text: &str) -> Option<Isbn> {
    let mut found_10: Option<String> = None;
    let mut found_13: Option<String> = None;

    for window in candidate_runs(text) {
        let Some(digits) = extract_digits(&window) else {
            continue;
        };
        match digits.len() {
            10 if found_10.is_none() && valid_isbn10(&digits) => found_10 = Some(digits),
            13 if found_13.is_none() && valid_isbn13(&digits) => found_13 = Some(digits),
            _ => {}
        }
        if found_10.is_some() && found_13.is_some() {
            break;
        }
    }

    match (found_10, found_13) {
        (Some(ten), Some(thirteen)) => Some(Isbn {
            isbn_10: Some(ten),
            isbn_13: thirteen,
        }),
        (Some(ten), None) => {
            let thirteen = isbn10_to_13(&ten);
            Some(Isbn {
                isbn_10: Some(ten),
                isbn_13: thirteen,
            })
        }
        (None, Some(thirteen)) => Some(Isbn {
            isbn_10: None,
            isbn_13: thirteen,
        }),
        (None, None) => None,
    }
}

/// Maximal runs of digits, separators, and a trailing X
fn candidate_runs(text: &str) -> Vec<String> {
    let mut runs = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if c.is_ascii_digit() || c == '-' || c == ' ' || c == 'X' || c == 'x' {
            current.push(c);
        } else if !current.is_empty() {
            runs.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }
    // A run may wrap several space-separated candidates
    runs.into_iter()
        .flat_map(|r| {
            r.split(' ')
                .filter(|p| p.len() >= 10)
                .map(str::to_string)
                .collect::<Vec<_>>()
                .into_iter()
                .chain(std::iter::once(r.replace(' ', "")))
        })
        .filter(|r| !r.is_empty())
        .collect()
}

/// Strip non-digits, keeping a trailing X as the ISBN-10 check digit
fn extract_digits(raw: &str) -> Option<String> {
    let mut out = String::new();
    for c in raw.chars() {
        if c.is_ascii_digit() {
            out.push(c);
        } else if (c == 'X' || c == 'x') && out.len() == 9 {
            out.push('X');
        }
    }
    (!out.is_empty()).then_some(out)
}

fn valid_isbn10(digits: &str) -> bool {
    if digits.len() != 10 {
        return false;
    }
    let mut sum = 0u32;
    for (i, c) in digits.chars().enumerate() {
        let value = match c {
            'X' if i == 9 => 10,
            c if c.is_ascii_digit() => c.to_digit(10).unwrap(),
            _ => return false,
        };
        sum += value * (10 - i as u32);
    }
    sum % 11 == 0
}

fn valid_isbn13(digits: &str) -> bool {
    if digits.len() != 13 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let sum: u32 = digits
        .chars()
        .enumerate()
        .map(|(i, c)| c.to_digit(10).unwrap() * if i % 2 == 0 { 1 } else { 3 })
        .sum();
    sum % 10 == 0
}

/// Convert a valid ISBN-10 to its 978-prefixed ISBN-13
fn isbn10_to_13(digits: &str) -> String {
    let body: String = format!("978{}", &digits[..9]);
    let sum: u32 = body
        .chars()
        .enumerate()
        .map(|(i, c)| c.to_digit(10).unwrap() * if i % 2 == 0 { 1 } else { 3 })
        .sum();
    let check = (10 - (sum % 10)) % 10;
    format!("{body}{check}")
}

#[cfg(test)]
mod tests {
    use super::*;

    // 0-306-40615-2 is the canonical ISBN-10 example; its 13 form is
    // 978-0-306-40615-7.
    const TEN: &str = "0-306-40615-2";
    const THIRTEEN: &str = "978-0-306-40615-7";

    #[test]
    fn canonicalize_validates_checksums() {
        assert_eq!(canonicalize(TEN).as_deref(), Some("9780306406157"));
        assert_eq!(canonicalize(THIRTEEN).as_deref(), Some("9780306406157"));
        assert_eq!(canonicalize("0-306-40615-3"), None);
        assert_eq!(canonicalize("hello"), None);
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let once = canonicalize("0 306 40615 2").unwrap();
        assert_eq!(canonicalize(&once).unwrap(), once);
    }

    #[test]
    fn both_forms_of_one_book_collide() {
        assert_eq!(canonicalize(TEN), canonicalize(THIRTEEN));
    }

    #[test]
    fn trailing_x_check_digit_is_accepted() {
        // 0-9752298-0-X validates as ISBN-10
        assert!(canonicalize("0-9752298-0-X").is_some());
    }

    #[test]
    fn scan_finds_isbns_in_prose() {
        let text = format!(
            "First published 1978. ISBN {TEN}. \
             Library edition ISBN {THIRTEEN}."
        );
        let isbn = scan(&text).unwrap();
        assert_eq!(isbn.isbn_10.as_deref(), Some("0306406152"));
        assert_eq!(isbn.isbn_13, "9780306406157");
    }

    #[test]
    fn scan_ignores_invalid_candidates() {
        assert!(scan("call 555-123-4567 for details").is_none());
    }
}
