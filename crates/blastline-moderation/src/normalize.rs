//! Deterministic text normalization, stage one of the gate.
//!
//! Lowercases, undoes the common digit/symbol-for-letter obfuscations and
//! strips zero-width characters so `c0c@ine` and `cocaine` classify the
//! same. Substitution only applies next to letters: standalone numbers
//! (amounts, phone numbers) pass through untouched so the banking-notice
//! heuristics still see them.

/// Zero-width and joiner characters used to split words invisibly.
const ZERO_WIDTH: [char; 5] = ['\u{200b}', '\u{200c}', '\u{200d}', '\u{feff}', '\u{2060}'];

/// Normalize a message body for classification.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();

    // Drop zero-width characters, fold exotic spaces to ASCII space.
    let cleaned: Vec<char> = lowered
        .chars()
        .filter(|c| !ZERO_WIDTH.contains(c))
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .collect();

    // Undo letter-shaped substitutions when flanked by letters. The
    // previous-char check runs against the already-substituted output so
    // runs like "fr33" resolve fully.
    let mut deobfuscated = String::with_capacity(cleaned.len());
    for (i, &c) in cleaned.iter().enumerate() {
        let prev_alpha = deobfuscated.chars().last().is_some_and(|p| p.is_alphabetic());
        let next_alpha = cleaned.get(i + 1).is_some_and(|n| n.is_alphabetic());
        let replacement = if prev_alpha || next_alpha {
            substitution(c)
        } else {
            None
        };
        deobfuscated.push(replacement.unwrap_or(c));
    }

    // Collapse whitespace runs.
    let mut out = String::with_capacity(deobfuscated.len());
    let mut last_space = true;
    for c in deobfuscated.chars() {
        if c == ' ' {
            if !last_space {
                out.push(' ');
            }
            last_space = true;
        } else {
            out.push(c);
            last_space = false;
        }
    }
    out.trim_end().to_string()
}

fn substitution(c: char) -> Option<char> {
    match c {
        '0' => Some('o'),
        '1' => Some('i'),
        '3' => Some('e'),
        '4' => Some('a'),
        '5' => Some('s'),
        '7' => Some('t'),
        '@' => Some('a'),
        '$' => Some('s'),
        '€' => Some('e'),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercase_and_whitespace() {
        assert_eq!(normalize("Hello   WORLD \t now"), "hello world now");
    }

    #[test]
    fn test_deobfuscation_inside_words() {
        assert_eq!(normalize("c0c@ine f0r $ale"), "cocaine for sale");
        assert_eq!(normalize("fr33 m0ney"), "free money");
        assert_eq!(normalize("W4tch 0ut"), "watch out");
    }

    #[test]
    fn test_standalone_numbers_untouched() {
        assert_eq!(
            normalize("Your loan of 500,000 was approved"),
            "your loan of 500,000 was approved"
        );
        assert_eq!(normalize("call +123456"), "call +123456");
    }

    #[test]
    fn test_zero_width_stripped() {
        assert_eq!(normalize("co\u{200b}ca\u{200c}ine"), "cocaine");
        assert_eq!(normalize("\u{feff}hi\u{2060} there"), "hi there");
    }

    #[test]
    fn test_deterministic() {
        let input = "W4tch 0ut, FR33 c@sh!";
        assert_eq!(normalize(input), normalize(input));
    }
}
