//! Text folding and natural collation for names and paths.
//!
//! Matching and sorting both work on a folded form of the text: lowercase,
//! Latin diacritics stripped, and optionally punctuation and whitespace
//! removed. Sorting then compares digit runs numerically so `file2` sorts
//! before `file10`.

use std::borrow::Cow;
use std::cmp::Ordering;

/// Which aspects of a string are folded away before comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Folding {
    pub case: bool,
    pub diacritics: bool,
    pub punctuation: bool,
    pub whitespace: bool,
}

impl Folding {
    /// Folding used by the name and path indices
    pub const SORT: Folding = Folding {
        case: true,
        diacritics: true,
        punctuation: false,
        whitespace: false,
    };

    pub fn is_identity(&self) -> bool {
        !(self.case || self.diacritics || self.punctuation || self.whitespace)
    }
}

const DIACRITICS: &[(&str, char)] = &[
    ("ÀÁÂÃÄÅĀĂĄ", 'A'),
    ("àáâãäåāăą", 'a'),
    ("ÇĆĈĊČ", 'C'),
    ("çćĉċč", 'c'),
    ("ĎĐ", 'D'),
    ("ďđ", 'd'),
    ("ÈÉÊËĒĔĖĘĚ", 'E'),
    ("èéêëēĕėęě", 'e'),
    ("ĜĞĠĢ", 'G'),
    ("ĝğġģ", 'g'),
    ("ĤĦ", 'H'),
    ("ĥħ", 'h'),
    ("ÌÍÎÏĨĪĬĮİ", 'I'),
    ("ìíîïĩīĭįı", 'i'),
    ("Ĵ", 'J'),
    ("ĵ", 'j'),
    ("Ķ", 'K'),
    ("ķ", 'k'),
    ("ĹĻĽĿŁ", 'L'),
    ("ĺļľŀł", 'l'),
    ("ÑŃŅŇ", 'N'),
    ("ñńņň", 'n'),
    ("ÒÓÔÕÖØŌŎŐ", 'O'),
    ("òóôõöøōŏő", 'o'),
    ("ŔŖŘ", 'R'),
    ("ŕŗř", 'r'),
    ("ŚŜŞŠ", 'S'),
    ("śŝşš", 's'),
    ("ŢŤŦ", 'T'),
    ("ţťŧ", 't'),
    ("ÙÚÛÜŨŪŬŮŰŲ", 'U'),
    ("ùúûüũūŭůűų", 'u'),
    ("Ŵ", 'W'),
    ("ŵ", 'w'),
    ("ÝŸŶ", 'Y'),
    ("ýÿŷ", 'y'),
    ("ŹŻŽ", 'Z'),
    ("źżž", 'z'),
];

/// Map an accented Latin letter to its base letter
pub fn strip_diacritic(c: char) -> char {
    if c.is_ascii() {
        return c;
    }
    DIACRITICS
        .iter()
        .find(|(set, _)| set.contains(c))
        .map(|&(_, base)| base)
        .unwrap_or(c)
}

/// Punctuation as ignored by `ignore_punctuation`
pub fn is_punctuation(c: char) -> bool {
    c.is_ascii_punctuation()
        || matches!(
            c,
            '\u{2010}'..='\u{2027}' | '\u{00A1}' | '\u{00AB}' | '\u{00BB}' | '\u{00BF}'
        )
}

/// Characters that make up a word for whole-word, prefix and suffix anchoring
pub fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Fold a string, borrowing when nothing changes
pub fn fold(s: &str, folding: Folding) -> Cow<'_, str> {
    if folding.is_identity() {
        return Cow::Borrowed(s);
    }

    // ASCII fast path: only case can change
    if s.is_ascii() && !folding.punctuation && !folding.whitespace {
        if !folding.case || !s.bytes().any(|b| b.is_ascii_uppercase()) {
            return Cow::Borrowed(s);
        }
        return Cow::Owned(s.to_ascii_lowercase());
    }

    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if folding.whitespace && c.is_whitespace() {
            continue;
        }
        if folding.punctuation && is_punctuation(c) {
            continue;
        }
        let c = if folding.diacritics { strip_diacritic(c) } else { c };
        if folding.case {
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    Cow::Owned(out)
}

/// Compare two already-folded strings, digit runs by numeric value.
///
/// Runs that differ only in leading zeros compare equal; callers break such
/// ties on entry id.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    let (mut i, mut j) = (0, 0);

    while i < a.len() && j < b.len() {
        if a[i].is_ascii_digit() && b[j].is_ascii_digit() {
            let (si, sj) = (i, j);
            while i < a.len() && a[i].is_ascii_digit() {
                i += 1;
            }
            while j < b.len() && b[j].is_ascii_digit() {
                j += 1;
            }
            let na = trim_zeros(&a[si..i]);
            let nb = trim_zeros(&b[sj..j]);
            let ord = na.len().cmp(&nb.len()).then_with(|| na.cmp(nb));
            if ord != Ordering::Equal {
                return ord;
            }
            continue;
        }

        // Byte order equals code point order for UTF-8
        match a[i].cmp(&b[j]) {
            Ordering::Equal => {
                i += 1;
                j += 1;
            }
            ord => return ord,
        }
    }

    (a.len() - i).cmp(&(b.len() - j))
}

fn trim_zeros(digits: &[u8]) -> &[u8] {
    let start = digits.iter().position(|&d| d != b'0').unwrap_or(digits.len());
    &digits[start..]
}
