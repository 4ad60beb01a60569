//! English stemmer (Porter2).
//!
//! Operates on lowercase ASCII. Words containing other characters, and
//! words of two letters or fewer, are returned unchanged.

const DOUBLES: [&[u8]; 9] = [b"bb", b"dd", b"ff", b"gg", b"mm", b"nn", b"pp", b"rr", b"tt"];

/// Stem `word`.
pub fn stem(word: &str) -> String {
    if word.len() <= 2 || !word.is_ascii() {
        return word.to_string();
    }
    if let Some(fixed) = exceptional_form(word) {
        return fixed.to_string();
    }

    let mut w: Vec<u8> = word.as_bytes().to_vec();
    if w[0] == b'\'' {
        w.remove(0);
    }
    mark_consonant_ys(&mut w);
    let r1 = region1(&w);
    let r2 = region_after(&w, r1);

    step0(&mut w);
    step1a(&mut w);
    if is_invariant_after_1a(&w) {
        return finish(w);
    }
    step1b(&mut w, r1);
    step1c(&mut w);
    step2(&mut w, r1);
    step3(&mut w, r1, r2);
    step4(&mut w, r2);
    step5(&mut w, r1, r2);
    finish(w)
}

// ==========================================================================
// Helpers
// ==========================================================================

fn is_vowel(b: u8) -> bool {
    matches!(b, b'a' | b'e' | b'i' | b'o' | b'u' | b'y')
}

fn contains_vowel(w: &[u8]) -> bool {
    w.iter().any(|&b| is_vowel(b))
}

/// `y` at the start or after a vowel acts as a consonant; mark it `Y`.
fn mark_consonant_ys(w: &mut [u8]) {
    if w[0] == b'y' {
        w[0] = b'Y';
    }
    for i in 1..w.len() {
        if w[i] == b'y' && is_vowel(w[i - 1]) {
            w[i] = b'Y';
        }
    }
}

fn region1(w: &[u8]) -> usize {
    for prefix in [b"gener".as_slice(), b"commun", b"arsen"] {
        if w.starts_with(prefix) {
            return prefix.len();
        }
    }
    region_after(w, 0)
}

/// Start of the region after the first non-vowel following a vowel, with the
/// vowel at or after `start`.
fn region_after(w: &[u8], start: usize) -> usize {
    (start + 1..w.len())
        .find(|&i| !is_vowel(w[i]) && is_vowel(w[i - 1]))
        .map_or(w.len(), |i| i + 1)
}

fn ends_short_syllable(w: &[u8]) -> bool {
    match w.len() {
        0 | 1 => false,
        2 => is_vowel(w[0]) && !is_vowel(w[1]),
        n => {
            !is_vowel(w[n - 3])
                && is_vowel(w[n - 2])
                && !is_vowel(w[n - 1])
                && !matches!(w[n - 1], b'w' | b'x' | b'Y')
        }
    }
}

fn is_short_word(w: &[u8], r1: usize) -> bool {
    r1 >= w.len() && ends_short_syllable(w)
}

/// The longest of `suffixes` that `w` ends with.
fn longest_suffix<'a>(w: &[u8], suffixes: &[&'a [u8]]) -> Option<&'a [u8]> {
    suffixes
        .iter()
        .filter(|suffix| w.ends_with(suffix))
        .max_by_key(|suffix| suffix.len())
        .copied()
}

fn replace_suffix(w: &mut Vec<u8>, suffix_len: usize, replacement: &[u8]) {
    w.truncate(w.len() - suffix_len);
    w.extend_from_slice(replacement);
}

fn finish(mut w: Vec<u8>) -> String {
    for b in &mut w {
        if *b == b'Y' {
            *b = b'y';
        }
    }
    String::from_utf8_lossy(&w).into_owned()
}

fn exceptional_form(word: &str) -> Option<&'static str> {
    Some(match word {
        "skis" => "ski",
        "skies" => "sky",
        "dying" => "die",
        "lying" => "lie",
        "tying" => "tie",
        "idly" => "idl",
        "gently" => "gentl",
        "ugly" => "ugli",
        "early" => "earli",
        "only" => "onli",
        "singly" => "singl",
        "sky" => "sky",
        "news" => "news",
        "howe" => "howe",
        "atlas" => "atlas",
        "cosmos" => "cosmos",
        "bias" => "bias",
        "andes" => "andes",
        _ => return None,
    })
}

fn is_invariant_after_1a(w: &[u8]) -> bool {
    matches!(
        w,
        b"inning" | b"outing" | b"canning" | b"herring" | b"earring" | b"proceed" | b"exceed" | b"succeed"
    )
}

// ==========================================================================
// Steps
// ==========================================================================

/// Step 0: possessive apostrophes.
fn step0(w: &mut Vec<u8>) {
    const SUFFIXES: [&[u8]; 3] = [b"'s'", b"'s", b"'"];
    if let Some(suffix) = longest_suffix(w, &SUFFIXES) {
        let len = suffix.len();
        w.truncate(w.len() - len);
    }
}

/// Step 1a: plurals.
fn step1a(w: &mut Vec<u8>) {
    const SUFFIXES: [&[u8]; 6] = [b"sses", b"ied", b"ies", b"us", b"ss", b"s"];
    let Some(suffix) = longest_suffix(w, &SUFFIXES) else {
        return;
    };
    match suffix {
        b"sses" => replace_suffix(w, 4, b"ss"),
        b"ied" | b"ies" => {
            if w.len() > 4 {
                replace_suffix(w, 3, b"i");
            } else {
                replace_suffix(w, 3, b"ie");
            }
        }
        b"s" => {
            if w.len() >= 2 && contains_vowel(&w[..w.len() - 2]) {
                w.pop();
            }
        }
        _ => {}
    }
}

/// Step 1b: past tenses and gerunds.
fn step1b(w: &mut Vec<u8>, r1: usize) {
    const SUFFIXES: [&[u8]; 6] = [b"eedly", b"ingly", b"edly", b"eed", b"ing", b"ed"];
    let Some(suffix) = longest_suffix(w, &SUFFIXES) else {
        return;
    };
    let start = w.len() - suffix.len();
    if suffix == b"eed" || suffix == b"eedly" {
        if start >= r1 {
            replace_suffix(w, suffix.len(), b"ee");
        }
        return;
    }
    if !contains_vowel(&w[..start]) {
        return;
    }
    w.truncate(start);
    if w.ends_with(b"at") || w.ends_with(b"bl") || w.ends_with(b"iz") {
        w.push(b'e');
    } else if DOUBLES.iter().any(|double| w.ends_with(double)) {
        w.pop();
    } else if is_short_word(w, r1) {
        w.push(b'e');
    }
}

/// Step 1c: final y to i after a consonant which is not the first letter.
fn step1c(w: &mut [u8]) {
    let n = w.len();
    if n > 2 && matches!(w[n - 1], b'y' | b'Y') && !is_vowel(w[n - 2]) {
        w[n - 1] = b'i';
    }
}

/// Step 2: double suffixes in R1.
fn step2(w: &mut Vec<u8>, r1: usize) {
    const RULES: [(&[u8], &[u8]); 24] = [
        (b"ization", b"ize"),
        (b"ational", b"ate"),
        (b"fulness", b"ful"),
        (b"ousness", b"ous"),
        (b"iveness", b"ive"),
        (b"tional", b"tion"),
        (b"biliti", b"ble"),
        (b"lessli", b"less"),
        (b"entli", b"ent"),
        (b"ation", b"ate"),
        (b"alism", b"al"),
        (b"aliti", b"al"),
        (b"ousli", b"ous"),
        (b"iviti", b"ive"),
        (b"fulli", b"ful"),
        (b"enci", b"ence"),
        (b"anci", b"ance"),
        (b"abli", b"able"),
        (b"izer", b"ize"),
        (b"ator", b"ate"),
        (b"alli", b"al"),
        (b"bli", b"ble"),
        (b"ogi", b"og"),
        (b"li", b""),
    ];
    let Some(&(suffix, replacement)) = RULES.iter().find(|(suffix, _)| w.ends_with(suffix)) else {
        return;
    };
    let start = w.len() - suffix.len();
    if start < r1 {
        return;
    }
    let allowed = match suffix {
        b"ogi" => start > 0 && w[start - 1] == b'l',
        b"li" => start > 0 && matches!(w[start - 1], b'c' | b'd' | b'e' | b'g' | b'h' | b'k' | b'm' | b'n' | b'r' | b't'),
        _ => true,
    };
    if allowed {
        replace_suffix(w, suffix.len(), replacement);
    }
}

/// Step 3: derivational suffixes in R1.
fn step3(w: &mut Vec<u8>, r1: usize, r2: usize) {
    const RULES: [(&[u8], &[u8]); 9] = [
        (b"ational", b"ate"),
        (b"tional", b"tion"),
        (b"alize", b"al"),
        (b"icate", b"ic"),
        (b"iciti", b"ic"),
        (b"ative", b""),
        (b"ical", b"ic"),
        (b"ness", b""),
        (b"ful", b""),
    ];
    let Some(&(suffix, replacement)) = RULES.iter().find(|(suffix, _)| w.ends_with(suffix)) else {
        return;
    };
    let start = w.len() - suffix.len();
    if start < r1 || (suffix == b"ative" && start < r2) {
        return;
    }
    replace_suffix(w, suffix.len(), replacement);
}

/// Step 4: suffixes removed when in R2.
fn step4(w: &mut Vec<u8>, r2: usize) {
    const SUFFIXES: [&[u8]; 18] = [
        b"ement", b"able", b"ance", b"ence", b"ible", b"ment", b"ant", b"ate", b"ent", b"ion",
        b"ism", b"iti", b"ive", b"ize", b"ous", b"al", b"er", b"ic",
    ];
    let Some(suffix) = longest_suffix(w, &SUFFIXES) else {
        return;
    };
    let start = w.len() - suffix.len();
    if start < r2 {
        return;
    }
    if suffix == b"ion" && !(start > 0 && matches!(w[start - 1], b's' | b't')) {
        return;
    }
    w.truncate(start);
}

/// Step 5: final e and double l.
fn step5(w: &mut Vec<u8>, r1: usize, r2: usize) {
    let n = w.len();
    match w.last() {
        Some(b'e') => {
            let start = n - 1;
            if start >= r2 || (start >= r1 && !ends_short_syllable(&w[..start])) {
                w.pop();
            }
        }
        Some(b'l') => {
            let start = n - 1;
            if start >= r2 && n >= 2 && w[n - 2] == b'l' {
                w.pop();
            }
        }
        _ => {}
    }
}

// ==========================================================================
// Tests
// ==========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regions() {
        assert_eq!(region1(b"beautiful"), 5);
        assert_eq!(region_after(b"beautiful", 5), 7);
        assert_eq!(region1(b"generous"), 5);
        assert_eq!(region1(b"sky"), 3);
    }

    #[test]
    fn test_plurals() {
        assert_eq!(stem("caresses"), "caress");
        assert_eq!(stem("ties"), "tie");
        assert_eq!(stem("cries"), "cri");
        assert_eq!(stem("gaps"), "gap");
        assert_eq!(stem("gas"), "gas");
        assert_eq!(stem("was"), "was");
        assert_eq!(stem("questions"), "question");
    }

    #[test]
    fn test_past_and_gerund() {
        assert_eq!(stem("hoped"), "hope");
        assert_eq!(stem("hopping"), "hop");
        assert_eq!(stem("running"), "run");
        assert_eq!(stem("kneeling"), "kneel");
        assert_eq!(stem("consigned"), "consign");
        assert_eq!(stem("consigning"), "consign");
    }

    #[test]
    fn test_derivational() {
        assert_eq!(stem("happy"), "happi");
        assert_eq!(stem("knightly"), "knight");
        assert_eq!(stem("generously"), "generous");
        assert_eq!(stem("consignment"), "consign");
        assert_eq!(stem("outside"), "outsid");
    }

    #[test]
    fn test_exceptions_and_untouched() {
        assert_eq!(stem("skies"), "sky");
        assert_eq!(stem("dying"), "die");
        assert_eq!(stem("news"), "news");
        assert_eq!(stem("is"), "is");
        assert_eq!(stem("tést"), "tést");
    }
}
