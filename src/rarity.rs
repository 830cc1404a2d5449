use once_cell::sync::Lazy;
use regex::Regex;

// e.g. "12.5%"
static PCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+(?:\.\d+)?)%$").unwrap());
// e.g. "2 x 1 / 128" or "2x1/128"
static MULT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+(?:\.\d+)?)\s*[xX]\s*(\d+(?:\.\d+)?)\s*/\s*(\d+(?:\.\d+)?)$").unwrap()
});
// e.g. "1/128"
static FRAC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+(?:\.\d+)?)\s*/\s*(\d+(?:\.\d+)?)$").unwrap());
// trailing parenthetical note, e.g. "1/128 (without ring)"
static TRAILING_PAREN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\([^)]*\)$").unwrap());
// "1 in 128" reads as a fraction
static IN_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bin\b").unwrap());
// bracketed annotations like "[confirmation needed]"
static BRACKETS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[^\]]*\]").unwrap());
// "a – b" ranges; plain hyphen, en dash or em dash
static RANGE_SEP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*[\u{2013}\u{2014}-]\s*").unwrap());
// segments separated by ";" or ", " (comma without a space is a thousands separator)
static SEGMENT_SEP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*;\s*|,\s+").unwrap());
// first one-over term of a normalized string
static ONE_OVER: Lazy<Regex> = Lazy::new(|| Regex::new(r"1/(\d+(?:\.\d+)?)").unwrap());

/// Convert a raw rarity string like "2/128", "1 in 128", "12.5%" or a range
/// into normalized one-over form, e.g. "1/64" or "1/128–1/64". Segments
/// separated by ";" or ", " are normalized independently and rejoined.
/// Unparseable text passes through cleaned but otherwise unchanged.
pub fn normalize(raw: &str) -> String {
    SEGMENT_SEP
        .split(raw)
        .map(normalize_segment)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Numeric sort key for a raw rarity: the denominator of the first "1/N"
/// term of the normalized form, 0 for "Always", +infinity for anything the
/// grammar cannot parse (so unknowns sort as rarest).
pub fn sort_key(raw: &str) -> f64 {
    let one_over = normalize(raw);
    if one_over.is_empty() {
        return f64::INFINITY;
    }

    if let Some(caps) = ONE_OVER.captures(&one_over) {
        return caps[1].parse::<f64>().unwrap_or(f64::INFINITY);
    }

    if one_over.eq_ignore_ascii_case("always") {
        return 0.0;
    }

    f64::INFINITY
}

fn normalize_segment(raw: &str) -> String {
    let cleaned = BRACKETS.replace_all(raw, "");
    let cleaned = cleaned
        .replace('\u{00d7}', "x")
        .replace(',', "")
        .replace('\u{2248}', "")
        .replace('~', "");
    let cleaned = TRAILING_PAREN.replace_all(&cleaned, "");
    let cleaned = IN_WORD.replace_all(&cleaned, "/");
    let cleaned = cleaned.trim();

    let parts: Vec<&str> = RANGE_SEP.split(cleaned).collect();
    if parts.len() > 1 {
        return parts
            .into_iter()
            .map(simplify_single)
            .collect::<Vec<_>>()
            .join("\u{2013}");
    }

    simplify_single(cleaned)
}

fn simplify_single(s: &str) -> String {
    if s.is_empty() {
        return String::new();
    }

    if let Some(caps) = PCT.captures(s) {
        let pct = parse_f64(&caps[1]);
        if pct == 0.0 {
            return "0".to_string();
        }
        return format_one_over(100.0 / pct);
    }

    if let Some(caps) = MULT.captures(s) {
        let factor = parse_f64(&caps[1]);
        let a = parse_f64(&caps[2]);
        let b = parse_f64(&caps[3]);
        if factor != 0.0 && a != 0.0 {
            return format_one_over(b / (a * factor));
        }
    }

    if let Some(caps) = FRAC.captures(s) {
        let a = parse_f64(&caps[1]);
        let b = parse_f64(&caps[2]);
        if a != 0.0 {
            return format_one_over(b / a);
        }
    }

    // literals like "Always" fall through cleaned
    s.to_string()
}

fn parse_f64(s: &str) -> f64 {
    s.parse().unwrap_or(f64::NAN)
}

fn format_one_over(val: f64) -> String {
    if !val.is_finite() {
        return String::new();
    }
    if (val - val.round()).abs() < 0.01 {
        format!("1/{}", val.round() as i64)
    } else {
        format!("1/{:.2}", val)
    }
}
