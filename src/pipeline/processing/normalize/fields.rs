//! Field-level cleaning rules. Each function is total: a value that cannot be
//! interpreted comes back as `None` and the caller records a warning.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::Status;
use crate::pipeline::processing::parser::excel::excel_serial_to_date;
use crate::pipeline::processing::parser::RawValue;

#[derive(Clone, Copy)]
enum YearShape {
    Leading4,
    Trailing4,
    Trailing2,
}

const DATE_FORMATS: &[(&str, YearShape)] = &[
    ("%Y-%m-%d", YearShape::Leading4),
    ("%Y/%m/%d", YearShape::Leading4),
    ("%d-%m-%Y", YearShape::Trailing4),
    ("%d/%m/%Y", YearShape::Trailing4),
    ("%d.%m.%Y", YearShape::Trailing4),
    ("%d %b %Y", YearShape::Trailing4),
    ("%d %B %Y", YearShape::Trailing4),
    ("%d-%b-%Y", YearShape::Trailing4),
    ("%d-%m-%y", YearShape::Trailing2),
    ("%d/%m/%y", YearShape::Trailing2),
];

static TRAILING_TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(.+?)[ T]\d{1,2}:\d{2}(?::\d{2}(?:\.\d+)?)?\s*(?:am|pm|z)?$").unwrap());

static FIRST_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"-?\d+(?:\.\d+)?").unwrap());

static CURRENCY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)₹|\brs\b\.?|\binr\b|/-").unwrap());

fn digit_run(chars: impl Iterator<Item = char>) -> usize {
    chars.take_while(|c| c.is_ascii_digit()).count()
}

fn parse_date_text(s: &str) -> Option<NaiveDate> {
    let leading = digit_run(s.chars());
    let trailing = digit_run(s.chars().rev());
    DATE_FORMATS
        .iter()
        .filter(|(_, shape)| match shape {
            YearShape::Leading4 => leading == 4,
            YearShape::Trailing4 => trailing == 4,
            YearShape::Trailing2 => trailing == 2,
        })
        .find_map(|(fmt, _)| NaiveDate::parse_from_str(s, fmt).ok())
}

/// Parse a date in any of the accepted day-first or ISO shapes, with an
/// optional trailing time. Spreadsheet serial numbers are accepted too.
pub fn parse_date(value: &RawValue) -> Option<NaiveDate> {
    match value {
        RawValue::Number(n) if (1.0..=2_958_465.0).contains(n) => excel_serial_to_date(*n),
        RawValue::Number(_) => None,
        RawValue::Text(text) => {
            let s = collapse_whitespace(text);
            if s.is_empty() {
                return None;
            }
            parse_date_text(&s).or_else(|| {
                TRAILING_TIME
                    .captures(&s)
                    .and_then(|caps| parse_date_text(caps[1].trim()))
            })
        }
    }
}

/// Keep digits only; numbers with a country or trunk prefix are cut to the
/// last ten digits. Anything shorter is rejected.
pub fn normalize_mobile(value: &RawValue) -> Option<String> {
    let digits: String = value.as_text().chars().filter(char::is_ascii_digit).collect();
    if digits.len() < 10 {
        return None;
    }
    Some(digits[digits.len() - 10..].to_string())
}

pub fn normalize_email(value: &str) -> Option<String> {
    let email = value.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !email.contains(char::is_whitespace) => {
            Some(email)
        }
        _ => None,
    }
}

/// First number in the value after currency markers and thousands separators
/// are removed. Losses are never negative.
pub fn parse_amount(value: &RawValue) -> Option<f64> {
    match value {
        RawValue::Number(n) if n.is_finite() => Some(n.abs()),
        RawValue::Number(_) => None,
        RawValue::Text(text) => {
            let cleaned = CURRENCY.replace_all(text, " ").replace(',', "");
            FIRST_NUMBER
                .find(&cleaned)
                .and_then(|m| m.as_str().parse::<f64>().ok())
                .filter(|n| n.is_finite())
                .map(f64::abs)
        }
    }
}

pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Upper-case the first letter of every alphabetic run and lower-case the
/// rest, so `o'BRIEN` becomes `O'Brien`.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_word = false;
    for c in collapse_whitespace(s).chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}

/// Map free-text status onto the fixed set. Returns `None` when nothing
/// matches so the caller can fall back to `Registered` and warn.
pub fn normalize_status(value: &str) -> Option<Status> {
    let lower = collapse_whitespace(value).to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let has = |w: &str| words.contains(&w);

    if has("fir") {
        Some(Status::FirFiled)
    } else if lower.contains("enquiry") || lower.contains("inquiry") || lower.contains("investigat") {
        Some(Status::UnderEnquiry)
    } else if has("closed") || has("resolved") || has("disposed") {
        Some(Status::Closed)
    } else if has("pending") || has("awaiting") || has("open") {
        Some(Status::Pending)
    } else if has("registered") || has("new") || has("received") || has("submitted") {
        Some(Status::Registered)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> RawValue {
        RawValue::Text(s.to_string())
    }

    #[test]
    fn dates_in_accepted_shapes() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 12);
        for s in [
            "2024-03-12",
            "2024/03/12",
            "12-03-2024",
            "12/03/2024",
            "12.03.2024",
            "12-03-24",
            "12/03/24",
            "12 Mar 2024",
            "12 March 2024",
            "2024-03-12 14:30:00",
            "12/03/2024 2:30 PM",
        ] {
            assert_eq!(parse_date(&text(s)), expected, "{}", s);
        }
        assert_eq!(parse_date(&RawValue::Number(45363.0)), expected);
    }

    #[test]
    fn bad_dates_are_none() {
        assert_eq!(parse_date(&text("yesterday")), None);
        assert_eq!(parse_date(&text("31-02-2024")), None);
        assert_eq!(parse_date(&text("")), None);
    }

    #[test]
    fn mobile_keeps_last_ten_digits() {
        assert_eq!(normalize_mobile(&text("+91 98765-43210")).as_deref(), Some("9876543210"));
        assert_eq!(normalize_mobile(&text("09876543210")).as_deref(), Some("9876543210"));
        assert_eq!(normalize_mobile(&RawValue::Number(9876543210.0)).as_deref(), Some("9876543210"));
        assert_eq!(normalize_mobile(&text("12345")), None);
    }

    #[test]
    fn email_is_lowercased_and_checked() {
        assert_eq!(normalize_email("  Asha@Example.COM ").as_deref(), Some("asha@example.com"));
        assert_eq!(normalize_email("not-an-email"), None);
        assert_eq!(normalize_email("@example.com"), None);
    }

    #[test]
    fn amounts_strip_currency_and_separators() {
        assert_eq!(parse_amount(&text("₹75,000")), Some(75_000.0));
        assert_eq!(parse_amount(&text("Rs. 1,50,000/-")), Some(150_000.0));
        assert_eq!(parse_amount(&text("INR 2500.50")), Some(2500.5));
        assert_eq!(parse_amount(&text("-500")), Some(500.0));
        assert_eq!(parse_amount(&RawValue::Number(-12.0)), Some(12.0));
        assert_eq!(parse_amount(&text("unknown")), None);
    }

    #[test]
    fn title_case_matches_word_starts() {
        assert_eq!(title_case("  ravi   KUMAR "), "Ravi Kumar");
        assert_eq!(title_case("o'brien"), "O'Brien");
        assert_eq!(title_case("navi mumbai-east"), "Navi Mumbai-East");
    }

    #[test]
    fn status_synonyms() {
        assert_eq!(normalize_status("FIR Registered"), Some(Status::FirFiled));
        assert_eq!(normalize_status("under inquiry"), Some(Status::UnderEnquiry));
        assert_eq!(normalize_status("Resolved"), Some(Status::Closed));
        assert_eq!(normalize_status("pending"), Some(Status::Pending));
        assert_eq!(normalize_status("Registered"), Some(Status::Registered));
        assert_eq!(normalize_status("escalated"), None);
    }
}
