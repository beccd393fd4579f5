use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{ComplaintRecord, CrimeType};
use crate::error::{RegisterError, Result};

/// One row of the crime-type keyword table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub crime_type: CrimeType,
    pub keywords: Vec<String>,
}

/// One row of the platform keyword table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformRule {
    pub name: String,
    pub keywords: Vec<String>,
}

fn rule<T>(key: T, keywords: &[&str]) -> (T, Vec<String>) {
    (key, keywords.iter().map(|k| k.to_string()).collect())
}

pub fn default_category_rules() -> Vec<CategoryRule> {
    [
        rule(CrimeType::UpiFraud, &["upi", "unified payment", "phonepe", "google pay", "gpay", "paytm", "bhim"]),
        rule(CrimeType::BankFraud, &["bank", "account", "cheque", "loan", "credit card", "debit card", "netbanking"]),
        rule(CrimeType::SocialMedia, &["facebook", "instagram", "whatsapp", "telegram", "social media", "twitter"]),
        rule(CrimeType::Harassment, &["harassment", "threat", "abuse", "stalking", "cyberbullying", "blackmail"]),
        rule(CrimeType::JobScam, &["job", "employment", "work from home", "recruitment", "interview"]),
        rule(CrimeType::OnlineShopping, &["amazon", "flipkart", "online shopping", "e-commerce", "order"]),
        rule(CrimeType::OtpFraud, &["otp", "one time password", "verification code"]),
    ]
    .into_iter()
    .map(|(crime_type, keywords)| CategoryRule { crime_type, keywords })
    .collect()
}

pub fn default_platform_rules() -> Vec<PlatformRule> {
    [
        rule("UPI", &["upi", "phonepe", "google pay", "gpay", "paytm", "bhim"]),
        rule("Bank", &["bank", "account", "sbi", "hdfc", "icici", "axis"]),
        rule("Card", &["card", "credit card", "debit card", "atm"]),
        rule("Social Media", &["facebook", "instagram", "whatsapp", "telegram", "twitter"]),
        rule("OTP", &["otp", "sms", "verification"]),
        rule("Email", &["email", "gmail", "yahoo", "outlook"]),
    ]
    .into_iter()
    .map(|(name, keywords)| PlatformRule { name: name.to_string(), keywords })
    .collect()
}

/// `(?i)\b(?:kw1|kw2|...)\b` over the escaped keywords.
fn keyword_pattern(keywords: &[String]) -> Result<Regex> {
    let alternation = keywords
        .iter()
        .map(|k| regex::escape(k.trim()))
        .collect::<Vec<_>>()
        .join("|");
    RegexBuilder::new(&format!(r"\b(?:{})\b", alternation))
        .case_insensitive(true)
        .build()
        .map_err(|e| RegisterError::Config(format!("invalid keyword table: {}", e)))
}

/// Keyword classifier for crime type and platform. Tables are scanned in
/// order and the first matching row wins.
#[derive(Debug, Clone)]
pub struct Categorizer {
    categories: Vec<(CrimeType, Regex)>,
    platforms: Vec<(String, Regex)>,
}

impl Categorizer {
    pub fn new(categories: &[CategoryRule], platforms: &[PlatformRule]) -> Result<Self> {
        let categories = categories
            .iter()
            .map(|c| Ok((c.crime_type, keyword_pattern(&c.keywords)?)))
            .collect::<Result<Vec<_>>>()?;
        let platforms = platforms
            .iter()
            .map(|p| Ok((p.name.clone(), keyword_pattern(&p.keywords)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { categories, platforms })
    }

    pub fn categorize(&self, text: &str) -> CrimeType {
        self.categories
            .iter()
            .find(|(_, pattern)| pattern.is_match(text))
            .map(|(crime_type, _)| *crime_type)
            .unwrap_or(CrimeType::Other)
    }

    /// Platform named by the first matching row, if any.
    pub fn infer_platform(&self, text: &str) -> Option<&str> {
        let found = self
            .platforms
            .iter()
            .find(|(_, pattern)| pattern.is_match(text))
            .map(|(name, _)| name.as_str());
        debug!("Inferred platform {:?}", found);
        found
    }
}

impl Default for Categorizer {
    fn default() -> Self {
        let categories = default_category_rules();
        let platforms = default_platform_rules();
        Self {
            categories: categories
                .iter()
                .filter_map(|c| keyword_pattern(&c.keywords).ok().map(|re| (c.crime_type, re)))
                .collect(),
            platforms: platforms
                .iter()
                .filter_map(|p| keyword_pattern(&p.keywords).ok().map(|re| (p.name.clone(), re)))
                .collect(),
        }
    }
}

/// Records grouped by crime type, in taxonomy order, empty buckets omitted.
pub fn split_by_category(records: &[ComplaintRecord]) -> Vec<(CrimeType, Vec<&ComplaintRecord>)> {
    CrimeType::ALL
        .iter()
        .map(|ct| (*ct, records.iter().filter(|r| r.crime_type == *ct).collect::<Vec<_>>()))
        .filter(|(_, members)| !members.is_empty())
        .collect()
}

/// Records with `amount >= threshold`, largest first. Ties keep register order.
pub fn high_value(records: &[ComplaintRecord], threshold: f64) -> Vec<&ComplaintRecord> {
    let mut selected: Vec<&ComplaintRecord> = records.iter().filter(|r| r.amount >= threshold).collect();
    selected.sort_by(|a, b| b.amount.total_cmp(&a.amount));
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, crime_type: CrimeType, amount: f64) -> ComplaintRecord {
        ComplaintRecord {
            crime_type,
            amount,
            ..ComplaintRecord::with_id(id)
        }
    }

    #[test]
    fn upi_transfer_is_upi_fraud() {
        let categorizer = Categorizer::default();
        assert_eq!(
            categorizer.categorize("I transferred 5000 through UPI to an unknown person"),
            CrimeType::UpiFraud
        );
    }

    #[test]
    fn no_keyword_is_other() {
        let categorizer = Categorizer::default();
        assert_eq!(categorizer.categorize("Lost my wallet near the station"), CrimeType::Other);
    }

    #[test]
    fn keywords_match_whole_words_only() {
        let categorizer = Categorizer::default();
        // "jobless" must not trigger the job keyword, "recorder" not "order".
        assert_eq!(categorizer.categorize("jobless recorder"), CrimeType::Other);
        assert_eq!(categorizer.categorize("Fake JOB offer"), CrimeType::JobScam);
    }

    #[test]
    fn first_matching_row_wins() {
        let categorizer = Categorizer::default();
        // Mentions both UPI and a bank account; UPI is earlier in the table.
        assert_eq!(
            categorizer.categorize("money moved from bank account via PhonePe upi"),
            CrimeType::UpiFraud
        );
    }

    #[test]
    fn custom_tables_replace_defaults() {
        let categorizer = Categorizer::new(
            &[CategoryRule { crime_type: CrimeType::Harassment, keywords: vec!["troll".into()] }],
            &[PlatformRule { name: "Forum".into(), keywords: vec!["reddit".into()] }],
        )
        .unwrap();
        assert_eq!(categorizer.categorize("a troll account"), CrimeType::Harassment);
        assert_eq!(categorizer.infer_platform("posted on Reddit"), Some("Forum"));
        assert_eq!(categorizer.infer_platform("posted on a wall"), None);
    }

    #[test]
    fn platform_inferred_from_text() {
        let categorizer = Categorizer::default();
        assert_eq!(categorizer.infer_platform("shared OTP over SMS"), Some("OTP"));
        assert_eq!(categorizer.infer_platform("paid via Google Pay"), Some("UPI"));
    }

    #[test]
    fn split_follows_taxonomy_order() {
        let records = vec![
            record("A", CrimeType::Other, 10.0),
            record("B", CrimeType::UpiFraud, 20.0),
            record("C", CrimeType::Other, 30.0),
        ];
        let split = split_by_category(&records);
        assert_eq!(split.len(), 2);
        assert_eq!(split[0].0, CrimeType::UpiFraud);
        assert_eq!(split[1].0, CrimeType::Other);
        assert_eq!(split[1].1.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), vec!["A", "C"]);
    }

    #[test]
    fn high_value_sorted_descending_and_stable() {
        let records = vec![
            record("A", CrimeType::Other, 60_000.0),
            record("B", CrimeType::Other, 49_999.0),
            record("C", CrimeType::Other, 75_000.0),
            record("D", CrimeType::Other, 60_000.0),
            record("E", CrimeType::Other, 50_000.0),
        ];
        let ids: Vec<&str> = high_value(&records, 50_000.0).iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["C", "A", "D", "E"]);
    }
}
