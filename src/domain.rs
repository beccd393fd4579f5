use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fixed crime-type taxonomy. The underscore spelling is also the sheet name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CrimeType {
    #[serde(rename = "UPI_Fraud")]
    UpiFraud,
    #[serde(rename = "Bank_Fraud")]
    BankFraud,
    #[serde(rename = "Social_Media")]
    SocialMedia,
    #[serde(rename = "Harassment")]
    Harassment,
    #[serde(rename = "Job_Scam")]
    JobScam,
    #[serde(rename = "Online_Shopping")]
    OnlineShopping,
    #[serde(rename = "OTP_Fraud")]
    OtpFraud,
    #[serde(rename = "Other")]
    Other,
}

impl CrimeType {
    /// Every bucket in sheet order, `Other` last.
    pub const ALL: [CrimeType; 8] = [
        CrimeType::UpiFraud,
        CrimeType::BankFraud,
        CrimeType::SocialMedia,
        CrimeType::Harassment,
        CrimeType::JobScam,
        CrimeType::OnlineShopping,
        CrimeType::OtpFraud,
        CrimeType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CrimeType::UpiFraud => "UPI_Fraud",
            CrimeType::BankFraud => "Bank_Fraud",
            CrimeType::SocialMedia => "Social_Media",
            CrimeType::Harassment => "Harassment",
            CrimeType::JobScam => "Job_Scam",
            CrimeType::OnlineShopping => "Online_Shopping",
            CrimeType::OtpFraud => "OTP_Fraud",
            CrimeType::Other => "Other",
        }
    }
}

impl fmt::Display for CrimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CrimeType {
    type Err = String;

    /// Accepts `UPI_Fraud`, `upi fraud`, `Upi-Fraud` and similar spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .trim()
            .chars()
            .map(|c| if c == ' ' || c == '-' { '_' } else { c.to_ascii_lowercase() })
            .collect();
        CrimeType::ALL
            .iter()
            .find(|ct| ct.as_str().to_ascii_lowercase() == key)
            .copied()
            .ok_or_else(|| format!("unknown crime type '{}'", s))
    }
}

/// Case status as recorded on the register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Status {
    #[default]
    #[serde(rename = "Registered")]
    Registered,
    #[serde(rename = "Under Enquiry")]
    UnderEnquiry,
    #[serde(rename = "FIR Filed")]
    FirFiled,
    #[serde(rename = "Closed")]
    Closed,
    #[serde(rename = "Pending")]
    Pending,
}

impl Status {
    pub const ALL: [Status; 5] = [
        Status::Registered,
        Status::UnderEnquiry,
        Status::FirFiled,
        Status::Closed,
        Status::Pending,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Registered => "Registered",
            Status::UnderEnquiry => "Under Enquiry",
            Status::FirFiled => "FIR Filed",
            Status::Closed => "Closed",
            Status::Pending => "Pending",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A complaint in canonical form, as stored on the master sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplaintRecord {
    /// Acknowledgement / complaint number, unique within the register
    pub id: String,
    pub complaint_date: Option<NaiveDate>,
    pub incident_date: Option<NaiveDate>,
    pub complainant_name: String,
    /// Exactly ten digits when present
    pub mobile: Option<String>,
    /// Lowercased
    pub email: Option<String>,
    pub district: String,
    pub police_station: String,
    pub crime_type: CrimeType,
    pub platform: String,
    /// Amount lost in rupees, never negative
    pub amount: f64,
    pub status: Status,
    pub description: String,
}

impl ComplaintRecord {
    /// An empty record carrying only an id; used as a base by the normalizer
    /// and by tests.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            complaint_date: None,
            incident_date: None,
            complainant_name: String::new(),
            mobile: None,
            email: None,
            district: String::new(),
            police_station: String::new(),
            crime_type: CrimeType::Other,
            platform: String::new(),
            amount: 0.0,
            status: Status::Registered,
            description: String::new(),
        }
    }
}
