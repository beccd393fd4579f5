/// Sheet and column names used on the register workbook.
/// Keep these in one place so the reader and the writer agree.

// Sheet names
pub const MASTER_SHEET: &str = "Master_Sheet";
pub const HIGH_VALUE_SHEET: &str = "High_Value_Cases";
pub const DUPLICATES_SHEET: &str = "Possible_Duplicates";

// Column names
pub const COL_ID: &str = "id";
pub const COL_COMPLAINT_DATE: &str = "complaint_date";
pub const COL_INCIDENT_DATE: &str = "incident_date";
pub const COL_NAME: &str = "complainant_name";
pub const COL_MOBILE: &str = "mobile";
pub const COL_EMAIL: &str = "email";
pub const COL_DISTRICT: &str = "district";
pub const COL_POLICE_STATION: &str = "police_station";
pub const COL_CRIME_TYPE: &str = "crime_type";
pub const COL_PLATFORM: &str = "platform";
pub const COL_AMOUNT: &str = "amount";
pub const COL_STATUS: &str = "status";
pub const COL_DESCRIPTION: &str = "description";
pub const COL_GROUP_ID: &str = "duplicate_group_id";
pub const COL_MATCH_REASON: &str = "match_reason";
pub const COL_GROUP_SIZE: &str = "group_size";

pub const MASTER_COLUMNS: &[&str] = &[
    COL_ID,
    COL_COMPLAINT_DATE,
    COL_INCIDENT_DATE,
    COL_NAME,
    COL_MOBILE,
    COL_EMAIL,
    COL_DISTRICT,
    COL_POLICE_STATION,
    COL_CRIME_TYPE,
    COL_PLATFORM,
    COL_AMOUNT,
    COL_STATUS,
    COL_DESCRIPTION,
];

pub const CATEGORY_COLUMNS: &[&str] = &[
    COL_ID,
    COL_COMPLAINT_DATE,
    COL_NAME,
    COL_MOBILE,
    COL_EMAIL,
    COL_DISTRICT,
    COL_AMOUNT,
    COL_STATUS,
];

pub const HIGH_VALUE_COLUMNS: &[&str] = &[
    COL_ID,
    COL_COMPLAINT_DATE,
    COL_NAME,
    COL_MOBILE,
    COL_EMAIL,
    COL_DISTRICT,
    COL_CRIME_TYPE,
    COL_PLATFORM,
    COL_AMOUNT,
    COL_STATUS,
];

pub const DUPLICATE_COLUMNS: &[&str] = &[
    COL_GROUP_ID,
    COL_ID,
    COL_COMPLAINT_DATE,
    COL_NAME,
    COL_MOBILE,
    COL_EMAIL,
    COL_AMOUNT,
    COL_CRIME_TYPE,
    COL_PLATFORM,
    COL_STATUS,
    COL_MATCH_REASON,
    COL_GROUP_SIZE,
];

/// Excel caps sheet names at 31 characters.
pub const MAX_SHEET_NAME_LEN: usize = 31;

/// Upper bound for auto-sized column widths.
pub const MAX_COLUMN_WIDTH: usize = 50;

// Id prefixes for generated identifiers
pub const UPLOAD_ID_PREFIX: &str = "COMP";
pub const FORM_ID_PREFIX: &str = "FORM";

/// Default locations
pub const DEFAULT_REGISTER_PATH: &str = "data/master_register.xlsx";
pub const DEFAULT_CONFIG_PATH: &str = "complaint_register.toml";
pub const CONFIG_PATH_ENV: &str = "COMPLAINT_REGISTER_CONFIG";
