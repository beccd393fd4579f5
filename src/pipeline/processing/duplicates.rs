//! Cross-record duplicate scan.
//!
//! Every unordered pair of records is checked against five rules. A pair that
//! satisfies any rule is linked, and links are closed transitively with a
//! union-find, so A~B and B~C put A, B and C in one group even when A and C
//! share nothing directly. Groups are surfaced for review; nothing is merged
//! or removed from the register.

use once_cell::sync::Lazy;
use petgraph::unionfind::UnionFind;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use tracing::{debug, info};

use crate::domain::ComplaintRecord;
use crate::error::{RegisterError, Result};
use crate::observability::metrics;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicateConfig {
    /// Maximum distance in days between complaint dates
    pub date_tolerance_days: i64,
    /// Maximum amount difference relative to the pair's mean (0.10 = 10 %)
    pub amount_tolerance: f64,
    /// Normalized Levenshtein similarity of complainant names must exceed this
    pub name_similarity_threshold: f64,
    pub account_min_digits: usize,
    pub account_max_digits: usize,
}

impl Default for DuplicateConfig {
    fn default() -> Self {
        Self {
            date_tolerance_days: 7,
            amount_tolerance: 0.10,
            name_similarity_threshold: 0.80,
            account_min_digits: 11,
            account_max_digits: 18,
        }
    }
}

impl DuplicateConfig {
    pub fn validate(&self) -> Result<()> {
        if self.date_tolerance_days < 0 {
            return Err(RegisterError::Config(format!(
                "duplicates.date_tolerance_days must not be negative, got {}",
                self.date_tolerance_days
            )));
        }
        if !self.amount_tolerance.is_finite() || self.amount_tolerance < 0.0 {
            return Err(RegisterError::Config(format!(
                "duplicates.amount_tolerance must be a non-negative number, got {}",
                self.amount_tolerance
            )));
        }
        if !(0.0..=1.0).contains(&self.name_similarity_threshold) {
            return Err(RegisterError::Config(format!(
                "duplicates.name_similarity_threshold must be within [0, 1], got {}",
                self.name_similarity_threshold
            )));
        }
        if self.account_min_digits == 0 || self.account_min_digits > self.account_max_digits {
            return Err(RegisterError::Config(format!(
                "duplicates.account_min_digits ({}) must be positive and not exceed account_max_digits ({})",
                self.account_min_digits, self.account_max_digits
            )));
        }
        Ok(())
    }
}

/// Why two records were linked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MatchReason {
    SameId,
    SameMobile,
    SameEmail,
    SharedPaymentId,
    SimilarName,
}

impl MatchReason {
    pub fn label(&self) -> &'static str {
        match self {
            MatchReason::SameId => "Same Complaint ID",
            MatchReason::SameMobile => "Same Mobile Number",
            MatchReason::SameEmail => "Same Email",
            MatchReason::SharedPaymentId => "Shared Payment ID",
            MatchReason::SimilarName => "Similar Name",
        }
    }

    /// `"; "`-joined labels, in rule order.
    pub fn join(reasons: &BTreeSet<MatchReason>) -> String {
        reasons.iter().map(MatchReason::label).collect::<Vec<_>>().join("; ")
    }
}

impl fmt::Display for MatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupMember {
    /// Index of the record in the slice that was scanned
    pub position: usize,
    pub id: String,
    /// Reasons of the links that touch this member
    pub reasons: BTreeSet<MatchReason>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateGroup {
    /// `DUPLICATE_GROUP_<n>`, 1-based
    pub label: String,
    /// Members in register order
    pub members: Vec<GroupMember>,
    /// Union of the reasons of every link inside the group
    pub reasons: BTreeSet<MatchReason>,
}

impl DuplicateGroup {
    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn member_ids(&self) -> Vec<&str> {
        self.members.iter().map(|m| m.id.as_str()).collect()
    }
}

static UPI_CANDIDATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\w.\-]+@[\w.\-]+").unwrap());

/// Per-record values computed once before the pairwise scan.
struct Prepared<'a> {
    record: &'a ComplaintRecord,
    name: String,
    payment_ids: HashSet<String>,
}

pub struct DuplicateDetector {
    config: DuplicateConfig,
    account_number: Regex,
}

impl DuplicateDetector {
    pub fn new(config: DuplicateConfig) -> Result<Self> {
        config.validate()?;
        let account_number = Regex::new(&format!(
            r"\b\d{{{},{}}}\b",
            config.account_min_digits, config.account_max_digits
        ))
        .map_err(|e| RegisterError::Config(format!("invalid account number bounds: {}", e)))?;
        Ok(Self { config, account_number })
    }

    /// UPI handles (`name@provider`, provider without a dot so e-mail
    /// addresses are excluded) and bank account numbers in the text.
    pub fn payment_ids(&self, text: &str) -> HashSet<String> {
        let lower = text.to_lowercase();
        let mut ids: HashSet<String> = UPI_CANDIDATE
            .find_iter(&lower)
            .map(|m| m.as_str().trim_end_matches(['.', '-']))
            .filter(|handle| match handle.split_once('@') {
                Some((user, provider)) => !user.is_empty() && !provider.is_empty() && !provider.contains('.'),
                None => false,
            })
            .map(str::to_string)
            .collect();
        ids.extend(self.account_number.find_iter(&lower).map(|m| m.as_str().to_string()));
        ids
    }

    fn dates_close(&self, a: &ComplaintRecord, b: &ComplaintRecord) -> bool {
        match (a.complaint_date, b.complaint_date) {
            (Some(da), Some(db)) => (da - db).num_days().abs() <= self.config.date_tolerance_days,
            _ => false,
        }
    }

    fn amounts_close(&self, a: &ComplaintRecord, b: &ComplaintRecord) -> bool {
        if a.amount <= 0.0 || b.amount <= 0.0 {
            return false;
        }
        if a.amount == b.amount {
            return true;
        }
        let mean = (a.amount + b.amount) / 2.0;
        (a.amount - b.amount).abs() / mean <= self.config.amount_tolerance
    }

    fn match_reasons(&self, a: &Prepared<'_>, b: &Prepared<'_>) -> BTreeSet<MatchReason> {
        let (ra, rb) = (a.record, b.record);
        let mut reasons = BTreeSet::new();

        if ra.id == rb.id {
            reasons.insert(MatchReason::SameId);
        }
        if !a.payment_ids.is_disjoint(&b.payment_ids) {
            reasons.insert(MatchReason::SharedPaymentId);
        }

        let same_mobile = matches!((&ra.mobile, &rb.mobile), (Some(x), Some(y)) if x == y);
        let same_email = matches!((&ra.email, &rb.email), (Some(x), Some(y)) if x == y);
        let similar_name = !a.name.is_empty()
            && !b.name.is_empty()
            && strsim::normalized_levenshtein(&a.name, &b.name) > self.config.name_similarity_threshold;

        if (same_mobile || same_email || similar_name) && self.dates_close(ra, rb) && self.amounts_close(ra, rb) {
            if same_mobile {
                reasons.insert(MatchReason::SameMobile);
            }
            if same_email {
                reasons.insert(MatchReason::SameEmail);
            }
            if similar_name {
                reasons.insert(MatchReason::SimilarName);
            }
        }
        reasons
    }

    /// Scan all pairs and return the linked groups, ordered by the register
    /// position of their first member.
    pub fn find_groups(&self, records: &[ComplaintRecord]) -> Vec<DuplicateGroup> {
        let start_time = std::time::Instant::now();
        let prepared: Vec<Prepared<'_>> = records
            .iter()
            .map(|record| Prepared {
                record,
                name: record.complainant_name.trim().to_lowercase(),
                payment_ids: self.payment_ids(&record.description),
            })
            .collect();

        let n = prepared.len();
        let mut sets = UnionFind::<usize>::new(n);
        let mut links: Vec<(usize, usize, BTreeSet<MatchReason>)> = Vec::new();
        for i in 0..n {
            for j in (i + 1)..n {
                let reasons = self.match_reasons(&prepared[i], &prepared[j]);
                if !reasons.is_empty() {
                    debug!("Linked {} ~ {}: {}", records[i].id, records[j].id, MatchReason::join(&reasons));
                    sets.union(i, j);
                    links.push((i, j, reasons));
                }
            }
        }

        let roots = sets.into_labeling();
        let mut member_reasons: HashMap<usize, BTreeSet<MatchReason>> = HashMap::new();
        let mut group_reasons: HashMap<usize, BTreeSet<MatchReason>> = HashMap::new();
        for (i, j, reasons) in &links {
            member_reasons.entry(*i).or_default().extend(reasons.iter().copied());
            member_reasons.entry(*j).or_default().extend(reasons.iter().copied());
            group_reasons.entry(roots[*i]).or_default().extend(reasons.iter().copied());
        }

        // Walk positions in order so groups come out sorted by first member.
        let mut order: Vec<usize> = Vec::new();
        let mut members_by_root: HashMap<usize, Vec<GroupMember>> = HashMap::new();
        for (position, record) in records.iter().enumerate() {
            let Some(reasons) = member_reasons.remove(&position) else {
                continue;
            };
            let root = roots[position];
            let members = members_by_root.entry(root).or_insert_with(|| {
                order.push(root);
                Vec::new()
            });
            members.push(GroupMember {
                position,
                id: record.id.clone(),
                reasons,
            });
        }

        let groups: Vec<DuplicateGroup> = order
            .into_iter()
            .enumerate()
            .map(|(idx, root)| DuplicateGroup {
                label: format!("DUPLICATE_GROUP_{}", idx + 1),
                members: members_by_root.remove(&root).unwrap_or_default(),
                reasons: group_reasons.remove(&root).unwrap_or_default(),
            })
            .collect();

        let pairs = n.saturating_sub(1) * n / 2;
        metrics::duplicates::pairs_compared(pairs as u64);
        metrics::duplicates::groups_found(groups.len() as u64);
        metrics::duplicates::duration(start_time.elapsed().as_secs_f64());
        info!(
            "Duplicate scan: records={} pairs={} links={} groups={}",
            n,
            pairs,
            links.len(),
            groups.len()
        );
        groups
    }
}
