//! KOL credibility table
//!
//! Static mapping from a tracked author's user ID to the integer credibility
//! weight applied during aggregation. Authors outside the table weigh zero.

use serde::Deserialize;
use std::collections::HashMap;

/// Credibility assigned to the built-in tracked accounts
pub const DEFAULT_CREDIBILITY: u32 = 100;

/// Profile for a tracked KOL
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KolProfile {
    /// Twitter user ID
    pub id: String,
    /// Twitter username
    pub screen_name: String,
    /// Aggregation weight
    #[serde(default = "default_credibility")]
    pub credibility: u32,
}

fn default_credibility() -> u32 {
    DEFAULT_CREDIBILITY
}

impl KolProfile {
    pub fn new(id: impl Into<String>, screen_name: impl Into<String>, credibility: u32) -> Self {
        Self {
            id: id.into(),
            screen_name: screen_name.into(),
            credibility,
        }
    }
}

/// Lookup table of tracked authors
#[derive(Debug, Clone)]
pub struct CredibilityTable {
    /// KOLs indexed by user ID
    kols: HashMap<String, KolProfile>,
}

impl CredibilityTable {
    /// Build a table from explicit profiles
    pub fn new(profiles: impl IntoIterator<Item = KolProfile>) -> Self {
        Self {
            kols: profiles.into_iter().map(|p| (p.id.clone(), p)).collect(),
        }
    }

    /// Use `profiles` when given, otherwise the built-in accounts
    pub fn from_config(profiles: &[KolProfile]) -> Self {
        if profiles.is_empty() {
            Self::default()
        } else {
            Self::new(profiles.iter().cloned())
        }
    }

    /// Credibility weight for an author; unknown authors weigh 0
    pub fn weight(&self, author_id: &str) -> u32 {
        self.kols.get(author_id).map_or(0, |k| k.credibility)
    }

    pub fn count(&self) -> usize {
        self.kols.len()
    }
}

impl Default for CredibilityTable {
    fn default() -> Self {
        Self::new(
            [
                ("1341802616565739521", "CleanseSmart"),
                ("1132684191097921536", "cryptodraw_info"),
                ("1357973275289280512", "Manda_Coin"),
                ("894191480834674688", "TheCryptoExpres"),
                ("1057747667860799488", "Bitcoinmeraklsi"),
                ("1571932891042422784", "crypto_goos"),
                ("1377672959041679367", "Roman_Trading"),
                ("1052756564459905025", "CryptoFaibik"),
                ("3696215239", "Nebraskangooner"),
                ("1647806180713168897", "tradegym"),
            ]
            .into_iter()
            .map(|(id, name)| KolProfile::new(id, name, DEFAULT_CREDIBILITY)),
        )
    }
}
