// # Unified Ad
//
// Canonical, platform-agnostic representation of an advertisement.
//
// Creative, targeting, budget and schedule fields carry no platform quirks.
// Anything platform specific lives in `platform_overrides`, which a mapper
// merges into its native payload as the very last step.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::money::Money;
use super::Platform;
use crate::error::{Error, Result};

/// Lifecycle status of a unified ad
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdStatus {
    /// Not yet live; deployed paused
    Draft,
    /// Delivering
    Active,
    /// Temporarily stopped
    Paused,
    /// Retired
    Archived,
}

/// Call-to-action button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallToAction {
    LearnMore,
    ShopNow,
    SignUp,
    Download,
    ContactUs,
    BookNow,
    GetQuote,
    Subscribe,
}

/// Kind of creative asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Image,
    Video,
}

/// Reference to an uploaded asset (upload itself is out of scope)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRef {
    /// Asset identifier in the asset store
    pub id: String,
    /// Asset kind
    pub kind: AssetKind,
    /// Location the platforms can fetch from
    pub uri: String,
}

/// Creative content
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creative {
    /// Headline variants, in priority order
    #[serde(default)]
    pub headlines: Vec<String>,
    /// Description variants, in priority order
    #[serde(default)]
    pub descriptions: Vec<String>,
    /// Optional call-to-action
    #[serde(default)]
    pub call_to_action: Option<CallToAction>,
    /// Ordered asset references
    #[serde(default)]
    pub assets: Vec<AssetRef>,
    /// Landing page
    #[serde(default)]
    pub final_url: Option<String>,
}

/// Inclusive age bracket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgeRange {
    pub min: u8,
    pub max: u8,
}

/// Audience gender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

/// Audience targeting
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetingSpec {
    /// ISO-3166 alpha-2 country codes
    #[serde(default)]
    pub locations: Vec<String>,
    /// ISO-639-1 language codes
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub age_range: Option<AgeRange>,
    /// Empty means all genders
    #[serde(default)]
    pub genders: Vec<Gender>,
    /// Interest categories
    #[serde(default)]
    pub interests: Vec<String>,
    /// Search keywords
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Budget pacing period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetPeriod {
    Daily,
    Lifetime,
}

/// Budget
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetSpec {
    /// Amount in `currency`
    pub amount: Money,
    /// ISO-4217 code
    pub currency: String,
    pub period: BudgetPeriod,
}

/// Flight dates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSpec {
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

/// Canonical advertisement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedAd {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub creative: Creative,
    #[serde(default)]
    pub targeting: TargetingSpec,
    pub budget: BudgetSpec,
    pub schedule: ScheduleSpec,
    pub status: AdStatus,
    /// Per-platform native fields merged over the mapped payload
    #[serde(default)]
    pub platform_overrides: BTreeMap<Platform, serde_json::Map<String, serde_json::Value>>,
}

/// The platform-independent part of an ad, as recovered from a native payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalFields {
    pub name: String,
    pub creative: Creative,
    pub targeting: TargetingSpec,
    pub budget: BudgetSpec,
    pub schedule: ScheduleSpec,
    pub status: AdStatus,
}

impl UnifiedAd {
    /// Check platform-independent invariants
    ///
    /// Platform-specific requirements are checked by each mapper.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::validation("ad id cannot be empty"));
        }
        if self.user_id.trim().is_empty() {
            return Err(Error::validation(format!("ad {} has no owning user", self.id)));
        }
        if self.name.trim().is_empty() {
            return Err(Error::validation(format!("ad {} has no name", self.id)));
        }
        if !self.budget.amount.is_positive() {
            return Err(Error::validation(format!(
                "ad {} budget must be positive, got {}",
                self.id, self.budget.amount
            )));
        }
        let currency = &self.budget.currency;
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(Error::validation(format!(
                "ad {} has invalid currency code '{}'",
                self.id, currency
            )));
        }
        if let Some(end) = self.schedule.end_date
            && end < self.schedule.start_date
        {
            return Err(Error::validation(format!(
                "ad {} ends ({}) before it starts ({})",
                self.id, end, self.schedule.start_date
            )));
        }
        if let Some(range) = self.targeting.age_range
            && range.min > range.max
        {
            return Err(Error::validation(format!(
                "ad {} has inverted age range {}-{}",
                self.id, range.min, range.max
            )));
        }
        Ok(())
    }

    /// Platform-independent fields of this ad
    pub fn canonical(&self) -> CanonicalFields {
        CanonicalFields {
            name: self.name.clone(),
            creative: self.creative.clone(),
            targeting: self.targeting.clone(),
            budget: self.budget.clone(),
            schedule: self.schedule.clone(),
            status: self.status,
        }
    }

    /// Override map for one platform, if any
    pub fn overrides_for(
        &self,
        platform: Platform,
    ) -> Option<&serde_json::Map<String, serde_json::Value>> {
        self.platform_overrides.get(&platform)
    }
}
