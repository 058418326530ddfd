// # Google Ads Mapper
//
// Pure translation between the unified ad and a Google Ads search campaign.
//
// ## Native Shape
//
// ```json
// {
//   "campaign": { "name": "...", "status": "ENABLED", "startDate": "2026-03-01", ... },
//   "campaignBudget": { "amountMicros": "50000000", "period": "DAILY", "currencyCode": "USD" },
//   "ad": { "responsiveSearchAd": { "headlines": [...], "descriptions": [...] }, "finalUrls": [...] },
//   "criteria": { "locations": [...], "languages": [...], "keywords": [...] }
// }
// ```
//
// ## Lossy Fields
//
// Responsive search ads carry no call-to-action, no assets and no interest
// targeting. Those fields are reported as dropped, never silently discarded.

use adsync_core::error::{Error, Result};
use adsync_core::model::{
    AdStatus, AgeRange, BudgetPeriod, BudgetSpec, CanonicalFields, Creative, DroppedField, Gender,
    MetricsRecord, Money, Platform, ScheduleSpec, TargetStatus, TargetingSpec, UnifiedAd,
};
use adsync_core::traits::{AdMapper, MappedCampaign, merge_overrides};
use chrono::{NaiveDate, Utc};
use serde_json::{Value, json};

/// Google amounts are integer micro-units of the account currency
pub const MICROS_DECIMALS: u32 = 6;

const MIN_HEADLINES: usize = 3;
const MAX_HEADLINES: usize = 15;
const MAX_HEADLINE_CHARS: usize = 30;
const MIN_DESCRIPTIONS: usize = 2;
const MAX_DESCRIPTIONS: usize = 4;
const MAX_DESCRIPTION_CHARS: usize = 90;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Native campaign status for a target status
pub fn native_status(status: TargetStatus) -> &'static str {
    match status {
        TargetStatus::Active => "ENABLED",
        TargetStatus::Paused => "PAUSED",
        TargetStatus::Archived => "REMOVED",
    }
}

/// Target status for a native campaign status
pub fn parse_status(status: &str) -> Result<TargetStatus> {
    match status {
        "ENABLED" => Ok(TargetStatus::Active),
        "PAUSED" => Ok(TargetStatus::Paused),
        "REMOVED" => Ok(TargetStatus::Archived),
        other => Err(Error::validation(format!(
            "unknown Google campaign status '{}'",
            other
        ))),
    }
}

/// Mapper for Google Ads search campaigns
#[derive(Debug, Clone, Copy, Default)]
pub struct GoogleAdsMapper;

impl GoogleAdsMapper {
    fn check_creative(creative: &Creative) -> Result<()> {
        let headlines = creative.headlines.len();
        if !(MIN_HEADLINES..=MAX_HEADLINES).contains(&headlines) {
            return Err(Error::validation(format!(
                "Google responsive search ads need {}-{} headlines, got {}",
                MIN_HEADLINES, MAX_HEADLINES, headlines
            )));
        }
        if let Some(h) = creative
            .headlines
            .iter()
            .find(|h| h.chars().count() > MAX_HEADLINE_CHARS)
        {
            return Err(Error::validation(format!(
                "Google headline '{}' exceeds {} characters",
                h, MAX_HEADLINE_CHARS
            )));
        }

        let descriptions = creative.descriptions.len();
        if !(MIN_DESCRIPTIONS..=MAX_DESCRIPTIONS).contains(&descriptions) {
            return Err(Error::validation(format!(
                "Google responsive search ads need {}-{} descriptions, got {}",
                MIN_DESCRIPTIONS, MAX_DESCRIPTIONS, descriptions
            )));
        }
        if let Some(d) = creative
            .descriptions
            .iter()
            .find(|d| d.chars().count() > MAX_DESCRIPTION_CHARS)
        {
            return Err(Error::validation(format!(
                "Google description '{}' exceeds {} characters",
                d, MAX_DESCRIPTION_CHARS
            )));
        }

        if creative.final_url.as_deref().is_none_or(str::is_empty) {
            return Err(Error::validation("Google responsive search ads need a final URL"));
        }
        Ok(())
    }

    fn budget(ad: &UnifiedAd) -> Result<Value> {
        let micros = ad.budget.amount.to_units(MICROS_DECIMALS)?;
        match ad.budget.period {
            BudgetPeriod::Daily => Ok(json!({
                "amountMicros": micros.to_string(),
                "period": "DAILY",
                "currencyCode": ad.budget.currency,
            })),
            BudgetPeriod::Lifetime => {
                if ad.schedule.end_date.is_none() {
                    return Err(Error::validation(
                        "Google lifetime budgets need a schedule end date",
                    ));
                }
                Ok(json!({
                    "totalAmountMicros": micros.to_string(),
                    "period": "CUSTOM_PERIOD",
                    "currencyCode": ad.budget.currency,
                }))
            }
        }
    }

    fn criteria(targeting: &TargetingSpec) -> Value {
        let mut criteria = json!({
            "locations": targeting.locations,
            "languages": targeting.languages,
            "keywords": targeting.keywords,
        });
        if let Some(range) = targeting.age_range {
            criteria["ageRange"] = json!({ "min": range.min, "max": range.max });
        }
        if !targeting.genders.is_empty() {
            let genders: Vec<_> = targeting
                .genders
                .iter()
                .map(|g| match g {
                    Gender::Male => "MALE",
                    Gender::Female => "FEMALE",
                })
                .collect();
            criteria["genders"] = json!(genders);
        }
        criteria
    }

    fn dropped(ad: &UnifiedAd) -> Vec<DroppedField> {
        let mut dropped = Vec::new();
        if ad.status == AdStatus::Draft {
            dropped.push(DroppedField::new("status", "drafts deploy paused"));
        }
        if ad.creative.call_to_action.is_some() {
            dropped.push(DroppedField::new(
                "creative.call_to_action",
                "responsive search ads have no call-to-action",
            ));
        }
        if !ad.creative.assets.is_empty() {
            dropped.push(DroppedField::new(
                "creative.assets",
                "responsive search ads carry text only",
            ));
        }
        if !ad.targeting.interests.is_empty() {
            dropped.push(DroppedField::new(
                "targeting.interests",
                "search campaigns do not target interests",
            ));
        }
        dropped
    }
}

impl AdMapper for GoogleAdsMapper {
    fn platform(&self) -> Platform {
        Platform::Google
    }

    fn to_native(&self, ad: &UnifiedAd) -> Result<MappedCampaign> {
        Self::check_creative(&ad.creative)?;

        let headlines: Vec<_> = ad
            .creative
            .headlines
            .iter()
            .map(|h| json!({ "text": h }))
            .collect();
        let descriptions: Vec<_> = ad
            .creative
            .descriptions
            .iter()
            .map(|d| json!({ "text": d }))
            .collect();

        let mut campaign = json!({
            "name": ad.name,
            "status": native_status(ad.status.into()),
            "advertisingChannelType": "SEARCH",
            "startDate": ad.schedule.start_date.format(DATE_FORMAT).to_string(),
        });
        if let Some(end) = ad.schedule.end_date {
            campaign["endDate"] = json!(end.format(DATE_FORMAT).to_string());
        }

        let mut payload = json!({
            "campaign": campaign,
            "campaignBudget": Self::budget(ad)?,
            "ad": {
                "responsiveSearchAd": {
                    "headlines": headlines,
                    "descriptions": descriptions,
                },
                "finalUrls": [ad.creative.final_url],
            },
            "criteria": Self::criteria(&ad.targeting),
        });
        merge_overrides(&mut payload, ad.overrides_for(Platform::Google));

        Ok(MappedCampaign {
            payload,
            dropped_fields: Self::dropped(ad),
        })
    }

    fn from_native(&self, payload: &Value) -> Result<CanonicalFields> {
        let campaign = &payload["campaign"];
        let name = str_field(campaign, "name")?.to_string();
        let status = match parse_status(str_field(campaign, "status")?)? {
            TargetStatus::Active => AdStatus::Active,
            TargetStatus::Paused => AdStatus::Paused,
            TargetStatus::Archived => AdStatus::Archived,
        };
        let start_date = parse_date(str_field(campaign, "startDate")?)?;
        let end_date = campaign["endDate"].as_str().map(parse_date).transpose()?;

        let budget = &payload["campaignBudget"];
        let (micros, period) = match str_field(budget, "period")? {
            "DAILY" => (int_field(budget, "amountMicros")?, BudgetPeriod::Daily),
            "CUSTOM_PERIOD" => (int_field(budget, "totalAmountMicros")?, BudgetPeriod::Lifetime),
            other => {
                return Err(Error::validation(format!(
                    "unknown Google budget period '{}'",
                    other
                )));
            }
        };

        let rsa = &payload["ad"]["responsiveSearchAd"];
        let texts = |list: &Value| -> Vec<String> {
            list.as_array()
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|i| i["text"].as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default()
        };

        let criteria = &payload["criteria"];
        let age_range = criteria.get("ageRange").and_then(|r| {
            Some(AgeRange {
                min: u8::try_from(r["min"].as_u64()?).ok()?,
                max: u8::try_from(r["max"].as_u64()?).ok()?,
            })
        });
        let genders = string_list(&criteria["genders"])
            .iter()
            .filter_map(|g| match g.as_str() {
                "MALE" => Some(Gender::Male),
                "FEMALE" => Some(Gender::Female),
                _ => None,
            })
            .collect();

        Ok(CanonicalFields {
            name,
            creative: Creative {
                headlines: texts(&rsa["headlines"]),
                descriptions: texts(&rsa["descriptions"]),
                call_to_action: None,
                assets: Vec::new(),
                final_url: payload["ad"]["finalUrls"][0].as_str().map(str::to_string),
            },
            targeting: TargetingSpec {
                locations: string_list(&criteria["locations"]),
                languages: string_list(&criteria["languages"]),
                age_range,
                genders,
                interests: Vec::new(),
                keywords: string_list(&criteria["keywords"]),
            },
            budget: BudgetSpec {
                amount: Money::from_units(micros, MICROS_DECIMALS)?,
                currency: str_field(budget, "currencyCode")?.to_string(),
                period,
            },
            schedule: ScheduleSpec {
                start_date,
                end_date,
            },
            status,
        })
    }

    /// Accepts a `searchStream` response: an array of batches with `results`
    fn metrics_to_unified(&self, ad_id: &str, payload: &Value) -> Result<Vec<MetricsRecord>> {
        let batches = match payload {
            Value::Array(batches) => batches.as_slice(),
            Value::Object(_) => std::slice::from_ref(payload),
            _ => return Err(Error::validation("Google metrics payload must be an array")),
        };

        let fetched_at = Utc::now();
        let mut records = Vec::new();
        for row in batches
            .iter()
            .filter_map(|b| b["results"].as_array())
            .flatten()
        {
            let metrics = &row["metrics"];
            records.push(MetricsRecord {
                ad_id: ad_id.to_string(),
                platform: Platform::Google,
                date: parse_date(str_field(&row["segments"], "date")?)?,
                impressions: int_field(metrics, "impressions").unwrap_or(0).max(0) as u64,
                clicks: int_field(metrics, "clicks").unwrap_or(0).max(0) as u64,
                spend: Money::from_units(
                    int_field(metrics, "costMicros").unwrap_or(0),
                    MICROS_DECIMALS,
                )?,
                conversions: metrics["conversions"].as_f64().unwrap_or(0.0),
                revision: 0,
                fetched_at,
            });
        }
        Ok(records)
    }
}

fn str_field<'a>(value: &'a Value, field: &str) -> Result<&'a str> {
    value[field]
        .as_str()
        .ok_or_else(|| Error::validation(format!("Google payload is missing '{}'", field)))
}

/// Google encodes int64 as JSON strings; accept numbers too
fn int_field(value: &Value, field: &str) -> Result<i64> {
    match &value[field] {
        Value::String(s) => s
            .parse()
            .map_err(|_| Error::validation(format!("Google field '{}' is not an integer", field))),
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| Error::validation(format!("Google field '{}' is not an integer", field))),
        _ => Err(Error::validation(format!("Google payload is missing '{}'", field))),
    }
}

fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .map_err(|e| Error::validation(format!("invalid Google date '{}': {}", s, e)))
}
