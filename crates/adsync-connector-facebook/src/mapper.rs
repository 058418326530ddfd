// # Facebook Mapper
//
// Pure translation between the unified ad and a Marketing API campaign.
//
// ## Native Shape
//
// ```json
// {
//   "name": "...", "objective": "OUTCOME_TRAFFIC", "status": "ACTIVE",
//   "daily_budget": "5000", "currency": "USD",
//   "start_time": "2026-03-01T00:00:00+0000",
//   "targeting": { "geo_locations": { "countries": ["US"] }, "age_min": 25, "genders": [2] },
//   "creative": { "title": "...", "body": "...", "link": "...", "call_to_action_type": "SHOP_NOW" }
// }
// ```
//
// Budgets are integer minor units of the account currency. Link ads carry a
// single title and body, so extra variants are reported as dropped along with
// keywords, languages and anything but the first image.

use adsync_core::error::{Error, Result};
use adsync_core::model::{
    AdStatus, AgeRange, AssetKind, AssetRef, BudgetPeriod, BudgetSpec, CallToAction,
    CanonicalFields, Creative, DroppedField, Gender, MetricsRecord, Money, Platform, ScheduleSpec,
    TargetStatus, TargetingSpec, UnifiedAd, currency_minor_digits,
};
use adsync_core::traits::{AdMapper, MappedCampaign, merge_overrides};
use chrono::{NaiveDate, Utc};
use serde_json::{Value, json};

/// Youngest age the platform targets
const MIN_AGE: u8 = 13;
/// Oldest age bucket; 65 means 65+
const MAX_AGE: u8 = 65;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_SUFFIX: &str = "T00:00:00+0000";

/// Native campaign status for a target status
pub fn native_status(status: TargetStatus) -> &'static str {
    match status {
        TargetStatus::Active => "ACTIVE",
        TargetStatus::Paused => "PAUSED",
        TargetStatus::Archived => "ARCHIVED",
    }
}

/// Target status for a native campaign status
pub fn parse_status(status: &str) -> Result<TargetStatus> {
    match status {
        "ACTIVE" => Ok(TargetStatus::Active),
        "PAUSED" => Ok(TargetStatus::Paused),
        "ARCHIVED" | "DELETED" => Ok(TargetStatus::Archived),
        other => Err(Error::validation(format!(
            "unknown Facebook campaign status '{}'",
            other
        ))),
    }
}

fn call_to_action_type(cta: CallToAction) -> &'static str {
    match cta {
        CallToAction::LearnMore => "LEARN_MORE",
        CallToAction::ShopNow => "SHOP_NOW",
        CallToAction::SignUp => "SIGN_UP",
        CallToAction::Download => "DOWNLOAD",
        CallToAction::ContactUs => "CONTACT_US",
        CallToAction::BookNow => "BOOK_TRAVEL",
        CallToAction::GetQuote => "GET_QUOTE",
        CallToAction::Subscribe => "SUBSCRIBE",
    }
}

fn parse_call_to_action(value: &str) -> Option<CallToAction> {
    Some(match value {
        "LEARN_MORE" => CallToAction::LearnMore,
        "SHOP_NOW" => CallToAction::ShopNow,
        "SIGN_UP" => CallToAction::SignUp,
        "DOWNLOAD" => CallToAction::Download,
        "CONTACT_US" => CallToAction::ContactUs,
        "BOOK_TRAVEL" => CallToAction::BookNow,
        "GET_QUOTE" => CallToAction::GetQuote,
        "SUBSCRIBE" => CallToAction::Subscribe,
        _ => return None,
    })
}

/// Mapper for Facebook link-ad campaigns
#[derive(Debug, Clone, Copy, Default)]
pub struct FacebookMapper;

impl FacebookMapper {
    fn budget(ad: &UnifiedAd, payload: &mut Value) -> Result<()> {
        let minor = ad
            .budget
            .amount
            .to_units(currency_minor_digits(&ad.budget.currency))?;

        let field = match ad.budget.period {
            BudgetPeriod::Daily => "daily_budget",
            BudgetPeriod::Lifetime => {
                if ad.schedule.end_date.is_none() {
                    return Err(Error::validation(
                        "Facebook lifetime budgets need a schedule end date",
                    ));
                }
                "lifetime_budget"
            }
        };
        payload[field] = json!(minor.to_string());
        payload["currency"] = json!(ad.budget.currency);
        Ok(())
    }

    /// Returns the native targeting and whether the age range was clamped
    fn targeting(targeting: &TargetingSpec) -> (Value, bool) {
        let mut native = json!({
            "geo_locations": { "countries": targeting.locations },
        });

        let mut clamped = false;
        if let Some(range) = targeting.age_range {
            let min = range.min.clamp(MIN_AGE, MAX_AGE);
            let max = range.max.clamp(MIN_AGE, MAX_AGE);
            clamped = min != range.min || max != range.max;
            native["age_min"] = json!(min);
            native["age_max"] = json!(max);
        }
        if !targeting.genders.is_empty() {
            let genders: Vec<u8> = targeting
                .genders
                .iter()
                .map(|g| match g {
                    Gender::Male => 1,
                    Gender::Female => 2,
                })
                .collect();
            native["genders"] = json!(genders);
        }
        if !targeting.interests.is_empty() {
            let interests: Vec<_> = targeting
                .interests
                .iter()
                .map(|name| json!({ "name": name }))
                .collect();
            native["flexible_spec"] = json!([{ "interests": interests }]);
        }
        (native, clamped)
    }

    fn creative(creative: &Creative) -> Result<Value> {
        let title = creative
            .headlines
            .first()
            .ok_or_else(|| Error::validation("Facebook link ads need a headline"))?;
        let link = creative
            .final_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| Error::validation("Facebook link ads need a final URL"))?;

        let mut native = json!({ "title": title, "link": link });
        if let Some(body) = creative.descriptions.first() {
            native["body"] = json!(body);
        }
        if let Some(cta) = creative.call_to_action {
            native["call_to_action_type"] = json!(call_to_action_type(cta));
        }
        if let Some(image) = first_image(&creative.assets) {
            native["image_url"] = json!(image.uri);
            native["image_id"] = json!(image.id);
        }
        Ok(native)
    }

    fn dropped(ad: &UnifiedAd, age_clamped: bool) -> Vec<DroppedField> {
        let creative = &ad.creative;
        let mut dropped = Vec::new();

        if ad.status == AdStatus::Draft {
            dropped.push(DroppedField::new("status", "drafts deploy paused"));
        }

        if creative.headlines.len() > 1 {
            dropped.push(DroppedField::new(
                "creative.headlines",
                "link ads carry a single title",
            ));
        }
        if creative.descriptions.len() > 1 {
            dropped.push(DroppedField::new(
                "creative.descriptions",
                "link ads carry a single body",
            ));
        }
        let first = first_image(&creative.assets).map(|a| a.id.as_str());
        if creative.assets.iter().any(|a| Some(a.id.as_str()) != first) {
            dropped.push(DroppedField::new(
                "creative.assets",
                "link ads carry a single image",
            ));
        }
        if !ad.targeting.keywords.is_empty() {
            dropped.push(DroppedField::new(
                "targeting.keywords",
                "Facebook does not target keywords",
            ));
        }
        if !ad.targeting.languages.is_empty() {
            dropped.push(DroppedField::new(
                "targeting.languages",
                "language targeting is not mapped",
            ));
        }
        if age_clamped {
            dropped.push(DroppedField::new(
                "targeting.age_range",
                format!("ages outside {}-{} were clamped", MIN_AGE, MAX_AGE),
            ));
        }
        dropped
    }
}

impl AdMapper for FacebookMapper {
    fn platform(&self) -> Platform {
        Platform::Facebook
    }

    fn to_native(&self, ad: &UnifiedAd) -> Result<MappedCampaign> {
        let (targeting, age_clamped) = Self::targeting(&ad.targeting);

        let mut payload = json!({
            "name": ad.name,
            "objective": "OUTCOME_TRAFFIC",
            "status": native_status(ad.status.into()),
            "special_ad_categories": [],
            "start_time": format!("{}{}", ad.schedule.start_date.format(DATE_FORMAT), TIME_SUFFIX),
            "targeting": targeting,
            "creative": Self::creative(&ad.creative)?,
        });
        if let Some(end) = ad.schedule.end_date {
            payload["end_time"] = json!(format!("{}{}", end.format(DATE_FORMAT), TIME_SUFFIX));
        }
        Self::budget(ad, &mut payload)?;
        merge_overrides(&mut payload, ad.overrides_for(Platform::Facebook));

        Ok(MappedCampaign {
            payload,
            dropped_fields: Self::dropped(ad, age_clamped),
        })
    }

    fn from_native(&self, payload: &Value) -> Result<CanonicalFields> {
        let status = match parse_status(str_field(payload, "status")?)? {
            TargetStatus::Active => AdStatus::Active,
            TargetStatus::Paused => AdStatus::Paused,
            TargetStatus::Archived => AdStatus::Archived,
        };

        let currency = str_field(payload, "currency")?.to_string();
        let decimals = currency_minor_digits(&currency);
        let (minor, period) = if payload.get("daily_budget").is_some() {
            (int_field(payload, "daily_budget")?, BudgetPeriod::Daily)
        } else {
            (int_field(payload, "lifetime_budget")?, BudgetPeriod::Lifetime)
        };

        let creative = &payload["creative"];
        let assets = match (creative["image_id"].as_str(), creative["image_url"].as_str()) {
            (Some(id), Some(uri)) => vec![AssetRef {
                id: id.to_string(),
                kind: AssetKind::Image,
                uri: uri.to_string(),
            }],
            _ => Vec::new(),
        };

        let targeting = &payload["targeting"];
        let age_range = match (targeting["age_min"].as_u64(), targeting["age_max"].as_u64()) {
            (Some(min), Some(max)) => Some(AgeRange {
                min: u8::try_from(min).map_err(|_| Error::validation("age_min out of range"))?,
                max: u8::try_from(max).map_err(|_| Error::validation("age_max out of range"))?,
            }),
            _ => None,
        };
        let genders = targeting["genders"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|g| match g.as_u64() {
                        Some(1) => Some(Gender::Male),
                        Some(2) => Some(Gender::Female),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();
        let interests = targeting["flexible_spec"][0]["interests"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i["name"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        Ok(CanonicalFields {
            name: str_field(payload, "name")?.to_string(),
            creative: Creative {
                headlines: vec![str_field(creative, "title")?.to_string()],
                descriptions: creative["body"]
                    .as_str()
                    .map(|b| vec![b.to_string()])
                    .unwrap_or_default(),
                call_to_action: creative["call_to_action_type"]
                    .as_str()
                    .and_then(parse_call_to_action),
                assets,
                final_url: creative["link"].as_str().map(str::to_string),
            },
            targeting: TargetingSpec {
                locations: string_list(&targeting["geo_locations"]["countries"]),
                languages: Vec::new(),
                age_range,
                genders,
                interests,
                keywords: Vec::new(),
            },
            budget: BudgetSpec {
                amount: Money::from_units(minor, decimals)?,
                currency,
                period,
            },
            schedule: ScheduleSpec {
                start_date: parse_date(str_field(payload, "start_time")?)?,
                end_date: payload["end_time"].as_str().map(parse_date).transpose()?,
            },
            status,
        })
    }

    /// Accepts an insights response (`{"data": [...]}`) or a bare row array
    fn metrics_to_unified(&self, ad_id: &str, payload: &Value) -> Result<Vec<MetricsRecord>> {
        let rows = payload
            .get("data")
            .unwrap_or(payload)
            .as_array()
            .ok_or_else(|| Error::validation("Facebook insights payload must carry a data array"))?;

        let fetched_at = Utc::now();
        rows.iter()
            .map(|row| {
                let spend = match &row["spend"] {
                    Value::String(s) => s.parse::<Money>()?,
                    Value::Null => Money::zero(),
                    _ => return Err(Error::validation("Facebook spend must be a decimal string")),
                };
                Ok(MetricsRecord {
                    ad_id: ad_id.to_string(),
                    platform: Platform::Facebook,
                    date: parse_date(str_field(row, "date_start")?)?,
                    impressions: int_field(row, "impressions").unwrap_or(0).max(0) as u64,
                    clicks: int_field(row, "clicks").unwrap_or(0).max(0) as u64,
                    spend,
                    conversions: conversions(&row["actions"]),
                    revision: 0,
                    fetched_at,
                })
            })
            .collect()
    }
}

fn first_image(assets: &[AssetRef]) -> Option<&AssetRef> {
    assets.iter().find(|a| a.kind == AssetKind::Image)
}

/// Sum of offsite conversion actions
fn conversions(actions: &Value) -> f64 {
    actions
        .as_array()
        .map(|actions| {
            actions
                .iter()
                .filter(|a| {
                    a["action_type"]
                        .as_str()
                        .is_some_and(|t| t.starts_with("offsite_conversion"))
                })
                .filter_map(|a| match &a["value"] {
                    Value::String(s) => s.parse::<f64>().ok(),
                    other => other.as_f64(),
                })
                .sum()
        })
        .unwrap_or(0.0)
}

fn str_field<'a>(value: &'a Value, field: &str) -> Result<&'a str> {
    value[field]
        .as_str()
        .ok_or_else(|| Error::validation(format!("Facebook payload is missing '{}'", field)))
}

/// Graph API numbers arrive as strings more often than not
fn int_field(value: &Value, field: &str) -> Result<i64> {
    match &value[field] {
        Value::String(s) => s.parse().map_err(|_| {
            Error::validation(format!("Facebook field '{}' is not an integer", field))
        }),
        Value::Number(n) => n.as_i64().ok_or_else(|| {
            Error::validation(format!("Facebook field '{}' is not an integer", field))
        }),
        _ => Err(Error::validation(format!(
            "Facebook payload is missing '{}'",
            field
        ))),
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

/// Accepts `2026-03-01` or a full `2026-03-01T00:00:00+0000` timestamp
fn parse_date(s: &str) -> Result<NaiveDate> {
    let date = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(date, DATE_FORMAT)
        .map_err(|e| Error::validation(format!("invalid Facebook date '{}': {}", s, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn link_ad() -> UnifiedAd {
        UnifiedAd {
            id: "ad-1".to_string(),
            user_id: "user-1".to_string(),
            name: "Spring sale".to_string(),
            creative: Creative {
                headlines: vec!["Spring sale".to_string()],
                descriptions: vec!["Fresh styles for the new season.".to_string()],
                call_to_action: Some(CallToAction::ShopNow),
                assets: vec![AssetRef {
                    id: "img-1".to_string(),
                    kind: AssetKind::Image,
                    uri: "https://cdn.example.com/spring.jpg".to_string(),
                }],
                final_url: Some("https://shop.example.com/spring".to_string()),
            },
            targeting: TargetingSpec {
                locations: vec!["US".to_string()],
                languages: Vec::new(),
                age_range: Some(AgeRange { min: 25, max: 54 }),
                genders: vec![Gender::Female],
                interests: vec!["gardening".to_string()],
                keywords: Vec::new(),
            },
            budget: BudgetSpec {
                amount: "50".parse().unwrap(),
                currency: "USD".to_string(),
                period: BudgetPeriod::Daily,
            },
            schedule: ScheduleSpec {
                start_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2026, 3, 31),
            },
            status: AdStatus::Active,
            platform_overrides: BTreeMap::new(),
        }
    }

    fn dropped_paths(mapped: &MappedCampaign) -> Vec<&str> {
        mapped
            .dropped_fields
            .iter()
            .map(|d| d.path.as_str())
            .collect()
    }

    #[test]
    fn test_budget_in_minor_units() {
        let mapped = FacebookMapper.to_native(&link_ad()).unwrap();
        assert_eq!(mapped.payload["daily_budget"], "5000");
        assert_eq!(mapped.payload["status"], "ACTIVE");
        assert_eq!(mapped.payload["creative"]["call_to_action_type"], "SHOP_NOW");
        assert!(mapped.dropped_fields.is_empty());
    }

    #[test]
    fn test_zero_decimal_currency() {
        let mut ad = link_ad();
        ad.budget.amount = "5000".parse().unwrap();
        ad.budget.currency = "JPY".to_string();

        let mapped = FacebookMapper.to_native(&ad).unwrap();
        assert_eq!(mapped.payload["daily_budget"], "5000");
    }

    #[test]
    fn test_round_half_even_at_boundary() {
        let mut ad = link_ad();
        ad.budget.amount = "10.125".parse().unwrap();
        assert_eq!(FacebookMapper.to_native(&ad).unwrap().payload["daily_budget"], "1012");

        ad.budget.amount = "10.135".parse().unwrap();
        assert_eq!(FacebookMapper.to_native(&ad).unwrap().payload["daily_budget"], "1014");
    }

    #[test]
    fn test_round_trip() {
        let ad = link_ad();
        let mapped = FacebookMapper.to_native(&ad).unwrap();
        let recovered = FacebookMapper.from_native(&mapped.payload).unwrap();
        assert_eq!(recovered, ad.canonical());
    }

    #[test]
    fn test_draft_round_trips_as_paused() {
        let mut ad = link_ad();
        ad.status = AdStatus::Draft;

        let mapped = FacebookMapper.to_native(&ad).unwrap();
        assert_eq!(mapped.payload["status"], "PAUSED");
        assert_eq!(dropped_paths(&mapped), vec!["status"]);
        assert_eq!(mapped.dropped_fields[0].reason, "drafts deploy paused");

        let recovered = FacebookMapper.from_native(&mapped.payload).unwrap();
        let mut expected = ad.canonical();
        expected.status = AdStatus::Paused;
        assert_eq!(recovered, expected);
    }

    #[test]
    fn test_extra_variants_are_dropped() {
        let mut ad = link_ad();
        ad.creative.headlines.push("20% off".to_string());
        ad.creative.assets.push(AssetRef {
            id: "vid-1".to_string(),
            kind: AssetKind::Video,
            uri: "https://cdn.example.com/spring.mp4".to_string(),
        });
        ad.targeting.keywords = vec!["spring sale".to_string()];

        let mapped = FacebookMapper.to_native(&ad).unwrap();
        assert_eq!(mapped.payload["creative"]["title"], "Spring sale");
        assert_eq!(mapped.payload["creative"]["image_id"], "img-1");
        assert_eq!(
            dropped_paths(&mapped),
            vec!["creative.headlines", "creative.assets", "targeting.keywords"]
        );
    }

    #[test]
    fn test_age_range_is_clamped() {
        let mut ad = link_ad();
        ad.targeting.age_range = Some(AgeRange { min: 10, max: 80 });

        let mapped = FacebookMapper.to_native(&ad).unwrap();
        assert_eq!(mapped.payload["targeting"]["age_min"], 13);
        assert_eq!(mapped.payload["targeting"]["age_max"], 65);
        assert_eq!(dropped_paths(&mapped), vec!["targeting.age_range"]);
    }

    #[test]
    fn test_link_required() {
        let mut ad = link_ad();
        ad.creative.final_url = None;
        let err = FacebookMapper.to_native(&ad).unwrap_err();
        assert_eq!(err.kind(), adsync_core::ErrorKind::Validation);
    }

    #[test]
    fn test_lifetime_budget() {
        let mut ad = link_ad();
        ad.budget.period = BudgetPeriod::Lifetime;
        let mapped = FacebookMapper.to_native(&ad).unwrap();
        assert_eq!(mapped.payload["lifetime_budget"], "5000");
        assert!(mapped.payload.get("daily_budget").is_none());

        ad.schedule.end_date = None;
        assert!(FacebookMapper.to_native(&ad).is_err());
    }

    #[test]
    fn test_metrics_from_insights() {
        let payload = json!({
            "data": [{
                "date_start": "2026-05-01",
                "date_stop": "2026-05-01",
                "impressions": "1000",
                "clicks": "40",
                "spend": "12.50",
                "actions": [
                    { "action_type": "link_click", "value": "40" },
                    { "action_type": "offsite_conversion.fb_pixel_purchase", "value": "2" },
                    { "action_type": "offsite_conversion.fb_pixel_lead", "value": "1.5" }
                ]
            }],
            "paging": { "cursors": {} }
        });

        let records = FacebookMapper.metrics_to_unified("ad-1", &payload).unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2026, 5, 1).unwrap());
        assert_eq!(record.impressions, 1000);
        assert_eq!(record.clicks, 40);
        assert_eq!(record.spend, "12.5".parse().unwrap());
        assert_eq!(record.conversions, 3.5);
    }

    #[test]
    fn test_metrics_reject_numeric_spend() {
        let payload = json!({ "data": [{ "date_start": "2026-05-01", "spend": 12.5 }] });
        assert!(FacebookMapper.metrics_to_unified("ad-1", &payload).is_err());
    }
}
