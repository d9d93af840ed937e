use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{DeltaRejection, Deltas, Error, MetricDefinition, Result, StateKey};

/// Event parameters, such as `kwh`, `kg` or `price`.
pub type Params = BTreeMap<String, f64>;

/// Static definition of one campaign.
///
/// Loaded once from the campaign table and immutable afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub key: String,
    pub name: String,
    /// Counter names, in declaration order.
    pub counters: Vec<String>,
    /// Locations the campaign keeps separate counters for.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_keys: Vec<SubKey>,
    #[serde(default)]
    pub metrics: Vec<MetricDefinition>,
    #[serde(default)]
    pub events: Vec<EventKind>,
    /// Campaign wide seed rules, overridden by a sub-key's own rules.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub seed: BTreeMap<String, SeedRule>,
    /// Metric the campaign's entries are ranked by.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ranking: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubKey {
    pub key: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub seed: BTreeMap<String, SeedRule>,
}

/// A registration a campaign accepts, and the counters it moves.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventKind {
    pub name: String,
    /// Permits negative deltas.
    #[serde(default)]
    pub correction: bool,
    pub deltas: Vec<DeltaRule>,
}

/// One counter change of an event kind.
///
/// The delta is `amount`, multiplied by the event parameter `per` when set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeltaRule {
    pub counter: String,
    #[serde(default = "one")]
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per: Option<String>,
}

/// How a counter is seeded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedRule {
    Fixed(f64),
    /// Whole number in `[low, high)`.
    Range { low: i64, high: i64 },
    /// Weighted sum of counters declared before this one.
    Sum(BTreeMap<String, f64>),
}

impl Campaign {
    /// Returns whether the campaign keeps counters per sub-key.
    pub fn is_partitioned(&self) -> bool {
        !self.sub_keys.is_empty()
    }

    pub fn sub_key(&self, key: &str) -> Option<&SubKey> {
        self.sub_keys.iter().find(|sub_key| sub_key.key == key)
    }

    /// All state keys of the campaign, in sub-key declaration order.
    pub fn state_keys(&self) -> Vec<StateKey> {
        if self.is_partitioned() {
            self.sub_keys
                .iter()
                .filter_map(|sub_key| StateKey::new(&self.key, Some(&sub_key.key)).ok())
                .collect()
        } else {
            StateKey::new(&self.key, None).into_iter().collect()
        }
    }

    /// Builds the state key for `sub_key`, checking it against the
    /// campaign's partitioning.
    pub fn state_key(&self, sub_key: Option<&str>) -> Result<StateKey> {
        match (sub_key, self.is_partitioned()) {
            (None, true) => Err(Error::MissingSubKey(self.key.clone())),
            (Some(sub_key), partitioned) => {
                if !partitioned || self.sub_key(sub_key).is_none() {
                    return Err(Error::UnknownSubKey {
                        campaign: self.key.clone(),
                        sub_key: sub_key.to_string(),
                    });
                }
                Ok(StateKey::new(&self.key, Some(sub_key))?)
            }
            (None, false) => Ok(StateKey::new(&self.key, None)?),
        }
    }

    pub fn event_kind(&self, name: &str) -> Result<&EventKind> {
        self.events
            .iter()
            .find(|kind| kind.name == name)
            .ok_or_else(|| Error::UnknownEventKind {
                campaign: self.key.clone(),
                kind: name.to_string(),
            })
    }

    pub fn metric(&self, name: &str) -> Result<&MetricDefinition> {
        self.metrics
            .iter()
            .find(|metric| metric.name == name)
            .ok_or_else(|| Error::UnknownMetric {
                campaign: self.key.clone(),
                metric: name.to_string(),
            })
    }

    pub fn declares(&self, counter: &str) -> bool {
        self.counters.iter().any(|declared| declared == counter)
    }

    /// Display name of an entry.
    pub fn entry_name(&self, sub_key: Option<&str>) -> &str {
        sub_key
            .and_then(|sub_key| self.sub_key(sub_key))
            .map(|sub_key| sub_key.name.as_str())
            .unwrap_or(&self.name)
    }

    /// Seed rule of a counter, preferring the sub-key's own rule.
    pub fn seed_rule(&self, counter: &str, sub_key: Option<&str>) -> Option<&SeedRule> {
        sub_key
            .and_then(|sub_key| self.sub_key(sub_key))
            .and_then(|sub_key| sub_key.seed.get(counter))
            .or_else(|| self.seed.get(counter))
    }

    fn validate(&self) -> std::result::Result<(), String> {
        StateKey::new(&self.key, None).map_err(|err| err.to_string())?;

        if self.counters.is_empty() {
            return Err("declares no counters".to_string());
        }
        unique(self.counters.iter().map(String::as_str), "counter")?;
        unique(self.sub_keys.iter().map(|sub_key| sub_key.key.as_str()), "sub-key")?;
        unique(self.metrics.iter().map(|metric| metric.name.as_str()), "metric")?;
        unique(self.events.iter().map(|kind| kind.name.as_str()), "event kind")?;

        for sub_key in &self.sub_keys {
            if sub_key.key.is_empty() {
                return Err("empty sub-key".to_string());
            }
            self.validate_seed(&sub_key.seed)
                .map_err(|err| format!("sub-key '{}': {err}", sub_key.key))?;
        }

        for metric in &self.metrics {
            for counter in metric.formula.counters() {
                if !self.declares(counter) {
                    return Err(format!(
                        "metric '{}' reads undeclared counter '{counter}'",
                        metric.name
                    ));
                }
            }
        }

        for kind in &self.events {
            for rule in &kind.deltas {
                if !self.declares(&rule.counter) {
                    return Err(format!(
                        "event kind '{}' moves undeclared counter '{}'",
                        kind.name, rule.counter
                    ));
                }
                if !rule.amount.is_finite() {
                    return Err(format!("event kind '{}' has a non-finite amount", kind.name));
                }
                if rule.amount < 0.0 && !kind.correction {
                    return Err(format!(
                        "event kind '{}' decrements '{}' without permitting corrections",
                        kind.name, rule.counter
                    ));
                }
            }
        }

        self.validate_seed(&self.seed)?;

        if let Some(ranking) = &self.ranking {
            self.metric(ranking).map_err(|err| err.to_string())?;
        }

        Ok(())
    }

    fn validate_seed(&self, seed: &BTreeMap<String, SeedRule>) -> std::result::Result<(), String> {
        for (counter, rule) in seed {
            let position = self
                .counters
                .iter()
                .position(|declared| declared == counter)
                .ok_or_else(|| format!("seed rule for undeclared counter '{counter}'"))?;

            match rule {
                SeedRule::Fixed(value) => {
                    if !value.is_finite() || *value < 0.0 {
                        return Err(format!("invalid fixed seed {value} for '{counter}'"));
                    }
                }
                SeedRule::Range { low, high } => {
                    if *low < 0 || low >= high {
                        return Err(format!("empty seed range [{low}, {high}) for '{counter}'"));
                    }
                }
                SeedRule::Sum(terms) => {
                    for (term, weight) in terms {
                        let earlier = self.counters[..position].iter().any(|c| c == term);
                        if !earlier {
                            return Err(format!(
                                "seed of '{counter}' sums '{term}', which is not declared before it"
                            ));
                        }
                        if !weight.is_finite() || *weight < 0.0 {
                            return Err(format!("invalid weight {weight} for '{term}'"));
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

impl EventKind {
    /// Expands the event kind into counter deltas.
    ///
    /// Rules on the same counter add up. Parameters must be finite and not
    /// negative, so only a rule's own `amount` can make a delta negative.
    pub fn deltas(&self, params: &Params) -> Result<Deltas> {
        let mut deltas = Deltas::new();
        for rule in &self.deltas {
            let factor = match &rule.per {
                Some(param) => {
                    let value = *params.get(param).ok_or_else(|| Error::MissingParam {
                        kind: self.name.clone(),
                        param: param.clone(),
                    })?;
                    if !value.is_finite() {
                        return Err(Error::InvalidDelta {
                            counter: rule.counter.clone(),
                            reason: DeltaRejection::NotFinite,
                        });
                    }
                    if value < 0.0 {
                        return Err(Error::InvalidDelta {
                            counter: rule.counter.clone(),
                            reason: DeltaRejection::NegativeParam {
                                param: param.clone(),
                                value,
                            },
                        });
                    }
                    value
                }
                None => 1.0,
            };
            let delta = rule.amount * factor;
            if !delta.is_finite() {
                return Err(Error::InvalidDelta {
                    counter: rule.counter.clone(),
                    reason: DeltaRejection::NotFinite,
                });
            }
            *deltas.entry(rule.counter.clone()).or_default() += delta;
        }

        Ok(deltas)
    }
}

/// Summary of a campaign definition, as listed to clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CampaignInfo {
    pub key: String,
    pub name: String,
    pub counters: Vec<String>,
    pub sub_keys: Vec<String>,
    pub metrics: Vec<String>,
    pub events: Vec<String>,
    pub ranking: Option<String>,
}

impl From<&Campaign> for CampaignInfo {
    fn from(campaign: &Campaign) -> Self {
        CampaignInfo {
            key: campaign.key.clone(),
            name: campaign.name.clone(),
            counters: campaign.counters.clone(),
            sub_keys: campaign.sub_keys.iter().map(|s| s.key.clone()).collect(),
            metrics: campaign.metrics.iter().map(|m| m.name.clone()).collect(),
            events: campaign.events.iter().map(|e| e.name.clone()).collect(),
            ranking: campaign.ranking.clone(),
        }
    }
}

/// The campaign table as stored on disk.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CampaignTable {
    pub campaigns: Vec<Campaign>,
}

/// Validated campaign definitions, in registration order.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    campaigns: Vec<Campaign>,
    index: HashMap<String, usize>,
}

impl Catalog {
    /// Validates the campaign definitions, failing with
    /// [`Error::InvalidConfig`] on the first inconsistency.
    pub fn new(campaigns: Vec<Campaign>) -> Result<Self> {
        let mut index = HashMap::with_capacity(campaigns.len());
        for (position, campaign) in campaigns.iter().enumerate() {
            campaign
                .validate()
                .map_err(|err| Error::InvalidConfig(format!("campaign '{}': {err}", campaign.key)))?;
            if index.insert(campaign.key.clone(), position).is_some() {
                return Err(Error::InvalidConfig(format!(
                    "duplicate campaign '{}'",
                    campaign.key
                )));
            }
        }

        Ok(Catalog { campaigns, index })
    }

    pub fn from_table(table: CampaignTable) -> Result<Self> {
        Catalog::new(table.campaigns)
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        Catalog::from_table(serde_json::from_str(s)?)
    }

    pub fn get(&self, key: &str) -> Result<&Campaign> {
        self.index
            .get(key)
            .map(|position| &self.campaigns[*position])
            .ok_or_else(|| Error::UnknownCampaign(key.to_string()))
    }

    /// Registration order of a campaign.
    pub fn position(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    /// Returns the campaign of a state key, checking the sub-key too.
    pub fn check(&self, key: &StateKey) -> Result<&Campaign> {
        let campaign = self.get(key.campaign())?;
        campaign.state_key(key.sub_key())?;
        Ok(campaign)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Campaign> {
        self.campaigns.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.campaigns.iter().map(|campaign| campaign.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.campaigns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.campaigns.is_empty()
    }
}

fn unique<'a>(
    names: impl Iterator<Item = &'a str>,
    what: &str,
) -> std::result::Result<(), String> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(format!("duplicate {what} '{name}'"));
        }
    }
    Ok(())
}

fn one() -> f64 {
    1.0
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Campaign, Catalog, Params, SeedRule};
    use crate::{DeltaRejection, Error, StateKey};

    fn zero_cup() -> serde_json::Value {
        json!({
            "key": "zero_cup",
            "name": "Zero cup",
            "counters": ["personal_cups", "lunchboxes", "participants", "N", "C"],
            "metrics": [
                { "name": "carbon_reduction", "formula": { "kind": "single_use_swap", "items": "N" } }
            ],
            "events": [
                {
                    "name": "lunchbox",
                    "deltas": [
                        { "counter": "lunchboxes" },
                        { "counter": "participants" },
                        { "counter": "N", "amount": 2.0 },
                        { "counter": "C" }
                    ]
                }
            ],
            "seed": {
                "personal_cups": { "range": { "low": 25, "high": 50 } },
                "lunchboxes": { "fixed": 3.0 },
                "participants": { "sum": { "personal_cups": 1.0, "lunchboxes": 1.0 } }
            }
        })
    }

    fn stairs() -> serde_json::Value {
        json!({
            "key": "stair_climbing",
            "name": "Stairs",
            "counters": ["participants"],
            "sub_keys": [
                { "key": "jamsil", "name": "Jamsil", "seed": { "participants": { "fixed": 10.0 } } },
                { "key": "sangam", "name": "Sangam" }
            ],
            "metrics": [
                { "name": "carbon_reduction", "formula": { "kind": "linear", "counter": "participants", "factor": 0.3 } }
            ],
            "events": [{ "name": "register", "deltas": [{ "counter": "participants" }] }],
            "seed": { "participants": { "fixed": 1.0 } },
            "ranking": "carbon_reduction"
        })
    }

    fn campaign(value: serde_json::Value) -> Campaign {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn lunchbox_expands_to_deltas() {
        let campaign = campaign(zero_cup());
        let deltas = campaign
            .event_kind("lunchbox")
            .unwrap()
            .deltas(&Params::new())
            .unwrap();
        assert_eq!(deltas.get("participants"), Some(&1.0));
        assert_eq!(deltas.get("N"), Some(&2.0));
        assert_eq!(deltas.get("C"), Some(&1.0));
        assert_eq!(deltas.len(), 4);
    }

    #[test]
    fn params_must_be_finite_and_not_negative() {
        let campaign = campaign(json!({
            "key": "flea_market",
            "name": "Flea market",
            "counters": ["listed_value"],
            "events": [{
                "name": "unlist",
                "correction": true,
                "deltas": [{ "counter": "listed_value", "amount": -1.0, "per": "price" }]
            }]
        }));
        let kind = campaign.event_kind("unlist").unwrap();

        let params: Params = [("price".to_string(), 1000.0)].into_iter().collect();
        assert_eq!(kind.deltas(&params).unwrap().get("listed_value"), Some(&-1000.0));

        let params: Params = [("price".to_string(), -1000.0)].into_iter().collect();
        assert!(matches!(
            kind.deltas(&params),
            Err(Error::InvalidDelta {
                reason: DeltaRejection::NegativeParam { .. },
                ..
            })
        ));

        let params: Params = [("price".to_string(), f64::INFINITY)].into_iter().collect();
        assert!(matches!(
            kind.deltas(&params),
            Err(Error::InvalidDelta {
                reason: DeltaRejection::NotFinite,
                ..
            })
        ));
    }

    #[test]
    fn per_rules_require_params() {
        let campaign = campaign(json!({
            "key": "paperless",
            "name": "Paperless",
            "counters": ["sheets_reduced"],
            "events": [{ "name": "go_paperless", "deltas": [{ "counter": "sheets_reduced", "per": "sheets" }] }]
        }));
        let kind = campaign.event_kind("go_paperless").unwrap();

        assert_eq!(
            kind.deltas(&Params::new()),
            Err(Error::MissingParam {
                kind: "go_paperless".to_string(),
                param: "sheets".to_string(),
            })
        );

        let params: Params = [("sheets".to_string(), 250.0)].into_iter().collect();
        assert_eq!(kind.deltas(&params).unwrap().get("sheets_reduced"), Some(&250.0));
    }

    #[test]
    fn state_key_follows_partitioning() {
        let stairs = campaign(stairs());
        assert_eq!(
            stairs.state_key(Some("jamsil")).unwrap(),
            StateKey::new("stair_climbing", Some("jamsil")).unwrap()
        );
        assert_eq!(
            stairs.state_key(None),
            Err(Error::MissingSubKey("stair_climbing".to_string()))
        );
        assert!(matches!(
            stairs.state_key(Some("suwon")),
            Err(Error::UnknownSubKey { .. })
        ));

        let zero_cup = campaign(zero_cup());
        assert!(zero_cup.state_key(None).is_ok());
        assert!(matches!(
            zero_cup.state_key(Some("jamsil")),
            Err(Error::UnknownSubKey { .. })
        ));
        assert_eq!(stairs.state_keys().len(), 2);
        assert_eq!(zero_cup.state_keys().len(), 1);
    }

    #[test]
    fn sub_key_seed_overrides_campaign_seed() {
        let stairs = campaign(stairs());
        assert_eq!(
            stairs.seed_rule("participants", Some("jamsil")),
            Some(&SeedRule::Fixed(10.0))
        );
        assert_eq!(
            stairs.seed_rule("participants", Some("sangam")),
            Some(&SeedRule::Fixed(1.0))
        );
    }

    #[test]
    fn catalog_keeps_registration_order() {
        let catalog = Catalog::new(vec![campaign(zero_cup()), campaign(stairs())]).unwrap();
        assert_eq!(catalog.position("zero_cup"), Some(0));
        assert_eq!(catalog.position("stair_climbing"), Some(1));
        assert_eq!(
            catalog.keys().collect::<Vec<_>>(),
            vec!["zero_cup", "stair_climbing"]
        );
        assert_eq!(
            catalog.get("recycling").unwrap_err(),
            Error::UnknownCampaign("recycling".to_string())
        );
    }

    #[test]
    fn rejects_duplicate_campaigns() {
        let err = Catalog::new(vec![campaign(zero_cup()), campaign(zero_cup())]).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn rejects_undeclared_counters() {
        let mut value = zero_cup();
        value["metrics"][0]["formula"]["items"] = json!("W");
        assert!(matches!(
            Catalog::new(vec![campaign(value)]),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_sums_of_later_counters() {
        let mut value = zero_cup();
        value["seed"]["personal_cups"] = json!({ "sum": { "participants": 1.0 } });
        assert!(matches!(
            Catalog::new(vec![campaign(value)]),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_decrements_without_correction() {
        let mut value = zero_cup();
        value["events"][0]["deltas"][0]["amount"] = json!(-1.0);
        assert!(matches!(
            Catalog::new(vec![campaign(value)]),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_undeclared_ranking_metric() {
        let mut value = stairs();
        value["ranking"] = json!("esg_score");
        assert!(matches!(
            Catalog::new(vec![campaign(value)]),
            Err(Error::InvalidConfig(_))
        ));
    }
}
