use std::sync::Arc;

use esg_resource::{AggregateSnapshot, FormulaRegistry, RegistrationEvent, Result};
use tracing::debug;

use crate::aggregate::Aggregator;
use crate::store::CampaignStateStore;

/// Turns registration events into counter updates.
#[derive(Clone)]
pub struct EventApplier {
    registry: Arc<FormulaRegistry>,
    store: Arc<CampaignStateStore>,
    aggregator: Aggregator,
}

impl EventApplier {
    pub fn new(
        registry: Arc<FormulaRegistry>,
        store: Arc<CampaignStateStore>,
        aggregator: Aggregator,
    ) -> Self {
        EventApplier {
            registry,
            store,
            aggregator,
        }
    }

    /// Applies an event and returns the snapshot of its campaign.
    ///
    /// The event's deltas are committed as one group, and only if the
    /// resulting counters still derive every metric of the campaign. The
    /// returned snapshot shows the applied entry exactly as committed.
    pub fn apply(&self, event: &RegistrationEvent) -> Result<AggregateSnapshot> {
        let campaign = self.store.catalog().get(&event.campaign)?;
        let key = campaign.state_key(event.sub_key.as_deref())?;
        let kind = campaign.event_kind(&event.kind)?;
        let deltas = kind.deltas(&event.params)?;

        let counters = self
            .store
            .apply_delta_with(&key, &deltas, kind.correction, |next| {
                self.registry.derive(&campaign.key, next).map(drop)
            })?;
        debug!(%key, kind = %kind.name, ?deltas, "applied event");

        self.aggregator
            .summarize_with(&[campaign.key.as_str()], Some((&key, &counters)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use esg_resource::{
        Catalog, DeltaRejection, Error, FormulaRegistry, RegistrationEvent, StateKey,
    };
    use serde_json::json;

    use super::EventApplier;
    use crate::aggregate::Aggregator;
    use crate::seed::BaselineSeeder;
    use crate::store::CampaignStateStore;

    fn applier() -> (EventApplier, Arc<CampaignStateStore>) {
        let catalog = Catalog::from_json_str(
            &json!({
                "campaigns": [
                    {
                        "key": "flea_market",
                        "name": "Flea market",
                        "counters": ["listed_items", "listed_value", "sold_items", "donations"],
                        "metrics": [{
                            "name": "donation_per_sale",
                            "formula": { "kind": "ratio", "numerator": "donations", "denominator": "sold_items" }
                        }],
                        "events": [
                            {
                                "name": "list_item",
                                "deltas": [
                                    { "counter": "listed_items" },
                                    { "counter": "listed_value", "per": "price" }
                                ]
                            },
                            {
                                "name": "sell_item",
                                "correction": true,
                                "deltas": [
                                    { "counter": "sold_items" },
                                    { "counter": "donations", "per": "donation" },
                                    { "counter": "listed_items", "amount": -1.0 },
                                    { "counter": "listed_value", "amount": -1.0, "per": "price" }
                                ]
                            }
                        ]
                    },
                    {
                        "key": "stair_climbing",
                        "name": "Stairs",
                        "counters": ["participants"],
                        "sub_keys": [
                            { "key": "jamsil", "name": "Jamsil" },
                            { "key": "suwon", "name": "Suwon" }
                        ],
                        "events": [{ "name": "register", "deltas": [{ "counter": "participants" }] }]
                    }
                ]
            })
            .to_string(),
        )
        .unwrap();
        let registry = Arc::new(FormulaRegistry::from_catalog(&catalog));
        let store = Arc::new(CampaignStateStore::new(
            Arc::new(catalog),
            Box::new(BaselineSeeder),
        ));
        let aggregator = Aggregator::new(registry.clone(), store.clone());
        (EventApplier::new(registry, store.clone(), aggregator), store)
    }

    #[test]
    fn sell_item_moves_a_listing() {
        let (applier, _) = applier();
        let list = RegistrationEvent::new("flea_market", "list_item").with_param("price", 5000.0);
        applier.apply(&list).unwrap();

        let sell = RegistrationEvent::new("flea_market", "sell_item")
            .with_param("price", 5000.0)
            .with_param("donation", 500.0);
        let snapshot = applier.apply(&sell).unwrap();
        let campaign = snapshot.campaign("flea_market").unwrap();
        let entry = campaign.entry(None).unwrap();

        assert_eq!(entry.counters.get("listed_items"), Some(0.0));
        assert_eq!(entry.counters.get("listed_value"), Some(0.0));
        assert_eq!(entry.counters.get("sold_items"), Some(1.0));
        assert_eq!(entry.metric("donation_per_sale"), Some(500.0));
    }

    #[test]
    fn selling_without_listing_is_rejected() {
        let (applier, store) = applier();
        let sell = RegistrationEvent::new("flea_market", "sell_item")
            .with_param("price", 5000.0)
            .with_param("donation", 500.0);
        assert!(matches!(
            applier.apply(&sell),
            Err(Error::InvalidDelta { .. })
        ));

        let counters = store
            .get(&StateKey::new("flea_market", None).unwrap())
            .unwrap();
        assert_eq!(counters.get("sold_items"), Some(0.0));
    }

    #[test]
    fn negative_params_never_reverse_a_rule() {
        let (applier, store) = applier();
        let list = RegistrationEvent::new("flea_market", "list_item").with_param("price", 5000.0);
        applier.apply(&list).unwrap();

        let sell = RegistrationEvent::new("flea_market", "sell_item")
            .with_param("price", -1000.0)
            .with_param("donation", 0.0);
        assert!(matches!(
            applier.apply(&sell),
            Err(Error::InvalidDelta {
                reason: DeltaRejection::NegativeParam { .. },
                ..
            })
        ));

        let donate = RegistrationEvent::new("flea_market", "sell_item")
            .with_param("price", 5000.0)
            .with_param("donation", -500.0);
        assert!(matches!(
            applier.apply(&donate),
            Err(Error::InvalidDelta { .. })
        ));

        let counters = store
            .get(&StateKey::new("flea_market", None).unwrap())
            .unwrap();
        assert_eq!(counters.get("listed_items"), Some(1.0));
        assert_eq!(counters.get("listed_value"), Some(5000.0));
        assert_eq!(counters.get("donations"), Some(0.0));
    }

    #[test]
    fn validates_event_shape() {
        let (applier, _) = applier();

        assert_eq!(
            applier
                .apply(&RegistrationEvent::new("recycling", "register"))
                .unwrap_err(),
            Error::UnknownCampaign("recycling".to_string())
        );
        assert_eq!(
            applier
                .apply(&RegistrationEvent::new("stair_climbing", "register"))
                .unwrap_err(),
            Error::MissingSubKey("stair_climbing".to_string())
        );
        assert!(matches!(
            applier.apply(&RegistrationEvent::new("stair_climbing", "register").with_sub_key("sangam")),
            Err(Error::UnknownSubKey { .. })
        ));
        assert!(matches!(
            applier.apply(&RegistrationEvent::new("stair_climbing", "climb").with_sub_key("jamsil")),
            Err(Error::UnknownEventKind { .. })
        ));
        assert!(matches!(
            applier.apply(&RegistrationEvent::new("flea_market", "list_item")),
            Err(Error::MissingParam { .. })
        ));
    }

    #[test]
    fn applies_to_one_sub_key() {
        let (applier, _) = applier();
        let event = RegistrationEvent::new("stair_climbing", "register").with_sub_key("suwon");
        let snapshot = applier.apply(&event).unwrap();
        let campaign = snapshot.campaign("stair_climbing").unwrap();

        assert_eq!(
            campaign.entry(Some("suwon")).unwrap().counters.get("participants"),
            Some(1.0)
        );
        assert_eq!(
            campaign.entry(Some("jamsil")).unwrap().counters.get("participants"),
            Some(0.0)
        );
        assert_eq!(campaign.totals.get("participants"), Some(1.0));
    }
}
