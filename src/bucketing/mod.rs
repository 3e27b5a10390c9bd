//! Local decision engine. The bucketing configuration of an environment is fetched (and
//! periodically refreshed) from the CDN, and campaign decisions for a visitor are then made
//! entirely in-process: targeting rules are evaluated against the visitor context and the
//! matching visitor is hashed into a variation bucket.
use std::sync::Arc;
use std::time::Duration;

use rand::{thread_rng, Rng};

use crate::configuration_store::ConfigurationStore;
use crate::decision::{CampaignDecision, DecisionResponse, VariationDecision};
use crate::exec_group::ExecGroup;
use crate::{Context, Result};

mod allocation;
mod api;
mod models;
mod targeting;

pub use api::{ApiClient, ApiClientConfig, ConfigurationSource, DEFAULT_BASE_URL};
pub use models::{
    Campaign, Configuration, Targeting, TargetingGroup, TargetingOperator, TargetingRule,
    TargetingValue, Variation, VariationGroup,
};

/// Configuration for [`Engine`] polling.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Interval between two configuration refreshes. [`Duration::ZERO`] disables
    /// polling entirely.
    ///
    /// Defaults to [`EngineConfig::DEFAULT_POLL_INTERVAL`].
    pub polling_interval: Duration,
    /// Jitter applied to `polling_interval` to avoid synchronized requests from a fleet of
    /// clients started together.
    ///
    /// Defaults to [`EngineConfig::DEFAULT_POLL_JITTER`].
    pub polling_jitter: Duration,
}

impl EngineConfig {
    /// Default value for [`EngineConfig::polling_interval`].
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);
    /// Default value for [`EngineConfig::polling_jitter`].
    pub const DEFAULT_POLL_JITTER: Duration = Duration::from_secs(3);

    /// Create a new `EngineConfig` using default configuration.
    pub fn new() -> EngineConfig {
        EngineConfig::default()
    }

    /// Update polling interval. [`Duration::ZERO`] disables polling.
    pub fn with_polling_interval(mut self, interval: Duration) -> EngineConfig {
        self.polling_interval = interval;
        self
    }

    /// Update polling jitter.
    pub fn with_polling_jitter(mut self, jitter: Duration) -> EngineConfig {
        self.polling_jitter = jitter;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> EngineConfig {
        EngineConfig {
            polling_interval: EngineConfig::DEFAULT_POLL_INTERVAL,
            polling_jitter: EngineConfig::DEFAULT_POLL_JITTER,
        }
    }
}

/// The local decision engine. Cheap to clone.
#[derive(Clone)]
pub struct Engine {
    store: Arc<ConfigurationStore>,
    source: Arc<dyn ConfigurationSource>,
    config: EngineConfig,
}

impl Engine {
    /// Create an engine pulling its configuration from `source`. The configuration is not
    /// fetched until [`Engine::load`] or [`Engine::start`] is called.
    pub fn new(source: Arc<dyn ConfigurationSource>, config: EngineConfig) -> Engine {
        Engine {
            store: Arc::new(ConfigurationStore::new()),
            source,
            config,
        }
    }

    /// Fetch the configuration once and store it, replacing any previously stored one.
    pub fn load(&self) -> Result<()> {
        self.refresh()?;
        Ok(())
    }

    fn refresh(&self) -> Result<Arc<Configuration>> {
        let configuration = Arc::new(self.source.fetch_configuration()?);
        self.store.set_configuration(configuration.clone());
        Ok(configuration)
    }

    /// Spawn the background refresh loop on `runner`. Performs an initial fetch before
    /// returning, so decisions made right after a successful `start()` see a configuration.
    ///
    /// When the refresh fails, the previously stored configuration stays active and the
    /// loop retries on the next tick. With a zero polling interval no thread is spawned
    /// and the configuration is only fetched once.
    pub fn start(&self, runner: &ExecGroup) -> std::io::Result<()> {
        if let Err(err) = self.refresh() {
            log::error!(target: "flagship", "initial bucketing fetch failed: {}", err);
        }

        if self.config.polling_interval.is_zero() {
            return Ok(());
        }

        let engine = self.clone();
        runner.spawn("flagship-bucketing-poller", move |shutdown| loop {
            let timeout = jitter(engine.config.polling_interval, engine.config.polling_jitter);
            if shutdown.wait_timeout(timeout) {
                return;
            }
            if let Err(err) = engine.refresh() {
                log::warn!(target: "flagship", "failed to refresh bucketing configuration: {}", err);
            }
        })
    }

    /// Evaluate every campaign for the visitor and return the decisions.
    ///
    /// Campaigns whose targeting doesn't match the visitor are omitted. Within a campaign,
    /// variation groups are scanned in order and the first matching group wins; the visitor
    /// is then deterministically hashed into one of the group's variations. When the
    /// environment is in panic mode the response carries no campaigns at all.
    ///
    /// If no configuration has ever been loaded, one is fetched synchronously first and
    /// that fetch's error is propagated.
    pub fn get_modifications(&self, visitor_id: &str, context: &Context) -> Result<DecisionResponse> {
        let configuration = match self.store.get_configuration() {
            Some(configuration) => configuration,
            None => {
                log::debug!(target: "flagship", "no bucketing configuration loaded, fetching on demand");
                self.refresh()?
            }
        };

        let mut response = DecisionResponse {
            visitor_id: visitor_id.to_owned(),
            panic: configuration.panic,
            ..DecisionResponse::default()
        };

        if configuration.panic {
            log::warn!(target: "flagship", "environment is in panic mode, all campaigns are disabled");
            return Ok(response);
        }

        for campaign in &configuration.campaigns {
            let Some(group) = campaign
                .variation_groups
                .iter()
                .find(|group| targeting::targeting_match(group, visitor_id, context))
            else {
                continue;
            };

            let variation = match allocation::allocate_variation(group, visitor_id) {
                Ok(variation) => variation,
                Err(err) => {
                    log::debug!(target: "flagship", "skipping campaign {}: {}", campaign.id, err);
                    continue;
                }
            };

            response.campaigns.push(CampaignDecision {
                id: campaign.id.clone(),
                variation_group_id: group.id.clone(),
                variation: VariationDecision {
                    id: variation.id.clone(),
                    reference: variation.reference,
                    modifications: variation.modifications.clone(),
                },
            });
        }

        Ok(response)
    }
}

/// Apply randomized `jitter` to `interval`.
fn jitter(interval: Duration, jitter: Duration) -> Duration {
    Duration::saturating_sub(interval, thread_rng().gen_range(Duration::ZERO..=jitter))
}


#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::decision::Modifications;
    use crate::Error;

    /// A configuration source backed by a mutable in-memory result.
    struct StaticSource {
        result: Mutex<Result<Configuration>>,
        fetches: Mutex<u32>,
    }

    impl StaticSource {
        fn new(configuration: Configuration) -> Arc<StaticSource> {
            Arc::new(StaticSource {
                result: Mutex::new(Ok(configuration)),
                fetches: Mutex::new(0),
            })
        }

        fn failing() -> Arc<StaticSource> {
            Arc::new(StaticSource {
                result: Mutex::new(Err(Error::UnexpectedStatus {
                    status: 500,
                    url: "http://test".to_owned(),
                })),
                fetches: Mutex::new(0),
            })
        }

        fn set(&self, result: Result<Configuration>) {
            *self.result.lock().unwrap() = result;
        }

        fn fetches(&self) -> u32 {
            *self.fetches.lock().unwrap()
        }
    }

    impl ConfigurationSource for StaticSource {
        fn fetch_configuration(&self) -> Result<Configuration> {
            *self.fetches.lock().unwrap() += 1;
            self.result.lock().unwrap().clone()
        }
    }

    fn engine_with(configuration: Configuration) -> Engine {
        let engine = Engine::new(StaticSource::new(configuration), EngineConfig::new());
        engine.load().unwrap();
        engine
    }

    fn all_users_group(id: &str, variations: Vec<Variation>) -> VariationGroup {
        VariationGroup {
            id: id.to_owned(),
            targeting: Targeting {
                targeting_groups: vec![TargetingGroup {
                    targetings: vec![TargetingRule {
                        operator: TargetingOperator::Equals,
                        key: "fs_all_users".to_owned(),
                        value: "".into(),
                    }],
                }],
            },
            variations,
        }
    }

    fn full_variation(id: &str) -> Variation {
        Variation {
            id: id.to_owned(),
            allocation: 100,
            reference: false,
            modifications: Modifications {
                kind: "FLAG".to_owned(),
                value: HashMap::from([("btn".to_owned(), serde_json::json!("blue"))]),
            },
        }
    }

    #[test]
    fn fetches_on_demand_when_never_loaded() {
        let source = StaticSource::new(Configuration::default());
        let engine = Engine::new(source.clone(), EngineConfig::new());

        let response = engine.get_modifications("visitor_1", &HashMap::new()).unwrap();
        assert_eq!(response.visitor_id, "visitor_1");
        assert!(response.campaigns.is_empty());
        assert!(!response.panic);
        assert_eq!(source.fetches(), 1);

        // The on-demand fetch is only for the very first decision.
        let _ = engine.get_modifications("visitor_1", &HashMap::new()).unwrap();
        assert_eq!(source.fetches(), 1);
    }

    #[test]
    fn load_propagates_fetch_errors() {
        let engine = Engine::new(StaticSource::failing(), EngineConfig::new());
        assert!(engine.load().is_err());
    }

    #[test]
    fn decisions_surface_errors_until_a_load_succeeds() {
        let source = StaticSource::failing();
        let engine = Engine::new(source.clone(), EngineConfig::new());

        assert!(engine.get_modifications("visitor_1", &HashMap::new()).is_err());
        assert!(engine.get_modifications("visitor_1", &HashMap::new()).is_err());

        source.set(Ok(Configuration::default()));
        assert!(engine.get_modifications("visitor_1", &HashMap::new()).is_ok());
    }

    #[test]
    fn decides_matching_campaigns() {
        let engine = engine_with(Configuration {
            panic: false,
            campaigns: vec![Campaign {
                id: "campaign_1".to_owned(),
                variation_groups: vec![all_users_group("vg_1", vec![full_variation("v_1")])],
            }],
        });

        let response = engine.get_modifications("visitor_1", &HashMap::new()).unwrap();
        assert_eq!(response.campaigns.len(), 1);

        let decision = &response.campaigns[0];
        assert_eq!(decision.id, "campaign_1");
        assert_eq!(decision.variation_group_id, "vg_1");
        assert_eq!(decision.variation.id, "v_1");
        assert_eq!(
            decision.variation.modifications.value["btn"],
            serde_json::json!("blue")
        );
    }

    #[test]
    fn panic_mode_suppresses_all_campaigns() {
        let engine = engine_with(Configuration {
            panic: true,
            campaigns: vec![Campaign {
                id: "campaign_1".to_owned(),
                variation_groups: vec![all_users_group("vg_1", vec![full_variation("v_1")])],
            }],
        });

        let response = engine.get_modifications("visitor_1", &HashMap::new()).unwrap();
        assert!(response.panic);
        assert!(response.campaigns.is_empty());
    }

    #[test]
    fn targeting_filters_campaigns() {
        let targeted_group = VariationGroup {
            id: "vg_1".to_owned(),
            targeting: Targeting {
                targeting_groups: vec![TargetingGroup {
                    targetings: vec![TargetingRule {
                        operator: TargetingOperator::Equals,
                        key: "test".to_owned(),
                        value: true.into(),
                    }],
                }],
            },
            variations: vec![full_variation("v_1")],
        };
        let engine = engine_with(Configuration {
            panic: false,
            campaigns: vec![Campaign {
                id: "campaign_1".to_owned(),
                variation_groups: vec![targeted_group],
            }],
        });

        let matching: Context = HashMap::from([("test".to_owned(), true.into())]);
        let response = engine.get_modifications("visitor_1", &matching).unwrap();
        assert_eq!(response.campaigns.len(), 1);

        let not_matching: Context = HashMap::from([("test".to_owned(), false.into())]);
        let response = engine.get_modifications("visitor_1", &not_matching).unwrap();
        assert!(response.campaigns.is_empty());

        let response = engine.get_modifications("visitor_1", &HashMap::new()).unwrap();
        assert!(response.campaigns.is_empty());
    }

    #[test]
    fn first_matching_group_wins() {
        let engine = engine_with(Configuration {
            panic: false,
            campaigns: vec![Campaign {
                id: "campaign_1".to_owned(),
                variation_groups: vec![
                    all_users_group("vg_first", vec![full_variation("v_first")]),
                    all_users_group("vg_second", vec![full_variation("v_second")]),
                ],
            }],
        });

        let response = engine.get_modifications("visitor_1", &HashMap::new()).unwrap();
        assert_eq!(response.campaigns.len(), 1);
        assert_eq!(response.campaigns[0].variation_group_id, "vg_first");
    }

    #[test]
    fn decisions_are_idempotent() {
        let engine = engine_with(Configuration {
            panic: false,
            campaigns: vec![Campaign {
                id: "campaign_1".to_owned(),
                variation_groups: vec![all_users_group(
                    "vg_1",
                    vec![
                        Variation {
                            id: "a".to_owned(),
                            allocation: 50,
                            ..Variation::default()
                        },
                        Variation {
                            id: "b".to_owned(),
                            allocation: 50,
                            ..Variation::default()
                        },
                    ],
                )],
            }],
        });

        let first = engine.get_modifications("visitor_1", &HashMap::new()).unwrap();
        for _ in 0..10 {
            let again = engine.get_modifications("visitor_1", &HashMap::new()).unwrap();
            assert_eq!(first, again);
        }
    }

    #[test]
    fn unallocated_visitors_skip_the_campaign() {
        // Zero allocation, so every visitor falls outside the buckets.
        let engine = engine_with(Configuration {
            panic: false,
            campaigns: vec![Campaign {
                id: "campaign_1".to_owned(),
                variation_groups: vec![all_users_group("vg_1", vec![])],
            }],
        });

        let response = engine.get_modifications("visitor_1", &HashMap::new()).unwrap();
        assert!(response.campaigns.is_empty());
    }

    #[test]
    fn failed_refresh_keeps_previous_configuration() {
        let source = StaticSource::new(Configuration {
            panic: false,
            campaigns: vec![Campaign {
                id: "campaign_1".to_owned(),
                variation_groups: vec![all_users_group("vg_1", vec![full_variation("v_1")])],
            }],
        });
        let engine = Engine::new(source.clone(), EngineConfig::new());
        engine.load().unwrap();

        source.set(Err(Error::UnexpectedStatus {
            status: 500,
            url: "http://test".to_owned(),
        }));
        assert!(engine.load().is_err());

        // Decisions still come from the last good configuration.
        let response = engine.get_modifications("visitor_1", &HashMap::new()).unwrap();
        assert_eq!(response.campaigns.len(), 1);
    }

    #[test]
    fn start_with_zero_interval_fetches_once() {
        let source = StaticSource::new(Configuration::default());
        let engine = Engine::new(
            source.clone(),
            EngineConfig::new().with_polling_interval(Duration::ZERO),
        );

        let runner = ExecGroup::new();
        engine.start(&runner).unwrap();
        runner.terminate_and_wait();

        assert_eq!(source.fetches(), 1);
    }

    #[test]
    fn polling_refreshes_configuration() {
        let source = StaticSource::new(Configuration::default());
        let engine = Engine::new(
            source.clone(),
            EngineConfig::new()
                .with_polling_interval(Duration::from_millis(10))
                .with_polling_jitter(Duration::ZERO),
        );

        let runner = ExecGroup::new();
        engine.start(&runner).unwrap();
        std::thread::sleep(Duration::from_millis(100));
        runner.terminate_and_wait();

        assert!(source.fetches() > 1);
    }
}
