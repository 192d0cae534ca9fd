//! Per-zone routing configuration.

use std::collections::BTreeMap;

use orbit_core::config::ZoneConfig;
use orbit_core::{OrbitConfig, RoutingMethod, ZoneId};

/// Routing methods and VIPs of the configured zones.
///
/// Zones missing from the configuration route exclusively and have no VIP.
#[derive(Debug, Clone, Default)]
pub struct ZoneRouting {
    zones: BTreeMap<ZoneId, ZoneConfig>,
}

impl ZoneRouting {
    pub fn new(zones: impl IntoIterator<Item = ZoneConfig>) -> Self {
        Self {
            zones: zones.into_iter().map(|z| (z.id(), z)).collect(),
        }
    }

    pub fn from_config(config: &OrbitConfig) -> Self {
        Self::new(config.zones.iter().cloned())
    }

    /// Methods the zone supports, in order of preference.
    pub fn routing_methods(&self, zone: &ZoneId) -> Vec<RoutingMethod> {
        match self.zones.get(zone) {
            Some(config) if !config.routing_methods.is_empty() => config.routing_methods.clone(),
            _ => vec![RoutingMethod::Exclusive],
        }
    }

    /// The method zone and region endpoints of the zone use.
    pub fn primary_method(&self, zone: &ZoneId) -> RoutingMethod {
        self.routing_methods(zone)
            .first()
            .copied()
            .unwrap_or(RoutingMethod::Exclusive)
    }

    pub fn vip_hostname(&self, zone: &ZoneId) -> Option<&str> {
        self.zones.get(zone).and_then(|z| z.vip_hostname.as_deref())
    }
}
