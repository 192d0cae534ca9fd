//! Names an endpoint certificate must cover.

use orbit_core::{ClusterId, DeploymentId, DeploymentSpec, EndpointId};
use sha2::{Digest, Sha256};

use crate::endpoint;

/// Longest common name a certificate accepts.
pub const MAX_COMMON_NAME_LENGTH: usize = 64;

/// A short, stable common name for a deployment's certificate:
/// `v<hash>.<suffix>`, where the hash is cut to fit the name in
/// [`MAX_COMMON_NAME_LENGTH`] characters. The configured suffix is at most
/// [`MAX_DNS_SUFFIX_LENGTH`](orbit_core::config::MAX_DNS_SUFFIX_LENGTH) long.
pub fn common_name(deployment: &DeploymentId, dns_suffix: &str) -> String {
    let digest = Sha256::digest(
        format!("{}:{}", deployment.instance.serialized_form(), deployment.zone).as_bytes(),
    );
    let hash = hex::encode(digest);
    let room = MAX_COMMON_NAME_LENGTH.saturating_sub(dns_suffix.len() + 2);
    let hash = &hash[..room.min(32)];
    format!("v{hash}.{dns_suffix}")
}

/// Every name a deployment's certificate must list: the common name, then
/// each endpoint name the deployment may serve with a wildcard sibling
/// covering non-default clusters and endpoint ids.
pub fn dns_names(deployment: &DeploymentId, spec: &DeploymentSpec, dns_suffix: &str) -> Vec<String> {
    let default_cluster = ClusterId::default_id();
    let mut names = vec![common_name(deployment, dns_suffix)];
    let mut with_wildcard = |name: String| {
        names.push(format!("*.{name}"));
        names.push(name);
    };

    with_wildcard(endpoint::zone_name(deployment, &default_cluster, dns_suffix));
    if deployment.zone.environment.is_production() {
        with_wildcard(endpoint::region_name(deployment, &default_cluster, dns_suffix));
        with_wildcard(endpoint::global_name(
            &deployment.instance,
            &EndpointId::default_id(),
            dns_suffix,
        ));
        let region = &deployment.zone.region;
        let has_application_endpoint = spec.endpoints().iter().any(|declared| {
            declared.targets.iter().any(|t| {
                &t.region == region && t.instance == deployment.instance.instance
            })
        });
        if has_application_endpoint {
            // Application names always carry the endpoint id, so only the
            // wildcard applies.
            let default_app_name = endpoint::application_name(
                &deployment.application_id(),
                &EndpointId::default_id(),
                dns_suffix,
            );
            if let Some((_, rest)) = default_app_name.split_once('.') {
                names.push(format!("*.{rest}"));
            }
        }
    }
    names.dedup();
    names
}

/// Whether `name` is covered by one of `names`, honouring single-label
/// wildcards.
pub fn covers(names: &[String], name: &str) -> bool {
    names.iter().any(|pattern| match pattern.strip_prefix("*.") {
        Some(parent) => name
            .split_once('.')
            .is_some_and(|(label, rest)| !label.is_empty() && rest == parent),
        None => pattern == name,
    })
}
