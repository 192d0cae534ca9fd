//! Read-only summary of the persisted controller state.

use orbit_state::StateStore;
use serde_json::{Value, json};

/// Tenants, applications with their deployments, platform versions and the
/// length of the DNS queue, as JSON.
pub fn summary(store: &StateStore) -> anyhow::Result<Value> {
    let tenants: Vec<Value> = store
        .read_tenants()?
        .iter()
        .map(|tenant| {
            json!({
                "name": tenant.name().to_string(),
                "type": tenant.type_name(),
                "created_at": tenant.created_at(),
            })
        })
        .collect();

    let applications: Vec<Value> = store
        .read_applications()?
        .iter()
        .map(|application| {
            let instances: Vec<Value> = application
                .instances()
                .values()
                .map(|instance| {
                    let deployments: Vec<Value> = instance
                        .deployments()
                        .values()
                        .map(|deployment| {
                            json!({
                                "zone": deployment.zone.to_string(),
                                "version": deployment.version.to_string(),
                                "revision": deployment.revision.to_string(),
                            })
                        })
                        .collect();
                    json!({
                        "name": instance.name().to_string(),
                        "deployments": deployments,
                        "rotations": instance.rotations().len(),
                    })
                })
                .collect();
            json!({
                "id": application.id().serialized_form(),
                "revisions": application.revisions().len(),
                "instances": instances,
            })
        })
        .collect();

    let versions: Vec<Value> = store
        .read_version_status()?
        .versions()
        .iter()
        .map(|v| {
            json!({
                "version": v.version.to_string(),
                "confidence": format!("{:?}", v.confidence),
                "system": v.is_system_version,
            })
        })
        .collect();

    Ok(json!({
        "tenants": tenants,
        "applications": applications,
        "versions": versions,
        "name_service_queue": store.read_name_service_queue()?.len(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_store_summary() {
        let store = StateStore::open_in_memory().unwrap();
        let summary = summary(&store).unwrap();
        assert_eq!(summary["tenants"], json!([]));
        assert_eq!(summary["applications"], json!([]));
        assert_eq!(summary["name_service_queue"], json!(0));
    }
}
