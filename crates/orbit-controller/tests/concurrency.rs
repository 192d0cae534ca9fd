//! Deployments racing each other from several threads.

mod common;

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use common::*;
use orbit_controller::testing::RecordingDeployer;
use orbit_controller::{ControllerResult, Deployer, DeploymentRequest, DeploymentResult};
use orbit_core::{DeploymentId, InstanceName};
use orbit_routing::LoadBalancer;
use orbit_state::StateStore;

#[test]
fn one_deployment_per_job_at_a_time() {
    let h = Harness::with_deployer(RecordingDeployer::with_delay(Duration::from_millis(50)));
    let revision = h.setup(&["us-east"]);
    let job = h.start_run(&prod("us-east"), revision);

    thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| h.applications.deploy(&job, false).unwrap());
        }
    });

    assert_eq!(h.deployer.max_in_flight(), 1);
    assert_eq!(h.deployer.deployed().len(), 4);
    let application = h.applications.require(&application_id()).unwrap();
    let instance = application.instance(&InstanceName::default_name()).unwrap();
    assert!(instance.deployment(&prod("us-east")).is_some());
}

#[test]
fn zones_deploy_side_by_side() {
    let h = Harness::with_deployer(RecordingDeployer::with_delay(Duration::from_millis(20)));
    let revision = h.setup(&["us-east", "eu-west"]);
    let east = h.start_run(&prod("us-east"), revision);
    let west = h.start_run(&prod("eu-west"), revision);

    thread::scope(|scope| {
        scope.spawn(|| h.applications.deploy(&east, false).unwrap());
        scope.spawn(|| h.applications.deploy(&west, false).unwrap());
    });

    let application = h.applications.require(&application_id()).unwrap();
    let instance = application.instance(&InstanceName::default_name()).unwrap();
    assert!(instance.deployment(&prod("us-east")).is_some());
    assert!(instance.deployment(&prod("eu-west")).is_some());
    assert_eq!(instance.rotations().len(), 1);
}

/// Notes which locks are held while the deployer runs.
struct LockObserver {
    store: StateStore,
    inner: Arc<RecordingDeployer>,
    observed: Mutex<Vec<(bool, bool)>>,
}

impl Deployer for LockObserver {
    fn deploy(&self, request: DeploymentRequest<'_>) -> ControllerResult<DeploymentResult> {
        let application = format!("/applications/{}", application_id().serialized_form());
        let deployment = format!(
            "/deployments/{}/{}",
            request.instance.serialized_form(),
            request.zone
        );
        let locks = self.store.locks();
        self.observed
            .lock()
            .unwrap()
            .push((locks.is_held(&application), locks.is_held(&deployment)));
        self.inner.deploy(request)
    }

    fn deactivate(&self, deployment: &DeploymentId) -> ControllerResult<()> {
        self.inner.deactivate(deployment)
    }

    fn load_balancers(&self, deployment: &DeploymentId) -> Vec<LoadBalancer> {
        self.inner.load_balancers(deployment)
    }
}

#[test]
fn application_lock_is_released_while_deploying() {
    let observer = Arc::new(Mutex::new(None::<Arc<LockObserver>>));
    let h = Harness::wrapping(RecordingDeployer::new(), |store, inner| {
        let deployer = Arc::new(LockObserver {
            store,
            inner,
            observed: Mutex::new(Vec::new()),
        });
        *observer.lock().unwrap() = Some(deployer.clone());
        deployer as Arc<dyn Deployer>
    });
    let revision = h.setup(&["us-east"]);
    h.deploy(&prod("us-east"), revision);

    let observer = observer.lock().unwrap().clone().unwrap();
    let observed = observer.observed.lock().unwrap().clone();
    assert_eq!(observed, vec![(false, true)]);
}
