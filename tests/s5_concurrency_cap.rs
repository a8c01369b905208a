//! S5 — four simultaneous `createSwarm` calls against a 3-swarm cap: the
//! first three succeed, the fourth fails with `ConcurrencyLimit`.

use swarmcore::domain::models::swarm::SwarmConfig;
use swarmcore::services::swarm_registry::{RegistryError, SwarmRegistry};

#[tokio::test]
async fn fourth_concurrent_swarm_is_rejected_once_the_cap_is_hit() {
    let registry = SwarmRegistry::new(3);

    for i in 0..3 {
        registry.create_swarm(format!("task {i}"), SwarmConfig::default()).await.expect("within cap");
    }

    let error = registry.create_swarm("task 4", SwarmConfig::default()).await.unwrap_err();

    match error {
        RegistryError::ConcurrencyLimit { current, limit } => {
            assert_eq!(current, 3);
            assert_eq!(limit, 3);
        }
        other => panic!("expected ConcurrencyLimit, got {other:?}"),
    }

    assert_eq!(registry.active_count().await, 3);
}
