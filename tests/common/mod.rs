// Shared fixtures for integration tests
#![allow(dead_code)]

use nexstar_rs::{Config, Mount, SimulatedMount};

pub async fn connected_mount() -> (Mount, SimulatedMount) {
    connected_mount_with(Config::default(), SimulatedMount::new()).await
}

pub async fn connected_mount_with(config: Config, sim: SimulatedMount) -> (Mount, SimulatedMount) {
    let mount = Mount::new(config);
    mount
        .connect_with(Box::new(sim.clone()))
        .await
        .expect("simulated mount connects");
    (mount, sim)
}
