use crate::config::MqttConf;
use crate::health::HealthTracker;
use crate::publish::SnapshotHandle;
use crate::snapshot::Snapshot;
use crate::views;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use std::time::Duration;
use tokio::task;
use tracing::{debug, info, warn};

pub const SUMMARY_TOPIC: &str = "netmap/status/summary@v1";

pub fn summary_payload(snapshot: &Snapshot) -> Result<String, serde_json::Error> {
    serde_json::to_string(&views::summary(snapshot))
}

/// Publie le résumé (retenu) à chaque snapshot publié
pub fn spawn_summary_publisher(snapshots: SnapshotHandle, cfg: MqttConf, health: HealthTracker) {
    task::spawn(async move {
        let mut opts = MqttOptions::new("netmap-kernel", &cfg.host, cfg.port);
        opts.set_keep_alive(Duration::from_secs(15));
        let (client, mut eventloop) = AsyncClient::new(opts, 10);
        let mut versions = snapshots.subscribe();
        health.mark_mqtt_connecting();
        info!("[mqtt] summary publisher -> {}:{} on {SUMMARY_TOPIC}", cfg.host, cfg.port);

        loop {
            tokio::select! {
                changed = versions.changed() => {
                    if changed.is_err() {
                        debug!("[mqtt] snapshot store dropped, stopping publisher");
                        break;
                    }
                    let snapshot = snapshots.get_snapshot();
                    match summary_payload(&snapshot) {
                        Ok(payload) => {
                            if let Err(e) = client.publish(SUMMARY_TOPIC, QoS::AtLeastOnce, true, payload).await {
                                warn!("[mqtt] failed to publish summary v{}: {e:?}", snapshot.version);
                            } else {
                                debug!("[mqtt] published summary v{}", snapshot.version);
                            }
                        }
                        Err(e) => warn!("[mqtt] cannot encode summary: {e}"),
                    }
                }
                event = eventloop.poll() => {
                    match event {
                        Ok(Event::Incoming(Incoming::ConnAck(_))) => health.mark_mqtt_connected(),
                        Ok(_) => {}
                        Err(e) => {
                            warn!("[mqtt] connection error: {e:?}");
                            health.increment_reconnects();
                            tokio::time::sleep(Duration::from_secs(2)).await;
                        }
                    }
                }
            }
        }
    });
}
