//! Broker connection lifecycle integration tests.
//!
//! Runs the connection manager against a local mock broker:
//! - connect, publish and traffic logging
//! - inbound messages reach the traffic log
//! - reconnect after the broker drops the connection
//! - graceful close

mod common;
use common::mock_broker::MockBroker;
use common::wait_until;

use ledlink_core::Direction;
use ledlink_mqtt::{
    BrokerConfig, ConnectionManager, ConnectionState, MqttError, PublishOptions,
};
use ledlink_store::{Page, Store, Table};
use std::sync::Arc;
use std::time::Duration;

fn config(port: u16) -> BrokerConfig {
    BrokerConfig {
        host: "127.0.0.1".to_string(),
        port,
        use_tls: false,
        connect_timeout_secs: 5,
        reconnect_delay_secs: 1,
        close_timeout_secs: 2,
        subscribe_topics: vec!["home/led/status".to_string()],
        ..Default::default()
    }
}

async fn connected_manager(broker: &MockBroker) -> (Arc<ConnectionManager>, Arc<Store>) {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let manager = Arc::new(ConnectionManager::new(config(broker.port()), store.clone()).unwrap());
    manager.connect().await.unwrap();
    (manager, store)
}

#[tokio::test]
async fn test_connect_publish_and_close() {
    let broker = MockBroker::start().await;
    let (manager, store) = connected_manager(&broker).await;

    assert_eq!(manager.state(), ConnectionState::Connected);
    assert_eq!(broker.connection_count(), 1);

    manager
        .publish("home/weather/led", "Temp: 30C Clear H:60%", PublishOptions::default())
        .await
        .unwrap();

    let logs = store.log_history(Page::default(), None).unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].record.direction, Direction::Publish);

    manager.close().await.unwrap();
    assert_eq!(manager.state(), ConnectionState::Disconnected);

    let err = manager
        .publish("home/weather/led", "late", PublishOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, MqttError::NotConnected { .. }));
    assert_eq!(store.count(Table::Logs).unwrap(), 1);

    broker.shutdown();
}

#[tokio::test]
async fn test_inbound_message_is_logged() {
    let broker = MockBroker::start().await;
    let (manager, store) = connected_manager(&broker).await;

    broker.publish("home/led/status", "online");

    let logged = wait_until(Duration::from_secs(3), || {
        store.count_logs("home/led/status").unwrap_or(0) == 1
    })
    .await;
    assert!(logged, "inbound message was not logged");

    let logs = store
        .log_history(Page::default(), Some("home/led/status"))
        .unwrap();
    assert_eq!(logs[0].record.direction, Direction::Subscribe);
    assert_eq!(logs[0].record.payload, "online");

    manager.close().await.unwrap();
    broker.shutdown();
}

#[tokio::test]
async fn test_reconnects_after_broker_drop() {
    let broker = MockBroker::start().await;
    let (manager, _store) = connected_manager(&broker).await;

    broker.drop_clients();

    let lost = wait_until(Duration::from_secs(3), || {
        manager.state() == ConnectionState::Reconnecting
    })
    .await;
    assert!(lost, "connection loss was not detected");
    assert!(manager.status().last_error.is_some());

    let restored = wait_until(Duration::from_secs(5), || {
        manager.state() == ConnectionState::Connected && broker.connection_count() == 2
    })
    .await;
    assert!(restored, "connection was not restored");
    assert!(manager.status().last_error.is_none());

    manager.close().await.unwrap();
    broker.shutdown();
}

#[tokio::test]
async fn test_second_connect_is_rejected() {
    let broker = MockBroker::start().await;
    let (manager, _store) = connected_manager(&broker).await;

    assert!(matches!(manager.connect().await, Err(MqttError::Connect(_))));
    assert_eq!(manager.state(), ConnectionState::Connected);

    manager.close().await.unwrap();
    broker.shutdown();
}
