use std::sync::Arc;
use std::time::Duration;

use brainwire_core::connection::{ChannelServer, ServerEnd};
use brainwire_core::{
    ChannelTransport, ClientCommand, ConnectionState, LiveIndicator, MetricTopic, MetricUpdate,
    NotificationCategory, NotificationEvent, NotificationFilter, QueueEvent, RealtimeConfig,
    RealtimeProvider, Result, ServerMessage, Severity, SubscriptionOptions,
};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};

const WAIT: Duration = Duration::from_secs(600);

fn provider_with(config: RealtimeConfig) -> Result<(RealtimeProvider, ChannelServer)> {
    let (transport, server) = ChannelTransport::pair();
    let provider = RealtimeProvider::new(config, Arc::new(transport))?;
    Ok((provider, server))
}

async fn accept(server: &mut ChannelServer) -> ServerEnd {
    time::timeout(WAIT, server.accept())
        .await
        .expect("timeout waiting for connection")
        .expect("transport dropped")
}

async fn next_subscribe(end: &mut ServerEnd) -> SubscriptionOptions {
    match time::timeout(WAIT, end.recv_non_ping())
        .await
        .expect("timeout waiting for command")
    {
        Some(ClientCommand::Subscribe(options)) => options,
        other => panic!("expected subscribe, got {:?}", other),
    }
}

async fn wait_for_state(provider: &RealtimeProvider, state: ConnectionState) {
    let mut status = provider.watch_status();
    time::timeout(WAIT, status.wait_for(|s| s.state == state))
        .await
        .expect("timeout waiting for state")
        .expect("status channel closed");
}

fn metric(topic: &str, value: serde_json::Value) -> ServerMessage {
    ServerMessage::MetricUpdate(MetricUpdate {
        topic: topic.to_string(),
        value,
        timestamp: None,
    })
}

#[tokio::test(start_paused = true)]
async fn merged_subscription_is_sent_on_connect() -> Result<()> {
    let (provider, mut server) = provider_with(RealtimeConfig::default())?;
    assert_eq!(provider.indicator(), LiveIndicator::Offline);
    provider.start()?;

    let mut end = accept(&mut server).await;
    let options = next_subscribe(&mut end).await;
    assert!(options.metrics.contains(&MetricTopic::Dashboard));
    assert!(options.notifications);
    assert_eq!(options.categories.len(), NotificationCategory::ALL.len());

    wait_for_state(&provider, ConnectionState::Connected).await;
    assert_eq!(provider.indicator(), LiveIndicator::Live);
    assert!(provider.status().last_connected_at.is_some());

    provider.shutdown().await;
    assert_eq!(provider.indicator(), LiveIndicator::Offline);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn campaign_updates_reach_cache_and_listener() -> Result<()> {
    let (provider, mut server) = provider_with(RealtimeConfig::default())?;
    provider.start()?;
    let mut end = accept(&mut server).await;
    next_subscribe(&mut end).await;

    let _campaigns =
        provider.subscribe(SubscriptionOptions::default().with_metrics([MetricTopic::Campaigns]));
    let options = next_subscribe(&mut end).await;
    assert!(options.metrics.contains(&MetricTopic::Campaigns));
    assert!(options.metrics.contains(&MetricTopic::Dashboard));

    let (tx, mut rx) = mpsc::unbounded_channel();
    provider.metrics().on_update(move |sample| {
        let _ = tx.send(sample.value.clone());
    });

    end.send(&metric("campaigns", json!(24)));
    assert_eq!(rx.recv().await, Some(json!(24)));
    assert_eq!(provider.metrics().value("campaigns"), Some(json!(24)));

    end.send(&metric("campaigns", json!(31)));
    assert_eq!(rx.recv().await, Some(json!(31)));
    assert_eq!(provider.metrics().value("campaigns"), Some(json!(31)));
    assert_eq!(provider.metrics().len(), 1);

    provider.shutdown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn subscription_is_resent_after_reconnect() -> Result<()> {
    let (provider, mut server) = provider_with(RealtimeConfig::default())?;
    let _leads =
        provider.subscribe(SubscriptionOptions::default().with_metrics([MetricTopic::Leads]));
    provider.start()?;

    let mut end = accept(&mut server).await;
    let first = next_subscribe(&mut end).await;
    wait_for_state(&provider, ConnectionState::Connected).await;

    let dropped_at = Instant::now();
    drop(end);
    wait_for_state(&provider, ConnectionState::Reconnecting).await;
    assert_eq!(provider.indicator(), LiveIndicator::Polling);

    let mut end = accept(&mut server).await;
    assert!(Instant::now() - dropped_at >= Duration::from_secs(1));
    let second = next_subscribe(&mut end).await;
    assert_eq!(first, second);
    assert!(second.metrics.contains(&MetricTopic::Leads));

    wait_for_state(&provider, ConnectionState::Connected).await;
    let stats = provider.stats();
    assert_eq!(stats.connects, 2);
    assert_eq!(stats.reconnects, 1);

    provider.shutdown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn unchanged_subscription_sends_nothing() -> Result<()> {
    let (provider, mut server) = provider_with(RealtimeConfig::default())?;
    provider.start()?;
    let mut end = accept(&mut server).await;
    next_subscribe(&mut end).await;

    // Dashboard is already in the default subscription
    let same =
        provider.subscribe(SubscriptionOptions::default().with_metrics([MetricTopic::Dashboard]));
    same.update(SubscriptionOptions::default().with_metrics([MetricTopic::Dashboard]));

    let _social =
        provider.subscribe(SubscriptionOptions::default().with_metrics([MetricTopic::SocialMedia]));
    let next = next_subscribe(&mut end).await;
    assert!(next.metrics.contains(&MetricTopic::SocialMedia));
    assert!(end.drain().iter().all(|c| matches!(c, ClientCommand::Ping { .. })));

    provider.shutdown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn unsubscribe_keeps_topics_other_consumers_want() -> Result<()> {
    let config = RealtimeConfig {
        default_subscription: SubscriptionOptions::empty(),
        ..RealtimeConfig::default()
    };
    let (provider, mut server) = provider_with(config)?;
    provider.start()?;
    let mut end = accept(&mut server).await;
    assert!(next_subscribe(&mut end).await.is_empty());

    let pipeline = provider.subscribe(
        SubscriptionOptions::default().with_metrics([MetricTopic::Leads, MetricTopic::AiAgents]),
    );
    next_subscribe(&mut end).await;
    let _board =
        provider.subscribe(SubscriptionOptions::default().with_metrics([MetricTopic::Leads]));
    // Leads was already wanted: union unchanged, nothing sent

    pipeline.unsubscribe();
    let merged = next_subscribe(&mut end).await;
    assert!(merged.metrics.contains(&MetricTopic::Leads));
    assert!(!merged.metrics.contains(&MetricTopic::AiAgents));

    provider.shutdown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn error_notification_toasts_then_stays_in_center() -> Result<()> {
    let (provider, mut server) = provider_with(RealtimeConfig::default())?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    provider.notifications().on_change(move |event| {
        let _ = tx.send(event.clone());
    });
    provider.start()?;
    let end = accept(&mut server).await;

    end.send(&ServerMessage::Notification(
        NotificationEvent::new("Payment failed", "Card ending 4242 was declined")
            .with_id("pay-1")
            .with_severity(Severity::Error)
            .with_category(NotificationCategory::Payment),
    ));
    match rx.recv().await {
        Some(QueueEvent::Added(n)) => assert_eq!(n.id, "pay-1"),
        other => panic!("unexpected event {:?}", other),
    }

    let toasts = provider.notifications().toasts();
    assert_eq!(toasts.len(), 1);
    assert_eq!(toasts[0].severity, Severity::Error);
    assert_eq!(provider.notifications().unread_count(), 1);

    time::sleep(Duration::from_secs(5)).await;
    assert!(provider.notifications().toasts().is_empty());
    let center = provider.notifications().list(NotificationFilter::All);
    assert_eq!(center.len(), 1);
    assert!(!center[0].dismissed);
    assert_eq!(provider.notifications().unread_count(), 1);

    provider.shutdown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn auto_dismiss_fires_at_deadline_not_before() -> Result<()> {
    let (provider, mut server) = provider_with(RealtimeConfig::default())?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    provider.notifications().on_change(move |event| {
        let _ = tx.send(event.clone());
    });
    provider.start()?;
    let end = accept(&mut server).await;

    end.send(&ServerMessage::Notification(
        NotificationEvent::new("Campaign sent", "Spring promo delivered")
            .with_id("c-1")
            .with_category(NotificationCategory::Campaign)
            .auto_dismiss(Some(3_000)),
    ));
    assert!(matches!(rx.recv().await, Some(QueueEvent::Added(_))));
    let added_at = Instant::now();

    match rx.recv().await {
        Some(QueueEvent::Dismissed(id)) => assert_eq!(id, "c-1"),
        other => panic!("unexpected event {:?}", other),
    }
    assert!(Instant::now() - added_at >= Duration::from_millis(3_000));
    assert!(provider.notifications().get("c-1").unwrap().dismissed);
    assert_eq!(provider.notifications().unread_count(), 0);

    provider.shutdown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn silent_server_trips_heartbeat_timeout() -> Result<()> {
    let (provider, mut server) = provider_with(RealtimeConfig::default())?;
    provider.start()?;
    let mut first = accept(&mut server).await;
    let opened_at = Instant::now();

    // Client pings on its interval even while the server says nothing
    let ping = time::timeout(WAIT, async {
        loop {
            match first.recv().await {
                Some(ClientCommand::Ping { .. }) => return Instant::now(),
                Some(_) => continue,
                None => panic!("client closed before pinging"),
            }
        }
    })
    .await
    .expect("no ping");
    assert!(ping - opened_at >= Duration::from_secs(30));

    let _second = accept(&mut server).await;
    assert!(Instant::now() - opened_at >= Duration::from_secs(61));
    wait_for_state(&provider, ConnectionState::Connected).await;
    assert_eq!(provider.stats().reconnects, 1);

    provider.shutdown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn heartbeats_keep_connection_alive() -> Result<()> {
    let (provider, mut server) = provider_with(RealtimeConfig::default())?;
    provider.start()?;
    let end = accept(&mut server).await;

    for _ in 0..6 {
        time::sleep(Duration::from_secs(40)).await;
        assert!(end.send(&ServerMessage::Heartbeat { timestamp: None }));
    }
    time::sleep(Duration::from_secs(1)).await;

    assert_eq!(server.connect_attempts(), 1);
    assert_eq!(provider.status().state, ConnectionState::Connected);
    assert_eq!(provider.stats().heartbeats, 6);

    provider.shutdown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn malformed_frames_are_dropped_without_disconnecting() -> Result<()> {
    let (provider, mut server) = provider_with(RealtimeConfig::default())?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    provider.metrics().on_update(move |sample| {
        let _ = tx.send(sample.topic.clone());
    });
    provider.start()?;
    let end = accept(&mut server).await;

    end.send_raw("{not json");
    end.send_raw(r#"{"type":"mystery"}"#);
    end.send(&ServerMessage::Error {
        code: Some("rate_limited".into()),
        message: "slow down".into(),
    });
    end.send(&metric("leads", json!(3)));
    assert_eq!(rx.recv().await.as_deref(), Some("leads"));

    let stats = provider.stats();
    assert_eq!(stats.dropped_frames, 2);
    assert_eq!(stats.server_errors, 1);
    assert_eq!(stats.frames_received, 4);
    assert_eq!(provider.status().state, ConnectionState::Connected);
    assert_eq!(server.connect_attempts(), 1);

    provider.shutdown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn manual_reconnect_recovers_from_error() -> Result<()> {
    let config = RealtimeConfig {
        max_reconnect_attempts: 2,
        ..RealtimeConfig::default()
    };
    let (provider, mut server) = provider_with(config)?;
    server.set_refusing(true);
    provider.start()?;

    wait_for_state(&provider, ConnectionState::Error).await;
    assert_eq!(server.connect_attempts(), 3);
    assert_eq!(provider.indicator(), LiveIndicator::Offline);
    assert!(provider.status().last_error.is_some());

    server.set_refusing(false);
    assert!(provider.reconnect());
    let mut end = accept(&mut server).await;
    next_subscribe(&mut end).await;
    wait_for_state(&provider, ConnectionState::Connected).await;
    assert!(!provider.reconnect(), "ignored while connected");

    provider.shutdown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn reconnect_pressed_while_connecting_keeps_later_backoff() -> Result<()> {
    let (provider, mut server) = provider_with(RealtimeConfig::default())?;
    provider.start()?;
    assert!(!provider.reconnect(), "ignored while connecting");

    let end = accept(&mut server).await;
    wait_for_state(&provider, ConnectionState::Connected).await;
    for _ in 0..5 {
        time::sleep(Duration::from_secs(40)).await;
        assert!(end.send(&ServerMessage::Heartbeat { timestamp: None }));
    }

    let dropped_at = Instant::now();
    drop(end);
    let _end = accept(&mut server).await;
    assert!(Instant::now() - dropped_at >= Duration::from_secs(1));
    assert_eq!(server.connect_attempts(), 2);

    provider.shutdown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_connection_and_timers() -> Result<()> {
    let (provider, mut server) = provider_with(RealtimeConfig::default())?;
    provider.start()?;
    let mut end = accept(&mut server).await;

    end.send(&ServerMessage::Notification(
        NotificationEvent::new("Agent finished", "Summary ready")
            .with_id("a-1")
            .with_category(NotificationCategory::AiAgent)
            .auto_dismiss(Some(10_000)),
    ));
    next_subscribe(&mut end).await;
    time::sleep(Duration::from_millis(10)).await;
    assert!(provider.notifications().get("a-1").is_some());

    provider.shutdown().await;
    assert!(end.recv_raw().await.is_none(), "connection closed");

    time::sleep(Duration::from_secs(120)).await;
    assert_eq!(server.connect_attempts(), 1);
    assert!(!provider.notifications().get("a-1").unwrap().dismissed);
    assert_eq!(provider.status().state, ConnectionState::Disconnected);
    Ok(())
}
