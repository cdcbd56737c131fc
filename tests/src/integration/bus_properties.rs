//! # Bus Properties
//!
//! The delivery, retry and liveness guarantees checked end to end through the
//! public crate APIs, one scenario per guarantee.

#[cfg(test)]
mod tests {
    use crate::support::{collect, next_message, WAIT};
    use ib_liveness::{LivenessConfig, LivenessKeeper};
    use ib_retry::{retry_notify, RetryError, RetryPolicy};
    use ib_router::{request_handler_fn, MessageRouter, RESPONSE_CHANNEL};
    use serde_json::{json, Value};
    use shared_bus::{handler_fn, ChannelOptions, HandlerError, MessageBus};
    use shared_types::{Draft, InMemoryStore, Message};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::{timeout, Instant};

    #[tokio::test]
    async fn test_late_subscriber_sees_publish_order_without_duplicates() {
        let bus = MessageBus::new();
        bus.create_channel("ordered", ChannelOptions::persistent(100)).unwrap();
        for n in 0..50 {
            bus.publish("ordered", "n", json!(n)).unwrap();
        }

        let (_sub, mut rx) = collect(&bus, "ordered");
        for n in 50..60 {
            bus.publish("ordered", "n", json!(n)).unwrap();
        }

        for expected in 0..60 {
            assert_eq!(next_message(&mut rx).await.payload, json!(expected));
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_backlog_keeps_most_recent() {
        let bus = MessageBus::new();
        bus.create_channel("bounded", ChannelOptions::persistent(3)).unwrap();
        for tag in ["A", "B", "C", "D"] {
            bus.publish("bounded", tag, Value::Null).unwrap();
        }

        let (_sub, mut rx) = collect(&bus, "bounded");
        for tag in ["B", "C", "D"] {
            assert_eq!(next_message(&mut rx).await.message_type, tag);
        }
        assert_eq!(bus.stats().evicted, 1);
    }

    #[tokio::test]
    async fn test_transient_channel_delivers_only_live() {
        let bus = MessageBus::new();
        bus.create_channel("live", ChannelOptions::transient()).unwrap();
        let (_early, mut early_rx) = collect(&bus, "live");

        bus.publish("live", "X", Value::Null).unwrap();
        let (_late, mut late_rx) = collect(&bus, "live");

        assert_eq!(next_message(&mut early_rx).await.message_type, "X");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(late_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unsubscribed_handler_not_invoked() {
        let bus = MessageBus::new();
        bus.create_channel("ui", ChannelOptions::transient()).unwrap();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let sub = bus
            .subscribe(
                "ui",
                handler_fn(move |_msg: Arc<Message>| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Ok(()) }
                }),
            )
            .unwrap();

        bus.unsubscribe(&sub);
        bus.unsubscribe(&sub);
        bus.publish("ui", "clear-history", Value::Null).unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failing_subscriber_isolated() {
        let bus = MessageBus::new();
        bus.create_channel("results", ChannelOptions::transient()).unwrap();
        let _panics = bus
            .subscribe(
                "results",
                handler_fn(|msg: Arc<Message>| async move {
                    if msg.sequence > 0 {
                        panic!("renderer crashed");
                    }
                    Ok(())
                }),
            )
            .unwrap();
        let _fails = bus
            .subscribe(
                "results",
                handler_fn(|_msg: Arc<Message>| async { Err(HandlerError::new("bad payload")) }),
            )
            .unwrap();
        let (_ok, mut rx) = collect(&bus, "results");

        bus.publish("results", "analysis-complete", json!({})).unwrap();
        bus.publish("results", "history-cleared", json!({})).unwrap();

        assert_eq!(next_message(&mut rx).await.message_type, "analysis-complete");
        assert_eq!(next_message(&mut rx).await.message_type, "history-cleared");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_waits_with_backoff() {
        let policy = RetryPolicy::default();
        let attempts = AtomicU32::new(0);
        let mut notified = Vec::new();
        let started = Instant::now();

        let value = retry_notify(
            &policy,
            |attempt| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(format!("attempt {attempt} failed"))
                    } else {
                        Ok(attempt)
                    }
                }
            },
            |attempt, _err: &String| notified.push(attempt),
        )
        .await
        .unwrap();

        assert_eq!(value, 3);
        assert_eq!(notified, vec![1, 2]);
        assert_eq!(started.elapsed(), Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion_returns_last_error() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        let err = retry_notify(
            &policy,
            |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err::<(), _>(format!("failure {attempt}")) }
            },
            |_, _: &String| {},
        )
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            RetryError::MaxRetriesExceeded { attempts, source } => {
                assert_eq!(attempts, 3);
                assert_eq!(source, "failure 3");
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_single_response_resolves_once() {
        let bus = Arc::new(MessageBus::new());
        bus.create_channel("insight-content", ChannelOptions::transient()).unwrap();
        let router = MessageRouter::new(Arc::clone(&bus)).unwrap();
        let _serve = router
            .serve(
                "insight-content",
                request_handler_fn(|msg: Arc<Message>| async move {
                    Ok(json!({"echo": msg.payload.clone()}))
                }),
            )
            .unwrap();

        let handle = router.request("insight-content", "get-settings", json!({"tabId": 4}));
        let request_id = handle.request_id();
        let reply = timeout(WAIT, handle).await.unwrap().unwrap();
        assert_eq!(reply, json!({"echo": {"tabId": 4}}));

        bus.publish_draft(
            RESPONSE_CHANNEL,
            Draft::response("response", json!("late duplicate"), request_id),
        )
        .unwrap();
        let dropped = timeout(WAIT, async {
            while router.stats().responses_dropped == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            router.stats().responses_dropped
        })
        .await
        .unwrap();

        assert_eq!(dropped, 1);
        assert_eq!(router.stats().completed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_liveness_keeper_touches_store_every_period() {
        let store = Arc::new(InMemoryStore::new());
        let keeper = LivenessKeeper::start(store.clone(), LivenessConfig::default()).unwrap();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(store.access_count() >= 3);

        keeper.stop().await;
        let after_stop = store.access_count();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(store.access_count(), after_stop);
    }
}
