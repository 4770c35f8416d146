mod common;

use common::{client, config, store_with_device, FakeTransport, Scripted};
use roku_remote::{
    DiscoveryState, EngineEvent, ErrorCause, KeyValueStore, MemoryStore, Method, RokuError,
    ADDRESS_KEY,
};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const DEVICE: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 30);

#[tokio::test(start_paused = true)]
async fn test_scan_stops_at_batch_containing_device() {
    let transport = FakeTransport::single_device(DEVICE, false);
    let store = Arc::new(MemoryStore::new());
    let client = client(&transport, &store, Some([192, 168, 1]), config(&[[10, 0, 0]]));

    let device = client.discover().await.unwrap();
    assert_eq!(device.address, DEVICE);
    assert_eq!(device.capabilities.model_name.as_deref(), Some("Roku Ultra"));
    assert_eq!(client.discovery_state(), DiscoveryState::Found(DEVICE));

    // Hosts 1-25 form the first batch, 26-50 the second
    let requests = transport.requests();
    assert!(requests.iter().any(|r| r.address == DEVICE));
    for request in &requests {
        let [a, b, c, host] = request.address.octets();
        assert_eq!([a, b, c], [192, 168, 1], "probed {}", request.address);
        assert!(host <= 50, "probed {}", request.address);
        assert_eq!(request.method, Method::Get);
        assert_eq!(request.path, "query/device-info");
    }

    assert_eq!(store.get(ADDRESS_KEY).unwrap().as_deref(), Some("192.168.1.30"));
}

#[tokio::test(start_paused = true)]
async fn test_cached_device_short_circuits_scan() {
    let transport = FakeTransport::single_device(DEVICE, false);
    let store = store_with_device(DEVICE, false);
    let client = client(&transport, &store, Some([192, 168, 1]), config(&[]));

    let device = client.discover().await.unwrap();
    assert_eq!(device.address, DEVICE);
    assert_eq!(transport.requests().len(), 1);

    client.discover().await.unwrap();
    assert_eq!(transport.requests().len(), 2);
    assert!(transport.requests().iter().all(|r| r.address == DEVICE));
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_cached_device_cleared_before_scan() {
    let stale = Ipv4Addr::new(10, 0, 0, 9);
    let transport = FakeTransport::new(move |request| {
        if request.address == DEVICE {
            Scripted::ok(common::device_info_xml("Roku Express", false))
        } else if request.address == stale {
            Scripted::refused()
        } else {
            Scripted::silent()
        }
    });
    let store = store_with_device(stale, false);
    let client = client(&transport, &store, Some([192, 168, 1]), config(&[]));
    let mut events = client.subscribe_events();

    let device = client.discover().await.unwrap();
    assert_eq!(device.address, DEVICE);
    assert_eq!(transport.count_to(stale), 1);
    assert_eq!(store.get(ADDRESS_KEY).unwrap().as_deref(), Some("192.168.1.30"));

    let mut invalidated = false;
    while let Some(event) = events.try_recv() {
        if let EngineEvent::DeviceInvalidated(address) = event {
            assert_eq!(address, stale);
            invalidated = true;
        }
    }
    assert!(invalidated);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_when_nothing_answers() {
    let transport = FakeTransport::new(|_| Scripted::refused());
    let store = Arc::new(MemoryStore::new());
    let client = client(&transport, &store, None, config(&[[192, 168, 7]]));

    let err = client.discover().await.unwrap_err();
    assert_eq!(err, RokuError::Exhausted { probed: 254 });
    assert_eq!(err.cause(), ErrorCause::Exhausted);
    assert_eq!(client.discovery_state(), DiscoveryState::Exhausted);
    assert_eq!(transport.requests().len(), 254);
    assert!(client.current_device().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_detected_subnet_scanned_before_fallbacks() {
    let transport = FakeTransport::new(|_| Scripted::refused());
    let store = Arc::new(MemoryStore::new());
    let mut config = config(&[[10, 0, 0], [192, 168, 5]]);
    config.batch_size = 254;
    let client = client(&transport, &store, Some([192, 168, 5]), config);

    let err = client.discover().await.unwrap_err();
    assert_eq!(err, RokuError::Exhausted { probed: 508 });

    let requests = transport.requests();
    assert_eq!(requests[0].address, Ipv4Addr::new(192, 168, 5, 1));
    assert_eq!(requests[254].address, Ipv4Addr::new(10, 0, 0, 1));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_scan() {
    let transport = FakeTransport::new(|_| Scripted::silent());
    let store = Arc::new(MemoryStore::new());
    let client = client(&transport, &store, Some([192, 168, 1]), config(&[[10, 0, 0]]));
    let token = CancellationToken::new();

    let (result, ()) = tokio::join!(client.discover_with_cancel(token.clone()), async {
        tokio::time::sleep(Duration::from_millis(2500)).await;
        token.cancel();
    });

    assert_eq!(result.unwrap_err(), RokuError::Cancelled);
    assert_eq!(client.discovery_state(), DiscoveryState::Cancelled);

    let probed = transport.requests().len();
    assert_eq!(probed, 50);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(transport.requests().len(), probed);
}

#[tokio::test(start_paused = true)]
async fn test_connect_manual_address() {
    let device = Ipv4Addr::new(10, 0, 0, 5);
    let transport = FakeTransport::single_device(device, true);
    let store = Arc::new(MemoryStore::new());
    let client = client(&transport, &store, None, config(&[]));

    let record = client.connect(" 10.0.0.5 ").await.unwrap();
    assert_eq!(record.address, device);
    assert!(record.capabilities.requires_pairing);
    assert_eq!(client.current_device().unwrap().address, device);
    assert_eq!(store.get(ADDRESS_KEY).unwrap().as_deref(), Some("10.0.0.5"));
}

#[tokio::test(start_paused = true)]
async fn test_connect_rejects_invalid_address_without_requests() {
    let transport = FakeTransport::new(|_| Scripted::refused());
    let store = Arc::new(MemoryStore::new());
    let client = client(&transport, &store, None, config(&[]));

    let err = client.connect("10.0.0.256").await.unwrap_err();
    assert!(matches!(err, RokuError::InvalidAddress(_)));
    assert!(transport.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failed_connect_keeps_current_device() {
    let transport = FakeTransport::single_device(DEVICE, false);
    let store = store_with_device(DEVICE, false);
    let client = client(&transport, &store, None, config(&[]));

    let err = client.connect("10.0.0.77").await.unwrap_err();
    assert_eq!(err.cause(), ErrorCause::Unreachable);
    assert_eq!(client.current_device().unwrap().address, DEVICE);
}

#[tokio::test(start_paused = true)]
async fn test_non_roku_answer_is_not_a_match() {
    let transport = FakeTransport::new(|request| {
        if request.address == Ipv4Addr::new(192, 168, 1, 1) {
            Scripted::ok("<html>router login</html>")
        } else {
            Scripted::refused()
        }
    });
    let store = Arc::new(MemoryStore::new());
    let client = client(&transport, &store, Some([192, 168, 1]), config(&[]));

    let err = client.discover().await.unwrap_err();
    assert_eq!(err.cause(), ErrorCause::Exhausted);
}

#[tokio::test(start_paused = true)]
async fn test_manual_connect_during_scan_wins() {
    let manual = Ipv4Addr::new(10, 0, 0, 5);
    let transport = FakeTransport::new(move |request| {
        if request.address == DEVICE || request.address == manual {
            Scripted::ok(common::device_info_xml("Roku Ultra", false))
        } else {
            Scripted::silent()
        }
    });
    let store = Arc::new(MemoryStore::new());
    let client = client(&transport, &store, Some([192, 168, 1]), config(&[]));

    let (scanned, connected) = tokio::join!(client.discover(), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        client.connect("10.0.0.5").await
    });

    // The scan finishes first, then the manual choice replaces its result
    assert_eq!(scanned.unwrap().address, DEVICE);
    assert_eq!(connected.unwrap().address, manual);
    assert_eq!(client.current_device().unwrap().address, manual);
    assert_eq!(client.discovery_state(), DiscoveryState::Found(manual));
    assert_eq!(store.get(ADDRESS_KEY).unwrap().as_deref(), Some("10.0.0.5"));

    // Nothing from the scan is sent after the manual request
    let requests = transport.requests();
    assert_eq!(requests.last().unwrap().address, manual);
    assert_eq!(transport.count_to(manual), 1);
    let found_at = requests.iter().find(|r| r.address == DEVICE).unwrap().at;
    assert!(requests.last().unwrap().at > found_at);
}
