//! Manager integration tests against a scripted AirMap backend.
//!
//! HTTP and DNS go through in-memory mocks; telemetry datagrams are received
//! on a loopback UDP socket and decrypted with the key the mock handed out.

use std::io;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::future::{self, BoxFuture, FutureExt};
use serde_json::{json, Value};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;

use airmap_client::{
    ClientConfig, Credentials, ErrorSink, HostResolver, HttpMethod, HttpRequest, HttpResponse,
    HttpTransport, Manager, ManagerHandle, NetworkErrorKind, Notification, TransportError,
    VehicleEvent,
};
use airmap_core::{
    decode_records, open_datagram, Coordinate, GlobalPosition, MissionCommand, MissionItem,
    Position, SessionKey,
};
use prost::Message;

const SESSION_KEY: [u8; 32] = [0x42; 32];

type Route = dyn Fn(&HttpRequest) -> (u16, Value) + Send + Sync;

#[derive(Clone)]
struct MockTransport {
    requests: Arc<Mutex<Vec<HttpRequest>>>,
    route: Arc<Route>,
}

impl MockTransport {
    fn new(route: impl Fn(&HttpRequest) -> (u16, Value) + Send + Sync + 'static) -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            route: Arc::new(route),
        }
    }

    fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn requests_to(&self, suffix: &str) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.url.path().ends_with(suffix))
            .collect()
    }
}

impl HttpTransport for MockTransport {
    fn execute(&self, request: HttpRequest) -> BoxFuture<'static, Result<HttpResponse, TransportError>> {
        self.requests.lock().unwrap().push(request.clone());
        let (status, body) = (self.route)(&request);
        future::ready(Ok(HttpResponse {
            url: request.url,
            status,
            location: None,
            body: body.to_string().into_bytes(),
        }))
        .boxed()
    }
}

struct LoopbackResolver;

impl HostResolver for LoopbackResolver {
    fn lookup(&self, _host: String) -> BoxFuture<'static, io::Result<Vec<IpAddr>>> {
        future::ready(Ok(vec![IpAddr::from([127, 0, 0, 1])])).boxed()
    }
}

#[derive(Default)]
struct RecordingSink {
    messages: Mutex<Vec<String>>,
}

impl ErrorSink for RecordingSink {
    fn show_message(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

/// Happy-path AirMap backend.
fn airmap_backend(request: &HttpRequest) -> (u16, Value) {
    let path = request.url.path();
    if path.ends_with("/oauth/ro") {
        (200, json!({"id_token": "jwt-token"}))
    } else if path.ends_with("/status/alpha/point") {
        (200, json!({"data": {"advisories": [{"id": "poly"}, {"id": "point"}]}}))
    } else if path.ends_with("/airspace/v2/poly") {
        (
            200,
            json!({"data": [{
                "id": "poly",
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[8.5, 47.3], [8.6, 47.3], [8.6, 47.4], [8.5, 47.3]]]
                }
            }]}),
        )
    } else if path.ends_with("/airspace/v2/point") {
        (
            200,
            json!({"data": [{"id": "point", "geometry": {"type": "Point", "coordinates": [8.5, 47.3]}}]}),
        )
    } else if path.ends_with("/flight/v2/path") {
        (200, json!({"status": "success", "data": {"id": "flight|xyz"}}))
    } else if path.ends_with("/start-comm") {
        (200, json!({"data": {"key": STANDARD.encode(SESSION_KEY)}}))
    } else if path.ends_with("/end-comm") {
        (200, json!({"status": "success"}))
    } else {
        (404, json!({"message": "not found"}))
    }
}

fn config(telemetry_port: u16) -> ClientConfig {
    ClientConfig {
        api_key: "test-api-key".to_string(),
        credentials: Credentials::new("client-id", "pilot@example.com", "secret"),
        telemetry_host: "telemetry.test".to_string(),
        telemetry_port,
        ..Default::default()
    }
}

fn start(config: ClientConfig, transport: MockTransport) -> (ManagerHandle, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let manager = Manager::new(
        config,
        Arc::new(transport),
        Arc::new(LoopbackResolver),
        sink.clone(),
    )
    .unwrap();
    let (handle, _task) = manager.spawn();
    (handle, sink)
}

async fn wait_for(
    events: &mut broadcast::Receiver<Notification>,
    predicate: impl Fn(&Notification) -> bool,
) -> Notification {
    tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            match events.recv().await {
                Ok(notification) if predicate(&notification) => return notification,
                Ok(_) => continue,
                Err(err) => panic!("event channel failed: {}", err),
            }
        }
    })
    .await
    .expect("timed out waiting for notification")
}

fn mission() -> Vec<MissionItem> {
    vec![
        MissionItem::new(MissionCommand::NAV_TAKEOFF, 47.30, 8.50, 20.0),
        MissionItem::new(MissionCommand::NAV_WAYPOINT, 47.31, 8.51, 60.0),
        MissionItem::new(MissionCommand::NAV_LAND, 47.32, 8.52, 0.0),
    ]
}

#[tokio::test(start_paused = true)]
async fn roi_updates_are_debounced() {
    let transport = MockTransport::new(airmap_backend);
    let (handle, _sink) = start(config(16060), transport.clone());
    let mut events = handle.subscribe();

    handle.set_roi(Coordinate::new(47.0, 8.0), 500.0).await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    handle.set_roi(Coordinate::new(47.3, 8.5), 1000.0).await.unwrap();

    wait_for(&mut events, |n| matches!(n, Notification::RestrictionsChanged(_))).await;

    let queries = transport.requests_to("/status/alpha/point");
    assert_eq!(queries.len(), 1);
    let query = queries[0].url.query().unwrap_or_default();
    assert!(query.contains("latitude=47.3000000000"));
    assert!(query.contains("buffer=1000"));
}

#[tokio::test(start_paused = true)]
async fn unsupported_geometry_is_skipped() {
    let transport = MockTransport::new(airmap_backend);
    let (handle, _sink) = start(config(16060), transport.clone());
    let mut events = handle.subscribe();

    handle.set_roi(Coordinate::new(47.3, 8.5), 1000.0).await.unwrap();
    let notification =
        wait_for(&mut events, |n| matches!(n, Notification::RestrictionsChanged(_))).await;

    match notification {
        Notification::RestrictionsChanged(set) => {
            assert_eq!(set.polygons.len(), 1);
            assert!(set.circles.is_empty());
        }
        other => panic!("unexpected notification {:?}", other),
    }
    assert_eq!(transport.requests_to("/airspace/v2/poly").len(), 1);
    assert_eq!(transport.requests_to("/airspace/v2/point").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn roi_is_not_polled_without_api_key() {
    let transport = MockTransport::new(airmap_backend);
    let config = ClientConfig {
        api_key: String::new(),
        ..config(16060)
    };
    let (handle, _sink) = start(config, transport.clone());

    handle.set_roi(Coordinate::new(47.3, 8.5), 1000.0).await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn flight_registration_logs_in_first() {
    let transport = MockTransport::new(airmap_backend);
    let (handle, _sink) = start(config(16060), transport.clone());
    let mut events = handle.subscribe();

    handle.create_flight(mission()).await.unwrap();
    let notification =
        wait_for(&mut events, |n| matches!(n, Notification::FlightIdChanged(_))).await;
    assert_eq!(notification, Notification::FlightIdChanged("flight|xyz".to_string()));

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].url.path().ends_with("/oauth/ro"));
    assert_eq!(requests[0].header("X-API-Key"), Some("test-api-key"));
    assert_eq!(requests[1].method, HttpMethod::Post);
    assert!(requests[1].url.path().ends_with("/flight/v2/path"));
    assert_eq!(requests[1].header("Authorization"), Some("Bearer jwt-token"));
}

#[tokio::test]
async fn rejected_api_key_reaches_error_sink() {
    let transport = MockTransport::new(|_| (403, json!({"message": "Invalid API key"})));
    let (handle, sink) = start(
        ClientConfig {
            roi_debounce: Duration::from_millis(10),
            ..config(16060)
        },
        transport,
    );
    let mut events = handle.subscribe();

    handle.set_roi(Coordinate::new(47.3, 8.5), 1000.0).await.unwrap();
    let error = wait_for(&mut events, |n| matches!(n, Notification::NetworkError(_))).await;
    assert!(matches!(
        error,
        Notification::NetworkError(ref err) if err.kind == NetworkErrorKind::ContentAccessDenied
    ));

    let expected = "AirMap error (invalid API key?). Response from Server: Invalid API key";
    let message = wait_for(&mut events, |n| matches!(n, Notification::UserMessage(_))).await;
    assert_eq!(message, Notification::UserMessage(expected.to_string()));
    assert_eq!(sink.messages.lock().unwrap().as_slice(), [expected.to_string()]);
}

/// Feed samples until one datagram comes back, returning it decrypted.
async fn next_datagram(
    handle: &ManagerHandle,
    receiver: &UdpSocket,
    arm: bool,
) -> airmap_core::OpenedDatagram {
    let key = SessionKey::try_from(SESSION_KEY.as_slice()).unwrap();
    let sample = GlobalPosition {
        lat: 473_000_000,
        lon: 85_000_000,
        alt: 450_000,
        relative_alt: 30_000,
        ..Default::default()
    };
    let mut buf = [0u8; 2048];

    for _ in 0..200 {
        if arm {
            handle.vehicle(VehicleEvent::ArmedChanged(true)).await.unwrap();
        }
        handle.vehicle(VehicleEvent::GlobalPosition(sample)).await.unwrap();
        if let Ok(Ok((len, _))) =
            tokio::time::timeout(Duration::from_millis(20), receiver.recv_from(&mut buf)).await
        {
            return open_datagram(&key, &buf[..len]).unwrap();
        }
    }
    panic!("no telemetry datagram received");
}

#[tokio::test]
async fn armed_vehicle_streams_telemetry() {
    let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = receiver.local_addr().unwrap().port();
    let transport = MockTransport::new(airmap_backend);
    let (handle, _sink) = start(config(port), transport.clone());
    let mut events = handle.subscribe();

    // arming without a registered flight does nothing
    handle.vehicle(VehicleEvent::Connected { armed: true }).await.unwrap();

    handle.create_flight(mission()).await.unwrap();
    wait_for(&mut events, |n| matches!(n, Notification::FlightIdChanged(_))).await;
    assert!(transport.requests_to("/start-comm").is_empty());

    handle.vehicle(VehicleEvent::ArmedChanged(true)).await.unwrap();
    let first = next_datagram(&handle, &receiver, false).await;
    assert_eq!(first.sequence, 1);
    assert_eq!(first.flight_id, "flight|xyz");

    let records = decode_records(&first.payload);
    let position = Position::decode(records[0].1).unwrap();
    assert!((position.latitude - 47.3).abs() < 1e-9);
    assert_eq!(position.altitude_agl, 30.0);

    let second = next_datagram(&handle, &receiver, false).await;
    assert_eq!(second.sequence, 2);
    assert_ne!(first.iv, second.iv);

    // a new session restarts the sequence
    handle.vehicle(VehicleEvent::ArmedChanged(false)).await.unwrap();
    let mut stale = [0u8; 2048];
    while receiver.try_recv_from(&mut stale).is_ok() {}
    let restarted = next_datagram(&handle, &receiver, true).await;
    assert_eq!(restarted.sequence, 1);

    let start_comm = transport.requests_to("/start-comm");
    assert_eq!(start_comm.len(), 2);
    assert_eq!(start_comm[0].header("Authorization"), Some("Bearer jwt-token"));
    assert_eq!(transport.requests_to("/end-comm").len(), 1);
    assert_eq!(transport.requests_to("/oauth/ro").len(), 1);

    handle.shutdown().await.unwrap();
}

async fn wait_for_requests(transport: &MockTransport, suffix: &str, count: usize) {
    for _ in 0..300 {
        if transport.requests_to(suffix).len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {} requests to {}", count, suffix);
}

/// Connect a vehicle, register a flight and arm until datagrams arrive.
async fn start_streaming(
    handle: &ManagerHandle,
    events: &mut broadcast::Receiver<Notification>,
    receiver: &UdpSocket,
) {
    handle.vehicle(VehicleEvent::Connected { armed: false }).await.unwrap();
    handle.create_flight(mission()).await.unwrap();
    wait_for(events, |n| matches!(n, Notification::FlightIdChanged(_))).await;

    handle.vehicle(VehicleEvent::ArmedChanged(true)).await.unwrap();
    let first = next_datagram(handle, receiver, false).await;
    assert_eq!(first.sequence, 1);
}

#[tokio::test]
async fn disconnect_ends_telemetry() {
    let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = receiver.local_addr().unwrap().port();
    let transport = MockTransport::new(airmap_backend);
    let (handle, _sink) = start(config(port), transport.clone());
    let mut events = handle.subscribe();

    start_streaming(&handle, &mut events, &receiver).await;

    handle.vehicle(VehicleEvent::Disconnected).await.unwrap();
    wait_for_requests(&transport, "/end-comm", 1).await;
    let mut stale = [0u8; 2048];
    while receiver.try_recv_from(&mut stale).is_ok() {}

    // events of a disconnected vehicle are ignored
    handle.vehicle(VehicleEvent::ArmedChanged(true)).await.unwrap();
    for _ in 0..5 {
        handle
            .vehicle(VehicleEvent::GlobalPosition(GlobalPosition::default()))
            .await
            .unwrap();
    }
    let mut buf = [0u8; 2048];
    let received =
        tokio::time::timeout(Duration::from_millis(200), receiver.recv_from(&mut buf)).await;
    assert!(received.is_err(), "datagram sent after disconnect");

    assert_eq!(transport.requests_to("/end-comm").len(), 1);
    assert_eq!(transport.requests_to("/start-comm").len(), 1);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn connecting_another_vehicle_ends_previous_stream() {
    let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = receiver.local_addr().unwrap().port();
    let transport = MockTransport::new(airmap_backend);
    let (handle, _sink) = start(config(port), transport.clone());
    let mut events = handle.subscribe();

    start_streaming(&handle, &mut events, &receiver).await;

    handle.vehicle(VehicleEvent::Connected { armed: true }).await.unwrap();
    wait_for_requests(&transport, "/end-comm", 1).await;
    let mut stale = [0u8; 2048];
    while receiver.try_recv_from(&mut stale).is_ok() {}

    // the new vehicle gets its own session once the old one has ended
    let restarted = next_datagram(&handle, &receiver, true).await;
    assert_eq!(restarted.sequence, 1);

    assert_eq!(transport.requests_to("/end-comm").len(), 1);
    assert_eq!(transport.requests_to("/start-comm").len(), 2);

    handle.shutdown().await.unwrap();
}
