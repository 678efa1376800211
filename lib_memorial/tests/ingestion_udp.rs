use lib_memorial::{
    CalendarScheduler, CommandTransport, IngestionListener, MemoryStore, PowerState, Registry,
    UdpBroadcaster,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout, Duration, Instant};

async fn wait_for<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if check().await {
            return;
        }
        sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not met within 5s");
}

#[tokio::test]
async fn listener_records_reports_and_ignores_garbage() {
    let registry = Arc::new(Registry::open(Arc::new(MemoryStore::new())).unwrap());
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    let listener = IngestionListener::new(registry.clone(), addr);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(async move { listener.run_with_socket(socket, shutdown_rx).await });

    let device = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    device.send_to(b"no-comma-here", addr).await.unwrap();
    device.send_to(b"lamp-1,OFF", addr).await.unwrap();
    device.send_to(b"lamp-2,MANUAL_OFF\n", addr).await.unwrap();
    device.send_to(b"lamp-1,ON", addr).await.unwrap();

    wait_for(|| {
        let registry = registry.clone();
        async move {
            registry
                .get("lamp-1")
                .await
                .is_some_and(|r| r.last_state == PowerState::On)
                && registry.get("lamp-2").await.is_some()
        }
    })
    .await;

    let snapshot = registry.snapshot().await;
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot["lamp-2"].last_state, PowerState::Reported("MANUAL_OFF".to_string()));
    assert!(snapshot["lamp-1"].last_seen.is_some());

    shutdown_tx.send(()).unwrap();
    let result = timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn run_binds_its_own_socket_and_stops_on_shutdown() {
    let registry = Arc::new(Registry::open(Arc::new(MemoryStore::new())).unwrap());
    // Reserve a free port, release it, and let the listener bind it.
    let addr: SocketAddr = {
        let probe = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        probe.local_addr().unwrap()
    };
    let listener = IngestionListener::new(registry.clone(), addr).with_rebind_delay(Duration::from_millis(50));

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(async move { listener.run(shutdown_rx).await });

    let device = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    wait_for(|| {
        let registry = registry.clone();
        let device = &device;
        async move {
            device.send_to(b"lamp-9,ON", addr).await.unwrap();
            registry.get("lamp-9").await.is_some()
        }
    })
    .await;

    shutdown_tx.send(()).unwrap();
    timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn scheduler_commands_arrive_as_datagrams() {
    let registry = Arc::new(Registry::open(Arc::new(MemoryStore::new())).unwrap());
    registry.upsert("lamp-1", PowerState::Off, 1).await.unwrap();
    let today = chrono::NaiveDate::from_ymd_opt(2030, 5, 17).unwrap();
    registry
        .set_dates("lamp-1", Some("2030-05-17".to_string()), None)
        .await
        .unwrap();

    let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let transport: Arc<dyn CommandTransport> = Arc::new(UdpBroadcaster::new(receiver.local_addr().unwrap()));
    let scheduler = CalendarScheduler::new(registry.clone(), transport);

    let report = scheduler.run_pass(today).await.unwrap();
    assert_eq!(report.sent.len(), 1);

    let mut buf = [0u8; 64];
    let (len, _) = timeout(Duration::from_secs(2), receiver.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf[..len], b"lamp-1,ON");
    assert_eq!(registry.get("lamp-1").await.unwrap().last_state, PowerState::On);
}
