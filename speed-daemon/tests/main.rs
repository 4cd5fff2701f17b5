use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use tracing::info;

use speed_daemon::run;

const TIMEOUT: Duration = Duration::from_millis(1000);

fn init_tracing_subscriber() {
    static TRACING_SUBSCRIBER_INIT: parking_lot::Once = parking_lot::Once::new();
    TRACING_SUBSCRIBER_INIT.call_once(tracing_subscriber::fmt::init);
}

async fn spawn_app() -> u16 {
    init_tracing_subscriber();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        run(listener).await.unwrap();
    });

    info!("spawned app on 127.0.0.1:{port}");
    port
}

async fn connect(port: u16) -> TcpStream {
    TcpStream::connect(("127.0.0.1", port)).await.unwrap()
}

fn i_am_camera(road: u16, mile: u16, limit: u16) -> Vec<u8> {
    let mut buf = vec![0x80];
    buf.extend(road.to_be_bytes());
    buf.extend(mile.to_be_bytes());
    buf.extend(limit.to_be_bytes());
    buf
}

fn i_am_dispatcher(roads: &[u16]) -> Vec<u8> {
    let mut buf = vec![0x81, roads.len() as u8];
    for road in roads {
        buf.extend(road.to_be_bytes());
    }
    buf
}

fn plate(plate: &str, timestamp: u32) -> Vec<u8> {
    let mut buf = vec![0x20, plate.len() as u8];
    buf.extend(plate.as_bytes());
    buf.extend(timestamp.to_be_bytes());
    buf
}

async fn read_exact(stream: &mut TcpStream, n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    timeout(TIMEOUT, stream.read_exact(&mut buf)).await.unwrap().unwrap();
    buf
}

#[tokio::test]
async fn speeding_car_produces_a_ticket_for_the_right_dispatcher() {
    let port = spawn_app().await;

    let mut camera1 = connect(port).await;
    camera1.write_all(&i_am_camera(66, 0, 60)).await.unwrap();

    let mut camera2 = connect(port).await;
    camera2.write_all(&i_am_camera(66, 100, 60)).await.unwrap();

    let mut dispatcher = connect(port).await;
    dispatcher.write_all(&i_am_dispatcher(&[66])).await.unwrap();

    camera1.write_all(&plate("UN1X", 0)).await.unwrap();
    camera2.write_all(&plate("UN1X", 3600)).await.unwrap();

    let ticket = read_exact(&mut dispatcher, 1 + 1 + 4 + 2 + 2 + 4 + 2 + 4 + 2).await;

    assert_eq!(ticket[0], 0x21);
    assert_eq!(ticket[1], 4);
    assert_eq!(&ticket[2..6], b"UN1X");
    let road = u16::from_be_bytes([ticket[6], ticket[7]]);
    assert_eq!(road, 66);
}

#[tokio::test]
async fn non_speeding_car_gets_no_ticket() {
    let port = spawn_app().await;

    let mut camera1 = connect(port).await;
    camera1.write_all(&i_am_camera(77, 0, 60)).await.unwrap();

    let mut camera2 = connect(port).await;
    camera2.write_all(&i_am_camera(77, 50, 60)).await.unwrap();

    let mut dispatcher = connect(port).await;
    dispatcher.write_all(&i_am_dispatcher(&[77])).await.unwrap();

    camera1.write_all(&plate("RE05BOY", 0)).await.unwrap();
    camera2.write_all(&plate("RE05BOY", 3600)).await.unwrap();

    let mut buf = [0u8; 1];
    let result = timeout(Duration::from_millis(300), dispatcher.read(&mut buf)).await;
    assert!(result.is_err(), "no ticket should have been sent");
}

#[tokio::test]
async fn dispatcher_registered_after_the_ticket_still_receives_it() {
    let port = spawn_app().await;

    let mut camera1 = connect(port).await;
    camera1.write_all(&i_am_camera(88, 0, 60)).await.unwrap();

    let mut camera2 = connect(port).await;
    camera2.write_all(&i_am_camera(88, 200, 60)).await.unwrap();

    camera1.write_all(&plate("ABC123", 0)).await.unwrap();
    camera2.write_all(&plate("ABC123", 3600)).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut dispatcher = connect(port).await;
    dispatcher.write_all(&i_am_dispatcher(&[88])).await.unwrap();

    let ticket = read_exact(&mut dispatcher, 1 + 1 + 4 + 2 + 2 + 4 + 2 + 4 + 2).await;
    assert_eq!(ticket[0], 0x21);
}

#[tokio::test]
async fn heartbeat_is_sent_at_requested_interval() {
    let port = spawn_app().await;

    let mut client = connect(port).await;
    // WantHeartbeat, interval = 2 deciseconds (200ms)
    let mut buf = vec![0x40];
    buf.extend(2u32.to_be_bytes());
    client.write_all(&buf).await.unwrap();

    let mut tag = [0u8; 1];
    timeout(Duration::from_millis(500), client.read_exact(&mut tag)).await.unwrap().unwrap();
    assert_eq!(tag[0], 0x41);
}

#[tokio::test]
async fn camera_cannot_also_identify_as_dispatcher() {
    let port = spawn_app().await;

    let mut client = connect(port).await;
    client.write_all(&i_am_camera(1, 0, 60)).await.unwrap();
    client.write_all(&i_am_dispatcher(&[1])).await.unwrap();

    // the connection should be closed after the protocol violation, optionally preceded by an Error frame
    let mut buf = Vec::new();
    let _ = timeout(TIMEOUT, client.read_to_end(&mut buf)).await.unwrap();
}
