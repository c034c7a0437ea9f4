//! Integration tests for the model server
//!
//! These tests run a real server on a temporary Unix socket and verify:
//! - Register access end to end for the UART and generic models
//! - Endpoint lifecycle (stale socket cleanup, bind failure, stop)
//! - Interrupt fan-out to connected peers
//! - Activity simulator interrupts reaching peers through the server
//! - Peers that stop reading are dropped without stalling the server
//! - Connection traffic and activity ticks serialize on one device lock

use std::sync::{Arc, Mutex};
use std::time::Duration;

use regmodel_protocol::{Command, ProtocolMessage, ResultCode, FRAME_LEN};
use regmodel_server::{ModelClient, ModelServer, ServerConfig, ServerError, ServerState};
use regmodel_sim::uart::{control, interrupt, status};
use regmodel_sim::{
    run_activity_task, share, ActivityCommand, ActivityConfig, RegisterMap, SharedDevice,
    UartConfig, UartModel,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::mpsc;

// ============================================================================
// Helper Functions
// ============================================================================

mod helpers {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    pub const UART_BASE: u32 = 0x4000_0000;
    pub const CONTROL: u32 = UART_BASE;
    pub const STATUS: u32 = UART_BASE + 0x04;
    pub const DATA: u32 = UART_BASE + 0x08;
    pub const BAUD: u32 = UART_BASE + 0x0C;

    /// A running server plus the temp dir holding its socket
    pub struct Fixture {
        pub server: ModelServer,
        pub client: ModelClient,
        pub path: PathBuf,
        _dir: TempDir,
    }

    pub async fn start_server(device: SharedDevice) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.sock");
        let mut server = ModelServer::new(ServerConfig::with_socket_path(&path), device);
        server.start().await.unwrap();

        Fixture {
            server,
            client: ModelClient::new(&path),
            path,
            _dir: dir,
        }
    }

    /// UART kept behind a typed handle so tests can inspect its queues
    pub fn typed_uart(config: UartConfig) -> (Arc<Mutex<UartModel>>, SharedDevice) {
        let uart = Arc::new(Mutex::new(UartModel::from_config(config)));
        let device: SharedDevice = uart.clone();
        (uart, device)
    }

    pub async fn start_uart() -> Fixture {
        start_server(share(UartModel::new(1, UART_BASE))).await
    }

    /// Read one frame from a raw stream
    pub async fn read_message(stream: &mut UnixStream) -> ProtocolMessage {
        let mut buf = [0u8; FRAME_LEN];
        tokio::time::timeout(Duration::from_secs(2), stream.read_exact(&mut buf))
            .await
            .unwrap()
            .unwrap();
        ProtocolMessage::decode(&buf).unwrap()
    }

    /// Wait until the server tracks `count` peers
    pub async fn wait_for_peers(server: &ModelServer, count: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while server.peer_count().await != count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }
}

use helpers::*;

// ============================================================================
// Register Access
// ============================================================================

#[tokio::test]
async fn test_uart_enable_sets_ready() {
    let mut f = start_uart().await;

    let result = f.client.write(1, CONTROL, 0x0F).await.unwrap();
    assert_eq!(result, ResultCode::Success);

    let (result, value) = f.client.read(1, STATUS).await.unwrap();
    assert_eq!(result, ResultCode::Success);
    assert_ne!(value & status::READY, 0);
    assert_ne!(value & status::TX_EMPTY, 0);

    f.server.stop().await;
}

#[tokio::test]
async fn test_uart_reset_values() {
    let mut f = start_uart().await;

    assert_eq!(f.client.read(1, CONTROL).await.unwrap(), (ResultCode::Success, 0));
    assert_eq!(
        f.client.read(1, STATUS).await.unwrap(),
        (ResultCode::Success, status::READY | status::TX_EMPTY)
    );
    assert_eq!(f.client.read(1, BAUD).await.unwrap(), (ResultCode::Success, 9600));

    f.server.stop().await;
}

#[tokio::test]
async fn test_uart_invalid_offset() {
    let mut f = start_uart().await;

    let (result, _) = f.client.read(1, UART_BASE + 0x10).await.unwrap();
    assert_eq!(result, ResultCode::InvalidAddr);

    let result = f.client.write(1, UART_BASE + 0x10, 1).await.unwrap();
    assert_eq!(result, ResultCode::Error);

    f.server.stop().await;
}

#[tokio::test]
async fn test_uart_tx_write_clears_tx_empty() {
    let mut f = start_uart().await;

    f.client.write(1, CONTROL, control::ENABLE).await.unwrap();
    assert_eq!(
        f.client.write(1, DATA, b'Z' as u32).await.unwrap(),
        ResultCode::Success
    );

    let (_, value) = f.client.read(1, STATUS).await.unwrap();
    assert_eq!(value & status::TX_EMPTY, 0);

    f.server.stop().await;
}

#[tokio::test]
async fn test_generic_model_sentinel_and_round_trip() {
    let mut f = start_server(share(RegisterMap::new(3))).await;

    assert_eq!(
        f.client.read(3, 0x1234).await.unwrap(),
        (ResultCode::Success, 0xDEAD_BEEF)
    );
    assert_eq!(
        f.client.write(3, 0x1234, 0xCAFE_F00D).await.unwrap(),
        ResultCode::Success
    );
    assert_eq!(
        f.client.read(3, 0x1234).await.unwrap(),
        (ResultCode::Success, 0xCAFE_F00D)
    );

    f.server.stop().await;
}

#[tokio::test]
async fn test_init_and_deinit_succeed() {
    let mut f = start_uart().await;

    assert_eq!(f.client.init(1).await.unwrap(), ResultCode::Success);
    assert_eq!(f.client.deinit(1).await.unwrap(), ResultCode::Success);

    f.server.stop().await;
}

#[tokio::test]
async fn test_unknown_command_returns_error() {
    let mut f = start_uart().await;

    let mut request = ProtocolMessage::read(1, CONTROL);
    request.command = Command::Unknown(0x99);
    let exchange = f.client.request(&request).await.unwrap();
    assert_eq!(exchange.response.result, ResultCode::Error);
    assert_eq!(exchange.response.command, Command::Unknown(0x99));

    f.server.stop().await;
}

#[tokio::test]
async fn test_connection_closes_after_one_exchange() {
    let mut f = start_server(share(RegisterMap::new(1))).await;

    let mut stream = UnixStream::connect(&f.path).await.unwrap();
    stream
        .write_all(&ProtocolMessage::read(1, 0).encode())
        .await
        .unwrap();

    let response = read_message(&mut stream).await;
    assert_eq!(response.result, ResultCode::Success);

    let mut buf = [0u8; 1];
    let n = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n, 0);

    f.server.stop().await;
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_stale_socket_file_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stale.sock");
    std::fs::write(&path, b"leftover").unwrap();

    let mut server = ModelServer::new(
        ServerConfig::with_socket_path(&path),
        share(RegisterMap::new(1)),
    );
    server.start().await.unwrap();
    assert_eq!(server.state(), ServerState::Running);

    let (result, _) = ModelClient::new(&path).read(1, 0).await.unwrap();
    assert_eq!(result, ResultCode::Success);

    server.stop().await;
}

#[tokio::test]
async fn test_bind_failure_leaves_server_stopped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("model.sock");

    let mut server = ModelServer::new(
        ServerConfig::with_socket_path(&path),
        share(RegisterMap::new(1)),
    );
    let err = server.start().await.unwrap_err();
    assert!(matches!(err, ServerError::Bind { .. }));
    assert_eq!(server.state(), ServerState::Stopped);
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let mut f = start_uart().await;

    let err = f.server.start().await.unwrap_err();
    assert!(matches!(err, ServerError::AlreadyRunning));
    assert_eq!(f.server.state(), ServerState::Running);

    f.server.stop().await;
}

#[tokio::test]
async fn test_stop_removes_socket_and_is_idempotent() {
    let mut f = start_uart().await;
    assert!(f.path.exists());

    f.server.stop().await;
    assert_eq!(f.server.state(), ServerState::Stopped);
    assert!(!f.path.exists());

    f.server.stop().await;
    assert_eq!(f.server.state(), ServerState::Stopped);
    assert!(UnixStream::connect(&f.path).await.is_err());
}

#[tokio::test]
async fn test_restart_after_stop() {
    let mut f = start_uart().await;
    f.client.write(1, CONTROL, control::ENABLE).await.unwrap();
    f.server.stop().await;

    f.server.start().await.unwrap();
    f.server.wait_for_state(ServerState::Running).await;

    // Device state survives a restart of the endpoint
    let (_, value) = f.client.read(1, CONTROL).await.unwrap();
    assert_eq!(value, control::ENABLE);

    f.server.stop().await;
}

// ============================================================================
// Interrupts
// ============================================================================

#[tokio::test]
async fn test_interrupt_reaches_idle_peer() {
    let mut f = start_uart().await;

    let mut stream = UnixStream::connect(&f.path).await.unwrap();
    wait_for_peers(&f.server, 1).await;

    assert_eq!(f.server.trigger_interrupt(7).await, 1);

    let msg = read_message(&mut stream).await;
    assert_eq!(msg.command, Command::Interrupt);
    assert_eq!(msg.device_id, 1);
    assert_eq!(msg.address, 0);
    assert_eq!(msg.interrupt_id(), Some(7));

    f.server.stop().await;
}

#[tokio::test]
async fn test_interrupt_fans_out_to_every_peer() {
    let mut f = start_uart().await;

    let mut a = UnixStream::connect(&f.path).await.unwrap();
    let mut b = UnixStream::connect(&f.path).await.unwrap();
    wait_for_peers(&f.server, 2).await;

    assert_eq!(f.server.trigger_interrupt(interrupt::TX_COMPLETE).await, 2);
    assert_eq!(read_message(&mut a).await.length, interrupt::TX_COMPLETE);
    assert_eq!(read_message(&mut b).await.length, interrupt::TX_COMPLETE);

    f.server.stop().await;
}

#[tokio::test]
async fn test_interrupt_with_no_peers() {
    let mut f = start_uart().await;
    assert_eq!(f.server.trigger_interrupt(1).await, 0);
    f.server.stop().await;
}

#[tokio::test]
async fn test_disconnected_peer_is_dropped() {
    let mut f = start_uart().await;

    let stream = UnixStream::connect(&f.path).await.unwrap();
    wait_for_peers(&f.server, 1).await;
    drop(stream);

    // The handler sees EOF and removes the peer
    wait_for_peers(&f.server, 0).await;
    assert_eq!(f.server.trigger_interrupt(1).await, 0);

    f.server.stop().await;
}

#[tokio::test]
async fn test_stop_closes_connected_peers() {
    let mut f = start_uart().await;

    let mut stream = UnixStream::connect(&f.path).await.unwrap();
    wait_for_peers(&f.server, 1).await;

    f.server.stop().await;

    let mut buf = [0u8; FRAME_LEN];
    let n = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn test_activity_interrupts_reach_peers() {
    let mut model = UartModel::from_config(UartConfig {
        rx_probability: 1.0,
        ..Default::default()
    });
    let enable = control::ENABLE | control::RX_ENABLE | control::IRQ_ENABLE;
    regmodel_sim::DeviceModel::write(&mut model, CONTROL, enable).unwrap();
    let device = share(model);

    let mut f = start_server(device.clone()).await;
    let mut stream = UnixStream::connect(&f.path).await.unwrap();
    wait_for_peers(&f.server, 1).await;

    let (cmd_tx, cmd_rx) = mpsc::channel(4);
    let config = ActivityConfig {
        tick_interval_ms: 10,
        startup_delay_ms: 0,
        seed: Some(7),
    };
    let task = tokio::spawn(run_activity_task(
        device,
        config,
        f.server.interrupt_sender(),
        cmd_rx,
    ));

    let msg = read_message(&mut stream).await;
    assert_eq!(msg.command, Command::Interrupt);
    assert_eq!(msg.interrupt_id(), Some(interrupt::RX_READY));

    cmd_tx.send(ActivityCommand::Shutdown).await.unwrap();
    task.await.unwrap();
    f.server.stop().await;
}

#[tokio::test]
async fn test_non_reading_peer_is_dropped_without_stalling() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.sock");
    let config = ServerConfig {
        send_timeout_ms: 100,
        ..ServerConfig::with_socket_path(&path)
    };
    let mut server = ModelServer::new(config, share(UartModel::new(1, UART_BASE)));
    server.start().await.unwrap();

    // Connects, never sends, never reads
    let _stalled = UnixStream::connect(&path).await.unwrap();
    wait_for_peers(&server, 1).await;

    // Far more than a socket buffer holds
    let irq_tx = server.interrupt_sender();
    tokio::time::timeout(Duration::from_secs(10), async {
        for _ in 0..20_000 {
            irq_tx.send(interrupt::RX_READY).await.unwrap();
        }
    })
    .await
    .unwrap();
    wait_for_peers(&server, 0).await;

    let delivered = tokio::time::timeout(Duration::from_secs(2), server.trigger_interrupt(1))
        .await
        .unwrap();
    assert_eq!(delivered, 0);

    // New peers are still served
    let (result, _) = ModelClient::new(&path).read(1, STATUS).await.unwrap();
    assert_eq!(result, ResultCode::Success);

    tokio::time::timeout(Duration::from_secs(3), server.stop())
        .await
        .unwrap();
    assert_eq!(server.state(), ServerState::Stopped);
}

#[tokio::test]
async fn test_stop_is_not_held_up_by_non_reading_peer() {
    let mut f = start_uart().await;

    let _stalled = UnixStream::connect(&f.path).await.unwrap();
    wait_for_peers(&f.server, 1).await;

    // Fill the queue without waiting for delivery
    let irq_tx = f.server.interrupt_sender();
    while irq_tx.try_send(interrupt::RX_READY).is_ok() {}

    tokio::time::timeout(Duration::from_secs(3), f.server.stop())
        .await
        .unwrap();
    assert!(!f.path.exists());
}

// ============================================================================
// Shared Device Access
// ============================================================================

#[tokio::test]
async fn test_full_tx_queue_over_the_wire() {
    let (uart, device) = typed_uart(UartConfig::default());
    let mut f = start_server(device).await;

    f.client.write(1, CONTROL, control::ENABLE).await.unwrap();
    for byte in 0..17u32 {
        let result = f.client.write(1, DATA, 0x30 + byte).await.unwrap();
        assert_eq!(result, ResultCode::Success);
    }

    {
        let uart = uart.lock().unwrap();
        assert_eq!(uart.tx_fifo().len(), 16);
        assert_eq!(uart.tx_fifo().dropped(), 1);
    }
    let (_, value) = f.client.read(1, STATUS).await.unwrap();
    assert_eq!(value & status::TX_EMPTY, 0);

    f.server.stop().await;
}

#[tokio::test]
async fn test_concurrent_writes_and_activity_account_for_every_byte() {
    const WRITERS: usize = 8;
    const WRITES_PER_CLIENT: usize = 25;

    let (uart, device) = typed_uart(UartConfig {
        rx_probability: 0.0,
        ..Default::default()
    });
    let mut f = start_server(device.clone()).await;
    f.client
        .write(1, CONTROL, control::ENABLE | control::TX_ENABLE)
        .await
        .unwrap();

    let (cmd_tx, cmd_rx) = mpsc::channel(4);
    let config = ActivityConfig {
        tick_interval_ms: 1,
        startup_delay_ms: 0,
        seed: Some(3),
    };
    let activity = tokio::spawn(run_activity_task(
        device,
        config,
        f.server.interrupt_sender(),
        cmd_rx,
    ));

    let mut writers = Vec::new();
    for w in 0..WRITERS {
        let client = f.client.clone();
        writers.push(tokio::spawn(async move {
            for i in 0..WRITES_PER_CLIENT {
                let byte = (w * WRITES_PER_CLIENT + i) as u32;
                let result = client.write(1, DATA, byte).await.unwrap();
                assert_eq!(result, ResultCode::Success);
            }
        }));
    }
    for writer in writers {
        writer.await.unwrap();
    }

    cmd_tx.send(ActivityCommand::Shutdown).await.unwrap();
    activity.await.unwrap();

    let uart = uart.lock().unwrap();
    let queued = uart.tx_fifo().len() as u64;
    let accounted = queued + uart.transmitted() + uart.tx_fifo().dropped();
    assert_eq!(accounted, (WRITERS * WRITES_PER_CLIENT) as u64);
    assert_eq!(
        uart.status() & status::TX_EMPTY != 0,
        uart.tx_fifo().is_empty()
    );
    drop(uart);

    f.server.stop().await;
}
