//! Dispatch server integration tests.
//!
//! A `ControllerServer` with the simulation backend is bound to an ephemeral
//! port and driven through real TCP connections.

use growth_common::client::{RemoteModule, Requester};
use growth_common::config::GrowthConfig;
use growth_common::consts::MAX_FRAME_LEN;
use growth_common::protocol::{
    CommandRequest, Options, ProtocolError, ReplyFrame, ReplyStatus, read_frame, read_message,
    write_frame,
};
use growth_controller::dispatch::Dispatcher;
use growth_controller::drivers::BoardDrivers;
use growth_controller::drivers::simulation::SimulatedBoard;
use growth_controller::error::ControllerError;
use growth_controller::heartbeat::Heartbeat;
use growth_controller::modules::{PeerEndpoints, build_registry};
use growth_controller::server::ControllerServer;
use proptest::prelude::*;
use serde_json::json;
use std::io::Write;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const CONFIG: &str = r#"
detector_id = "growth-test"

[hv.default]
0 = 1000
1 = 1200

[hv.conversion]
0 = [0.0, 0.3]
1 = [0.0, 0.3]

[limits.hv]
0 = 900.0
1 = 900.0

[limits.temperature]
lower = 0.0
upper = 45.0
source = "temperature-pcb"
channels = [0, 1]
"#;

fn config() -> Arc<GrowthConfig> {
    Arc::new(GrowthConfig::from_toml_str(CONFIG).unwrap())
}

/// Address nobody listens on.
fn dead_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().to_string()
}

/// Peers that never answer: no DAQ program listens, and the display
/// endpoint cannot even be set up.
fn dead_peers() -> PeerEndpoints {
    PeerEndpoints {
        daq: dead_endpoint(),
        display: "bogus://nowhere".to_string(),
        timeout: Duration::from_millis(200),
    }
}

struct Harness {
    addr: String,
    board: SimulatedBoard,
    running: Arc<std::sync::atomic::AtomicBool>,
    handle: Option<JoinHandle<Result<(), ControllerError>>>,
}

impl Harness {
    fn start() -> Self {
        Self::with_peers(dead_peers())
    }

    fn with_peers(peers: PeerEndpoints) -> Self {
        let board = SimulatedBoard::new();
        let server = ControllerServer::from_board(
            "127.0.0.1:0",
            config(),
            BoardDrivers::from_board(board.clone()),
            &peers,
        )
        .unwrap();
        let addr = server.local_addr().unwrap().to_string();
        let running = server.running_flag();
        let handle = thread::spawn(move || server.run());
        Self {
            addr,
            board,
            running,
            handle: Some(handle),
        }
    }

    fn module(&self, name: &str) -> RemoteModule {
        RemoteModule::new(name, self.addr.clone())
    }

    fn request(&self, command: &str, options: Options) -> ReplyFrame {
        let mut requester = Requester::new(self.addr.clone());
        requester
            .request(&CommandRequest::bare(command).with_options(options))
            .unwrap()
    }

    fn join(&mut self, within: Duration) {
        let handle = self.handle.take().unwrap();
        let deadline = Instant::now() + within;
        while !handle.is_finished() {
            assert!(Instant::now() < deadline, "server did not stop in time");
            thread::sleep(Duration::from_millis(10));
        }
        handle.join().unwrap().unwrap();
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

// ─── Routing ────────────────────────────────────────────────────────

#[test]
fn det_id_reply_is_stamped_with_subsystem() {
    let server = Harness::start();
    let frame = server.request("det.id", Options::new());
    assert_eq!(frame.status, ReplyStatus::Ok);
    assert_eq!(frame.subsystem.as_deref(), Some("det"));
    assert_eq!(frame.fields.get("detector_id"), Some(&json!("growth-test")));
}

#[test]
fn unknown_subsystem_and_verb() {
    let server = Harness::start();

    let frame = server.request("foo.bar", Options::new());
    assert_eq!(frame.status, ReplyStatus::Error);
    assert_eq!(frame.message.as_deref(), Some("Subsystem 'foo' not found"));
    assert_eq!(frame.subsystem.as_deref(), Some("foo"));

    let frame = server.request("hv.explode", Options::new());
    assert_eq!(frame.status, ReplyStatus::Error);
    assert_eq!(frame.message.as_deref(), Some("Command 'hv.explode' not found"));
}

#[test]
fn malformed_message_gets_error_reply() {
    let server = Harness::start();
    let mut stream = TcpStream::connect(&server.addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();

    let body = b"{not json";
    stream.write_all(&(body.len() as u32).to_be_bytes()).unwrap();
    stream.write_all(body).unwrap();

    let frame: ReplyFrame = read_message(&mut stream).unwrap();
    assert_eq!(frame.status, ReplyStatus::Error);
    assert_eq!(frame.subsystem.as_deref(), Some("controller"));
    assert!(frame.message.unwrap().starts_with("Invalid command message"));

    // Same connection keeps working.
    let body = br#"{"command": "det.id"}"#;
    stream.write_all(&(body.len() as u32).to_be_bytes()).unwrap();
    stream.write_all(body).unwrap();
    let frame: ReplyFrame = read_message(&mut stream).unwrap();
    assert_eq!(frame.status, ReplyStatus::Ok);
}

#[test]
fn oversized_frame_is_rejected_after_pending_replies() {
    let server = Harness::start();
    let mut stream = TcpStream::connect(&server.addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();

    // A request and an oversized header in one write.
    let body = br#"{"command": "det.id"}"#;
    let mut bytes = (body.len() as u32).to_be_bytes().to_vec();
    bytes.extend_from_slice(body);
    bytes.extend_from_slice(&((MAX_FRAME_LEN + 1) as u32).to_be_bytes());
    stream.write_all(&bytes).unwrap();

    let frame: ReplyFrame = read_message(&mut stream).unwrap();
    assert_eq!(frame.status, ReplyStatus::Ok);
    assert_eq!(frame.subsystem.as_deref(), Some("det"));

    let frame: ReplyFrame = read_message(&mut stream).unwrap();
    assert_eq!(frame.status, ReplyStatus::Error);
    assert_eq!(frame.subsystem.as_deref(), Some("controller"));
    assert_eq!(
        frame.message,
        Some(format!("Frame too large ({} bytes)", MAX_FRAME_LEN + 1))
    );
    assert!(matches!(read_frame(&mut stream), Err(ProtocolError::Closed)));
}

// ─── HV ─────────────────────────────────────────────────────────────

#[test]
fn hv_set_on_status_off() {
    let server = Harness::start();
    let mut hv = server.module("hv");

    let reply = hv.send_command("set", Options::new().with("ch", 0).with("value_in_mV", 1000));
    assert!(reply.is_ok(), "{:?}", reply);
    assert_eq!(reply.field("value_in_HV_V"), Some(&json!(300.0)));
    assert!(hv.send_command("on", Options::new().with("ch", 0)).is_ok());

    let status = hv.send_command("status", Options::new());
    assert_eq!(status.field("0"), Some(&json!({"status": "on", "value_in_mV": 1000.0})));
    assert_eq!(status.field("1"), Some(&json!({"status": "off", "value_in_mV": 0.0})));

    let state = server.board.snapshot();
    assert_eq!(state.dac_mv[0], 1000.0);
    assert!(state.hv_output[0]);

    assert!(hv.send_command("off_all", Options::new()).is_ok());
    let state = server.board.snapshot();
    assert_eq!(state.dac_mv, [0.0, 0.0]);
    assert_eq!(state.hv_output, [false, false]);
}

#[test]
fn hv_set_above_limit_is_rejected() {
    let server = Harness::start();
    let mut hv = server.module("hv");

    let reply = hv.send_command("set", Options::new().with("ch", 1).with("value_in_mV", 3200));
    assert_eq!(
        reply.message(),
        Some("hv.set command failed exceeding the limit (900)")
    );
    assert_eq!(server.board.snapshot().dac_mv[1], 0.0);
}

// ─── HK and peers ───────────────────────────────────────────────────

#[test]
fn hk_read_returns_snapshot() {
    let server = Harness::start();
    server.board.set_slide_switch(Some(true));

    let reply = server.module("hk").send_command("read", Options::new());
    assert!(reply.is_ok());
    let snapshot: growth_common::telemetry::HkSnapshot = reply.decode().unwrap();
    assert_eq!(snapshot.hk.slow_adc.len(), 8);
    assert_eq!(snapshot.hk.slide_switch, growth_common::telemetry::SwitchPosition::On);
}

#[test]
fn unreachable_daq_is_error_and_server_survives() {
    let server = Harness::start();
    let reply = server.module("daq").send_command("status", Options::new());
    assert!(!reply.is_ok());

    let reply = server.module("disp").send_command("connected", Options::new());
    assert_eq!(reply.message(), Some("false"));

    assert!(server.module("det").send_command("id", Options::new()).is_ok());
}

#[test]
fn daq_commands_reach_zeromq_program() {
    let context = zmq::Context::new();
    let program = context.socket(zmq::REP).unwrap();
    program.bind("tcp://127.0.0.1:*").unwrap();
    let endpoint = program.get_last_endpoint().unwrap().unwrap();
    let daq = thread::spawn(move || {
        let mut commands = Vec::new();
        for reply in [
            json!({"status": "ok", "unixTime": 1.7e9, "daqStatus": "Paused"}),
            json!({"status": "ok", "unixTime": 1.7e9}),
        ] {
            let request: serde_json::Value =
                serde_json::from_slice(&program.recv_bytes(0).unwrap()).unwrap();
            commands.push(request["command"].as_str().unwrap().to_string());
            program.send(serde_json::to_vec(&reply).unwrap(), 0).unwrap();
        }
        commands
    });

    let server = Harness::with_peers(PeerEndpoints {
        daq: endpoint,
        ..dead_peers()
    });
    let mut module = server.module("daq");
    let reply = module.send_command("status", Options::new());
    assert!(reply.is_ok());
    assert_eq!(reply.field("daqStatus"), Some(&json!("Paused")));
    assert!(module.send_command("resume", Options::new()).is_ok());

    assert_eq!(daq.join().unwrap(), vec!["getStatus", "resume"]);
}

#[test]
fn heartbeat_interval_round_trip() {
    let server = Harness::start();
    let mut heartbeat = server.module("heartbeat");

    let reply = heartbeat.send_command(
        "set_wait_duration_sec",
        Options::new().with("wait_duration_sec", 60),
    );
    assert!(reply.is_ok());
    let reply = heartbeat.send_command("get_wait_duration_sec", Options::new());
    assert_eq!(reply.field("wait_duration_sec"), Some(&json!(60.0)));

    let reply = heartbeat.send_command(
        "set_wait_duration_sec",
        Options::new().with("wait_duration_sec", 3600),
    );
    assert!(!reply.is_ok());
}

#[test]
fn requests_from_several_clients_are_all_answered() {
    let server = Harness::start();
    let clients: Vec<_> = (0..4)
        .map(|_| {
            let mut det = server.module("det");
            thread::spawn(move || {
                (0..10)
                    .map(|_| det.send_command("id", Options::new()).is_ok())
                    .all(|ok| ok)
            })
        })
        .collect();
    for client in clients {
        assert!(client.join().unwrap());
    }
}

// ─── Shutdown ───────────────────────────────────────────────────────

#[test]
fn controller_stop_replies_then_exits() {
    let mut server = Harness::start();
    let frame = server.request("controller.stop", Options::new());
    assert_eq!(frame.status, ReplyStatus::Ok);
    assert_eq!(frame.message.as_deref(), Some("Controller has been stopped"));
    assert_eq!(frame.subsystem.as_deref(), Some("controller"));
    server.join(Duration::from_secs(2));
}

#[test]
fn stop_closes_idle_client_connections() {
    let mut server = Harness::start();
    let mut idle = TcpStream::connect(&server.addr).unwrap();
    idle.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    write_frame(&mut idle, &CommandRequest::bare("det.id")).unwrap();
    let frame: ReplyFrame = read_message(&mut idle).unwrap();
    assert_eq!(frame.status, ReplyStatus::Ok);

    let frame = server.request("controller.stop", Options::new());
    assert_eq!(frame.status, ReplyStatus::Ok);
    server.join(Duration::from_secs(2));

    assert!(matches!(read_frame(&mut idle), Err(ProtocolError::Closed)));
}

#[test]
fn clearing_running_flag_stops_server() {
    let mut server = Harness::start();
    server.running.store(false, Ordering::SeqCst);
    server.join(Duration::from_secs(2));
}

#[test]
fn bind_conflict_is_startup_error() {
    let taken = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = taken.local_addr().unwrap().to_string();
    let result = ControllerServer::from_board(
        &addr,
        config(),
        BoardDrivers::from_board(SimulatedBoard::new()),
        &PeerEndpoints::default(),
    );
    assert!(matches!(result, Err(ControllerError::Bind { .. })));
}

// ─── Properties ─────────────────────────────────────────────────────

fn dispatcher(board: &SimulatedBoard) -> (Dispatcher, Heartbeat) {
    let BoardDrivers { hv, hk, heartbeat } = BoardDrivers::from_board(board.clone());
    let heartbeat = Heartbeat::new(heartbeat);
    let peers = dead_peers();
    let registry = build_registry(config(), hv, hk, heartbeat.controls(), &peers).unwrap();
    (Dispatcher::new(registry), heartbeat)
}

const MODULE_NAMES: [&str; 7] = ["det", "hv", "disp", "hk", "daq", "heartbeat", "controller"];

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn unknown_targets_never_succeed(target in "[a-z]{1,12}", verb in "[a-z_]{1,12}") {
        prop_assume!(!MODULE_NAMES.contains(&target.as_str()));
        let board = SimulatedBoard::new();
        let (mut dispatcher, _heartbeat) = dispatcher(&board);

        let payload = serde_json::to_vec(&json!({"command": format!("{target}.{verb}")})).unwrap();
        let frame = dispatcher.handle_bytes(&payload);
        prop_assert_eq!(frame.status, ReplyStatus::Error);
        prop_assert_eq!(frame.message, Some(format!("Subsystem '{target}' not found")));
        prop_assert!(!dispatcher.is_stopping());
    }

    #[test]
    fn out_of_range_hv_set_leaves_state_unchanged(
        ch in 0u8..2,
        value in prop_oneof![-10_000.0f64..-0.001, 3300.001f64..10_000.0],
    ) {
        let board = SimulatedBoard::new();
        let (mut dispatcher, _heartbeat) = dispatcher(&board);

        let set = |mv: f64| {
            serde_json::to_vec(&json!({
                "command": "hv.set",
                "option": {"ch": ch, "value_in_mV": mv}
            }))
            .unwrap()
        };
        prop_assert_eq!(dispatcher.handle_bytes(&set(500.0)).status, ReplyStatus::Ok);
        let before = board.snapshot().dac_mv;

        let frame = dispatcher.handle_bytes(&set(value));
        prop_assert_eq!(frame.status, ReplyStatus::Error);
        prop_assert_eq!(board.snapshot().dac_mv, before);

        let status = dispatcher.handle_bytes(br#"{"command": "hv.status"}"#);
        prop_assert_eq!(
            status.fields.get(&ch.to_string()),
            Some(&json!({"status": "off", "value_in_mV": 500.0}))
        );
    }
}
