//! 分发器的性质测试：任意帧都不会让接收路径崩溃，且每帧都有去向

use std::sync::Arc;
use std::time::Duration;

use amiro_can::{LoopbackBus, SplittableAdapter};
use amiro_driver::{
    Disposition, Dispatcher, NetworkState, NodeConfig, NodeMetrics, ShellRelay, ShutdownSupervisor,
    Transmitter,
};
use amiro_protocol::{
    AmiroFrame, BoardId, FrameCodec, KinematicVelocity, Message, NUM_RING_SENSORS, ProtocolError,
};
use proptest::prelude::*;

struct Rig {
    dispatcher: Dispatcher,
    state: Arc<NetworkState>,
    metrics: Arc<NodeMetrics>,
    _supervisor: ShutdownSupervisor,
    _bus: LoopbackBus,
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

fn rig(board: u8) -> Rig {
    init_logging();
    let bus = LoopbackBus::new();
    let (_rx, tx) = bus.attach().split().unwrap();
    let config = NodeConfig::for_board(BoardId(board));
    let codec = FrameCodec::default();
    let metrics = Arc::new(NodeMetrics::new());
    let transmitter = Arc::new(Transmitter::new(
        tx,
        codec,
        config.board(),
        config.topology,
        Duration::from_millis(5),
        metrics.clone(),
    ));
    let shell = Arc::new(ShellRelay::new(
        config.board(),
        transmitter.clone(),
        16,
        metrics.clone(),
    ));
    let state = Arc::new(NetworkState::new(codec.layout().board_count()));
    let supervisor = ShutdownSupervisor::new();
    let dispatcher = Dispatcher::new(
        &config,
        codec,
        state.clone(),
        supervisor.signal(),
        shell,
        transmitter,
        None,
        metrics.clone(),
    );
    Rig {
        dispatcher,
        state,
        metrics,
        _supervisor: supervisor,
        _bus: bus,
    }
}

proptest! {
    #[test]
    fn arbitrary_standard_frames_are_accounted(
        frames in prop::collection::vec(
            (0u16..0x800, prop::collection::vec(any::<u8>(), 0..=8)),
            1..64,
        )
    ) {
        let rig = rig(4);
        let mut unknown = 0u64;
        let mut invalid_length = 0u64;
        let mut malformed = 0u64;

        for (id, data) in &frames {
            match rig.dispatcher.dispatch(&AmiroFrame::new_standard(*id, data)) {
                Disposition::Unknown => unknown += 1,
                Disposition::Dropped(ProtocolError::InvalidLength { .. }) => invalid_length += 1,
                Disposition::Dropped(_) => malformed += 1,
                _ => {},
            }
        }

        let snapshot = rig.metrics.snapshot();
        prop_assert_eq!(snapshot.rx_unknown_category, unknown);
        prop_assert_eq!(snapshot.rx_invalid_length, invalid_length);
        prop_assert_eq!(snapshot.rx_malformed, malformed);
    }

    #[test]
    fn last_report_wins(
        speeds in prop::collection::vec((any::<i32>(), any::<i32>()), 1..32),
        ring in prop::collection::vec((0..NUM_RING_SENSORS as u8, any::<u16>()), 1..32),
    ) {
        let rig = rig(4);
        let codec = FrameCodec::default();

        for &(v, w) in &speeds {
            let message = Message::ActualSpeed(KinematicVelocity::new(v, w));
            let frame = codec.encode(BoardId::DI_WHEEL_DRIVE, &message).unwrap();
            rig.dispatcher.dispatch(&frame);
        }
        let mut expected_ring = [0u16; NUM_RING_SENSORS];
        for &(index, value) in &ring {
            let message = Message::ProximityRing { index, value };
            let frame = codec.encode(BoardId::POWER_MANAGEMENT, &message).unwrap();
            rig.dispatcher.dispatch(&frame);
            expected_ring[index as usize] = value;
        }

        let (v, w) = *speeds.last().unwrap();
        let wheel = rig.state.board(BoardId::DI_WHEEL_DRIVE).unwrap();
        prop_assert_eq!(wheel.actual_speed(), KinematicVelocity::new(v, w));
        let power = rig.state.board(BoardId::POWER_MANAGEMENT).unwrap();
        prop_assert_eq!(power.proximity_ring_values(), expected_ring);
    }
}
