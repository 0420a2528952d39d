//! 编解码属性测试：合法范围内的值必须无损往返

use amiro_protocol::*;
use proptest::prelude::*;

fn scaled(shift: u32, range: std::ops::RangeInclusive<i32>) -> impl Strategy<Value = i32> {
    range.prop_map(move |v| v << shift)
}

fn position() -> impl Strategy<Value = Position> {
    (
        scaled(POSITION_SHIFT, -(1 << 21)..=(1 << 21) - 1),
        scaled(POSITION_SHIFT, -(1 << 21)..=(1 << 21) - 1),
        scaled(ORIENTATION_SHIFT, 0..=MAX_ORIENTATION_URAD >> ORIENTATION_SHIFT),
    )
        .prop_map(|(x, y, f_z)| Position::new(x, y, f_z))
}

fn target_position() -> impl Strategy<Value = TargetPosition> {
    (
        scaled(POSITION_SHIFT, i16::MIN as i32..=i16::MAX as i32),
        scaled(POSITION_SHIFT, i16::MIN as i32..=i16::MAX as i32),
        scaled(ORIENTATION_SHIFT, 0..=MAX_ORIENTATION_URAD >> ORIENTATION_SHIFT),
        any::<u16>(),
    )
        .prop_map(|(x, y, f_z, deadline_ms)| TargetPosition {
            position: Position::new(x, y, f_z),
            deadline_ms,
        })
}

fn velocity() -> impl Strategy<Value = KinematicVelocity> {
    (any::<i32>(), any::<i32>()).prop_map(|(v, w)| KinematicVelocity::new(v, w))
}

fn axes() -> impl Strategy<Value = Axes3> {
    (any::<i16>(), any::<i16>(), any::<i16>()).prop_map(|(x, y, z)| Axes3::new(x, y, z))
}

fn chunk() -> impl Strategy<Value = ShellChunk> {
    prop::collection::vec(any::<u8>(), 1..=8).prop_map(|bytes| ShellChunk::new(&bytes).unwrap())
}

fn board() -> impl Strategy<Value = BoardId> {
    (0u8..=7).prop_map(BoardId)
}

fn group() -> impl Strategy<Value = CalibrationGroup> {
    prop_oneof![Just(CalibrationGroup::Ring), Just(CalibrationGroup::Floor)]
}

fn message() -> impl Strategy<Value = Message> {
    prop_oneof![
        (board(), chunk()).prop_map(|(from, chunk)| Message::ShellQuery { from, chunk }),
        (board(), chunk()).prop_map(|(from, chunk)| Message::ShellReply { from, chunk }),
        board().prop_map(|target| Message::ShellSwitch { target }),
        (0u8..8, any::<u32>()).prop_map(|(index, rgb)| Message::LightColor {
            index,
            color: Color::from_u32(rgb),
        }),
        (0u8..=MAX_BRIGHTNESS).prop_map(Message::LightBrightness),
        Just(Message::Shutdown),
        any::<u8>().prop_map(Message::RobotId),
        (0u8..8, any::<u16>()).prop_map(|(index, value)| Message::ProximityRing { index, value }),
        (0u8..4, any::<u16>()).prop_map(|(index, value)| Message::ProximityFloor { index, value }),
        velocity().prop_map(Message::ActualSpeed),
        velocity().prop_map(Message::TargetSpeed),
        position().prop_map(Message::Odometry),
        position().prop_map(Message::SetOdometry),
        (any::<u8>(), 0u8..=100, any::<u16>(), any::<u16>()).prop_map(
            |(flags, soc, minutes, mw)| Message::PowerStatus(PowerStatus {
                flags: ChargingFlags::from_byte(flags),
                state_of_charge: soc,
                minutes_remaining: minutes,
                power_consumption_mw: mw,
            })
        ),
        axes().prop_map(Message::Magnetometer),
        axes().prop_map(Message::Gyroscope),
        target_position().prop_map(Message::TargetPosition),
        (-1.0e6f32..1.0e6, -1.0e6f32..1.0e6)
            .prop_map(|(ed, eb)| Message::KinematicConstants(KinematicConstants { ed, eb })),
        (group(), board()).prop_map(|(group, requester)| Message::Calibrate { group, requester }),
        (group(), prop_oneof![Just(CalibrationStatus::Ok), Just(CalibrationStatus::Failed)])
            .prop_map(|(group, status)| Message::CalibrationDone { group, status }),
    ]
}

proptest! {
    #[test]
    fn roundtrip_every_category(message in message(), board in board()) {
        let codec = FrameCodec::new(IdLayout::STANDARD);
        let board = match message.category().addressing() {
            Addressing::Broadcast => BoardId::BROADCAST,
            _ => board,
        };

        let frame = codec.encode(board, &message).unwrap();
        prop_assert!(message.category().dlc().accepts(frame.len));

        let envelope = codec.decode(&frame).unwrap();
        prop_assert_eq!(envelope.category(), message.category());
        prop_assert_eq!(envelope.board, board);
        prop_assert_eq!(envelope.index(), message.index());
        prop_assert_eq!(envelope.message, message);
    }

    #[test]
    fn decode_never_panics(id in 0u32..0x800, data in prop::collection::vec(any::<u8>(), 0..=8)) {
        let codec = FrameCodec::new(IdLayout::STANDARD);
        let frame = AmiroFrame::new_standard(id as u16, &data);
        let _ = codec.decode(&frame);
    }

    #[test]
    fn wrong_dlc_is_always_rejected(category_index in 0usize..20, len in 0usize..=8) {
        let category = Category::ALL[category_index];
        prop_assume!(!category.dlc().accepts(len as u8));

        let id = IdLayout::STANDARD.compose(category.code(), BoardId(1), 0).unwrap();
        let frame = AmiroFrame::new_standard(id as u16, &vec![0u8; len]);
        let rejected = matches!(
            FrameCodec::default().decode(&frame),
            Err(ProtocolError::InvalidLength { .. })
        );
        prop_assert!(rejected);
    }
}
