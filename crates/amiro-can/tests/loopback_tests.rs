//! 环回总线的多线程行为测试

use std::thread;
use std::time::Duration;

use amiro_can::{AmiroFrame, CanAdapter, CanError, LoopbackBus, RxAdapter, SplittableAdapter, TxAdapter};
use rand::Rng;

#[test]
fn test_send_order_preserved_per_sender() {
    let bus = LoopbackBus::with_capacity(4096);
    let sender = bus.attach();
    let receiver = bus.attach();

    let (_rx_unused, mut tx) = sender.split().unwrap();
    let (mut rx, _tx_unused) = receiver.split().unwrap();

    let count = 2000u16;
    let producer = thread::spawn(move || {
        for i in 0..count {
            tx.send_timeout(AmiroFrame::new_standard(i & 0x7FF, &i.to_be_bytes()), Duration::ZERO)
                .unwrap();
        }
    });
    producer.join().unwrap();

    for i in 0..count {
        let frame = rx.receive_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(frame.data_slice(), &i.to_be_bytes());
    }
}

#[test]
fn test_concurrent_senders_interleave_without_loss() {
    let bus = LoopbackBus::with_capacity(4096);
    let mut observer = bus.attach();

    let handles: Vec<_> = (0..4u8)
        .map(|sender_id| {
            let mut endpoint = bus.attach();
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                for seq in 0..200u8 {
                    endpoint
                        .send(AmiroFrame::new_standard(sender_id as u16, &[seq]))
                        .unwrap();
                    if rng.gen_bool(0.1) {
                        thread::yield_now();
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // 每个发送者的序号在接收端单调递增
    let mut last = [None::<u8>; 4];
    for _ in 0..800 {
        let frame = observer.receive_timeout(Duration::from_millis(100)).unwrap();
        let sender = frame.id as usize;
        if let Some(prev) = last[sender] {
            assert!(frame.data[0] > prev);
        }
        last[sender] = Some(frame.data[0]);
    }
    assert!(matches!(observer.try_receive(), Ok(None)));
}

#[test]
fn test_restart_from_rx_half_recovers_tx_half() {
    let bus = LoopbackBus::new();
    let (mut rx_a, mut tx_a) = bus.attach().split().unwrap();
    let (mut rx_b, _tx_b) = bus.attach().split().unwrap();

    bus.inject_bus_off();
    assert!(matches!(
        tx_a.send_timeout(AmiroFrame::new_standard(1, &[]), Duration::ZERO),
        Err(CanError::BusOff)
    ));
    assert!(matches!(
        rx_a.receive_timeout(Duration::ZERO),
        Err(CanError::BusOff)
    ));

    rx_a.restart().unwrap();
    tx_a.send_timeout(AmiroFrame::new_standard(2, &[]), Duration::ZERO)
        .unwrap();
    assert_eq!(rx_b.receive_timeout(Duration::from_millis(50)).unwrap().id, 2);
}
