//! Cross-module scenarios spanning value equality/hashing, the socket
//! engine, and IP-literal validation together (spec §8 end-to-end
//! scenarios 5-7).

use std::io;
use std::time::{Duration, Instant};

use ember_runtime::{Heap, SocketEngine, Value};
use ember_runtime::socket::{is_valid_ipv4_literal, is_valid_ipv6_literal, new_pair};
use serial_test::serial;

/// Scenario 5: `int64(5)` and `float64(5.0)` are equal and share a hash.
#[test]
fn int_and_float_of_equal_value_are_equal_and_share_a_hash() {
    let mut heap = Heap::new();
    let a = Value::Int(5);
    let b = Value::Float(5.0);
    assert!(heap.values_equal(&a, &b));
    assert_eq!(heap.hash_value(&a), heap.hash_value(&b));
}

/// Scenario 7: IPv4/IPv6 literal validation, valid and invalid forms.
#[test]
fn ip_literal_validation_accepts_valid_forms_and_rejects_invalid_ones() {
    assert!(is_valid_ipv6_literal("::1"));
    assert!(is_valid_ipv6_literal("::"));
    assert!(!is_valid_ipv6_literal("1::2::3"));
    assert!(is_valid_ipv4_literal("1.2.3.4"));
    assert!(!is_valid_ipv4_literal("1.2.3"));
}

/// Scenario 6: creating a socket pair, sending a 256-byte blob through
/// one end via the socket engine's background send worker, and reading
/// on the other end yields the blob intact; once it's all been read, a
/// further read reports no more data available (`WouldBlock` on the raw
/// fd — the condition `ConnectOutcome::NeedToRead` names on the connect
/// path).
#[test]
#[serial(tcp_port)]
fn socket_pair_delivers_a_queued_blob_then_reports_no_more_data() {
    let (sender, receiver) = new_pair().expect("pair creation should succeed on loopback");
    let receiver_fd = receiver.raw_fd().expect("receiver should hold a live fd");

    let engine = SocketEngine::new().expect("engine should initialize");
    let sender_id = engine.register(sender);
    let blob = vec![0xABu8; 256];
    engine.queue_send(sender_id, &blob);

    let mut received = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(5);
    while received.len() < blob.len() && Instant::now() < deadline {
        let mut chunk = [0u8; 256];
        let n = unsafe { libc::recv(receiver_fd, chunk.as_mut_ptr().cast(), chunk.len(), 0) };
        if n > 0 {
            received.extend_from_slice(&chunk[..n as usize]);
        } else if n < 0 {
            let err = io::Error::last_os_error();
            assert_eq!(err.kind(), io::ErrorKind::WouldBlock, "unexpected recv error: {err}");
            std::thread::sleep(Duration::from_millis(5));
        }
    }
    assert_eq!(received, blob);

    let mut probe = [0u8; 1];
    let n = unsafe { libc::recv(receiver_fd, probe.as_mut_ptr().cast(), 1, 0) };
    assert_eq!(n, -1);
    assert_eq!(io::Error::last_os_error().kind(), io::ErrorKind::WouldBlock);

    engine.shutdown();
}
