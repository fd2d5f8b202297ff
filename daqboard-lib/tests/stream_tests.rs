mod common;

use common::{MockTransport, record, stream};
use daqboard_lib::protocol::DaqBoard;
use daqboard_lib::stream::{AdcStreamDecoder, RECORD_SIZE, RawStreamTracker};

#[tokio::test]
async fn test_acquisition_loop_over_mock_board() {
    common::init_tracing();
    let bytes = stream(10, true);
    let mut board = DaqBoard::new(MockTransport::new()).unwrap();
    // reads of varying length, none aligned to a record
    let mut start = 0;
    for len in [7, 50, 1, 33, 100, 53] {
        let end = (start + len).min(bytes.len());
        board.transport_mut().push_adc(&bytes[start..end]);
        start = end;
    }
    assert_eq!(start, bytes.len());

    let mut decoder = AdcStreamDecoder::new();
    let mut records = Vec::new();
    let mut reads = 0;
    loop {
        let chunk = board.read_adc_chunk(4096).await.unwrap();
        reads += 1;
        let decoded = decoder.decode_chunk(&chunk);
        records.extend(decoded.records);
        if decoded.end_of_run {
            break;
        }
    }

    assert_eq!(reads, 6);
    assert_eq!(records.len(), 10);
    for (i, r) in records.iter().enumerate() {
        assert_eq!(*r, record(i as u32));
    }
    assert_eq!(decoder.records_decoded(), 10);
    decoder.finish().unwrap();
}

#[test]
fn test_decoded_record_telemetry() {
    let bytes = stream(1, false);
    let mut decoder = AdcStreamDecoder::new();
    let out = decoder.decode_chunk(&bytes);
    let r = &out.records[0];

    assert!((r.temperature_k() - 298.15).abs() < 0.1);
    assert!((r.digital_current_ma() - 1000.0 * 3.3 / 4096.0 * 100.0).abs() < 1e-9);
    assert!((r.analog_current_ma() - 329.919).abs() < 0.01);
    assert!(r.to_string().starts_with("ts=0x"));
}

#[test]
fn test_raw_tracker_bookkeeping() {
    let bytes = stream(4, true);
    let mut tracker = RawStreamTracker::new();

    let a = tracker.track(&bytes[..30]);
    assert_eq!(a.records, 1);
    assert_eq!(tracker.leftover_words(), 1);
    assert!(!a.end_of_run);

    let b = tracker.track(&bytes[30..50]);
    assert_eq!(b.records, 1);
    assert_eq!(tracker.leftover_words(), 0);

    let c = tracker.track(&bytes[50..]);
    assert_eq!(c.records, 2);
    assert_eq!(tracker.leftover_words(), 1);
    assert!(c.end_of_run);

    assert_eq!(tracker.total_records(), 4);
    assert_eq!(tracker.total_bytes(), bytes.len() as u64);

    tracker.reset();
    assert_eq!(tracker.total_bytes(), 0);
    assert!(!tracker.track(&[]).end_of_run);
}

#[test]
fn test_raw_tracker_agrees_with_decoder() {
    let bytes = stream(9, true);
    let mut tracker = RawStreamTracker::new();
    let mut decoder = AdcStreamDecoder::new();
    for chunk in bytes.chunks(RECORD_SIZE + 5) {
        let raw = tracker.track(chunk);
        let decoded = decoder.decode_chunk(chunk);
        assert_eq!(raw.records, decoded.records.len());
        assert_eq!(raw.end_of_run, decoded.end_of_run);
        assert_eq!(tracker.leftover_words(), decoder.leftover_words());
    }
}
