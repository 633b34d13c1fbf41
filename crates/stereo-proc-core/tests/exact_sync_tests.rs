mod common;

use common::*;
use itertools::Itertools;
use stereo_proc_core::SyncConfig;

const A: &[u64] = &[1, 2, 2, 3];
const B: &[u64] = &[1, 2, 3];
const C: &[u64] = &[2, 2, 3];

/// Interleaves the three streams, keeping each stream's own order.
fn interleave(order: &[(&'static str, &[u64])], pattern: &[usize]) -> StreamBuilder<&'static str> {
    let mut cursors = vec![0; order.len()];
    let mut builder = StreamBuilder::new();
    let total: usize = order.iter().map(|(_, ts)| ts.len()).sum();

    let mut step = 0;
    while cursors.iter().sum::<usize>() < total {
        let stream = pattern[step % pattern.len()];
        step += 1;
        let (key, timestamps) = order[stream];
        if let Some(&ts) = timestamps.get(cursors[stream]) {
            builder = builder.add_message(key, ts);
            cursors[stream] += 1;
        }
    }
    builder
}

#[tokio::test]
async fn test_three_streams_emit_matching_timestamps_once() {
    let streams = [("A", A), ("B", B), ("C", C)];

    // every stream order delivered one stream after the other
    for order in streams.iter().permutations(3) {
        let order: Vec<_> = order.into_iter().copied().collect();
        let stream = interleave(&order, &[0, 0, 0, 0, 1, 1, 1, 2, 2, 2]).build();

        let groups = run_sync(stream, ["A", "B", "C"], SyncConfig::new(5))
            .await
            .unwrap();

        assert_eq!(group_timestamps(&groups), vec![2, 3], "order {order:?}");
        assert_exact_groups(&groups);
        assert_timestamp_ordering(&groups);
    }

    // round robin and skewed interleavings
    for pattern in [&[0, 1, 2][..], &[2, 1, 0], &[1, 1, 0, 2], &[2, 2, 2, 0, 1]] {
        let stream = interleave(&streams, pattern).build();

        let groups = run_sync(stream, ["A", "B", "C"], SyncConfig::new(5))
            .await
            .unwrap();

        assert_eq!(group_timestamps(&groups), vec![2, 3], "pattern {pattern:?}");
        assert_exact_groups(&groups);
    }
}

#[tokio::test]
async fn test_group_preserves_key_order() {
    let stream = StreamBuilder::new()
        .add_message("C", 10)
        .add_message("B", 10)
        .add_message("A", 10)
        .build();

    let groups = run_sync(stream, ["A", "B", "C"], SyncConfig::new(3))
        .await
        .unwrap();

    assert_eq!(groups.len(), 1);
    let keys: Vec<_> = groups[0].keys().copied().collect();
    assert_eq!(keys, ["A", "B", "C"]);
}

#[tokio::test]
async fn test_late_frames_are_dropped() {
    // 3 completes before 2 does, so the 2s can never match anymore
    let stream = StreamBuilder::new()
        .add_messages("A", &[3, 2])
        .add_messages("B", &[3, 2])
        .build();

    let groups = run_sync(stream, ["A", "B"], SyncConfig::new(5))
        .await
        .unwrap();

    assert_eq!(group_timestamps(&groups), vec![3]);
}

#[tokio::test]
async fn test_unmatched_stream_stalls_silently() {
    let stream = StreamBuilder::new()
        .add_messages("left", &[100, 200, 300])
        .add_messages("right", &[150, 250, 350])
        .build();

    let groups = run_sync(stream, ["left", "right"], SyncConfig::new(3))
        .await
        .unwrap();

    assert!(groups.is_empty());
}

#[tokio::test]
async fn test_overflow_drops_oldest_pending() {
    // A queue of two keeps only 400 and 500 pending on "left"
    let stream = StreamBuilder::new()
        .add_messages("left", &[100, 200, 300, 400, 500])
        .add_messages("right", &[100, 500])
        .build();

    let groups = run_sync(stream, ["left", "right"], SyncConfig::new(2))
        .await
        .unwrap();

    assert_eq!(group_timestamps(&groups), vec![500]);
}

#[tokio::test]
async fn test_overflow_never_stalls_matching() {
    // "left" fills its queue with frames "right" never delivers.
    let mut builder = StreamBuilder::new().add_messages("left", &[100, 200]);
    for ts in (300..=1000).step_by(100) {
        builder = builder.add_message("left", ts).add_message("right", ts);
    }

    let groups = run_sync(builder.build(), ["left", "right"], SyncConfig::new(2))
        .await
        .unwrap();

    assert_eq!(
        group_timestamps(&groups),
        (300..=1000).step_by(100).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn test_input_error_is_forwarded() {
    use futures::{StreamExt, stream};
    use stereo_proc_core::sync;

    let input = stream::iter([
        Ok(("A", create_message(1))),
        Err(eyre::eyre!("transport closed")),
        Ok(("A", create_message(2))),
    ]);

    let mut output = sync(input, ["A"], SyncConfig::new(1)).unwrap();

    assert!(output.next().await.unwrap().is_ok());
    assert!(output.next().await.unwrap().is_err());
    assert!(output.next().await.is_none());
}
