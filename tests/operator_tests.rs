use quickcheck::{quickcheck, TestResult};
use rs2_pipeline::async_trait;
use rs2_pipeline::operators::*;
use rs2_pipeline::{
    collect_all, from_iter, from_slice, from_vec, pipe, BoxReader, ReaderExt, StreamError, StreamReader,
    StreamResult,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Counts upstream reads and records whether it was closed.
struct CountingReader {
    next: AtomicUsize,
    limit: usize,
    reads: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl StreamReader<usize> for CountingReader {
    async fn recv(&self) -> StreamResult<Option<usize>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let next = self.next.fetch_add(1, Ordering::SeqCst);
        Ok((next < self.limit).then_some(next))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

fn counting(limit: usize) -> (BoxReader<usize>, Arc<AtomicUsize>, Arc<AtomicBool>) {
    let reads = Arc::new(AtomicUsize::new(0));
    let closed = Arc::new(AtomicBool::new(false));
    let reader: BoxReader<usize> = Box::new(CountingReader {
        next: AtomicUsize::new(0),
        limit,
        reads: reads.clone(),
        closed: closed.clone(),
    });
    (reader, reads, closed)
}

#[tokio::test]
async fn test_map_filter_flat_map() {
    let doubled = map(from_iter(1..=5), |x| x * 2);
    assert_eq!(collect_all(&doubled).await.unwrap(), vec![2, 4, 6, 8, 10]);

    let evens = filter(from_iter(1..=10), |x| x % 2 == 0);
    assert_eq!(collect_all(&evens).await.unwrap(), vec![2, 4, 6, 8, 10]);

    // Empty expansions are skipped, not emitted as gaps
    let expanded = flat_map(from_vec(vec![0, 2, 0, 3]), |n| vec![n; n]);
    assert_eq!(collect_all(&expanded).await.unwrap(), vec![2, 2, 3, 3, 3]);
}

#[tokio::test]
async fn test_chained_operators_via_ext() {
    let words = from_slice(&["alpha", "beta", "gamma", "delta", "epsilon"])
        .map(|w| w.len())
        .filter(|len| *len > 4)
        .take(2);
    assert_eq!(collect_all(&words).await.unwrap(), vec![5, 5]);
}

#[tokio::test]
async fn test_reduce_operator() {
    let sum = reduce(from_iter(1..=4), 0, |acc, x| acc + x);
    assert_eq!(sum.recv().await, Ok(Some(10)));
    assert_eq!(sum.recv().await, Ok(None));

    // Empty upstream still yields the initial value
    let empty = from_iter(std::iter::empty::<i32>()).reduce(String::from("init"), |acc, x| format!("{}{}", acc, x));
    assert_eq!(collect_all(&empty).await.unwrap(), vec!["init".to_string()]);
}

#[tokio::test]
async fn test_take_and_skip() {
    assert_eq!(collect_all(&take(from_iter(1..=10), 3)).await.unwrap(), vec![1, 2, 3]);
    assert_eq!(collect_all(&skip(from_iter(1..=5), 3)).await.unwrap(), vec![4, 5]);
    assert_eq!(collect_all(&skip(from_iter(1..=5), 10)).await.unwrap(), Vec::<i32>::new());
    assert_eq!(collect_all(&take(from_iter(1..=2), 5)).await.unwrap(), vec![1, 2]);
}

#[tokio::test]
async fn test_take_zero_never_reads_upstream() {
    let (upstream, reads, _closed) = counting(10);
    let taken = take(upstream, 0);
    assert_eq!(taken.recv().await, Ok(None));
    assert_eq!(taken.recv().await, Ok(None));
    assert_eq!(reads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_take_stops_reading_at_limit() {
    let (upstream, reads, _closed) = counting(1_000);
    let taken = take(upstream, 3);
    assert_eq!(collect_all(&taken).await.unwrap(), vec![0, 1, 2]);
    assert_eq!(reads.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_close_reaches_upstream() {
    let (upstream, _reads, closed) = counting(10);
    let reader = upstream.map(|x| x + 1).filter(|x| x % 2 == 0).batch(2);
    reader.close();
    assert!(closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_take_while_and_skip_while() {
    let taken = take_while(from_vec(vec![1, 2, 3, 10, 4, 5]), |x| *x < 5);
    assert_eq!(collect_all(&taken).await.unwrap(), vec![1, 2, 3]);
    assert_eq!(taken.recv().await, Ok(None));

    let skipped = skip_while(from_vec(vec![1, 2, 3, 10, 4, 5]), |x| *x < 5);
    assert_eq!(collect_all(&skipped).await.unwrap(), vec![10, 4, 5]);
}

#[tokio::test]
async fn test_distinct_keeps_first_occurrence() {
    let unique = distinct(from_vec(vec![1, 2, 2, 3, 1, 4, 3, 5]), |a, b| a == b);
    assert_eq!(collect_all(&unique).await.unwrap(), vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn test_distinct_by_key() {
    let words = from_vec(vec!["apple", "avocado", "banana", "blueberry", "cherry"]);
    let by_initial = distinct_by(words, |w| w.chars().next());
    assert_eq!(
        collect_all(&by_initial).await.unwrap(),
        vec!["apple", "banana", "cherry"]
    );
}

#[tokio::test]
async fn test_zip_stops_at_shorter_side() {
    let zipped = zip_with(from_iter(1..=5), from_vec(vec![10, 20]), |a, b| a + b);
    assert_eq!(collect_all(&zipped).await.unwrap(), vec![11, 22]);
    assert_eq!(zipped.recv().await, Ok(None));
}

#[tokio::test]
async fn test_batch_flushes_remainder() {
    let batches = batch(from_slice(&[1, 2, 3, 4, 5, 6, 7]), 3);
    assert_eq!(
        collect_all(&batches).await.unwrap(),
        vec![vec![1, 2, 3], vec![4, 5, 6], vec![7]]
    );

    let none = batch(from_vec(Vec::<i32>::new()), 3);
    assert_eq!(collect_all(&none).await.unwrap(), Vec::<Vec<i32>>::new());
}

#[tokio::test]
async fn test_window_slides_by_one() {
    let windows = window(from_slice(&[1, 2, 3, 4, 5]), 3);
    assert_eq!(
        collect_all(&windows).await.unwrap(),
        vec![vec![1, 2, 3], vec![2, 3, 4], vec![3, 4, 5]]
    );

    let short = window(from_slice(&[1, 2]), 3);
    assert_eq!(collect_all(&short).await.unwrap(), vec![vec![1, 2]]);

    let none = window(from_vec(Vec::<i32>::new()), 3);
    assert_eq!(collect_all(&none).await.unwrap(), Vec::<Vec<i32>>::new());
}

#[test]
#[should_panic(expected = "size must be greater than zero")]
fn test_batch_zero_panics() {
    let _ = batch(from_iter(1..=3), 0);
}

#[tokio::test]
async fn test_terminal_signal_is_idempotent() {
    let reader = from_iter(1..=2).map(|x| x * 10).skip(1);
    assert_eq!(reader.recv().await, Ok(Some(20)));
    for _ in 0..3 {
        assert_eq!(reader.recv().await, Ok(None));
    }
}

#[tokio::test]
async fn test_errors_propagate_through_operators() {
    let (upstream, writer) = pipe::<i32>(8);
    writer.send(1).await.unwrap();
    writer.send(2).await.unwrap();
    writer.close_with_error(StreamError::custom("sensor offline"));

    let reader = upstream.map(|x| x * 2).filter(|_| true).window(2);
    assert_eq!(reader.recv().await, Ok(Some(vec![2, 4])));
    assert_eq!(reader.recv().await, Err(StreamError::custom("sensor offline")));
    assert_eq!(reader.recv().await, Err(StreamError::custom("sensor offline")));
}

#[tokio::test]
async fn test_zip_propagates_error_from_either_side() {
    let (right, writer) = pipe::<i32>(4);
    writer.send(5).await.unwrap();
    writer.close_with_error(StreamError::custom("right failed"));

    let zipped = zip_with(from_iter(1..=3), right, |a, b| a * b);
    assert_eq!(zipped.recv().await, Ok(Some(5)));
    assert_eq!(zipped.recv().await, Err(StreamError::custom("right failed")));
}

fn slice_after_skip_take(items: Vec<u8>, m: u8, n: u8) -> TestResult {
    let (m, n) = (m as usize % 20, n as usize % 20);
    let expected: Vec<u8> = items.iter().copied().skip(m).take(n).collect();

    let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
    let (skip_take, take_skip) = runtime.block_on(async {
        let a = collect_all(&take(skip(from_vec(items.clone()), m), n)).await.unwrap();
        let b = collect_all(&skip(take(from_vec(items.clone()), m + n), m)).await.unwrap();
        (a, b)
    });
    TestResult::from_bool(skip_take == expected && take_skip == expected)
}

#[test]
fn test_take_skip_matches_slicing() {
    quickcheck(slice_after_skip_take as fn(Vec<u8>, u8, u8) -> TestResult);
}
