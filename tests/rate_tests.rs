use rs2_pipeline::{collect_all, debounce, pipe, throttle, timeout, BoxReader, ReaderExt, StreamError};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

#[tokio::test(start_paused = true)]
async fn test_timeout_fires_and_read_resumes() {
    let (upstream, writer) = pipe::<u32>(4);
    let reader = timeout(upstream, Duration::from_millis(50));

    let started = Instant::now();
    assert_eq!(reader.recv().await, Err(StreamError::Timeout(Duration::from_millis(50))));
    assert_eq!(started.elapsed(), Duration::from_millis(50));

    tokio::spawn(async move {
        sleep(Duration::from_millis(20)).await;
        writer.send(9).await.unwrap();
    });
    // The parked upstream read picks up the late element
    assert_eq!(reader.recv().await, Ok(Some(9)));
    // Writer dropped, stream ends
    assert_eq!(reader.recv().await, Ok(None));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_passes_fast_elements() {
    let (upstream, writer) = pipe::<u32>(4);
    writer.send(1).await.unwrap();
    writer.send(2).await.unwrap();
    writer.close();

    let reader = upstream.timeout(Duration::from_secs(1));
    assert_eq!(collect_all(&reader).await.unwrap(), vec![1, 2]);
}

#[tokio::test]
async fn test_timeout_close_unblocks_pending_recv() {
    let (upstream, _writer) = pipe::<u32>(4);
    let reader: Arc<BoxReader<u32>> = Arc::new(timeout(upstream, Duration::from_secs(10)));

    let pending = {
        let reader = reader.clone();
        tokio::spawn(async move { reader.recv().await })
    };
    sleep(Duration::from_millis(10)).await;
    reader.close();

    let result = tokio::time::timeout(Duration::from_secs(1), pending)
        .await
        .expect("close should wake the pending recv")
        .unwrap();
    assert_eq!(result, Err(StreamError::Closed));
}

#[tokio::test(start_paused = true)]
async fn test_debounce_keeps_latest_of_burst() {
    let (upstream, writer) = pipe::<u32>(8);
    tokio::spawn(async move {
        for i in 1..=3 {
            writer.send(i).await.unwrap();
        }
        sleep(Duration::from_millis(100)).await;
        writer.send(4).await.unwrap();
        writer.close();
    });

    let reader = debounce(upstream, Duration::from_millis(50));
    assert_eq!(collect_all(&reader).await.unwrap(), vec![3, 4]);
}

#[tokio::test(start_paused = true)]
async fn test_debounce_emits_after_quiet_period() {
    let (upstream, writer) = pipe::<&str>(8);
    let reader = upstream.debounce(Duration::from_millis(30));

    writer.send("draft").await.unwrap();
    let started = Instant::now();
    assert_eq!(reader.recv().await, Ok(Some("draft")));
    assert!(started.elapsed() >= Duration::from_millis(30));
}

#[tokio::test(start_paused = true)]
async fn test_debounce_close_closes_upstream() {
    let (upstream, writer) = pipe::<u32>(8);
    let reader = debounce(upstream, Duration::from_millis(50));

    writer.send(1).await.unwrap();
    reader.close();
    assert_eq!(writer.send(2).await, Err(StreamError::Closed));
    assert_eq!(reader.recv().await, Err(StreamError::Closed));
}

#[tokio::test(start_paused = true)]
async fn test_debounce_forwards_upstream_error_after_pending() {
    let (upstream, writer) = pipe::<u32>(8);
    writer.send(5).await.unwrap();
    writer.close_with_error(StreamError::custom("feed lost"));

    let reader = debounce(upstream, Duration::from_millis(50));
    assert_eq!(reader.recv().await, Ok(Some(5)));
    assert_eq!(reader.recv().await, Err(StreamError::custom("feed lost")));
}

#[tokio::test(start_paused = true)]
async fn test_throttle_drops_intervening_elements() {
    let (upstream, writer) = pipe::<u32>(16);
    tokio::spawn(async move {
        for i in 0..10 {
            writer.send(i).await.unwrap();
            sleep(Duration::from_millis(30)).await;
        }
    });

    let reader = throttle(upstream, Duration::from_millis(100));
    assert_eq!(collect_all(&reader).await.unwrap(), vec![0, 4, 8]);
}

#[tokio::test(start_paused = true)]
async fn test_throttle_passes_slow_elements() {
    let (upstream, writer) = pipe::<u32>(16);
    tokio::spawn(async move {
        for i in 0..4 {
            writer.send(i).await.unwrap();
            sleep(Duration::from_millis(150)).await;
        }
    });

    let reader = upstream.throttle(Duration::from_millis(100));
    assert_eq!(collect_all(&reader).await.unwrap(), vec![0, 1, 2, 3]);
}

#[test]
#[should_panic(expected = "duration must be greater than zero")]
fn test_throttle_zero_duration_panics() {
    let (upstream, _writer) = pipe::<u32>(1);
    let _ = throttle(upstream, Duration::ZERO);
}
