use rs2_pipeline::{
    collect_all, copy, from_iter, merge_named, pipe_with_config, BackpressureConfig, BackpressureStrategy, PipeConfig,
    ReaderExt,
};

#[derive(Debug, Clone, PartialEq)]
struct Reading {
    sensor: u32,
    value: i64,
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fan_out_then_fan_in() {
    let (source, writer) = pipe_with_config::<Reading>(PipeConfig::bounded(4));
    let producer = tokio::spawn(async move {
        for i in 0..200 {
            let reading = Reading {
                sensor: i % 4,
                value: i as i64,
            };
            writer.send(reading).await.unwrap();
        }
    });

    let mut branches = copy(
        source.backpressure(BackpressureConfig::new(BackpressureStrategy::Block, 16)),
        2,
    );
    let totals = branches
        .pop()
        .unwrap()
        .map(|r| r.value)
        .batch(50)
        .map(|batch| batch.into_iter().sum::<i64>());
    let hot = branches
        .pop()
        .unwrap()
        .filter(|r| r.sensor == 0)
        .map(|r| r.value);

    let merged = merge_named(vec![("totals".to_string(), totals), ("hot".to_string(), hot)]);
    let items = collect_all(&merged).await.unwrap();
    producer.await.unwrap();

    let expected_total: i64 = (0..200).sum();
    let expected_hot: i64 = (0..200).filter(|i| i % 4 == 0).sum();
    assert_eq!(items.len(), 4 + 50);
    assert_eq!(items.iter().sum::<i64>(), expected_total + expected_hot);
}

#[tokio::test]
async fn test_deduplicate_and_window() {
    let readings = from_iter(vec![3, 3, 1, 4, 1, 5, 9, 2, 6, 5, 3, 5])
        .distinct(|a, b| a == b)
        .window(3)
        .map(|w| w.iter().sum::<i32>());
    // distinct: [3, 1, 4, 5, 9, 2, 6]
    assert_eq!(collect_all(&readings).await.unwrap(), vec![8, 10, 18, 16, 17]);
}
