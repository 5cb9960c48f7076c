//! Reads word lengths on a simulated three member cluster and materializes
//! them into a view
use shardflow::config::JobOptions;
use shardflow::metrics::{MetricResults, MetricsFilter};
use shardflow::processor::MemberAddress;
use shardflow::runtime::LocalRunner;
use shardflow::sources::VecSource;
use shardflow::types::Instant;
use shardflow::view::TimestampCombiner;

fn main() {
    tracing_subscriber::fmt::init();

    let words = "the quick brown fox jumps over the lazy dog"
        .split_whitespace()
        .enumerate()
        .map(|(i, w)| (w.len(), Instant::from_millis(i as i64 * 100)));

    let runner = LocalRunner::builder()
        .members(
            (0..3)
                .map(|i| MemberAddress::from(([127, 0, 0, 1], 5701 + i)))
                .collect(),
        )
        .options(
            JobOptions::builder()
                .job_name("word-lengths")
                .local_parallelism(2)
                .build(),
        )
        .build();

    let submission = runner.read_into_view(
        "words",
        VecSource::new(words),
        "lengths",
        TimestampCombiner::Latest,
    );
    let state = submission.result.wait_until_finish(None);
    println!("job finished in state {state:?}");

    for record in submission.output {
        println!("{:?} @ {:?}: {:?}", record.windows()[0], record.timestamp(), record.value());
    }
    let metrics = submission
        .result
        .metrics()
        .query_metrics(&MetricsFilter::default());
    for counter in metrics.counters {
        println!("{}/{} = {}", counter.key.step, counter.key.metric, counter.value);
    }
}
