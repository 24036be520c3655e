//! Smoke tests for the synthetic library run.

use std::time::Duration;

use sw_core::config::Config;
use sw_core::QueueKind;
use sweeper::simulate::{self, generate_items, SimulateOptions};

fn options() -> SimulateOptions {
    SimulateOptions {
        items: 4,
        seasons: 1,
        libraries: 2,
        fail_rate: 0.0,
        skip_rate: 0.0,
        max_work_ms: 50,
        timeout: Duration::from_secs(120),
    }
}

#[test]
fn generated_library_has_movies_and_episodes() {
    let items = generate_items(&options());
    let episodes = items.iter().filter(|i| i.is_episode()).count();
    assert_eq!(items.len() - episodes, 4);
    assert!((3..=10).contains(&episodes));
    assert!(items.iter().all(|i| i.library_id.is_some()));
}

#[tokio::test(start_paused = true)]
async fn clean_run_settles_and_completes_everything() {
    let mut config = Config::default();
    config.scheduler.throttle_secs = 1;

    let summary = simulate::run(config, options()).await;
    assert!(summary.settled);

    let media = &summary.queues[&QueueKind::MediaInfo];
    assert!(media.queued > 4);
    assert_eq!(media.completed, media.queued);
    assert_eq!(media.failed, 0);

    let fingerprint = &summary.queues[&QueueKind::Fingerprint];
    assert_eq!(fingerprint.completed, fingerprint.queued);
    assert_eq!(summary.seasons_aggregated, 1);

    // Episodes continue from media info into intro skip.
    let intro = &summary.queues[&QueueKind::IntroSkip];
    assert_eq!(intro.queued, fingerprint.queued);
    assert_eq!(intro.completed, intro.queued);
}
