//! Reclaiming work from silent or departed peers, and expiry of finished jobs.

mod test_harness;

use std::time::{Duration, Instant};

use crackteam::coordinator::{AssignmentStatus, CreateOutcome, JobStatus, ProgressReport, ResultReport};
use crackteam::error::ErrorKind;
use crackteam::transport::Message;
use test_harness::{test_config, TestPeer, TestTeam};

const HASH: &str = "25d55ad283aa400af464c76d713c07ad";

fn past_stale_window() -> Instant {
    Instant::now() + Duration::from_millis(test_config().stale_after_ms) + Duration::from_secs(1)
}

#[tokio::test]
async fn silent_assignment_moves_to_idle_peer() {
    let team = TestTeam::new();
    let mut p1 = team.connect("p1").await;
    let job_id = team.submit(HASH, &["rockyou.txt"]).await.job_id();
    let mut p2 = team.connect("p2").await;
    assert!(TestPeer::assignments(&p2.drain()).is_empty());
    p1.drain();

    let report = team.coordinator.sweep(past_stale_window()).await;
    assert_eq!(report.stale, 1);
    assert_eq!(report.reassigned, 1);

    let handed = TestPeer::assignments(&p2.drain());
    assert_eq!(handed, vec![(job_id, "rockyou.txt".to_string())]);
    assert!(TestPeer::assignments(&p1.drain()).is_empty());

    let view = team.coordinator.get_job_status(job_id).unwrap();
    assert_eq!(view.status, JobStatus::Running);
    assert_eq!(view.assignments.len(), 1);
    assert_eq!(view.assignments[0].peer_id, "p2");
    assert_eq!(view.retired_assignments[0].peer_id, "p1");
    assert_eq!(view.retired_assignments[0].status, AssignmentStatus::Stale);
}

#[tokio::test]
async fn reporting_peer_is_not_stale() {
    let team = TestTeam::new();
    let _p1 = team.connect("p1").await;
    let job_id = team.submit(HASH, &["rockyou.txt"]).await.job_id();

    let report = team.coordinator.sweep(Instant::now()).await;
    assert_eq!(report.stale, 0);

    let progress = ProgressReport {
        attempted: 1,
        total: 10,
        rate: 1.0,
    };
    team.coordinator.report_progress(job_id, "p1", progress).await.unwrap();
    let report = team.coordinator.sweep(Instant::now()).await;
    assert_eq!(report.stale, 0);
    assert_eq!(
        team.coordinator.get_job_status(job_id).unwrap().assignments[0].status,
        AssignmentStatus::Running
    );
}

#[tokio::test]
async fn stale_peer_can_still_deliver_the_answer() {
    let team = TestTeam::new();
    let _p1 = team.connect("p1").await;
    let job_id = team.submit(HASH, &["rockyou.txt"]).await.job_id();
    let mut p2 = team.connect("p2").await;
    team.coordinator.sweep(past_stale_window()).await;
    p2.drain();

    let ack = team
        .coordinator
        .report_result(job_id, "p1", ResultReport::success("12345678"))
        .await
        .unwrap();
    assert!(ack.accepted);

    let view = team.coordinator.get_job_status(job_id).unwrap();
    assert_eq!(view.status, JobStatus::Completed);
    assert_eq!(view.result.unwrap().solved_by, "p1");
    assert!(p2.drain().iter().any(|m| matches!(
        m,
        Message::JobCancelled { job_id: id, .. } if *id == job_id
    )));
}

#[tokio::test]
async fn reclaimed_chunk_waits_when_no_peer_is_alive() {
    let team = TestTeam::new();
    let _p1 = team.connect("p1").await;
    let job_id = team.submit(HASH, &["rockyou.txt"]).await.job_id();

    let beyond_peer_timeout =
        Instant::now() + Duration::from_millis(test_config().peer_timeout_ms) + Duration::from_secs(1);
    let report = team.coordinator.sweep(beyond_peer_timeout).await;
    assert_eq!(report.stale, 1);
    assert_eq!(report.reassigned, 0);

    let view = team.coordinator.get_job_status(job_id).unwrap();
    assert_eq!(view.status, JobStatus::Running);
    assert!(view.assignments.is_empty());
    assert_eq!(view.pending_chunks, 1);

    let mut p3 = team.connect("p3").await;
    let handed = TestPeer::assignments(&p3.drain());
    assert_eq!(handed.len(), 1);
}

#[tokio::test]
async fn disconnect_hands_work_to_remaining_peer() {
    let team = TestTeam::new();
    let p1 = team.connect("p1").await;
    let _p2 = team.connect("p2").await;
    let job_id = team.submit(HASH, &["a.txt", "b.txt"]).await.job_id();
    let mut p3 = team.connect("p3").await;
    p3.drain();

    let reclaimed = team.disconnect(&p1).await;
    assert_eq!(reclaimed, 1);

    let handed = TestPeer::assignments(&p3.drain());
    assert_eq!(handed, vec![(job_id, "a.txt".to_string())]);

    let view = team.coordinator.get_job_status(job_id).unwrap();
    let holders: Vec<&str> = view.assignments.iter().map(|a| a.peer_id.as_str()).collect();
    assert_eq!(holders, vec!["p2", "p3"]);
    assert!(team.coordinator.peers().get("p1").is_none());
}

#[tokio::test]
async fn unknown_peer_disconnect_is_a_no_op() {
    let team = TestTeam::new();
    assert_eq!(team.coordinator.disconnect_peer("ghost").await, 0);
}

#[tokio::test]
async fn finished_jobs_are_collected_after_retention() {
    let team = TestTeam::with_config(test_config().with_job_retention_secs(0));
    let _p1 = team.connect("p1").await;
    let job_id = team.submit(HASH, &["rockyou.txt"]).await.job_id();
    team.coordinator
        .report_result(job_id, "p1", ResultReport::success("iloveyou"))
        .await
        .unwrap();

    let report = team.coordinator.sweep(Instant::now()).await;
    assert_eq!(report.collected, 1);
    assert_eq!(
        team.coordinator.get_job_status(job_id).unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert!(team.coordinator.progress().snapshot(job_id).is_none());

    // The answer outlives the job.
    let again = team.submit(HASH, &["rockyou.txt"]).await;
    assert!(matches!(again, CreateOutcome::Cached { plaintext, .. } if plaintext == "iloveyou"));
}

#[tokio::test]
async fn running_jobs_are_never_collected() {
    let team = TestTeam::with_config(test_config().with_job_retention_secs(0));
    let _p1 = team.connect("p1").await;
    let job_id = team.submit(HASH, &["rockyou.txt"]).await.job_id();

    let report = team.coordinator.sweep(Instant::now()).await;
    assert_eq!(report.collected, 0);
    assert!(team.coordinator.get_job_status(job_id).is_ok());
}
