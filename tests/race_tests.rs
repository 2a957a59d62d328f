//! Concurrent result reports: exactly one success may win a job.

mod test_harness;

use std::sync::Arc;

use crackteam::coordinator::{AssignmentStatus, JobStatus, ResultReport};
use crackteam::error::ErrorKind;
use crackteam::transport::Message;
use test_harness::TestTeam;

const HASH: &str = "e10adc3949ba59abbe56e057f20f883e";

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_successes_have_one_winner() {
    let team = TestTeam::new();
    let peer_ids: Vec<String> = (0..8).map(|i| format!("peer-{}", i)).collect();
    let mut peers = Vec::new();
    for id in &peer_ids {
        peers.push(team.connect(id).await);
    }

    let job_id = team.submit(HASH, &["rockyou.txt"]).await.job_id();
    assert_eq!(
        team.coordinator.get_job_status(job_id).unwrap().assignments.len(),
        peer_ids.len()
    );

    let coordinator = Arc::clone(&team.coordinator);
    let mut handles = Vec::new();
    for id in peer_ids.clone() {
        let coordinator = Arc::clone(&coordinator);
        handles.push(tokio::spawn(async move {
            let plaintext = format!("from-{}", id);
            let outcome = coordinator
                .report_result(job_id, &id, ResultReport::success(plaintext))
                .await;
            (id, outcome)
        }));
    }

    let mut winners = Vec::new();
    let mut conflicts = 0;
    for handle in handles {
        let (id, outcome) = handle.await.unwrap();
        match outcome {
            Ok(ack) => {
                assert!(ack.accepted);
                winners.push(id);
            }
            Err(e) => {
                assert_eq!(e.kind(), ErrorKind::ConflictAlreadyCompleted);
                conflicts += 1;
            }
        }
    }

    assert_eq!(winners.len(), 1, "exactly one report wins");
    assert_eq!(conflicts, peer_ids.len() - 1);

    let view = team.coordinator.get_job_status(job_id).unwrap();
    assert_eq!(view.status, JobStatus::Completed);
    let result = view.result.unwrap();
    assert_eq!(result.solved_by, winners[0]);
    assert_eq!(result.plaintext, format!("from-{}", winners[0]));
    for assignment in &view.assignments {
        let expected = if assignment.peer_id == winners[0] {
            AssignmentStatus::Succeeded
        } else {
            AssignmentStatus::Cancelled
        };
        assert_eq!(assignment.status, expected, "peer {}", assignment.peer_id);
    }
    assert_eq!(
        team.coordinator.cache().plaintext(HASH),
        Some(format!("from-{}", winners[0]))
    );

    // Every peer hears exactly one completion.
    for peer in &mut peers {
        let completions = peer
            .drain()
            .into_iter()
            .filter(|m| matches!(m, Message::JobCompleted { .. }))
            .count();
        assert_eq!(completions, 1, "peer {} completions", peer.peer_id);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submissions_share_one_job() {
    let team = TestTeam::new();
    let _peer = team.connect("p1").await;

    let mut handles = Vec::new();
    for _ in 0..16 {
        let coordinator = Arc::clone(&team.coordinator);
        handles.push(tokio::spawn(async move {
            coordinator
                .create_job(test_harness::request(HASH, &["rockyou.txt"]))
                .await
                .unwrap()
                .job_id()
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap());
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);
    assert_eq!(team.coordinator.list_jobs().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancel_racing_success_settles_once() {
    for _ in 0..20 {
        let team = TestTeam::new();
        let _peer = team.connect("p1").await;
        let job_id = team.submit(HASH, &["rockyou.txt"]).await.job_id();

        let solver = Arc::clone(&team.coordinator);
        let canceller = Arc::clone(&team.coordinator);
        let solve = tokio::spawn(async move {
            solver
                .report_result(job_id, "p1", ResultReport::success("123456"))
                .await
        });
        let cancel = tokio::spawn(async move { canceller.cancel_job(job_id, "abort").await });

        let solved = solve.await.unwrap();
        let cancelled = cancel.await.unwrap();

        let view = team.coordinator.get_job_status(job_id).unwrap();
        match view.status {
            JobStatus::Completed => {
                assert!(solved.unwrap().accepted);
                assert_eq!(cancelled.unwrap_err().kind(), ErrorKind::NotFound);
                assert_eq!(team.coordinator.cache().plaintext(HASH).as_deref(), Some("123456"));
            }
            JobStatus::Cancelled => {
                assert!(cancelled.unwrap());
                assert!(!solved.unwrap().accepted);
                assert!(team.coordinator.cache().is_empty());
            }
            other => panic!("unexpected final status {}", other),
        }
        assert_eq!(team.coordinator.active_job(HASH), None);
    }
}
