//! End-to-end runs of the adaptive loop against the simulated beamline.

use std::io::Write;

use adaptive_beamline::agent::{
    Agent, AgentConfig, AgentKind, ChaosAgent, OracleAgent, RoundRobinAgent,
};
use adaptive_beamline::error::{AgentError, MeasurementError, RunFailure};
use adaptive_beamline::experiment::{AdaptiveLoop, Document, LoopState, RunStatus};
use adaptive_beamline::hardware::SimulatedBeamline;
use adaptive_beamline::measurement::{Observation, SampleIndex};
use tokio::time::Duration;

fn flat_beamline(sample_count: usize) -> SimulatedBeamline {
    SimulatedBeamline::new(vec![1.0; sample_count])
}

fn graded_strengths(sample_count: usize) -> Vec<f64> {
    (0..sample_count)
        .map(|i| 1.0 / (i as f64 + 1.0))
        .collect()
}

/// Returns `picks` in order, then `tail` forever.
struct Scripted {
    picks: Vec<SampleIndex>,
    tail: SampleIndex,
}

impl Agent for Scripted {
    fn kind(&self) -> AgentKind {
        AgentKind::Custom
    }

    fn ask(&mut self, _last: Option<Observation>) -> Result<SampleIndex, AgentError> {
        if self.picks.is_empty() {
            Ok(self.tail)
        } else {
            Ok(self.picks.remove(0))
        }
    }
}

#[tokio::test]
async fn round_robin_visits_each_sample_k_times_in_order() {
    for sample_count in [1usize, 2, 5, 9] {
        for k in [1u64, 3] {
            let agent = RoundRobinAgent::new(sample_count).expect("agent");
            let mut adaptive = AdaptiveLoop::new(
                agent,
                sample_count,
                k * sample_count as u64,
                flat_beamline(sample_count),
            )
            .expect("loop");
            let report = adaptive.run().await.expect("run");

            assert!(report.status.is_success());
            let expected: Vec<usize> = (0..k).flat_map(|_| 0..sample_count).collect();
            assert_eq!(report.trace.samples(), expected);
            assert_eq!(adaptive.shot_counts(), vec![k; sample_count]);
        }
    }
}

#[tokio::test]
async fn nine_samples_twenty_five_shots() {
    let agent = RoundRobinAgent::new(9).expect("agent");
    let mut adaptive = AdaptiveLoop::new(agent, 9, 25, flat_beamline(9)).expect("loop");
    let report = adaptive.run().await.expect("run");

    assert_eq!(report.status, RunStatus::Success);
    assert_eq!(
        report.trace.samples(),
        vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 0, 1, 2, 3, 4, 5, 6, 7, 8, 0, 1, 2, 3, 4, 5, 6]
    );
    assert_eq!(adaptive.shot_counts(), vec![3, 3, 3, 3, 3, 3, 3, 2, 2]);
}

#[tokio::test]
async fn shot_counts_match_trace_for_every_agent() {
    let sample_count = 6;
    let strengths = graded_strengths(sample_count);
    let agents: Vec<Box<dyn Agent>> = vec![
        Box::new(RoundRobinAgent::new(sample_count).expect("round robin")),
        Box::new(ChaosAgent::with_seed(sample_count, 11).expect("chaos")),
        Box::new(OracleAgent::new(sample_count, &strengths).expect("oracle")),
    ];

    for agent in agents {
        let beamline = SimulatedBeamline::new(strengths.clone())
            .with_noise(0.1)
            .with_seed(5);
        let mut adaptive = AdaptiveLoop::new(agent, sample_count, 40, beamline).expect("loop");
        let report = adaptive.run().await.expect("run");

        assert!(report.status.is_success());
        assert_eq!(report.trace.len(), 40);
        for (sample, record) in report.records.iter().enumerate() {
            assert_eq!(record.shot_count as usize, report.trace.count_for(sample));
            assert_eq!(record.shot_count, adaptive.acquisition().exposures(sample));
        }
    }
}

#[tokio::test]
async fn deterministic_agents_reproduce_their_trace() {
    let sample_count = 5;
    let strengths = graded_strengths(sample_count);
    let configs = [
        AgentConfig::RoundRobin,
        AgentConfig::Oracle {
            strengths: strengths.clone(),
        },
    ];

    for config in configs {
        let mut traces = Vec::new();
        for _ in 0..2 {
            let agent = config.build(sample_count).expect("agent");
            let beamline = SimulatedBeamline::new(strengths.clone());
            let mut adaptive =
                AdaptiveLoop::new(agent, sample_count, 30, beamline).expect("loop");
            traces.push(adaptive.run().await.expect("run").trace);
        }
        assert_eq!(traces[0], traces[1], "{} trace differs", config.kind());
    }
}

#[tokio::test]
async fn seeded_chaos_reproduces_its_trace() {
    let first = ChaosAgent::with_seed(4, 99).expect("agent");
    let second = ChaosAgent::with_seed(4, 99).expect("agent");

    let mut a = AdaptiveLoop::new(first, 4, 20, flat_beamline(4)).expect("loop");
    let mut b = AdaptiveLoop::new(second, 4, 20, flat_beamline(4)).expect("loop");

    let trace_a = a.run().await.expect("run").trace;
    let trace_b = b.run().await.expect("run").trace;
    assert_eq!(trace_a.samples(), trace_b.samples());
}

#[tokio::test]
async fn oracle_spends_more_shots_on_weak_scatterers() {
    let strengths = vec![1.0, 0.5, 0.25];
    let agent = OracleAgent::new(3, &strengths).expect("agent");
    let mut adaptive =
        AdaptiveLoop::new(agent, 3, 70, SimulatedBeamline::new(strengths)).expect("loop");
    let report = adaptive.run().await.expect("run");

    // Shares are 1/7, 2/7 and 4/7 of the budget.
    assert_eq!(adaptive.shot_counts(), vec![10, 20, 40]);
    assert!(report.status.is_success());
}

#[tokio::test]
async fn zero_budget_makes_no_acquisition_calls() {
    let agent = RoundRobinAgent::new(3).expect("agent");
    let mut adaptive = AdaptiveLoop::new(agent, 3, 0, flat_beamline(3)).expect("loop");
    let mut docs = adaptive.subscribe();
    let report = adaptive.run().await.expect("run");

    assert_eq!(report.status, RunStatus::Success);
    assert!(report.trace.is_empty());
    assert!(adaptive.acquisition().call_log().is_empty());
    assert_eq!(adaptive.state(), &LoopState::Done(RunStatus::Success));

    assert!(matches!(docs.try_recv(), Ok(Document::Start(_))));
    match docs.try_recv() {
        Ok(Document::Stop(stop)) => assert_eq!(stop.num_events, 0),
        other => panic!("expected stop document, got {other:?}"),
    }
}

#[tokio::test]
async fn out_of_range_pick_keeps_prior_entries() {
    let agent = Scripted {
        picks: vec![0, 2, 1],
        tail: 3,
    };
    let mut adaptive = AdaptiveLoop::new(agent, 3, 10, flat_beamline(3)).expect("loop");
    let report = adaptive.run().await.expect("run");

    assert_eq!(
        report.status,
        RunStatus::Failed(RunFailure::AgentProtocol(AgentError::SampleOutOfRange {
            index: 3,
            sample_count: 3
        }))
    );
    assert_eq!(report.trace.samples(), vec![0, 2, 1]);
    assert_eq!(adaptive.remaining_shots(), 7);
    assert_eq!(adaptive.acquisition().call_log().len(), 3);
}

#[tokio::test]
async fn single_failure_is_retried_on_the_same_sample() {
    let mut beamline = flat_beamline(5);
    beamline.inject_failures(3, 1);

    let agent = RoundRobinAgent::new(5).expect("agent");
    let mut adaptive = AdaptiveLoop::new(agent, 5, 5, beamline).expect("loop");
    let report = adaptive.run().await.expect("run");

    assert!(report.status.is_success());
    assert_eq!(report.trace.samples(), vec![0, 1, 2, 3, 4]);
    assert_eq!(report.trace.count_for(3), 1);
    assert_eq!(report.records[3].shot_count, 1);
    assert_eq!(report.records[3].failures, 1);
    assert_eq!(adaptive.remaining_shots(), 0);
    // Six calls for five shots: sample 3 was attempted twice.
    assert_eq!(adaptive.acquisition().call_log().len(), 6);
}

#[tokio::test]
async fn repeated_failure_fails_the_run() {
    let mut beamline = flat_beamline(4);
    beamline.inject_failures(2, 2);

    let agent = RoundRobinAgent::new(4).expect("agent");
    let mut adaptive = AdaptiveLoop::new(agent, 4, 8, beamline).expect("loop");
    let report = adaptive.run().await.expect("run");

    match &report.status {
        RunStatus::Failed(RunFailure::Measurement(MeasurementError::Hardware { sample, .. })) => {
            assert_eq!(*sample, 2)
        }
        other => panic!("expected measurement failure, got {other:?}"),
    }
    assert_eq!(report.trace.samples(), vec![0, 1]);
    assert_eq!(report.records[2].failures, 2);
    // Two successful shots plus the abandoned one.
    assert_eq!(adaptive.remaining_shots(), 5);
}

#[tokio::test]
async fn learned_agent_with_bad_table_fails_the_run() {
    let mut artifact = tempfile::NamedTempFile::new().expect("temp file");
    write!(
        artifact,
        r#"{{
            "version": "broken-table",
            "model": {{
                "type": "table",
                "bin_edges": [],
                "actions": [[1], [2], [5]],
                "initial": 0
            }}
        }}"#
    )
    .expect("write artifact");

    let config = AgentConfig::Learned {
        model_path: artifact.path().to_path_buf(),
    };
    let agent = config.build(3).expect("agent");
    assert_eq!(agent.kind(), AgentKind::Learned);

    let mut adaptive = AdaptiveLoop::new(agent, 3, 10, flat_beamline(3)).expect("loop");
    let report = adaptive.run().await.expect("run");

    assert_eq!(
        report.status,
        RunStatus::Failed(RunFailure::AgentProtocol(AgentError::InvalidPolicyOutput {
            index: 5,
            sample_count: 3
        }))
    );
    assert_eq!(report.trace.samples(), vec![0, 1, 2]);
}

#[tokio::test]
async fn learned_agent_with_missing_artifact_is_rejected_up_front() {
    let config = AgentConfig::Learned {
        model_path: "does/not/exist.json".into(),
    };
    let err = match config.build(3) {
        Ok(agent) => panic!("expected load failure, built {}", agent.kind()),
        Err(err) => err,
    };
    assert!(matches!(err, AgentError::ModelLoad { .. }));
    assert!(err.is_construction_error());
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_at_the_next_shot_boundary() {
    let beamline = flat_beamline(3).with_exposure_time(Duration::from_millis(10));
    let agent = RoundRobinAgent::new(3).expect("agent");
    let mut adaptive = AdaptiveLoop::new(agent, 3, 100, beamline).expect("loop");
    let cancel = adaptive.cancel_handle();
    let mut docs = adaptive.subscribe();

    let watcher = async move {
        while let Ok(doc) = docs.recv().await {
            if let Document::Event(event) = doc {
                if event.seq_num == 2 {
                    cancel.cancel();
                    break;
                }
            }
        }
    };
    let (report, ()) = tokio::join!(adaptive.run(), watcher);
    let report = report.expect("run");

    assert_eq!(report.status, RunStatus::Cancelled);
    assert!(report.trace.len() >= 3);
    assert!(report.trace.len() < 100);
    for (sample, record) in report.records.iter().enumerate() {
        assert_eq!(record.shot_count as usize, report.trace.count_for(sample));
    }
}
