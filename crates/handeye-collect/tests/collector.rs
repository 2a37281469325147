use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use handeye_collect::{
    CalibrationConfig, CalibrationResult, CaptureError, CollectError, CollectorState,
    MotionRequester, MoveResponse, PatternCapture, Pose3D, PosePairCollector, SampleSet,
    ServiceError, SolverClient,
};
use nalgebra::{UnitQuaternion, Vector3};

type Journal = Rc<RefCell<Vec<String>>>;

fn pose(x: f64, y: f64, z: f64) -> Pose3D {
    Pose3D::from_parts(Vector3::new(x, y, z), UnitQuaternion::identity())
}

fn config(target: usize) -> CalibrationConfig {
    CalibrationConfig::new(target, 12.5, 0.5, Pose3D::identity()).without_delays()
}

/// Capture double: attempt counts come from a script (default: 3 observations).
///
/// The estimated pattern pose encodes the attempt number in `x` and the move
/// that preceded it in `z`.
struct ScriptedCapture {
    journal: Journal,
    last_move: Rc<RefCell<usize>>,
    counts: VecDeque<usize>,
    fail_begin: bool,
    attempts: usize,
    shutdowns: usize,
}

impl ScriptedCapture {
    fn new(journal: &Journal, last_move: &Rc<RefCell<usize>>, counts: &[usize]) -> Self {
        Self {
            journal: Rc::clone(journal),
            last_move: Rc::clone(last_move),
            counts: counts.iter().copied().collect(),
            fail_begin: false,
            attempts: 0,
            shutdowns: 0,
        }
    }

    fn note(&self, event: &str) {
        self.journal.borrow_mut().push(event.to_string());
    }
}

impl PatternCapture for ScriptedCapture {
    fn begin_calibration_session(&mut self, _grid_spacing: f64) -> Result<(), CaptureError> {
        self.note("begin");
        if self.fail_begin {
            return Err(CaptureError::CaptureFailed {
                reason: "device busy".into(),
            });
        }
        Ok(())
    }

    fn start_streaming(&mut self) -> Result<(), CaptureError> {
        self.note("start");
        Ok(())
    }

    fn stop_streaming(&mut self) -> Result<(), CaptureError> {
        self.note("stop");
        Ok(())
    }

    fn clear_buffer(&mut self) -> Result<(), CaptureError> {
        self.note("clear");
        Ok(())
    }

    fn capture_attempt(&mut self) -> Result<usize, CaptureError> {
        self.attempts += 1;
        self.note("attempt");
        Ok(self.counts.pop_front().unwrap_or(3))
    }

    fn estimate_pattern_pose(&mut self) -> Result<Pose3D, CaptureError> {
        self.note("estimate");
        Ok(pose(self.attempts as f64, 0.0, *self.last_move.borrow() as f64))
    }

    fn shutdown(&mut self) -> Result<(), CaptureError> {
        self.shutdowns += 1;
        self.note("shutdown");
        Ok(())
    }
}

/// Motion double: replies come from a script, then every move succeeds.
///
/// The achieved robot pose encodes the 1-based call number in `y`.
struct ScriptedMotion {
    journal: Journal,
    last_move: Rc<RefCell<usize>>,
    replies: VecDeque<Result<bool, ServiceError>>,
    calls: usize,
}

impl ScriptedMotion {
    fn new(journal: &Journal, last_move: &Rc<RefCell<usize>>) -> Self {
        Self {
            journal: Rc::clone(journal),
            last_move: Rc::clone(last_move),
            replies: VecDeque::new(),
            calls: 0,
        }
    }

    fn with_replies(mut self, replies: Vec<Result<bool, ServiceError>>) -> Self {
        self.replies = replies.into();
        self
    }
}

impl MotionRequester for ScriptedMotion {
    fn request_random_move(
        &mut self,
        _pattern_pose: &Pose3D,
        min_radius: f64,
    ) -> Result<MoveResponse, ServiceError> {
        assert_eq!(min_radius, 0.5);
        self.calls += 1;
        *self.last_move.borrow_mut() = self.calls;
        self.journal.borrow_mut().push("move".to_string());
        match self.replies.pop_front().unwrap_or(Ok(true)) {
            Ok(true) => Ok(MoveResponse::reached(pose(0.0, self.calls as f64, 0.0))),
            Ok(false) => Ok(MoveResponse::infeasible()),
            Err(err) => Err(err),
        }
    }
}

struct RecordingSolver {
    journal: Journal,
    reply: CalibrationResult,
    received: Vec<SampleSet>,
}

impl RecordingSolver {
    fn new(journal: &Journal, reply: CalibrationResult) -> Self {
        Self {
            journal: Rc::clone(journal),
            reply,
            received: Vec::new(),
        }
    }
}

impl SolverClient for RecordingSolver {
    fn solve(&mut self, samples: &SampleSet) -> CalibrationResult {
        self.journal.borrow_mut().push("solve".to_string());
        self.received.push(samples.clone());
        self.reply
    }
}

struct Rig {
    journal: Journal,
    collector: PosePairCollector<ScriptedCapture, ScriptedMotion, RecordingSolver>,
}

fn rig_with(
    target: usize,
    counts: &[usize],
    replies: Vec<Result<bool, ServiceError>>,
    solver_reply: CalibrationResult,
) -> Rig {
    let journal = Journal::default();
    let last_move = Rc::new(RefCell::new(0));
    let capture = ScriptedCapture::new(&journal, &last_move, counts);
    let motion = ScriptedMotion::new(&journal, &last_move).with_replies(replies);
    let solver = RecordingSolver::new(&journal, solver_reply);
    let collector = PosePairCollector::new(config(target), capture, motion, solver).unwrap();
    Rig { journal, collector }
}

fn rig(target: usize) -> Rig {
    rig_with(
        target,
        &[],
        Vec::new(),
        CalibrationResult::solved(pose(0.1, 0.2, 0.3)),
    )
}

#[test]
fn solver_receives_exactly_the_target_count() {
    let mut rig = rig(4);
    let result = rig.collector.run().unwrap();
    assert!(result.is_success());

    let solver = rig.collector.solver();
    assert_eq!(solver.received.len(), 1);
    assert_eq!(solver.received[0].len(), 4);
    assert!(rig.collector.samples().is_empty());
    assert_eq!(rig.collector.stats().samples_collected, 4);
    assert_eq!(rig.collector.state(), CollectorState::Finished);
}

#[test]
fn samples_pair_poses_from_the_same_iteration() {
    // Second move misses the pattern entirely; third move needs two attempts.
    let counts = [3, 0, 1, 1, 2, 2, 2, 3];
    let mut rig = rig_with(
        3,
        &counts,
        Vec::new(),
        CalibrationResult::solved(Pose3D::identity()),
    );
    rig.collector.run().unwrap();

    let received = &rig.collector.solver().received[0];
    let moves: Vec<f64> = received.iter().map(|s| s.robot_pose().translation().y).collect();
    assert_eq!(moves, vec![1.0, 3.0, 4.0]);
    for sample in received {
        assert_eq!(
            sample.robot_pose().translation().y,
            sample.pattern_pose().translation().z
        );
    }
    assert_eq!(rig.collector.stats().discarded_iterations, 1);
    assert_eq!(rig.collector.stats().motion_requests, 4);
}

#[test]
fn success_on_last_attempt_uses_that_estimate() {
    let mut rig = rig_with(
        1,
        &[0, 1, 1, 2, 3],
        Vec::new(),
        CalibrationResult::solved(Pose3D::identity()),
    );
    rig.collector.run().unwrap();

    let sample = rig.collector.solver().received[0].as_slice()[0];
    assert_eq!(sample.pattern_pose().translation().x, 5.0);
    assert_eq!(rig.collector.capture().attempts, 5);
    assert_eq!(rig.collector.motion().calls, 1);
}

#[test]
fn exhausted_attempts_discard_the_iteration_and_move_again() {
    let mut rig = rig_with(
        1,
        &[0, 1, 1, 2, 2, 3],
        Vec::new(),
        CalibrationResult::solved(Pose3D::identity()),
    );
    rig.collector.run().unwrap();

    assert_eq!(rig.collector.motion().calls, 2);
    assert_eq!(rig.collector.capture().attempts, 6);
    let received = &rig.collector.solver().received[0];
    assert_eq!(received.len(), 1);
    assert_eq!(received.as_slice()[0].robot_pose().translation().y, 2.0);

    let journal = rig.journal.borrow();
    let estimates = journal.iter().filter(|e| *e == "estimate").count();
    assert_eq!(estimates, 1);
}

#[test]
fn infeasible_third_move_aborts_with_two_samples() {
    let mut rig = rig_with(
        5,
        &[],
        vec![Ok(true), Ok(true), Ok(false)],
        CalibrationResult::solved(Pose3D::identity()),
    );
    let err = rig.collector.run().unwrap_err();

    assert!(matches!(err, CollectError::MotionInfeasible { collected: 2 }));
    assert_eq!(err.collected(), Some(2));
    assert!(rig.collector.solver().received.is_empty());
    assert_eq!(rig.collector.samples().len(), 2);
    assert_eq!(rig.collector.state(), CollectorState::Aborted);
    assert_eq!(rig.collector.capture().shutdowns, 1);
}

#[test]
fn unreachable_motion_service_is_reported_separately() {
    let mut rig = rig_with(
        5,
        &[],
        vec![
            Ok(true),
            Err(ServiceError::unreachable("calibration_move_random", "no route")),
        ],
        CalibrationResult::solved(Pose3D::identity()),
    );
    let err = rig.collector.run().unwrap_err();

    match err {
        CollectError::MotionUnreachable { collected, source } => {
            assert_eq!(collected, 1);
            assert!(source.is_unreachable());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(rig.collector.solver().received.is_empty());
    assert_eq!(rig.collector.capture().shutdowns, 1);
}

#[test]
fn rejected_move_is_not_reported_as_unreachable() {
    let mut rig = rig_with(
        5,
        &[],
        vec![Err(ServiceError::rejected(
            "calibration_move_random",
            "no IK solution",
        ))],
        CalibrationResult::solved(Pose3D::identity()),
    );
    let err = rig.collector.run().unwrap_err();

    match &err {
        CollectError::MotionRejected { collected, source } => {
            assert_eq!(*collected, 0);
            assert!(!source.is_unreachable());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.collected(), Some(0));
    assert!(err.to_string().contains("rejected"));
    assert_eq!(rig.collector.state(), CollectorState::Aborted);
    assert!(rig.collector.solver().received.is_empty());
    assert_eq!(rig.collector.capture().shutdowns, 1);
}

#[test]
fn solver_failure_gives_result_without_transform() {
    let mut rig = rig_with(3, &[], Vec::new(), CalibrationResult::failed());
    let result = rig.collector.run().unwrap();

    assert!(!result.is_success());
    assert!(result.transform().is_none());
    assert_eq!(rig.collector.state(), CollectorState::Finished);
    assert_eq!(rig.collector.capture().shutdowns, 1);
    assert!(rig.collector.samples().is_empty());
}

#[test]
fn end_to_end_with_three_samples() {
    let expected = pose(0.05, -0.02, 0.11);
    let mut rig = rig_with(3, &[], Vec::new(), CalibrationResult::solved(expected));
    let result = rig.collector.run().unwrap();

    assert_eq!(result.transform(), Some(&expected));
    assert_eq!(rig.collector.solver().received[0].len(), 3);
    assert_eq!(rig.collector.capture().shutdowns, 1);

    // Session is released before the solver is called.
    let journal = rig.journal.borrow();
    let shutdown = journal.iter().position(|e| e == "shutdown").unwrap();
    let solve = journal.iter().position(|e| e == "solve").unwrap();
    assert!(shutdown < solve);
}

#[test]
fn each_iteration_stops_and_clears_before_capturing() {
    let mut rig = rig(1);
    rig.collector.run().unwrap();

    let journal = rig.journal.borrow();
    assert_eq!(
        *journal,
        vec![
            "begin", "start", "move", "stop", "clear", "attempt", "estimate", "clear",
            "shutdown", "solve",
        ]
    );
}

#[test]
fn collector_runs_only_once() {
    let mut rig = rig(1);
    rig.collector.run().unwrap();
    assert!(matches!(rig.collector.run(), Err(CollectError::AlreadyRan)));
    assert_eq!(rig.collector.solver().received.len(), 1);
    assert_eq!(rig.collector.capture().shutdowns, 1);
}

#[test]
fn cancel_flag_stops_before_the_next_iteration() {
    let mut rig = rig(3);
    let flag = Arc::new(AtomicBool::new(true));
    let mut collector = rig.collector.with_cancel_flag(flag);
    let err = collector.run().unwrap_err();

    assert!(matches!(err, CollectError::Cancelled { collected: 0 }));
    assert_eq!(collector.motion().calls, 0);
    assert_eq!(collector.capture().shutdowns, 1);
    assert_eq!(*rig.journal.borrow(), vec!["begin", "shutdown"]);
}

#[test]
fn failed_session_start_aborts_without_moving() {
    let journal = Journal::default();
    let last_move = Rc::new(RefCell::new(0));
    let mut capture = ScriptedCapture::new(&journal, &last_move, &[]);
    capture.fail_begin = true;
    let motion = ScriptedMotion::new(&journal, &last_move);
    let solver = RecordingSolver::new(&journal, CalibrationResult::failed());
    let mut collector = PosePairCollector::new(config(2), capture, motion, solver).unwrap();

    let err = collector.run().unwrap_err();
    assert!(matches!(err, CollectError::Capture(_)));
    assert_eq!(err.collected(), None);
    assert_eq!(collector.state(), CollectorState::Aborted);

    let (capture, motion, solver) = collector.into_parts();
    assert_eq!(capture.shutdowns, 1);
    assert_eq!(motion.calls, 0);
    assert!(solver.received.is_empty());
}

#[test]
fn invalid_config_is_rejected_up_front() {
    let journal = Journal::default();
    let last_move = Rc::new(RefCell::new(0));
    let res = PosePairCollector::new(
        config(0),
        ScriptedCapture::new(&journal, &last_move, &[]),
        ScriptedMotion::new(&journal, &last_move),
        RecordingSolver::new(&journal, CalibrationResult::failed()),
    );
    assert!(res.is_err());
}
