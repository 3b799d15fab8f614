//! The trainer session state machine.
//!
//! All mutable session state lives in one `TrainerSession` owned by the
//! runtime's event loop: the routine position, the stability filter, the
//! timeout supervisor, and the presentation fields. Events flow in through a
//! single transition function and effects flow out as `Command`s, so the
//! whole machine can be driven deterministically with a synthetic clock and
//! no real timers or sockets.

use crate::{
    Command,
    classifier::Prediction,
    routine::{Routine, cue_file_name},
    speed::Speed,
    stability::{self, Gate, StabilityFilter},
    timeout::{self, TimeoutSupervisor},
};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Phase of the pose sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No session running.
    Idle,
    /// Expecting the pose at the current routine position; timeout armed.
    WaitingForPose,
    /// A recognized pose's cue is playing; promotion is suspended.
    PlayingCue,
    /// Every routine step has been matched. Terminal; no timer armed.
    Complete,
}

/// Everything that can happen to a running session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A classified camera frame: the top-1 label and its confidence.
    Frame { label: String, confidence: f32 },
    /// The client finished playing the current cue.
    CueEnded,
    /// The client failed to start the current cue (autoplay or permission
    /// restrictions). Treated as "no cue played".
    CueFailed,
    /// Playback progress report for the current cue, for display.
    CueProgress {
        position_secs: f64,
        duration_secs: f64,
    },
    /// A timeout scheduled by `Command::ArmTimeout` expired.
    TimeoutFired { generation: u64 },
    /// The user selected a new speed.
    SpeedChanged(Speed),
}

/// Progress of the currently playing cue, for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CueStatus {
    pub file: String,
    pub remaining_secs: Option<f64>,
}

/// Point-in-time view of the session for the presentation sink.
///
/// Purely observational; nothing in here feeds back into control flow.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub phase: Phase,
    pub live: Option<Prediction>,
    pub stable_label: Option<String>,
    pub expected_pose: Option<String>,
    pub timeout_remaining_ms: Option<f64>,
    pub cue: Option<CueStatus>,
    pub speed: Speed,
    pub speed_multiplier: f64,
    pub stability_rule: String,
}

/// The session state machine. See the module docs for the ownership model.
pub struct TrainerSession {
    routine: Routine,
    speed: Speed,
    phase: Phase,
    expected_index: usize,
    stable_label: Option<String>,
    live: Option<Prediction>,
    cue: Option<CueStatus>,
    filter: StabilityFilter,
    supervisor: TimeoutSupervisor,
}

impl TrainerSession {
    pub fn new(routine: Routine) -> Self {
        Self {
            routine,
            speed: Speed::default(),
            phase: Phase::Idle,
            expected_index: 0,
            stable_label: None,
            live: None,
            cue: None,
            filter: StabilityFilter::new(),
            supervisor: TimeoutSupervisor::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn expected_index(&self) -> usize {
        self.expected_index
    }

    pub fn speed(&self) -> Speed {
        self.speed
    }

    pub fn stable_label(&self) -> Option<&str> {
        self.stable_label.as_deref()
    }

    /// A session is running from `start()` until `stop()`; the terminal
    /// `Complete` phase still counts as running (frames keep flowing, the
    /// live label keeps updating, but nothing accumulates).
    pub fn is_running(&self) -> bool {
        self.phase != Phase::Idle
    }

    /// Starts the session from the top of the routine.
    ///
    /// A no-op while already running: the session is a singleton owner of the
    /// camera and audio resources, so re-entrant starts must not reset it.
    pub fn start(&mut self, now_ms: f64) -> Vec<Command> {
        if self.is_running() {
            debug!("Ignoring start while already running");
            return Vec::new();
        }
        self.expected_index = 0;
        self.stable_label = None;
        self.live = None;
        self.cue = None;
        self.filter.reset();

        if self.routine.is_empty() {
            self.phase = Phase::Complete;
            return vec![Command::RoutineComplete];
        }

        self.phase = Phase::WaitingForPose;
        info!(expected = %self.expected_name(), "Session started");
        vec![self.arm_timeout(now_ms)]
    }

    /// Stops the session and clears all state. Safe to call when idle.
    pub fn stop(&mut self) -> Vec<Command> {
        self.phase = Phase::Idle;
        self.expected_index = 0;
        self.stable_label = None;
        self.live = None;
        self.cue = None;
        self.filter.reset();
        self.supervisor.disarm();
        info!("Session stopped");
        vec![Command::DisarmTimeout]
    }

    /// Folds one event into the session and returns the effects to execute.
    pub fn handle(&mut self, event: SessionEvent, now_ms: f64) -> Vec<Command> {
        // Speed selection works even before the first start.
        if let SessionEvent::SpeedChanged(speed) = &event {
            return self.on_speed_changed(*speed);
        }
        if !self.is_running() {
            debug!(?event, "Dropping event while stopped");
            return Vec::new();
        }
        match event {
            SessionEvent::Frame { label, confidence } => self.on_frame(label, confidence, now_ms),
            SessionEvent::CueEnded => self.on_cue_finished(now_ms),
            SessionEvent::CueFailed => {
                warn!("Cue playback failed; continuing without audio");
                self.on_cue_finished(now_ms)
            }
            SessionEvent::CueProgress {
                position_secs,
                duration_secs,
            } => self.on_cue_progress(position_secs, duration_secs),
            SessionEvent::TimeoutFired { generation } => self.on_timeout(generation, now_ms),
            SessionEvent::SpeedChanged(speed) => self.on_speed_changed(speed),
        }
    }

    fn on_frame(&mut self, label: String, confidence: f32, now_ms: f64) -> Vec<Command> {
        self.live = Some(Prediction {
            label: label.clone(),
            confidence,
        });

        let gate = Gate {
            cue_playing: self.phase == Phase::PlayingCue,
            waiting_for_pose: self.phase == Phase::WaitingForPose,
            expected: self.routine.expected(self.expected_index),
            required_hold_ms: stability::required_hold_ms(self.speed),
        };
        if !self.filter.update(&label, confidence, now_ms, &gate) {
            return Vec::new();
        }

        // Promotion: the expected pose has been held long enough.
        self.stable_label = Some(label.clone());
        self.supervisor.disarm();
        info!(pose = %label, "Pose recognized");

        let mut commands = vec![Command::DisarmTimeout];
        match self.routine.step(self.expected_index).and_then(|step| step.cue.clone()) {
            Some(cue) => {
                self.phase = Phase::PlayingCue;
                self.cue = Some(CueStatus {
                    file: cue_file_name(&cue).to_owned(),
                    remaining_secs: None,
                });
                commands.push(Command::PlayCue {
                    label,
                    cue,
                    rate: self.speed.multiplier(),
                });
            }
            None => {
                // No cue mapped: advance as if playback completed immediately.
                commands.extend(self.advance(now_ms));
            }
        }
        commands
    }

    fn on_cue_finished(&mut self, now_ms: f64) -> Vec<Command> {
        if self.phase != Phase::PlayingCue {
            debug!("Ignoring cue completion outside of playback");
            return Vec::new();
        }
        self.cue = None;
        self.advance(now_ms)
    }

    fn on_cue_progress(&mut self, position_secs: f64, duration_secs: f64) -> Vec<Command> {
        if self.phase == Phase::PlayingCue
            && position_secs.is_finite()
            && duration_secs.is_finite()
        {
            if let Some(cue) = &mut self.cue {
                cue.remaining_secs = Some((duration_secs - position_secs).max(0.0));
            }
        }
        Vec::new()
    }

    /// Moves to the next routine position after a cue completes.
    fn advance(&mut self, now_ms: f64) -> Vec<Command> {
        self.expected_index += 1;
        if self.expected_index >= self.routine.len() {
            // Terminal: the routine is exhausted and no timer is armed.
            self.phase = Phase::Complete;
            info!("Routine complete");
            return vec![Command::RoutineComplete];
        }
        self.phase = Phase::WaitingForPose;
        info!(expected = %self.expected_name(), "Waiting for next pose");
        vec![self.arm_timeout(now_ms)]
    }

    fn on_timeout(&mut self, generation: u64, now_ms: f64) -> Vec<Command> {
        if !self.supervisor.accept(generation) {
            debug!(generation, "Ignoring stale timeout");
            return Vec::new();
        }
        // The expected pose was never reached: restart from the top. This is
        // the normal recovery path, not an error.
        warn!(expected = %self.expected_name(), "Pose timed out; restarting routine");
        self.expected_index = 0;
        self.stable_label = None;
        self.filter.reset();
        self.phase = Phase::WaitingForPose;
        vec![self.arm_timeout(now_ms)]
    }

    fn on_speed_changed(&mut self, speed: Speed) -> Vec<Command> {
        self.speed = speed;
        info!(multiplier = speed.multiplier(), "Speed changed");
        // The rate applies to the loaded cue immediately; hold and timeout
        // formulas pick the new multiplier up on their next computation, but
        // an already-armed deadline keeps its original duration.
        vec![Command::SetCueRate {
            rate: speed.multiplier(),
        }]
    }

    fn arm_timeout(&mut self, now_ms: f64) -> Command {
        let duration_ms = timeout::pose_timeout_ms(self.speed);
        let generation = self.supervisor.arm(now_ms, duration_ms);
        Command::ArmTimeout {
            duration_ms,
            generation,
        }
    }

    fn expected_name(&self) -> &str {
        self.routine.expected(self.expected_index).unwrap_or("—")
    }

    /// Human-readable form of the promotion rule, for display.
    pub fn stability_rule(&self) -> String {
        format!(
            "Updates when the top class stays ≥ {:.2} for {:.1}s",
            stability::PROB_THRESHOLD,
            stability::required_hold_ms(self.speed) / 1000.0
        )
    }

    /// Point-in-time view for the presentation sink.
    pub fn snapshot(&self, now_ms: f64) -> Snapshot {
        Snapshot {
            phase: self.phase,
            live: self.live.clone(),
            stable_label: self.stable_label.clone(),
            expected_pose: self
                .is_running()
                .then(|| self.routine.expected(self.expected_index))
                .flatten()
                .map(str::to_owned),
            timeout_remaining_ms: self.supervisor.remaining_ms(now_ms),
            cue: self.cue.clone(),
            speed: self.speed,
            speed_multiplier: self.speed.multiplier(),
            stability_rule: self.stability_rule(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routine::PoseStep;
    use approx::assert_abs_diff_eq;

    fn demo_routine() -> Routine {
        Routine::new(vec![
            PoseStep::new("Oben", Some("audio/oben.mp3".into())),
            PoseStep::new("Links", Some("audio/links.mp3".into())),
            PoseStep::new("Rechts", Some("audio/rechts.mp3".into())),
        ])
    }

    fn started(now_ms: f64) -> (TrainerSession, u64) {
        let mut session = TrainerSession::new(demo_routine());
        let commands = session.start(now_ms);
        let generation = arm_generation(&commands).expect("start arms a timeout");
        (session, generation)
    }

    fn frame(label: &str, confidence: f32) -> SessionEvent {
        SessionEvent::Frame {
            label: label.into(),
            confidence,
        }
    }

    /// Feeds identical frames every 100 ms from `from_ms` through `to_ms`.
    fn hold(
        session: &mut TrainerSession,
        label: &str,
        confidence: f32,
        from_ms: f64,
        to_ms: f64,
    ) -> Vec<Command> {
        let mut commands = Vec::new();
        let mut now_ms = from_ms;
        while now_ms <= to_ms {
            commands.extend(session.handle(frame(label, confidence), now_ms));
            now_ms += 100.0;
        }
        commands
    }

    fn arm_generation(commands: &[Command]) -> Option<u64> {
        commands.iter().rev().find_map(|command| match command {
            Command::ArmTimeout { generation, .. } => Some(*generation),
            _ => None,
        })
    }

    fn count_play_cues(commands: &[Command]) -> usize {
        commands
            .iter()
            .filter(|command| matches!(command, Command::PlayCue { .. }))
            .count()
    }

    #[test]
    fn start_waits_for_the_first_pose_with_a_timeout() {
        let mut session = TrainerSession::new(demo_routine());
        let commands = session.start(0.0);

        assert_eq!(session.phase(), Phase::WaitingForPose);
        assert_eq!(session.expected_index(), 0);
        assert!(matches!(
            commands.as_slice(),
            [Command::ArmTimeout { duration_ms, .. }] if *duration_ms == 15_000.0
        ));
    }

    #[test]
    fn restart_while_running_is_a_no_op() {
        let (mut session, _) = started(0.0);
        let commands = hold(&mut session, "Oben", 0.9, 0.0, 2000.0);
        assert!(commands.is_empty());

        assert!(session.start(2100.0).is_empty());
        // The accumulating hold survived the ignored restart.
        let commands = hold(&mut session, "Oben", 0.9, 2100.0, 5000.0);
        assert_eq!(count_play_cues(&commands), 1);
    }

    #[test]
    fn below_threshold_confidence_never_promotes() {
        let (mut session, _) = started(0.0);
        let commands = hold(&mut session, "Oben", 0.5, 0.0, 30_000.0);
        assert!(commands.is_empty());
        assert_eq!(session.stable_label(), None);
        assert_eq!(session.phase(), Phase::WaitingForPose);
    }

    #[test]
    fn unexpected_pose_never_promotes_regardless_of_hold() {
        let (mut session, _) = started(0.0);
        let commands = hold(&mut session, "Links", 0.9, 0.0, 30_000.0);
        assert!(commands.is_empty());
        assert_eq!(session.stable_label(), None);
    }

    #[test]
    fn holding_the_expected_pose_promotes_exactly_once() {
        let (mut session, _) = started(0.0);
        let commands = hold(&mut session, "Oben", 0.9, 0.0, 6000.0);

        assert_eq!(count_play_cues(&commands), 1);
        assert!(commands.contains(&Command::DisarmTimeout));
        assert!(commands.contains(&Command::PlayCue {
            label: "Oben".into(),
            cue: "audio/oben.mp3".into(),
            rate: 1.0,
        }));
        assert_eq!(session.phase(), Phase::PlayingCue);
        assert_eq!(session.stable_label(), Some("Oben"));

        // Further identical ticks while the cue plays do not re-promote.
        let more = hold(&mut session, "Oben", 0.9, 6100.0, 20_000.0);
        assert_eq!(count_play_cues(&more), 0);
    }

    #[test]
    fn switching_labels_resets_the_hold_timer() {
        let (mut session, _) = started(0.0);
        assert!(hold(&mut session, "Oben", 0.9, 0.0, 4900.0).is_empty());
        assert!(session.handle(frame("Links", 0.9), 5000.0).is_empty());

        // A fresh full hold of the expected pose is required.
        assert!(hold(&mut session, "Oben", 0.9, 5100.0, 10_000.0).is_empty());
        let commands = session.handle(frame("Oben", 0.9), 10_100.0);
        assert_eq!(count_play_cues(&commands), 1);
    }

    #[test]
    fn cue_end_advances_and_rearms_the_timeout() {
        let (mut session, _) = started(0.0);
        hold(&mut session, "Oben", 0.9, 0.0, 5000.0);

        let commands = session.handle(SessionEvent::CueEnded, 8000.0);
        assert_eq!(session.phase(), Phase::WaitingForPose);
        assert_eq!(session.expected_index(), 1);
        assert!(matches!(
            commands.as_slice(),
            [Command::ArmTimeout { duration_ms, .. }] if *duration_ms == 15_000.0
        ));
        let snapshot = session.snapshot(8000.0);
        assert_eq!(snapshot.expected_pose.as_deref(), Some("Links"));
        assert_abs_diff_eq!(snapshot.timeout_remaining_ms.unwrap(), 15_000.0);
    }

    #[test]
    fn timeout_resets_the_routine_to_the_top() {
        let (mut session, _) = started(0.0);
        hold(&mut session, "Oben", 0.9, 0.0, 5000.0);
        let commands = session.handle(SessionEvent::CueEnded, 8000.0);
        let generation = arm_generation(&commands).unwrap();
        assert_eq!(session.expected_index(), 1);

        let commands = session.handle(SessionEvent::TimeoutFired { generation }, 23_000.0);
        assert_eq!(session.expected_index(), 0);
        assert_eq!(session.stable_label(), None);
        assert_eq!(session.phase(), Phase::WaitingForPose);
        // Exactly one fresh timeout for the restarted wait.
        assert!(arm_generation(&commands).is_some());
        assert_eq!(commands.len(), 1);
    }

    #[test]
    fn stale_timeout_generations_are_ignored() {
        let (mut session, first_generation) = started(0.0);
        hold(&mut session, "Oben", 0.9, 0.0, 5000.0);
        session.handle(SessionEvent::CueEnded, 8000.0);

        // The timer armed at start was disarmed by the promotion; its late
        // fire must not reset anything.
        let commands = session.handle(
            SessionEvent::TimeoutFired {
                generation: first_generation,
            },
            15_000.0,
        );
        assert!(commands.is_empty());
        assert_eq!(session.expected_index(), 1);
    }

    #[test]
    fn timeout_with_no_promotion_fires_once_per_wait() {
        let (mut session, generation) = started(0.0);
        hold(&mut session, "Oben", 0.5, 0.0, 14_900.0);

        let commands = session.handle(SessionEvent::TimeoutFired { generation }, 15_000.0);
        assert_eq!(session.expected_index(), 0);
        assert!(arm_generation(&commands).is_some());

        // Replaying the consumed generation does nothing.
        let replay = session.handle(SessionEvent::TimeoutFired { generation }, 15_100.0);
        assert!(replay.is_empty());
    }

    #[test]
    fn completing_the_routine_arms_no_further_timeout() {
        let (mut session, _) = started(0.0);
        let mut now_ms = 0.0;
        for pose in ["Oben", "Links", "Rechts"] {
            hold(&mut session, pose, 0.9, now_ms, now_ms + 5000.0);
            now_ms += 6000.0;
            let commands = session.handle(SessionEvent::CueEnded, now_ms);
            if session.phase() == Phase::Complete {
                // The terminal phase deliberately leaves the timer unarmed.
                assert_eq!(commands, vec![Command::RoutineComplete]);
            }
            now_ms += 1000.0;
        }
        assert_eq!(session.phase(), Phase::Complete);
        assert_eq!(session.expected_index(), 3);
        let snapshot = session.snapshot(now_ms);
        assert_eq!(snapshot.timeout_remaining_ms, None);
        assert_eq!(snapshot.expected_pose, None);
    }

    #[test]
    fn cue_failure_advances_like_completion() {
        let (mut session, _) = started(0.0);
        hold(&mut session, "Oben", 0.9, 0.0, 5000.0);
        assert_eq!(session.phase(), Phase::PlayingCue);

        let commands = session.handle(SessionEvent::CueFailed, 5500.0);
        assert_eq!(session.phase(), Phase::WaitingForPose);
        assert_eq!(session.expected_index(), 1);
        assert!(arm_generation(&commands).is_some());
    }

    #[test]
    fn missing_cue_advances_immediately() {
        let mut session = TrainerSession::new(Routine::new(vec![
            PoseStep::new("Oben", None),
            PoseStep::new("Links", Some("audio/links.mp3".into())),
        ]));
        session.start(0.0);

        let commands = hold(&mut session, "Oben", 0.9, 0.0, 5000.0);
        assert_eq!(count_play_cues(&commands), 0);
        assert_eq!(session.phase(), Phase::WaitingForPose);
        assert_eq!(session.expected_index(), 1);
        assert!(arm_generation(&commands).is_some());
    }

    #[test]
    fn speed_scales_future_computations_only() {
        let (mut session, _) = started(0.0);

        let commands = session.handle(SessionEvent::SpeedChanged(Speed::SuperFast), 1000.0);
        assert_eq!(commands, vec![Command::SetCueRate { rate: 3.0 }]);

        // The deadline armed at 1.0x keeps its original 15 s duration.
        let snapshot = session.snapshot(1000.0);
        assert_abs_diff_eq!(snapshot.timeout_remaining_ms.unwrap(), 14_000.0);

        // The hold requirement is now 5000/3 ms; holding that long promotes.
        let commands = hold(&mut session, "Oben", 0.9, 1000.0, 1000.0 + 5000.0 / 3.0 + 100.0);
        assert_eq!(count_play_cues(&commands), 1);
        assert!(commands.contains(&Command::PlayCue {
            label: "Oben".into(),
            cue: "audio/oben.mp3".into(),
            rate: 3.0,
        }));

        // Timeouts armed from now on use the scaled duration.
        let commands = session.handle(SessionEvent::CueEnded, 10_000.0);
        assert!(matches!(
            commands.as_slice(),
            [Command::ArmTimeout { duration_ms, .. }] if *duration_ms == 5000.0
        ));
    }

    #[test]
    fn returning_to_normal_speed_restores_base_durations() {
        let mut session = TrainerSession::new(demo_routine());
        session.handle(SessionEvent::SpeedChanged(Speed::Fast), 0.0);
        session.handle(SessionEvent::SpeedChanged(Speed::Normal), 0.0);

        let commands = session.start(0.0);
        assert!(matches!(
            commands.as_slice(),
            [Command::ArmTimeout { duration_ms, .. }] if *duration_ms == 15_000.0
        ));
        assert_eq!(session.stability_rule(), TrainerSession::new(demo_routine()).stability_rule());
    }

    #[test]
    fn speed_can_be_selected_before_starting() {
        let mut session = TrainerSession::new(demo_routine());
        let commands = session.handle(SessionEvent::SpeedChanged(Speed::Slow), 0.0);
        assert_eq!(commands, vec![Command::SetCueRate { rate: 0.8 }]);

        let commands = session.start(0.0);
        assert!(matches!(
            commands.as_slice(),
            [Command::ArmTimeout { duration_ms, .. }] if *duration_ms == 18_750.0
        ));
    }

    #[test]
    fn stop_clears_state_and_disarms() {
        let (mut session, generation) = started(0.0);
        hold(&mut session, "Oben", 0.9, 0.0, 2000.0);

        let commands = session.stop();
        assert_eq!(commands, vec![Command::DisarmTimeout]);
        assert_eq!(session.phase(), Phase::Idle);
        assert!(!session.is_running());

        // Events arriving after stop are inert, including the old timer.
        assert!(session.handle(frame("Oben", 0.9), 3000.0).is_empty());
        assert!(
            session
                .handle(SessionEvent::TimeoutFired { generation }, 15_000.0)
                .is_empty()
        );
        let snapshot = session.snapshot(3000.0);
        assert_eq!(snapshot.expected_pose, None);
        assert_eq!(snapshot.timeout_remaining_ms, None);
        assert_eq!(snapshot.stable_label, None);
    }

    #[test]
    fn cue_progress_feeds_the_snapshot() {
        let (mut session, _) = started(0.0);
        hold(&mut session, "Oben", 0.9, 0.0, 5000.0);

        session.handle(
            SessionEvent::CueProgress {
                position_secs: 1.0,
                duration_secs: 3.5,
            },
            5500.0,
        );
        let cue = session.snapshot(5500.0).cue.unwrap();
        assert_eq!(cue.file, "oben.mp3");
        assert_abs_diff_eq!(cue.remaining_secs.unwrap(), 2.5);

        // Gone once playback finished.
        session.handle(SessionEvent::CueEnded, 6000.0);
        assert!(session.snapshot(6000.0).cue.is_none());
    }

    #[test]
    fn snapshot_reflects_the_live_prediction() {
        let (mut session, _) = started(0.0);
        session.handle(frame("Links", 0.42), 100.0);

        let snapshot = session.snapshot(100.0);
        let live = snapshot.live.unwrap();
        assert_eq!(live.label, "Links");
        assert_abs_diff_eq!(live.confidence, 0.42);
        assert_eq!(snapshot.expected_pose.as_deref(), Some("Oben"));
        assert_eq!(snapshot.speed_multiplier, 1.0);
        assert!(snapshot.stability_rule.contains("5.0s"));
    }

    #[test]
    fn empty_routine_completes_immediately() {
        let mut session = TrainerSession::new(Routine::new(Vec::new()));
        let commands = session.start(0.0);
        assert_eq!(commands, vec![Command::RoutineComplete]);
        assert_eq!(session.phase(), Phase::Complete);
        assert_eq!(session.snapshot(0.0).timeout_remaining_ms, None);
    }
}
