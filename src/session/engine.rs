//! Session engine: drives one N-back round at a time
//!
//! Maintains:
//! - Phase machine Idle → Running → Finished → Idle
//! - Timed loop publishing one stimulus per interval, cancellable at every wait
//! - Match claims checked against the event `lag` steps back
//! - Highscore write-through when a round beats it
//!
//! All state mutation happens under one mutex and is stamped with the round
//! id that made it, so a cancelled loop can never touch a newer round.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::{ChannelMode, GameSettings, RoundConfig};
use super::errors::SessionError;
use super::speech::{letter_for, Speaker};
use super::state::{Phase, SessionState};
use super::tally::{Channel, ClaimOutcome, ClaimTally, TallyStats};
use crate::prefs::{PreferencesStore, Score};
use crate::sequence::{Sequence, SequenceGenerator};

/// How often an audio round re-checks speaker readiness
const READY_POLL: Duration = Duration::from_millis(100);

/// Feedback left behind by a round that died
pub const FAILURE_FEEDBACK: &str = "An error occurred, please try again.";

/// What a single `check_match` call did on each channel
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClaimReport {
    pub visual: Option<ClaimOutcome>,
    pub audio: Option<ClaimOutcome>,
}

impl ClaimReport {
    pub fn is_empty(&self) -> bool {
        self.visual.is_none() && self.audio.is_none()
    }
}

enum RoundEnd {
    Completed,
    Cancelled,
}

enum Outcome {
    Completed,
    Failed,
}

struct RoundHandle {
    cancel: CancellationToken,
    supervisor: JoinHandle<()>,
}

struct EngineCore {
    phase: Phase,
    config: RoundConfig,
    generator: SequenceGenerator<StdRng>,
    sequence: Option<Arc<Sequence>>,
    current_index: usize,
    tally: ClaimTally,
    /// Bumped by every start and reset
    round_id: u64,
    round: Option<RoundHandle>,
    last_score: Option<u32>,
}

struct Shared {
    prefs: Arc<dyn PreferencesStore>,
    core: Mutex<EngineCore>,
    state_tx: watch::Sender<SessionState>,
    score_tx: watch::Sender<u32>,
    high_score_tx: watch::Sender<u32>,
    settings_tx: watch::Sender<GameSettings>,
}

/// Runs N-back rounds and publishes their state
#[derive(Clone)]
pub struct SessionEngine {
    shared: Arc<Shared>,
}

impl SessionEngine {
    /// Engine with an entropy-seeded sequence generator
    pub fn new(prefs: Arc<dyn PreferencesStore>) -> Self {
        Self::with_generator(prefs, SequenceGenerator::from_entropy())
    }

    /// Engine whose rounds replay for the same seed
    pub fn with_seed(prefs: Arc<dyn PreferencesStore>, seed: u64) -> Self {
        Self::with_generator(prefs, SequenceGenerator::seeded(seed))
    }

    fn with_generator(
        prefs: Arc<dyn PreferencesStore>,
        generator: SequenceGenerator<StdRng>,
    ) -> Self {
        let settings = prefs.settings().unwrap_or_else(|e| {
            warn!(error = %e, "could not read game settings, using defaults");
            GameSettings::default()
        });
        let high_score = prefs.high_score().unwrap_or_else(|e| {
            warn!(error = %e, "could not read highscore, starting from 0");
            0
        });

        let config = RoundConfig::from_settings(&settings, ChannelMode::default());
        let idle = idle_state(&config);

        SessionEngine {
            shared: Arc::new(Shared {
                prefs,
                core: Mutex::new(EngineCore {
                    phase: Phase::Idle,
                    config,
                    generator,
                    sequence: None,
                    current_index: 0,
                    tally: ClaimTally::new(),
                    round_id: 0,
                    round: None,
                    last_score: None,
                }),
                state_tx: watch::Sender::new(idle),
                score_tx: watch::Sender::new(0),
                high_score_tx: watch::Sender::new(high_score),
                settings_tx: watch::Sender::new(settings),
            }),
        }
    }

    pub fn game_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state_tx.subscribe()
    }

    pub fn score(&self) -> watch::Receiver<u32> {
        self.shared.score_tx.subscribe()
    }

    pub fn high_score(&self) -> watch::Receiver<u32> {
        self.shared.high_score_tx.subscribe()
    }

    pub fn settings(&self) -> watch::Receiver<GameSettings> {
        self.shared.settings_tx.subscribe()
    }

    /// Latest published state
    pub fn snapshot(&self) -> SessionState {
        self.shared.state_tx.borrow().clone()
    }

    pub fn phase(&self) -> Phase {
        self.shared.lock().phase
    }

    pub fn config(&self) -> RoundConfig {
        self.shared.lock().config.clone()
    }

    /// Replace the round config. Idle only.
    pub fn configure(&self, config: RoundConfig) -> Result<(), SessionError> {
        let mut core = self.shared.lock();
        if core.phase != Phase::Idle {
            return Err(SessionError::InvalidPhase {
                op: "configure",
                phase: core.phase,
            });
        }
        config.validate()?;

        debug!(?config, "round configured");
        core.config = config;
        self.shared.state_tx.send_replace(idle_state(&core.config));
        Ok(())
    }

    /// Persist new settings and derive the round config from them. Idle only.
    pub fn apply_settings(&self, settings: GameSettings) -> Result<(), SessionError> {
        let mut core = self.shared.lock();
        if core.phase != Phase::Idle {
            return Err(SessionError::InvalidPhase {
                op: "apply_settings",
                phase: core.phase,
            });
        }
        settings.validate()?;
        let config = RoundConfig {
            target_match_percentage: core.config.target_match_percentage,
            ..RoundConfig::from_settings(&settings, core.config.channel_mode)
        };
        config.validate()?;

        self.shared.prefs.save_settings(&settings)?;
        core.config = config;
        self.shared.settings_tx.send_replace(settings);
        self.shared.state_tx.send_replace(idle_state(&core.config));
        Ok(())
    }

    /// Switch channels for the next round. Not allowed mid-round.
    pub fn set_channel_mode(&self, mode: ChannelMode) -> Result<(), SessionError> {
        let mut core = self.shared.lock();
        if core.phase == Phase::Running {
            return Err(SessionError::InvalidPhase {
                op: "set_channel_mode",
                phase: core.phase,
            });
        }
        core.config.channel_mode = mode;
        self.shared
            .state_tx
            .send_modify(|state| state.channel_mode = mode);
        Ok(())
    }

    /// Generate a fresh sequence and launch the timed loop.
    ///
    /// Any round still in flight is cancelled; the new loop waits for it to
    /// terminate before publishing anything.
    pub fn start(&self, speaker: Arc<dyn Speaker>) -> Result<(), SessionError> {
        let runtime = Handle::try_current().map_err(|_| SessionError::NoRuntime)?;
        let mut core = self.shared.lock();
        core.config.validate()?;

        let config = core.config.clone();
        let sequence = core.generator.generate(
            config.total_events,
            config.cardinality,
            config.target_match_percentage,
            config.lag,
        )?;
        debug!(
            planted = sequence.planted(),
            collisions = sequence.collisions(),
            "sequence generated"
        );
        self.begin_round(&mut core, runtime, sequence, speaker);
        Ok(())
    }

    /// Start a round over a fixed sequence
    #[cfg(test)]
    pub(crate) fn start_with_sequence(
        &self,
        sequence: Sequence,
        speaker: Arc<dyn Speaker>,
    ) -> Result<(), SessionError> {
        let runtime = Handle::try_current().map_err(|_| SessionError::NoRuntime)?;
        let mut core = self.shared.lock();
        core.config.validate()?;
        self.begin_round(&mut core, runtime, sequence, speaker);
        Ok(())
    }

    fn begin_round(
        &self,
        core: &mut EngineCore,
        runtime: Handle,
        sequence: Sequence,
        speaker: Arc<dyn Speaker>,
    ) {
        let previous = core.round.take().map(|round| {
            round.cancel.cancel();
            round.supervisor
        });

        core.round_id += 1;
        core.phase = Phase::Running;
        core.current_index = 0;
        core.tally.reset();
        core.sequence = Some(Arc::new(sequence));
        core.last_score = None;

        self.shared.state_tx.send_replace(SessionState {
            phase: Phase::Running,
            ..idle_state(&core.config)
        });
        self.shared.score_tx.send_replace(0);

        let cancel = CancellationToken::new();
        let supervisor = runtime.spawn(supervise(
            Arc::clone(&self.shared),
            core.round_id,
            cancel.clone(),
            previous,
            speaker,
        ));
        core.round = Some(RoundHandle { cancel, supervisor });
    }

    /// Claim a match for the event on screen.
    ///
    /// `selected` is the grid position claimed on the visual channel; `None`
    /// makes no visual claim. The audio channel is judged from the sequence
    /// itself whenever it is active.
    pub fn check_match(&self, selected: Option<u32>) -> Result<ClaimReport, SessionError> {
        let mut guard = self.shared.lock();
        let core = &mut *guard;
        if core.phase != Phase::Running {
            return Err(SessionError::InvalidPhase {
                op: "check_match",
                phase: core.phase,
            });
        }

        let mut report = ClaimReport::default();
        let index = core.current_index;
        let lag = core.config.lag;
        if index < lag {
            return Ok(report);
        }

        let sequence = core
            .sequence
            .as_ref()
            .ok_or_else(|| SessionError::Invariant("running round has no sequence".into()))?;
        // Last event already shown; the round is wrapping up
        let Some(current) = sequence.get(index) else {
            return Ok(report);
        };
        let target = sequence.get(index - lag).ok_or_else(|| {
            SessionError::Invariant(format!("lag target {} missing", index - lag))
        })?;

        let mode = core.config.channel_mode;
        if mode.visual() {
            if let Some(selected) = selected {
                report.visual = Some(core.tally.record(Channel::Visual, index, selected == target));
            }
        }
        if mode.audio() {
            report.audio = Some(core.tally.record(Channel::Audio, index, current == target));
        }

        let feedback: Vec<String> = [
            report.visual.and_then(|o| o.feedback(Channel::Visual)),
            report.audio.and_then(|o| o.feedback(Channel::Audio)),
        ]
        .into_iter()
        .flatten()
        .collect();

        debug!(index, ?report, "match claimed");
        if feedback.is_empty() {
            return Ok(report);
        }

        let visual_correct = core.tally.correct(Channel::Visual);
        let audio_correct = core.tally.correct(Channel::Audio);
        self.shared.state_tx.send_modify(|state| {
            state.feedback = feedback.join(" ");
            state.correct_visual_responses = visual_correct;
            state.correct_audio_responses = audio_correct;
        });
        let score = core.tally.score();
        self.shared.score_tx.send_if_modified(|current| {
            let changed = *current != score;
            *current = score;
            changed
        });
        Ok(report)
    }

    /// Cancel any round and return to an idle snapshot
    pub fn reset_game(&self) {
        let mut core = self.shared.lock();
        if let Some(round) = &core.round {
            round.cancel.cancel();
        }
        core.round_id += 1;
        core.phase = Phase::Idle;
        core.current_index = 0;
        core.tally.reset();
        core.sequence = None;
        core.last_score = None;

        self.shared.state_tx.send_replace(idle_state(&core.config));
        self.shared.score_tx.send_replace(0);
        debug!("game reset");
    }

    /// Save the last finished round to the scoreboard
    pub fn record_score(&self, player_name: &str) -> Result<Score, SessionError> {
        let score = self
            .shared
            .lock()
            .last_score
            .ok_or(SessionError::NoFinishedRound)?;
        let timestamp_millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        let entry = Score {
            player_name: player_name.to_string(),
            score,
            timestamp_millis,
        };
        self.shared.prefs.save_score(entry.clone())?;
        info!(player = player_name, score, "score recorded");
        Ok(entry)
    }

    /// Cancel the running round and wait until its loop has exited
    pub async fn shutdown(&self) {
        self.reset_game();
        let round = self.shared.lock().round.take();
        if let Some(round) = round {
            let _ = round.supervisor.await;
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, EngineCore> {
        self.core.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Move to event `index` and put `value` on the active channels in one
    /// step, so claims never see an index ahead of the stimulus on screen.
    /// False once the round is stale.
    fn show_event(&self, round_id: u64, index: usize, mode: ChannelMode, value: u32) -> bool {
        let mut core = self.lock();
        if core.round_id != round_id {
            return false;
        }
        core.current_index = index;
        self.state_tx.send_modify(|state| {
            state.current_event_index = index;
            state.visual_value = mode.visual().then_some(value);
            state.audio_value = mode.audio().then_some(value);
            state.feedback.clear();
        });
        true
    }

    fn publish_advisory(&self, round_id: u64, feedback: String) {
        let core = self.lock();
        if core.round_id == round_id {
            self.state_tx.send_modify(|state| state.feedback = feedback);
        }
    }

    /// Step the index past the last event
    fn advance(&self, round_id: u64, next: usize) -> bool {
        let mut core = self.lock();
        if core.round_id != round_id {
            return false;
        }
        core.current_index = next;
        self.state_tx
            .send_modify(|state| state.current_event_index = next);
        true
    }

    fn finish(&self, round_id: u64, outcome: Outcome) {
        let stats = {
            let mut core = self.lock();
            if core.round_id != round_id || core.phase != Phase::Running {
                return;
            }
            let stats = core.tally.stats();
            let feedback = match outcome {
                Outcome::Completed => summary(core.config.channel_mode, &stats),
                Outcome::Failed => FAILURE_FEEDBACK.to_string(),
            };

            core.phase = Phase::Finished;
            core.last_score = Some(stats.score);
            let index = core.current_index;
            self.state_tx.send_modify(|state| {
                state.phase = Phase::Finished;
                state.visual_value = None;
                state.audio_value = None;
                state.current_event_index = index;
                state.feedback = feedback;
                state.round_finished = true;
            });
            stats
        };

        info!(
            score = stats.score,
            visual_correct = stats.visual_correct,
            visual_incorrect = stats.visual_incorrect,
            audio_correct = stats.audio_correct,
            audio_incorrect = stats.audio_incorrect,
            "round finished"
        );
        self.update_high_score(stats.score);
    }

    fn update_high_score(&self, score: u32) {
        let beaten = self.high_score_tx.send_if_modified(|high| {
            if score > *high {
                *high = score;
                true
            } else {
                false
            }
        });
        if beaten {
            if let Err(e) = self.prefs.save_high_score(score) {
                warn!(error = %e, score, "could not persist new highscore");
            } else {
                info!(score, "new highscore");
            }
        }
    }
}

/// Wait out the previous round, run this one, and settle how it ended
async fn supervise(
    shared: Arc<Shared>,
    round_id: u64,
    cancel: CancellationToken,
    previous: Option<JoinHandle<()>>,
    speaker: Arc<dyn Speaker>,
) {
    if let Some(previous) = previous {
        let _ = previous.await;
    }

    let worker = tokio::spawn(run_round(
        Arc::clone(&shared),
        round_id,
        cancel,
        speaker,
    ));
    let outcome = match worker.await {
        Ok(Ok(RoundEnd::Completed)) => Outcome::Completed,
        Ok(Ok(RoundEnd::Cancelled)) => return,
        Ok(Err(e)) => {
            error!(round_id, error = %e, "round aborted");
            Outcome::Failed
        }
        Err(e) if e.is_panic() => {
            error!(round_id, "round loop panicked");
            Outcome::Failed
        }
        Err(_) => return,
    };
    shared.finish(round_id, outcome);
}

async fn run_round(
    shared: Arc<Shared>,
    round_id: u64,
    cancel: CancellationToken,
    speaker: Arc<dyn Speaker>,
) -> Result<RoundEnd, SessionError> {
    let (config, sequence) = {
        let core = shared.lock();
        if core.round_id != round_id {
            return Ok(RoundEnd::Cancelled);
        }
        let sequence = core
            .sequence
            .clone()
            .ok_or_else(|| SessionError::Invariant("round started without a sequence".into()))?;
        (core.config.clone(), sequence)
    };
    let mode = config.channel_mode;

    if mode.audio() {
        while !speaker.is_ready() {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(RoundEnd::Cancelled),
                _ = tokio::time::sleep(READY_POLL) => {}
            }
        }
    }
    info!(round_id, %mode, events = config.total_events, lag = config.lag, "{} game started", mode);

    for i in 0..config.total_events {
        let value = sequence.get(i).ok_or_else(|| {
            SessionError::Invariant(format!(
                "event {} outside sequence of {}",
                i,
                sequence.len()
            ))
        })?;
        if !shared.show_event(round_id, i, mode, value) {
            return Ok(RoundEnd::Cancelled);
        }

        let tick = tokio::time::sleep(config.interval);
        tokio::pin!(tick);

        if mode.audio() {
            let letter = letter_for(value, config.spoken_letters);
            let hook = Arc::clone(&speaker);
            // Speech runs off the runtime; the tick does not wait past its interval
            let mut spoken = tokio::task::spawn_blocking(move || hook.speak(letter));
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(RoundEnd::Cancelled),
                result = &mut spoken => match result {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!(round_id, event = i, error = %e, "speech hook failed");
                        shared.publish_advisory(round_id, format!("Audio unavailable: {}", e));
                    }
                    Err(e) if e.is_panic() => {
                        return Err(SessionError::Invariant(format!(
                            "speech hook panicked at event {}",
                            i
                        )));
                    }
                    Err(_) => {}
                },
                _ = &mut tick => {
                    warn!(round_id, event = i, "speech hook overran the interval");
                    continue;
                }
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(RoundEnd::Cancelled),
            _ = &mut tick => {}
        }
    }

    if !shared.advance(round_id, config.total_events) {
        return Ok(RoundEnd::Cancelled);
    }
    Ok(RoundEnd::Completed)
}

fn idle_state(config: &RoundConfig) -> SessionState {
    SessionState {
        total_events: config.total_events,
        spoken_letters: config.spoken_letters,
        ..SessionState::idle(config.channel_mode)
    }
}

fn summary(mode: ChannelMode, stats: &TallyStats) -> String {
    match mode {
        ChannelMode::AudioVisual => format!(
            "Game Over! Final Score: {} (Visual: {}, Audio: {})",
            stats.score, stats.visual_correct, stats.audio_correct
        ),
        _ => format!("Game Over! Final Score: {}", stats.score),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::MemoryPreferences;
    use crate::session::errors::SpeakError;
    use std::sync::atomic::{AtomicBool, Ordering};

    const TICK: Duration = Duration::from_millis(1000);

    #[derive(Default)]
    struct RecordingSpeaker {
        spoken: Mutex<Vec<String>>,
        ready: AtomicBool,
        fail: bool,
        panic: bool,
    }

    impl RecordingSpeaker {
        fn ready() -> Arc<Self> {
            Arc::new(RecordingSpeaker {
                ready: AtomicBool::new(true),
                ..Default::default()
            })
        }

        fn spoken(&self) -> Vec<String> {
            self.spoken.lock().unwrap().clone()
        }
    }

    impl Speaker for RecordingSpeaker {
        fn is_ready(&self) -> bool {
            self.ready.load(Ordering::SeqCst)
        }

        fn speak(&self, symbol: &str) -> Result<(), SpeakError> {
            if self.panic {
                panic!("speech engine crashed");
            }
            if self.fail {
                return Err(SpeakError::Failed("no voice".into()));
            }
            self.spoken.lock().unwrap().push(symbol.to_string());
            Ok(())
        }
    }

    fn config(mode: ChannelMode, total_events: usize) -> RoundConfig {
        RoundConfig {
            lag: 2,
            total_events,
            cardinality: 9,
            target_match_percentage: 30,
            interval: TICK,
            channel_mode: mode,
            spoken_letters: 9,
        }
    }

    fn setup(mode: ChannelMode, total_events: usize) -> (SessionEngine, Arc<MemoryPreferences>) {
        let prefs = Arc::new(MemoryPreferences::new());
        let engine = SessionEngine::with_seed(prefs.clone(), 42);
        engine.configure(config(mode, total_events)).unwrap();
        (engine, prefs)
    }

    fn fixed(events: &[u32]) -> Sequence {
        Sequence::from_events(events.to_vec(), 2)
    }

    async fn wait_finished(engine: &SessionEngine) -> SessionState {
        let mut rx = engine.game_state();
        let state = rx.wait_for(|s| s.round_finished).await.unwrap().clone();
        state
    }

    #[tokio::test(start_paused = true)]
    async fn test_visual_correct_claim() {
        let (engine, _) = setup(ChannelMode::Visual, 5);
        engine
            .start_with_sequence(fixed(&[3, 5, 3, 1, 4]), RecordingSpeaker::ready())
            .unwrap();

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(engine.snapshot().current_event_index, 2);
        assert_eq!(engine.snapshot().visual_value, Some(3));

        let report = engine.check_match(Some(3)).unwrap();
        assert_eq!(report.visual, Some(ClaimOutcome::Correct));
        assert_eq!(report.audio, None);

        let state = engine.snapshot();
        assert_eq!(state.feedback, "Visual Correct!");
        assert_eq!(state.correct_visual_responses, 1);
        assert_eq!(*engine.score().borrow(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_visual_incorrect_claim() {
        let (engine, _) = setup(ChannelMode::Visual, 5);
        engine
            .start_with_sequence(fixed(&[3, 5, 3, 1, 4]), RecordingSpeaker::ready())
            .unwrap();

        tokio::time::sleep(Duration::from_millis(2500)).await;
        let report = engine.check_match(Some(7)).unwrap();
        assert_eq!(report.visual, Some(ClaimOutcome::Incorrect));
        assert_eq!(engine.snapshot().feedback, "Visual Incorrect!");
        assert_eq!(engine.snapshot().correct_visual_responses, 0);
        assert_eq!(*engine.score().borrow(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_claims_before_lag_are_ignored() {
        let (engine, _) = setup(ChannelMode::AudioVisual, 5);
        engine
            .start_with_sequence(fixed(&[3, 3, 3, 1, 4]), RecordingSpeaker::ready())
            .unwrap();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(engine.snapshot().current_event_index, 1);
        let report = engine.check_match(Some(3)).unwrap();
        assert!(report.is_empty());
        assert_eq!(engine.snapshot().feedback, "");
        assert_eq!(*engine.score().borrow(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_claim_at_same_index_is_ignored() {
        let (engine, _) = setup(ChannelMode::Visual, 5);
        engine
            .start_with_sequence(fixed(&[3, 5, 3, 1, 4]), RecordingSpeaker::ready())
            .unwrap();

        tokio::time::sleep(Duration::from_millis(2500)).await;
        engine.check_match(Some(3)).unwrap();
        let report = engine.check_match(Some(3)).unwrap();
        assert_eq!(report.visual, Some(ClaimOutcome::Duplicate));
        assert_eq!(engine.snapshot().correct_visual_responses, 1);
        assert_eq!(*engine.score().borrow(), 1);

        // next index accepts a fresh claim
        tokio::time::sleep(TICK).await;
        assert_eq!(engine.snapshot().current_event_index, 3);
        assert_eq!(
            engine.check_match(Some(5)).unwrap().visual,
            Some(ClaimOutcome::Correct)
        );
        assert_eq!(*engine.score().borrow(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_audio_matches_detected_from_sequence() {
        let (engine, _) = setup(ChannelMode::Audio, 5);
        let speaker = RecordingSpeaker::ready();
        engine
            .start_with_sequence(fixed(&[3, 5, 3, 1, 4]), speaker.clone())
            .unwrap();

        tokio::time::sleep(Duration::from_millis(2500)).await;
        let state = engine.snapshot();
        assert_eq!(state.visual_value, None);
        assert_eq!(state.audio_value, Some(3));
        assert_eq!(state.audio_letter(), Some("A"));

        let report = engine.check_match(None).unwrap();
        assert_eq!(report.audio, Some(ClaimOutcome::Correct));
        assert_eq!(engine.snapshot().feedback, "Audio Correct!");
        assert_eq!(engine.snapshot().correct_audio_responses, 1);

        tokio::time::sleep(TICK).await;
        let report = engine.check_match(Some(3)).unwrap();
        assert_eq!(report.visual, None);
        assert_eq!(report.audio, Some(ClaimOutcome::Incorrect));
        assert_eq!(engine.snapshot().feedback, "Audio Incorrect!");

        let final_state = wait_finished(&engine).await;
        assert_eq!(final_state.feedback, "Game Over! Final Score: 1");
        assert_eq!(speaker.spoken(), vec!["A", "F", "A", "I", "N"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dual_mode_scores_both_channels() {
        let (engine, _) = setup(ChannelMode::AudioVisual, 5);
        engine
            .start_with_sequence(fixed(&[3, 5, 3, 1, 4]), RecordingSpeaker::ready())
            .unwrap();

        tokio::time::sleep(Duration::from_millis(2500)).await;
        let report = engine.check_match(Some(3)).unwrap();
        assert_eq!(report.visual, Some(ClaimOutcome::Correct));
        assert_eq!(report.audio, Some(ClaimOutcome::Correct));

        let state = engine.snapshot();
        assert_eq!(state.feedback, "Visual Correct! Audio Correct!");
        assert_eq!(state.correct_visual_responses, 1);
        assert_eq!(state.correct_audio_responses, 1);
        assert_eq!(*engine.score().borrow(), 2);

        let final_state = wait_finished(&engine).await;
        assert_eq!(
            final_state.feedback,
            "Game Over! Final Score: 2 (Visual: 1, Audio: 1)"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_completion() {
        let (engine, _) = setup(ChannelMode::Visual, 5);
        engine.start(RecordingSpeaker::ready()).unwrap();
        assert_eq!(engine.phase(), Phase::Running);

        let state = wait_finished(&engine).await;
        assert!(state.round_finished);
        assert_eq!(state.phase, Phase::Finished);
        assert_eq!(state.event_value(), -1);
        assert_eq!(state.current_event_index, 5);
        assert_eq!(state.feedback, "Game Over! Final Score: 0");
        assert_eq!(engine.phase(), Phase::Finished);
        assert!(matches!(
            engine.check_match(Some(0)),
            Err(SessionError::InvalidPhase { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_twice_is_stable() {
        let (engine, _) = setup(ChannelMode::Visual, 5);
        engine
            .start_with_sequence(fixed(&[3, 5, 3, 1, 4]), RecordingSpeaker::ready())
            .unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        engine.check_match(Some(3)).unwrap();
        wait_finished(&engine).await;

        engine.reset_game();
        let first = engine.snapshot();
        engine.reset_game();
        let second = engine.snapshot();

        assert_eq!(first, second);
        assert_eq!(first.phase, Phase::Idle);
        assert_eq!(first.current_event_index, 0);
        assert_eq!(first.feedback, "");
        assert_eq!(*engine.score().borrow(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_stops_the_loop() {
        let (engine, _) = setup(ChannelMode::Visual, 10);
        engine.start(RecordingSpeaker::ready()).unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(engine.snapshot().current_event_index, 1);

        engine.reset_game();
        tokio::time::sleep(Duration::from_secs(20)).await;

        let state = engine.snapshot();
        assert_eq!(state.phase, Phase::Idle);
        assert_eq!(state.current_event_index, 0);
        assert_eq!(state.visual_value, None);
        assert!(!state.round_finished);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_running_round() {
        let (engine, _) = setup(ChannelMode::Visual, 5);
        engine
            .start_with_sequence(fixed(&[1, 1, 1, 1, 1]), RecordingSpeaker::ready())
            .unwrap();
        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(engine.snapshot().current_event_index, 3);

        engine
            .start_with_sequence(fixed(&[6, 7, 8, 0, 2]), RecordingSpeaker::ready())
            .unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        let state = engine.snapshot();
        assert_eq!(state.current_event_index, 0);
        assert_eq!(state.visual_value, Some(6));

        let state = wait_finished(&engine).await;
        assert_eq!(state.current_event_index, 5);
        assert_eq!(state.feedback, "Game Over! Final Score: 0");
    }

    #[tokio::test(start_paused = true)]
    async fn test_highscore_only_rises() {
        let prefs = Arc::new(MemoryPreferences::new());
        prefs.save_high_score(1).unwrap();
        let engine = SessionEngine::with_seed(prefs.clone(), 1);
        engine.configure(config(ChannelMode::Visual, 5)).unwrap();
        let high = engine.high_score();
        assert_eq!(*high.borrow(), 1);

        // score 0 leaves the highscore alone
        engine
            .start_with_sequence(fixed(&[3, 5, 3, 5, 4]), RecordingSpeaker::ready())
            .unwrap();
        wait_finished(&engine).await;
        assert_eq!(*high.borrow(), 1);
        assert_eq!(prefs.high_score().unwrap(), 1);

        // score 1 ties, still no update
        engine
            .start_with_sequence(fixed(&[3, 5, 3, 5, 4]), RecordingSpeaker::ready())
            .unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        engine.check_match(Some(3)).unwrap();
        wait_finished(&engine).await;
        assert_eq!(*high.borrow(), 1);

        // score 2 beats it
        engine
            .start_with_sequence(fixed(&[3, 5, 3, 5, 4]), RecordingSpeaker::ready())
            .unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        engine.check_match(Some(3)).unwrap();
        tokio::time::sleep(TICK).await;
        engine.check_match(Some(5)).unwrap();
        wait_finished(&engine).await;
        assert_eq!(*high.borrow(), 2);
        assert_eq!(prefs.high_score().unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_speech_failure_keeps_round_going() {
        let (engine, _) = setup(ChannelMode::Audio, 5);
        let speaker = Arc::new(RecordingSpeaker {
            ready: AtomicBool::new(true),
            fail: true,
            ..Default::default()
        });
        engine
            .start_with_sequence(fixed(&[3, 5, 3, 1, 4]), speaker)
            .unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(engine
            .snapshot()
            .feedback
            .starts_with("Audio unavailable:"));

        let state = wait_finished(&engine).await;
        assert_eq!(state.current_event_index, 5);
        assert_eq!(state.feedback, "Game Over! Final Score: 0");
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_hook_fails_round_but_not_engine() {
        let (engine, _) = setup(ChannelMode::Audio, 5);
        let speaker = Arc::new(RecordingSpeaker {
            ready: AtomicBool::new(true),
            panic: true,
            ..Default::default()
        });
        engine
            .start_with_sequence(fixed(&[3, 5, 3, 1, 4]), speaker)
            .unwrap();

        let state = wait_finished(&engine).await;
        assert_eq!(state.feedback, FAILURE_FEEDBACK);
        assert_eq!(engine.phase(), Phase::Finished);

        engine
            .start_with_sequence(fixed(&[3, 5, 3, 1, 4]), RecordingSpeaker::ready())
            .unwrap();
        let state = wait_finished(&engine).await;
        assert_eq!(state.feedback, "Game Over! Final Score: 0");
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_sequence_is_an_invariant_failure() {
        let (engine, _) = setup(ChannelMode::Visual, 5);
        engine
            .start_with_sequence(fixed(&[3, 5, 3]), RecordingSpeaker::ready())
            .unwrap();

        let state = wait_finished(&engine).await;
        assert_eq!(state.current_event_index, 3);
        assert_eq!(state.feedback, FAILURE_FEEDBACK);
    }

    #[tokio::test(start_paused = true)]
    async fn test_audio_round_waits_for_speaker() {
        let (engine, _) = setup(ChannelMode::Audio, 5);
        let speaker = Arc::new(RecordingSpeaker::default());
        engine
            .start_with_sequence(fixed(&[3, 5, 3, 1, 4]), speaker.clone())
            .unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        let state = engine.snapshot();
        assert_eq!(state.phase, Phase::Running);
        assert_eq!(state.audio_value, None);
        assert!(speaker.spoken().is_empty());

        speaker.ready.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(engine.snapshot().audio_value, Some(3));
        assert_eq!(speaker.spoken(), vec!["A"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_index_and_stimulus_move_together() {
        let (engine, _) = setup(ChannelMode::AudioVisual, 5);
        engine
            .start_with_sequence(fixed(&[3, 5, 3, 1, 4]), RecordingSpeaker::ready())
            .unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        let round_id = engine.shared.lock().round_id;
        assert!(!engine
            .shared
            .show_event(round_id - 1, 2, ChannelMode::AudioVisual, 3));
        assert_eq!(engine.snapshot().current_event_index, 0);

        let mut rx = engine.game_state();
        rx.borrow_and_update();
        assert!(engine
            .shared
            .show_event(round_id, 2, ChannelMode::AudioVisual, 3));
        {
            let state = rx.borrow_and_update();
            assert_eq!(state.current_event_index, 2);
            assert_eq!(state.visual_value, Some(3));
            assert_eq!(state.audio_value, Some(3));
        }
        assert!(!rx.has_changed().unwrap());

        // Claims are judged against the event now on screen
        let report = engine.check_match(Some(3)).unwrap();
        assert_eq!(report.visual, Some(ClaimOutcome::Correct));
        assert_eq!(report.audio, Some(ClaimOutcome::Correct));
    }

    struct SlowSpeaker;

    impl Speaker for SlowSpeaker {
        fn speak(&self, _symbol: &str) -> Result<(), SpeakError> {
            std::thread::sleep(Duration::from_millis(400));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_slow_speech_does_not_stretch_the_round() {
        let prefs = Arc::new(MemoryPreferences::new());
        let engine = SessionEngine::with_seed(prefs, 7);
        engine
            .configure(RoundConfig {
                interval: Duration::from_millis(50),
                ..config(ChannelMode::Audio, 4)
            })
            .unwrap();
        engine
            .start_with_sequence(fixed(&[1, 2, 3, 4]), Arc::new(SlowSpeaker))
            .unwrap();

        // Waiting on each letter would take four times 400ms
        let state = tokio::time::timeout(Duration::from_millis(1000), wait_finished(&engine))
            .await
            .expect("round should not wait on speech");
        assert_eq!(state.current_event_index, 4);
        assert_eq!(state.feedback, "Game Over! Final Score: 0");
    }

    #[tokio::test(start_paused = true)]
    async fn test_configure_rejected_mid_round() {
        let (engine, _) = setup(ChannelMode::Visual, 5);
        engine.start(RecordingSpeaker::ready()).unwrap();
        assert!(matches!(
            engine.configure(config(ChannelMode::Audio, 8)),
            Err(SessionError::InvalidPhase { op: "configure", .. })
        ));
        assert!(engine.set_channel_mode(ChannelMode::Audio).is_err());
        engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_score_after_round() {
        let (engine, prefs) = setup(ChannelMode::Visual, 5);
        assert!(matches!(
            engine.record_score("ada"),
            Err(SessionError::NoFinishedRound)
        ));

        engine
            .start_with_sequence(fixed(&[3, 5, 3, 1, 4]), RecordingSpeaker::ready())
            .unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        engine.check_match(Some(3)).unwrap();
        wait_finished(&engine).await;

        let entry = engine.record_score("ada").unwrap();
        assert_eq!(entry.score, 1);
        assert_eq!(prefs.scores().unwrap(), vec![entry]);
    }

    #[test]
    fn test_apply_settings_persists_and_rebuilds_config() {
        let prefs = Arc::new(MemoryPreferences::new());
        let engine = SessionEngine::new(prefs.clone());
        let settings = GameSettings {
            n_back: 3,
            grid_size: 4,
            ..GameSettings::default()
        };
        engine.apply_settings(settings.clone()).unwrap();

        assert_eq!(prefs.settings().unwrap(), settings);
        assert_eq!(*engine.settings().borrow(), settings);
        let config = engine.config();
        assert_eq!(config.lag, 3);
        assert_eq!(config.cardinality, 16);
    }

    #[test]
    fn test_oversized_grid_not_applied() {
        let prefs = Arc::new(MemoryPreferences::new());
        let engine = SessionEngine::new(prefs.clone());
        let settings = GameSettings {
            grid_size: 70_000,
            ..GameSettings::default()
        };
        assert!(matches!(
            engine.apply_settings(settings),
            Err(SessionError::InvalidConfig(_))
        ));
        assert_eq!(prefs.settings().unwrap(), GameSettings::default());
        assert_eq!(engine.config().cardinality, 9);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let engine = SessionEngine::new(Arc::new(MemoryPreferences::new()));
        let bad = RoundConfig {
            lag: 4,
            total_events: 3,
            ..RoundConfig::default()
        };
        assert!(matches!(
            engine.configure(bad),
            Err(SessionError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_start_needs_runtime() {
        let engine = SessionEngine::new(Arc::new(MemoryPreferences::new()));
        assert!(matches!(
            engine.start(Arc::new(crate::session::SilentSpeaker)),
            Err(SessionError::NoRuntime)
        ));
    }
}
