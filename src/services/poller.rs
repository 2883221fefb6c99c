//! Polling loops layered over a single [`RelayBoard`].
//!
//! Both loops are strictly serialized: one iteration finishes all of its
//! transactions and its sleep before the next one starts, and the [`StopFlag`]
//! is only consulted at the top of an iteration. When a loop owns the board
//! (`run`), every exit path ends with all relays switched off and then the
//! port released, in that order.

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::devices::{Channel, ChannelStates, RelayBoard};
use crate::modbus::client::SerialLink;
use crate::utils::error::RelayError;

/// Cancellation token shared between the signal handler and a polling loop.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Re-arm after a stop so the same flag can drive another loop.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// One row of monitor output, emitted when either status byte changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorEvent {
    pub timestamp: DateTime<Utc>,
    pub relay_status: Option<u8>,
    pub input_status: Option<u8>,
    /// `false` for the first row of a session.
    pub is_change: bool,
}

impl MonitorEvent {
    pub fn relays(&self) -> Option<ChannelStates> {
        self.relay_status.map(ChannelStates::from_relay_status)
    }

    pub fn inputs(&self) -> Option<ChannelStates> {
        self.input_status.map(ChannelStates::from_input_status)
    }
}

/// State after one auto-trigger iteration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerEvent {
    pub timestamp: DateTime<Utc>,
    /// `None` when the board did not answer the input read.
    pub inputs: Option<ChannelStates>,
    pub relays: ChannelStates,
    /// Relays written during this iteration, in the order they were written.
    pub switched: Vec<(Channel, bool)>,
}

/// Receives loop output. The binary renders it; tests record it.
pub trait PollObserver {
    fn on_monitor(&mut self, _event: &MonitorEvent) {}
    fn on_trigger(&mut self, _event: &TriggerEvent) {}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PollSummary {
    pub cycles: u64,
    pub changes: u64,
    pub relay_writes: u64,
    pub missed_reads: u64,
}

#[derive(Debug, Clone)]
pub struct PollOptions {
    pub interval: Duration,
    /// Stop on its own after this many iterations.
    pub max_cycles: Option<u64>,
}

impl PollOptions {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            max_cycles: None,
        }
    }

    pub fn with_max_cycles(mut self, max_cycles: Option<u64>) -> Self {
        self.max_cycles = max_cycles;
        self
    }
}

fn keep_going(stop: &StopFlag, options: &PollOptions, summary: &PollSummary) -> bool {
    if stop.is_stopped() {
        return false;
    }
    options.max_cycles.map_or(true, |max| summary.cycles < max)
}

/// Switch everything off, release the port, then report the loop's own result first.
fn finish<L: SerialLink>(
    board: RelayBoard<L>,
    result: Result<PollSummary, RelayError>,
) -> Result<PollSummary, RelayError> {
    let shutdown = board.shutdown();
    let summary = result?;
    shutdown?;
    Ok(summary)
}

/// Watches relay and input status and reports only when something changed.
pub struct MonitorLoop {
    options: PollOptions,
    stop: StopFlag,
}

impl MonitorLoop {
    pub fn new(options: PollOptions, stop: StopFlag) -> Self {
        Self { options, stop }
    }

    /// Poll until stopped, leaving the board connected and its relays untouched.
    pub fn poll<L: SerialLink>(
        &self,
        board: &mut RelayBoard<L>,
        observer: &mut dyn PollObserver,
    ) -> Result<PollSummary, RelayError> {
        info!("🔄 Monitor started (interval {:?})", self.options.interval);

        let mut summary = PollSummary::default();
        let mut last: Option<(Option<u8>, Option<u8>)> = None;

        while keep_going(&self.stop, &self.options, &summary) {
            let relay_status = board.relay_status()?;
            let input_status = board.inputs_raw()?;
            if relay_status.is_none() || input_status.is_none() {
                summary.missed_reads += 1;
            }

            let current = (relay_status, input_status);
            if last != Some(current) {
                let event = MonitorEvent {
                    timestamp: Utc::now(),
                    relay_status,
                    input_status,
                    is_change: last.is_some(),
                };
                if event.is_change {
                    summary.changes += 1;
                }
                observer.on_monitor(&event);
                last = Some(current);
            }

            summary.cycles += 1;
            thread::sleep(self.options.interval);
        }

        info!("⏹️  Monitor stopped after {} cycles ({} changes)", summary.cycles, summary.changes);
        Ok(summary)
    }

    /// Poll until stopped, then switch all relays off and release the port.
    pub fn run<L: SerialLink>(
        &self,
        mut board: RelayBoard<L>,
        observer: &mut dyn PollObserver,
    ) -> Result<PollSummary, RelayError> {
        let result = self.poll(&mut board, observer);
        finish(board, result)
    }
}

/// Mirrors each input onto the relay with the same number.
pub struct TriggerLoop {
    options: PollOptions,
    stop: StopFlag,
}

impl TriggerLoop {
    pub fn new(options: PollOptions, stop: StopFlag) -> Self {
        Self { options, stop }
    }

    pub fn poll<L: SerialLink>(
        &self,
        board: &mut RelayBoard<L>,
        observer: &mut dyn PollObserver,
    ) -> Result<PollSummary, RelayError> {
        info!("🔁 Input → relay trigger started (interval {:?})", self.options.interval);

        let mut summary = PollSummary::default();
        // Unknown at start, so the first good read writes every relay.
        let mut previous: [Option<bool>; 4] = [None; 4];

        while keep_going(&self.stop, &self.options, &summary) {
            let inputs = board.try_read_inputs()?;
            if inputs.is_none() {
                summary.missed_reads += 1;
            }

            // An unanswered read counts as nothing triggered, so driven relays drop out.
            let mut switched = Vec::new();
            for (channel, triggered) in inputs.unwrap_or_default().iter() {
                if previous[channel.index()] != Some(triggered) {
                    board.set_relay(channel, triggered)?;
                    previous[channel.index()] = Some(triggered);
                    switched.push((channel, triggered));
                }
            }

            if !switched.is_empty() {
                summary.changes += 1;
                summary.relay_writes += switched.len() as u64;
            }

            let relays = board.read_relays()?;
            observer.on_trigger(&TriggerEvent {
                timestamp: Utc::now(),
                inputs,
                relays,
                switched,
            });

            summary.cycles += 1;
            thread::sleep(self.options.interval);
        }

        if summary.missed_reads > 0 {
            warn!("{} input reads went unanswered", summary.missed_reads);
        }
        info!(
            "⏹️  Trigger stopped after {} cycles ({} relay writes)",
            summary.cycles, summary.relay_writes
        );
        Ok(summary)
    }

    /// Run until stopped, then switch all relays off and release the port.
    pub fn run<L: SerialLink>(
        &self,
        mut board: RelayBoard<L>,
        observer: &mut dyn PollObserver,
    ) -> Result<PollSummary, RelayError> {
        let result = self.poll(&mut board, observer);
        finish(board, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::{Config, TimingConfig};
    use crate::modbus::mock::{LinkEvent, MockLink};
    use crate::modbus::protocol::FunctionCode;

    #[derive(Default)]
    struct Recorder {
        monitor: Vec<MonitorEvent>,
        trigger: Vec<TriggerEvent>,
    }

    impl PollObserver for Recorder {
        fn on_monitor(&mut self, event: &MonitorEvent) {
            self.monitor.push(event.clone());
        }

        fn on_trigger(&mut self, event: &TriggerEvent) {
            self.trigger.push(event.clone());
        }
    }

    fn board() -> (RelayBoard<MockLink>, MockLink) {
        let link = MockLink::new();
        let handle = link.clone();
        let config = Config {
            timing: TimingConfig::immediate(),
            ..Config::default()
        };
        (RelayBoard::new(link, &config), handle)
    }

    fn options(cycles: u64) -> PollOptions {
        PollOptions::new(Duration::ZERO).with_max_cycles(Some(cycles))
    }

    #[test]
    fn test_stop_flag_is_shared() {
        let flag = StopFlag::new();
        let other = flag.clone();
        assert!(!flag.is_stopped());
        other.stop();
        assert!(flag.is_stopped());
        flag.reset();
        assert!(!other.is_stopped());
    }

    #[test]
    fn test_monitor_reports_only_changes() {
        let (mut board, link) = board();
        link.set_relay_status(0x01);
        link.script_inputs([0x0F, 0x0F, 0x0E, 0x0E, 0x0F]);

        let mut recorder = Recorder::default();
        let summary = MonitorLoop::new(options(5), StopFlag::new())
            .poll(&mut board, &mut recorder)
            .unwrap();

        assert_eq!(summary.cycles, 5);
        assert_eq!(summary.changes, 2);
        let rows: Vec<_> = recorder.monitor.iter().map(|e| (e.input_status, e.is_change)).collect();
        assert_eq!(rows, vec![(Some(0x0F), false), (Some(0x0E), true), (Some(0x0F), true)]);
        assert_eq!(recorder.monitor[1].inputs().unwrap().to_array(), [true, false, false, false]);
        assert!(!link.is_closed());
    }

    #[test]
    fn test_monitor_reports_loss_of_reply() {
        let (mut board, link) = board();
        link.set_relays_silent(true);

        let mut recorder = Recorder::default();
        let summary = MonitorLoop::new(options(3), StopFlag::new())
            .poll(&mut board, &mut recorder)
            .unwrap();

        assert_eq!(recorder.monitor.len(), 1);
        assert_eq!(recorder.monitor[0].relay_status, None);
        assert_eq!(recorder.monitor[0].relays(), None);
        assert_eq!(summary.missed_reads, 3);
    }

    #[test]
    fn test_trigger_mirrors_inputs_onto_relays() {
        let (board, link) = board();
        // open, IN1 triggered, IN1+IN3 triggered, all open
        link.script_inputs([0x0F, 0x0E, 0x0A, 0x0F]);

        let mut recorder = Recorder::default();
        let summary = TriggerLoop::new(options(4), StopFlag::new())
            .run(board, &mut recorder)
            .unwrap();

        let switched: Vec<Vec<(u8, bool)>> = recorder
            .trigger
            .iter()
            .map(|e| e.switched.iter().map(|(c, on)| (c.number(), *on)).collect())
            .collect();
        assert_eq!(
            switched,
            vec![
                vec![(1, false), (2, false), (3, false), (4, false)],
                vec![(1, true)],
                vec![(3, true)],
                vec![(1, false), (3, false)],
            ]
        );
        assert_eq!(recorder.trigger[2].relays.to_array(), [true, false, true, false]);
        assert_eq!(summary.relay_writes, 8);
        assert_eq!(summary.changes, 4);
    }

    #[test]
    fn test_trigger_iteration_order() {
        let (mut board, link) = board();
        link.script_inputs([0x0F, 0x0B]);

        let mut recorder = Recorder::default();
        TriggerLoop::new(options(2), StopFlag::new())
            .poll(&mut board, &mut recorder)
            .unwrap();

        // Second iteration: read inputs, write relay 3, read relays.
        let functions: Vec<u8> = link.sent_frames().iter().map(|f| f[1]).collect();
        assert_eq!(functions, vec![0x02, 0x05, 0x05, 0x05, 0x05, 0x01, 0x02, 0x05, 0x01]);
    }

    #[test]
    fn test_trigger_silent_inputs_switch_relays_off_once() {
        let (mut board, link) = board();
        link.set_input_status(None);
        link.set_relay_status(0x0F);

        let mut recorder = Recorder::default();
        let summary = TriggerLoop::new(options(3), StopFlag::new())
            .poll(&mut board, &mut recorder)
            .unwrap();

        assert_eq!(summary.missed_reads, 3);
        // First pass writes every relay off, later passes see no change.
        assert_eq!(link.frames_with_function(FunctionCode::WriteSingleCoil).len(), 4);
        assert_eq!(summary.relay_writes, 4);
        assert_eq!(link.relay_status(), 0x00);
        assert!(recorder.trigger.iter().all(|e| e.inputs.is_none()));
    }

    #[test]
    fn test_trigger_releases_relay_when_board_stops_answering() {
        let (mut board, link) = board();
        link.set_input_status(Some(0x0E));
        let silencer = link.clone();
        link.on_input_read(1, move || silencer.set_input_status(None));

        let mut recorder = Recorder::default();
        let summary = TriggerLoop::new(options(3), StopFlag::new())
            .poll(&mut board, &mut recorder)
            .unwrap();

        assert_eq!(recorder.trigger[0].relays.to_array(), [true, false, false, false]);
        assert_eq!(recorder.trigger[1].inputs, None);
        let switched: Vec<(u8, bool)> = recorder.trigger[1].switched.iter().map(|(c, on)| (c.number(), *on)).collect();
        assert_eq!(switched, vec![(1, false)]);
        assert!(recorder.trigger[2].switched.is_empty());
        assert_eq!(summary.missed_reads, 2);
        assert_eq!(link.relay_status(), 0x00);
    }

    #[test]
    fn test_stop_before_start_still_shuts_down() {
        let (board, link) = board();
        link.set_relay_status(0x0F);
        let stop = StopFlag::new();
        stop.stop();

        let mut recorder = Recorder::default();
        let summary = MonitorLoop::new(PollOptions::new(Duration::ZERO), stop)
            .run(board, &mut recorder)
            .unwrap();

        assert_eq!(summary.cycles, 0);
        assert!(recorder.monitor.is_empty());
        let events = link.events();
        let writes = link.frames_with_function(FunctionCode::WriteSingleCoil);
        assert_eq!(writes.len(), 4);
        assert!(writes.iter().all(|f| f[4..6] == [0x00, 0x00]));
        assert_eq!(events.last(), Some(&LinkEvent::Closed));
        assert_eq!(link.relay_status(), 0x00);
    }

    #[test]
    fn test_interrupt_mid_loop_finishes_iteration_then_shuts_down() {
        let (board, link) = board();
        link.script_inputs([0x0F, 0x0F, 0x0E]);
        let stop = StopFlag::new();
        let interrupt = stop.clone();
        link.on_input_read(3, move || interrupt.stop());

        let mut recorder = Recorder::default();
        let summary = TriggerLoop::new(PollOptions::new(Duration::ZERO), stop)
            .run(board, &mut recorder)
            .unwrap();

        // The iteration in which the stop arrived still completes.
        assert_eq!(summary.cycles, 3);
        assert_eq!(recorder.trigger[2].switched.len(), 1);

        let events = link.events();
        let close_at = events.iter().position(|e| *e == LinkEvent::Closed).unwrap();
        assert_eq!(close_at, events.len() - 1);

        let writes = link.frames_with_function(FunctionCode::WriteSingleCoil);
        let tail = &writes[writes.len() - 4..];
        for (i, frame) in tail.iter().enumerate() {
            assert_eq!(frame[3] as usize, i);
            assert_eq!(&frame[4..6], &[0x00, 0x00]);
        }
    }
}
