//! In-memory stand-in for a relay board on the other end of the RS-485 line.
//!
//! [`MockLink`] implements [`SerialLink`] and answers requests the way the real
//! board does: read requests get `[id, fc, 1, status, crc_lo, crc_hi]`, coil
//! writes are echoed and update the simulated relay byte. Everything that
//! crosses the link is recorded, including the moment the link is dropped, so
//! tests can assert on transaction ordering after the driver has been consumed.
//!
//! ```
//! use relay485::modbus::mock::MockLink;
//!
//! let link = MockLink::new();
//! link.set_relay_status(0x05);
//! let handle = link.clone();
//! // hand `link` to a driver, inspect `handle.sent_frames()` afterwards
//! # drop(link);
//! # assert!(handle.is_closed());
//! ```

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::client::SerialLink;
use super::crc::crc16_modbus;
use super::protocol::{FunctionCode, COIL_ON};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    ClearInput,
    Sent(Vec<u8>),
    Received(usize),
    Closed,
}

/// Callback fired on every read-inputs request from the `after`th one on.
struct InputReadHook {
    after: usize,
    callback: Box<dyn FnMut() + Send>,
}

#[derive(Default)]
struct MockState {
    /// Relay byte reported by read-coils; writes flip bits in it.
    relays: u8,
    /// Raw (active-low) input byte; `None` means the board stays silent on read-inputs.
    inputs: Option<u8>,
    /// Input bytes served in order before falling back to `inputs`.
    input_script: VecDeque<u8>,
    /// Verbatim responses that override the simulated device, one per request.
    raw_responses: VecDeque<Vec<u8>>,
    silent: bool,
    relays_silent: bool,
    /// Bytes waiting in the receive buffer.
    pending: Vec<u8>,
    input_reads: usize,
    input_hook: Option<InputReadHook>,
    last_send: Option<Instant>,
    /// Time from each send to the receive that followed it.
    receive_delays: Vec<Duration>,
    events: Vec<LinkEvent>,
}

/// The value returned by [`MockLink::new`] plays the port; clones are
/// observation handles sharing the same device state.
pub struct MockLink {
    state: Arc<Mutex<MockState>>,
    is_port: bool,
}

impl Clone for MockLink {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            is_port: false,
        }
    }
}

impl Default for MockLink {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLink {
    /// A board with all relays off and all inputs open.
    pub fn new() -> Self {
        let state = MockState {
            inputs: Some(0xFF),
            ..MockState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            is_port: true,
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_relay_status(&self, status: u8) {
        self.state().relays = status;
    }

    pub fn relay_status(&self) -> u8 {
        self.state().relays
    }

    pub fn set_input_status(&self, raw: Option<u8>) {
        self.state().inputs = raw;
    }

    /// Serve these raw input bytes on successive read-inputs requests; the last
    /// one sticks once the script runs out.
    pub fn script_inputs<I: IntoIterator<Item = u8>>(&self, raw: I) {
        let mut state = self.state();
        state.input_script.extend(raw);
        if let Some(&last) = state.input_script.back() {
            state.inputs = Some(last);
        }
    }

    pub fn queue_raw_response(&self, bytes: &[u8]) {
        self.state().raw_responses.push_back(bytes.to_vec());
    }

    /// Leave stale bytes in the receive buffer, as if a previous reply arrived late.
    pub fn inject_stale(&self, bytes: &[u8]) {
        self.state().pending.extend_from_slice(bytes);
    }

    /// Never answer any request.
    pub fn set_silent(&self, silent: bool) {
        self.state().silent = silent;
    }

    pub fn set_relays_silent(&self, silent: bool) {
        self.state().relays_silent = silent;
    }

    /// Run `callback` when the `n`th read-inputs request arrives and on every
    /// one after it. The callback may use another handle to this link.
    pub fn on_input_read<F>(&self, n: usize, callback: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.state().input_hook = Some(InputReadHook {
            after: n,
            callback: Box::new(callback),
        });
    }

    pub fn receive_delays(&self) -> Vec<Duration> {
        self.state().receive_delays.clone()
    }

    pub fn events(&self) -> Vec<LinkEvent> {
        self.state().events.clone()
    }

    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.state()
            .events
            .iter()
            .filter_map(|e| match e {
                LinkEvent::Sent(frame) => Some(frame.clone()),
                _ => None,
            })
            .collect()
    }

    /// Sent frames carrying the given function code.
    pub fn frames_with_function(&self, function: FunctionCode) -> Vec<Vec<u8>> {
        self.sent_frames()
            .into_iter()
            .filter(|f| f.get(1) == Some(&function.code()))
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.state().events.contains(&LinkEvent::Closed)
    }

    pub fn clear_events(&self) {
        self.state().events.clear();
    }
}

fn read_reply(device_id: u8, function: u8, status: u8) -> Vec<u8> {
    let mut reply = vec![device_id, function, 0x01, status];
    let crc = crc16_modbus(&reply);
    reply.extend_from_slice(&crc.to_le_bytes());
    reply
}

impl MockState {
    fn respond(&mut self, frame: &[u8]) -> Option<Vec<u8>> {
        if let Some(raw) = self.raw_responses.pop_front() {
            return Some(raw);
        }
        if self.silent || frame.len() < 6 {
            return None;
        }

        let device_id = frame[0];
        let function = frame[1];
        let address = u16::from_be_bytes([frame[2], frame[3]]);
        let value = u16::from_be_bytes([frame[4], frame[5]]);

        if function == FunctionCode::ReadCoils.code() {
            // The board ignores read requests that don't ask for all 8 bits.
            if self.relays_silent || value != 8 {
                return None;
            }
            Some(read_reply(device_id, function, self.relays))
        } else if function == FunctionCode::ReadDiscreteInputs.code() {
            self.input_reads += 1;
            if value != 8 {
                return None;
            }
            let raw = self.input_script.pop_front().or(self.inputs)?;
            Some(read_reply(device_id, function, raw))
        } else if function == FunctionCode::WriteSingleCoil.code() {
            if address < 8 {
                if value == COIL_ON {
                    self.relays |= 1 << address;
                } else {
                    self.relays &= !(1 << address);
                }
            }
            Some(frame.to_vec())
        } else {
            None
        }
    }
}

impl SerialLink for MockLink {
    fn clear_input(&mut self) -> io::Result<()> {
        let mut state = self.state();
        state.pending.clear();
        state.events.push(LinkEvent::ClearInput);
        Ok(())
    }

    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        let mut state = self.state();
        if state.events.contains(&LinkEvent::Closed) {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "link closed"));
        }
        state.events.push(LinkEvent::Sent(frame.to_vec()));
        state.last_send = Some(Instant::now());
        if let Some(reply) = state.respond(frame) {
            state.pending.extend_from_slice(&reply);
        }

        let is_input_read = frame.get(1) == Some(&FunctionCode::ReadDiscreteInputs.code());
        let hook = match state.input_hook.take() {
            Some(hook) if is_input_read && state.input_reads >= hook.after => Some(hook),
            other => {
                state.input_hook = other;
                None
            }
        };
        drop(state);

        // Called without the lock held so it can reach the link through a handle.
        if let Some(mut hook) = hook {
            (hook.callback)();
            self.state().input_hook.get_or_insert(hook);
        }
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8], _timeout: Duration) -> io::Result<usize> {
        let mut state = self.state();
        let n = state.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&state.pending[..n]);
        state.pending.drain(..n);
        if let Some(sent_at) = state.last_send.take() {
            state.receive_delays.push(sent_at.elapsed());
        }
        state.events.push(LinkEvent::Received(n));
        Ok(n)
    }
}

impl Drop for MockLink {
    fn drop(&mut self) {
        if self.is_port {
            self.state().events.push(LinkEvent::Closed);
        }
    }
}
