//! Terminal input decoding
//!
//! Turns the raw bytes a terminal sends back into session events. Only the
//! few sequences the pipeline reacts to are recognized:
//!
//! - `Ctrl+C` (0x03): interrupt
//! - `Ctrl+D` (0x04): end of input
//! - `ESC [ row ; col R`: cursor position report, the frame acknowledgement
//!
//! Everything else is consumed and dropped. Sequences may be split across
//! reads; the decoder keeps its state between calls.

use crate::core::session::SessionEvent;

const CTRL_C: u8 = 0x03;
const CTRL_D: u8 = 0x04;
const ESC: u8 = 0x1b;

/// At most this many numeric parameters are kept per CSI sequence
const MAX_PARAMS: usize = 4;

#[derive(Clone, Copy, Default, PartialEq, Debug)]
enum DecoderState {
    #[default]
    Ground,
    Escape,
    Csi,
}

/// Incremental decoder for terminal replies and control keys
#[derive(Default)]
pub struct InputDecoder {
    state: DecoderState,
    params: [u16; MAX_PARAMS],
    param_count: usize,
    current: Option<u16>,
}

impl InputDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes, appending recognized events to `events`
    pub fn feed(&mut self, bytes: &[u8], events: &mut Vec<SessionEvent>) {
        for &b in bytes {
            if let Some(event) = self.feed_byte(b) {
                events.push(event);
            }
        }
    }

    fn feed_byte(&mut self, b: u8) -> Option<SessionEvent> {
        match self.state {
            DecoderState::Ground => match b {
                CTRL_C => Some(SessionEvent::Interrupt),
                CTRL_D => Some(SessionEvent::EndOfInput),
                ESC => {
                    self.state = DecoderState::Escape;
                    None
                }
                _ => None,
            },
            DecoderState::Escape => {
                match b {
                    b'[' => {
                        self.state = DecoderState::Csi;
                        self.param_count = 0;
                        self.current = None;
                    }
                    ESC => {}
                    _ => self.state = DecoderState::Ground,
                }
                None
            }
            DecoderState::Csi => self.feed_csi(b),
        }
    }

    fn feed_csi(&mut self, b: u8) -> Option<SessionEvent> {
        match b {
            b'0'..=b'9' => {
                let digit = (b - b'0') as u16;
                let value = self.current.unwrap_or(0);
                self.current = Some(value.saturating_mul(10).saturating_add(digit));
                None
            }
            b';' => {
                self.push_param();
                None
            }
            ESC => {
                self.state = DecoderState::Escape;
                None
            }
            // Final byte
            0x40..=0x7e => {
                self.push_param();
                self.state = DecoderState::Ground;
                if b == b'R' && self.param_count == 2 {
                    Some(SessionEvent::Ack {
                        row: self.params[0],
                        col: self.params[1],
                    })
                } else {
                    None
                }
            }
            // Private markers and intermediates
            _ => None,
        }
    }

    fn push_param(&mut self) {
        let value = self.current.take().unwrap_or(0);
        if self.param_count < MAX_PARAMS {
            self.params[self.param_count] = value;
        }
        self.param_count += 1;
    }
}
