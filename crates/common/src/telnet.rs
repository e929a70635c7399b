//! Minimal telnet option handling
//!
//! Monitors exposed with `-monitor telnet:...` open with option
//! negotiation. We refuse every option and strip all command sequences
//! from the data stream, the same as a bare telnet client does.

/// Interpret As Command
const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
/// Subnegotiation begin
const SB: u8 = 250;
/// Subnegotiation end
const SE: u8 = 240;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum State {
    #[default]
    Data,
    Command,
    Option(u8),
    Subnegotiation,
    SubnegotiationIac,
}

/// Stateful filter separating data bytes from telnet commands
///
/// Sequences split across reads are handled; state carries over between
/// calls to [`TelnetFilter::feed`].
#[derive(Debug, Default)]
pub struct TelnetFilter {
    state: State,
}

impl TelnetFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter `input`, appending payload to `data` and negotiation
    /// answers to `replies`
    pub fn feed(&mut self, input: &[u8], data: &mut Vec<u8>, replies: &mut Vec<u8>) {
        for &byte in input {
            self.state = match (self.state, byte) {
                (State::Data, IAC) => State::Command,
                (State::Data, _) => {
                    data.push(byte);
                    State::Data
                }
                (State::Command, IAC) => {
                    data.push(IAC);
                    State::Data
                }
                (State::Command, DO | DONT | WILL | WONT) => State::Option(byte),
                (State::Command, SB) => State::Subnegotiation,
                (State::Command, _) => State::Data,
                (State::Option(verb), option) => {
                    let answer = if matches!(verb, DO | DONT) { WONT } else { DONT };
                    replies.extend_from_slice(&[IAC, answer, option]);
                    State::Data
                }
                (State::Subnegotiation, IAC) => State::SubnegotiationIac,
                (State::Subnegotiation, _) => State::Subnegotiation,
                (State::SubnegotiationIac, SE) => State::Data,
                (State::SubnegotiationIac, _) => State::Subnegotiation,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ECHO: u8 = 1;
    const SUPPRESS_GO_AHEAD: u8 = 3;

    fn run(filter: &mut TelnetFilter, input: &[u8]) -> (Vec<u8>, Vec<u8>) {
        let mut data = Vec::new();
        let mut replies = Vec::new();
        filter.feed(input, &mut data, &mut replies);
        (data, replies)
    }

    #[test]
    fn test_plain_data_passes_through() {
        let mut filter = TelnetFilter::new();
        let (data, replies) = run(&mut filter, b"QEMU 8.2.2 monitor\r\n(qemu) ");
        assert_eq!(data, b"QEMU 8.2.2 monitor\r\n(qemu) ");
        assert!(replies.is_empty());
    }

    #[test]
    fn test_negotiation_is_refused() {
        let mut filter = TelnetFilter::new();
        let mut input = vec![IAC, WILL, ECHO, IAC, WILL, SUPPRESS_GO_AHEAD, IAC, DO, ECHO];
        input.extend_from_slice(b"QEMU");
        let (data, replies) = run(&mut filter, &input);

        assert_eq!(data, b"QEMU");
        assert_eq!(
            replies,
            vec![IAC, DONT, ECHO, IAC, DONT, SUPPRESS_GO_AHEAD, IAC, WONT, ECHO]
        );
    }

    #[test]
    fn test_escaped_iac_and_subnegotiation() {
        let mut filter = TelnetFilter::new();
        let (data, _) = run(&mut filter, &[b'a', IAC, IAC, IAC, SB, 24, 1, IAC, SE, b'b']);
        assert_eq!(data, vec![b'a', IAC, b'b']);
    }

    #[test]
    fn test_sequence_split_across_reads() {
        let mut filter = TelnetFilter::new();
        let (data, replies) = run(&mut filter, &[b'x', IAC]);
        assert_eq!(data, b"x");
        assert!(replies.is_empty());

        let (data, replies) = run(&mut filter, &[WILL]);
        assert!(data.is_empty());
        assert!(replies.is_empty());

        let (data, replies) = run(&mut filter, &[ECHO, b'y']);
        assert_eq!(data, b"y");
        assert_eq!(replies, vec![IAC, DONT, ECHO]);
    }
}
