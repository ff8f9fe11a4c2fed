use std::fmt;

/// Fixed control markers exchanged between talker and listener.
///
/// On the wire each token is its exact ASCII name as a frame payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlToken {
    /// Listener receiver is up and settled; the talker may transmit.
    StartTalker,
    /// Talker finished transmitting; the listener stops its receiver.
    StopListener,
    /// Listener completed every iteration.
    ListenerEnd,
    /// No interference traffic this iteration.
    NoNetworkInterference,
    /// Talker started an `iperf3` server; the listener should start the client.
    StartNetworkInterference,
    /// A serialized intermediate trace follows.
    IntermediateTstampsIncoming,
    /// No intermediate trace this iteration.
    NoIntermediateTstamps,
}

impl ControlToken {
    /// Every token, in protocol order of first appearance.
    pub const ALL: [ControlToken; 7] = [
        ControlToken::StartTalker,
        ControlToken::NoNetworkInterference,
        ControlToken::StartNetworkInterference,
        ControlToken::StopListener,
        ControlToken::IntermediateTstampsIncoming,
        ControlToken::NoIntermediateTstamps,
        ControlToken::ListenerEnd,
    ];

    /// Wire representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            ControlToken::StartTalker => "START_TALKER",
            ControlToken::StopListener => "STOP_LISTENER",
            ControlToken::ListenerEnd => "LISTENER_END",
            ControlToken::NoNetworkInterference => "NO_NETWORK_INTERFERENCE",
            ControlToken::StartNetworkInterference => "START_NETWORK_INTERFERENCE",
            ControlToken::IntermediateTstampsIncoming => "INTERMEDIATE_TSTAMPS_INCOMING",
            ControlToken::NoIntermediateTstamps => "NO_INTERMEDIATE_TSTAMPS",
        }
    }

    pub fn as_bytes(self) -> &'static [u8] {
        self.as_str().as_bytes()
    }

    /// Match a received payload against the vocabulary. Exact byte match only.
    pub fn from_bytes(payload: &[u8]) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|token| token.as_bytes() == payload)
    }

    /// Token announcing whether interference traffic runs this iteration.
    pub fn interference(enabled: bool) -> Self {
        if enabled {
            ControlToken::StartNetworkInterference
        } else {
            ControlToken::NoNetworkInterference
        }
    }
}

impl fmt::Display for ControlToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
