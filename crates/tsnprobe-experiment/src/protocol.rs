//! Per-iteration lock-step between talker and listener.
//!
//! For every parameter row both roles walk the same token sequence:
//!
//! ```text
//! listener                               talker
//!   prepare receiver, settle
//!   START_TALKER                 ---->
//!                                        start transmitter
//!                                <----   START_/NO_NETWORK_INTERFERENCE
//!   start interference client
//!                                        wait for transmitter
//!                                <----   STOP_LISTENER
//!   stop receiver
//!                                <----   INTERMEDIATE_TSTAMPS_INCOMING + trace
//!                                        or NO_INTERMEDIATE_TSTAMPS
//!   merge and write results
//! ```
//!
//! After the last row the listener sends `LISTENER_END`. A token out of
//! place is a protocol violation and ends the run.

use std::io::{Read, Write};
use std::path::PathBuf;

use tracing::{info, warn};
use tsnprobe_control::{ControlChannel, ControlToken, ExperimentParameters, Factors, IntermediateTrace};

use crate::error::Result;

/// Side effects of one talker iteration, sequenced by [`run_talker`].
pub trait TalkerStage {
    /// Start helpers and the transmitter. Returns whether interference
    /// traffic was started.
    fn start(&mut self, factors: &Factors) -> Result<bool>;

    /// Wait for the transmitter and stop the helpers. Returns `true` when the
    /// clock offset moved during the run.
    fn wait(&mut self) -> Result<bool>;

    /// The intermediate trace of the run just finished, if tracing is on.
    fn trace(&mut self) -> Result<Option<IntermediateTrace>>;
}

/// Side effects of one listener iteration, sequenced by [`run_listener`].
pub trait ListenerStage {
    /// Start helpers and the receiver, then let the host settle.
    fn prepare(&mut self, factors: &Factors) -> Result<()>;

    /// Start the interference client against the talker.
    fn start_interference(&mut self) -> Result<()>;

    /// Stop helpers and the receiver.
    fn stop(&mut self) -> Result<()>;

    /// Assemble and persist the iteration's results.
    fn finish(&mut self, factors: &Factors, talker_trace: Option<IntermediateTrace>) -> Result<IterationOutcome>;
}

/// Result of one iteration on one side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IterationOutcome {
    /// The TAI-monotonic offset changed; timestamps may be invalid.
    pub suspect: bool,
    /// Results file written by the listener.
    pub results_file: Option<PathBuf>,
}

/// An [`IterationOutcome`] with the row that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationReport {
    /// Zero-based row index.
    pub index: usize,
    pub factors: Factors,
    pub outcome: IterationOutcome,
}

/// Talker side of every iteration.
pub fn run_talker<R: Read, W: Write>(
    channel: &mut ControlChannel<R, W>,
    parameters: &ExperimentParameters,
    stage: &mut dyn TalkerStage,
) -> Result<Vec<IterationReport>> {
    let mut reports = Vec::with_capacity(parameters.len());
    for (index, factors) in parameters.iter().enumerate() {
        channel.expect(ControlToken::StartTalker)?;

        let interference = stage.start(factors)?;
        channel.send_token(ControlToken::interference(interference))?;

        let suspect = stage.wait()?;
        channel.send_token(ControlToken::StopListener)?;

        match stage.trace()? {
            Some(trace) => {
                channel.send_token(ControlToken::IntermediateTstampsIncoming)?;
                let bytes = channel.send_json(&trace)?;
                info!(rows = trace.len(), bytes, "sent intermediate timestamps");
            }
            None => channel.send_token(ControlToken::NoIntermediateTstamps)?,
        }

        log_iteration(index, parameters.len(), suspect);
        reports.push(IterationReport {
            index,
            factors: factors.clone(),
            outcome: IterationOutcome {
                suspect,
                results_file: None,
            },
        });
    }
    Ok(reports)
}

/// Listener side of every iteration.
pub fn run_listener<R: Read, W: Write>(
    channel: &mut ControlChannel<R, W>,
    parameters: &ExperimentParameters,
    stage: &mut dyn ListenerStage,
) -> Result<Vec<IterationReport>> {
    let mut reports = Vec::with_capacity(parameters.len());
    for (index, factors) in parameters.iter().enumerate() {
        stage.prepare(factors)?;
        channel.send_token(ControlToken::StartTalker)?;

        let interference = channel.expect_one_of(&[
            ControlToken::NoNetworkInterference,
            ControlToken::StartNetworkInterference,
        ])?;
        if interference == ControlToken::StartNetworkInterference {
            stage.start_interference()?;
        }

        channel.expect(ControlToken::StopListener)?;
        stage.stop()?;

        let incoming = channel.expect_one_of(&[
            ControlToken::IntermediateTstampsIncoming,
            ControlToken::NoIntermediateTstamps,
        ])?;
        let talker_trace = match incoming {
            ControlToken::IntermediateTstampsIncoming => {
                Some(channel.recv_json::<IntermediateTrace>("intermediate timestamps")?)
            }
            _ => None,
        };

        let outcome = stage.finish(factors, talker_trace)?;
        log_iteration(index, parameters.len(), outcome.suspect);
        reports.push(IterationReport {
            index,
            factors: factors.clone(),
            outcome,
        });
    }
    Ok(reports)
}

/// Talker: wait for the listener to confirm it is done.
pub fn finish_talker<R: Read, W: Write>(channel: &mut ControlChannel<R, W>) -> Result<()> {
    channel.expect(ControlToken::ListenerEnd)?;
    Ok(())
}

/// Listener: confirm every iteration is done.
pub fn finish_listener<R: Read, W: Write>(channel: &mut ControlChannel<R, W>) -> Result<()> {
    channel.send_token(ControlToken::ListenerEnd)?;
    Ok(())
}

fn log_iteration(index: usize, total: usize, suspect: bool) {
    if suspect {
        warn!(iteration = index + 1, total, "iteration complete; data might be invalid");
    } else {
        info!(iteration = index + 1, total, "iteration complete");
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::net::UnixStream;
    use std::sync::{Arc, Mutex};
    use std::thread;

    use bytes::BytesMut;
    use tsnprobe_control::ControlError;
    use tsnprobe_frame::{decode_frame, FrameConfig, FramedChannel};

    use super::*;
    use crate::error::ExperimentError;

    type Channel = ControlChannel<UnixStream, UnixStream>;

    fn channel(stream: UnixStream) -> Channel {
        let reader = stream.try_clone().unwrap();
        ControlChannel::new(FramedChannel::with_config(reader, stream, FrameConfig::default()))
    }

    fn params(rows: usize) -> ExperimentParameters {
        ExperimentParameters::new(
            vec!["PayloadSize".into(), "TransmissionInterval".into(), "SO_PRIORITY".into()],
            (0..rows)
                .map(|i| vec![format!("{}", 64 * (i + 1)), "1000000".into(), "3".into()])
                .collect(),
        )
        .unwrap()
    }

    #[derive(Clone, Default)]
    struct Journal(Arc<Mutex<Vec<String>>>);

    impl Journal {
        fn note(&self, entry: impl Into<String>) {
            self.0.lock().unwrap().push(entry.into());
        }

        fn entries(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    struct MockTalker {
        journal: Journal,
        interference: bool,
        trace: bool,
    }

    impl TalkerStage for MockTalker {
        fn start(&mut self, factors: &Factors) -> Result<bool> {
            self.journal.note(format!("talker start {}", factors.get("PayloadSize").unwrap()));
            Ok(self.interference)
        }

        fn wait(&mut self) -> Result<bool> {
            self.journal.note("talker wait");
            Ok(false)
        }

        fn trace(&mut self) -> Result<Option<IntermediateTrace>> {
            if !self.trace {
                return Ok(None);
            }
            Ok(Some(IntermediateTrace::new(vec!["sendto".into()], vec![vec!["1".into()]])?))
        }
    }

    struct MockListener {
        journal: Journal,
        traces: Vec<Option<IntermediateTrace>>,
    }

    impl ListenerStage for MockListener {
        fn prepare(&mut self, factors: &Factors) -> Result<()> {
            self.journal.note(format!("listener prepare {}", factors.get("PayloadSize").unwrap()));
            Ok(())
        }

        fn start_interference(&mut self) -> Result<()> {
            self.journal.note("listener interference");
            Ok(())
        }

        fn stop(&mut self) -> Result<()> {
            self.journal.note("listener stop");
            Ok(())
        }

        fn finish(&mut self, factors: &Factors, talker_trace: Option<IntermediateTrace>) -> Result<IterationOutcome> {
            self.traces.push(talker_trace);
            Ok(IterationOutcome {
                suspect: false,
                results_file: Some(PathBuf::from(format!(
                    "results-{}.csv",
                    factors.get("PayloadSize").unwrap()
                ))),
            })
        }
    }

    fn run_pair(interference: bool, trace: bool) -> (Vec<IterationReport>, MockListener, Journal) {
        let (a, b) = UnixStream::pair().unwrap();
        let journal = Journal::default();
        let parameters = params(2);

        let talker_journal = journal.clone();
        let talker_params = parameters.clone();
        let talker = thread::spawn(move || {
            let mut channel = channel(a);
            let mut stage = MockTalker {
                journal: talker_journal,
                interference,
                trace,
            };
            let reports = run_talker(&mut channel, &talker_params, &mut stage).unwrap();
            finish_talker(&mut channel).unwrap();
            reports
        });

        let mut channel = channel(b);
        let mut stage = MockListener {
            journal: journal.clone(),
            traces: Vec::new(),
        };
        let reports = run_listener(&mut channel, &parameters, &mut stage).unwrap();
        finish_listener(&mut channel).unwrap();

        let talker_reports = talker.join().unwrap();
        assert_eq!(talker_reports.len(), 2);
        assert!(talker_reports.iter().all(|r| r.outcome.results_file.is_none()));
        (reports, stage, journal)
    }

    #[test]
    fn two_row_sweep_in_lock_step() {
        let (reports, listener, journal) = run_pair(false, false);
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[1].index, 1);
        assert_eq!(
            reports[1].outcome.results_file,
            Some(PathBuf::from("results-128.csv"))
        );
        assert_eq!(listener.traces, [None, None]);

        // The listener only reaches `stop` after the talker's wait, and only
        // prepares row 2 after finishing row 1.
        let entries = journal.entries();
        let pos = |e: &str| entries.iter().position(|x| x == e).unwrap();
        assert!(pos("listener prepare 64") < pos("talker start 64"));
        assert!(pos("talker wait") < pos("listener stop"));
        assert!(pos("listener stop") < pos("listener prepare 128"));
        assert!(!entries.iter().any(|e| e == "listener interference"));
    }

    #[test]
    fn interference_and_traces_forwarded() {
        let (_, listener, journal) = run_pair(true, true);
        assert_eq!(
            journal
                .entries()
                .iter()
                .filter(|e| *e == "listener interference")
                .count(),
            2
        );
        let trace = listener.traces[0].as_ref().unwrap();
        assert_eq!(trace.header(), ["sendto"]);
        assert_eq!(listener.traces[1].as_ref().unwrap().rows(), [vec!["1"]]);
    }

    /// Copies every byte the talker reads so the inbound frames can be
    /// checked after the run.
    struct Recording {
        inner: UnixStream,
        seen: Arc<Mutex<Vec<u8>>>,
    }

    impl Read for Recording {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = self.inner.read(buf)?;
            self.seen.lock().unwrap().extend_from_slice(&buf[..n]);
            Ok(n)
        }
    }

    fn wire_text(payload: &[u8]) -> String {
        let text = String::from_utf8_lossy(payload).into_owned();
        if text.starts_with('{') {
            "<trace>".to_string()
        } else {
            text
        }
    }

    /// Every frame of a 2-row sweep, in both directions.
    #[test]
    fn talker_wire_sequence() {
        let (talker_end, peer) = UnixStream::pair().unwrap();

        // Queue up everything the listener would send before the talker runs.
        let mut listener = channel(peer);
        for token in [
            ControlToken::StartTalker,
            ControlToken::StartTalker,
            ControlToken::ListenerEnd,
        ] {
            listener.send_token(token).unwrap();
        }

        let inbound = Arc::new(Mutex::new(Vec::new()));
        let recorded = inbound.clone();
        let talker = thread::spawn(move || {
            let reader = Recording {
                inner: talker_end.try_clone().unwrap(),
                seen: recorded,
            };
            let mut channel = ControlChannel::new(FramedChannel::new(reader, talker_end));
            let mut stage = MockTalker {
                journal: Journal::default(),
                interference: false,
                trace: true,
            };
            run_talker(&mut channel, &params(2), &mut stage).unwrap();
            finish_talker(&mut channel).unwrap();
        });
        talker.join().unwrap();

        let mut bytes = BytesMut::from(&inbound.lock().unwrap()[..]);
        let mut received = Vec::new();
        while let Some(payload) = decode_frame(&mut bytes, &FrameConfig::default()).unwrap() {
            received.push(wire_text(&payload));
        }
        assert!(bytes.is_empty());
        assert_eq!(received, ["START_TALKER", "START_TALKER", "LISTENER_END"]);

        let mut frames = listener.into_inner();
        let mut sent = Vec::new();
        while let Ok(payload) = frames.receive() {
            sent.push(wire_text(&payload));
        }
        assert_eq!(
            sent,
            [
                "NO_NETWORK_INTERFERENCE",
                "STOP_LISTENER",
                "INTERMEDIATE_TSTAMPS_INCOMING",
                "<trace>",
                "NO_NETWORK_INTERFERENCE",
                "STOP_LISTENER",
                "INTERMEDIATE_TSTAMPS_INCOMING",
                "<trace>"
            ]
        );
    }

    #[test]
    fn unexpected_token_is_violation() {
        let (a, b) = UnixStream::pair().unwrap();
        let talker = thread::spawn(move || {
            let mut channel = channel(a);
            let mut stage = MockTalker {
                journal: Journal::default(),
                interference: false,
                trace: false,
            };
            run_talker(&mut channel, &params(1), &mut stage)
        });

        let mut listener = channel(b);
        listener.send_token(ControlToken::StopListener).unwrap();

        let err = talker.join().unwrap().unwrap_err();
        match err {
            ExperimentError::Control(ControlError::ProtocolViolation { expected, got }) => {
                assert_eq!(expected, "START_TALKER");
                assert_eq!(got, "'STOP_LISTENER'");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn talker_rejects_wrong_end_token() {
        let (a, b) = UnixStream::pair().unwrap();
        let mut talker = channel(a);
        let mut listener = channel(b);
        listener.send_token(ControlToken::StartTalker).unwrap();
        assert!(finish_talker(&mut talker).is_err());
    }
}
