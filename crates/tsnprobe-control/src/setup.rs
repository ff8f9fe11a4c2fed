use std::io::{Read, Write};

use tracing::info;

use crate::channel::ControlChannel;
use crate::error::{ControlError, Result};
use crate::message::ExperimentParameters;

/// What the listener learns from the talker before the first iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Setup {
    /// The sweep both roles iterate.
    pub parameters: ExperimentParameters,
    /// Data-plane destination address the talker transmits to.
    pub destination: String,
}

/// Talker side: send the parameter sweep, then the destination address.
///
/// Only the talker reads the profile, so the two machines cannot disagree on
/// which rows to run.
pub fn send_setup<R: Read, W: Write>(
    channel: &mut ControlChannel<R, W>,
    parameters: &ExperimentParameters,
    destination: &str,
) -> Result<()> {
    validate_destination(destination)?;
    let bytes = channel.send_json(parameters)?;
    channel.send_text(destination)?;
    info!(
        iterations = parameters.len(),
        bytes, destination, "sent experiment parameters"
    );
    Ok(())
}

/// Listener side: receive the parameter sweep and destination address.
pub fn receive_setup<R: Read, W: Write>(channel: &mut ControlChannel<R, W>) -> Result<Setup> {
    let parameters: ExperimentParameters = channel.recv_json("experiment parameters")?;
    let destination = channel.recv_text("destination address")?;
    validate_destination(&destination)?;
    info!(
        iterations = parameters.len(),
        destination = %destination,
        "received experiment parameters"
    );
    Ok(Setup {
        parameters,
        destination,
    })
}

fn validate_destination(destination: &str) -> Result<()> {
    if destination.trim().is_empty() {
        return Err(ControlError::violation(
            "destination address",
            "empty text",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::os::unix::net::UnixStream;
    use std::thread;

    use tsnprobe_frame::FramedChannel;

    use super::*;
    use crate::token::ControlToken;

    fn channel(stream: UnixStream) -> ControlChannel<UnixStream, UnixStream> {
        ControlChannel::new(FramedChannel::new(stream.try_clone().unwrap(), stream))
    }

    fn params() -> ExperimentParameters {
        ExperimentParameters::new(
            vec!["PayloadSize".into(), "TransmissionInterval".into(), "SO_PRIORITY".into()],
            vec![
                vec!["64".into(), "1000000".into(), "3".into()],
                vec!["128".into(), "1000000".into(), "3".into()],
            ],
        )
        .unwrap()
    }

    #[test]
    fn listener_receives_what_talker_sent() {
        let (left, right) = UnixStream::pair().unwrap();

        let talker = thread::spawn(move || {
            let mut ch = channel(left);
            send_setup(&mut ch, &params(), "01:80:C2:00:00:0E").unwrap();
        });

        let mut ch = channel(right);
        let setup = receive_setup(&mut ch).unwrap();
        talker.join().unwrap();

        assert_eq!(setup.parameters, params());
        assert_eq!(setup.destination, "01:80:C2:00:00:0E");
    }

    #[test]
    fn token_instead_of_parameters_is_violation() {
        let (left, right) = UnixStream::pair().unwrap();
        let mut talker = channel(left);
        talker.send_token(ControlToken::StartTalker).unwrap();

        let mut listener = channel(right);
        assert!(matches!(
            receive_setup(&mut listener),
            Err(ControlError::ProtocolViolation { .. })
        ));
    }

    #[test]
    fn empty_destination_rejected_before_sending() {
        let (left, _right) = UnixStream::pair().unwrap();
        let mut talker = channel(left);
        assert!(send_setup(&mut talker, &params(), "  ").is_err());
    }
}
