use std::{
    path::Path,
    time::{Duration, Instant},
};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    ConsoleError,
    channel::{
        MockChannel, WireMessage,
        protocol::{CONNECT_EVENT, DISCONNECT_EVENT},
    },
    console::{apply_intent, parse_intent},
    session::{Session, SessionSettings},
};

/// One line of a replay file: either a message the controller sent, or a console command
/// typed by the operator. `at_ms` is the offset from the start of the recording.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReplayStep {
    Operator {
        #[serde(default)]
        at_ms: u64,
        operator: String,
    },
    Inbound {
        #[serde(default)]
        at_ms: u64,
        #[serde(flatten)]
        message: WireMessage,
    },
}

impl ReplayStep {
    pub fn at_ms(&self) -> u64 {
        match self {
            Self::Operator { at_ms, .. } | Self::Inbound { at_ms, .. } => *at_ms,
        }
    }
}

pub struct ReplayOutcome {
    pub session: Session<MockChannel>,
    /// Console feedback for every operator step, in order
    pub replies: Vec<String>,
    /// Steps that could not be decoded or parsed
    pub skipped: usize,
}

pub fn load_replay(source_file: &Path) -> Result<Vec<ReplayStep>, ConsoleError> {
    if !source_file.is_file() {
        return Err(ConsoleError::InvalidReplayFile {
            path: source_file.display().to_string(),
        });
    }
    let steps = serde_jsonlines::json_lines(source_file)
        .map_err(|e| ConsoleError::ReplayLoaderError { source: e })?
        .collect::<Result<Vec<ReplayStep>, std::io::Error>>()
        .map_err(|e| ConsoleError::ReplayLoaderError { source: e })?;
    info!("Loaded {} replay steps from {:?}", steps.len(), source_file);
    Ok(steps)
}

/// Runs `steps` through a session over a [`MockChannel`]. Time only moves forward, a step
/// stamped earlier than its predecessor is applied at the predecessor's time.
pub fn replay(steps: Vec<ReplayStep>, settings: SessionSettings) -> ReplayOutcome {
    let start = Instant::now();
    let mut session = Session::new(MockChannel::new(), settings);
    let mut replies = Vec::new();
    let mut skipped = 0;
    // connect on the mock never fails
    let _ = session.connect();
    session.poll(start);

    let mut offset = Duration::ZERO;
    for step in steps {
        offset = offset.max(Duration::from_millis(step.at_ms()));
        let now = start + offset;
        match step {
            ReplayStep::Inbound { message, .. } => {
                // recorded link changes stand in for the transport
                match message.event.as_str() {
                    DISCONNECT_EVENT => session.channel_mut().drop_link(),
                    CONNECT_EVENT => session.channel_mut().restore_link(),
                    _ => {
                        if let Err(e) = session.channel_mut().push_wire(message) {
                            warn!("Skipping replay step at {:?}: {}", offset, e);
                            skipped += 1;
                        }
                    }
                }
                session.poll(now);
            }
            ReplayStep::Operator { operator, .. } => {
                session.tick(now);
                match parse_intent(&operator) {
                    Ok(intent) => replies.push(apply_intent(&mut session, intent)),
                    Err(e) => {
                        warn!("Skipping replay step at {:?}: {}", offset, e);
                        skipped += 1;
                    }
                }
            }
        }
    }
    session.poll(start + offset);

    ReplayOutcome {
        session,
        replies,
        skipped,
    }
}
