// Error types for rover-console

use snafu::Snafu;
use std::io;

#[derive(Debug, Snafu)]
pub enum ConsoleError {
    // Errors for the controller channel
    #[snafu(display("Invalid controller address: {addr}"))]
    InvalidControllerAddress { addr: String },
    #[snafu(display("Could not start the channel runtime"))]
    ChannelRuntimeError { source: io::Error },

    // Errors while decoding inbound events
    #[snafu(display("Unknown event from controller: {event}"))]
    UnknownEvent { event: String },
    #[snafu(display("Malformed {event} payload"))]
    MalformedPayload {
        event: String,
        source: serde_json::Error,
    },
    #[snafu(display("Could not decode {event} image"))]
    InvalidFrame {
        event: String,
        source: base64::DecodeError,
    },

    // Errors for the event log writer
    #[snafu(display("Error writing event log file"))]
    WriterError { source: io::Error },

    // Config management errors
    #[snafu(display("Could not find application data directory to save config file"))]
    NoConfigDir,
    #[snafu(display("Error reading or writing config file"))]
    ConfigIOError { source: io::Error },
    #[snafu(display("Error serializing config file"))]
    ConfigSerializeError { source: serde_json::Error },

    // Replay errors
    #[snafu(display("Invalid replay file: {path}"))]
    InvalidReplayFile { path: String },
    #[snafu(display("Error loading replay file"))]
    ReplayLoaderError { source: io::Error },

    // Console input errors
    #[snafu(display("Invalid operator command: {input} - {reason}"))]
    InvalidOperatorCommand { input: String, reason: String },
    #[snafu(display("Could not read operator input"))]
    OperatorInputError { source: io::Error },
    #[snafu(display("Could not install the Ctrl-C handler"))]
    SignalHandlerError { source: ctrlc::Error },
}
