//! Error types for the scanlink-core library.

use std::fmt;

use thiserror::Error;

/// Result type alias for scanlink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed native error kept as the `source` of a wrapped failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by the scanning core.
#[derive(Error, Debug)]
pub enum Error {
    /// The platform scanning session could not be started.
    #[error("Failed to initialize scanner backend: {message}")]
    Initialization {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Device listing failed.
    #[error("Failed to enumerate scanner devices: {message}")]
    Enumeration {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Talking to the device failed.
    #[error("Scanner communication failed while {stage}: {message}")]
    DeviceCommunication {
        stage: DeviceStage,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Image decode, JPEG encode or PDF serialization failed.
    #[error("Encoding failed during {stage}: {message}")]
    Encoding {
        stage: EncodingStage,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Invalid or occupied port.
    #[error(transparent)]
    PortConfig(#[from] PortConfigError),

    /// The HTTP listener could not be bound.
    #[error("Failed to start HTTP listener on {addr}: {source}")]
    ListenerBind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The HTTP listener could not be closed.
    #[error("Failed to stop HTTP listener: {0}")]
    ListenerShutdown(String),

    /// No device is selected, or the selection is not in the current snapshot.
    #[error("No scanner device selected")]
    NoDeviceSelected,

    /// The command is not allowed in the current state.
    #[error("Operation not allowed: {0}")]
    InvalidState(String),
}

impl Error {
    pub fn initialization(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Initialization {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn enumeration(message: impl Into<String>, source: Option<BoxError>) -> Self {
        Self::Enumeration {
            message: message.into(),
            source,
        }
    }

    pub fn device(stage: DeviceStage, message: impl Into<String>, source: Option<BoxError>) -> Self {
        Self::DeviceCommunication {
            stage,
            message: message.into(),
            source,
        }
    }

    pub fn encoding(
        stage: EncodingStage,
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Encoding {
            stage,
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Whether the caller may retry the operation that produced this error.
    ///
    /// Only a failed platform initialization is fatal to the process.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Initialization { .. })
    }
}

/// Step of a device exchange that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStage {
    /// Opening or connecting to the device.
    Open,
    /// Starting the acquisition.
    Start,
    /// Reading the frame parameters.
    Parameters,
    /// Reading image data.
    Read,
    /// Transferring an item from an automation object.
    Transfer,
}

impl fmt::Display for DeviceStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            Self::Open => "opening the device",
            Self::Start => "starting the scan",
            Self::Parameters => "reading scan parameters",
            Self::Read => "reading image data",
            Self::Transfer => "transferring the scanned item",
        };
        f.write_str(stage)
    }
}

/// Encoding pipeline stage that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingStage {
    Decode,
    JpegEncode,
    PdfSerialize,
}

impl fmt::Display for EncodingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            Self::Decode => "image decoding",
            Self::JpegEncode => "JPEG encoding",
            Self::PdfSerialize => "PDF serialization",
        };
        f.write_str(stage)
    }
}

/// Port validation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PortConfigError {
    /// The port is not an integer.
    #[error("Invalid port {0:?}: only integers are accepted")]
    NotInteger(String),

    /// The port is outside the TCP range.
    #[error("Port {0} is outside the accepted range 0 to 65535")]
    OutOfRange(i64),

    /// Another listener already answers on the port.
    #[error("Port {0} is already in use")]
    InUse(u16),
}
