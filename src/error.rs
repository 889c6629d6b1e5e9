//! Error types for the hwcomposer vsync shim

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("vsync worker already started")]
    AlreadyStarted,

    #[error("failed to start vsync thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),

    #[error("vsync worker panicked")]
    WorkerPanicked,

    #[error("vsync callback already registered")]
    CallbackAlreadyRegistered,

    #[error("unsupported hwcomposer event {0}")]
    InvalidEvent(i32),

    #[error("unknown hardware device: {0}")]
    UnknownDevice(String),

    #[error("EGL error: {0}")]
    Egl(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Negative errno value reported to C callers
    pub fn errno(&self) -> i32 {
        match self {
            Error::AlreadyStarted | Error::CallbackAlreadyRegistered => -libc::EBUSY,
            Error::ThreadSpawn(e) | Error::Io(e) => -e.raw_os_error().unwrap_or(libc::EIO),
            Error::InvalidEvent(_)
            | Error::UnknownDevice(_)
            | Error::Config(_)
            | Error::Toml(_) => -libc::EINVAL,
            Error::WorkerPanicked | Error::Egl(_) => -libc::EIO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(Error::InvalidEvent(7).errno(), -libc::EINVAL);
        assert_eq!(Error::CallbackAlreadyRegistered.errno(), -libc::EBUSY);
        let spawn = Error::ThreadSpawn(std::io::Error::from_raw_os_error(libc::EAGAIN));
        assert_eq!(spawn.errno(), -libc::EAGAIN);
        let io = Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert_eq!(io.errno(), -libc::EIO);
    }
}
