//! Error types for the ARI engine.

use crate::call::LegRole;
use crate::transport::TransportError;

/// Result alias used throughout the crate.
pub type AriResult<T> = Result<T, AriError>;

/// Engine-level errors.
///
/// These cover the full failure taxonomy of the engine: connection-level
/// transport failures, protocol-level rejections, and lookup failures on
/// event documents or the live call set. None of them are fatal to the
/// event loop; handlers surface them and [`EventDispatcher::dispatch`]
/// logs and drops the offending event.
///
/// [`EventDispatcher::dispatch`]: crate::event::EventDispatcher::dispatch
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum AriError {
    /// Connection-level failure delivered instead of a protocol status.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Protocol-level rejection: the server answered with a non-2xx status.
    ///
    /// The command dispatcher never produces this on its own: 2xx is a
    /// convention of calling code. Produced by [`AriResponse::into_result`].
    ///
    /// [`AriResponse::into_result`]: crate::command::AriResponse::into_result
    #[error("command rejected: {status} {reason}")]
    CommandRejected {
        /// HTTP-style status code.
        status: u16,
        /// Reason phrase accompanying the status.
        reason: String,
    },

    /// An expected field was absent from an event or response document.
    #[error("missing field: {path}")]
    MissingField {
        /// Dotted path of the missing field, e.g. `channel.id`.
        path: String,
    },

    /// No live call references the given channel id under the given role mask.
    #[error("no call with {role} leg {id}")]
    CallNotFound {
        /// Channel id that was looked up.
        id: String,
        /// Role mask the lookup was filtered by.
        role: LegRole,
    },
}
