use thiserror::Error;

/// Rejections produced by the room registry
///
/// The `Display` text is sent to the client verbatim in `JoinRoomError` or
/// `PrivateRoomError`, so it is worded for players rather than operators.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Room not found")]
    RoomNotFound,
    #[error("Room is full")]
    RoomFull,
    #[error("Invalid room code")]
    InvalidCode,
    #[error("Cannot delete the default room")]
    ProtectedRoom,
}

/// Rejections on the admin channel
///
/// Returned to the connection as `AdminAuthFailed`. Any admin request other
/// than `AdminConnect` fails with `Unauthorized` until a connection has
/// authenticated.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdminError {
    #[error("Invalid password")]
    InvalidPassword,
    #[error("Unauthorized")]
    Unauthorized,
}
