/// Outcome of one call to the cloud authenticate operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthResult {
    Ok,
    SendVerifyCode,
    Renew,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthState {
    #[default]
    Unauthenticated,
    AwaitingVerification,
    Authenticated,
    Failed,
}

impl AuthState {
    pub fn is_authenticated(self) -> bool {
        self == Self::Authenticated
    }
}
