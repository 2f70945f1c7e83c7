//! Session state owned by the controller task.
//!
//! Only the controller mutates [`SessionState`]; everything else sees it
//! through events or read requests.

use veil_shared::{ConnectionState, Endpoints, UserIdentity};

/// Authentication half of the session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthState {
    #[default]
    LoggedOut,
    LoggingIn,
    LoggedIn,
}

/// The active login attempt or session.
#[derive(Debug, Clone)]
pub struct Login {
    pub user: UserIdentity,
    /// Input as typed, environment prefix included.
    pub raw_input: String,
    pub endpoints: Endpoints,
}

#[derive(Debug, Default)]
pub struct SessionState {
    pub auth: AuthState,
    /// Last state reported by the transport session.
    pub connection: Option<ConnectionState>,
    pub login: Option<Login>,
    /// Bumped on every login attempt and logout. Background results carry
    /// the generation they were started under.
    generation: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_user(&self) -> Option<&UserIdentity> {
        self.login.as_ref().map(|l| &l.user)
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection.unwrap_or(ConnectionState::Disconnected)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation && self.login.is_some()
    }

    /// Enter `LoggingIn` for `login`; returns the new generation.
    pub fn begin_login(&mut self, login: Login) -> u64 {
        self.generation += 1;
        self.auth = AuthState::LoggingIn;
        self.login = Some(login);
        self.generation
    }

    pub fn mark_logged_in(&mut self) {
        self.auth = AuthState::LoggedIn;
    }

    /// Back to `LoggedOut`. Returns the user that was current, if any.
    pub fn reset(&mut self) -> Option<UserIdentity> {
        self.generation += 1;
        self.auth = AuthState::LoggedOut;
        self.login.take().map(|l| l.user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_shared::{EndpointOverrides, Environment};

    fn login(user: &str) -> Login {
        Login {
            user: UserIdentity::from(user),
            raw_input: user.to_string(),
            endpoints: Endpoints::new(Environment::Production, EndpointOverrides::default()),
        }
    }

    #[test]
    fn test_stale_generation_after_reset() {
        let mut state = SessionState::new();
        let generation = state.begin_login(login("alice"));
        assert!(state.is_current(generation));
        assert_eq!(state.auth, AuthState::LoggingIn);

        assert_eq!(state.reset(), Some(UserIdentity::from("alice")));
        assert!(!state.is_current(generation));
        assert_eq!(state.auth, AuthState::LoggedOut);
        assert_eq!(state.current_user(), None);
    }

    #[test]
    fn test_reset_when_logged_out() {
        let mut state = SessionState::new();
        assert_eq!(state.reset(), None);
        assert_eq!(state.connection(), ConnectionState::Disconnected);
    }
}
