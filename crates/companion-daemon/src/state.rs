//! Supervisor lifecycle state.

/// Where the supervisor stands in bringing up the remapper connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    /// No endpoint is binding and no client exists.
    #[default]
    Idle,
    /// Endpoint created, not yet bound.
    AwaitingBind,
    /// Endpoint bound, client created, not yet connected.
    AwaitingConnect,
    /// Client connected, child group present.
    Active,
}

impl LifecycleState {
    /// Derive the state from the instances the supervisor currently owns.
    pub fn derive(endpoint_binding: bool, client: bool, child_group: bool) -> Self {
        if child_group {
            Self::Active
        } else if client {
            Self::AwaitingConnect
        } else if endpoint_binding {
            Self::AwaitingBind
        } else {
            Self::Idle
        }
    }

    /// Whether session observations are being forwarded.
    pub fn is_active(self) -> bool {
        self == Self::Active
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::AwaitingBind => write!(f, "AwaitingBind"),
            Self::AwaitingConnect => write!(f, "AwaitingConnect"),
            Self::Active => write!(f, "Active"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_group_wins() {
        assert_eq!(LifecycleState::derive(false, true, true), LifecycleState::Active);
        assert!(LifecycleState::derive(false, true, true).is_active());
    }

    #[test]
    fn client_without_children_awaits_connect() {
        assert_eq!(
            LifecycleState::derive(false, true, false),
            LifecycleState::AwaitingConnect
        );
    }

    #[test]
    fn binding_endpoint_awaits_bind() {
        assert_eq!(
            LifecycleState::derive(true, false, false),
            LifecycleState::AwaitingBind
        );
    }

    #[test]
    fn nothing_is_idle() {
        assert_eq!(LifecycleState::derive(false, false, false), LifecycleState::Idle);
        assert_eq!(LifecycleState::default(), LifecycleState::Idle);
        assert_eq!(LifecycleState::Idle.to_string(), "Idle");
    }
}
