//! Per-invocation activation policy.

/// What kind of invocation is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationKind {
    /// A request that only reads.
    PlainRead,
    /// A request that changes local state.
    Mutating,
    /// A timer tick.
    Cron,
    /// A command-line invocation.
    Cli,
}

/// Facts about the current invocation the policy decides on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvocationContext {
    /// Kind of invocation.
    pub kind: InvocationKind,
    /// Whether a user is logged in.
    pub authenticated: bool,
    /// Whether the request is an administrative one.
    pub admin: bool,
    /// Whether the engine runs in test mode.
    pub test_mode: bool,
}

impl InvocationContext {
    /// An anonymous read.
    pub fn plain_read() -> Self {
        Self {
            kind: InvocationKind::PlainRead,
            authenticated: false,
            admin: false,
            test_mode: false,
        }
    }

    /// A mutating request.
    pub fn mutating(authenticated: bool) -> Self {
        Self {
            kind: InvocationKind::Mutating,
            authenticated,
            admin: false,
            test_mode: false,
        }
    }

    /// An authenticated administrative request.
    pub fn admin() -> Self {
        Self {
            kind: InvocationKind::PlainRead,
            authenticated: true,
            admin: true,
            test_mode: false,
        }
    }

    /// A timer tick.
    pub fn cron() -> Self {
        Self {
            kind: InvocationKind::Cron,
            authenticated: false,
            admin: false,
            test_mode: false,
        }
    }

    /// A command-line invocation.
    pub fn cli() -> Self {
        Self {
            kind: InvocationKind::Cli,
            authenticated: false,
            admin: false,
            test_mode: false,
        }
    }

    /// Marks the context as test mode.
    #[must_use]
    pub fn with_test_mode(mut self, test_mode: bool) -> Self {
        self.test_mode = test_mode;
        self
    }

    /// Default listener decision: anything but an anonymous read.
    pub fn default_listener(&self) -> bool {
        self.test_mode || !(self.kind == InvocationKind::PlainRead && !self.authenticated)
    }

    /// Default sender decision: mutating, admin or CLI invocations.
    pub fn default_sender(&self) -> bool {
        self.test_mode
            || self.kind == InvocationKind::Mutating
            || self.kind == InvocationKind::Cli
            || (self.admin && self.authenticated)
    }
}

/// Overrides the default activation decisions.
///
/// Each method receives the default and returns the final answer.
pub trait ActivationPolicy: Send + Sync {
    /// Whether the listener starts this invocation.
    fn should_start_listener(&self, ctx: &InvocationContext, default: bool) -> bool {
        let _ = ctx;
        default
    }

    /// Whether the sender starts this invocation.
    fn should_start_sender(&self, ctx: &InvocationContext, default: bool) -> bool {
        let _ = ctx;
        default
    }
}

/// Keeps the defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPolicy;

impl ActivationPolicy for DefaultPolicy {}
