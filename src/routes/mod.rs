/// Router Module Index
///
/// Routes are split by access level; the authenticated table is wrapped in the
/// auth middleware by `create_router`, so nothing in it is reachable anonymously.

/// Routes open to anonymous readers and to the login flow.
pub mod public;

/// Routes that require a verified session.
pub mod authenticated;
