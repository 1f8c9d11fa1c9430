use thiserror::Error;

pub const CONNECTIVITY_MESSAGE: &str =
    "Unable to reach the database. Check your network connection and try again.";
pub const GENERIC_MESSAGE: &str = "Failed to load dashboard data. Please try again later.";

/// Substrings that mark a failure as a network/DNS problem.
const CONNECTIVITY_HINTS: &[&str] = &[
    "network",
    "dns",
    "failed to lookup address",
    "name or service not known",
    "connection refused",
    "connection reset",
    "timed out",
    "fetch failed",
    "enotfound",
    "econnrefused",
];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("query `{label}` failed: {source}")]
    Query {
        label: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("row for `{label}` could not be mapped: {source}")]
    Mapping {
        label: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[cfg(test)]
    #[error("{0}")]
    Simulated(String),
}

impl StoreError {
    fn is_connectivity(&self) -> bool {
        match self {
            StoreError::Query { source, .. } => matches!(
                source,
                sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolTimedOut
            ),
            StoreError::Mapping { .. } => false,
            #[cfg(test)]
            StoreError::Simulated(_) => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("no user id given")]
    MissingUser,

    #[error("database probe failed: {0}")]
    Probe(#[source] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connectivity,
    Generic,
}

impl DashboardError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DashboardError::MissingUser => ErrorKind::Generic,
            DashboardError::Probe(err) if err.is_connectivity() => ErrorKind::Connectivity,
            DashboardError::Probe(err) => classify_message(&err.to_string()),
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Connectivity => CONNECTIVITY_MESSAGE,
            ErrorKind::Generic => GENERIC_MESSAGE,
        }
    }
}

pub fn classify_message(message: &str) -> ErrorKind {
    let lowered = message.to_lowercase();
    if CONNECTIVITY_HINTS.iter().any(|hint| lowered.contains(hint)) {
        ErrorKind::Connectivity
    } else {
        ErrorKind::Generic
    }
}
