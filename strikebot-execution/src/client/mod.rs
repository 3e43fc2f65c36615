/// Kalshi Trade API v2 venue.
pub mod kalshi;
