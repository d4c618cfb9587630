// Library root: the gameweek planning engine and the lookups it runs on.
//
// Everything here is synchronous and pure. Upstream payloads are parsed into
// a `Snapshot` once per request; the planner, transfer advisor and analysis
// helpers only read from it.

pub mod analysis;
pub mod domain;
pub mod fixtures;
pub mod names;
pub mod planner;
pub mod scoring;
pub mod selector;
pub mod transfers;
