//! xdecide-core: the decision engine behind an experimentation/feature-flag
//! SDK. Compiles a datafile into a `ProjectConfig`, evaluates audiences and
//! holdouts, deterministically buckets users, and wires up optional CMAB and
//! ODP subsystems, all behind a synchronous API over an async HTTP stack.

pub mod audience;
pub mod bucketer;
pub mod cmab;
pub mod config;
pub mod decision;
pub mod errors;
pub mod notification;
pub mod odp;
pub mod user;
